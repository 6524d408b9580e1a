use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "warden-server", about = "Warden authentication service")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/warden.toml")]
    pub config: String,
}
