use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;

fn harden_secret_file_permissions(path: &str) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub admin_seed: AdminSeedConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Mark the refresh cookie `Secure`. Enable behind TLS.
    #[serde(default = "default_false")]
    pub cookie_secure: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3010".into(),
            cookie_secure: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/warden.db".into(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Server-held secret mixed into password hashes and token fingerprints.
    pub token_pepper: String,
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_seconds: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_seconds: u64,
    #[serde(default = "default_reset_ttl")]
    pub reset_token_ttl_seconds: u64,
    /// PEM files with the RS256 keypair. Leave unset to generate an
    /// ephemeral dev keypair on startup.
    pub private_key_path: Option<String>,
    pub public_key_path: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_pepper: generate_random_hex(64),
            access_token_ttl_seconds: default_access_ttl(),
            refresh_token_ttl_seconds: default_refresh_ttl(),
            reset_token_ttl_seconds: default_reset_ttl(),
            private_key_path: None,
            public_key_path: None,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AdminSeedConfig {
    pub email: Option<String>,
    pub password: Option<String>,
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Generate a cryptographically random hex string of the given length.
fn generate_random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..16u8);
            char::from(if idx < 10 {
                b'0' + idx
            } else {
                b'a' + idx - 10
            })
        })
        .collect()
}

fn default_false() -> bool {
    false
}
fn default_max_connections() -> u32 {
    20
}
fn default_access_ttl() -> u64 {
    900 // 15 minutes
}
fn default_refresh_ttl() -> u64 {
    604_800 // 7 days
}
fn default_reset_ttl() -> u64 {
    1_200 // 20 minutes
}

fn looks_like_placeholder_secret(raw: &str) -> bool {
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return true;
    }
    normalized.contains("change_me")
        || normalized.contains("replace_me")
        || normalized.starts_with("example")
        || normalized == "pepper"
        || normalized == "secret"
}

fn validate_secret_configuration(config: &Config) -> Result<()> {
    let pepper = config.auth.token_pepper.trim();
    if pepper.len() < 16 || looks_like_placeholder_secret(pepper) {
        anyhow::bail!(
            "Invalid auth.token_pepper: use a strong random secret (at least 16 characters) and never leave placeholder values"
        );
    }
    if config.auth.private_key_path.is_some() != config.auth.public_key_path.is_some() {
        anyhow::bail!(
            "Invalid auth key configuration: set both private_key_path and public_key_path, or neither"
        );
    }
    Ok(())
}

/// Generate a commented config file template with the given values filled in.
fn generate_config_template(config: &Config) -> String {
    format!(
        r#"# Warden Server Configuration
# Generated automatically on first run. Edit as needed.

[server]
bind_address = "{bind_address}"
# Mark the refresh cookie Secure. Enable when serving behind TLS.
cookie_secure = {cookie_secure}

[database]
url = "{db_url}"
max_connections = {max_connections}

[auth]
# Server-held secret mixed into password hashes and token fingerprints.
# Changing it invalidates every stored credential and session.
token_pepper = "{token_pepper}"
access_token_ttl_seconds = {access_ttl}
refresh_token_ttl_seconds = {refresh_ttl}
reset_token_ttl_seconds = {reset_ttl}
# RS256 keypair used to sign access tokens. Without these an ephemeral
# dev keypair is generated on every start.
# private_key_path = "./data/jwt_private.pem"
# public_key_path = "./data/jwt_public.pem"

[admin_seed]
# Optional ADMIN identity created on startup when the email is unknown.
# email = "admin@example.com"
# password = "change-on-first-login"
"#,
        bind_address = config.server.bind_address,
        cookie_secure = config.server.cookie_secure,
        db_url = config.database.url,
        max_connections = config.database.max_connections,
        token_pepper = config.auth.token_pepper,
        access_ttl = config.auth.access_token_ttl_seconds,
        refresh_ttl = config.auth.refresh_token_ttl_seconds,
        reset_ttl = config.auth.reset_token_ttl_seconds,
    )
}

// ── Config Loading ───────────────────────────────────────────────────────────

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!("Config file not found at '{}', generating defaults...", path);
            let config = Config::default();

            if let Some(parent) = std::path::Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }

            let template = generate_config_template(&config);
            fs::write(path, &template)?;
            tracing::info!("Generated default config at '{}'", path);
            config
        };
        let _ = harden_secret_file_permissions(path);

        // Environment variable overrides
        if let Ok(value) = std::env::var("WARDEN_BIND_ADDRESS") {
            config.server.bind_address = value;
        }
        if let Ok(value) = std::env::var("WARDEN_COOKIE_SECURE") {
            if let Ok(parsed) = value.parse::<bool>() {
                config.server.cookie_secure = parsed;
            }
        }
        if let Ok(value) = std::env::var("WARDEN_DATABASE_URL") {
            config.database.url = value;
        }
        if let Ok(value) = std::env::var("WARDEN_DATABASE_MAX_CONNECTIONS") {
            if let Ok(parsed) = value.parse::<u32>() {
                config.database.max_connections = parsed;
            }
        }
        if let Ok(value) = std::env::var("WARDEN_TOKEN_PEPPER") {
            config.auth.token_pepper = value;
        }
        if let Ok(value) = std::env::var("WARDEN_ACCESS_TOKEN_TTL_SECONDS") {
            if let Ok(parsed) = value.parse::<u64>() {
                config.auth.access_token_ttl_seconds = parsed;
            }
        }
        if let Ok(value) = std::env::var("WARDEN_REFRESH_TOKEN_TTL_SECONDS") {
            if let Ok(parsed) = value.parse::<u64>() {
                config.auth.refresh_token_ttl_seconds = parsed;
            }
        }
        if let Ok(value) = std::env::var("WARDEN_RESET_TOKEN_TTL_SECONDS") {
            if let Ok(parsed) = value.parse::<u64>() {
                config.auth.reset_token_ttl_seconds = parsed;
            }
        }
        if let Ok(value) = std::env::var("WARDEN_JWT_PRIVATE_KEY_PATH") {
            config.auth.private_key_path = if value.trim().is_empty() {
                None
            } else {
                Some(value)
            };
        }
        if let Ok(value) = std::env::var("WARDEN_JWT_PUBLIC_KEY_PATH") {
            config.auth.public_key_path = if value.trim().is_empty() {
                None
            } else {
                Some(value)
            };
        }
        if let Ok(value) = std::env::var("WARDEN_ADMIN_EMAIL") {
            if !value.trim().is_empty() {
                config.admin_seed.email = Some(value);
            }
        }
        if let Ok(value) = std::env::var("WARDEN_ADMIN_PASSWORD") {
            if !value.trim().is_empty() {
                config.admin_seed.password = Some(value);
            }
        }

        validate_secret_configuration(&config)?;
        Ok(config)
    }
}
