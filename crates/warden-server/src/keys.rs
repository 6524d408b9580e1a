use anyhow::{Context, Result};
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use warden_core::token::AuthKeys;

/// Load the RS256 signing keypair from the configured PEM files. Without
/// configured paths an ephemeral dev keypair is generated: tokens issued
/// with it stop verifying after a restart.
pub fn load_or_generate(
    private_key_path: Option<&str>,
    public_key_path: Option<&str>,
) -> Result<AuthKeys> {
    if let (Some(private_path), Some(public_path)) = (private_key_path, public_key_path) {
        let private_pem = std::fs::read(private_path)
            .with_context(|| format!("reading private key at '{private_path}'"))?;
        let public_pem = std::fs::read(public_path)
            .with_context(|| format!("reading public key at '{public_path}'"))?;
        return AuthKeys::from_rsa_pem(&private_pem, &public_pem)
            .context("parsing configured RSA key material");
    }

    tracing::warn!(
        "no signing keypair configured, generating an ephemeral dev keypair; \
         set auth.private_key_path and auth.public_key_path for production"
    );
    let private_key =
        RsaPrivateKey::new(&mut rand::thread_rng(), 2048).context("generating RSA keypair")?;
    let public_key = RsaPublicKey::from(&private_key);
    let private_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .context("encoding private key")?;
    let public_pem = public_key
        .to_pkcs1_pem(LineEnding::LF)
        .context("encoding public key")?;
    AuthKeys::from_rsa_pem(private_pem.as_bytes(), public_pem.as_bytes())
        .context("parsing generated key material")
}
