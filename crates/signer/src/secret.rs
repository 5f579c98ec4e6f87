use rand::{rngs::OsRng, TryRngCore};

use crate::error::SignerError;

/// Random bytes behind every issued secret
pub const SECRET_LENGTH: usize = 32;
pub const SECRET_PREFIX: &str = "nmz_";

/// Length of the display prefix stored alongside a subscription
const DISPLAY_PREFIX_LEN: usize = 8;

/// Issues a new webhook secret: `nmz_` followed by 64 lowercase hex chars.
pub fn generate_secret() -> Result<String, SignerError> {
    let mut bytes = [0u8; SECRET_LENGTH];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| SignerError::SecretGeneration(e.to_string()))?;
    Ok(format!("{SECRET_PREFIX}{}", hex::encode(bytes)))
}

/// Masks a secret for logs. Short secrets are hidden entirely.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "****".to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// First characters of a secret, shown to users to identify it.
pub fn secret_prefix(secret: &str) -> String {
    secret.chars().take(DISPLAY_PREFIX_LEN).collect()
}
