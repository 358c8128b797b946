use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::models::SHORT_CODE_LENGTH;

/// Produces candidate short codes for a target URL.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, url: &str) -> String;
}

/// SHA-256 over the URL, the current time in nanoseconds and 16 random salt bytes,
/// base64url encoded and cut to [`SHORT_CODE_LENGTH`] characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256CodeGenerator;

impl CodeGenerator for Sha256CodeGenerator {
    fn generate(&self, url: &str) -> String {
        let salt: [u8; 16] = rand::random();
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        derive_code(url, nanos, &salt)
    }
}

fn derive_code(url: &str, nanos: i64, salt: &[u8]) -> String {
    let digest = Sha256::new()
        .chain_update(url.as_bytes())
        .chain_update(nanos.to_be_bytes())
        .chain_update(salt)
        .finalize();

    let mut code = URL_SAFE_NO_PAD.encode(digest);
    code.truncate(SHORT_CODE_LENGTH);
    code
}
