//! Request signing

use base64::{engine::general_purpose, Engine as _};
use hmac::{digest::InvalidLength, Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// `Authorization` header value: base64(HMAC-SHA256(secret, body))
///
/// `body` must be the exact bytes put on the wire, after compression.
pub fn authorization_header(secret: &str, body: &[u8]) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(body);
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}
