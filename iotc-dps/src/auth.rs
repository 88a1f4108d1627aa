//! SharedAccessSignature construction.

use data_encoding::BASE64;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{AUTH_BUFFER_SIZE, DpsError, SAS_VALIDITY_SECS};

type HmacSha256 = Hmac<Sha256>;

/// Device identity as configured in IoT Central.
///
/// The key is the device's symmetric key, base64 as copied from the portal.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub scope_id: String,
    pub device_id: String,
    pub device_key: String,
}

impl Credentials {
    pub fn new(
        scope_id: impl Into<String>,
        device_id: impl Into<String>,
        device_key: impl Into<String>,
    ) -> Self {
        Self {
            scope_id: scope_id.into(),
            device_id: device_id.into(),
            device_key: device_key.into(),
        }
    }
}

/// Percent-encode everything but ASCII alphanumerics, lowercase hex.
///
/// Operates on bytes; multi-byte UTF-8 sequences come out as one `%xx`
/// per byte, which is what the service expects.
pub fn url_encode(input: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";

    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push(HEX[(byte >> 4) as usize] as char);
            out.push(HEX[(byte & 15) as usize] as char);
        }
    }
    out
}

/// Build the full `authorization:` header line for a provisioning attempt.
///
/// The signature covers `<scope>%2Fregistrations%2F<device>\n<expiry-ms>`
/// where expiry is `epoch_secs` plus the validity window. The HMAC digest is
/// base64-encoded and then URL-encoded again; the double encoding is what
/// the service expects, not an accident.
pub fn build_sas_auth(creds: &Credentials, epoch_secs: u32) -> Result<String, DpsError> {
    let expiry = u64::from(epoch_secs) + u64::from(SAS_VALIDITY_SECS);
    if expiry <= u64::from(SAS_VALIDITY_SECS) {
        // Only possible when the RTC was never set.
        return Err(DpsError::ClockNotSet(expiry));
    }

    let resource_uri = format!(
        "{}%2Fregistrations%2F{}",
        creds.scope_id,
        url_encode(&creds.device_id)
    );
    if resource_uri.len() >= AUTH_BUFFER_SIZE {
        return Err(DpsError::BufferOverflow("resource uri"));
    }

    // Trailing "000" turns the expiry into milliseconds-as-string.
    let payload = format!("{resource_uri}\n{expiry}000");
    if payload.len() >= AUTH_BUFFER_SIZE {
        return Err(DpsError::BufferOverflow("signable payload"));
    }

    let key = BASE64.decode(creds.device_key.as_bytes())?;
    if key.len() >= AUTH_BUFFER_SIZE {
        return Err(DpsError::BufferOverflow("decoded device key"));
    }

    // HMAC-SHA256 takes keys of any length, so this arm is unreachable; the
    // length error maps to the same kind an oversized key reports.
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|_| DpsError::BufferOverflow("decoded device key"))?;
    mac.update(payload.as_bytes());
    let signature = url_encode(&BASE64.encode(&mac.finalize().into_bytes()));

    let header = format!(
        "authorization: SharedAccessSignature sr={resource_uri}&sig={signature}&se={expiry}000&skn=registration"
    );
    if header.len() >= AUTH_BUFFER_SIZE {
        return Err(DpsError::BufferOverflow("authorization header"));
    }

    Ok(header)
}
