//! Azure DPS provisioning client
//!
//! A library for provisioning IoT devices against the Azure Device
//! Provisioning Service. A device presents a time-limited SharedAccessSignature
//! (HMAC-SHA256 over its registration URI), registers over HTTPS, then polls
//! the returned operation until the service assigns it an IoT hub.
//!
//! # Example
//!
//! ```ignore
//! use iotc_dps::{Credentials, Provisioner, SystemClock, TlsTransport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let creds = Credentials::new("0ne00000000", "my-device", "bXkta2V5");
//!
//!     let transport = TlsTransport::new(iotc_dps::DPS_ENDPOINT, 443);
//!     let mut provisioner = Provisioner::new(transport, SystemClock);
//!
//!     let hub = provisioner.provision(&creds).await.unwrap();
//!     println!("assigned to {hub}");
//! }
//! ```

mod auth;
mod connection;
mod provision;
mod scan;

pub use auth::{Credentials, build_sas_auth, url_encode};
pub use connection::{TlsTransport, Transport, build_poll_request, build_register_request};
pub use provision::{Clock, ProvisionConfig, Provisioner, SystemClock};
pub use scan::{extract_after, index_of};

/// Global DPS endpoint devices register against.
pub const DPS_ENDPOINT: &str = "global.azure-devices-provisioning.net";

/// REST API version sent on every request.
pub const DPS_API_VERSION: &str = "2018-11-01";

/// Capacity of the raw response scratch buffer, including the NUL terminator.
pub const TEMP_BUFFER_SIZE: usize = 1024;

/// Bound on the auth header, the decoded device key and the operation id.
pub const AUTH_BUFFER_SIZE: usize = 256;

/// Seconds a SharedAccessSignature stays valid.
pub const SAS_VALIDITY_SECS: u32 = 7200;

/// Everything that can go wrong while provisioning.
///
/// `BufferOverflow` plays the role of the firmware's asserts: it means the
/// configured scope id, device id or key cannot fit the fixed buffers, and
/// retrying without reconfiguring the device is pointless.
#[derive(thiserror::Error, Debug)]
pub enum DpsError {
    #[error("{0} exceeds its fixed buffer")]
    BufferOverflow(&'static str),

    #[error("device key is not valid base64: {0}")]
    KeyDecode(#[from] data_encoding::DecodeError),

    #[error("clock not set: expiry {0} is inside the validity window")]
    ClockNotSet(u64),

    #[error("could not connect to DPS endpoint: {0}")]
    Connect(#[source] std::io::Error),

    #[error("DPS response did not contain {marker:?}")]
    MarkerNotFound { marker: &'static str },

    #[error("no hub assigned after {0} poll attempts")]
    PollBudgetExhausted(u32),
}
