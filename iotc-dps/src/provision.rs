//! Provisioning orchestration.
//!
//! Sequences one provisioning attempt: build the SAS header, register the
//! device, give the service time to queue the operation, then poll until a
//! hub is assigned. Registration failures are permanent for the attempt;
//! poll misses are retried, by default forever.

use std::time::Duration;

use log::{debug, error, info};
use tokio::time::sleep;

use crate::auth::{Credentials, build_sas_auth};
use crate::connection::{Transport, build_poll_request, build_register_request};
use crate::scan::extract_after;
use crate::{AUTH_BUFFER_SIZE, DpsError, TEMP_BUFFER_SIZE};

const OPERATION_ID_MARKER: &str = "{\"operationId\":\"";
const ASSIGNED_HUB_MARKER: &str = "\"assignedHub\":\"";

/// Source of epoch seconds. The real clock must be set before provisioning
/// or the SAS expiry invariant trips.
pub trait Clock {
    fn epoch(&self) -> u32;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch(&self) -> u32 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    }
}

/// Timing and retry knobs for one provisioning attempt.
///
/// The defaults reproduce the reference firmware: 2 s / 5 s settle before
/// reading the register and poll responses, 4 s before the first poll, 5 s
/// between polls, and no cap on poll attempts.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub register_settle: Duration,
    pub operation_delay: Duration,
    pub poll_settle: Duration,
    pub retry_delay: Duration,
    pub max_polls: Option<u32>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            register_settle: Duration::from_secs(2),
            operation_delay: Duration::from_secs(4),
            poll_settle: Duration::from_secs(5),
            retry_delay: Duration::from_secs(5),
            max_polls: None,
        }
    }
}

/// Runs the provisioning flow over an injected transport and clock.
pub struct Provisioner<T, C> {
    transport: T,
    clock: C,
    config: ProvisionConfig,
}

impl<T: Transport, C: Clock> Provisioner<T, C> {
    pub fn new(transport: T, clock: C) -> Self {
        Self::with_config(transport, clock, ProvisionConfig::default())
    }

    pub fn with_config(transport: T, clock: C, config: ProvisionConfig) -> Self {
        Self {
            transport,
            clock,
            config,
        }
    }

    /// One full provisioning attempt; returns the assigned hub hostname.
    pub async fn provision(&mut self, creds: &Credentials) -> Result<String, DpsError> {
        let auth = build_sas_auth(creds, self.clock.epoch())
            .inspect_err(|e| error!("building SAS auth failed: {e}"))?;

        debug!(
            "registering {} under scope {}",
            creds.device_id, creds.scope_id
        );
        let operation_id = self.register(creds, &auth).await?;
        debug!("operation {operation_id} accepted, waiting for the service");

        sleep(self.config.operation_delay).await;
        self.poll(creds, &auth, &operation_id).await
    }

    async fn register(&mut self, creds: &Credentials, auth: &str) -> Result<String, DpsError> {
        let request = build_register_request(creds, auth, self.transport.host())?;
        let mut buffer = [0u8; TEMP_BUFFER_SIZE];
        self.transport
            .roundtrip(&request, self.config.register_settle, &mut buffer)
            .await?;

        let Some(value) = extract_after(&buffer, OPERATION_ID_MARKER.as_bytes()) else {
            error!("error from DPS endpoint");
            error!("{}", printable(&buffer));
            return Err(DpsError::MarkerNotFound {
                marker: OPERATION_ID_MARKER,
            });
        };
        if value.len() >= AUTH_BUFFER_SIZE {
            return Err(DpsError::BufferOverflow("operation id"));
        }

        Ok(String::from_utf8_lossy(value).into_owned())
    }

    async fn poll(
        &mut self,
        creds: &Credentials,
        auth: &str,
        operation_id: &str,
    ) -> Result<String, DpsError> {
        let request = build_poll_request(creds, auth, operation_id, self.transport.host())?;
        let mut attempts = 0u32;

        loop {
            let mut buffer = [0u8; TEMP_BUFFER_SIZE];
            self.transport
                .roundtrip(&request, self.config.poll_settle, &mut buffer)
                .await?;

            if let Some(value) = extract_after(&buffer, ASSIGNED_HUB_MARKER.as_bytes()) {
                let hostname = String::from_utf8_lossy(value).into_owned();
                info!("assigned to {hostname}");
                return Ok(hostname);
            }

            attempts += 1;
            error!("couldn't get assignedHub, trying again..");
            error!("{}", printable(&buffer));

            if let Some(max) = self.config.max_polls {
                if attempts >= max {
                    return Err(DpsError::PollBudgetExhausted(attempts));
                }
            }

            sleep(self.config.retry_delay).await;
        }
    }
}

/// The drained response up to its NUL terminator, for diagnostics.
fn printable(buffer: &[u8]) -> std::borrow::Cow<'_, str> {
    let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
    String::from_utf8_lossy(&buffer[..end])
}
