//! TLS transport to the DPS endpoint.
//!
//! One connection per request: connect, write the request verbatim, wait a
//! fixed settle time, drain whatever the service sent into a bounded buffer,
//! close. No response framing is implemented; the settle delay stands in for
//! Content-Length handling.

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::auth::{Credentials, url_encode};
use crate::{DPS_API_VERSION, DPS_ENDPOINT, DpsError, TEMP_BUFFER_SIZE};

/// Seam between the orchestrator and the network.
///
/// `response` is NUL-terminated after the drained bytes; the returned count
/// excludes the terminator.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn roundtrip(
        &mut self,
        request: &str,
        settle: Duration,
        response: &mut [u8],
    ) -> Result<usize, DpsError>;

    /// Host this transport connects to; goes into the `Host:` header so the
    /// request can never disagree with the connected endpoint.
    fn host(&self) -> &str {
        DPS_ENDPOINT
    }
}

/// Real transport over TLS to the global DPS host.
pub struct TlsTransport {
    host: String,
    port: u16,
    connector: TlsConnector,
}

impl TlsTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self {
            host: host.into(),
            port,
            connector: TlsConnector::from(Arc::new(config)),
        }
    }
}

impl Transport for TlsTransport {
    async fn roundtrip(
        &mut self,
        request: &str,
        settle: Duration,
        response: &mut [u8],
    ) -> Result<usize, DpsError> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(DpsError::Connect)?;

        let server_name = ServerName::try_from(self.host.clone()).map_err(|e| {
            DpsError::Connect(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        let mut stream = self
            .connector
            .connect(server_name, tcp)
            .await
            .map_err(DpsError::Connect)?;

        stream
            .write_all(request.as_bytes())
            .await
            .map_err(DpsError::Connect)?;
        stream.flush().await.map_err(DpsError::Connect)?;

        tokio::time::sleep(settle).await;

        let capacity = response.len().saturating_sub(1);
        let mut filled = 0;
        while filled < capacity {
            match stream.read(&mut response[filled..capacity]).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                // Servers regularly skip close-notify; whatever arrived by
                // now is the response.
                Err(_) => break,
            }
        }
        nul_terminate(response, filled);

        let _ = stream.shutdown().await;
        Ok(filled)
    }

    fn host(&self) -> &str {
        &self.host
    }
}

fn nul_terminate(response: &mut [u8], filled: usize) {
    if let Some(slot) = response.get_mut(filled) {
        *slot = 0;
    }
}

/// The registration `PUT`, exactly as the service expects it.
pub fn build_register_request(
    creds: &Credentials,
    auth_header: &str,
    host: &str,
) -> Result<String, DpsError> {
    let body = serde_json::json!({ "registrationId": creds.device_id }).to_string();

    let request = format!(
        "PUT /{}/registrations/{}/register?api-version={} HTTP/1.0\r\n\
         Host: {}\r\n\
         content-type: application/json; charset=utf-8\r\n\
         user-agent: iot-central-client/1.0\r\n\
         Accept: */*\r\n\
         Content-Length: {}\r\n\
         {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}\r\n",
        creds.scope_id,
        url_encode(&creds.device_id),
        DPS_API_VERSION,
        host,
        body.len(),
        auth_header,
        body,
    );

    if request.len() >= TEMP_BUFFER_SIZE {
        return Err(DpsError::BufferOverflow("register request"));
    }
    Ok(request)
}

/// The operation-status `GET` issued while waiting for a hub assignment.
pub fn build_poll_request(
    creds: &Credentials,
    auth_header: &str,
    operation_id: &str,
    host: &str,
) -> Result<String, DpsError> {
    let request = format!(
        "GET /{}/registrations/{}/operations/{}?api-version={} HTTP/1.1\r\n\
         Host: {}\r\n\
         content-type: application/json; charset=utf-8\r\n\
         user-agent: iot-central-client/1.0\r\n\
         Accept: */*\r\n\
         {}\r\n\
         Connection: close\r\n\
         \r\n",
        creds.scope_id,
        url_encode(&creds.device_id),
        operation_id,
        DPS_API_VERSION,
        host,
        auth_header,
    );

    if request.len() >= TEMP_BUFFER_SIZE {
        return Err(DpsError::BufferOverflow("poll request"));
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("0ne00000000", "dev 1", "AAECAwQFBgcICQoLDA0ODw==")
    }

    #[test]
    fn register_request_shape() {
        let request = build_register_request(
            &creds(),
            "authorization: SharedAccessSignature sr=x",
            DPS_ENDPOINT,
        )
        .unwrap();
        assert_eq!(
            request,
            "PUT /0ne00000000/registrations/dev%201/register?api-version=2018-11-01 HTTP/1.0\r\n\
             Host: global.azure-devices-provisioning.net\r\n\
             content-type: application/json; charset=utf-8\r\n\
             user-agent: iot-central-client/1.0\r\n\
             Accept: */*\r\n\
             Content-Length: 26\r\n\
             authorization: SharedAccessSignature sr=x\r\n\
             Connection: close\r\n\
             \r\n\
             {\"registrationId\":\"dev 1\"}\r\n"
        );
    }

    #[test]
    fn poll_request_shape() {
        let request = build_poll_request(
            &creds(),
            "authorization: SharedAccessSignature sr=x",
            "4.abc123",
            DPS_ENDPOINT,
        )
        .unwrap();
        assert_eq!(
            request,
            "GET /0ne00000000/registrations/dev%201/operations/4.abc123?api-version=2018-11-01 HTTP/1.1\r\n\
             Host: global.azure-devices-provisioning.net\r\n\
             content-type: application/json; charset=utf-8\r\n\
             user-agent: iot-central-client/1.0\r\n\
             Accept: */*\r\n\
             authorization: SharedAccessSignature sr=x\r\n\
             Connection: close\r\n\
             \r\n"
        );
    }

    #[test]
    fn register_body_is_the_raw_device_id() {
        // The body carries the device id unencoded; only the path encodes it.
        let request = build_register_request(&creds(), "authorization: x", DPS_ENDPOINT).unwrap();
        assert!(request.ends_with("{\"registrationId\":\"dev 1\"}\r\n"));
    }

    #[test]
    fn host_header_follows_the_given_endpoint() {
        let request =
            build_register_request(&creds(), "authorization: x", "dps.example.test").unwrap();
        assert!(request.contains("Host: dps.example.test\r\n"));

        let request =
            build_poll_request(&creds(), "authorization: x", "4.abc123", "dps.example.test")
                .unwrap();
        assert!(request.contains("Host: dps.example.test\r\n"));
    }

    #[test]
    fn oversized_request_is_rejected() {
        let creds = Credentials::new("0ne00000000", "x".repeat(240), "AAECAwQFBgcICQoLDA0ODw==");
        let auth = "a".repeat(255);
        assert!(matches!(
            build_register_request(&creds, &auth, DPS_ENDPOINT),
            Err(DpsError::BufferOverflow(_))
        ));
    }

    #[test]
    fn nul_terminate_tolerates_a_full_or_empty_buffer() {
        let mut buffer = [0xffu8; 4];
        nul_terminate(&mut buffer, 2);
        assert_eq!(buffer, [0xff, 0xff, 0, 0xff]);

        // Terminator lands past the end: dropped, not a panic.
        nul_terminate(&mut buffer, 4);
        nul_terminate(&mut [], 0);
    }
}
