// HTTP client construction shared by the REST client and the push-stream
// consumer. Both need the same TLS posture; only the timeout differs.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Certificate, Client, ClientBuilder};

use crate::error::Error;

/// How server certificates are checked.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    #[default]
    System,
    /// Trust the PEM bundle at this path in addition to the system roots.
    CustomCa(PathBuf),
    /// Skip verification entirely (self-signed home installs).
    DangerAcceptInvalid,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Whole-request timeout. `None` for long-lived streaming responses.
    pub timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl TransportConfig {
    pub fn build_client(&self) -> Result<Client, Error> {
        self.build_client_with_headers(HeaderMap::new())
    }

    /// Client that sends `headers` on every request (the bearer token, for
    /// the REST client).
    pub fn build_client_with_headers(&self, headers: HeaderMap) -> Result<Client, Error> {
        let builder = Client::builder()
            .user_agent(concat!("homelink/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers);
        let builder = match self.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        };

        self.tls
            .apply(builder)?
            .build()
            .map_err(|e| Error::Tls(format!("cannot build HTTP client: {e}")))
    }

    /// Same TLS settings, no whole-request timeout (for push streams).
    pub fn streaming(&self) -> Self {
        Self {
            tls: self.tls.clone(),
            timeout: None,
        }
    }
}

impl TlsMode {
    fn apply(&self, builder: ClientBuilder) -> Result<ClientBuilder, Error> {
        Ok(match self {
            Self::System => builder,
            Self::CustomCa(path) => {
                let pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("cannot read CA bundle {}: {e}", path.display())))?;
                let cert = Certificate::from_pem(&pem)
                    .map_err(|e| Error::Tls(format!("CA bundle {} is not valid PEM: {e}", path.display())))?;
                builder.add_root_certificate(cert)
            }
            Self::DangerAcceptInvalid => builder.danger_accept_invalid_certs(true),
        })
    }
}
