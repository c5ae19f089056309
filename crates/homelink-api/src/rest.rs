// REST API HTTP client
//
// Wraps `reqwest::Client` with bearer auth, backend URL construction and
// status handling. The raw `get_json` / `post_json` helpers are what the
// relay's proxy forwards through; the typed helpers sit on top of them.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, trace};
use url::Url;

use crate::auth::AccessToken;
use crate::error::Error;
use crate::models::EntityState;
use crate::transport::TransportConfig;

/// Upper bound on error-body text kept for logging.
const BODY_PREVIEW: usize = 200;

/// Raw HTTP client for the backend's REST API.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    /// Create a client that authenticates every request with `token`.
    pub fn new(
        base_url: Url,
        token: &AccessToken,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client_with_headers(token.bearer_headers()?)?;
        Ok(Self { http, base_url })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}{path}`, keeping any path prefix on the base URL.
    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let prefix = self.base_url.path().trim_end_matches('/');
        url.set_path(&format!("{prefix}{path}"));
        url.set_query(None);
        url
    }

    /// `GET /api/states`
    pub fn states_url(&self) -> Url {
        self.endpoint("/api/states")
    }

    /// `GET /api/states/{entity_id}`
    pub fn state_url(&self, entity_id: &str) -> Url {
        self.endpoint(&format!("/api/states/{}", encode_segment(entity_id)))
    }

    /// `POST /api/services/{domain}/{service}`
    pub fn service_url(&self, domain: &str, service: &str) -> Url {
        self.endpoint(&format!(
            "/api/services/{}/{}",
            encode_segment(domain),
            encode_segment(service)
        ))
    }

    /// `GET /api/history/period/{start}?filter_entity_id={id}&end_time={end}`
    pub fn history_url(&self, entity_id: &str, start: &str, end: &str) -> Url {
        let mut url = self.endpoint(&format!("/api/history/period/{}", encode_segment(start)));
        url.query_pairs_mut()
            .append_pair("filter_entity_id", entity_id)
            .append_pair("end_time", end);
        url
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and return the JSON body.
    pub async fn get_json(&self, url: Url) -> Result<Value, Error> {
        debug!("GET {}", url);
        let resp = self.http.get(url).send().await?;
        parse_json(resp).await
    }

    /// Send a POST request with a JSON body and return the JSON reply.
    pub async fn post_json(&self, url: Url, body: &(impl Serialize + Sync)) -> Result<Value, Error> {
        debug!("POST {}", url);
        let resp = self.http.post(url).json(body).send().await?;
        parse_json(resp).await
    }

    // ── Typed endpoints ──────────────────────────────────────────────

    pub async fn get_states(&self) -> Result<Vec<EntityState>, Error> {
        decode(self.get_json(self.states_url()).await?)
    }

    pub async fn get_state(&self, entity_id: &str) -> Result<EntityState, Error> {
        decode(self.get_json(self.state_url(entity_id)).await?)
    }

    /// Invoke a service. Returns the states the backend reports as changed.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        service_data: &Map<String, Value>,
    ) -> Result<Vec<EntityState>, Error> {
        decode(
            self.post_json(self.service_url(domain, service), service_data)
                .await?,
        )
    }

    /// State history for one entity between `start` and `end` (ISO-8601).
    pub async fn get_history(&self, entity_id: &str, start: &str, end: &str) -> Result<Value, Error> {
        self.get_json(self.history_url(entity_id, start, end)).await
    }
}

// ── Response handling ────────────────────────────────────────────────

async fn parse_json(resp: reqwest::Response) -> Result<Value, Error> {
    let status = resp.status();

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %preview(&body), "upstream returned error status");
        return Err(Error::Http {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .map_or_else(|| format!("HTTP {}", status.as_u16()), String::from),
        });
    }

    let body = resp.text().await?;
    trace!(len = body.len(), "response body received");

    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(&body)),
        body: body.clone(),
    })
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: value.to_string(),
    })
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(BODY_PREVIEW) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Everything outside the RFC 3986 unreserved set.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode one path segment. A space becomes `%20`, never `+`.
fn encode_segment(raw: &str) -> String {
    utf8_percent_encode(raw, SEGMENT).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> RestClient {
        RestClient::with_client(reqwest::Client::new(), Url::parse(base).unwrap())
    }

    #[test]
    fn state_url_keeps_base_prefix() {
        let c = client("https://example.org/ha/");
        assert_eq!(
            c.state_url("light.kitchen").as_str(),
            "https://example.org/ha/api/states/light.kitchen"
        );
    }

    #[test]
    fn service_url() {
        let c = client("http://192.168.1.181:8123");
        assert_eq!(
            c.service_url("light", "turn_on").as_str(),
            "http://192.168.1.181:8123/api/services/light/turn_on"
        );
    }

    #[test]
    fn history_url_encodes_start_and_query() {
        let c = client("http://ha.local:8123");
        let url = c.history_url(
            "sensor.temp",
            "2026-02-10T00:00:00+00:00",
            "2026-02-11T00:00:00+00:00",
        );
        assert_eq!(
            url.path(),
            "/api/history/period/2026-02-10T00%3A00%3A00%2B00%3A00"
        );
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("filter_entity_id".to_owned(), "sensor.temp".to_owned()),
                ("end_time".to_owned(), "2026-02-11T00:00:00+00:00".to_owned()),
            ]
        );
    }

    #[test]
    fn history_start_with_space_survives_path_decoding() {
        let c = client("http://ha.local:8123");
        let url = c.history_url("sensor.power", "2026-02-10 00:00:00", "2026-02-11 00:00:00");
        assert_eq!(url.path(), "/api/history/period/2026-02-10%2000%3A00%3A00");

        let segment = url.path_segments().unwrap().next_back().unwrap();
        let decoded = percent_encoding::percent_decode_str(segment).decode_utf8().unwrap();
        assert_eq!(decoded, "2026-02-10 00:00:00");
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let body = "é".repeat(300);
        assert_eq!(preview(&body).chars().count(), BODY_PREVIEW);
    }
}
