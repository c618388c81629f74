//! Backend REST client for the terminal sync agent.
//!
//! The backend is a PostgREST API. Three logical calls are used:
//! - Heartbeat: `PATCH /terminals` with today's stats
//! - Bulk sync: `POST /sync_tickets` and `POST /sync_races`
//! - Config pull: `GET /terminals?select=ini_content`

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use mbs_core::{ConfigTree, DailyStats, RaceRecord, TicketRecord};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Default timeout for the heartbeat call.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default timeout for bulk writes and the config pull.
pub const DEFAULT_BULK_TIMEOUT: Duration = Duration::from_secs(10);
/// Status reported by a live terminal.
pub const ONLINE_STATUS: &str = "En Línea";

const REST_PATH: &str = "/rest/v1";

/// API client errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A required client setting was missing.
    #[error("invalid client configuration: {reason}")]
    InvalidConfig { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// Transport failure: timeout, connection refused, and so on.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The backend answered with a non-success status.
    #[error("backend rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    /// The heartbeat matched no terminal: the id/token pair is wrong.
    #[error("terminal id and auth token were not accepted by the backend")]
    InvalidCredentials,
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Per-call timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub heartbeat: Duration,
    pub bulk: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            heartbeat: DEFAULT_HEARTBEAT_TIMEOUT,
            bulk: DEFAULT_BULK_TIMEOUT,
        }
    }
}

/// Body of the heartbeat `PATCH`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartbeatPayload {
    pub last_sync: String,
    pub status: String,
    pub last_race_number: String,
    pub last_ticket_number: String,
    pub daily_sales: f64,
    pub daily_payouts: f64,
}

impl HeartbeatPayload {
    pub fn new(stats: &DailyStats, now: DateTime<Utc>) -> Self {
        Self {
            last_sync: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            status: ONLINE_STATUS.to_string(),
            last_race_number: stats.current_race.clone(),
            last_ticket_number: stats.current_ticket.clone(),
            daily_sales: stats.sales,
            daily_payouts: stats.payouts,
        }
    }
}

/// Backend API client.
pub struct Client {
    http: reqwest::Client,
    rest_url: String,
    api_key: String,
    timeouts: Timeouts,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("rest_url", &self.rest_url)
            .field("api_key", &"[REDACTED]")
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client for the backend at `base_url`.
    ///
    /// `base_url` is the project URL; the REST prefix is appended unless
    /// already present.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeouts: Timeouts,
    ) -> Result<Self, ApiError> {
        let api_key = api_key.into();
        if base_url.trim().is_empty() {
            return Err(ApiError::InvalidConfig {
                reason: "backend URL cannot be empty",
            });
        }
        if api_key.trim().is_empty() {
            return Err(ApiError::InvalidConfig {
                reason: "API key cannot be empty",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(timeouts.bulk)
            .build()
            .map_err(ApiError::ClientBuild)?;

        Ok(Self {
            http,
            rest_url: rest_url(base_url),
            api_key,
            timeouts,
        })
    }

    /// Reports liveness and today's stats for a terminal.
    ///
    /// Returns [`ApiError::InvalidCredentials`] when the backend accepts the
    /// request but no terminal matches the id/token pair.
    pub async fn send_heartbeat(
        &self,
        terminal_id: &str,
        auth_token: &str,
        payload: &HeartbeatPayload,
    ) -> Result<(), ApiError> {
        let id_filter = format!("eq.{terminal_id}");
        let token_filter = format!("eq.{auth_token}");
        let response = self
            .request(Method::PATCH, "terminals")
            .query(&[("id", id_filter.as_str()), ("auth_token", token_filter.as_str())])
            .header("Prefer", "return=representation")
            .timeout(self.timeouts.heartbeat)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(status = status.as_u16(), "heartbeat response");
        check_heartbeat(status, &body)
    }

    /// Submits a batch of tickets in one request.
    pub async fn push_tickets(&self, tickets: &[TicketRecord]) -> Result<(), ApiError> {
        self.push("sync_tickets", tickets).await
    }

    /// Submits a batch of race results in one request.
    pub async fn push_races(&self, races: &[RaceRecord]) -> Result<(), ApiError> {
        self.push("sync_races", races).await
    }

    /// Fetches the terminal's remote INI configuration.
    ///
    /// An empty tree means the backend holds nothing to apply.
    pub async fn fetch_config(&self, terminal_id: &str) -> Result<ConfigTree, ApiError> {
        let id_filter = format!("eq.{terminal_id}");
        let response = self
            .request(Method::GET, "terminals")
            .query(&[("id", id_filter.as_str()), ("select", "ini_content")])
            .timeout(self.timeouts.bulk)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        parse_config_body(&body)
    }

    async fn push<T: Serialize>(&self, table: &str, records: &[T]) -> Result<(), ApiError> {
        tracing::debug!(table, count = records.len(), "posting batch");
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=minimal")
            .timeout(self.timeouts.bulk)
            .json(records)
            .send()
            .await?;

        let status = response.status();
        if is_success(status) {
            return Ok(());
        }
        let body = response.text().await?;
        Err(ApiError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{table}", self.rest_url))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

fn rest_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.ends_with(REST_PATH) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{REST_PATH}")
    }
}

fn is_success(status: StatusCode) -> bool {
    matches!(status.as_u16(), 200 | 201 | 204)
}

/// A heartbeat that matched no row comes back as a success with an empty body.
fn check_heartbeat(status: StatusCode, body: &str) -> Result<(), ApiError> {
    if !is_success(status) {
        return Err(ApiError::Rejected {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }
    if status == StatusCode::NO_CONTENT {
        return Ok(());
    }

    let trimmed = body.trim();
    let matched_nothing = trimmed.is_empty()
        || match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Null) => true,
            Ok(Value::Array(rows)) => rows.is_empty(),
            _ => false,
        };
    if matched_nothing {
        return Err(ApiError::InvalidCredentials);
    }
    Ok(())
}

/// Extracts `ini_content` from a terminal lookup.
///
/// Accepts PostgREST's array form or a single object. `ini_content` stored as
/// JSON text is decoded as well.
fn parse_config_body(body: &str) -> Result<ConfigTree, ApiError> {
    if body.trim().is_empty() {
        return Ok(ConfigTree::new());
    }
    let value: Value =
        serde_json::from_str(body).map_err(|err| ApiError::InvalidResponse(err.to_string()))?;

    let terminal = match value {
        Value::Array(rows) => rows.into_iter().next(),
        Value::Object(_) => Some(value),
        _ => None,
    };
    let Some(mut content) = terminal.and_then(|mut t| t.get_mut("ini_content").map(Value::take))
    else {
        return Ok(ConfigTree::new());
    };

    if let Value::String(text) = &content {
        if text.trim().is_empty() {
            return Ok(ConfigTree::new());
        }
        content = serde_json::from_str(text)
            .map_err(|err| ApiError::InvalidResponse(format!("ini_content: {err}")))?;
    }

    ConfigTree::from_json(&content).map_err(|err| ApiError::InvalidResponse(err.to_string()))
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    use super::*;

    fn client(base_url: &str) -> Client {
        Client::new(base_url, "service-key", Timeouts::default()).unwrap()
    }

    fn stats() -> DailyStats {
        DailyStats {
            sales: 150.5,
            payouts: 20.0,
            current_race: "42".to_string(),
            current_ticket: "000901".to_string(),
        }
    }

    /// Serves one canned HTTP response and returns the raw request it received.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{addr}"), handle)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        if name.eq_ignore_ascii_case("content-length") {
                            value.trim().parse::<usize>().ok()
                        } else {
                            None
                        }
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[test]
    fn client_rejects_empty_settings() {
        assert!(matches!(
            Client::new("", "key", Timeouts::default()),
            Err(ApiError::InvalidConfig { .. })
        ));
        assert!(matches!(
            Client::new("https://example.supabase.co", "  ", Timeouts::default()),
            Err(ApiError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn client_debug_redacts_api_key() {
        let client = client("https://example.supabase.co");
        let debug = format!("{client:?}");
        assert!(!debug.contains("service-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn rest_url_appends_prefix_once() {
        assert_eq!(
            rest_url("https://example.supabase.co/"),
            "https://example.supabase.co/rest/v1"
        );
        assert_eq!(
            rest_url("https://example.supabase.co/rest/v1/"),
            "https://example.supabase.co/rest/v1"
        );
    }

    #[test]
    fn heartbeat_payload_serializes_to_wire_shape() {
        let now = DateTime::parse_from_rfc3339("2025-03-01T18:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let json = serde_json::to_string_pretty(&HeartbeatPayload::new(&stats(), now)).unwrap();
        insta::assert_snapshot!(json, @r#"
        {
          "last_sync": "2025-03-01T18:30:00Z",
          "status": "En Línea",
          "last_race_number": "42",
          "last_ticket_number": "000901",
          "daily_sales": 150.5,
          "daily_payouts": 20.0
        }
        "#);
    }

    #[test]
    fn heartbeat_empty_representation_means_invalid_credentials() {
        assert!(matches!(
            check_heartbeat(StatusCode::OK, "[]"),
            Err(ApiError::InvalidCredentials)
        ));
        assert!(matches!(
            check_heartbeat(StatusCode::CREATED, "  "),
            Err(ApiError::InvalidCredentials)
        ));
        assert!(check_heartbeat(StatusCode::OK, r#"[{"id":"term-1"}]"#).is_ok());
        assert!(check_heartbeat(StatusCode::NO_CONTENT, "").is_ok());
    }

    #[test]
    fn heartbeat_error_status_is_a_rejection() {
        let err = check_heartbeat(StatusCode::UNAUTHORIZED, "bad key").unwrap_err();
        assert!(matches!(err, ApiError::Rejected { status: 401, ref body } if body == "bad key"));
    }

    #[test]
    fn config_body_accepts_array_and_object_forms() {
        let from_array =
            parse_config_body(r#"[{"ini_content": {"DOG": {"INICIO": 48}}}]"#).unwrap();
        let from_object = parse_config_body(r#"{"ini_content": {"DOG": {"INICIO": 48}}}"#).unwrap();
        assert_eq!(from_array, from_object);
        assert_eq!(from_array.entries().next(), Some(("DOG", "INICIO", "48")));
    }

    #[test]
    fn config_body_without_content_is_empty() {
        assert!(parse_config_body("[]").unwrap().is_empty());
        assert!(parse_config_body(r#"[{"ini_content": null}]"#).unwrap().is_empty());
        assert!(parse_config_body(r#"[{"other": 1}]"#).unwrap().is_empty());
        assert!(parse_config_body("").unwrap().is_empty());
    }

    #[test]
    fn config_body_decodes_text_content() {
        let tree =
            parse_config_body(r#"[{"ini_content": "{\"PANTALLA\": {\"MENSAJE\": \"HOLA\"}}"}]"#)
                .unwrap();
        assert_eq!(tree.entries().next(), Some(("PANTALLA", "MENSAJE", "HOLA")));
    }

    #[test]
    fn config_body_rejects_malformed_json() {
        assert!(matches!(
            parse_config_body("{not json"),
            Err(ApiError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_config_body(r#"[{"ini_content": {"DOG": 1}}]"#),
            Err(ApiError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn send_heartbeat_patches_terminal_row() {
        let (url, server) = serve_once("200 OK", r#"[{"id":"term-1"}]"#).await;
        let payload = HeartbeatPayload::new(&stats(), Utc::now());

        client(&url)
            .send_heartbeat("term-1", "tok-9", &payload)
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("PATCH /rest/v1/terminals?id=eq.term-1&auth_token=eq.tok-9 "));
        let lowered = request.to_lowercase();
        assert!(lowered.contains("prefer: return=representation"));
        assert!(lowered.contains("authorization: bearer service-key"));
        assert!(lowered.contains("apikey: service-key"));
        assert!(request.contains(r#""last_ticket_number":"000901""#));
    }

    #[tokio::test]
    async fn send_heartbeat_reports_unknown_terminal() {
        let (url, server) = serve_once("200 OK", "[]").await;
        let payload = HeartbeatPayload::new(&stats(), Utc::now());

        let err = client(&url)
            .send_heartbeat("term-1", "wrong", &payload)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::InvalidCredentials));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn push_races_posts_array_body() {
        let (url, server) = serve_once("201 Created", "").await;
        let races = vec![RaceRecord {
            terminal_id: "term-1".to_string(),
            race_number: "42".to_string(),
            winner_numbers: "3-4".to_string(),
            local_date: Some("2025-03-01".to_string()),
            local_time: Some("21:32:18".to_string()),
        }];

        client(&url).push_races(&races).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /rest/v1/sync_races "));
        assert!(request.to_lowercase().contains("prefer: return=minimal"));
        assert!(request.ends_with(
            r#"[{"terminal_id":"term-1","race_number":"42","winner_numbers":"3-4","local_date":"2025-03-01","local_time":"21:32:18"}]"#
        ));
    }

    #[tokio::test]
    async fn push_rejection_carries_status_and_body() {
        let (url, server) = serve_once("409 Conflict", r#"{"message":"duplicate key"}"#).await;

        let err = client(&url).push_tickets(&[]).await.unwrap_err();

        assert!(
            matches!(err, ApiError::Rejected { status: 409, ref body } if body.contains("duplicate key"))
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn fetch_config_reads_ini_content() {
        let (url, server) =
            serve_once("200 OK", r#"[{"ini_content":{"PANTALLA":{"MENSAJE":"HOLA"}}}]"#).await;

        let tree = client(&url).fetch_config("term-1").await.unwrap();

        assert_eq!(tree.entries().next(), Some(("PANTALLA", "MENSAJE", "HOLA")));
        let request = server.await.unwrap();
        assert!(request.starts_with("GET /rest/v1/terminals?id=eq.term-1&select=ini_content "));
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}"))
            .fetch_config("term-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Request(_)));
    }
}
