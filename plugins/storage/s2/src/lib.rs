use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use reqwest::StatusCode;

use thermal_api::{AppendAck, AppendSession, LogStore, PluginError, ReadRecord, Record, StreamRef};

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, serde::Deserialize)]
pub struct S2Config {
    /// Базовый URL API; `{basin}` заменяется на имя basin'а.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Сколько раз повторять запрос после транзиентной ошибки.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Пауза перед первым повтором, дальше удваивается.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_endpoint() -> String {
    "https://{basin}.b.aws.s2.dev/v1".into()
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for S2Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            accept_invalid_certs: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Wire types
// ═══════════════════════════════════════════════════════════════

#[derive(serde::Deserialize)]
struct StreamPosition {
    seq_num: u64,
}

#[derive(serde::Deserialize)]
struct AppendAckWire {
    start: StreamPosition,
    end: StreamPosition,
}

#[derive(serde::Deserialize)]
struct TailWire {
    tail: StreamPosition,
}

#[derive(serde::Deserialize)]
struct ReadBatchWire {
    #[serde(default)]
    records: Vec<SequencedRecordWire>,
}

#[derive(serde::Deserialize)]
struct SequencedRecordWire {
    seq_num: u64,
    #[serde(default)]
    body: String,
}

/// Тело append-запроса и значение заголовка `s2-format`.
///
/// Текстовые payload'ы уходят как есть, чтобы читатели стрима видели JSON;
/// если хоть одна запись не UTF-8, весь батч кодируется в base64.
fn encode_append_body(records: &[Record]) -> Result<(Vec<u8>, &'static str), PluginError> {
    let texts: Option<Vec<&str>> = records
        .iter()
        .map(|r| std::str::from_utf8(r.as_bytes()).ok())
        .collect();

    let (bodies, format): (Vec<String>, _) = match texts {
        Some(texts) => (texts.into_iter().map(str::to_owned).collect(), "raw"),
        None => (
            records
                .iter()
                .map(|r| base64::engine::general_purpose::STANDARD.encode(r.as_bytes()))
                .collect(),
            "base64",
        ),
    };

    let input = serde_json::json!({
        "records": bodies.iter().map(|b| serde_json::json!({ "body": b })).collect::<Vec<_>>(),
    });
    Ok((serde_json::to_vec(&input)?, format))
}

fn parse_ack(body: &str) -> Result<AppendAck, PluginError> {
    let wire: AppendAckWire =
        serde_json::from_str(body).map_err(|e| PluginError::format_err(format!("parse append ack: {e}")))?;
    AppendAck::new(wire.start.seq_num, wire.end.seq_num)
}

/// 408/429/5xx можно повторить; 401/403 означают плохой токен.
fn status_error(status: StatusCode, body: &str) -> PluginError {
    let msg = format!("HTTP {status}: {}", body.trim());
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        PluginError::io(msg)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        PluginError::config(msg)
    } else {
        PluginError::new(msg)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Client
// ═══════════════════════════════════════════════════════════════

struct Client {
    http: reqwest::Client,
    endpoint: String,
    token: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl Client {
    fn base_url(&self, basin: &str) -> String {
        self.endpoint.replace("{basin}", basin).trim_end_matches('/').to_string()
    }

    fn records_url(&self, stream: &StreamRef) -> String {
        format!(
            "{}/streams/{}/records",
            self.base_url(&stream.basin),
            urlencoding::encode(&stream.stream)
        )
    }

    async fn exec_once(&self, request: reqwest::RequestBuilder) -> Result<String, PluginError> {
        let resp = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    PluginError::config(format!("S2 request: {e}"))
                } else {
                    PluginError::io(format!("S2 request: {e}"))
                }
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| PluginError::io(format!("S2 read: {e}")))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(status_error(status, &body))
        }
    }

    /// Выполнить запрос с повторами транзиентных ошибок.
    async fn exec<F>(&self, what: &str, build: F) -> Result<String, PluginError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut delay = self.retry_backoff;
        let mut attempt = 0;
        loop {
            match self.exec_once(build()).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        what,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "s2 request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => return Err(e.context(what)),
            }
        }
    }

    async fn check_tail(&self, stream: &StreamRef) -> Result<u64, PluginError> {
        let url = format!("{}/tail", self.records_url(stream));
        let body = self.exec("check tail", || self.http.get(&url)).await?;
        let wire: TailWire =
            serde_json::from_str(&body).map_err(|e| PluginError::format_err(format!("parse tail: {e}")))?;
        Ok(wire.tail.seq_num)
    }
}

// ═══════════════════════════════════════════════════════════════
//  S2Store
// ═══════════════════════════════════════════════════════════════

/// Клиент S2 (stream store) поверх HTTP API.
///
/// Append-сессия это последовательность unary `POST .../records`;
/// транзиентные сбои повторяются внутри клиента, наружу выходит только
/// ошибка после исчерпания `max_retries`.
pub struct S2Store {
    client: Arc<Client>,
}

impl S2Store {
    pub fn new(token: &str, config: &S2Config) -> Result<Self, PluginError> {
        if token.is_empty() {
            return Err(PluginError::config("S2 auth token is empty"));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| PluginError::config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client: Arc::new(Client {
                http,
                endpoint: config.endpoint.clone(),
                token: token.to_string(),
                max_retries: config.max_retries,
                retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            }),
        })
    }
}

impl LogStore for S2Store {
    fn open_session(
        &self,
        stream: &StreamRef,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn AppendSession>, PluginError>> + Send + '_>> {
        let stream = stream.clone();
        Box::pin(async move {
            // Плохой токен или отсутствующий стрим должны падать на старте,
            // а не на первом кадре.
            let tail = self.client.check_tail(&stream).await?;
            tracing::info!(%stream, tail, "s2 append session opened");
            Ok(Box::new(S2AppendSession {
                client: self.client.clone(),
                url: self.client.records_url(&stream),
                stream,
                last_end: Some(tail),
                closed: false,
            }) as Box<dyn AppendSession>)
        })
    }

    fn check_tail(
        &self,
        stream: &StreamRef,
    ) -> Pin<Box<dyn Future<Output = Result<u64, PluginError>> + Send + '_>> {
        let stream = stream.clone();
        Box::pin(async move { self.client.check_tail(&stream).await })
    }

    fn read(
        &self,
        stream: &StreamRef,
        start_seq: u64,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ReadRecord>, PluginError>> + Send + '_>> {
        let url = self.client.records_url(stream);
        Box::pin(async move {
            let seq = start_seq.to_string();
            let count = limit.to_string();
            let body = self
                .client
                .exec("read", || {
                    self.client
                        .http
                        .get(&url)
                        .header("s2-format", "raw")
                        .query(&[("seq_num", seq.as_str()), ("count", count.as_str())])
                })
                .await?;
            let wire: ReadBatchWire =
                serde_json::from_str(&body).map_err(|e| PluginError::format_err(format!("parse read batch: {e}")))?;
            Ok(wire
                .records
                .into_iter()
                .map(|r| ReadRecord { seq_num: r.seq_num, body: r.body.into_bytes() })
                .collect())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  S2AppendSession
// ═══════════════════════════════════════════════════════════════

pub struct S2AppendSession {
    client: Arc<Client>,
    stream: StreamRef,
    url: String,
    last_end: Option<u64>,
    closed: bool,
}

impl AppendSession for S2AppendSession {
    fn append(
        &mut self,
        records: Vec<Record>,
    ) -> Pin<Box<dyn Future<Output = Result<AppendAck, PluginError>> + Send + '_>> {
        Box::pin(async move {
            if self.closed {
                return Err(PluginError::new(format!("session for {} is closed", self.stream)));
            }
            if records.is_empty() {
                let tail = match self.last_end {
                    Some(tail) => tail,
                    None => self.client.check_tail(&self.stream).await?,
                };
                return AppendAck::new(tail, tail);
            }

            let (body, format) = encode_append_body(&records)?;
            let text = self
                .client
                .exec("append", || {
                    self.client
                        .http
                        .post(&self.url)
                        .header(reqwest::header::CONTENT_TYPE, "application/json")
                        .header("s2-format", format)
                        .body(body.clone())
                })
                .await
                .map_err(|e| e.context(&self.stream))?;

            let ack = parse_ack(&text)?;
            if ack.count() != records.len() as u64 {
                tracing::warn!(
                    stream = %self.stream,
                    sent = records.len(),
                    acked = ack.count(),
                    "s2 ack count differs from batch size"
                );
            }
            self.last_end = Some(ack.end_seq);
            Ok(ack)
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            if !self.closed {
                self.closed = true;
                tracing::info!(stream = %self.stream, last_seq = ?self.last_end, "s2 append session closed");
            }
            Ok(())
        })
    }
}
