//! Remote realtime backend
//!
//! HTTP document service with per-collection REST endpoints and a
//! `text/event-stream` listener that pushes full snapshots. Writes are plain
//! requests; their effect is observed through the next pushed snapshot.

use super::{
    sort_records_by_order, BackendKind, Collection, Record, Snapshot, StoreAdapter,
    Subscription, SubscriptionEvent, WriteMode,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use signage_common::config::RemoteConfig;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("signage-player/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const LISTEN_CHANNEL_CAPACITY: usize = 16;

/// Collection listing, also the payload of every pushed event
#[derive(Debug, Default, Serialize, Deserialize)]
struct DocumentsBody {
    #[serde(default)]
    documents: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct CreatedBody {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AuthBody {
    uid: String,
}

/// Client for the remote document service
pub struct RemoteStore {
    http_client: reqwest::Client,
    /// No total timeout: the listener response lives for the whole session
    stream_client: reqwest::Client,
    base_url: String,
    app_id: String,
    token: String,
}

impl RemoteStore {
    pub fn new(config: &RemoteConfig, app_id: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout())
            .build()?;
        let stream_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http_client,
            stream_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            token: config
                .auth_token
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| config.api_key.clone()),
        })
    }

    fn collection_url(&self, collection: Collection) -> String {
        format!("{}/apps/{}/{}", self.base_url, self.app_id, collection.name())
    }

    fn document_url(&self, collection: Collection, id: &str) -> String {
        format!("{}/{}", self.collection_url(collection), id)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .bearer_auth(&self.token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        check_status(response).await
    }
}

/// Turn a non-success status into `Error::Remote` carrying the body
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Remote(format!("{} from {}: {}", status, url, body)))
}

fn into_snapshot(collection: Collection, body: DocumentsBody) -> Snapshot {
    let mut snapshot = body.documents;
    if collection == Collection::Media {
        sort_records_by_order(&mut snapshot);
    }
    snapshot
}

#[async_trait]
impl StoreAdapter for RemoteStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn read(&self, collection: Collection) -> Result<Snapshot> {
        let url = self.collection_url(collection);
        let response = self.send(self.request(Method::GET, &url)).await?;
        let body: DocumentsBody = response.json().await?;
        Ok(into_snapshot(collection, body))
    }

    async fn subscribe(&self, collection: Collection) -> Result<Subscription> {
        let url = format!("{}:listen", self.collection_url(collection));
        let response = self
            .stream_client
            .get(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check_status(response).await?;
        info!("Subscribed to remote {} collection", collection);

        let (tx, rx) = mpsc::channel(LISTEN_CHANNEL_CAPACITY);
        let task = tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut parser = SseParser::default();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx
                            .send(SubscriptionEvent::Error(format!("listener failed: {}", e)))
                            .await;
                        return;
                    }
                };

                for payload in parser.push(&chunk) {
                    let event = match serde_json::from_str::<DocumentsBody>(&payload) {
                        Ok(body) => SubscriptionEvent::Snapshot(into_snapshot(collection, body)),
                        Err(e) => {
                            warn!("Ignoring malformed {} snapshot: {}", collection, e);
                            continue;
                        }
                    };
                    if tx.send(event).await.is_err() {
                        debug!("Subscriber for {} went away", collection);
                        return;
                    }
                }
            }

            let _ = tx
                .send(SubscriptionEvent::Error("listener stream closed".to_string()))
                .await;
        });

        Ok(Subscription::new(rx, task))
    }

    async fn create(&self, collection: Collection, data: Map<String, Value>) -> Result<String> {
        let url = self.collection_url(collection);
        let response = self
            .send(self.request(Method::POST, &url).json(&data))
            .await?;
        let created: CreatedBody = response.json().await?;
        Ok(created.id)
    }

    async fn write(
        &self,
        collection: Collection,
        id: &str,
        data: Map<String, Value>,
        mode: WriteMode,
    ) -> Result<()> {
        let method = match mode {
            WriteMode::Merge => Method::PATCH,
            WriteMode::Replace => Method::PUT,
        };
        let url = self.document_url(collection, id);
        self.send(self.request(method, &url).json(&data)).await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let url = self.document_url(collection, id);
        let response = self.request(Method::DELETE, &url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("Remote delete of absent document {}/{}", collection, id);
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }

    async fn batch_delete(&self, collection: Collection, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let url = format!("{}:batchDelete", self.collection_url(collection));
        self.send(self.request(Method::POST, &url).json(&json!({ "ids": ids })))
            .await?;
        Ok(())
    }

    async fn write_all(&self, collection: Collection, snapshot: Snapshot) -> Result<()> {
        let url = format!("{}:batchWrite", self.collection_url(collection));
        let body = DocumentsBody {
            documents: snapshot,
        };
        self.send(self.request(Method::POST, &url).json(&body)).await?;
        Ok(())
    }

    async fn sign_in(&self) -> Result<String> {
        let url = format!("{}/auth:anonymous", self.base_url);
        let response = self.send(self.request(Method::POST, &url)).await?;
        let auth: AuthBody = response.json().await?;
        Ok(auth.uid)
    }
}

/// Incremental `text/event-stream` parser
///
/// Feed raw body chunks; complete events come back as their joined `data:`
/// payloads. Comments, `event:`/`id:` fields and keep-alives are dropped.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    pending: Vec<u8>,
}

impl SseParser {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut payloads = Vec::new();
        while let Some(end) = self.pending.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.pending.drain(..end + 2).collect();
            let text = String::from_utf8_lossy(&block[..end]);

            let data: Vec<&str> = text
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|value| value.strip_prefix(' ').unwrap_or(value))
                .collect();
            if !data.is_empty() {
                payloads.push(data.join("\n"));
            }
        }
        payloads
    }
}
