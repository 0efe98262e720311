/// HTTP document backend and server-push event stream
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, Response};
use timeline::Timeline;
use tracing::{debug, warn};

use crate::{
    ChangeSignal, CollaborationError, DocumentBackend, DocumentId, OperationsPage, PersistAck,
    Result, SignalSource, SignalStream, UserId,
};

const USER_HEADER: &str = "x-user-id";

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    document_id: DocumentId,
    user_id: UserId,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, document_id: DocumentId, user_id: UserId) -> Self {
        Self::with_client(Client::new(), base_url, document_id, user_id)
    }

    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        document_id: DocumentId,
        user_id: UserId,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            document_id,
            user_id,
        }
    }

    /// Push source for the same document and identity.
    pub fn signal_source(&self) -> SseSignalSource {
        SseSignalSource {
            client: self.client.clone(),
            url: self.url("events"),
            user_id: self.user_id.clone(),
        }
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/documents/{}/{}", self.base_url, self.document_id, resource)
    }
}

#[async_trait]
impl DocumentBackend for HttpBackend {
    async fn fetch_operations(&self, since_version: u64) -> Result<OperationsPage> {
        let response = self
            .client
            .get(self.url("operations"))
            .query(&[("since_version", since_version)])
            .header(USER_HEADER, self.user_id.as_str())
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn fetch_timeline(&self) -> Result<Timeline> {
        let response = self
            .client
            .get(self.url("timeline"))
            .header(USER_HEADER, self.user_id.as_str())
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn put_timeline(&self, timeline: &Timeline) -> Result<PersistAck> {
        let response = self
            .client
            .put(self.url("timeline"))
            .header(USER_HEADER, self.user_id.as_str())
            .json(timeline)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CollaborationError::Http {
        status: status.as_u16(),
        body,
    })
}

/// `text/event-stream` subscription whose `data` lines are JSON change signals.
#[derive(Debug, Clone)]
pub struct SseSignalSource {
    client: Client,
    url: String,
    user_id: UserId,
}

#[async_trait]
impl SignalSource for SseSignalSource {
    async fn connect(&self) -> Result<SignalStream> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(USER_HEADER, self.user_id.as_str())
            .send()
            .await?;
        let response = check_status(response).await?;

        let signals = response.bytes_stream().eventsource().filter_map(|event| async move {
            match event {
                Ok(event) if event.data.trim().is_empty() => None,
                Ok(event) => match serde_json::from_str::<ChangeSignal>(&event.data) {
                    Ok(signal) => Some(Ok(signal)),
                    Err(e) => {
                        warn!("ignoring malformed change signal: {}", e);
                        None
                    }
                },
                Err(e) => {
                    debug!("event stream read failed: {}", e);
                    Some(Err(CollaborationError::NetworkError(e.to_string())))
                }
            }
        });
        Ok(Box::pin(signals))
    }
}
