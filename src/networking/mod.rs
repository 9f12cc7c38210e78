use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use log::{debug, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};

use crate::error::UpdateError;

pub const UPGRADE_ENDPOINT: &str = "https://updates.example.com/upgrade.php";

/// Reply body delivered chunk by chunk, in transport order.
pub type ByteStream = BoxStream<'static, Result<Bytes, UpdateError>>;

/// The single upgrade endpoint, as seen by the updater core.
///
/// Dropping a [`ByteStream`] aborts the transfer behind it.
pub trait UpgradeTransport: Send + Sync {
    /// POST a JSON body and return the whole reply body.
    fn post(&self, body: Vec<u8>) -> BoxFuture<'_, Result<Bytes, UpdateError>>;

    /// POST a JSON body and return the reply body as it arrives.
    fn post_streaming(&self, body: Vec<u8>) -> BoxFuture<'_, Result<ByteStream, UpdateError>>;
}

#[derive(Clone)]
pub struct NetworkClient {
    client: Client,
    endpoint: String,
}

impl NetworkClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        // No timeout: a hung request keeps the updater waiting until the
        // user cancels it.
        let client = Client::builder()
            .user_agent(concat!("app-updater/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|err| {
                warn!("network client: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn send(&self, body: Vec<u8>) -> Result<Response, UpdateError> {
        debug!("POST {} ({} byte body)", self.endpoint, body.len());
        self.client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| UpdateError::Transport(format!("POST {} failed: {e}", self.endpoint)))?
            .error_for_status()
            .map_err(|e| UpdateError::Transport(format!("upgrade server status error: {e}")))
    }
}

impl UpgradeTransport for NetworkClient {
    fn post(&self, body: Vec<u8>) -> BoxFuture<'_, Result<Bytes, UpdateError>> {
        Box::pin(async move {
            let resp = self.send(body).await?;
            resp.bytes()
                .await
                .map_err(|e| UpdateError::Transport(format!("reply body error: {e}")))
        })
    }

    fn post_streaming(&self, body: Vec<u8>) -> BoxFuture<'_, Result<ByteStream, UpdateError>> {
        Box::pin(async move {
            let resp = self.send(body).await?;
            if let Some(len) = resp.content_length() {
                debug!("download: server announced {len} bytes");
            }
            let stream = resp
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| UpdateError::Transport(format!("stream error: {e}"))));
            Ok(stream.boxed())
        })
    }
}
