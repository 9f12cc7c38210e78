//! In-memory upgrade endpoint for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::UpdateError;
use crate::networking::{ByteStream, UpgradeTransport};

pub struct FakeTransport {
    reply: Result<String, String>,
    downloads: Mutex<VecDeque<ByteStream>>,
    posts: Mutex<Vec<Value>>,
}

impl FakeTransport {
    /// Answers every version check with `body`.
    pub fn replying(body: &str) -> Self {
        Self {
            reply: Ok(body.to_owned()),
            downloads: Mutex::new(VecDeque::new()),
            posts: Mutex::new(Vec::new()),
        }
    }

    /// Fails every version check as if the server were unreachable.
    pub fn unreachable(message: &str) -> Self {
        Self {
            reply: Err(message.to_owned()),
            ..Self::replying("")
        }
    }

    /// Queue the body served by the next download request.
    pub fn with_download(self, body: ByteStream) -> Self {
        self.downloads.lock().unwrap().push_back(body);
        self
    }

    /// JSON bodies of every request received so far.
    pub fn posts(&self) -> Vec<Value> {
        self.posts.lock().unwrap().clone()
    }

    fn record(&self, body: &[u8]) {
        let value = serde_json::from_slice(body).expect("requests are JSON");
        self.posts.lock().unwrap().push(value);
    }
}

impl UpgradeTransport for FakeTransport {
    fn post(&self, body: Vec<u8>) -> BoxFuture<'_, Result<Bytes, UpdateError>> {
        self.record(&body);
        let reply = self
            .reply
            .clone()
            .map(Bytes::from)
            .map_err(UpdateError::Transport);
        Box::pin(async move { reply })
    }

    fn post_streaming(&self, body: Vec<u8>) -> BoxFuture<'_, Result<ByteStream, UpdateError>> {
        self.record(&body);
        let next = self.downloads.lock().unwrap().pop_front();
        Box::pin(async move {
            next.ok_or_else(|| UpdateError::Transport("connection refused".into()))
        })
    }
}

/// A body that is already fully buffered, delivered as the given chunks.
pub fn chunked(chunks: Vec<Vec<u8>>) -> ByteStream {
    stream::iter(chunks.into_iter().map(|chunk| Ok(Bytes::from(chunk)))).boxed()
}

/// A body whose chunks arrive only when the test sends them.
/// Dropping the sender ends the body.
pub fn live_body() -> (mpsc::UnboundedSender<Result<Bytes, UpdateError>>, ByteStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let body = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    })
    .boxed();
    (tx, body)
}

/// Split `total` bytes of a repeating pattern into chunks of the given sizes.
pub fn split_payload(total: usize, sizes: &[usize]) -> Vec<Vec<u8>> {
    let payload: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();
    let mut chunks = Vec::new();
    let mut offset = 0;
    let mut sizes = sizes.iter().cycle();
    while offset < total {
        let size = (*sizes.next().unwrap_or(&total)).max(1);
        let end = (offset + size).min(total);
        chunks.push(payload[offset..end].to_vec());
        offset = end;
    }
    chunks
}
