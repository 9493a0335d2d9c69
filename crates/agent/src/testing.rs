//! Doubles shared by the orchestration tests.

use async_trait::async_trait;
use clinicdesk_core::error::{ProviderError, StoreError};
use clinicdesk_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk};
use clinicdesk_core::record::{RecordStore, Resource, ResourceKind};
use clinicdesk_store::InMemoryRecordStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::update::{ConversationObserver, ConversationUpdate};

pub enum Script {
    Chunks(Vec<String>),
    /// Send these chunks, then fail
    FailAfter(Vec<String>, ProviderError),
    /// Refuse to open the stream
    Refuse(ProviderError),
    /// Open the stream and never send anything
    Hang,
}

pub fn chunks(parts: &[&str]) -> Script {
    Script::Chunks(parts.iter().map(|p| p.to_string()).collect())
}

/// A block split across three deltas, followed by chatter the consumer
/// should never read.
pub fn block_script(params: &str) -> Script {
    chunks(&[
        "On it.\n<tool_block>\n<params>\n",
        params,
        "\n</params>\n</tool_block>",
        "\nMore text that should never be read.",
        " And more.",
    ])
}

/// Plays scripts in order; once they run out, repeats `fallback` forever.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    fallback: Option<String>,
    requests: Mutex<Vec<ProviderRequest>>,
    hung: Mutex<Vec<mpsc::Sender<Result<StreamChunk, ProviderError>>>>,
    abandoned: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
            hung: Mutex::new(Vec::new()),
            abandoned: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn repeating(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(text.into()),
            ..Self::new(Vec::new())
        }
    }

    /// Producers that found the receiver gone before sending everything.
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_script(&self) -> Script {
        if let Some(script) = self.scripts.lock().unwrap().pop_front() {
            return script;
        }
        match &self.fallback {
            Some(text) => Script::Chunks(vec![text.clone()]),
            None => chunks(&["Done."]),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);

        let (parts, failure) = match self.next_script() {
            Script::Chunks(parts) => (parts, None),
            Script::FailAfter(parts, e) => (parts, Some(e)),
            Script::Refuse(e) => return Err(e),
            Script::Hang => {
                let (tx, rx) = mpsc::channel(1);
                self.hung.lock().unwrap().push(tx);
                return Ok(rx);
            }
        };

        let (tx, rx) = mpsc::channel(1);
        let abandoned = Arc::clone(&self.abandoned);
        tokio::spawn(async move {
            for part in parts {
                if tx.send(Ok(StreamChunk::text(part))).await.is_err() {
                    abandoned.fetch_add(1, Ordering::SeqCst);
                    return;
                }
            }
            let last = match failure {
                Some(e) => Err(e),
                None => Ok(StreamChunk::end()),
            };
            let _ = tx.send(last).await;
        });
        Ok(rx)
    }
}

/// Collects every update.
#[derive(Default)]
pub struct RecordingObserver {
    updates: Mutex<Vec<ConversationUpdate>>,
}

impl RecordingObserver {
    pub fn updates(&self) -> Vec<ConversationUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.updates().iter().map(|u| u.event_type()).collect()
    }
}

impl ConversationObserver for RecordingObserver {
    fn on_update(&self, update: &ConversationUpdate) {
        self.updates.lock().unwrap().push(update.clone());
    }
}

#[derive(Debug, Clone)]
pub struct StoreCall {
    pub op: &'static str,
    pub kind: ResourceKind,
    pub started: Instant,
    pub finished: Instant,
}

/// In-memory store that logs each call with its start and end time and
/// takes a little while to answer.
#[derive(Default)]
pub struct TimedStore {
    inner: InMemoryRecordStore,
    calls: Mutex<Vec<StoreCall>>,
}

impl TimedStore {
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn creates(&self, kind: ResourceKind) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.op == "create" && c.kind == kind)
            .count()
    }

    async fn timed<T>(
        &self,
        op: &'static str,
        kind: ResourceKind,
        call: impl std::future::Future<Output = T>,
    ) -> T {
        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let out = call.await;
        self.calls.lock().unwrap().push(StoreCall {
            op,
            kind,
            started,
            finished: Instant::now(),
        });
        out
    }
}

#[async_trait]
impl RecordStore for TimedStore {
    fn name(&self) -> &str {
        "timed"
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, StoreError> {
        self.timed("list", kind, self.inner.list(kind)).await
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<Resource>, StoreError> {
        self.timed("get", kind, self.inner.get(kind, id)).await
    }

    async fn create(&self, kind: ResourceKind, partial: Resource) -> Result<Resource, StoreError> {
        self.timed("create", kind, self.inner.create(kind, partial)).await
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        partial: Resource,
    ) -> Result<Option<Resource>, StoreError> {
        self.timed("update", kind, self.inner.update(kind, id, partial)).await
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<bool, StoreError> {
        self.timed("delete", kind, self.inner.delete(kind, id)).await
    }
}
