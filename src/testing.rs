//! In-memory doubles for the two external seams.

use crate::enrich::models::{CatalogRecord, EnrichmentOutcome, ImageRef};
use crate::llm::{ChatCompletion, ChatRequest, LlmError};
use crate::supabase::{CatalogStore, StoreError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;
use tokio::time::sleep;

/// Replays queued answers in order and records every request it receives.
/// An exhausted script answers with a transport error.
#[derive(Default)]
pub struct ScriptedChat {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    seen: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn new(script: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatCompletion for ScriptedChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.seen.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Transport("script exhausted".into())))
    }
}

/// What a [`GatedChat`] does before answering a gated call.
pub enum Gate {
    /// Waits until every party of the barrier has arrived.
    Barrier(Arc<Barrier>),
    Sleep(Duration),
    Panic,
}

/// Wraps a [`ScriptedChat`]. The first `open_calls` calls answer straight
/// away; every later call passes through the gate first.
pub struct GatedChat {
    inner: ScriptedChat,
    gate: Gate,
    open_calls: usize,
    calls: AtomicUsize,
    completed: AtomicUsize,
}

impl GatedChat {
    pub fn new(inner: ScriptedChat, gate: Gate, open_calls: usize) -> Self {
        Self {
            inner,
            gate,
            open_calls,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    /// Calls that made it past the gate and returned an answer.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatCompletion for GatedChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.open_calls {
            match &self.gate {
                Gate::Barrier(barrier) => {
                    barrier.wait().await;
                }
                Gate::Sleep(delay) => sleep(*delay).await,
                Gate::Panic => panic!("inference backend blew up"),
            }
        }
        let answer = self.inner.complete(request).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        answer
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub products: HashMap<String, CatalogRecord>,
    pub images: HashMap<String, Vec<ImageRef>>,
    pub fail_images: bool,
    pub fail_writes: bool,
    writes: Mutex<Vec<(String, EnrichmentOutcome)>>,
}

impl MemoryStore {
    pub fn with_product(id: &str, record: CatalogRecord, images: Vec<ImageRef>) -> Self {
        let mut store = Self::default();
        store.products.insert(id.to_string(), record);
        store.images.insert(id.to_string(), images);
        store
    }

    pub fn writes(&self) -> Vec<(String, EnrichmentOutcome)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn fetch_product(&self, product_id: &str) -> Result<Option<CatalogRecord>, StoreError> {
        Ok(self.products.get(product_id).cloned())
    }

    async fn fetch_images(
        &self,
        product_id: &str,
        limit: usize,
    ) -> Result<Vec<ImageRef>, StoreError> {
        if self.fail_images {
            return Err(StoreError::Status(503));
        }
        let mut images = self.images.get(product_id).cloned().unwrap_or_default();
        images.sort_by_key(|image| image.position);
        images.truncate(limit);
        Ok(images)
    }

    async fn update_enrichment(
        &self,
        product_id: &str,
        outcome: &EnrichmentOutcome,
    ) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Request("connection refused".into()));
        }
        self.writes
            .lock()
            .unwrap()
            .push((product_id.to_string(), outcome.clone()));
        Ok(())
    }
}

pub fn images(count: usize) -> Vec<ImageRef> {
    (0..count)
        .map(|i| ImageRef {
            src: format!("https://cdn.example.com/p/{i}.jpg"),
            alt: None,
            position: i as i32,
        })
        .collect()
}

pub fn sample_record() -> CatalogRecord {
    CatalogRecord {
        title: Some("Coussin velours gris".into()),
        description: Some("<p>Lot de 3 coussins décoratifs, 45x45cm</p>".into()),
        product_type: Some("Cushions".into()),
        vendor: Some("Maison".into()),
        ..CatalogRecord::default()
    }
}
