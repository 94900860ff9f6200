//! Process-wide knowledge base cache.
//!
//! The knowledge base — every corpus chunk paired with its embedding — is
//! built at most once per process and then served as an immutable `Arc`
//! snapshot. The cache is an explicit state machine:
//!
//! - `Empty` → no build has run (or the last one failed and was reset)
//! - `Building` → a build is in flight; late arrivals attach to it
//! - `Ready` → the snapshot is installed and shared without locking
//!
//! The first caller that observes `Empty` installs a watch channel and
//! spawns the build on the runtime, so a client that disconnects mid-build
//! cannot cancel the work other requests are waiting on. Every concurrent
//! caller — the triggering one included — awaits the same channel and
//! receives the same snapshot. If the batch embedding call fails the state
//! reverts to `Empty`, the waiting requests get the error, and the next
//! request starts a fresh build.

use anyhow::{bail, Result};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::chunks::{build_chunks, EmbeddedChunk};
use crate::corpus::Corpus;
use crate::embedding::EmbeddingProvider;

/// The embedded chunk set for the corpus. Immutable once ready.
#[derive(Debug)]
pub struct KnowledgeBase {
    pub chunks: Vec<EmbeddedChunk>,
}

impl KnowledgeBase {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The shared embedding dimension, or `None` for an empty base.
    pub fn dims(&self) -> Option<usize> {
        self.chunks.first().map(|c| c.embedding.len())
    }
}

/// Outcome of one build attempt, delivered to every waiter through the
/// watch channel. `None` until the spawned build finishes.
type BuildOutcome = Option<Result<Arc<KnowledgeBase>, String>>;

enum CacheState {
    Empty,
    Building(watch::Receiver<BuildOutcome>),
    Ready(Arc<KnowledgeBase>),
}

/// Owns the knowledge base and its build-once transition.
pub struct KnowledgeCache {
    corpus: Arc<Corpus>,
    provider: Arc<dyn EmbeddingProvider>,
    state: Mutex<CacheState>,
}

impl KnowledgeCache {
    pub fn new(corpus: Arc<Corpus>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            corpus,
            provider,
            state: Mutex::new(CacheState::Empty),
        }
    }

    /// Return the ready knowledge base, building it first if necessary.
    ///
    /// Concurrent callers that observe an in-flight build wait for it
    /// instead of starting another; exactly one batch embedding call is
    /// made per successful build.
    pub async fn get(self: &Arc<Self>) -> Result<Arc<KnowledgeBase>> {
        let mut rx = {
            let mut state = self.state.lock().unwrap();
            match &*state {
                CacheState::Ready(kb) => return Ok(kb.clone()),
                CacheState::Building(rx) => rx.clone(),
                CacheState::Empty => {
                    let (tx, rx) = watch::channel(None);
                    *state = CacheState::Building(rx.clone());

                    let cache = Arc::clone(self);
                    tokio::spawn(async move {
                        let outcome = match cache.build().await {
                            Ok(kb) => {
                                let mut state = cache.state.lock().unwrap();
                                *state = CacheState::Ready(kb.clone());
                                Ok(kb)
                            }
                            Err(e) => {
                                // Reset so the next request can retry.
                                let mut state = cache.state.lock().unwrap();
                                *state = CacheState::Empty;
                                Err(e.to_string())
                            }
                        };
                        let _ = tx.send(Some(outcome));
                    });

                    rx
                }
            }
        };

        loop {
            let outcome = rx.borrow_and_update().clone();
            if let Some(outcome) = outcome {
                return outcome.map_err(|e| anyhow::anyhow!("Knowledge base build failed: {}", e));
            }
            if rx.changed().await.is_err() {
                // Builder task died without reporting. Unstick the state
                // so a later request can start over.
                let mut state = self.state.lock().unwrap();
                if let CacheState::Building(stored) = &*state {
                    if stored.has_changed().is_err() {
                        *state = CacheState::Empty;
                    }
                }
                bail!("Knowledge base build aborted");
            }
        }
    }

    /// Run one build: chunk the corpus, embed every chunk content in a
    /// single batch call, and zip chunk and vector by index.
    async fn build(&self) -> Result<Arc<KnowledgeBase>> {
        let chunks = build_chunks(&self.corpus);
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();

        let vectors = self.provider.embed_many(&texts).await?;

        if vectors.len() != chunks.len() {
            bail!(
                "Embedding provider returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }
        if let Some(first) = vectors.first() {
            let dims = first.len();
            if vectors.iter().any(|v| v.len() != dims) {
                bail!("Embedding provider returned vectors of mixed dimensions");
            }
        }

        let embedded: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
            .collect();

        println!(
            "knowledge base ready: {} chunks ({})",
            embedded.len(),
            self.provider.model_name()
        );

        Ok(Arc::new(KnowledgeBase { chunks: embedded }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingProvider {
        batch_calls: AtomicUsize,
        fail_first: AtomicUsize,
    }

    impl CountingProvider {
        fn new(failures: usize) -> Self {
            Self {
                batch_calls: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(failures),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn model_name(&self) -> &str {
            "counting-test"
        }

        async fn embed_one(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            // Hold the build open long enough for late arrivals to attach.
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                bail!("simulated embedding outage");
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn test_corpus() -> Arc<Corpus> {
        Arc::new(
            serde_json::from_str(
                r#"{
                    "profile": { "name": "Alice" },
                    "projects": [{ "title": "folio" }, { "title": "orbit" }]
                }"#,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_concurrent_cold_start_builds_once() {
        let provider = Arc::new(CountingProvider::new(0));
        let cache = Arc::new(KnowledgeCache::new(test_corpus(), provider.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get().await }));
        }

        let mut snapshots = Vec::new();
        for handle in handles {
            snapshots.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 1);
        for kb in &snapshots {
            assert!(Arc::ptr_eq(kb, &snapshots[0]));
        }
        assert_eq!(snapshots[0].len(), 3); // bio + two projects
    }

    #[tokio::test]
    async fn test_ready_snapshot_is_reused() {
        let provider = Arc::new(CountingProvider::new(0));
        let cache = Arc::new(KnowledgeCache::new(test_corpus(), provider.clone()));

        let first = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_build_resets_and_retries() {
        let provider = Arc::new(CountingProvider::new(1));
        let cache = Arc::new(KnowledgeCache::new(test_corpus(), provider.clone()));

        let err = cache.get().await.unwrap_err();
        assert!(err.to_string().contains("simulated embedding outage"));

        // No manual reset needed — the next call builds fresh.
        let kb = cache.get().await.unwrap();
        assert_eq!(kb.len(), 3);
        assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_waiters_share_failure_then_retry_succeeds() {
        let provider = Arc::new(CountingProvider::new(1));
        let cache = Arc::new(KnowledgeCache::new(test_corpus(), provider.clone()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get().await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }
        // All four waiters shared the single failed attempt.
        assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 1);

        assert!(cache.get().await.is_ok());
        assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dims_consistent() {
        let provider = Arc::new(CountingProvider::new(0));
        let cache = Arc::new(KnowledgeCache::new(test_corpus(), provider));
        let kb = cache.get().await.unwrap();
        assert_eq!(kb.dims(), Some(2));
        assert!(kb.chunks.iter().all(|c| c.embedding.len() == 2));
    }
}
