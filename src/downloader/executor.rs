// FetchExecutor - concurrent fetches, one transfer per (resource, representation)
//
// Every task of a run() is submitted before any is awaited. A task whose
// key is already in flight attaches to the running transfer instead of
// starting its own; the in-flight table is the only state shared between
// workers and sits behind a mutex.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::errors::FetchError;
use super::models::{FetchEvent, FetchKey, FetchSource, FetchState, FetchTask};
use super::traits::{ExtractionCapability, ProgressEmitter, ThumbnailProbe};

type FetchOutcome = Result<PathBuf, FetchError>;
type SharedFetch = Shared<BoxFuture<'static, Arc<TransferOutcome>>>;

/// Result of one transfer plus the copies made for attached tasks
#[derive(Debug)]
struct TransferOutcome {
    result: FetchOutcome,
    copies: HashMap<Uuid, FetchOutcome>,
}

impl TransferOutcome {
    fn failed(error: FetchError) -> Self {
        Self {
            result: Err(error),
            copies: HashMap::new(),
        }
    }

    fn result_for(&self, task: Uuid) -> FetchOutcome {
        self.copies
            .get(&task)
            .unwrap_or(&self.result)
            .clone()
    }
}

struct InFlight {
    owner: Uuid,
    destination: PathBuf,
    fetch: SharedFetch,
    /// Attached tasks that want the artifact at another path
    copies: Vec<(Uuid, PathBuf)>,
}

/// Terminal outcome of one task
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub task: FetchTask,
    pub state: FetchState,
    /// Path written for this task
    pub result: Result<PathBuf, FetchError>,
    /// Task whose transfer this one joined
    pub attached_to: Option<Uuid>,
}

impl FetchReport {
    pub fn is_done(&self) -> bool {
        self.state == FetchState::Done
    }
}

#[derive(Clone)]
pub struct FetchExecutor {
    extractor: Arc<dyn ExtractionCapability>,
    thumbnails: Arc<dyn ThumbnailProbe>,
    in_flight: Arc<Mutex<HashMap<FetchKey, InFlight>>>,
    permits: Arc<Semaphore>,
    events: Option<UnboundedSender<FetchEvent>>,
    /// Token handed to newly submitted transfers; replaced on every cancel()
    cancel: Option<Arc<Mutex<CancellationToken>>>,
}

impl FetchExecutor {
    pub fn new(
        extractor: Arc<dyn ExtractionCapability>,
        thumbnails: Arc<dyn ThumbnailProbe>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            extractor,
            thumbnails,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            events: None,
            cancel: None,
        }
    }

    pub fn with_events(mut self, events: UnboundedSender<FetchEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Enable cooperative cancellation
    pub fn with_cancellation(mut self) -> Self {
        self.cancel = Some(Arc::new(Mutex::new(CancellationToken::new())));
        self
    }

    /// Cancel the transfers submitted so far; later submissions run normally.
    /// No-op unless cancellation is enabled.
    pub fn cancel(&self) {
        if let Some(current) = &self.cancel {
            tracing::info!("[FetchExecutor] Cancellation requested");
            let mut token = current.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            token.cancel();
            *token = CancellationToken::new();
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.table().len()
    }

    /// Run `tasks` concurrently; one report per task, in input order
    pub async fn run(&self, tasks: Vec<FetchTask>) -> Vec<FetchReport> {
        let submitted: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let (fetch, attached_to) = self.submit(&task);
                (task, fetch, attached_to)
            })
            .collect();

        join_all(
            submitted
                .into_iter()
                .map(|(task, fetch, attached_to)| self.finish(task, fetch, attached_to)),
        )
        .await
    }

    fn table(&self) -> MutexGuard<'_, HashMap<FetchKey, InFlight>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_token(&self) -> Option<CancellationToken> {
        self.cancel.as_ref().map(|current| {
            current
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone()
        })
    }

    fn send(&self, event: FetchEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Start a transfer for `task`, or join the one already running for its key
    fn submit(&self, task: &FetchTask) -> (SharedFetch, Option<Uuid>) {
        let key = task.key();
        let mut table = self.table();

        if let Some(existing) = table.get_mut(&key) {
            tracing::info!("[FetchExecutor] Task {} joins in-flight fetch of {}", task.id, key);
            if existing.destination != task.destination {
                existing.copies.push((task.id, task.destination.clone()));
            }
            self.send(FetchEvent::Attached {
                task: task.id,
                to: existing.owner,
            });
            return (existing.fetch.clone(), Some(existing.owner));
        }

        self.send(FetchEvent::State {
            task: task.id,
            state: FetchState::Pending,
        });
        let token = self.current_token();
        let handle = tokio::spawn(self.clone().transfer(task.clone(), key.clone(), token));
        let fetch = async move {
            match handle.await {
                Ok(outcome) => Arc::new(outcome),
                Err(e) => Arc::new(TransferOutcome::failed(FetchError::Capability(format!(
                    "fetch worker aborted: {}",
                    e
                )))),
            }
        }
        .boxed()
        .shared();

        table.insert(
            key,
            InFlight {
                owner: task.id,
                destination: task.destination.clone(),
                fetch: fetch.clone(),
                copies: Vec::new(),
            },
        );
        (fetch, None)
    }

    /// Worker body. Copies for attached tasks are made before the key is
    /// released, so every joiner has its file before any caller sees the outcome.
    async fn transfer(self, task: FetchTask, key: FetchKey, token: Option<CancellationToken>) -> TransferOutcome {
        let result = self.transfer_inner(&task, token).await;

        let mut copies = HashMap::new();
        loop {
            let pending = {
                let mut table = self.table();
                let pending = match table.get_mut(&key) {
                    Some(f) if f.owner == task.id => std::mem::take(&mut f.copies),
                    _ => Vec::new(),
                };
                if pending.is_empty() && table.get(&key).map_or(false, |f| f.owner == task.id) {
                    table.remove(&key);
                }
                pending
            };
            if pending.is_empty() {
                break;
            }
            for (id, destination) in pending {
                let copied = match &result {
                    Ok(produced) => copy_artifact(produced, &destination).await,
                    Err(e) => Err(e.clone()),
                };
                copies.insert(id, copied);
            }
        }

        match &result {
            Ok(path) => tracing::info!("[FetchExecutor] ✓ {} -> {}", key, path.display()),
            Err(e) => tracing::warn!("[FetchExecutor] ✗ {} failed: {}", key, e),
        }
        self.send(FetchEvent::State {
            task: task.id,
            state: if result.is_ok() {
                FetchState::Done
            } else {
                FetchState::Failed
            },
        });
        TransferOutcome { result, copies }
    }

    async fn transfer_inner(&self, task: &FetchTask, token: Option<CancellationToken>) -> FetchOutcome {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FetchError::Capability("worker pool closed".to_string()))?;

        let emitter = ProgressEmitter::new(task.id, self.events.clone(), token);
        if emitter.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        self.send(FetchEvent::State {
            task: task.id,
            state: FetchState::Running,
        });

        if let Some(parent) = task.destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::disk(parent, e))?;
        }

        match &task.source {
            FetchSource::Stream { representation_id } => {
                self.extractor
                    .fetch(&task.resource_url, representation_id, &task.destination, &emitter)
                    .await?
            }
            FetchSource::Subtitle { language, format } => {
                self.extractor
                    .fetch_subtitles(&task.resource_url, language, format, &task.destination)
                    .await?
            }
            FetchSource::Thumbnail { url, .. } => self.thumbnails.fetch(url, &task.destination).await?,
        }

        Ok(task.destination.clone())
    }

    async fn finish(&self, task: FetchTask, fetch: SharedFetch, attached_to: Option<Uuid>) -> FetchReport {
        let result = fetch.await.result_for(task.id);

        if attached_to.is_some() {
            self.send(FetchEvent::State {
                task: task.id,
                state: if result.is_ok() {
                    FetchState::Done
                } else {
                    FetchState::Failed
                },
            });
        }

        FetchReport {
            state: if result.is_ok() {
                FetchState::Done
            } else {
                FetchState::Failed
            },
            task,
            result,
            attached_to,
        }
    }
}

/// Give an attached task its own copy of a shared transfer
async fn copy_artifact(from: &Path, to: &Path) -> FetchOutcome {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FetchError::disk(parent, e))?;
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| FetchError::disk(to, e))?;
    Ok(to.to_path_buf())
}
