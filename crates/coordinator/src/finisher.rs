//! Bounded execution of backend commit/abort calls
//!
//! Each transaction owns a [`BoundedFinisher`]. Work submitted to it runs
//! on the runtime's blocking pool, but never more than
//! `max_finishing_concurrency` calls of the same transaction at once.
//! Independent transactions have independent permits.

use crate::error::{CoordinatorError, Result};
use federate_common::CatalogName;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Result handle for asynchronous commit/abort work
///
/// Dropping the handle detaches the work; it never cancels it.
pub struct CompletionHandle {
    inner: Completion,
}

enum Completion {
    Ready(Option<Result<()>>),
    Spawned(JoinHandle<Result<()>>),
}

impl CompletionHandle {
    pub(crate) fn ready(result: Result<()>) -> Self {
        Self {
            inner: Completion::Ready(Some(result)),
        }
    }

    pub(crate) fn spawned(handle: JoinHandle<Result<()>>) -> Self {
        Self {
            inner: Completion::Spawned(handle),
        }
    }

    /// True once the result is available without waiting
    pub fn is_finished(&self) -> bool {
        match &self.inner {
            Completion::Ready(_) => true,
            Completion::Spawned(handle) => handle.is_finished(),
        }
    }
}

impl Future for CompletionHandle {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            Completion::Ready(result) => Poll::Ready(result.take().unwrap_or_else(|| {
                Err(CoordinatorError::Finisher(
                    "completion polled after it resolved".to_string(),
                ))
            })),
            Completion::Spawned(handle) => Pin::new(handle).poll(cx).map(|joined| {
                joined.unwrap_or_else(|e| Err(CoordinatorError::Finisher(e.to_string())))
            }),
        }
    }
}

/// Capped-concurrency executor scoped to one transaction
#[derive(Clone)]
pub struct BoundedFinisher {
    runtime: Handle,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl BoundedFinisher {
    pub fn new(runtime: Handle, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            runtime,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    /// Run a blocking backend call once a permit is free
    pub fn submit<F>(&self, work: F) -> CompletionHandle
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let permits = self.permits.clone();
        let runtime = self.runtime.clone();

        CompletionHandle::spawned(self.runtime.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| CoordinatorError::Finisher("finisher was closed".to_string()))?;

            runtime
                .spawn_blocking(work)
                .await
                .map_err(|e| CoordinatorError::Finisher(e.to_string()))?
        }))
    }

    /// Backend calls currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.max_concurrency - self.permits.available_permits()
    }
}

/// Wait for every task, keeping each catalog's outcome
pub(crate) async fn join_all(
    tasks: Vec<(CatalogName, CompletionHandle)>,
) -> Vec<(CatalogName, Result<()>)> {
    let (catalogs, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let results = futures::future::join_all(handles).await;
    catalogs.into_iter().zip(results).collect()
}
