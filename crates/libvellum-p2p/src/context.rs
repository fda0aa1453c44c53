//! Cancellation contexts
//!
//! A [`Context`] is a cloneable cancellation signal built on a tokio `watch`
//! channel. Children observe their parent: cancelling a parent cancels every
//! context derived from it, while cancelling a child leaves the parent alone.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug)]
struct Inner {
    tx: watch::Sender<bool>,
    parent: Option<Context>,
    deadline: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// Root context, cancelled only explicitly
    pub fn new() -> Self {
        Self::build(None, None)
    }

    fn build(parent: Option<Context>, deadline: Option<Instant>) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                tx,
                parent,
                deadline,
            }),
        }
    }

    /// Context cancelled with this one, or on its own
    pub fn child(&self) -> Self {
        Self::build(Some(self.clone()), None)
    }

    /// Child context that also cancels once `timeout` elapses
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self::build(Some(self.clone()), Some(Instant::now() + timeout))
    }

    pub fn cancel(&self) {
        self.inner.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        if *self.inner.tx.borrow() {
            return true;
        }
        if let Some(deadline) = self.inner.deadline {
            if Instant::now() >= deadline {
                return true;
            }
        }
        self.inner
            .parent
            .as_ref()
            .map(|p| p.is_cancelled())
            .unwrap_or(false)
    }

    /// Resolves once the context is cancelled
    pub fn cancelled(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if self.is_cancelled() {
                return;
            }
            let mut rx = self.inner.tx.subscribe();
            let own = async {
                let _ = rx.wait_for(|cancelled| *cancelled).await;
            };
            let parent = async {
                match &self.inner.parent {
                    Some(parent) => parent.cancelled().await,
                    None => std::future::pending::<()>().await,
                }
            };
            let deadline = async {
                match self.inner.deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = own => {}
                _ = parent => {}
                _ = deadline => {}
            }
        })
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
