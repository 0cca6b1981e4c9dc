//! Deferred Render-Thread Work
//!
//! Code running off the render thread never touches GPU state. It sends a
//! closure through a [`RenderThreadHandle`] instead; the closure runs when the
//! render thread drains the queue at the frame boundary, and the sender waits
//! on the returned [`Completion`] if it needs the result.
//!
//! ```text
//!  worker thread                        render thread
//!  ─────────────                        ─────────────
//!  handle.submit(f) ──► flume ──┐
//!       │                       └──► end_frame(): drain ─► f(&mut ctx)
//!  completion.wait() ◄──────── bounded(1) ◄──────────────────┘
//! ```
//!
//! If the context is torn down first, queued closures are dropped unrun and
//! their waiters observe [`Error::ContextLost`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::errors::{Error, Result};

/// A closure queued for the render thread.
pub type Action<C> = Box<dyn FnOnce(&mut C) + Send>;

// ─── Cancellation ─────────────────────────────────────────────────────────────

/// Cooperative cancellation flag shared between a worker and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancelled, for use with `?` between worker steps.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ─── Completion ───────────────────────────────────────────────────────────────

/// The eventual result of deferred work.
#[must_use = "a completion does nothing unless waited on"]
pub struct Completion<T> {
    rx: flume::Receiver<Result<T>>,
}

impl<T> Completion<T> {
    fn ready(result: Result<T>) -> Self {
        let (tx, rx) = flume::bounded(1);
        let _ = tx.send(result);
        Self { rx }
    }

    /// Blocks until the work has run (or can no longer run).
    ///
    /// Never call this on the render thread: the queue only drains there.
    pub fn wait(self) -> Result<T> {
        self.rx.recv().unwrap_or(Err(Error::ContextLost))
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(flume::RecvTimeoutError::Timeout) => None,
            Err(flume::RecvTimeoutError::Disconnected) => Some(Err(Error::ContextLost)),
        }
    }

    /// Awaits the result without blocking a thread.
    pub async fn wait_async(self) -> Result<T> {
        self.rx.recv_async().await.unwrap_or(Err(Error::ContextLost))
    }

    /// The result if it is already available.
    pub fn try_get(&self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(flume::TryRecvError::Empty) => None,
            Err(flume::TryRecvError::Disconnected) => Some(Err(Error::ContextLost)),
        }
    }
}

// ─── Queue ────────────────────────────────────────────────────────────────────

/// The render-thread end of the deferred action list.
pub struct DeferredQueue<C> {
    tx: flume::Sender<Action<C>>,
    rx: flume::Receiver<Action<C>>,
    alive: Arc<AtomicBool>,
}

impl<C: 'static> DeferredQueue<C> {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            tx,
            rx,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    #[must_use]
    pub fn handle(&self) -> RenderThreadHandle<C> {
        RenderThreadHandle {
            tx: self.tx.clone(),
            alive: Arc::clone(&self.alive),
        }
    }

    /// Removes and returns everything queued so far. Work queued while these
    /// run waits for the next drain.
    #[must_use]
    pub fn take_pending(&self) -> Vec<Action<C>> {
        self.rx.drain().collect()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Marks the owner as gone and drops all queued work unrun.
    pub fn shutdown(&self) {
        self.alive.store(false, Ordering::Release);
        let dropped = self.rx.drain().count();
        if dropped > 0 {
            log::debug!("Deferred queue shut down with {dropped} pending actions");
        }
    }
}

impl<C: 'static> Default for DeferredQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// `Send + Clone` handle for queueing work onto the render thread.
pub struct RenderThreadHandle<C> {
    tx: flume::Sender<Action<C>>,
    alive: Arc<AtomicBool>,
}

impl<C> Clone for RenderThreadHandle<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            alive: Arc::clone(&self.alive),
        }
    }
}

impl<C: 'static> RenderThreadHandle<C> {
    /// `false` once the owning context has been torn down.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Queues `work` for the next frame boundary.
    pub fn submit<T, F>(&self, work: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut C) -> Result<T> + Send + 'static,
    {
        self.enqueue(None, work)
    }

    /// Like [`submit`](Self::submit), but skips the work (yielding
    /// [`Error::Cancelled`]) if `token` is set at submission or right before
    /// it would run.
    pub fn submit_unless_cancelled<T, F>(&self, token: &CancellationToken, work: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut C) -> Result<T> + Send + 'static,
    {
        if token.is_cancelled() {
            return Completion::ready(Err(Error::Cancelled));
        }
        self.enqueue(Some(token.clone()), work)
    }

    fn enqueue<T, F>(&self, token: Option<CancellationToken>, work: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut C) -> Result<T> + Send + 'static,
    {
        if !self.is_alive() {
            return Completion::ready(Err(Error::ContextLost));
        }

        let (done_tx, done_rx) = flume::bounded(1);
        let alive = Arc::clone(&self.alive);
        let action: Action<C> = Box::new(move |ctx: &mut C| {
            let result = if !alive.load(Ordering::Acquire) {
                Err(Error::ContextLost)
            } else if token.as_ref().is_some_and(CancellationToken::is_cancelled) {
                Err(Error::Cancelled)
            } else {
                work(ctx)
            };
            let _ = done_tx.send(result);
        });

        if self.tx.send(action).is_err() {
            return Completion::ready(Err(Error::ContextLost));
        }
        Completion { rx: done_rx }
    }
}

// ─── Workers ──────────────────────────────────────────────────────────────────

/// Runs `work` on a named background thread. An `Err` result is logged and
/// ends only that worker.
pub fn spawn_worker<F>(name: &str, work: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let thread_name = name.to_string();
    let handle = std::thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            if let Err(err) = work() {
                log::error!("Worker '{thread_name}' failed: {err}");
            }
        })?;
    Ok(handle)
}
