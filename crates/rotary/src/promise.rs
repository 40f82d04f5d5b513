//! One-shot result channels shared between a runnable and its submitter.
//!
//! Every [`Task`](crate::Task) and [`Callable`](crate::Callable) is created
//! together with a channel pair:
//!
//! - [`Promise`] is moved into the runnable and written at most once by the
//!   wrapped function.
//! - [`Completion`] is handed back to the submitter, who may block on it,
//!   poll it, or `.await` it.
//!
//! Publishing never blocks: if the submitter stopped listening (for example
//! after its own timeout fired) the value is simply discarded. Worker liveness
//! therefore never depends on how attentive the caller is.
//!
//! If the promise is dropped without publishing, the completion resolves to
//! [`Error::Abandoned`]. That covers both a function that chose not to
//! publish and a runnable that was discarded, still queued, at shutdown.

use crate::{Error, Result};
use core::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::oneshot;

/// Creates a connected [`Promise`] / [`Completion`] pair.
pub fn promise<T>() -> (Promise<T>, Completion<T>) {
    let (tx, rx) = oneshot::channel();
    (Promise { tx }, Completion { rx })
}

/// The write side of a one-shot channel.
pub struct Promise<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Promise<T> {
    /// Publishes `value` to the paired [`Completion`].
    ///
    /// Returns `false` if the completion was already dropped, in which case
    /// `value` is discarded. Never blocks.
    pub fn publish(self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }

    /// Returns `true` if nobody is listening for the value anymore.
    ///
    /// Long-running work can use this to stop early once its submitter gave
    /// up.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}

/// The read side of a one-shot channel.
///
/// Resolves to the published value, or to [`Error::Abandoned`] once the
/// paired [`Promise`] is gone without a value.
pub struct Completion<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Completion<T> {
    /// Blocks the current thread until a value is published or the promise is
    /// dropped.
    ///
    /// There is no built-in timeout. Callers that need bounded waiting should
    /// `.await` the completion under their own timer instead.
    pub fn wait(self) -> Result<T> {
        futures::executor::block_on(self)
    }

    /// Returns the value if one has been published, without blocking.
    ///
    /// - `Ok(Some(value))`: the value was published (and is now taken).
    /// - `Ok(None)`: nothing has been published yet.
    /// - `Err(Error::Abandoned)`: the promise was dropped without publishing,
    ///   or the value was already taken.
    pub fn try_take(&mut self) -> Result<Option<T>> {
        match self.rx.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(Error::Abandoned),
        }
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| Error::Abandoned))
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}
