use crate::{Result, Runnable};

/// The thread pool abstraction.
///
/// An executor accepts [`Runnable`]s and runs them on execution contexts it
/// owns. Which context runs a given runnable, and when, is up to the
/// implementation.
///
/// ## See Also
/// - [`RoundRobinExecutor`](crate::RoundRobinExecutor)
pub trait Executor {
    /// Hands `runnable` to the executor.
    ///
    /// May block while the executor applies backpressure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`](crate::Error::Shutdown) once the executor
    /// no longer accepts work.
    fn execute(&self, runnable: Box<dyn Runnable>) -> Result<()>;

    /// Stops every execution context and waits for them to exit.
    ///
    /// Calling `shutdown` again after it returned is a no-op.
    fn shutdown(&self) -> Result<()>;

    /// Convenience wrapper around [`Self::execute`] that boxes `runnable`.
    fn spawn<R>(&self, runnable: R) -> Result<()>
    where
        R: Runnable,
        Self: Sized,
    {
        self.execute(Box::new(runnable))
    }
}

impl<E> Executor for std::sync::Arc<E>
where
    E: Executor + ?Sized,
{
    fn execute(&self, runnable: Box<dyn Runnable>) -> Result<()> {
        (**self).execute(runnable)
    }

    fn shutdown(&self) -> Result<()> {
        (**self).shutdown()
    }
}
