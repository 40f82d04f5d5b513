use crate::{Completion, Promise, Runnable, promise};
use core::fmt;

/// Boxed error type used by [`Callable`] when no concrete error is named.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The completion signal of a [`Callable`]: `Ok(())` on success, `Err(e)` on
/// failure.
pub type Signal<E = BoxError> = Result<(), E>;

/// A runnable that may publish a single success-or-failure signal.
///
/// The wrapped function receives the callable's [`Promise`]. Publishing
/// `Ok(())` reports success, publishing `Err(e)` reports failure, and not
/// publishing at all is a valid terminal state: the submitter then observes
/// [`Error::Abandoned`](crate::Error::Abandoned).
///
/// # Example
/// ```
/// use rotary::{Callable, Runnable};
///
/// let (callable, done) = Callable::<_, std::io::Error>::new(|signal| {
///     signal.publish(Ok(()));
/// });
/// Box::new(callable).run();
/// assert!(done.wait().unwrap().is_ok());
/// ```
pub struct Callable<F, E = BoxError> {
    work: F,
    promise: Promise<Signal<E>>,
}

impl<F, E> Callable<F, E>
where
    F: FnOnce(Promise<Signal<E>>) + Send + 'static,
    E: Send + 'static,
{
    /// Creates a new [`Callable`] and the [`Completion`] to wait on.
    pub fn new(work: F) -> (Self, Completion<Signal<E>>) {
        let (promise, completion) = promise();
        (Self { work, promise }, completion)
    }
}

impl<E> Callable<(), E>
where
    E: Send + 'static,
{
    /// Creates a callable that publishes whatever `work` returns.
    ///
    /// # Example
    /// ```
    /// use rotary::{BoxError, Callable, Runnable};
    ///
    /// let (callable, done) = Callable::from_fn(|| -> Result<(), BoxError> {
    ///     Err("disk full".into())
    /// });
    /// Box::new(callable).run();
    /// assert_eq!(done.wait().unwrap().unwrap_err().to_string(), "disk full");
    /// ```
    pub fn from_fn<G>(
        work: G,
    ) -> (
        Callable<impl FnOnce(Promise<Signal<E>>) + Send + 'static, E>,
        Completion<Signal<E>>,
    )
    where
        G: FnOnce() -> Signal<E> + Send + 'static,
    {
        Callable::new(move |promise: Promise<Signal<E>>| {
            promise.publish(work());
        })
    }
}

impl<F, E> Runnable for Callable<F, E>
where
    F: FnOnce(Promise<Signal<E>>) + Send + 'static,
    E: Send + 'static,
{
    fn run(self: Box<Self>) {
        let Self { work, promise } = *self;
        work(promise);
    }
}

impl<F, E> fmt::Debug for Callable<F, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("promise", &self.promise)
            .finish_non_exhaustive()
    }
}
