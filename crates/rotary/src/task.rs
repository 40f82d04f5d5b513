use crate::{Completion, Promise, Runnable, promise};
use core::fmt;

/// A runnable that applies a function to a stored argument and may publish
/// one result.
///
/// The wrapped function receives the argument and the task's [`Promise`]. It
/// decides whether and what to publish; failures inside it are its own to
/// report through the promise. [`Runnable::run`] itself never fails.
///
/// ## See Also
/// - [`Callable`](crate::Callable) for work that only signals success or
///   failure.
pub struct Task<F, A, T> {
    work: F,
    arg: A,
    promise: Promise<T>,
}

impl<F, A, T> Task<F, A, T>
where
    F: FnOnce(A, Promise<T>) + Send + 'static,
    A: Send + 'static,
    T: Send + 'static,
{
    /// Creates a new [`Task`] and the [`Completion`] its submitter can wait
    /// on.
    ///
    /// # Example
    /// ```
    /// use rotary::{Runnable, Task};
    ///
    /// let (task, completion) = Task::new(|n: u64, out| { out.publish(n * 2); }, 21);
    /// Box::new(task).run();
    /// assert_eq!(completion.wait().unwrap(), 42);
    /// ```
    pub fn new(work: F, arg: A) -> (Self, Completion<T>) {
        let (promise, completion) = promise();
        (Self { work, arg, promise }, completion)
    }
}

impl<A, T> Task<(), A, T>
where
    A: Send + 'static,
    T: Send + 'static,
{
    /// Creates a task whose function always publishes its return value.
    ///
    /// # Example
    /// ```
    /// use rotary::{Runnable, Task};
    ///
    /// let (task, completion) = Task::from_fn(|s: &'static str| s.len(), "rotary");
    /// Box::new(task).run();
    /// assert_eq!(completion.wait().unwrap(), 6);
    /// ```
    pub fn from_fn<G>(
        work: G,
        arg: A,
    ) -> (
        Task<impl FnOnce(A, Promise<T>) + Send + 'static, A, T>,
        Completion<T>,
    )
    where
        G: FnOnce(A) -> T + Send + 'static,
    {
        Task::new(
            move |arg, promise: Promise<T>| {
                promise.publish(work(arg));
            },
            arg,
        )
    }
}

impl<F, A, T> Runnable for Task<F, A, T>
where
    F: FnOnce(A, Promise<T>) + Send + 'static,
    A: Send + 'static,
    T: Send + 'static,
{
    fn run(self: Box<Self>) {
        let Self { work, arg, promise } = *self;
        work(arg, promise);
    }
}

impl<F, A: fmt::Debug, T> fmt::Debug for Task<F, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("arg", &self.arg)
            .field("promise", &self.promise)
            .finish_non_exhaustive()
    }
}
