/// A unit of work with a single execution entry point.
///
/// A runnable is built by the caller, moved into an executor on submission,
/// and from then on owned by whichever worker dequeues it. `run` consumes the
/// runnable, so each one executes at most once.
///
/// `run` has no return value and no error channel of its own. Work that needs
/// to report an outcome does so through a [`Promise`](crate::Promise), which
/// [`Task`](crate::Task) and [`Callable`](crate::Callable) wire up.
///
/// Any `FnOnce() + Send + 'static` closure is a runnable:
///
/// ```
/// use rotary::Runnable;
///
/// let job: Box<dyn Runnable> = Box::new(|| println!("hello from a worker"));
/// job.run();
/// ```
pub trait Runnable: Send + 'static {
    /// Executes the work.
    fn run(self: Box<Self>);
}

impl<F> Runnable for F
where
    F: FnOnce() + Send + 'static,
{
    #[inline]
    fn run(self: Box<Self>) {
        (*self)()
    }
}
