use crate::error::JobError;

/// Work executed on a pool worker thread.
///
/// Each worker owns exactly one processor for its whole lifetime, so `&mut self`
/// is free to carry scratch buffers between jobs. Processors never cross
/// threads after the pool starts, which is why only `Send` is required.
///
/// Returning `Err` (or panicking) resolves the job with
/// [`Outcome::Error`](super::Outcome::Error); the worker keeps running.
pub trait JobProcessor<In, Out>: Send {
    fn process(&mut self, input: In) -> Result<Out, JobError>;
}

impl<In, Out, F> JobProcessor<In, Out> for F
where
    F: FnMut(In) -> Result<Out, JobError> + Send,
{
    fn process(&mut self, input: In) -> Result<Out, JobError> {
        self(input)
    }
}
