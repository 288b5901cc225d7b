/// Receives progress updates while a streamed response is consumed.
pub trait ProgressReporter: Send + Sync {
    /// Absolute position out of `total`.
    fn report(&self, position: u64, total: u64);
}

/// Discards all progress updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _position: u64, _total: u64) {}
}

impl<F> ProgressReporter for F
where
    F: Fn(u64, u64) + Send + Sync,
{
    fn report(&self, position: u64, total: u64) {
        self(position, total);
    }
}
