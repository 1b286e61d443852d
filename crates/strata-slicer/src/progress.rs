//! Progress notifications.

/// Stage of a job being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Layers are being planned and written.
    Export,
    /// The job is complete.
    Finish,
}

/// Receives `(stage, completed, total)` notifications. Fire and forget.
pub trait Progress {
    /// Report progress.
    fn report(&mut self, stage: Stage, completed: usize, total: usize);
}

/// Progress sink that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&mut self, _stage: Stage, _completed: usize, _total: usize) {}
}

impl<F> Progress for F
where
    F: FnMut(Stage, usize, usize),
{
    fn report(&mut self, stage: Stage, completed: usize, total: usize) {
        self(stage, completed, total)
    }
}
