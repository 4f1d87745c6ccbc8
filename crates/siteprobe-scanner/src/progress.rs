//! Scan progress bands.
//!
//! `0..setup` covers session setup and navigation. The rest of the range is
//! split evenly across the enabled modules. 100 is reserved for completion.

/// Highest value reported before the scan completes.
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// Tracks progress for one scan. Values never decrease.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    setup: u8,
    total_modules: usize,
    finished_modules: usize,
    current: u8,
}

impl ProgressTracker {
    /// `setup` is the checkpoint reached once navigation succeeds.
    #[must_use]
    pub fn new(setup: u8, total_modules: usize) -> Self {
        Self {
            setup: setup.min(MAX_RUNNING_PROGRESS),
            total_modules,
            finished_modules: 0,
            current: 0,
        }
    }

    #[must_use]
    pub fn current(&self) -> u8 {
        self.current
    }

    /// Navigation finished.
    pub fn setup_complete(&mut self) -> u8 {
        self.advance(self.setup)
    }

    /// One more module finished, successfully or not.
    pub fn module_finished(&mut self) -> u8 {
        self.finished_modules = (self.finished_modules + 1).min(self.total_modules);
        let band = usize::from(100 - self.setup);
        let gained = band * self.finished_modules / self.total_modules.max(1);
        let target = usize::from(self.setup) + gained;
        self.advance(u8::try_from(target).unwrap_or(MAX_RUNNING_PROGRESS).min(MAX_RUNNING_PROGRESS))
    }

    /// Scan completed.
    pub fn complete(&mut self) -> u8 {
        self.current = 100;
        self.current
    }

    fn advance(&mut self, target: u8) -> u8 {
        self.current = self.current.max(target);
        self.current
    }
}
