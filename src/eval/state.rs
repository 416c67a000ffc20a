/// Mutable evaluation state for a single run. Created fresh by every `run` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgramState {
    /// Seconds elapsed since the day's start hour.
    pub(crate) now: u64,
    /// Current `Invoke` nesting.
    pub(crate) depth: usize,
}

impl ProgramState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}
