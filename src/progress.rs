//! Coarse progress reporting for long slicing jobs.

use std::sync::Mutex;

/// Receives the overall percentage, 0.0 to 100.0.
pub type ProgressCallback = Box<dyn Fn(f32) + Send + Sync>;

#[derive(Default)]
struct ProgressState {
    steps_done: i32,
    step_parts: u32,
    parts_done: u32,
}

/// Tracks a fixed number of pipeline steps, each split into a number of
/// parts (usually one per layer). Workers report part completion from any
/// thread; the internal lock serializes the callback so it never observes
/// torn counters.
pub struct Progressor {
    step_count: u32,
    state: Mutex<ProgressState>,
    callback: ProgressCallback,
}

impl Progressor {
    pub fn new(step_count: u32, callback: ProgressCallback) -> Self {
        Self {
            step_count,
            state: Mutex::new(ProgressState {
                steps_done: -1,
                step_parts: 0,
                parts_done: 0,
            }),
            callback,
        }
    }

    /// A progressor that reports to nobody.
    pub fn silent(step_count: u32) -> Self {
        Self::new(step_count, Box::new(|_| {}))
    }

    /// Advance to the next major step, which consists of `parts` parts.
    pub fn start_next_step(&self, parts: u32) {
        let progress = {
            let mut state = self.state.lock().expect("progress lock poisoned");
            state.steps_done += 1;
            state.step_parts = parts;
            state.parts_done = 0;
            self.percentage(&state)
        };
        (self.callback)(progress);
    }

    /// Mark one part of the current step as finished.
    pub fn complete_step_part(&self) {
        let progress = {
            let mut state = self.state.lock().expect("progress lock poisoned");
            state.parts_done += 1;
            self.percentage(&state)
        };
        (self.callback)(progress);
    }

    fn percentage(&self, state: &ProgressState) -> f32 {
        if self.step_count == 0 {
            return 100.0;
        }

        let steps = self.step_count as f32;
        let mut progress = state.steps_done.max(0) as f32 / steps * 100.0;
        if state.step_parts != 0 {
            progress += (state.parts_done as f32 / state.step_parts as f32) / steps * 100.0;
        }
        progress
    }
}
