use std::cell::RefCell;
use std::time::Instant;

use esh_transform::Framework;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Transforming,
    CheckingCache,
    LoadingCachedResult,
    Solving,
    Normalizing,
    SavingResults,
    Comparing,
    Completed,
}

#[derive(Debug, Clone)]
pub struct RunProgressEvent {
    /// `None` for stages spanning every framework.
    pub framework: Option<Framework>,
    pub stage: RunStage,
    pub elapsed_wall_s: f64,
    pub message: Option<String>,
}

impl RunProgressEvent {
    pub fn stage(
        framework: Option<Framework>,
        stage: RunStage,
        elapsed_wall_s: f64,
        message: Option<String>,
    ) -> Self {
        Self {
            framework,
            stage,
            elapsed_wall_s,
            message,
        }
    }
}

/// Optional progress callback together with the run's start time.
///
/// Shared by the solves of one run, which are driven on the same task.
pub(crate) struct Reporter<'a> {
    callback: Option<RefCell<&'a mut dyn FnMut(RunProgressEvent)>>,
    started: Instant,
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(callback: Option<&'a mut dyn FnMut(RunProgressEvent)>) -> Self {
        Self {
            callback: callback.map(RefCell::new),
            started: Instant::now(),
        }
    }

    pub(crate) fn elapsed_s(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub(crate) fn emit(&self, framework: Option<Framework>, stage: RunStage, message: impl Into<String>) {
        let elapsed = self.elapsed_s();
        if let Some(cb) = &self.callback {
            let mut callback = cb.borrow_mut();
            (**callback)(RunProgressEvent::stage(framework, stage, elapsed, Some(message.into())));
        }
    }
}
