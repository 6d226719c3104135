use tracing::{error, warn};

use super::{CoordinatorError, StepError};

type Action<'a> = Box<dyn FnOnce() -> Result<(), StepError> + 'a>;

/// One write of a multi-write operation, with the action that undoes it.
pub struct Step<'a> {
    name: &'static str,
    forward: Action<'a>,
    compensate: Option<Action<'a>>,
}

impl<'a> Step<'a> {
    pub fn new(name: &'static str, forward: impl FnOnce() -> Result<(), StepError> + 'a) -> Self {
        Self {
            name,
            forward: Box::new(forward),
            compensate: None,
        }
    }

    pub fn compensate_with(mut self, compensate: impl FnOnce() -> Result<(), StepError> + 'a) -> Self {
        self.compensate = Some(Box::new(compensate));
        self
    }
}

/// Runs steps in order. When step *k* fails, the compensations of steps
/// `0..k` run newest first and the step's own error is returned.
#[derive(Default)]
pub struct Compensator<'a> {
    steps: Vec<Step<'a>>,
}

impl<'a> Compensator<'a> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn step(mut self, step: Step<'a>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn run(self) -> Result<(), CoordinatorError> {
        let mut applied: Vec<(&'static str, Option<Action<'a>>)> = Vec::with_capacity(self.steps.len());
        for step in self.steps {
            match (step.forward)() {
                Ok(()) => applied.push((step.name, step.compensate)),
                Err(source) => return Err(unwind(step.name, source, applied)),
            }
        }
        Ok(())
    }
}

fn unwind(failed: &'static str, source: StepError, applied: Vec<(&'static str, Option<Action<'_>>)>) -> CoordinatorError {
    let mut first_failure = None;
    for (name, compensate) in applied.into_iter().rev() {
        let Some(compensate) = compensate else {
            warn!(failed_step = failed, step = name, "no compensation for applied step; left for reconciliation");
            continue;
        };
        if let Err(compensation) = compensate() {
            error!(
                inconsistency = true,
                failed_step = failed,
                compensation_step = name,
                cause = %source,
                error = %compensation,
                "compensation failed"
            );
            first_failure.get_or_insert((name, compensation));
        }
    }

    match first_failure {
        Some((compensation_step, compensation)) => CoordinatorError::Inconsistent {
            step: failed,
            source,
            compensation_step,
            compensation,
        },
        None => CoordinatorError::Step { step: failed, source },
    }
}
