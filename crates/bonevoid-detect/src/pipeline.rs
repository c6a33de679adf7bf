use std::ops::ControlFlow;

use crate::error::DetectError;

/// A detector that runs as a fixed sequence of steps.
///
/// Each call to [`StepPipeline::execute_next_step`] runs exactly one step and
/// hands control back to the caller, which may report progress or stop
/// calling to cancel the run.
pub trait StepPipeline {
    /// Total number of steps.
    fn step_count(&self) -> usize;

    /// Number of completed steps, in `[0, step_count]`.
    fn current_step(&self) -> usize;

    /// Whether every step has run.
    fn is_complete(&self) -> bool {
        self.current_step() == self.step_count()
    }

    /// Completed fraction of the pipeline, in `[0, 1]`.
    fn progress(&self) -> f32 {
        match self.step_count() {
            0 => 1.0,
            total => self.current_step() as f32 / total as f32,
        }
    }

    /// Run the next step.
    ///
    /// Returns `Ok(true)` when a step ran and `Ok(false)` once the pipeline is
    /// complete; further calls have no effect. On error the pipeline goes back
    /// to its first step and drops its intermediate volumes.
    fn execute_next_step(&mut self) -> Result<bool, DetectError>;
}

/// Drive a pipeline until it completes or the callback asks to stop.
///
/// `on_progress` is called after every step with the number of completed
/// steps and the total; returning [`ControlFlow::Break`] cancels the run
/// between two steps.
///
/// Returns `Ok(true)` if the pipeline completed and `Ok(false)` if it was
/// cancelled.
pub fn run_to_completion<P>(
    pipeline: &mut P,
    mut on_progress: impl FnMut(usize, usize) -> ControlFlow<()>,
) -> Result<bool, DetectError>
where
    P: StepPipeline + ?Sized,
{
    while pipeline.execute_next_step()? {
        if on_progress(pipeline.current_step(), pipeline.step_count()).is_break() {
            log::info!(
                "pipeline cancelled after step {} of {}",
                pipeline.current_step(),
                pipeline.step_count()
            );
            return Ok(false);
        }
    }
    Ok(true)
}
