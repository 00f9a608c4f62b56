//! Resume driver
//!
//! `resume` is the single entry point: one call executes a frame forward to
//! its next suspension, to normal completion, or to a faulted completion.
//! Fresh frames (state -1) start at the first statement; suspended frames
//! re-enter at the program point following their await by descending the
//! analysis-recorded node path, re-establishing loops, try arming, and
//! in-flight finally blocks on the way down.
//!
//! `resume` never throws to its caller: every fault that escapes the body is
//! funneled into the frame's completion handle. Cross-frame resumption goes
//! through the runtime's ready queue rather than nested `resume` calls, so a
//! chain of settling frames cannot grow the native stack.

use std::collections::HashMap;
use std::rc::Rc;

use crate::analysis::{AsyncFunctionAnalysis, NodePath, PathStep};
use crate::errors::INTERNAL_ERROR;
use crate::frame::{FrameRef, FrameState};
use crate::program::AsyncFunction;
use crate::runtime::Runtime;
use crate::values::Val;

pub mod control;
pub mod expressions;
pub mod statements;

#[cfg(test)]
mod tests;

pub use control::{AwaitOutcome, Control, ResumeCursor, StepOutcome};
pub use expressions::EvalResult;

/* ===================== Execution context ===================== */

/// Transient per-step execution context.
///
/// Everything here is rebuilt on each resume; only the frame survives a
/// suspension. `scopes` holds non-hoisted locals, `path` mirrors the
/// analyzer's node path so await sites can be matched to their state
/// numbers, and `cursor` is present while descending to a resume point.
pub struct ExecCx<'a> {
    pub rt: &'a mut Runtime,
    pub frame: FrameRef,
    pub func: Rc<AsyncFunction>,
    pub scopes: Vec<HashMap<String, Val>>,
    pub path: NodePath,
    pub cursor: Option<ResumeCursor>,
}

impl<'a> ExecCx<'a> {
    pub fn analysis(&self) -> &AsyncFunctionAnalysis {
        &self.func.analysis
    }

    /// Execute `f` with `step` appended to the current node path
    pub fn with_path<F>(&mut self, step: PathStep, f: F) -> StepOutcome
    where
        F: FnOnce(&mut Self) -> StepOutcome,
    {
        self.path.push(step);
        let outcome = f(self);
        self.path.pop();
        outcome
    }

    /// Next descent step while resuming into a nested statement
    pub fn resume_descend(&mut self) -> Option<PathStep> {
        self.cursor.as_mut().and_then(|c| c.descend())
    }

    /// Consume the awaited outcome if the cursor has reached this statement
    pub fn resuming_here(&mut self) -> Option<AwaitOutcome> {
        let at_leaf = self.cursor.as_ref().map(|c| c.at_leaf()).unwrap_or(false);
        if at_leaf {
            let outcome = self.cursor.as_mut().and_then(|c| c.take_outcome());
            self.cursor = None;
            outcome
        } else {
            None
        }
    }
}

/// Fault used when the driver and analysis disagree; reaching one of these
/// means a bug, and it surfaces as a rejected completion rather than a panic.
pub(crate) fn internal_fault(message: &str) -> StepOutcome {
    tracing::error!(detail = message, "internal driver fault");
    StepOutcome::Control(Control::Throw(Val::error(INTERNAL_ERROR, message)))
}

/* ===================== Resume ===================== */

enum Entry {
    Fresh(Vec<Val>),
    Resumed(ResumeCursor),
}

/// Drive a frame forward to its next suspension or to completion.
///
/// Must not be called on a frame that is already executing (asserted), and
/// is a logged no-op on a frame that already completed.
pub fn resume(rt: &mut Runtime, frame: &FrameRef) {
    let func;
    let entry;
    {
        let mut f = frame.borrow_mut();
        assert!(
            !f.in_resume,
            "frame {} re-entered while a resume is in progress",
            f.id
        );
        func = f.function.clone();

        match f.state {
            FrameState::Done => {
                tracing::warn!(frame = %f.id, "resume called on a completed frame");
                return;
            }
            FrameState::Running => {
                if f.started {
                    tracing::warn!(frame = %f.id, "resume called on a frame mid-flight");
                    return;
                }
                entry = Entry::Fresh(std::mem::take(&mut f.args));
            }
            FrameState::Suspended(state) => {
                let Some(promise_id) = f.take_awaiter(state) else {
                    tracing::warn!(frame = %f.id, state, "suspended frame has no awaiter");
                    return;
                };
                let outcome = match rt.settled_result(&promise_id) {
                    Some(Ok(value)) => AwaitOutcome::Success(value),
                    Some(Err(error)) => AwaitOutcome::Fault(error),
                    None => {
                        // Awaited operation has not settled; leave the frame
                        // suspended exactly as it was.
                        f.set_awaiter(state, promise_id);
                        tracing::warn!(frame = %f.id, state, "resume before awaiter settled");
                        return;
                    }
                };
                let Some(point) = func.analysis.await_point(state) else {
                    tracing::error!(frame = %f.id, state, "no await point for state");
                    return;
                };
                entry = Entry::Resumed(ResumeCursor::new(point.path.clone(), outcome));
            }
        }

        f.state = FrameState::Running;
        f.in_resume = true;
        f.started = true;
    }

    let (cursor, root_scope) = match entry {
        Entry::Fresh(args) => (None, bind_params(frame, &func, args)),
        Entry::Resumed(cursor) => (Some(cursor), HashMap::new()),
    };

    tracing::trace!(
        frame = %frame.borrow().id,
        function = %func.name,
        resumed = cursor.is_some(),
        "resume"
    );

    let mut cx = ExecCx {
        rt,
        frame: frame.clone(),
        func: func.clone(),
        scopes: vec![root_scope],
        path: Vec::new(),
        cursor,
    };
    let outcome = statements::exec_stmt(&mut cx, func.body.as_ref());
    drop(cx);

    let result = {
        let mut f = frame.borrow_mut();
        f.in_resume = false;
        match outcome {
            StepOutcome::Suspended => {
                debug_assert!(matches!(f.state, FrameState::Suspended(_)));
                tracing::trace!(frame = %f.id, state = f.state.as_i32(), "suspended");
                return;
            }
            StepOutcome::Normal => Ok(Val::Null),
            StepOutcome::Control(Control::Return(value)) => Ok(value),
            StepOutcome::Control(Control::Throw(error)) => Err(error),
            StepOutcome::Control(Control::Break(_) | Control::Continue(_)) => Err(Val::error(
                INTERNAL_ERROR,
                "loop control escaped the function body",
            )),
        }
    };

    complete(rt, frame, result);
}

/// Settle the completion handle exactly once and retire the frame
fn complete(rt: &mut Runtime, frame: &FrameRef, result: Result<Val, Val>) {
    let completion = {
        let mut f = frame.borrow_mut();
        if !f.mark_completed() {
            tracing::error!(frame = %f.id, "frame completed twice");
            return;
        }
        f.state = FrameState::Done;
        tracing::trace!(frame = %f.id, ok = result.is_ok(), "completed");
        f.completion.clone()
    };
    match result {
        Ok(value) => rt.settle_resolve(&completion, value),
        Err(error) => rt.settle_reject(&completion, error),
    };
}

/// Bind call arguments on the first resume. Hoisted parameters go straight
/// to frame slots; the rest live on the step's root scope.
fn bind_params(frame: &FrameRef, func: &AsyncFunction, args: Vec<Val>) -> HashMap<String, Val> {
    let mut transient = HashMap::new();
    let mut f = frame.borrow_mut();
    for (i, name) in func.params.iter().enumerate() {
        let value = args.get(i).cloned().unwrap_or(Val::Null);
        if func.analysis.is_hoisted(name) {
            f.set_slot(name, value);
        } else {
            transient.insert(name.clone(), value);
        }
    }
    transient
}
