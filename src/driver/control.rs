//! Control flow types for the resume driver

use serde::{Deserialize, Serialize};

use crate::analysis::{NodePath, PathStep};
use crate::values::Val;

/* ===================== Control flow ===================== */

/// Non-sequential control in flight (return, break, continue, throw).
///
/// Handlers unwind by propagating a `Control` outward until something
/// consumes it: loops consume matching break/continue, try regions intercept
/// throws, and the driver converts return/throw at the body root into frame
/// completion. A `Control` is also what a try region defers while an awaited
/// finally runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Control {
    Break(Option<String>),
    Continue(Option<String>),
    Return(Val),
    Throw(Val),
}

/// Result of executing one statement
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Statement completed; continue with the next one
    Normal,
    /// Control flow propagating outward
    Control(Control),
    /// A pending await was reached; the frame state and awaiter slot are
    /// already set, unwind out of the resume call without running finallys
    Suspended,
}

/* ===================== Resume cursor ===================== */

/// How the awaited operation ended, delivered at the resume point
#[derive(Debug, Clone, PartialEq)]
pub enum AwaitOutcome {
    Success(Val),
    /// Delivered as if the await expression itself had thrown
    Fault(Val),
}

/// Descent cursor for re-entering a function mid-body.
///
/// Holds the analysis-recorded path of the await point being resumed;
/// statement handlers consume one step per level while re-establishing the
/// enclosing control structures, and the leaf await statement consumes the
/// outcome.
#[derive(Debug)]
pub struct ResumeCursor {
    path: NodePath,
    depth: usize,
    outcome: Option<AwaitOutcome>,
}

impl ResumeCursor {
    pub fn new(path: NodePath, outcome: AwaitOutcome) -> Self {
        Self {
            path,
            depth: 0,
            outcome: Some(outcome),
        }
    }

    /// Next descent step, if the cursor has not reached the await statement
    pub fn descend(&mut self) -> Option<PathStep> {
        if self.depth < self.path.len() {
            let step = self.path[self.depth];
            self.depth += 1;
            Some(step)
        } else {
            None
        }
    }

    /// True once every path step has been consumed
    pub fn at_leaf(&self) -> bool {
        self.depth == self.path.len()
    }

    pub fn take_outcome(&mut self) -> Option<AwaitOutcome> {
        self.outcome.take()
    }
}
