//! Resumable frame model
//!
//! One `ResumableFrame` exists per in-flight invocation of an async function.
//! It is the only storage that survives a suspension: hoisted variable slots,
//! one awaiter slot per await point, deferred-control slots for try regions,
//! iteration slots for suspending for-in/for-of loops, and the completion
//! handle the caller observes. Everything else lives on the transient
//! execution context of a single resume step.
//!
//! Frames are always heap-allocated behind `Rc<RefCell<..>>`: the `Rc` is the
//! stable reference nested async closures capture, which is what makes a
//! closure mutate the same storage as its enclosing frame rather than a copy.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use uuid::Uuid;

use crate::driver::Control;
use crate::program::AsyncFunction;
use crate::values::Val;

pub type FrameRef = Rc<RefCell<ResumableFrame>>;

/* ===================== Frame state ===================== */

/// Execution state of a frame.
///
/// The canonical integer encoding (`as_i32`) is part of the frame contract:
/// `-1` running or fresh, `-2` terminal, `0..N-1` suspended at that await
/// point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum FrameState {
    /// Fresh, or currently inside a resume call
    Running,
    /// Suspended, waiting on the awaiter registered for this await point
    Suspended(u32),
    /// Terminal; the completion handle has been settled
    Done,
}

impl FrameState {
    pub fn as_i32(self) -> i32 {
        match self {
            FrameState::Running => -1,
            FrameState::Done => -2,
            FrameState::Suspended(n) => n as i32,
        }
    }
}

/// Saved iteration position of a suspending for-in/for-of loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterState {
    /// Snapshot of the iterated values (or keys, for for-in)
    pub items: Vec<Val>,
    /// Index of the iteration currently executing
    pub index: usize,
}

/* ===================== Frame ===================== */

/// Persistent storage for one in-flight async invocation
#[derive(Debug)]
pub struct ResumableFrame {
    pub id: String,
    pub function: Rc<AsyncFunction>,
    pub state: FrameState,

    /// Hoisted variable storage, keyed by source name
    pub slots: HashMap<String, Val>,
    /// Pending awaitable per await point; at most one is `Some` at a time
    pub awaiters: Vec<Option<String>>,
    /// Deferred control transfer per try region, recorded while an awaited
    /// finally runs
    pub pending: Vec<Option<Control>>,
    /// Iteration state per suspending for-in/for-of loop
    pub iters: Vec<Option<IterState>>,

    /// Promise id the caller observes
    pub completion: String,
    /// Captured `this`, when the function references the enclosing receiver
    pub receiver: Option<Val>,
    /// Enclosing frame, when this invocation is of a nested async closure
    pub captured: Option<FrameRef>,

    /// Call arguments, consumed by the first resume
    pub args: Vec<Val>,
    pub started: bool,
    completed: bool,
    pub in_resume: bool,
}

impl ResumableFrame {
    pub fn new(
        function: Rc<AsyncFunction>,
        completion: String,
        receiver: Option<Val>,
        captured: Option<FrameRef>,
        args: Vec<Val>,
    ) -> FrameRef {
        let analysis = &function.analysis;
        let frame = ResumableFrame {
            id: Uuid::new_v4().to_string(),
            state: FrameState::Running,
            slots: HashMap::new(),
            awaiters: vec![None; analysis.state_count()],
            pending: vec![None; analysis.try_regions.len()],
            iters: vec![None; analysis.iter_loops.len()],
            completion,
            receiver,
            captured,
            args,
            started: false,
            completed: false,
            in_resume: false,
            function,
        };
        Rc::new(RefCell::new(frame))
    }

    pub fn get_slot(&self, name: &str) -> Option<Val> {
        self.slots.get(name).cloned()
    }

    pub fn set_slot(&mut self, name: &str, value: Val) {
        self.slots.insert(name.to_string(), value);
    }

    /// Register the awaitable this frame is about to suspend on.
    ///
    /// Exactly one awaiter may be outstanding per frame; the driver only
    /// registers a new one after the previous has been taken.
    pub fn set_awaiter(&mut self, state: u32, promise_id: String) {
        debug_assert!(
            self.awaiters.iter().all(|slot| slot.is_none()),
            "frame {} already has an outstanding awaiter",
            self.id
        );
        self.awaiters[state as usize] = Some(promise_id);
    }

    pub fn take_awaiter(&mut self, state: u32) -> Option<String> {
        self.awaiters.get_mut(state as usize).and_then(Option::take)
    }

    /// Mark the frame completed. Returns false if it already was; the
    /// completion handle must be settled at most once.
    pub fn mark_completed(&mut self) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        true
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}
