//! Runtime host
//!
//! The `Runtime` owns everything frames share: the linked program, the
//! promise registry, closure instances, the ready queue of resumable frames,
//! and the virtual clock for timers. Execution is single-threaded and
//! cooperative; settling a promise never resumes a frame in place -- waiting
//! frames are enqueued and drained iteratively by `run_until_idle`, so a
//! chain of completions cannot grow the native stack.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use uuid::Uuid;

use crate::driver;
use crate::frame::{FrameRef, FrameState, ResumableFrame};
use crate::program::{AsyncFunction, LinkedProgram};
use crate::values::Val;

mod promises;

pub use promises::{CompositeKind, PromiseCell, PromiseKind, PromiseState, Waiter};

/// One live async closure value: its definition plus the frame whose
/// storage it captures
#[derive(Debug)]
pub struct ClosureInstance {
    pub def: Rc<AsyncFunction>,
    pub env: FrameRef,
    pub receiver: Option<Val>,
}

pub struct Runtime {
    program: LinkedProgram,
    promises: HashMap<String, PromiseCell>,
    closures: HashMap<String, ClosureInstance>,
    ready: VecDeque<FrameRef>,
    now: DateTime<Utc>,
    console: Vec<String>,
}

impl Runtime {
    pub fn new(program: LinkedProgram) -> Self {
        Self {
            program,
            promises: HashMap::new(),
            closures: HashMap::new(),
            ready: VecDeque::new(),
            now: Utc::now(),
            console: Vec::new(),
        }
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /* ===================== Calls ===================== */

    /// Invoke a program function. The first step runs synchronously (as a
    /// call does); the returned promise id is the completion handle.
    pub fn call(&mut self, name: &str, args: Vec<Val>) -> Option<String> {
        self.call_with_receiver(name, args, None)
    }

    pub fn call_with_receiver(
        &mut self,
        name: &str,
        args: Vec<Val>,
        receiver: Option<Val>,
    ) -> Option<String> {
        let func = self.program.functions.get(name)?.clone();
        Some(self.spawn_call(func, args, receiver, None))
    }

    pub fn function(&self, name: &str) -> Option<Rc<AsyncFunction>> {
        self.program.functions.get(name).cloned()
    }

    /// Create a frame for `func` and run it to its first suspension or to
    /// completion. Returns the completion promise id.
    pub fn spawn_call(
        &mut self,
        func: Rc<AsyncFunction>,
        args: Vec<Val>,
        receiver: Option<Val>,
        captured: Option<FrameRef>,
    ) -> String {
        let completion = Self::new_id();
        self.promises.insert(completion.clone(), PromiseCell::plain());
        let frame = ResumableFrame::new(func.clone(), completion.clone(), receiver, captured, args);
        tracing::debug!(function = %func.name, frame = %frame.borrow().id, "call");
        driver::resume(self, &frame);
        completion
    }

    /* ===================== Closures ===================== */

    pub fn create_closure(
        &mut self,
        closure_id: u32,
        env: FrameRef,
        receiver: Option<Val>,
    ) -> Option<String> {
        let def = self.program.closures.get(&closure_id)?.clone();
        let instance = Self::new_id();
        self.closures.insert(
            instance.clone(),
            ClosureInstance { def, env, receiver },
        );
        Some(instance)
    }

    pub fn call_closure(&mut self, instance: &str, args: Vec<Val>) -> Option<String> {
        let (def, env, receiver) = {
            let instance = self.closures.get(instance)?;
            (
                instance.def.clone(),
                instance.env.clone(),
                instance.receiver.clone(),
            )
        };
        Some(self.spawn_call(def, args, receiver, Some(env)))
    }

    /* ===================== Promises ===================== */

    /// Host-created pending promise (an external awaitable)
    pub fn new_promise(&mut self) -> String {
        let id = Self::new_id();
        self.promises.insert(id.clone(), PromiseCell::plain());
        id
    }

    /// Promise already settled at creation
    pub fn settled_promise(&mut self, result: Result<Val, Val>) -> String {
        let id = Self::new_id();
        self.promises.insert(id.clone(), PromiseCell::settled(result));
        id
    }

    pub fn new_timer(&mut self, fire_at: DateTime<Utc>) -> String {
        let id = Self::new_id();
        self.promises.insert(id.clone(), PromiseCell::timer(fire_at));
        id
    }

    /// Composite promise over existing promises; evaluated immediately in
    /// case every child has already settled.
    pub fn new_composite(&mut self, kind: CompositeKind, children: Vec<String>) -> String {
        let id = Self::new_id();
        for child in &children {
            if let Some(cell) = self.promises.get_mut(child) {
                if cell.state.is_pending() {
                    cell.waiters.push(Waiter::Composite(id.clone()));
                }
            }
        }
        self.promises
            .insert(id.clone(), PromiseCell::composite(kind, children));
        self.poll_composite(&id);
        id
    }

    pub fn peek(&self, id: &str) -> Option<&PromiseState> {
        self.promises.get(id).map(|cell| &cell.state)
    }

    /// Settled result for host/driver consumption; `None` while pending or
    /// unknown
    pub fn settled_result(&self, id: &str) -> Option<Result<Val, Val>> {
        self.promises.get(id).and_then(|cell| cell.state.settled())
    }

    /// Host-side settlement of an external awaitable. Returns false if the
    /// promise is unknown or already settled.
    pub fn complete(&mut self, id: &str, value: Val) -> bool {
        self.settle_resolve(id, value)
    }

    pub fn fail(&mut self, id: &str, error: Val) -> bool {
        self.settle_reject(id, error)
    }

    pub fn settle_resolve(&mut self, id: &str, value: Val) -> bool {
        self.settle(id, Ok(value))
    }

    pub fn settle_reject(&mut self, id: &str, error: Val) -> bool {
        self.settle(id, Err(error))
    }

    fn settle(&mut self, id: &str, result: Result<Val, Val>) -> bool {
        let waiters = {
            let Some(cell) = self.promises.get_mut(id) else {
                tracing::warn!(promise = %id, "settling unknown promise");
                return false;
            };
            if !cell.state.is_pending() {
                tracing::warn!(promise = %id, "promise settled twice");
                return false;
            }
            cell.state = match result {
                Ok(value) => PromiseState::Resolved(value),
                Err(error) => PromiseState::Rejected(error),
            };
            std::mem::take(&mut cell.waiters)
        };
        tracing::trace!(promise = %id, waiters = waiters.len(), "settled");

        for waiter in waiters {
            match waiter {
                Waiter::Frame(frame) => self.ready.push_back(frame),
                Waiter::Composite(parent) => self.poll_composite(&parent),
            }
        }
        true
    }

    /// Register a suspended frame on a pending promise. If the promise
    /// settled in the meantime the frame is made ready immediately.
    pub fn add_frame_waiter(&mut self, id: &str, frame: FrameRef) {
        match self.promises.get_mut(id) {
            Some(cell) if cell.state.is_pending() => cell.waiters.push(Waiter::Frame(frame)),
            Some(_) => self.ready.push_back(frame),
            None => tracing::warn!(promise = %id, "waiter on unknown promise"),
        }
    }

    fn poll_composite(&mut self, id: &str) {
        let decision = {
            let Some(cell) = self.promises.get(id) else {
                return;
            };
            if !cell.state.is_pending() {
                return;
            }
            let PromiseKind::Composite { kind, children } = &cell.kind else {
                return;
            };
            let states: Vec<Option<Result<Val, Val>>> = children
                .iter()
                .map(|child| self.settled_result(child))
                .collect();
            promises::resolve_composite(*kind, &states)
        };
        if let Some(result) = decision {
            self.settle(id, result);
        }
    }

    /* ===================== Scheduling ===================== */

    /// Drain the ready queue, resuming each frame in turn, until no frame
    /// can make progress.
    pub fn run_until_idle(&mut self) {
        while let Some(frame) = self.ready.pop_front() {
            let state = frame.borrow().state;
            if state == FrameState::Done {
                continue;
            }
            driver::resume(self, &frame);
        }
    }

    /// Advance the virtual clock, fire due timers, and drain the queue
    pub fn advance_time(&mut self, ms: i64) {
        self.now += Duration::milliseconds(ms);
        self.fire_due_timers();
        self.run_until_idle();
    }

    fn fire_due_timers(&mut self) {
        let now = self.now;
        let due: Vec<String> = self
            .promises
            .iter()
            .filter_map(|(id, cell)| match &cell.kind {
                PromiseKind::Timer { fire_at }
                    if cell.state.is_pending() && *fire_at <= now =>
                {
                    Some(id.clone())
                }
                _ => None,
            })
            .collect();
        for id in due {
            self.settle_resolve(&id, Val::Null);
        }
    }

    /// Earliest pending timer instant, used by hosts to fast-forward
    pub fn next_timer(&self) -> Option<DateTime<Utc>> {
        self.promises
            .values()
            .filter_map(|cell| match &cell.kind {
                PromiseKind::Timer { fire_at } if cell.state.is_pending() => Some(*fire_at),
                _ => None,
            })
            .min()
    }

    /* ===================== Console ===================== */

    pub fn console_push(&mut self, line: String) {
        tracing::info!(target: "strudel::console", "{}", line);
        self.console.push(line);
    }

    pub fn take_console(&mut self) -> Vec<String> {
        std::mem::take(&mut self.console)
    }
}
