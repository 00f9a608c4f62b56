//! Suspension analysis
//!
//! Static, single-pass analysis of one async function body. The result is an
//! immutable `AsyncFunctionAnalysis` computed once per function at link time;
//! the resume driver consults it on every step but never re-runs it.
//!
//! The analysis discovers:
//! - every `await` expression, assigned a dense state number in lexical order
//! - every try/catch/finally construct and which of its sub-blocks await
//! - which variables must be hoisted into frame storage to survive suspension
//! - whether the body references the enclosing receiver (`this`)
//! - whether the body defines nested async closures, and which outer locals
//!   they capture

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::ast::Stmt;

mod scan;


pub use scan::analyze;

/* ===================== Node paths ===================== */

/// One step of a path from a function body root to a nested statement.
///
/// The analyzer records a path per await point (and per try/loop construct);
/// the driver replays enclosing control structures on resume by descending
/// the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum PathStep {
    /// Nth statement of a block
    Stmt(usize),
    Then,
    Else,
    /// Loop body (while/do-while/for/for-each)
    Body,
    TryBlock,
    CatchBlock,
    FinallyBlock,
}

/// Path from the body root to a statement
pub type NodePath = Vec<PathStep>;

pub type TryRegionId = u32;
pub type LoopId = u32;

/* ===================== Analysis records ===================== */

/// One syntactic `await` expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwaitPoint {
    /// Dense state number, assigned in lexical order starting at 0.
    /// Stable across all invocations of the function.
    pub state_number: u32,
    /// Innermost enclosing try region, if any
    pub try_region: Option<TryRegionId>,
    /// Path to the statement whose outermost expression is this await
    pub path: NodePath,
}

/// One try/catch/finally construct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryRegion {
    pub id: TryRegionId,
    pub parent: Option<TryRegionId>,
    pub has_await_in_try: bool,
    pub has_await_in_catch: bool,
    pub has_await_in_finally: bool,
}

/// Why a variable was promoted to frame-persistent storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoistReason {
    /// Captured by a nested async closure; must share the frame's storage
    CapturedByClosure,
    /// Loop variable of a loop whose body suspends
    LoopVariable,
    /// Catch binding live across an await in its region
    CatchBinding,
    /// Parameter of a suspending function
    Param,
    /// Declared before an await and lexically in scope after it
    DeclaredAcrossAwait,
}

/// Immutable analysis record for one async function
///
/// Owned by the linked function; shared read-only by every frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsyncFunctionAnalysis {
    /// Await points ordered by state number (index == state_number)
    pub await_points: Vec<AwaitPoint>,
    /// Try regions ordered by id
    pub try_regions: Vec<TryRegion>,
    /// Hoisted variables with the reason each was hoisted
    pub hoisted: BTreeMap<String, HoistReason>,
    /// Every name declared in the body (params included)
    pub declared: BTreeSet<String>,
    /// Names read from enclosing function frames (only for closures)
    pub captured_free: BTreeSet<String>,
    /// Await-containing for-in/for-of loops, as (loop statement path, loop
    /// id) pairs. Each gets an iteration-state slot in the frame.
    pub iter_loops: Vec<(NodePath, LoopId)>,
    /// Try region ids by try statement path
    pub trys_by_path: Vec<(NodePath, TryRegionId)>,
    pub uses_enclosing_receiver: bool,
    pub has_nested_async_closures: bool,
}

impl AsyncFunctionAnalysis {
    /// Number of await points (the N of suspended states 0..N-1)
    pub fn state_count(&self) -> usize {
        self.await_points.len()
    }

    pub fn is_hoisted(&self, name: &str) -> bool {
        self.hoisted.contains_key(name)
    }

    pub fn await_point(&self, state: u32) -> Option<&AwaitPoint> {
        self.await_points.get(state as usize)
    }

    pub fn try_region(&self, id: TryRegionId) -> Option<&TryRegion> {
        self.try_regions.get(id as usize)
    }

    /// State number of the await whose statement sits at `path`
    pub fn state_for_path(&self, path: &NodePath) -> Option<u32> {
        self.await_points
            .iter()
            .find(|point| &point.path == path)
            .map(|point| point.state_number)
    }

    pub fn region_for_path(&self, path: &NodePath) -> Option<TryRegionId> {
        self.trys_by_path
            .iter()
            .find(|(candidate, _)| candidate == path)
            .map(|(_, id)| *id)
    }

    pub fn iter_loop_for_path(&self, path: &NodePath) -> Option<LoopId> {
        self.iter_loops
            .iter()
            .find(|(candidate, _)| candidate == path)
            .map(|(_, id)| *id)
    }
}

/// Analyze a top-level async function (no enclosing scope)
pub fn analyze_function(params: &[String], body: &Stmt) -> AsyncFunctionAnalysis {
    analyze(params, body, &BTreeSet::new())
}
