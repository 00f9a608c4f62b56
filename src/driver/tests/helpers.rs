//! Test helpers for driver tests

use crate::driver;
use crate::frame::{FrameRef, ResumableFrame};
use crate::program::{link, FunctionDef};
use crate::runtime::Runtime;
use crate::testutil::program;
use crate::values::Val;

/// Link a set of functions and build a runtime around them.
///
/// The program round-trips through JSON on the way, exercising the parser
/// interchange format.
pub fn runtime_with(functions: Vec<FunctionDef>) -> Runtime {
    let program = program(functions);
    let json = serde_json::to_string(&program).expect("program serialization failed");
    let program = crate::program::Program::from_json(&json).expect("program deserialization failed");
    let linked = link(&program).expect("program failed to link");
    Runtime::new(linked)
}

/// Invoke a function but keep hold of the frame, so tests can assert on
/// frame states across suspensions. The first step runs synchronously, as
/// `Runtime::call` would.
pub fn spawn(rt: &mut Runtime, name: &str, args: Vec<Val>) -> (FrameRef, String) {
    let func = rt.function(name).expect("unknown function");
    let completion = rt.new_promise();
    let frame = ResumableFrame::new(func, completion.clone(), None, None, args);
    driver::resume(rt, &frame);
    (frame, completion)
}

/// The settled success value of a promise; panics if pending or rejected
pub fn resolved(rt: &Runtime, id: &str) -> Val {
    match rt.settled_result(id) {
        Some(Ok(value)) => value,
        other => panic!("expected resolved promise, got {:?}", other),
    }
}

/// The settled failure value of a promise; panics if pending or resolved
pub fn rejected(rt: &Runtime, id: &str) -> Val {
    match rt.settled_result(id) {
        Some(Err(error)) => error,
        other => panic!("expected rejected promise, got {:?}", other),
    }
}

pub fn assert_pending(rt: &Runtime, id: &str) {
    assert_eq!(rt.settled_result(id), None, "expected a pending promise");
}
