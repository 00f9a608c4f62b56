//! Tests for await, suspension, and resumption

use super::helpers::{assert_pending, rejected, resolved, runtime_with, spawn};
use crate::driver;
use crate::testutil::*;
use crate::values::Val;

#[test]
fn two_sequential_awaits_sum() {
    // let x = await p1; let y = await p2; return x + y
    let mut rt = runtime_with(vec![func(
        "f",
        &["p1", "p2"],
        vec![
            let_("x", await_(ident("p1"))),
            let_("y", await_(ident("p2"))),
            ret(add(ident("x"), ident("y"))),
        ],
    )]);

    let p1 = rt.new_promise();
    let p2 = rt.new_promise();
    let (frame, completion) = spawn(
        &mut rt,
        "f",
        vec![Val::Promise(p1.clone()), Val::Promise(p2.clone())],
    );

    // First suspension: state 0
    assert_eq!(frame.borrow().state.as_i32(), 0);
    assert_pending(&rt, &completion);

    rt.complete(&p1, Val::Num(10.0));
    rt.run_until_idle();

    // Second suspension: state 1
    assert_eq!(frame.borrow().state.as_i32(), 1);
    assert_pending(&rt, &completion);

    rt.complete(&p2, Val::Num(20.0));
    rt.run_until_idle();

    assert_eq!(frame.borrow().state.as_i32(), -2);
    assert_eq!(resolved(&rt, &completion), Val::Num(30.0));
}

#[test]
fn awaiting_a_settled_promise_continues_inline() {
    let mut rt = runtime_with(vec![func(
        "f",
        &["p"],
        vec![ret(await_(ident("p")))],
    )]);

    let p = rt.new_promise();
    rt.complete(&p, Val::Num(7.0));

    // The single resume runs to completion without suspending
    let (frame, completion) = spawn(&mut rt, "f", vec![Val::Promise(p)]);
    assert_eq!(frame.borrow().state.as_i32(), -2);
    assert_eq!(resolved(&rt, &completion), Val::Num(7.0));
}

#[test]
fn awaiting_a_plain_value_yields_it() {
    let mut rt = runtime_with(vec![func(
        "f",
        &["v"],
        vec![ret(await_(ident("v")))],
    )]);

    let (frame, completion) = spawn(&mut rt, "f", vec![Val::Str("plain".into())]);
    assert_eq!(frame.borrow().state.as_i32(), -2);
    assert_eq!(resolved(&rt, &completion), Val::Str("plain".into()));
}

#[test]
fn faulted_await_rejects_when_uncaught() {
    let mut rt = runtime_with(vec![func(
        "f",
        &["p"],
        vec![ret(await_(ident("p")))],
    )]);

    let p = rt.new_promise();
    let (frame, completion) = spawn(&mut rt, "f", vec![Val::Promise(p.clone())]);
    assert_eq!(frame.borrow().state.as_i32(), 0);

    rt.fail(&p, Val::Str("nope".into()));
    rt.run_until_idle();

    assert_eq!(frame.borrow().state.as_i32(), -2);
    assert_eq!(rejected(&rt, &completion), Val::Str("nope".into()));
}

#[test]
fn faulted_await_is_catchable_at_the_resume_point() {
    // try { await p } catch (e) { return e }
    let mut rt = runtime_with(vec![func(
        "f",
        &["p"],
        vec![try_catch(
            vec![expr(await_(ident("p")))],
            "e",
            vec![ret(ident("e"))],
        )],
    )]);

    let p = rt.new_promise();
    let (_, completion) = spawn(&mut rt, "f", vec![Val::Promise(p.clone())]);

    rt.fail(&p, Val::Str("fault".into()));
    rt.run_until_idle();

    // The fault was delivered as if the await threw, and caught lexically
    assert_eq!(resolved(&rt, &completion), Val::Str("fault".into()));
}

#[test]
fn hoisted_variable_survives_suspension_exactly() {
    // let x = 41; await p; return x + 1
    let mut rt = runtime_with(vec![func(
        "f",
        &["p"],
        vec![
            let_("x", num(41.0)),
            expr(await_(ident("p"))),
            ret(add(ident("x"), num(1.0))),
        ],
    )]);

    let p = rt.new_promise();
    let (frame, completion) = spawn(&mut rt, "f", vec![Val::Promise(p.clone())]);

    // The written value sits in the frame slot across the suspension
    assert_eq!(frame.borrow().get_slot("x"), Some(Val::Num(41.0)));

    rt.complete(&p, Val::Null);
    rt.run_until_idle();
    assert_eq!(resolved(&rt, &completion), Val::Num(42.0));
}

#[test]
fn resume_on_a_completed_frame_is_a_no_op() {
    let mut rt = runtime_with(vec![func("f", &[], vec![ret(num(1.0))])]);

    let (frame, completion) = spawn(&mut rt, "f", vec![]);
    assert_eq!(frame.borrow().state.as_i32(), -2);

    // A stray resume must not re-run the body or double-complete
    driver::resume(&mut rt, &frame);
    assert_eq!(frame.borrow().state.as_i32(), -2);
    assert_eq!(resolved(&rt, &completion), Val::Num(1.0));
}

#[test]
fn resume_before_the_awaiter_settles_keeps_the_frame_suspended() {
    let mut rt = runtime_with(vec![func(
        "f",
        &["p"],
        vec![ret(await_(ident("p")))],
    )]);

    let p = rt.new_promise();
    let (frame, completion) = spawn(&mut rt, "f", vec![Val::Promise(p.clone())]);
    assert_eq!(frame.borrow().state.as_i32(), 0);

    // Illegal wake-up: nothing settled yet
    driver::resume(&mut rt, &frame);
    assert_eq!(frame.borrow().state.as_i32(), 0);

    // The frame still resumes correctly afterwards
    rt.complete(&p, Val::Num(3.0));
    rt.run_until_idle();
    assert_eq!(resolved(&rt, &completion), Val::Num(3.0));
}

#[test]
fn chained_function_calls_resume_through_the_queue() {
    // f awaits g, g awaits an external promise
    let mut rt = runtime_with(vec![
        func("g", &["p"], vec![ret(await_(ident("p")))]),
        func(
            "f",
            &["p"],
            vec![
                let_("inner", call(ident("g"), vec![ident("p")])),
                let_("v", await_(ident("inner"))),
                ret(add(ident("v"), num(1.0))),
            ],
        ),
    ]);

    let p = rt.new_promise();
    let (frame, completion) = spawn(&mut rt, "f", vec![Val::Promise(p.clone())]);
    assert_eq!(frame.borrow().state.as_i32(), 0);

    rt.complete(&p, Val::Num(10.0));
    rt.run_until_idle();

    assert_eq!(resolved(&rt, &completion), Val::Num(11.0));
}

#[test]
fn independent_frames_interleave() {
    let mut rt = runtime_with(vec![func(
        "f",
        &["p", "tag"],
        vec![
            expr(await_(ident("p"))),
            ret(ident("tag")),
        ],
    )]);

    let pa = rt.new_promise();
    let pb = rt.new_promise();
    let (fa, ca) = spawn(&mut rt, "f", vec![Val::Promise(pa.clone()), Val::Num(1.0)]);
    let (fb, cb) = spawn(&mut rt, "f", vec![Val::Promise(pb.clone()), Val::Num(2.0)]);

    assert_eq!(fa.borrow().state.as_i32(), 0);
    assert_eq!(fb.borrow().state.as_i32(), 0);

    // Settle in reverse order; each frame only resumes on its own awaiter
    rt.complete(&pb, Val::Null);
    rt.run_until_idle();
    assert_eq!(fa.borrow().state.as_i32(), 0);
    assert_eq!(resolved(&rt, &cb), Val::Num(2.0));

    rt.complete(&pa, Val::Null);
    rt.run_until_idle();
    assert_eq!(resolved(&rt, &ca), Val::Num(1.0));
}
