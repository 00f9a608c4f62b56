//! Tests for try/catch/finally across suspensions
//!
//! A finally runs exactly once per entry into its try, whatever the exit --
//! normal completion, a thrown error, or an early return -- and may itself
//! suspend, in which case the pending control transfer is deferred until the
//! finally completes.

use super::helpers::{assert_pending, rejected, resolved, runtime_with, spawn};
use crate::testutil::*;
use crate::values::Val;

#[test]
fn throw_waits_for_an_awaited_finally() {
    // try { throw "E" } finally { await cleanup }
    let mut rt = runtime_with(vec![func(
        "f",
        &["cleanup"],
        vec![try_finally(
            vec![throw(string("E"))],
            vec![expr(await_(ident("cleanup")))],
        )],
    )]);

    let cleanup = rt.new_promise();
    let (frame, completion) = spawn(&mut rt, "f", vec![Val::Promise(cleanup.clone())]);

    // Suspended inside the finally; the throw has not escaped yet
    assert_eq!(frame.borrow().state.as_i32(), 0);
    assert_pending(&rt, &completion);

    rt.complete(&cleanup, Val::Null);
    rt.run_until_idle();

    // Cleanup ran to completion, then the deferred throw took effect
    assert_eq!(rejected(&rt, &completion), Val::Str("E".into()));
}

#[test]
fn return_waits_for_an_awaited_finally() {
    // try { return 5 } finally { await cleanup }
    let mut rt = runtime_with(vec![func(
        "f",
        &["cleanup"],
        vec![try_finally(
            vec![ret(num(5.0))],
            vec![expr(await_(ident("cleanup")))],
        )]
    )]);

    let cleanup = rt.new_promise();
    let (_, completion) = spawn(&mut rt, "f", vec![Val::Promise(cleanup.clone())]);

    // The return value is held until the cleanup completes
    assert_pending(&rt, &completion);

    rt.complete(&cleanup, Val::Null);
    rt.run_until_idle();

    assert_eq!(resolved(&rt, &completion), Val::Num(5.0));
}

#[test]
fn fault_caught_then_catch_suspends_and_keeps_the_binding() {
    // try { await risky } catch (e) { await recover; return e }
    let mut rt = runtime_with(vec![func(
        "f",
        &["risky", "recover"],
        vec![try_catch(
            vec![expr(await_(ident("risky")))],
            "e",
            vec![expr(await_(ident("recover"))), ret(ident("e"))],
        )],
    )]);

    let risky = rt.new_promise();
    let recover = rt.new_promise();
    let (frame, completion) = spawn(
        &mut rt,
        "f",
        vec![Val::Promise(risky.clone()), Val::Promise(recover.clone())],
    );
    assert_eq!(frame.borrow().state.as_i32(), 0);

    // The fault arrives at the resume point and is caught; the catch then
    // suspends at its own await site
    rt.fail(&risky, Val::Str("bad".into()));
    rt.run_until_idle();
    assert_eq!(frame.borrow().state.as_i32(), 1);

    rt.complete(&recover, Val::Null);
    rt.run_until_idle();

    // The catch binding survived the suspension inside the catch
    assert_eq!(resolved(&rt, &completion), Val::Str("bad".into()));
}

#[test]
fn finally_runs_exactly_once_per_entry() {
    // Count finally runs across two entries, one normal and one throwing
    let mut rt = runtime_with(vec![func(
        "f",
        &["gate"],
        vec![
            let_("count", num(0.0)),
            try_finally(
                vec![expr(await_(ident("gate")))],
                vec![assign("count", add(ident("count"), num(1.0)))],
            ),
            try_catch_finally(
                vec![throw(string("E"))],
                "e",
                vec![],
                vec![assign("count", add(ident("count"), num(1.0)))],
            ),
            ret(ident("count")),
        ],
    )]);

    let gate = rt.new_promise();
    let (_, completion) = spawn(&mut rt, "f", vec![Val::Promise(gate.clone())]);

    rt.complete(&gate, Val::Null);
    rt.run_until_idle();

    assert_eq!(resolved(&rt, &completion), Val::Num(2.0));
}

#[test]
fn finally_control_flow_overrides_the_pending_action() {
    // try { return 1 } finally { await gate; return 2 }
    let mut rt = runtime_with(vec![func(
        "f",
        &["gate"],
        vec![try_finally(
            vec![ret(num(1.0))],
            vec![expr(await_(ident("gate"))), ret(num(2.0))],
        )],
    )]);

    let gate = rt.new_promise();
    let (_, completion) = spawn(&mut rt, "f", vec![Val::Promise(gate.clone())]);

    rt.complete(&gate, Val::Null);
    rt.run_until_idle();

    // The finally's own return wins over the deferred one
    assert_eq!(resolved(&rt, &completion), Val::Num(2.0));
}

#[test]
fn catch_does_not_re_arm_after_resuming_inside_it() {
    // try { await risky } catch (e) { await gate; throw "second" }
    let mut rt = runtime_with(vec![func(
        "f",
        &["risky", "gate"],
        vec![try_catch(
            vec![expr(await_(ident("risky")))],
            "e",
            vec![expr(await_(ident("gate"))), throw(string("second"))],
        )],
    )]);

    let risky = rt.new_promise();
    let gate = rt.new_promise();
    let (_, completion) = spawn(
        &mut rt,
        "f",
        vec![Val::Promise(risky.clone()), Val::Promise(gate.clone())],
    );

    rt.fail(&risky, Val::Str("first".into()));
    rt.run_until_idle();
    rt.complete(&gate, Val::Null);
    rt.run_until_idle();

    // The throw inside the resumed catch escapes; it does not re-enter the
    // same catch
    assert_eq!(rejected(&rt, &completion), Val::Str("second".into()));
}

#[test]
fn resuming_in_a_try_keeps_the_catch_armed() {
    // try { await gate; throw "late" } catch (e) { return "caught" }
    let mut rt = runtime_with(vec![func(
        "f",
        &["gate"],
        vec![try_catch(
            vec![expr(await_(ident("gate"))), throw(string("late"))],
            "e",
            vec![ret(string("caught"))],
        )],
    )]);

    let gate = rt.new_promise();
    let (_, completion) = spawn(&mut rt, "f", vec![Val::Promise(gate.clone())]);

    rt.complete(&gate, Val::Null);
    rt.run_until_idle();

    // The throw happened after the resume, and the catch still covered it
    assert_eq!(resolved(&rt, &completion), Val::Str("caught".into()));
}

#[test]
fn break_through_an_awaited_finally_exits_the_loop_late() {
    // while (true) { try { break } finally { await gate } } return "done"
    let mut rt = runtime_with(vec![func(
        "f",
        &["gate"],
        vec![
            while_(
                boolean(true),
                vec![try_finally(
                    vec![brk()],
                    vec![expr(await_(ident("gate")))],
                )],
            ),
            ret(string("done")),
        ],
    )]);

    let gate = rt.new_promise();
    let (frame, completion) = spawn(&mut rt, "f", vec![Val::Promise(gate.clone())]);

    // Suspended in the finally; the break is deferred
    assert_eq!(frame.borrow().state.as_i32(), 0);
    assert_pending(&rt, &completion);

    rt.complete(&gate, Val::Null);
    rt.run_until_idle();

    assert_eq!(resolved(&rt, &completion), Val::Str("done".into()));
}

#[test]
fn nested_finallys_both_run_before_the_throw_escapes() {
    // try { try { throw "E" } finally { await g1 } } finally { await g2 }
    let mut rt = runtime_with(vec![func(
        "f",
        &["g1", "g2"],
        vec![try_finally(
            vec![try_finally(
                vec![throw(string("E"))],
                vec![expr(await_(ident("g1")))],
            )],
            vec![expr(await_(ident("g2")))],
        )],
    )]);

    let g1 = rt.new_promise();
    let g2 = rt.new_promise();
    let (frame, completion) = spawn(
        &mut rt,
        "f",
        vec![Val::Promise(g1.clone()), Val::Promise(g2.clone())],
    );

    // Inner finally first
    assert_eq!(frame.borrow().state.as_i32(), 0);
    rt.complete(&g1, Val::Null);
    rt.run_until_idle();

    // Then the outer finally
    assert_eq!(frame.borrow().state.as_i32(), 1);
    assert_pending(&rt, &completion);

    rt.complete(&g2, Val::Null);
    rt.run_until_idle();

    assert_eq!(rejected(&rt, &completion), Val::Str("E".into()));
}

#[test]
fn rethrow_from_catch_routes_through_the_finally() {
    // try { throw "E" } catch (e) { throw e } finally { count = 1 }
    let mut rt = runtime_with(vec![func(
        "f",
        &["p"],
        vec![
            let_("count", num(0.0)),
            expr(await_(ident("p"))),
            try_catch_finally(
                vec![throw(string("E"))],
                "e",
                vec![throw(ident("e"))],
                vec![assign("count", num(1.0))],
            ),
        ],
    )]);

    let p = rt.new_promise();
    let (frame, completion) = spawn(&mut rt, "f", vec![Val::Promise(p.clone())]);

    rt.complete(&p, Val::Null);
    rt.run_until_idle();

    assert_eq!(rejected(&rt, &completion), Val::Str("E".into()));
    assert_eq!(frame.borrow().get_slot("count"), Some(Val::Num(1.0)));
}
