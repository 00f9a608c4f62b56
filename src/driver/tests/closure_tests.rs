//! Tests for nested async closures and receiver capture
//!
//! A closure must observe and mutate the same storage as its enclosing
//! frame, not a copy, including after suspensions on either side.

use super::helpers::{resolved, runtime_with, spawn};
use crate::testutil::*;
use crate::values::Val;

use maplit::hashmap;

#[test]
fn closure_mutates_the_enclosing_frame_storage() {
    // let count = 0;
    // let bump = async () => { count = count + 1; return count };
    // await bump(); await bump(); await p;
    // return count
    let mut rt = runtime_with(vec![func(
        "f",
        &["p"],
        vec![
            let_("count", num(0.0)),
            let_(
                "bump",
                closure(
                    0,
                    &[],
                    vec![
                        assign("count", add(ident("count"), num(1.0))),
                        ret(ident("count")),
                    ],
                ),
            ),
            expr(await_(call(ident("bump"), vec![]))),
            expr(await_(call(ident("bump"), vec![]))),
            expr(await_(ident("p"))),
            ret(ident("count")),
        ],
    )]);

    let p = rt.new_promise();
    let (frame, completion) = spawn(&mut rt, "f", vec![Val::Promise(p.clone())]);

    // Both closure calls already ran; the outer slot shows their writes
    assert_eq!(frame.borrow().get_slot("count"), Some(Val::Num(2.0)));

    rt.complete(&p, Val::Null);
    rt.run_until_idle();

    assert_eq!(resolved(&rt, &completion), Val::Num(2.0));
}

#[test]
fn closure_sees_outer_writes_made_after_its_creation() {
    // let x = 1; let read = async () => { return x }; x = 5; return await read()
    let mut rt = runtime_with(vec![func(
        "f",
        &[],
        vec![
            let_("x", num(1.0)),
            let_("read", closure(0, &[], vec![ret(ident("x"))])),
            assign("x", num(5.0)),
            ret(await_(call(ident("read"), vec![]))),
        ],
    )]);

    let (_, completion) = spawn(&mut rt, "f", vec![]);
    assert_eq!(resolved(&rt, &completion), Val::Num(5.0));
}

#[test]
fn closure_with_own_await_shares_storage_across_its_suspension() {
    // let total = 0;
    // let work = async (p) => { let v = await p; total = total + v };
    // let w = work(p); await w; return total
    let mut rt = runtime_with(vec![func(
        "f",
        &["p"],
        vec![
            let_("total", num(0.0)),
            let_(
                "work",
                closure(
                    0,
                    &["q"],
                    vec![
                        let_("v", await_(ident("q"))),
                        assign("total", add(ident("total"), ident("v"))),
                    ],
                ),
            ),
            let_("w", call(ident("work"), vec![ident("p")])),
            expr(await_(ident("w"))),
            ret(ident("total")),
        ],
    )]);

    let p = rt.new_promise();
    let (_, completion) = spawn(&mut rt, "f", vec![Val::Promise(p.clone())]);

    // The closure's frame suspended on p; the outer frame on the closure's
    // completion
    rt.complete(&p, Val::Num(9.0));
    rt.run_until_idle();

    assert_eq!(resolved(&rt, &completion), Val::Num(9.0));
}

#[test]
fn closure_arguments_bind_like_any_call() {
    let mut rt = runtime_with(vec![func(
        "f",
        &[],
        vec![
            let_("mul", closure(0, &["a", "b"], vec![ret(add(ident("a"), ident("b")))])),
            ret(await_(call(ident("mul"), vec![num(2.0), num(3.0)]))),
        ],
    )]);

    let (_, completion) = spawn(&mut rt, "f", vec![]);
    assert_eq!(resolved(&rt, &completion), Val::Num(5.0));
}

#[test]
fn receiver_is_visible_through_this() {
    let mut rt = runtime_with(vec![func(
        "f",
        &[],
        vec![ret(member(this(), "name"))],
    )]);

    let receiver = Val::Obj(hashmap! { "name".to_string() => Val::Str("obj".into()) });
    let completion = rt
        .call_with_receiver("f", vec![], Some(receiver))
        .expect("function exists");
    rt.run_until_idle();

    assert_eq!(resolved(&rt, &completion), Val::Str("obj".into()));
}

#[test]
fn arrows_inherit_the_receiver() {
    // return await (async () => { return this.name })()
    let mut rt = runtime_with(vec![func(
        "f",
        &[],
        vec![ret(await_(call(
            closure(0, &[], vec![ret(member(this(), "name"))]),
            vec![],
        )))],
    )]);

    let receiver = Val::Obj(hashmap! { "name".to_string() => Val::Str("outer".into()) });
    let completion = rt
        .call_with_receiver("f", vec![], Some(receiver))
        .expect("function exists");
    rt.run_until_idle();

    assert_eq!(resolved(&rt, &completion), Val::Str("outer".into()));
}

#[test]
fn missing_receiver_reads_as_null() {
    let mut rt = runtime_with(vec![func("f", &[], vec![ret(this())])]);
    let (_, completion) = spawn(&mut rt, "f", vec![]);
    assert_eq!(resolved(&rt, &completion), Val::Null);
}
