//! Built-in namespaces callable from programs
//!
//! Dispatched statically by namespace and member name before general callee
//! evaluation, unless the namespace name is shadowed by a variable.

use chrono::Duration;

use crate::driver::{EvalResult, ExecCx};
use crate::errors::{WRONG_ARG_COUNT, WRONG_ARG_TYPE};
use crate::runtime::CompositeKind;
use crate::values::Val;

use EvalResult::{Throw, Value};

const NAMESPACES: &[&str] = &["console", "Timer", "Promise"];

pub fn is_namespace(name: &str) -> bool {
    NAMESPACES.contains(&name)
}

/// Dispatch a namespace call. Returns `None` for an unknown member so the
/// caller can raise the appropriate error.
pub fn dispatch(cx: &mut ExecCx, namespace: &str, member: &str, args: Vec<Val>) -> Option<EvalResult> {
    match (namespace, member) {
        ("console", "log") => Some(console_log(cx, args)),
        ("Timer", "sleep") => Some(timer_sleep(cx, args)),
        ("Promise", "all") => Some(combine(cx, CompositeKind::All, args)),
        ("Promise", "any") => Some(combine(cx, CompositeKind::Any, args)),
        ("Promise", "race") => Some(combine(cx, CompositeKind::Race, args)),
        ("Promise", "resolve") => Some(settled(cx, args, true)),
        ("Promise", "reject") => Some(settled(cx, args, false)),
        _ => None,
    }
}

fn console_log(cx: &mut ExecCx, args: Vec<Val>) -> EvalResult {
    let line = args
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    cx.rt.console_push(line);
    Value(Val::Null)
}

/// Timer.sleep(ms) - promise that resolves once the clock passes now + ms
fn timer_sleep(cx: &mut ExecCx, args: Vec<Val>) -> EvalResult {
    if args.len() != 1 {
        return Throw(Val::error(
            WRONG_ARG_COUNT,
            format!("Timer.sleep expects 1 argument, got {}", args.len()),
        ));
    }
    let ms = match &args[0] {
        Val::Num(n) if *n >= 0.0 => *n as i64,
        _ => {
            return Throw(Val::error(
                WRONG_ARG_TYPE,
                "Timer.sleep expects a non-negative number of milliseconds",
            ));
        }
    };
    let fire_at = cx.rt.now() + Duration::milliseconds(ms);
    Value(Val::Promise(cx.rt.new_timer(fire_at)))
}

/// Promise.all / Promise.any / Promise.race over a list. Non-promise items
/// participate as already-resolved children.
fn combine(cx: &mut ExecCx, kind: CompositeKind, args: Vec<Val>) -> EvalResult {
    if args.len() != 1 {
        return Throw(Val::error(
            WRONG_ARG_COUNT,
            format!("expected 1 argument, got {}", args.len()),
        ));
    }
    let items = match args.into_iter().next() {
        Some(Val::List(items)) => items,
        other => {
            let got = other.map(|v| v.type_name()).unwrap_or("nothing");
            return Throw(Val::error(
                WRONG_ARG_TYPE,
                format!("expected a list of promises, got {}", got),
            ));
        }
    };

    let children: Vec<String> = items
        .into_iter()
        .map(|item| match item {
            Val::Promise(id) => id,
            value => cx.rt.settled_promise(Ok(value)),
        })
        .collect();

    Value(Val::Promise(cx.rt.new_composite(kind, children)))
}

fn settled(cx: &mut ExecCx, args: Vec<Val>, resolve: bool) -> EvalResult {
    let value = args.into_iter().next().unwrap_or(Val::Null);
    let result = if resolve { Ok(value) } else { Err(value) };
    Value(Val::Promise(cx.rt.settled_promise(result)))
}
