//! Statement execution
//!
//! Recursive statement handlers. Each handler runs in one of two modes:
//! normal execution, or resume descent, where a cursor over the await
//! point's node path tells each composite statement which child to re-enter.
//! Descent re-establishes the control structure exactly as if execution had
//! never paused: loops continue the suspended iteration before iterating on,
//! try re-arms its catch/finally around the re-entered sub-block, and a
//! finally restores the control action it was deferring.
//!
//! Suspension is an outcome, not an exception: when a pending await is
//! reached, the frame's state and awaiter slot are written and `Suspended`
//! unwinds out of every enclosing handler without running finally blocks --
//! execution is paused inside them, not leaving them.

use crate::analysis::{LoopId, PathStep, TryRegionId};
use crate::ast::{Expr, ForEachKind, Stmt};
use crate::errors::TYPE_ERROR;
use crate::frame::{FrameState, IterState};
use crate::runtime::PromiseState;
use crate::values::Val;

use super::control::{AwaitOutcome, Control, StepOutcome};
use super::expressions::{assign_var, declare_var, eval_expr, EvalResult};
use super::{internal_fault, ExecCx};

use std::collections::HashMap;

/* ===================== Statement dispatch ===================== */

pub fn exec_stmt(cx: &mut ExecCx, stmt: &Stmt) -> StepOutcome {
    match stmt {
        Stmt::Block { body, .. } => exec_block(cx, body),
        Stmt::Declare { name, init, .. } => exec_declare(cx, name, init.as_ref()),
        Stmt::Assign {
            var, path, value, ..
        } => exec_assign(cx, var, path, value),
        Stmt::If {
            test,
            then_s,
            else_s,
            ..
        } => exec_if(cx, test, then_s, else_s.as_deref()),
        Stmt::While {
            test, body, label, ..
        } => exec_while(cx, test, body, label),
        Stmt::DoWhile {
            body, test, label, ..
        } => exec_do_while(cx, body, test, label),
        Stmt::For {
            init,
            test,
            update,
            body,
            label,
            ..
        } => {
            cx.scopes.push(HashMap::new());
            let outcome = exec_for(
                cx,
                init.as_deref(),
                test.as_ref(),
                update.as_deref(),
                body,
                label,
            );
            cx.scopes.pop();
            outcome
        }
        Stmt::ForEach {
            kind,
            binding,
            iterable,
            body,
            label,
            ..
        } => exec_for_each(cx, *kind, binding, iterable, body, label),
        Stmt::Return { value, .. } => exec_return(cx, value.as_ref()),
        Stmt::Throw { value, .. } => match eval_expr(cx, value) {
            EvalResult::Value(v) => StepOutcome::Control(Control::Throw(v)),
            EvalResult::Throw(e) => StepOutcome::Control(Control::Throw(e)),
        },
        Stmt::Try {
            body,
            catch_var,
            catch_body,
            finally_body,
            ..
        } => exec_try(
            cx,
            body,
            catch_var.as_deref(),
            catch_body.as_deref(),
            finally_body.as_deref(),
        ),
        Stmt::Expr { expr, .. } => match eval_stmt_value(cx, expr) {
            StmtValue::Value(_) => StepOutcome::Normal,
            StmtValue::Throw(e) => StepOutcome::Control(Control::Throw(e)),
            StmtValue::Suspend => StepOutcome::Suspended,
        },
        Stmt::Break { label, .. } => StepOutcome::Control(Control::Break(label.clone())),
        Stmt::Continue { label, .. } => StepOutcome::Control(Control::Continue(label.clone())),
    }
}

/* ===================== Await-aware value evaluation ===================== */

/// Result of evaluating a statement's outermost expression, which is the
/// only position where an await may appear.
enum StmtValue {
    Value(Val),
    Throw(Val),
    Suspend,
}

/// Evaluate the outermost expression of a statement.
///
/// In resume descent this is the leaf: the awaited outcome recorded in the
/// cursor is delivered here -- a success becomes the expression's value, a
/// fault is raised exactly as if the await itself had thrown.
fn eval_stmt_value(cx: &mut ExecCx, expr: &Expr) -> StmtValue {
    if let Some(outcome) = cx.resuming_here() {
        return match outcome {
            AwaitOutcome::Success(value) => StmtValue::Value(value),
            AwaitOutcome::Fault(error) => StmtValue::Throw(error),
        };
    }

    let Expr::Await { inner, .. } = expr else {
        return match eval_expr(cx, expr) {
            EvalResult::Value(v) => StmtValue::Value(v),
            EvalResult::Throw(e) => StmtValue::Throw(e),
        };
    };

    let awaited = match eval_expr(cx, inner) {
        EvalResult::Value(v) => v,
        EvalResult::Throw(e) => return StmtValue::Throw(e),
    };

    let promise_id = match awaited {
        Val::Promise(promise_id) => promise_id,
        // Awaiting a plain value yields the value itself.
        other => return StmtValue::Value(other),
    };

    let Some(promise) = cx.rt.peek(&promise_id).cloned() else {
        return StmtValue::Throw(Val::error(
            TYPE_ERROR,
            format!("unknown promise {}", promise_id),
        ));
    };

    match promise {
        // Already settled: continue inline within this step, no suspension
        // and no re-entry into resume.
        PromiseState::Resolved(value) => StmtValue::Value(value),
        PromiseState::Rejected(error) => StmtValue::Throw(error),
        PromiseState::Pending => {
            let Some(state) = cx.analysis().state_for_path(&cx.path) else {
                tracing::error!("await site has no state number");
                return StmtValue::Throw(Val::error(
                    crate::errors::INTERNAL_ERROR,
                    "await site has no state number",
                ));
            };
            {
                let mut frame = cx.frame.borrow_mut();
                frame.set_awaiter(state, promise_id.clone());
                frame.state = FrameState::Suspended(state);
                tracing::debug!(
                    frame = %frame.id,
                    state,
                    promise = %promise_id,
                    "suspending on pending awaitable"
                );
            }
            cx.rt.add_frame_waiter(&promise_id, cx.frame.clone());
            StmtValue::Suspend
        }
    }
}

/* ===================== Simple statements ===================== */

fn exec_block(cx: &mut ExecCx, body: &[Stmt]) -> StepOutcome {
    let start = if cx.cursor.is_some() {
        match cx.resume_descend() {
            Some(PathStep::Stmt(idx)) => idx,
            _ => return internal_fault("resume path mismatch at block"),
        }
    } else {
        0
    };

    cx.scopes.push(HashMap::new());
    let mut outcome = StepOutcome::Normal;
    for idx in start..body.len() {
        let result = cx.with_path(PathStep::Stmt(idx), |cx| exec_stmt(cx, &body[idx]));
        match result {
            StepOutcome::Normal => continue,
            other => {
                outcome = other;
                break;
            }
        }
    }
    cx.scopes.pop();
    outcome
}

fn exec_declare(cx: &mut ExecCx, name: &str, init: Option<&Expr>) -> StepOutcome {
    let value = match init {
        None => Val::Null,
        Some(expr) => match eval_stmt_value(cx, expr) {
            StmtValue::Value(v) => v,
            StmtValue::Throw(e) => return StepOutcome::Control(Control::Throw(e)),
            StmtValue::Suspend => return StepOutcome::Suspended,
        },
    };
    declare_var(cx, name, value);
    StepOutcome::Normal
}

fn exec_assign(
    cx: &mut ExecCx,
    var: &str,
    path: &[crate::ast::MemberAccess],
    value: &Expr,
) -> StepOutcome {
    let value = match eval_stmt_value(cx, value) {
        StmtValue::Value(v) => v,
        StmtValue::Throw(e) => return StepOutcome::Control(Control::Throw(e)),
        StmtValue::Suspend => return StepOutcome::Suspended,
    };
    match assign_var(cx, var, path, value) {
        EvalResult::Value(_) => StepOutcome::Normal,
        EvalResult::Throw(e) => StepOutcome::Control(Control::Throw(e)),
    }
}

fn exec_return(cx: &mut ExecCx, value: Option<&Expr>) -> StepOutcome {
    let value = match value {
        None => Val::Null,
        Some(expr) => match eval_stmt_value(cx, expr) {
            StmtValue::Value(v) => v,
            StmtValue::Throw(e) => return StepOutcome::Control(Control::Throw(e)),
            StmtValue::Suspend => return StepOutcome::Suspended,
        },
    };
    StepOutcome::Control(Control::Return(value))
}

fn exec_if(
    cx: &mut ExecCx,
    test: &Expr,
    then_s: &Stmt,
    else_s: Option<&Stmt>,
) -> StepOutcome {
    if cx.cursor.is_some() {
        return match cx.resume_descend() {
            Some(PathStep::Then) => cx.with_path(PathStep::Then, |cx| exec_stmt(cx, then_s)),
            Some(PathStep::Else) => match else_s {
                Some(else_s) => cx.with_path(PathStep::Else, |cx| exec_stmt(cx, else_s)),
                None => internal_fault("resume path enters a missing else branch"),
            },
            _ => internal_fault("resume path mismatch at if"),
        };
    }

    let test = match eval_expr(cx, test) {
        EvalResult::Value(v) => v,
        EvalResult::Throw(e) => return StepOutcome::Control(Control::Throw(e)),
    };
    if test.is_truthy() {
        cx.with_path(PathStep::Then, |cx| exec_stmt(cx, then_s))
    } else if let Some(else_s) = else_s {
        cx.with_path(PathStep::Else, |cx| exec_stmt(cx, else_s))
    } else {
        StepOutcome::Normal
    }
}

/* ===================== Loops ===================== */

/// What a loop does with its body's outcome
enum LoopFlow {
    /// Iterate again (normal completion or a matching continue)
    Next,
    /// Matching break; the loop completes normally
    Exit,
    /// Anything else propagates (suspension, return, throw, outer label)
    Out(StepOutcome),
}

fn loop_flow(outcome: StepOutcome, label: &Option<String>) -> LoopFlow {
    match outcome {
        StepOutcome::Normal => LoopFlow::Next,
        StepOutcome::Control(Control::Continue(target)) if label_matches(&target, label) => {
            LoopFlow::Next
        }
        StepOutcome::Control(Control::Break(target)) if label_matches(&target, label) => {
            LoopFlow::Exit
        }
        other => LoopFlow::Out(other),
    }
}

/// An unlabeled break/continue binds to the innermost loop; a labeled one
/// only to the loop carrying that label.
fn label_matches(target: &Option<String>, own: &Option<String>) -> bool {
    match target {
        None => true,
        Some(name) => own.as_deref() == Some(name.as_str()),
    }
}

fn exec_while(cx: &mut ExecCx, test: &Expr, body: &Stmt, label: &Option<String>) -> StepOutcome {
    if cx.cursor.is_some() {
        // Re-enter the suspended iteration; the loop variable state lives in
        // hoisted slots, so the body continues exactly where it left off.
        match cx.resume_descend() {
            Some(PathStep::Body) => {}
            _ => return internal_fault("resume path mismatch at while"),
        }
        let outcome = cx.with_path(PathStep::Body, |cx| exec_stmt(cx, body));
        match loop_flow(outcome, label) {
            LoopFlow::Next => {}
            LoopFlow::Exit => return StepOutcome::Normal,
            LoopFlow::Out(out) => return out,
        }
    }

    loop {
        let test = match eval_expr(cx, test) {
            EvalResult::Value(v) => v,
            EvalResult::Throw(e) => return StepOutcome::Control(Control::Throw(e)),
        };
        if !test.is_truthy() {
            return StepOutcome::Normal;
        }
        let outcome = cx.with_path(PathStep::Body, |cx| exec_stmt(cx, body));
        match loop_flow(outcome, label) {
            LoopFlow::Next => continue,
            LoopFlow::Exit => return StepOutcome::Normal,
            LoopFlow::Out(out) => return out,
        }
    }
}

fn exec_do_while(cx: &mut ExecCx, body: &Stmt, test: &Expr, label: &Option<String>) -> StepOutcome {
    if cx.cursor.is_some() {
        match cx.resume_descend() {
            Some(PathStep::Body) => {}
            _ => return internal_fault("resume path mismatch at do-while"),
        }
        let outcome = cx.with_path(PathStep::Body, |cx| exec_stmt(cx, body));
        match loop_flow(outcome, label) {
            LoopFlow::Next => {}
            LoopFlow::Exit => return StepOutcome::Normal,
            LoopFlow::Out(out) => return out,
        }
        match eval_expr(cx, test) {
            EvalResult::Value(v) if !v.is_truthy() => return StepOutcome::Normal,
            EvalResult::Value(_) => {}
            EvalResult::Throw(e) => return StepOutcome::Control(Control::Throw(e)),
        }
    }

    loop {
        let outcome = cx.with_path(PathStep::Body, |cx| exec_stmt(cx, body));
        match loop_flow(outcome, label) {
            LoopFlow::Next => {}
            LoopFlow::Exit => return StepOutcome::Normal,
            LoopFlow::Out(out) => return out,
        }
        match eval_expr(cx, test) {
            EvalResult::Value(v) if !v.is_truthy() => return StepOutcome::Normal,
            EvalResult::Value(_) => {}
            EvalResult::Throw(e) => return StepOutcome::Control(Control::Throw(e)),
        }
    }
}

fn exec_for(
    cx: &mut ExecCx,
    init: Option<&Stmt>,
    test: Option<&Expr>,
    update: Option<&Stmt>,
    body: &Stmt,
    label: &Option<String>,
) -> StepOutcome {
    if cx.cursor.is_some() {
        // Mid-iteration re-entry: init never re-runs, and the hoisted loop
        // variable already holds the suspended iteration's value.
        match cx.resume_descend() {
            Some(PathStep::Body) => {}
            _ => return internal_fault("resume path mismatch at for"),
        }
        let outcome = cx.with_path(PathStep::Body, |cx| exec_stmt(cx, body));
        match loop_flow(outcome, label) {
            LoopFlow::Next => {
                if let Some(update) = update {
                    match exec_stmt(cx, update) {
                        StepOutcome::Normal => {}
                        other => return other,
                    }
                }
            }
            LoopFlow::Exit => return StepOutcome::Normal,
            LoopFlow::Out(out) => return out,
        }
    } else if let Some(init) = init {
        match exec_stmt(cx, init) {
            StepOutcome::Normal => {}
            other => return other,
        }
    }

    loop {
        if let Some(test) = test {
            match eval_expr(cx, test) {
                EvalResult::Value(v) if !v.is_truthy() => return StepOutcome::Normal,
                EvalResult::Value(_) => {}
                EvalResult::Throw(e) => return StepOutcome::Control(Control::Throw(e)),
            }
        }
        let outcome = cx.with_path(PathStep::Body, |cx| exec_stmt(cx, body));
        match loop_flow(outcome, label) {
            LoopFlow::Next => {}
            LoopFlow::Exit => return StepOutcome::Normal,
            LoopFlow::Out(out) => return out,
        }
        if let Some(update) = update {
            match exec_stmt(cx, update) {
                StepOutcome::Normal => {}
                other => return other,
            }
        }
    }
}

fn exec_for_each(
    cx: &mut ExecCx,
    kind: ForEachKind,
    binding: &str,
    iterable: &Expr,
    body: &Stmt,
    label: &Option<String>,
) -> StepOutcome {
    let loop_id = cx.analysis().iter_loop_for_path(&cx.path);

    let (items, start_index) = if cx.cursor.is_some() {
        match cx.resume_descend() {
            Some(PathStep::Body) => {}
            _ => return internal_fault("resume path mismatch at for-each"),
        }
        // A suspension inside the body implies the loop has an iteration
        // slot; restore the snapshot and finish the suspended iteration.
        let Some(loop_id) = loop_id else {
            return internal_fault("resumed for-each has no iteration slot");
        };
        let Some(iter) = cx.frame.borrow().iters[loop_id as usize].clone() else {
            return internal_fault("resumed for-each lost its iteration state");
        };

        let outcome = cx.with_path(PathStep::Body, |cx| exec_stmt(cx, body));
        match loop_flow(outcome, label) {
            LoopFlow::Next => {}
            LoopFlow::Exit => {
                clear_iter(cx, Some(loop_id));
                return StepOutcome::Normal;
            }
            LoopFlow::Out(out) => {
                if !matches!(out, StepOutcome::Suspended) {
                    clear_iter(cx, Some(loop_id));
                }
                return out;
            }
        }
        (iter.items, iter.index + 1)
    } else {
        let iterable = match eval_expr(cx, iterable) {
            EvalResult::Value(v) => v,
            EvalResult::Throw(e) => return StepOutcome::Control(Control::Throw(e)),
        };
        let items = match iteration_items(kind, &iterable) {
            Ok(items) => items,
            Err(error) => return StepOutcome::Control(Control::Throw(error)),
        };
        if let Some(loop_id) = loop_id {
            cx.frame.borrow_mut().iters[loop_id as usize] = Some(IterState {
                items: items.clone(),
                index: 0,
            });
        }
        (items, 0)
    };

    for index in start_index..items.len() {
        if let Some(loop_id) = loop_id {
            if let Some(iter) = cx.frame.borrow_mut().iters[loop_id as usize].as_mut() {
                iter.index = index;
            }
        }
        cx.scopes.push(HashMap::new());
        declare_var(cx, binding, items[index].clone());
        let outcome = cx.with_path(PathStep::Body, |cx| exec_stmt(cx, body));
        cx.scopes.pop();
        match loop_flow(outcome, label) {
            LoopFlow::Next => continue,
            LoopFlow::Exit => break,
            LoopFlow::Out(out) => {
                if !matches!(out, StepOutcome::Suspended) {
                    clear_iter(cx, loop_id);
                }
                return out;
            }
        }
    }

    clear_iter(cx, loop_id);
    StepOutcome::Normal
}

fn clear_iter(cx: &mut ExecCx, loop_id: Option<LoopId>) {
    if let Some(loop_id) = loop_id {
        cx.frame.borrow_mut().iters[loop_id as usize] = None;
    }
}

/// Snapshot the values (for-of) or keys (for-in) of the iterable
fn iteration_items(kind: ForEachKind, iterable: &Val) -> Result<Vec<Val>, Val> {
    match (kind, iterable) {
        (ForEachKind::Of, Val::List(items)) => Ok(items.clone()),
        (ForEachKind::In, Val::Obj(map)) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Ok(keys.into_iter().map(|k| Val::Str(k.clone())).collect())
        }
        (ForEachKind::In, Val::List(items)) => Ok((0..items.len())
            .map(|i| Val::Str(i.to_string()))
            .collect()),
        (kind, other) => Err(Val::error(
            TYPE_ERROR,
            format!(
                "{} is not iterable with for-{}",
                other.type_name(),
                match kind {
                    ForEachKind::In => "in",
                    ForEachKind::Of => "of",
                }
            ),
        )),
    }
}

/* ===================== Try / catch / finally ===================== */

fn exec_try(
    cx: &mut ExecCx,
    body: &Stmt,
    catch_var: Option<&str>,
    catch_body: Option<&Stmt>,
    finally_body: Option<&Stmt>,
) -> StepOutcome {
    let Some(region) = cx.analysis().region_for_path(&cx.path) else {
        return internal_fault("try statement has no region");
    };

    // Phase one: obtain the control action (if any) pending after the
    // protected and catch blocks have had their turn.
    let pending: Option<Control> = if cx.cursor.is_some() {
        match cx.resume_descend() {
            Some(PathStep::TryBlock) => {
                // The remainder of the protected block is still covered by
                // this region's catch and finally.
                let outcome = cx.with_path(PathStep::TryBlock, |cx| exec_stmt(cx, body));
                match settle_protected(cx, outcome, catch_var, catch_body) {
                    Ok(pending) => pending,
                    Err(out) => return out,
                }
            }
            Some(PathStep::CatchBlock) => {
                // Re-entering the handler: the catch stays disarmed, so a
                // new throw here propagates outward (through the finally).
                let Some(catch_body) = catch_body else {
                    return internal_fault("resume path enters a missing catch block");
                };
                cx.scopes.push(HashMap::new());
                let outcome = cx.with_path(PathStep::CatchBlock, |cx| exec_stmt(cx, catch_body));
                cx.scopes.pop();
                match outcome {
                    StepOutcome::Suspended => return StepOutcome::Suspended,
                    StepOutcome::Normal => None,
                    StepOutcome::Control(control) => Some(control),
                }
            }
            Some(PathStep::FinallyBlock) => {
                // Mid-finally re-entry: pick the deferred action back up and
                // let the rest of the finally run (it may suspend again).
                let Some(finally_body) = finally_body else {
                    return internal_fault("resume path enters a missing finally block");
                };
                let saved = cx.frame.borrow_mut().pending[region as usize].take();
                return run_finally(cx, region, saved, finally_body);
            }
            _ => return internal_fault("resume path mismatch at try"),
        }
    } else {
        let outcome = cx.with_path(PathStep::TryBlock, |cx| exec_stmt(cx, body));
        match settle_protected(cx, outcome, catch_var, catch_body) {
            Ok(pending) => pending,
            Err(out) => return out,
        }
    };

    // Phase two: the finally runs exactly once per entry, whatever the
    // pending action is, and may itself suspend.
    if let Some(finally_body) = finally_body {
        return run_finally(cx, region, pending, finally_body);
    }

    match pending {
        None => StepOutcome::Normal,
        Some(control) => StepOutcome::Control(control),
    }
}

/// Apply catch semantics to the protected block's outcome.
///
/// Returns the control action still pending after the catch (to be routed
/// through the finally), or an early propagation (suspension, or an
/// unhandled outcome when there is no work left for this region).
fn settle_protected(
    cx: &mut ExecCx,
    outcome: StepOutcome,
    catch_var: Option<&str>,
    catch_body: Option<&Stmt>,
) -> Result<Option<Control>, StepOutcome> {
    match outcome {
        StepOutcome::Suspended => Err(StepOutcome::Suspended),
        StepOutcome::Normal => Ok(None),
        StepOutcome::Control(Control::Throw(error)) => {
            let Some(catch_body) = catch_body else {
                return Ok(Some(Control::Throw(error)));
            };
            cx.scopes.push(HashMap::new());
            if let Some(name) = catch_var {
                declare_var(cx, name, error);
            }
            let outcome = cx.with_path(PathStep::CatchBlock, |cx| exec_stmt(cx, catch_body));
            cx.scopes.pop();
            match outcome {
                StepOutcome::Suspended => Err(StepOutcome::Suspended),
                StepOutcome::Normal => Ok(None),
                StepOutcome::Control(control) => Ok(Some(control)),
            }
        }
        StepOutcome::Control(control) => Ok(Some(control)),
    }
}

/// Run a finally block with `pending` deferred in the frame.
///
/// The deferred slot is written before the finally executes so that a
/// suspension inside it preserves the action; on completion the finally
/// either lets the deferred action take effect or overrides it with its own
/// control flow.
fn run_finally(
    cx: &mut ExecCx,
    region: TryRegionId,
    pending: Option<Control>,
    finally_body: &Stmt,
) -> StepOutcome {
    cx.frame.borrow_mut().pending[region as usize] = pending;

    let outcome = cx.with_path(PathStep::FinallyBlock, |cx| exec_stmt(cx, finally_body));
    match outcome {
        StepOutcome::Suspended => StepOutcome::Suspended,
        StepOutcome::Normal => {
            let saved = cx.frame.borrow_mut().pending[region as usize].take();
            match saved {
                None => StepOutcome::Normal,
                Some(control) => StepOutcome::Control(control),
            }
        }
        StepOutcome::Control(control) => {
            // The finally produced its own control flow; the deferred
            // action is discarded.
            cx.frame.borrow_mut().pending[region as usize] = None;
            StepOutcome::Control(control)
        }
    }
}
