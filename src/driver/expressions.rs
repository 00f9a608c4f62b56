//! Expression evaluation
//!
//! Evaluates the non-suspending expression subset: everything except `await`,
//! which only the statement layer handles (await is restricted to the
//! outermost position of a statement). Calls to async functions and closures
//! start the callee synchronously and evaluate to a promise value.

use std::collections::HashMap;

use crate::ast::{BinaryOp, Expr, MemberAccess, UnaryOp};
use crate::errors::{REFERENCE_ERROR, TYPE_ERROR};
use crate::frame::FrameRef;
use crate::stdlib;
use crate::values::Val;

use super::ExecCx;

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum EvalResult {
    /// Expression evaluated to a value
    Value(Val),
    /// Expression threw an error value
    Throw(Val),
}

use EvalResult::{Throw, Value};

macro_rules! eval {
    ($cx:expr, $expr:expr) => {
        match eval_expr($cx, $expr) {
            Value(v) => v,
            thrown => return thrown,
        }
    };
}

/* ===================== Evaluation ===================== */

pub fn eval_expr(cx: &mut ExecCx, expr: &Expr) -> EvalResult {
    match expr {
        Expr::LitNull { .. } => Value(Val::Null),
        Expr::LitBool { v, .. } => Value(Val::Bool(*v)),
        Expr::LitNum { v, .. } => Value(Val::Num(*v)),
        Expr::LitStr { v, .. } => Value(Val::Str(v.clone())),

        Expr::LitList { elements, .. } => {
            let mut items = Vec::with_capacity(elements.len());
            for element in elements {
                items.push(eval!(cx, element));
            }
            Value(Val::List(items))
        }

        Expr::LitObj { properties, .. } => {
            let mut map = HashMap::new();
            for (key, _, value_expr) in properties {
                let value = eval!(cx, value_expr);
                map.insert(key.clone(), value);
            }
            Value(Val::Obj(map))
        }

        Expr::Ident { name, .. } => match lookup_var(cx, name) {
            Some(value) => Value(value),
            None => Throw(Val::error(
                REFERENCE_ERROR,
                format!("{} is not defined", name),
            )),
        },

        Expr::This { .. } => Value(cx.frame.borrow().receiver.clone().unwrap_or(Val::Null)),

        Expr::Member {
            object,
            property,
            optional,
            ..
        } => {
            let object = eval!(cx, object);
            if *optional && object == Val::Null {
                return Value(Val::Null);
            }
            eval_member(&object, property)
        }

        Expr::Index { object, index, .. } => {
            let object = eval!(cx, object);
            let index = eval!(cx, index);
            eval_index(&object, &index)
        }

        Expr::Call { callee, args, .. } => eval_call(cx, callee, args),

        Expr::Await { .. } => {
            // Unreachable on validated programs; awaits are consumed by the
            // statement layer.
            tracing::error!("await reached expression evaluation");
            Throw(Val::error(
                TYPE_ERROR,
                "await must be the outermost expression of a statement",
            ))
        }

        Expr::Unary { op, operand, .. } => {
            let operand = eval!(cx, operand);
            match op {
                UnaryOp::Not => Value(Val::Bool(!operand.is_truthy())),
                UnaryOp::Neg => match operand {
                    Val::Num(n) => Value(Val::Num(-n)),
                    other => Throw(Val::error(
                        TYPE_ERROR,
                        format!("cannot negate {}", other.type_name()),
                    )),
                },
            }
        }

        Expr::Binary {
            op, left, right, ..
        } => {
            let left = eval!(cx, left);
            // Short-circuit forms decide on the left value alone.
            match op {
                BinaryOp::And => {
                    if !left.is_truthy() {
                        return Value(left);
                    }
                    return eval_expr(cx, right);
                }
                BinaryOp::Or => {
                    if left.is_truthy() {
                        return Value(left);
                    }
                    return eval_expr(cx, right);
                }
                BinaryOp::Nullish => {
                    if left != Val::Null {
                        return Value(left);
                    }
                    return eval_expr(cx, right);
                }
                _ => {}
            }
            let right = eval!(cx, right);
            apply_binary(*op, left, right)
        }

        Expr::Ternary {
            condition,
            consequent,
            alternate,
            ..
        } => {
            let condition = eval!(cx, condition);
            if condition.is_truthy() {
                eval_expr(cx, consequent)
            } else {
                eval_expr(cx, alternate)
            }
        }

        Expr::AsyncClosure { id, .. } => {
            let receiver = cx.frame.borrow().receiver.clone();
            match cx.rt.create_closure(*id, cx.frame.clone(), receiver) {
                Some(instance) => Value(Val::Closure(instance)),
                None => Throw(Val::error(
                    REFERENCE_ERROR,
                    format!("unknown closure id {}", id),
                )),
            }
        }
    }
}

/* ===================== Calls ===================== */

fn eval_call(cx: &mut ExecCx, callee: &Expr, args: &[Expr]) -> EvalResult {
    // Namespace calls (console.log, Timer.sleep, Promise.all, ...) dispatch
    // statically unless the namespace name is shadowed by a variable.
    if let Expr::Member {
        object, property, ..
    } = callee
    {
        if let Expr::Ident { name, .. } = object.as_ref() {
            if stdlib::is_namespace(name) && lookup_var(cx, name).is_none() {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(eval!(cx, arg));
                }
                return match stdlib::dispatch(cx, name, property, values) {
                    Some(result) => result,
                    None => Throw(Val::error(
                        TYPE_ERROR,
                        format!("{}.{} is not a function", name, property),
                    )),
                };
            }
        }
    }

    // Calling a program function by name starts it synchronously and yields
    // its completion promise.
    if let Expr::Ident { name, .. } = callee {
        if lookup_var(cx, name).is_none() {
            if let Some(func) = cx.rt.function(name) {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(eval!(cx, arg));
                }
                let promise = cx.rt.spawn_call(func, values, None, None);
                return Value(Val::Promise(promise));
            }
            return Throw(Val::error(
                REFERENCE_ERROR,
                format!("{} is not defined", name),
            ));
        }
    }

    let callee = eval!(cx, callee);
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval!(cx, arg));
    }
    call_value(cx, callee, values)
}

/// Invoke a first-class callable value (an async closure instance)
pub fn call_value(cx: &mut ExecCx, callee: Val, args: Vec<Val>) -> EvalResult {
    match callee {
        Val::Closure(instance) => match cx.rt.call_closure(&instance, args) {
            Some(promise) => Value(Val::Promise(promise)),
            None => Throw(Val::error(
                REFERENCE_ERROR,
                format!("closure instance {} no longer exists", instance),
            )),
        },
        other => Throw(Val::error(
            TYPE_ERROR,
            format!("{} is not callable", other.type_name()),
        )),
    }
}

/* ===================== Member and index access ===================== */

fn eval_member(object: &Val, property: &str) -> EvalResult {
    match object {
        Val::Obj(map) => Value(map.get(property).cloned().unwrap_or(Val::Null)),
        Val::List(items) if property == "length" => Value(Val::Num(items.len() as f64)),
        Val::Str(s) if property == "length" => Value(Val::Num(s.chars().count() as f64)),
        Val::Error(info) => match property {
            "code" => Value(Val::Str(info.code.clone())),
            "message" => Value(Val::Str(info.message.clone())),
            _ => Value(Val::Null),
        },
        other => Throw(Val::error(
            TYPE_ERROR,
            format!("cannot read property {} of {}", property, other.type_name()),
        )),
    }
}

fn eval_index(object: &Val, index: &Val) -> EvalResult {
    match (object, index) {
        (Val::List(items), Val::Num(n)) => {
            let idx = *n as usize;
            Value(items.get(idx).cloned().unwrap_or(Val::Null))
        }
        (Val::Obj(map), Val::Str(key)) => Value(map.get(key).cloned().unwrap_or(Val::Null)),
        (Val::Str(s), Val::Num(n)) => Value(
            s.chars()
                .nth(*n as usize)
                .map(|c| Val::Str(c.to_string()))
                .unwrap_or(Val::Null),
        ),
        (object, index) => Throw(Val::error(
            TYPE_ERROR,
            format!(
                "cannot index {} with {}",
                object.type_name(),
                index.type_name()
            ),
        )),
    }
}

/* ===================== Operators ===================== */

fn apply_binary(op: BinaryOp, left: Val, right: Val) -> EvalResult {
    match op {
        BinaryOp::Add => match (left, right) {
            (Val::Num(a), Val::Num(b)) => Value(Val::Num(a + b)),
            (Val::Str(a), b) => Value(Val::Str(format!("{}{}", a, b))),
            (a, Val::Str(b)) => Value(Val::Str(format!("{}{}", a, b))),
            (a, b) => Throw(type_error_binary("+", &a, &b)),
        },
        BinaryOp::Sub => numeric_op(left, right, "-", |a, b| a - b),
        BinaryOp::Mul => numeric_op(left, right, "*", |a, b| a * b),
        BinaryOp::Div => numeric_op(left, right, "/", |a, b| a / b),
        BinaryOp::Mod => numeric_op(left, right, "%", |a, b| a % b),

        BinaryOp::Eq => Value(Val::Bool(left == right)),
        BinaryOp::Ne => Value(Val::Bool(left != right)),

        BinaryOp::Lt => compare_op(left, right, "<", |o| o == std::cmp::Ordering::Less),
        BinaryOp::Le => compare_op(left, right, "<=", |o| o != std::cmp::Ordering::Greater),
        BinaryOp::Gt => compare_op(left, right, ">", |o| o == std::cmp::Ordering::Greater),
        BinaryOp::Ge => compare_op(left, right, ">=", |o| o != std::cmp::Ordering::Less),

        // Handled by the short-circuit paths above
        BinaryOp::And | BinaryOp::Or | BinaryOp::Nullish => {
            Throw(Val::error(TYPE_ERROR, "short-circuit operator fell through"))
        }
    }
}

fn numeric_op(left: Val, right: Val, symbol: &str, f: impl Fn(f64, f64) -> f64) -> EvalResult {
    match (left, right) {
        (Val::Num(a), Val::Num(b)) => Value(Val::Num(f(a, b))),
        (a, b) => Throw(type_error_binary(symbol, &a, &b)),
    }
}

fn compare_op(
    left: Val,
    right: Val,
    symbol: &str,
    f: impl Fn(std::cmp::Ordering) -> bool,
) -> EvalResult {
    let ordering = match (&left, &right) {
        (Val::Num(a), Val::Num(b)) => a.partial_cmp(b),
        (Val::Str(a), Val::Str(b)) => Some(a.cmp(b)),
        _ => None,
    };
    match ordering {
        Some(ordering) => Value(Val::Bool(f(ordering))),
        None => Throw(type_error_binary(symbol, &left, &right)),
    }
}

fn type_error_binary(symbol: &str, left: &Val, right: &Val) -> Val {
    Val::error(
        TYPE_ERROR,
        format!(
            "cannot apply {} to {} and {}",
            symbol,
            left.type_name(),
            right.type_name()
        ),
    )
}

/* ===================== Variable storage ===================== */

/// Where a name currently resolves
enum VarSlot {
    /// Transient scope of the current step, by scope index
    Scope(usize),
    /// Hoisted slot of the current frame
    Frame,
    /// Hoisted slot of an enclosing frame, reached through the capture chain
    Captured(FrameRef),
}

fn find_slot(cx: &ExecCx, name: &str) -> Option<VarSlot> {
    for (idx, scope) in cx.scopes.iter().enumerate().rev() {
        if scope.contains_key(name) {
            return Some(VarSlot::Scope(idx));
        }
    }
    if cx.frame.borrow().slots.contains_key(name) {
        return Some(VarSlot::Frame);
    }
    // Walk enclosing frames; a closure mutates the same storage its
    // enclosing frame uses, not a copy.
    let mut env = cx.frame.borrow().captured.clone();
    while let Some(outer) = env {
        if outer.borrow().slots.contains_key(name) {
            return Some(VarSlot::Captured(outer));
        }
        env = outer.borrow().captured.clone();
    }
    None
}

pub fn lookup_var(cx: &ExecCx, name: &str) -> Option<Val> {
    match find_slot(cx, name)? {
        VarSlot::Scope(idx) => cx.scopes[idx].get(name).cloned(),
        VarSlot::Frame => cx.frame.borrow().get_slot(name),
        VarSlot::Captured(outer) => outer.borrow().get_slot(name),
    }
}

/// Bind a new variable: hoisted names go to the frame, others to the
/// innermost transient scope.
pub fn declare_var(cx: &mut ExecCx, name: &str, value: Val) {
    if cx.analysis().is_hoisted(name) {
        cx.frame.borrow_mut().set_slot(name, value);
    } else if let Some(scope) = cx.scopes.last_mut() {
        scope.insert(name.to_string(), value);
    }
}

/// Assign to an existing variable, optionally through a member/index path
pub fn assign_var(
    cx: &mut ExecCx,
    name: &str,
    path: &[MemberAccess],
    value: Val,
) -> EvalResult {
    let Some(slot) = find_slot(cx, name) else {
        return Throw(Val::error(
            REFERENCE_ERROR,
            format!("{} is not defined", name),
        ));
    };

    if path.is_empty() {
        match slot {
            VarSlot::Scope(idx) => {
                cx.scopes[idx].insert(name.to_string(), value);
            }
            VarSlot::Frame => cx.frame.borrow_mut().set_slot(name, value),
            VarSlot::Captured(outer) => outer.borrow_mut().set_slot(name, value),
        }
        return Value(Val::Null);
    }

    // Evaluate index expressions up front, then rewrite the stored value.
    let mut keys = Vec::with_capacity(path.len());
    for access in path {
        match access {
            MemberAccess::Prop { property, .. } => keys.push(Val::Str(property.clone())),
            MemberAccess::Index { expr, .. } => keys.push(eval!(cx, expr)),
        }
    }

    let mut base = match &slot {
        VarSlot::Scope(idx) => cx.scopes[*idx].get(name).cloned(),
        VarSlot::Frame => cx.frame.borrow().get_slot(name),
        VarSlot::Captured(outer) => outer.borrow().get_slot(name),
    }
    .unwrap_or(Val::Null);

    if let Err(error) = write_path(&mut base, &keys, value) {
        return Throw(error);
    }

    match slot {
        VarSlot::Scope(idx) => {
            cx.scopes[idx].insert(name.to_string(), base);
        }
        VarSlot::Frame => cx.frame.borrow_mut().set_slot(name, base),
        VarSlot::Captured(outer) => outer.borrow_mut().set_slot(name, base),
    }
    Value(Val::Null)
}

fn write_path(target: &mut Val, keys: &[Val], value: Val) -> Result<(), Val> {
    let Some((key, rest)) = keys.split_first() else {
        *target = value;
        return Ok(());
    };

    match (target, key) {
        (Val::Obj(map), Val::Str(prop)) => {
            if rest.is_empty() {
                map.insert(prop.clone(), value);
                Ok(())
            } else {
                let next = map.get_mut(prop).ok_or_else(|| {
                    Val::error(TYPE_ERROR, format!("cannot assign through missing {}", prop))
                })?;
                write_path(next, rest, value)
            }
        }
        (Val::List(items), Val::Num(n)) => {
            let idx = *n as usize;
            let next = items.get_mut(idx).ok_or_else(|| {
                Val::error(
                    crate::errors::RANGE_ERROR,
                    format!("index {} out of bounds", idx),
                )
            })?;
            if rest.is_empty() {
                *next = value;
                Ok(())
            } else {
                write_path(next, rest, value)
            }
        }
        (target, key) => Err(Val::error(
            TYPE_ERROR,
            format!(
                "cannot assign into {} with {}",
                target.type_name(),
                key.type_name()
            ),
        )),
    }
}
