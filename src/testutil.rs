//! AST builders for tests
//!
//! The source-text parser lives upstream, so tests assemble the tagged AST
//! directly. Spans default to zero everywhere.

#![allow(dead_code)]

use crate::ast::{BinaryOp, Expr, ForEachKind, Span, Stmt, UnaryOp, VarKind};
use crate::program::{FunctionDef, Program};

/* ===================== Expressions ===================== */

pub fn null() -> Expr {
    Expr::LitNull { span: Span::default() }
}

pub fn num(v: f64) -> Expr {
    Expr::LitNum { v, span: Span::default() }
}

pub fn boolean(v: bool) -> Expr {
    Expr::LitBool { v, span: Span::default() }
}

pub fn string(v: &str) -> Expr {
    Expr::LitStr {
        v: v.to_string(),
        span: Span::default(),
    }
}

pub fn list(elements: Vec<Expr>) -> Expr {
    Expr::LitList {
        elements,
        span: Span::default(),
    }
}

pub fn obj(properties: Vec<(&str, Expr)>) -> Expr {
    Expr::LitObj {
        properties: properties
            .into_iter()
            .map(|(k, v)| (k.to_string(), Span::default(), v))
            .collect(),
        span: Span::default(),
    }
}

pub fn ident(name: &str) -> Expr {
    Expr::Ident {
        name: name.to_string(),
        span: Span::default(),
    }
}

pub fn this() -> Expr {
    Expr::This { span: Span::default() }
}

pub fn member(object: Expr, property: &str) -> Expr {
    Expr::Member {
        object: Box::new(object),
        property: property.to_string(),
        property_span: Span::default(),
        optional: false,
        span: Span::default(),
    }
}

pub fn index(object: Expr, idx: Expr) -> Expr {
    Expr::Index {
        object: Box::new(object),
        index: Box::new(idx),
        span: Span::default(),
    }
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call {
        callee: Box::new(callee),
        args,
        span: Span::default(),
    }
}

/// Namespace call like console.log(...)
pub fn ns_call(namespace: &str, property: &str, args: Vec<Expr>) -> Expr {
    call(member(ident(namespace), property), args)
}

pub fn await_(inner: Expr) -> Expr {
    Expr::Await {
        inner: Box::new(inner),
        span: Span::default(),
    }
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    Expr::Unary {
        op,
        operand: Box::new(operand),
        span: Span::default(),
    }
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        span: Span::default(),
    }
}

pub fn add(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Add, left, right)
}

pub fn lt(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Lt, left, right)
}

pub fn ternary(condition: Expr, consequent: Expr, alternate: Expr) -> Expr {
    Expr::Ternary {
        condition: Box::new(condition),
        consequent: Box::new(consequent),
        alternate: Box::new(alternate),
        span: Span::default(),
    }
}

pub fn closure(id: u32, params: &[&str], body: Vec<Stmt>) -> Expr {
    Expr::AsyncClosure {
        id,
        params: params.iter().map(|p| p.to_string()).collect(),
        body: Box::new(block(body)),
        span: Span::default(),
    }
}

/* ===================== Statements ===================== */

pub fn block(body: Vec<Stmt>) -> Stmt {
    Stmt::Block {
        body,
        span: Span::default(),
    }
}

pub fn let_(name: &str, init: Expr) -> Stmt {
    Stmt::Declare {
        var_kind: VarKind::Let,
        name: name.to_string(),
        init: Some(init),
        span: Span::default(),
    }
}

pub fn assign(var: &str, value: Expr) -> Stmt {
    Stmt::Assign {
        var: var.to_string(),
        path: Vec::new(),
        value,
        span: Span::default(),
    }
}

pub fn if_(test: Expr, then_body: Vec<Stmt>) -> Stmt {
    Stmt::If {
        test,
        then_s: Box::new(block(then_body)),
        else_s: None,
        span: Span::default(),
    }
}

pub fn if_else(test: Expr, then_body: Vec<Stmt>, else_body: Vec<Stmt>) -> Stmt {
    Stmt::If {
        test,
        then_s: Box::new(block(then_body)),
        else_s: Some(Box::new(block(else_body))),
        span: Span::default(),
    }
}

pub fn while_(test: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::While {
        test,
        body: Box::new(block(body)),
        label: None,
        span: Span::default(),
    }
}

pub fn do_while(body: Vec<Stmt>, test: Expr) -> Stmt {
    Stmt::DoWhile {
        body: Box::new(block(body)),
        test,
        label: None,
        span: Span::default(),
    }
}

/// for (let var = from; var < to; var = var + 1) { body }
pub fn for_count(var: &str, from: f64, to: f64, body: Vec<Stmt>) -> Stmt {
    Stmt::For {
        init: Some(Box::new(let_(var, num(from)))),
        test: Some(lt(ident(var), num(to))),
        update: Some(Box::new(assign(var, add(ident(var), num(1.0))))),
        body: Box::new(block(body)),
        label: None,
        span: Span::default(),
    }
}

pub fn for_of(binding: &str, iterable: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::ForEach {
        kind: ForEachKind::Of,
        binding: binding.to_string(),
        binding_span: Span::default(),
        iterable,
        body: Box::new(block(body)),
        label: None,
        span: Span::default(),
    }
}

pub fn for_in(binding: &str, iterable: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::ForEach {
        kind: ForEachKind::In,
        binding: binding.to_string(),
        binding_span: Span::default(),
        iterable,
        body: Box::new(block(body)),
        label: None,
        span: Span::default(),
    }
}

pub fn ret(value: Expr) -> Stmt {
    Stmt::Return {
        value: Some(value),
        span: Span::default(),
    }
}

pub fn ret_void() -> Stmt {
    Stmt::Return {
        value: None,
        span: Span::default(),
    }
}

pub fn throw(value: Expr) -> Stmt {
    Stmt::Throw {
        value,
        span: Span::default(),
    }
}

pub fn try_catch(body: Vec<Stmt>, catch_var: &str, catch_body: Vec<Stmt>) -> Stmt {
    Stmt::Try {
        body: Box::new(block(body)),
        catch_var: Some(catch_var.to_string()),
        catch_var_span: Span::default(),
        catch_body: Some(Box::new(block(catch_body))),
        finally_body: None,
        span: Span::default(),
    }
}

pub fn try_finally(body: Vec<Stmt>, finally_body: Vec<Stmt>) -> Stmt {
    Stmt::Try {
        body: Box::new(block(body)),
        catch_var: None,
        catch_var_span: Span::default(),
        catch_body: None,
        finally_body: Some(Box::new(block(finally_body))),
        span: Span::default(),
    }
}

pub fn try_catch_finally(
    body: Vec<Stmt>,
    catch_var: &str,
    catch_body: Vec<Stmt>,
    finally_body: Vec<Stmt>,
) -> Stmt {
    Stmt::Try {
        body: Box::new(block(body)),
        catch_var: Some(catch_var.to_string()),
        catch_var_span: Span::default(),
        catch_body: Some(Box::new(block(catch_body))),
        finally_body: Some(Box::new(block(finally_body))),
        span: Span::default(),
    }
}

pub fn expr(e: Expr) -> Stmt {
    Stmt::Expr {
        expr: e,
        span: Span::default(),
    }
}

pub fn brk() -> Stmt {
    Stmt::Break {
        label: None,
        span: Span::default(),
    }
}

pub fn cont() -> Stmt {
    Stmt::Continue {
        label: None,
        span: Span::default(),
    }
}

/* ===================== Programs ===================== */

pub fn func(name: &str, params: &[&str], body: Vec<Stmt>) -> FunctionDef {
    FunctionDef {
        name: name.to_string(),
        params: params.iter().map(|p| p.to_string()).collect(),
        body: block(body),
    }
}

pub fn program(functions: Vec<FunctionDef>) -> Program {
    Program { functions }
}
