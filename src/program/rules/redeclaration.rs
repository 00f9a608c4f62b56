//! Rule: Redeclaration
//!
//! Reports an error when a name is declared more than once in a function
//! body (parameters, `let`/`const`, loop bindings, and catch bindings all
//! count). Hoisted variable storage is keyed by source name, so two
//! bindings of the same name in one function would share a slot; rejecting
//! redeclaration keeps that keying sound. Each nested async closure body is
//! a fresh scope with its own name set.

use std::collections::BTreeSet;

use crate::ast::{Expr, MemberAccess, Span, Stmt};
use crate::program::FunctionDef;

use super::{ValidationContext, ValidationError, ValidationRule};

pub struct RedeclarationRule;

impl ValidationRule for RedeclarationRule {
    fn id(&self) -> &'static str {
        "redeclaration"
    }

    fn description(&self) -> &'static str {
        "a name may be declared only once per function body"
    }

    fn validate(&self, def: &FunctionDef, _ctx: &ValidationContext) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        check_function(&def.params, &def.body, &mut errors, self.id());
        errors
    }
}

fn check_function(
    params: &[String],
    body: &Stmt,
    errors: &mut Vec<ValidationError>,
    rule_id: &'static str,
) {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for param in params {
        if !seen.insert(param.clone()) {
            errors.push(ValidationError::error(
                Span::default(),
                format!("duplicate parameter {}", param),
                rule_id,
            ));
        }
    }
    check_stmt(body, &mut seen, errors, rule_id);
}

fn declare(
    name: &str,
    span: Span,
    seen: &mut BTreeSet<String>,
    errors: &mut Vec<ValidationError>,
    rule_id: &'static str,
) {
    if !seen.insert(name.to_string()) {
        errors.push(ValidationError::error(
            span,
            format!("{} is already declared", name),
            rule_id,
        ));
    }
}

fn check_stmt(
    stmt: &Stmt,
    seen: &mut BTreeSet<String>,
    errors: &mut Vec<ValidationError>,
    rule_id: &'static str,
) {
    match stmt {
        Stmt::Block { body, .. } => {
            for child in body {
                check_stmt(child, seen, errors, rule_id);
            }
        }
        Stmt::Declare {
            name, init, span, ..
        } => {
            if let Some(expr) = init {
                check_expr(expr, errors, rule_id);
            }
            declare(name, *span, seen, errors, rule_id);
        }
        Stmt::Assign { path, value, .. } => {
            for access in path {
                if let MemberAccess::Index { expr, .. } = access {
                    check_expr(expr, errors, rule_id);
                }
            }
            check_expr(value, errors, rule_id);
        }
        Stmt::If {
            test,
            then_s,
            else_s,
            ..
        } => {
            check_expr(test, errors, rule_id);
            check_stmt(then_s, seen, errors, rule_id);
            if let Some(else_stmt) = else_s {
                check_stmt(else_stmt, seen, errors, rule_id);
            }
        }
        Stmt::While { test, body, .. } => {
            check_expr(test, errors, rule_id);
            check_stmt(body, seen, errors, rule_id);
        }
        Stmt::DoWhile { body, test, .. } => {
            check_stmt(body, seen, errors, rule_id);
            check_expr(test, errors, rule_id);
        }
        Stmt::For {
            init,
            test,
            update,
            body,
            ..
        } => {
            if let Some(init_stmt) = init {
                check_stmt(init_stmt, seen, errors, rule_id);
            }
            if let Some(expr) = test {
                check_expr(expr, errors, rule_id);
            }
            if let Some(update_stmt) = update {
                check_stmt(update_stmt, seen, errors, rule_id);
            }
            check_stmt(body, seen, errors, rule_id);
        }
        Stmt::ForEach {
            binding,
            binding_span,
            iterable,
            body,
            ..
        } => {
            check_expr(iterable, errors, rule_id);
            declare(binding, *binding_span, seen, errors, rule_id);
            check_stmt(body, seen, errors, rule_id);
        }
        Stmt::Return { value, .. } => {
            if let Some(expr) = value {
                check_expr(expr, errors, rule_id);
            }
        }
        Stmt::Throw { value, .. } => check_expr(value, errors, rule_id),
        Stmt::Try {
            body,
            catch_var,
            catch_var_span,
            catch_body,
            finally_body,
            ..
        } => {
            check_stmt(body, seen, errors, rule_id);
            if let Some(catch_stmt) = catch_body {
                if let Some(name) = catch_var {
                    declare(name, *catch_var_span, seen, errors, rule_id);
                }
                check_stmt(catch_stmt, seen, errors, rule_id);
            }
            if let Some(finally_stmt) = finally_body {
                check_stmt(finally_stmt, seen, errors, rule_id);
            }
        }
        Stmt::Expr { expr, .. } => check_expr(expr, errors, rule_id),
        Stmt::Break { .. } | Stmt::Continue { .. } => {}
    }
}

/// Expressions only matter for the closures they contain
fn check_expr(expr: &Expr, errors: &mut Vec<ValidationError>, rule_id: &'static str) {
    match expr {
        Expr::AsyncClosure { params, body, .. } => {
            check_function(params, body, errors, rule_id);
        }
        Expr::Await { inner, .. } => check_expr(inner, errors, rule_id),
        Expr::Unary { operand, .. } => check_expr(operand, errors, rule_id),
        Expr::Binary { left, right, .. } => {
            check_expr(left, errors, rule_id);
            check_expr(right, errors, rule_id);
        }
        Expr::Ternary {
            condition,
            consequent,
            alternate,
            ..
        } => {
            check_expr(condition, errors, rule_id);
            check_expr(consequent, errors, rule_id);
            check_expr(alternate, errors, rule_id);
        }
        Expr::Call { callee, args, .. } => {
            check_expr(callee, errors, rule_id);
            for arg in args {
                check_expr(arg, errors, rule_id);
            }
        }
        Expr::Member { object, .. } => check_expr(object, errors, rule_id),
        Expr::Index { object, index, .. } => {
            check_expr(object, errors, rule_id);
            check_expr(index, errors, rule_id);
        }
        Expr::LitList { elements, .. } => {
            for element in elements {
                check_expr(element, errors, rule_id);
            }
        }
        Expr::LitObj { properties, .. } => {
            for (_, _, value) in properties {
                check_expr(value, errors, rule_id);
            }
        }
        Expr::Ident { .. }
        | Expr::This { .. }
        | Expr::LitBool { .. }
        | Expr::LitNum { .. }
        | Expr::LitStr { .. }
        | Expr::LitNull { .. } => {}
    }
}
