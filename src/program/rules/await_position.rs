//! Rule: Await Position
//!
//! Reports an error when `await` appears anywhere other than as the
//! outermost expression of a declaration initializer, an assignment value, a
//! `return` value, or an expression statement.
//!
//! # Valid
//!
//! ```text
//! await step()
//! let x = await step()
//! x = await step()
//! return await step()
//! ```
//!
//! # Invalid
//!
//! ```text
//! let x = (await step()) + 1    // await inside binary op
//! foo(await bar())              // await inside call args
//! if (await step()) { }         // await in a test position
//! for (let i = await a(); ...)  // await in a for clause
//! throw await step()            // await in a throw value
//! ```
//!
//! An await inside a nested async closure body is judged against that
//! closure's own statements.

use crate::ast::{Expr, MemberAccess, Stmt};
use crate::program::FunctionDef;

use super::{ValidationContext, ValidationError, ValidationRule};

/// Rule that restricts await to statement-outermost positions.
pub struct AwaitPositionRule;

impl ValidationRule for AwaitPositionRule {
    fn id(&self) -> &'static str {
        "await-position"
    }

    fn description(&self) -> &'static str {
        "await must be the outermost expression of a statement"
    }

    fn validate(&self, def: &FunctionDef, _ctx: &ValidationContext) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        check_stmt(&def.body, &mut errors, self.id());
        errors
    }
}

// ============================================================================
// AST Traversal
// ============================================================================

/// Check a statement, allowing await at "top level" positions
fn check_stmt(stmt: &Stmt, errors: &mut Vec<ValidationError>, rule_id: &'static str) {
    match stmt {
        // These ALLOW await as the outermost expression
        Stmt::Expr { expr, .. } => {
            check_top_level_expr(expr, errors, rule_id);
        }

        Stmt::Declare { init, .. } => {
            if let Some(init_expr) = init {
                check_top_level_expr(init_expr, errors, rule_id);
            }
        }

        Stmt::Assign { path, value, .. } => {
            for access in path {
                if let MemberAccess::Index { expr, .. } = access {
                    check_nested_expr(expr, errors, rule_id);
                }
            }
            check_top_level_expr(value, errors, rule_id);
        }

        Stmt::Return { value, .. } => {
            if let Some(expr) = value {
                check_top_level_expr(expr, errors, rule_id);
            }
        }

        // These DON'T allow await in their expressions
        Stmt::Throw { value, .. } => {
            check_nested_expr(value, errors, rule_id);
        }

        Stmt::If {
            test,
            then_s,
            else_s,
            ..
        } => {
            check_nested_expr(test, errors, rule_id);
            check_stmt(then_s, errors, rule_id);
            if let Some(else_stmt) = else_s {
                check_stmt(else_stmt, errors, rule_id);
            }
        }

        Stmt::While { test, body, .. } => {
            check_nested_expr(test, errors, rule_id);
            check_stmt(body, errors, rule_id);
        }

        Stmt::DoWhile { body, test, .. } => {
            check_stmt(body, errors, rule_id);
            check_nested_expr(test, errors, rule_id);
        }

        // No await in any of the three clauses; only the body may suspend
        Stmt::For {
            init,
            test,
            update,
            body,
            ..
        } => {
            if let Some(init_stmt) = init {
                check_clause_stmt(init_stmt, errors, rule_id);
            }
            if let Some(test_expr) = test {
                check_nested_expr(test_expr, errors, rule_id);
            }
            if let Some(update_stmt) = update {
                check_clause_stmt(update_stmt, errors, rule_id);
            }
            check_stmt(body, errors, rule_id);
        }

        Stmt::ForEach {
            iterable, body, ..
        } => {
            check_nested_expr(iterable, errors, rule_id);
            check_stmt(body, errors, rule_id);
        }

        Stmt::Try {
            body,
            catch_body,
            finally_body,
            ..
        } => {
            check_stmt(body, errors, rule_id);
            if let Some(catch_stmt) = catch_body {
                check_stmt(catch_stmt, errors, rule_id);
            }
            if let Some(finally_stmt) = finally_body {
                check_stmt(finally_stmt, errors, rule_id);
            }
        }

        Stmt::Block { body, .. } => {
            for stmt in body {
                check_stmt(stmt, errors, rule_id);
            }
        }

        // These don't contain expressions
        Stmt::Break { .. } | Stmt::Continue { .. } => {}
    }
}

/// A for-clause statement: awaits are forbidden even in positions that
/// would be top-level elsewhere.
fn check_clause_stmt(stmt: &Stmt, errors: &mut Vec<ValidationError>, rule_id: &'static str) {
    match stmt {
        Stmt::Declare { init: Some(expr), .. } => check_nested_expr(expr, errors, rule_id),
        Stmt::Assign { value, .. } => check_nested_expr(value, errors, rule_id),
        other => check_stmt(other, errors, rule_id),
    }
}

/// Check a "top level" expression where await IS allowed as the outermost
/// expr. If it's an await, that's valid - but we still check inside it.
fn check_top_level_expr(expr: &Expr, errors: &mut Vec<ValidationError>, rule_id: &'static str) {
    match expr {
        Expr::Await { inner, .. } => {
            check_nested_expr(inner, errors, rule_id);
        }
        _ => {
            check_nested_expr(expr, errors, rule_id);
        }
    }
}

/// Check an expression where await is NOT allowed.
fn check_nested_expr(expr: &Expr, errors: &mut Vec<ValidationError>, rule_id: &'static str) {
    match expr {
        Expr::Await { span, inner } => {
            errors.push(ValidationError::error(
                *span,
                "await must be the outermost expression of a statement",
                rule_id,
            ));
            // Continue checking inside for more nested awaits (report all)
            check_nested_expr(inner, errors, rule_id);
        }

        // A closure body is its own statement context
        Expr::AsyncClosure { body, .. } => {
            check_stmt(body, errors, rule_id);
        }

        Expr::Unary { operand, .. } => {
            check_nested_expr(operand, errors, rule_id);
        }

        Expr::Binary { left, right, .. } => {
            check_nested_expr(left, errors, rule_id);
            check_nested_expr(right, errors, rule_id);
        }

        Expr::Ternary {
            condition,
            consequent,
            alternate,
            ..
        } => {
            check_nested_expr(condition, errors, rule_id);
            check_nested_expr(consequent, errors, rule_id);
            check_nested_expr(alternate, errors, rule_id);
        }

        Expr::Call { callee, args, .. } => {
            check_nested_expr(callee, errors, rule_id);
            for arg in args {
                check_nested_expr(arg, errors, rule_id);
            }
        }

        Expr::Member { object, .. } => {
            check_nested_expr(object, errors, rule_id);
        }

        Expr::Index { object, index, .. } => {
            check_nested_expr(object, errors, rule_id);
            check_nested_expr(index, errors, rule_id);
        }

        Expr::LitList { elements, .. } => {
            for element in elements {
                check_nested_expr(element, errors, rule_id);
            }
        }

        Expr::LitObj { properties, .. } => {
            for (_, _, value) in properties {
                check_nested_expr(value, errors, rule_id);
            }
        }

        // These can't contain await
        Expr::Ident { .. }
        | Expr::This { .. }
        | Expr::LitBool { .. }
        | Expr::LitNum { .. }
        | Expr::LitStr { .. }
        | Expr::LitNull { .. } => {}
    }
}
