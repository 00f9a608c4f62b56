//! Rule: Undefined Variable
//!
//! Reports an error when an identifier is read or assigned without a
//! declaration in scope. Scope tracking follows statement order: a name is
//! visible after its declaration statement, loop bindings are visible in
//! their loop body, catch bindings in their catch block, and closure bodies
//! see the scopes of every enclosing function. Program function names and
//! builtin namespaces are always visible.

use std::collections::BTreeSet;

use crate::ast::{Expr, MemberAccess, Stmt};
use crate::program::FunctionDef;
use crate::stdlib;

use super::{ValidationContext, ValidationError, ValidationRule};

pub struct UndefinedVariableRule;

impl ValidationRule for UndefinedVariableRule {
    fn id(&self) -> &'static str {
        "undefined-variable"
    }

    fn description(&self) -> &'static str {
        "identifiers must be declared before use"
    }

    fn validate(&self, def: &FunctionDef, ctx: &ValidationContext) -> Vec<ValidationError> {
        let mut checker = Checker {
            scopes: vec![ctx.function_names.iter().cloned().collect()],
            errors: Vec::new(),
            rule_id: self.id(),
        };
        checker.push_scope();
        for param in &def.params {
            checker.declare(param);
        }
        checker.stmt(&def.body);
        checker.errors
    }
}

struct Checker {
    scopes: Vec<BTreeSet<String>>,
    errors: Vec<ValidationError>,
    rule_id: &'static str,
}

impl Checker {
    fn push_scope(&mut self) {
        self.scopes.push(BTreeSet::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn is_visible(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn reference(&mut self, name: &str, span: crate::ast::Span) {
        if !self.is_visible(name) && !stdlib::is_namespace(name) {
            self.errors.push(ValidationError::error(
                span,
                format!("{} is not defined", name),
                self.rule_id,
            ));
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block { body, .. } => {
                self.push_scope();
                for child in body {
                    self.stmt(child);
                }
                self.pop_scope();
            }
            Stmt::Declare { name, init, .. } => {
                if let Some(expr) = init {
                    self.expr(expr);
                }
                self.declare(name);
            }
            Stmt::Assign {
                var,
                path,
                value,
                span,
                ..
            } => {
                self.reference(var, *span);
                for access in path {
                    if let MemberAccess::Index { expr, .. } = access {
                        self.expr(expr);
                    }
                }
                self.expr(value);
            }
            Stmt::If {
                test,
                then_s,
                else_s,
                ..
            } => {
                self.expr(test);
                self.stmt(then_s);
                if let Some(else_stmt) = else_s {
                    self.stmt(else_stmt);
                }
            }
            Stmt::While { test, body, .. } => {
                self.expr(test);
                self.stmt(body);
            }
            Stmt::DoWhile { body, test, .. } => {
                self.stmt(body);
                self.expr(test);
            }
            Stmt::For {
                init,
                test,
                update,
                body,
                ..
            } => {
                self.push_scope();
                if let Some(init_stmt) = init {
                    self.stmt(init_stmt);
                }
                if let Some(expr) = test {
                    self.expr(expr);
                }
                if let Some(update_stmt) = update {
                    self.stmt(update_stmt);
                }
                self.stmt(body);
                self.pop_scope();
            }
            Stmt::ForEach {
                binding,
                iterable,
                body,
                ..
            } => {
                self.expr(iterable);
                self.push_scope();
                self.declare(binding);
                self.stmt(body);
                self.pop_scope();
            }
            Stmt::Return { value, .. } => {
                if let Some(expr) = value {
                    self.expr(expr);
                }
            }
            Stmt::Throw { value, .. } => self.expr(value),
            Stmt::Try {
                body,
                catch_var,
                catch_body,
                finally_body,
                ..
            } => {
                self.stmt(body);
                if let Some(catch_stmt) = catch_body {
                    self.push_scope();
                    if let Some(name) = catch_var {
                        self.declare(name);
                    }
                    self.stmt(catch_stmt);
                    self.pop_scope();
                }
                if let Some(finally_stmt) = finally_body {
                    self.stmt(finally_stmt);
                }
            }
            Stmt::Expr { expr, .. } => self.expr(expr),
            Stmt::Break { .. } | Stmt::Continue { .. } => {}
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Ident { name, span } => self.reference(name, *span),
            Expr::AsyncClosure { params, body, .. } => {
                // Closure bodies see every enclosing scope
                self.push_scope();
                for param in params {
                    self.declare(param);
                }
                self.stmt(body);
                self.pop_scope();
            }
            Expr::Await { inner, .. } => self.expr(inner),
            Expr::Member { object, .. } => {
                // Namespace heads (console, Timer, Promise) resolve even
                // without a declaration; everything else must.
                if let Expr::Ident { name, span } = object.as_ref() {
                    if !stdlib::is_namespace(name) {
                        self.reference(name, *span);
                    }
                } else {
                    self.expr(object);
                }
            }
            Expr::Index { object, index, .. } => {
                self.expr(object);
                self.expr(index);
            }
            Expr::Call { callee, args, .. } => {
                self.expr(callee);
                for arg in args {
                    self.expr(arg);
                }
            }
            Expr::Unary { operand, .. } => self.expr(operand),
            Expr::Binary { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::Ternary {
                condition,
                consequent,
                alternate,
                ..
            } => {
                self.expr(condition);
                self.expr(consequent);
                self.expr(alternate);
            }
            Expr::LitList { elements, .. } => {
                for element in elements {
                    self.expr(element);
                }
            }
            Expr::LitObj { properties, .. } => {
                for (_, _, value) in properties {
                    self.expr(value);
                }
            }
            Expr::This { .. }
            | Expr::LitBool { .. }
            | Expr::LitNum { .. }
            | Expr::LitStr { .. }
            | Expr::LitNull { .. } => {}
        }
    }
}
