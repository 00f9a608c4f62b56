//! Program loading and linking
//!
//! A `Program` is the parser's output: named async function definitions over
//! the tagged-JSON AST. Linking validates every function, runs suspension
//! analysis on each body and on each nested async closure, and produces the
//! immutable `LinkedProgram` the runtime executes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use crate::analysis::{self, AsyncFunctionAnalysis};
use crate::ast::{Expr, MemberAccess, Stmt};
use crate::errors::ProgramError;

pub mod rules;

use rules::{ValidationContext, ValidationError};

/* ===================== Definitions ===================== */

/// One async function as the parser delivers it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Stmt,
}

/// A whole program (one compilation unit)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<FunctionDef>,
}

impl Program {
    pub fn from_json(source: &str) -> Result<Program, ProgramError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Program, ProgramError> {
        Ok(serde_json::from_value(value)?)
    }
}

/* ===================== Linked form ===================== */

/// An analyzed function: the body plus its immutable suspension analysis
#[derive(Debug)]
pub struct AsyncFunction {
    pub name: String,
    pub params: Vec<String>,
    pub body: Rc<Stmt>,
    pub analysis: AsyncFunctionAnalysis,
}

/// Validated and analyzed program, ready to execute
#[derive(Debug, Default)]
pub struct LinkedProgram {
    pub functions: HashMap<String, Rc<AsyncFunction>>,
    /// Nested async closures by their parser-assigned id
    pub closures: HashMap<u32, Rc<AsyncFunction>>,
}

/// Validate and analyze a program.
///
/// Every function and every nested async closure gets its own
/// `AsyncFunctionAnalysis`; closures are analyzed against the names visible
/// from their enclosing functions so captures resolve correctly.
pub fn link(program: &Program) -> Result<LinkedProgram, ProgramError> {
    let ctx = ValidationContext {
        function_names: program.functions.iter().map(|f| f.name.clone()).collect(),
    };

    let mut linked = LinkedProgram::default();

    for def in &program.functions {
        let errors: Vec<ValidationError> = rules::validate_function(def, &ctx)
            .into_iter()
            .filter(|e| e.is_error())
            .collect();
        if !errors.is_empty() {
            return Err(ProgramError::Validation {
                function: def.name.clone(),
                errors,
            });
        }

        let analysis = analysis::analyze_function(&def.params, &def.body);
        tracing::debug!(
            function = %def.name,
            await_points = analysis.state_count(),
            hoisted = analysis.hoisted.len(),
            "analyzed"
        );

        let mut scope_stack = vec![analysis.declared.clone()];
        collect_closures(&def.body, &mut scope_stack, &mut linked, &def.name)?;

        let func = Rc::new(AsyncFunction {
            name: def.name.clone(),
            params: def.params.clone(),
            body: Rc::new(def.body.clone()),
            analysis,
        });
        if linked.functions.insert(def.name.clone(), func).is_some() {
            return Err(ProgramError::DuplicateFunction(def.name.clone()));
        }
    }

    Ok(linked)
}

/* ===================== Closure collection ===================== */

fn collect_closures(
    stmt: &Stmt,
    scopes: &mut Vec<BTreeSet<String>>,
    linked: &mut LinkedProgram,
    parent: &str,
) -> Result<(), ProgramError> {
    visit_stmt(stmt, &mut |expr, scopes| {
        if let Expr::AsyncClosure {
            id, params, body, ..
        } = expr
        {
            let outer: BTreeSet<String> = scopes.iter().flatten().cloned().collect();
            let analysis = analysis::analyze(params, body, &outer);
            let func = Rc::new(AsyncFunction {
                name: format!("{}#closure{}", parent, id),
                params: params.clone(),
                body: Rc::new(body.as_ref().clone()),
                analysis,
            });
            let declared = func.analysis.declared.clone();
            if linked.closures.insert(*id, func).is_some() {
                return Err(ProgramError::DuplicateClosure {
                    function: parent.to_string(),
                    id: *id,
                });
            }
            // Deeper closures see this closure's names as well
            scopes.push(declared);
            collect_closures(body, scopes, linked, parent)?;
            scopes.pop();
        }
        Ok(())
    }, scopes)
}

/// Walk every expression of a statement tree in lexical order, without
/// descending into closure bodies (the callback recurses explicitly).
fn visit_stmt(
    stmt: &Stmt,
    f: &mut impl FnMut(&Expr, &mut Vec<BTreeSet<String>>) -> Result<(), ProgramError>,
    scopes: &mut Vec<BTreeSet<String>>,
) -> Result<(), ProgramError> {
    match stmt {
        Stmt::Block { body, .. } => {
            for child in body {
                visit_stmt(child, f, scopes)?;
            }
        }
        Stmt::Declare { init, .. } => {
            if let Some(expr) = init {
                visit_expr(expr, f, scopes)?;
            }
        }
        Stmt::Assign { path, value, .. } => {
            for access in path {
                if let MemberAccess::Index { expr, .. } = access {
                    visit_expr(expr, f, scopes)?;
                }
            }
            visit_expr(value, f, scopes)?;
        }
        Stmt::If {
            test,
            then_s,
            else_s,
            ..
        } => {
            visit_expr(test, f, scopes)?;
            visit_stmt(then_s, f, scopes)?;
            if let Some(else_stmt) = else_s {
                visit_stmt(else_stmt, f, scopes)?;
            }
        }
        Stmt::While { test, body, .. } => {
            visit_expr(test, f, scopes)?;
            visit_stmt(body, f, scopes)?;
        }
        Stmt::DoWhile { body, test, .. } => {
            visit_stmt(body, f, scopes)?;
            visit_expr(test, f, scopes)?;
        }
        Stmt::For {
            init,
            test,
            update,
            body,
            ..
        } => {
            if let Some(init_stmt) = init {
                visit_stmt(init_stmt, f, scopes)?;
            }
            if let Some(expr) = test {
                visit_expr(expr, f, scopes)?;
            }
            if let Some(update_stmt) = update {
                visit_stmt(update_stmt, f, scopes)?;
            }
            visit_stmt(body, f, scopes)?;
        }
        Stmt::ForEach {
            iterable, body, ..
        } => {
            visit_expr(iterable, f, scopes)?;
            visit_stmt(body, f, scopes)?;
        }
        Stmt::Return { value, .. } => {
            if let Some(expr) = value {
                visit_expr(expr, f, scopes)?;
            }
        }
        Stmt::Throw { value, .. } => visit_expr(value, f, scopes)?,
        Stmt::Try {
            body,
            catch_body,
            finally_body,
            ..
        } => {
            visit_stmt(body, f, scopes)?;
            if let Some(catch_stmt) = catch_body {
                visit_stmt(catch_stmt, f, scopes)?;
            }
            if let Some(finally_stmt) = finally_body {
                visit_stmt(finally_stmt, f, scopes)?;
            }
        }
        Stmt::Expr { expr, .. } => visit_expr(expr, f, scopes)?,
        Stmt::Break { .. } | Stmt::Continue { .. } => {}
    }
    Ok(())
}

fn visit_expr(
    expr: &Expr,
    f: &mut impl FnMut(&Expr, &mut Vec<BTreeSet<String>>) -> Result<(), ProgramError>,
    scopes: &mut Vec<BTreeSet<String>>,
) -> Result<(), ProgramError> {
    f(expr, scopes)?;
    match expr {
        // The callback handles closure bodies itself
        Expr::AsyncClosure { .. } => {}

        Expr::Await { inner, .. } => visit_expr(inner, f, scopes)?,
        Expr::Member { object, .. } => visit_expr(object, f, scopes)?,
        Expr::Index { object, index, .. } => {
            visit_expr(object, f, scopes)?;
            visit_expr(index, f, scopes)?;
        }
        Expr::Call { callee, args, .. } => {
            visit_expr(callee, f, scopes)?;
            for arg in args {
                visit_expr(arg, f, scopes)?;
            }
        }
        Expr::Unary { operand, .. } => visit_expr(operand, f, scopes)?,
        Expr::Binary { left, right, .. } => {
            visit_expr(left, f, scopes)?;
            visit_expr(right, f, scopes)?;
        }
        Expr::Ternary {
            condition,
            consequent,
            alternate,
            ..
        } => {
            visit_expr(condition, f, scopes)?;
            visit_expr(consequent, f, scopes)?;
            visit_expr(alternate, f, scopes)?;
        }
        Expr::LitList { elements, .. } => {
            for element in elements {
                visit_expr(element, f, scopes)?;
            }
        }
        Expr::LitObj { properties, .. } => {
            for (_, _, value) in properties {
                visit_expr(value, f, scopes)?;
            }
        }
        Expr::Ident { .. }
        | Expr::This { .. }
        | Expr::LitBool { .. }
        | Expr::LitNum { .. }
        | Expr::LitStr { .. }
        | Expr::LitNull { .. } => {}
    }
    Ok(())
}
