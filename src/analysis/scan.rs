//! Analysis traversal
//!
//! One lexical pass over the function body with bookkeeping stacks, then a
//! finalize step that applies the hoisting rules. The AST is never mutated.
//!
//! Nested async closures are not descended into for await or declaration
//! discovery (each closure is analyzed independently at link time); only
//! their free variables and receiver usage are collected here, because both
//! affect the enclosing function.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{Expr, MemberAccess, Stmt};

use super::{
    AsyncFunctionAnalysis, AwaitPoint, HoistReason, NodePath, PathStep, TryRegion, TryRegionId,
};

/// Analyze one async function body.
///
/// `outer_scope` holds the names visible from enclosing functions; it is
/// empty for top-level functions and populated when analyzing a nested
/// async closure.
pub fn analyze(params: &[String], body: &Stmt, outer_scope: &BTreeSet<String>) -> AsyncFunctionAnalysis {
    let mut scanner = Scanner::default();

    for param in params {
        scanner.record_decl(param.clone(), DeclKind::Param);
    }
    scanner.walk_stmt(body);

    scanner.finish(outer_scope)
}

/* ===================== Scanner state ===================== */

#[derive(Debug, Clone, Copy, PartialEq)]
enum DeclKind {
    Param,
    Local,
    /// Loop/iteration variable; `suspends` is filled in after the loop body
    /// has been walked.
    LoopVar { suspends: bool },
    CatchVar { region: TryRegionId },
}

struct Decl {
    name: String,
    /// Lexical position among declaration/await events
    seq: usize,
    kind: DeclKind,
}

#[derive(Default)]
struct Scanner {
    path: NodePath,
    try_stack: Vec<TryRegionId>,
    regions: Vec<TryRegion>,
    awaits: Vec<AwaitPoint>,
    trys_by_path: Vec<(NodePath, TryRegionId)>,
    iter_loops: Vec<(NodePath, u32)>,
    decls: Vec<Decl>,
    await_seqs: Vec<usize>,
    seq: usize,
    referenced: BTreeSet<String>,
    closure_captures: BTreeSet<String>,
    uses_receiver: bool,
    has_closures: bool,
}

impl Scanner {
    fn next_seq(&mut self) -> usize {
        self.seq += 1;
        self.seq
    }

    fn record_decl(&mut self, name: String, kind: DeclKind) -> usize {
        let seq = self.next_seq();
        self.decls.push(Decl { name, seq, kind });
        self.decls.len() - 1
    }

    fn record_await(&mut self) {
        let state = self.awaits.len() as u32;
        self.awaits.push(AwaitPoint {
            state_number: state,
            try_region: self.try_stack.last().copied(),
            path: self.path.clone(),
        });
        let seq = self.next_seq();
        self.await_seqs.push(seq);
    }

    fn with_step<F: FnOnce(&mut Self)>(&mut self, step: PathStep, f: F) {
        self.path.push(step);
        f(self);
        self.path.pop();
    }

    /* ===================== Statements ===================== */

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block { body, .. } => {
                for (i, child) in body.iter().enumerate() {
                    self.with_step(PathStep::Stmt(i), |s| s.walk_stmt(child));
                }
            }

            Stmt::Declare { name, init, .. } => {
                // The initializer evaluates before the binding exists, so an
                // await in it does not by itself force the variable into the
                // frame.
                if let Some(expr) = init {
                    self.walk_expr(expr);
                }
                self.record_decl(name.clone(), DeclKind::Local);
            }

            Stmt::Assign {
                var, path, value, ..
            } => {
                // An assignment target reads (and writes) storage too; it
                // counts as a reference for capture purposes.
                self.referenced.insert(var.clone());
                for access in path {
                    if let MemberAccess::Index { expr, .. } = access {
                        self.walk_expr(expr);
                    }
                }
                self.walk_expr(value);
            }

            Stmt::If {
                test,
                then_s,
                else_s,
                ..
            } => {
                self.walk_expr(test);
                self.with_step(PathStep::Then, |s| s.walk_stmt(then_s));
                if let Some(else_stmt) = else_s {
                    self.with_step(PathStep::Else, |s| s.walk_stmt(else_stmt));
                }
            }

            Stmt::While { test, body, .. } => {
                self.walk_expr(test);
                self.with_step(PathStep::Body, |s| s.walk_stmt(body));
            }

            Stmt::DoWhile { body, test, .. } => {
                self.with_step(PathStep::Body, |s| s.walk_stmt(body));
                self.walk_expr(test);
            }

            Stmt::For {
                init,
                test,
                update,
                body,
                ..
            } => {
                let loop_var = match init.as_deref() {
                    Some(Stmt::Declare {
                        name, init: value, ..
                    }) => {
                        if let Some(expr) = value {
                            self.walk_expr(expr);
                        }
                        Some(self.record_decl(name.clone(), DeclKind::LoopVar { suspends: false }))
                    }
                    Some(other) => {
                        self.walk_stmt(other);
                        None
                    }
                    None => None,
                };
                if let Some(expr) = test {
                    self.walk_expr(expr);
                }
                if let Some(update_stmt) = update {
                    self.walk_stmt(update_stmt);
                }

                let before = self.awaits.len();
                self.with_step(PathStep::Body, |s| s.walk_stmt(body));
                if self.awaits.len() > before {
                    if let Some(idx) = loop_var {
                        self.decls[idx].kind = DeclKind::LoopVar { suspends: true };
                    }
                }
            }

            Stmt::ForEach {
                binding,
                iterable,
                body,
                ..
            } => {
                self.walk_expr(iterable);
                let idx = self.record_decl(binding.clone(), DeclKind::LoopVar { suspends: false });
                let loop_path = self.path.clone();

                let before = self.awaits.len();
                self.with_step(PathStep::Body, |s| s.walk_stmt(body));
                if self.awaits.len() > before {
                    self.decls[idx].kind = DeclKind::LoopVar { suspends: true };
                    let loop_id = self.iter_loops.len() as u32;
                    self.iter_loops.push((loop_path, loop_id));
                }
            }

            Stmt::Return { value, .. } => {
                if let Some(expr) = value {
                    self.walk_expr(expr);
                }
            }

            Stmt::Throw { value, .. } => {
                self.walk_expr(value);
            }

            Stmt::Try {
                body,
                catch_var,
                catch_body,
                finally_body,
                ..
            } => {
                let id = self.regions.len() as TryRegionId;
                self.regions.push(TryRegion {
                    id,
                    parent: self.try_stack.last().copied(),
                    has_await_in_try: false,
                    has_await_in_catch: false,
                    has_await_in_finally: false,
                });
                self.trys_by_path.push((self.path.clone(), id));
                self.try_stack.push(id);

                let before = self.awaits.len();
                self.with_step(PathStep::TryBlock, |s| s.walk_stmt(body));
                self.regions[id as usize].has_await_in_try = self.awaits.len() > before;

                if let Some(catch_stmt) = catch_body {
                    // The catch binding counts as declared at the start of
                    // the catch body.
                    if let Some(name) = catch_var {
                        self.record_decl(name.clone(), DeclKind::CatchVar { region: id });
                    }
                    let before = self.awaits.len();
                    self.with_step(PathStep::CatchBlock, |s| s.walk_stmt(catch_stmt));
                    self.regions[id as usize].has_await_in_catch = self.awaits.len() > before;
                }

                if let Some(finally_stmt) = finally_body {
                    let before = self.awaits.len();
                    self.with_step(PathStep::FinallyBlock, |s| s.walk_stmt(finally_stmt));
                    self.regions[id as usize].has_await_in_finally = self.awaits.len() > before;
                }

                self.try_stack.pop();
            }

            Stmt::Expr { expr, .. } => {
                self.walk_expr(expr);
            }

            Stmt::Break { .. } | Stmt::Continue { .. } => {}
        }
    }

    /* ===================== Expressions ===================== */

    fn walk_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Await { inner, .. } => {
                self.record_await();
                self.walk_expr(inner);
            }

            Expr::Ident { name, .. } => {
                self.referenced.insert(name.clone());
            }

            Expr::This { .. } => {
                self.uses_receiver = true;
            }

            Expr::AsyncClosure { params, body, .. } => {
                self.has_closures = true;
                let free = FreeVars::collect(params, body);
                // An arrow inherits the receiver from its enclosing function,
                // so `this` inside it counts against this function.
                if free.uses_this {
                    self.uses_receiver = true;
                }
                for name in free.names {
                    self.closure_captures.insert(name.clone());
                    self.referenced.insert(name);
                }
            }

            Expr::Member { object, .. } => self.walk_expr(object),
            Expr::Index { object, index, .. } => {
                self.walk_expr(object);
                self.walk_expr(index);
            }
            Expr::Call { callee, args, .. } => {
                self.walk_expr(callee);
                for arg in args {
                    self.walk_expr(arg);
                }
            }
            Expr::Unary { operand, .. } => self.walk_expr(operand),
            Expr::Binary { left, right, .. } => {
                self.walk_expr(left);
                self.walk_expr(right);
            }
            Expr::Ternary {
                condition,
                consequent,
                alternate,
                ..
            } => {
                self.walk_expr(condition);
                self.walk_expr(consequent);
                self.walk_expr(alternate);
            }
            Expr::LitList { elements, .. } => {
                for element in elements {
                    self.walk_expr(element);
                }
            }
            Expr::LitObj { properties, .. } => {
                for (_, _, value) in properties {
                    self.walk_expr(value);
                }
            }

            Expr::LitBool { .. }
            | Expr::LitNum { .. }
            | Expr::LitStr { .. }
            | Expr::LitNull { .. } => {}
        }
    }

    /* ===================== Finalize ===================== */

    fn finish(mut self, outer_scope: &BTreeSet<String>) -> AsyncFunctionAnalysis {
        let mut hoisted: BTreeMap<String, HoistReason> = BTreeMap::new();
        let declared: BTreeSet<String> = self.decls.iter().map(|d| d.name.clone()).collect();

        for decl in &self.decls {
            let reason = self.hoist_reason(decl);
            if let Some(reason) = reason {
                hoisted.entry(decl.name.clone()).or_insert(reason);
            }
        }

        let captured_free: BTreeSet<String> = self
            .referenced
            .difference(&declared)
            .filter(|name| outer_scope.contains(*name))
            .cloned()
            .collect();

        AsyncFunctionAnalysis {
            await_points: std::mem::take(&mut self.awaits),
            try_regions: std::mem::take(&mut self.regions),
            hoisted,
            declared,
            captured_free,
            iter_loops: std::mem::take(&mut self.iter_loops),
            trys_by_path: std::mem::take(&mut self.trys_by_path),
            uses_enclosing_receiver: self.uses_receiver,
            has_nested_async_closures: self.has_closures,
        }
    }

    fn hoist_reason(&self, decl: &Decl) -> Option<HoistReason> {
        if self.closure_captures.contains(&decl.name) {
            return Some(HoistReason::CapturedByClosure);
        }
        if let DeclKind::LoopVar { suspends: true } = decl.kind {
            return Some(HoistReason::LoopVariable);
        }
        if let DeclKind::CatchVar { region } = decl.kind {
            let region = &self.regions[region as usize];
            if region.has_await_in_catch || region.has_await_in_finally {
                return Some(HoistReason::CatchBinding);
            }
        }
        // Declared before a later await and lexically in scope after it
        // (conservative: any await after the declaration point hoists).
        let crosses_await = self.await_seqs.iter().any(|&a| a > decl.seq);
        if crosses_await {
            return Some(match decl.kind {
                DeclKind::Param => HoistReason::Param,
                _ => HoistReason::DeclaredAcrossAwait,
            });
        }
        None
    }
}

/* ===================== Closure free variables ===================== */

/// Free-variable collection for a nested async closure subtree.
///
/// Flat walk: every referenced identifier minus every name bound anywhere in
/// the subtree (params, locals, loop and catch bindings, nested closure
/// params). Over-approximation is acceptable; captured names are only used to
/// force hoisting in the enclosing function.
struct FreeVars {
    referenced: BTreeSet<String>,
    bound: BTreeSet<String>,
    uses_this: bool,
}

struct FreeVarsResult {
    names: BTreeSet<String>,
    uses_this: bool,
}

impl FreeVars {
    fn collect(params: &[String], body: &Stmt) -> FreeVarsResult {
        let mut fv = FreeVars {
            referenced: BTreeSet::new(),
            bound: params.iter().cloned().collect(),
            uses_this: false,
        };
        fv.stmt(body);
        FreeVarsResult {
            names: fv.referenced.difference(&fv.bound).cloned().collect(),
            uses_this: fv.uses_this,
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block { body, .. } => body.iter().for_each(|s| self.stmt(s)),
            Stmt::Declare { name, init, .. } => {
                if let Some(expr) = init {
                    self.expr(expr);
                }
                self.bound.insert(name.clone());
            }
            Stmt::Assign { var, path, value, .. } => {
                // Assignment to an unbound name reads (and writes) the
                // enclosing frame's storage.
                if !self.bound.contains(var) {
                    self.referenced.insert(var.clone());
                }
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
            }
            Stmt::ForEach {
                binding,
                iterable,
                body,
                ..
            } => {
                self.expr(iterable);
                self.bound.insert(binding.clone());
                self.stmt(body);
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
                if let Some(name) = catch_var {
                    self.bound.insert(name.clone());
                }
                if let Some(catch_stmt) = catch_body {
                    self.stmt(catch_stmt);
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
            Expr::Ident { name, .. } => {
                if !self.bound.contains(name) {
                    self.referenced.insert(name.clone());
                }
            }
            Expr::This { .. } => self.uses_this = true,
            Expr::AsyncClosure { params, body, .. } => {
                let inner = FreeVars::collect(params, body);
                if inner.uses_this {
                    self.uses_this = true;
                }
                for name in inner.names {
                    if !self.bound.contains(&name) {
                        self.referenced.insert(name);
                    }
                }
            }
            Expr::Await { inner, .. } => self.expr(inner),
            Expr::Member { object, .. } => self.expr(object),
            Expr::Index { object, index, .. } => {
                self.expr(object);
                self.expr(index);
            }
            Expr::Call { callee, args, .. } => {
                self.expr(callee);
                args.iter().for_each(|a| self.expr(a));
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
            Expr::LitList { elements, .. } => elements.iter().for_each(|e| self.expr(e)),
            Expr::LitObj { properties, .. } => {
                properties.iter().for_each(|(_, _, v)| self.expr(v))
            }
            Expr::LitBool { .. }
            | Expr::LitNum { .. }
            | Expr::LitStr { .. }
            | Expr::LitNull { .. } => {}
        }
    }
}
