//! Semantic validation rules
//!
//! Rules run at link time, before analysis; a program that passes them
//! satisfies the structural assumptions the analyzer and driver rely on.
//! One rule per file.

use serde::{Deserialize, Serialize};

use crate::ast::Span;
use crate::program::FunctionDef;

mod await_position;
mod redeclaration;
mod undefined_variable;


pub use await_position::AwaitPositionRule;
pub use redeclaration::RedeclarationRule;
pub use undefined_variable::UndefinedVariableRule;

/* ===================== Errors ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub span: Span,
    pub message: String,
    pub rule: String,
    pub severity: Severity,
}

impl ValidationError {
    pub fn error(span: Span, message: impl Into<String>, rule: &str) -> Self {
        Self {
            span,
            message: message.into(),
            rule: rule.to_string(),
            severity: Severity::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}]",
            self.span.start_line + 1,
            self.span.start_col + 1,
            self.message,
            self.rule
        )
    }
}

/* ===================== Rules ===================== */

/// Context shared by all rules for one validation run
pub struct ValidationContext {
    /// Names of every function in the program (callable by identifier)
    pub function_names: Vec<String>,
}

pub trait ValidationRule {
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn validate(&self, def: &FunctionDef, ctx: &ValidationContext) -> Vec<ValidationError>;
}

/// Run every rule against one function definition
pub fn validate_function(def: &FunctionDef, ctx: &ValidationContext) -> Vec<ValidationError> {
    let rules: Vec<Box<dyn ValidationRule>> = vec![
        Box::new(AwaitPositionRule),
        Box::new(RedeclarationRule),
        Box::new(UndefinedVariableRule),
    ];

    let mut errors = Vec::new();
    for rule in rules {
        errors.extend(rule.validate(def, ctx));
    }
    errors
}
