//! Promise cells and composite resolution
//!
//! A promise cell is the minimal awaitable surface the driver needs: is it
//! settled, what did it settle to, and who to notify when it does. Timer
//! cells settle when the runtime clock passes their fire instant; composite
//! cells (all/any/race) settle from their children's states and are
//! re-evaluated whenever a child settles.

use chrono::{DateTime, Utc};

use crate::errors::{ErrorInfo, AGGREGATE_ERROR};
use crate::frame::FrameRef;
use crate::values::Val;

/// Settlement state of one promise
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    Pending,
    Resolved(Val),
    Rejected(Val),
}

impl PromiseState {
    pub fn is_pending(&self) -> bool {
        matches!(self, PromiseState::Pending)
    }

    /// Settled result as the driver consumes it, if settled
    pub fn settled(&self) -> Option<Result<Val, Val>> {
        match self {
            PromiseState::Pending => None,
            PromiseState::Resolved(v) => Some(Ok(v.clone())),
            PromiseState::Rejected(e) => Some(Err(e.clone())),
        }
    }
}

/// Who to notify when a promise settles
#[derive(Debug)]
pub enum Waiter {
    /// A suspended frame; enqueued on the runtime ready queue
    Frame(FrameRef),
    /// A composite promise to re-evaluate
    Composite(String),
}

/// Combinator semantics of a composite promise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKind {
    /// Resolve with every value once all resolve; reject fast on the first
    /// rejection
    All,
    /// Resolve with the first resolution; reject only when every child has
    /// rejected
    Any,
    /// Settle exactly as the first settled child does
    Race,
}

#[derive(Debug)]
pub enum PromiseKind {
    Plain,
    Timer { fire_at: DateTime<Utc> },
    Composite { kind: CompositeKind, children: Vec<String> },
}

#[derive(Debug)]
pub struct PromiseCell {
    pub state: PromiseState,
    pub waiters: Vec<Waiter>,
    pub kind: PromiseKind,
}

impl PromiseCell {
    pub fn plain() -> Self {
        Self {
            state: PromiseState::Pending,
            waiters: Vec::new(),
            kind: PromiseKind::Plain,
        }
    }

    pub fn settled(result: Result<Val, Val>) -> Self {
        Self {
            state: match result {
                Ok(v) => PromiseState::Resolved(v),
                Err(e) => PromiseState::Rejected(e),
            },
            waiters: Vec::new(),
            kind: PromiseKind::Plain,
        }
    }

    pub fn timer(fire_at: DateTime<Utc>) -> Self {
        Self {
            state: PromiseState::Pending,
            waiters: Vec::new(),
            kind: PromiseKind::Timer { fire_at },
        }
    }

    pub fn composite(kind: CompositeKind, children: Vec<String>) -> Self {
        Self {
            state: PromiseState::Pending,
            waiters: Vec::new(),
            kind: PromiseKind::Composite { kind, children },
        }
    }
}

/// Decide a composite's settlement from its children's settled results
/// (index-aligned, `None` while a child is pending). Returns `None` while
/// the composite must stay pending.
pub fn resolve_composite(
    kind: CompositeKind,
    children: &[Option<Result<Val, Val>>],
) -> Option<Result<Val, Val>> {
    match kind {
        CompositeKind::All => {
            // Fail fast on the first rejection, in child order.
            for child in children {
                if let Some(Err(error)) = child {
                    return Some(Err(error.clone()));
                }
            }
            let mut values = Vec::with_capacity(children.len());
            for child in children {
                match child {
                    Some(Ok(value)) => values.push(value.clone()),
                    Some(Err(_)) => unreachable!("rejections returned above"),
                    None => return None,
                }
            }
            Some(Ok(Val::List(values)))
        }

        CompositeKind::Any => {
            let mut all_rejected = true;
            for child in children {
                match child {
                    Some(Ok(value)) => return Some(Ok(value.clone())),
                    Some(Err(_)) => {}
                    None => all_rejected = false,
                }
            }
            if all_rejected {
                Some(Err(Val::Error(ErrorInfo::new(
                    AGGREGATE_ERROR,
                    "all promises rejected",
                ))))
            } else {
                None
            }
        }

        CompositeKind::Race => {
            for child in children {
                match child {
                    Some(Ok(value)) => return Some(Ok(value.clone())),
                    Some(Err(error)) => return Some(Err(error.clone())),
                    None => {}
                }
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(n: f64) -> Option<Result<Val, Val>> {
        Some(Ok(Val::Num(n)))
    }

    fn err(code: &str) -> Option<Result<Val, Val>> {
        Some(Err(Val::error(code, "boom")))
    }

    #[test]
    fn all_waits_for_every_child() {
        assert_eq!(resolve_composite(CompositeKind::All, &[ok(1.0), None]), None);
        assert_eq!(
            resolve_composite(CompositeKind::All, &[ok(1.0), ok(2.0)]),
            Some(Ok(Val::List(vec![Val::Num(1.0), Val::Num(2.0)])))
        );
    }

    #[test]
    fn all_rejects_fast() {
        // A pending child does not delay the rejection
        let result = resolve_composite(CompositeKind::All, &[None, err("E")]);
        assert!(matches!(result, Some(Err(_))));
    }

    #[test]
    fn any_resolves_on_first_success() {
        let result = resolve_composite(CompositeKind::Any, &[err("E"), ok(7.0), None]);
        assert_eq!(result, Some(Ok(Val::Num(7.0))));
    }

    #[test]
    fn any_aggregates_when_all_reject() {
        let result = resolve_composite(CompositeKind::Any, &[err("A"), err("B")]);
        match result {
            Some(Err(Val::Error(info))) => assert_eq!(info.code, AGGREGATE_ERROR),
            other => panic!("expected aggregate error, got {:?}", other),
        }
    }

    #[test]
    fn any_stays_pending_while_a_child_might_resolve() {
        assert_eq!(resolve_composite(CompositeKind::Any, &[err("A"), None]), None);
    }

    #[test]
    fn race_settles_with_first_settled() {
        let result = resolve_composite(CompositeKind::Race, &[None, err("E"), ok(1.0)]);
        assert!(matches!(result, Some(Err(_))));
        assert_eq!(resolve_composite(CompositeKind::Race, &[None, None]), None);
    }
}
