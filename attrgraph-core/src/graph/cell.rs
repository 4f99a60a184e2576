//! Value Cells
//!
//! The graph stores nodes of many value types side by side. The typed part of
//! a node (its cached value and rule) lives in a [`ValueCell<T>`]; the engine
//! only ever sees it through the object-safe [`AnyCell`] trait.

use std::any::Any;
use std::cell::RefCell;
use std::fmt::Debug;

/// Rule of a derived node.
pub(crate) type Rule<T> = Box<dyn Fn() -> T>;

/// Outcome of running a cell's rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Evaluation {
    /// A new value was stored and dependents must be told.
    Changed,

    /// The rule reproduced the previous value (equality-checked cells only).
    Unchanged,

    /// The cell has no rule to run.
    NoRule,
}

/// Type-independent view of a node's value storage.
pub(crate) trait AnyCell {
    fn as_any(&self) -> &dyn Any;

    fn has_value(&self) -> bool;

    /// `Debug` rendering of the cached value, if any.
    fn debug_value(&self) -> Option<String>;

    /// Run the rule and store its result.
    ///
    /// No borrow of the cached value is held while the rule runs, so the rule
    /// is free to read other nodes.
    fn evaluate(&self) -> Evaluation;
}

pub(crate) struct ValueCell<T> {
    value: RefCell<Option<T>>,
    rule: Option<Rule<T>>,
    equality: Option<fn(&T, &T) -> bool>,
}

impl<T> ValueCell<T> {
    pub fn source(value: T) -> Self {
        Self {
            value: RefCell::new(Some(value)),
            rule: None,
            equality: None,
        }
    }

    pub fn derived(rule: Rule<T>) -> Self {
        Self {
            value: RefCell::new(None),
            rule: Some(rule),
            equality: None,
        }
    }

    /// A derived cell that skips signalling dependents when a recompute
    /// yields an equal value.
    pub fn derived_eq(rule: Rule<T>) -> Self
    where
        T: PartialEq,
    {
        Self {
            equality: Some(<T as PartialEq>::eq),
            ..Self::derived(rule)
        }
    }

    pub fn get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.value.borrow().clone()
    }

    pub fn set(&self, value: T) {
        *self.value.borrow_mut() = Some(value);
    }
}

impl<T: Debug + 'static> AnyCell for ValueCell<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn has_value(&self) -> bool {
        self.value.borrow().is_some()
    }

    fn debug_value(&self) -> Option<String> {
        self.value.borrow().as_ref().map(|v| format!("{v:?}"))
    }

    fn evaluate(&self) -> Evaluation {
        let Some(rule) = &self.rule else {
            return Evaluation::NoRule;
        };

        let new_value = rule();

        let mut slot = self.value.borrow_mut();
        let unchanged = match (self.equality, slot.as_ref()) {
            (Some(eq), Some(old)) => eq(old, &new_value),
            _ => false,
        };
        *slot = Some(new_value);

        if unchanged {
            Evaluation::Unchanged
        } else {
            Evaluation::Changed
        }
    }
}
