//! Capabilities the explorer consumes: next-state generation and priority
//! comparison.

use crate::error::GeneratorError;
use crate::state::StateValue;
use std::fmt;

/// An action label on a transition.
///
/// Opaque to the explorer apart from the predicates below.
pub trait Action: Clone + fmt::Debug + fmt::Display {
    /// Value type of the distinguished numeric priority parameter.
    type Param: Clone + fmt::Debug;

    /// Whether this is an internal (tau) action.
    fn is_internal(&self) -> bool;

    /// Whether the action carries the action name `name`. Multi-actions
    /// answer true for any of their components.
    fn has_label(&self, name: &str) -> bool;

    /// The priority parameter, if the action has one of the distinguished
    /// sort. Actions without one are never filtered by priority strategies.
    fn priority_param(&self) -> Option<Self::Param> {
        None
    }
}

/// One successor produced by a [`NextStateGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Successor<A, S> {
    pub action: A,
    pub state: S,
    /// The transition was verified confluent (prioritised). Only meaningful
    /// when confluence reduction is enabled.
    pub confluent: bool,
}

impl<A, S> Successor<A, S> {
    pub fn new(action: A, state: S) -> Self {
        Self {
            action,
            state,
            confluent: false,
        }
    }

    pub fn confluent(action: A, state: S) -> Self {
        Self {
            action,
            state,
            confluent: true,
        }
    }
}

/// The implicit transition relation being explored.
///
/// `successors` returns an owned, lazy, finite iterator scoped to one state.
/// It is pulled to exhaustion or dropped; it is never rewound.
pub trait NextStateGenerator {
    type State: StateValue;
    type Action: Action;
    type Successors: Iterator<Item = Result<Successor<Self::Action, Self::State>, GeneratorError>>;

    fn initial_state(&self) -> Result<Self::State, GeneratorError>;

    fn successors(&self, state: &Self::State) -> Self::Successors;

    /// Called once before exploration when confluence reduction is enabled
    /// with the given tau action name. Generators that detect confluence
    /// start flagging confluent transitions from here on.
    fn prioritise(&mut self, _action: &str) {}
}

/// Priority parameter type of a generator's actions.
pub type ParamOf<G> = <<G as NextStateGenerator>::Action as Action>::Param;

/// Compares priority parameters for the value-prioritized strategies.
pub trait Comparator<P> {
    fn greater(&self, a: &P, b: &P) -> Result<bool, GeneratorError>;
    fn equal(&self, a: &P, b: &P) -> Result<bool, GeneratorError>;
}

/// Comparator for parameters with a total order.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrdComparator;

impl<P: Ord> Comparator<P> for OrdComparator {
    fn greater(&self, a: &P, b: &P) -> Result<bool, GeneratorError> {
        Ok(a > b)
    }

    fn equal(&self, a: &P, b: &P) -> Result<bool, GeneratorError> {
        Ok(a == b)
    }
}
