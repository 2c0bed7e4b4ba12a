//! A next-state generator backed by an explicit adjacency list.

use crate::error::GeneratorError;
use crate::generator::{Action, NextStateGenerator, Successor};
use crate::state::StateValue;
use indexmap::{IndexMap, IndexSet};
use std::fmt;

/// Name of the internal action.
pub const TAU: &str = "tau";

/// A named action, optionally internal and optionally carrying a numeric
/// priority parameter.
///
/// Multi-actions are written with `|` between their components
/// (`"send|recv"`); [`Action::has_label`] matches any component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
    name: String,
    internal: bool,
    priority: Option<u64>,
}

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            internal: false,
            priority: None,
        }
    }

    pub fn tau() -> Self {
        Self {
            name: TAU.to_string(),
            internal: true,
            priority: None,
        }
    }

    /// An internal action with a custom name.
    pub fn internal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            internal: true,
            priority: None,
        }
    }

    pub fn with_priority(mut self, priority: u64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Option<u64> {
        self.priority
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.priority {
            Some(p) => write!(f, "{}({})", self.name, p),
            None => f.write_str(&self.name),
        }
    }
}

impl Action for Label {
    type Param = u64;

    fn is_internal(&self) -> bool {
        self.internal
    }

    fn has_label(&self, name: &str) -> bool {
        self.name.split('|').any(|part| part == name)
    }

    fn priority_param(&self) -> Option<u64> {
        self.priority
    }
}

/// Transition system given by its edges.
///
/// Successors are produced in the order edges were added. States listed with
/// [`fail_at`](Self::fail_at) make the generator fail when expanded, after
/// yielding their regular successors.
#[derive(Debug, Clone)]
pub struct ExplicitModel<S> {
    initial: S,
    edges: IndexMap<S, Vec<Successor<Label, S>>>,
    failures: IndexMap<S, String>,
    initial_failure: Option<String>,
    prioritised: Option<String>,
}

impl<S: StateValue> ExplicitModel<S> {
    pub fn new(initial: S) -> Self {
        Self {
            initial,
            edges: IndexMap::new(),
            failures: IndexMap::new(),
            initial_failure: None,
            prioritised: None,
        }
    }

    pub fn edge(mut self, from: S, action: Label, to: S) -> Self {
        self.add_edge(from, action, to, false);
        self
    }

    /// An edge flagged as confluent.
    pub fn confluent_edge(mut self, from: S, action: Label, to: S) -> Self {
        self.add_edge(from, action, to, true);
        self
    }

    pub fn fail_at(mut self, state: S, message: impl Into<String>) -> Self {
        self.failures.insert(state, message.into());
        self
    }

    /// Make `initial_state` fail.
    pub fn fail_initial(mut self, message: impl Into<String>) -> Self {
        self.initial_failure = Some(message.into());
        self
    }

    pub fn add_edge(&mut self, from: S, action: Label, to: S, confluent: bool) {
        self.edges.entry(from).or_default().push(Successor {
            action,
            state: to,
            confluent,
        });
    }

    pub fn initial(&self) -> &S {
        &self.initial
    }

    /// Every state mentioned by the model, initial state first.
    pub fn states(&self) -> IndexSet<S> {
        let mut states = IndexSet::new();
        states.insert(self.initial.clone());
        for (from, succs) in &self.edges {
            states.insert(from.clone());
            for succ in succs {
                states.insert(succ.state.clone());
            }
        }
        states
    }

    pub fn num_edges(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Outgoing edges of `state`.
    pub fn edges_from(&self, state: &S) -> &[Successor<Label, S>] {
        self.edges.get(state).map_or(&[], Vec::as_slice)
    }

    /// The confluence action passed to `prioritise`, if any.
    pub fn prioritised(&self) -> Option<&str> {
        self.prioritised.as_deref()
    }
}

impl<S: StateValue> NextStateGenerator for ExplicitModel<S> {
    type State = S;
    type Action = Label;
    type Successors = std::vec::IntoIter<Result<Successor<Label, S>, GeneratorError>>;

    fn initial_state(&self) -> Result<S, GeneratorError> {
        match &self.initial_failure {
            Some(message) => Err(GeneratorError::new(message.clone())),
            None => Ok(self.initial.clone()),
        }
    }

    fn successors(&self, state: &S) -> Self::Successors {
        let mut out: Vec<_> = self.edges_from(state).iter().cloned().map(Ok).collect();
        if let Some(message) = self.failures.get(state) {
            out.push(Err(GeneratorError::new(message.clone())));
        }
        out.into_iter()
    }

    fn prioritise(&mut self, action: &str) {
        self.prioritised = Some(action.to_string());
    }
}
