//! Where the explorer sends its results: the transition system and traces.

use crate::state::StateIndex;
use crate::trace::Trace;
use std::cell::RefCell;
use std::io;
use std::rc::Rc;

/// Receives the generated labelled transition system.
///
/// Transitions arrive in acceptance order and are never retracted. Indices
/// are the ones assigned by the state store.
pub trait OutputSink<A> {
    fn save_initial_state(&mut self, index: StateIndex);

    fn save_transition(&mut self, from: StateIndex, action: &A, to: StateIndex);

    /// Called once after a run that did not fail.
    fn finish(&mut self, _states: usize, _transitions: usize) {}
}

/// Persists counterexample traces under a name such as `run_dlk_0.trc`.
pub trait TraceWriter<S, A> {
    fn write(&mut self, trace: &Trace<S, A>, name: &str) -> io::Result<()>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl<A> OutputSink<A> for NullSink {
    fn save_initial_state(&mut self, _index: StateIndex) {}

    fn save_transition(&mut self, _from: StateIndex, _action: &A, _to: StateIndex) {}
}

/// Keeps the generated transition system in memory.
#[derive(Debug, Clone)]
pub struct MemoryLts<A> {
    pub initial_state: Option<StateIndex>,
    pub transitions: Vec<(StateIndex, A, StateIndex)>,
    /// State count reported by `finish`, None until the run finished.
    pub num_states: Option<usize>,
}

impl<A> Default for MemoryLts<A> {
    fn default() -> Self {
        Self {
            initial_state: None,
            transitions: Vec::new(),
            num_states: None,
        }
    }
}

impl<A> MemoryLts<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outgoing transitions of `from`, in acceptance order.
    pub fn outgoing(&self, from: StateIndex) -> impl Iterator<Item = &(StateIndex, A, StateIndex)> {
        self.transitions.iter().filter(move |(f, _, _)| *f == from)
    }

    pub fn is_finished(&self) -> bool {
        self.num_states.is_some()
    }
}

impl<A: Clone> OutputSink<A> for MemoryLts<A> {
    fn save_initial_state(&mut self, index: StateIndex) {
        self.initial_state = Some(index);
    }

    fn save_transition(&mut self, from: StateIndex, action: &A, to: StateIndex) {
        self.transitions.push((from, action.clone(), to));
    }

    fn finish(&mut self, states: usize, _transitions: usize) {
        self.num_states = Some(states);
    }
}

/// Collects written traces in a shared list. Clones share the same list, so
/// one handle can be given to the explorer and another kept for inspection.
#[derive(Debug)]
pub struct TraceCollector<S, A> {
    traces: Rc<RefCell<Vec<(String, Trace<S, A>)>>>,
}

impl<S, A> Clone for TraceCollector<S, A> {
    fn clone(&self) -> Self {
        Self {
            traces: Rc::clone(&self.traces),
        }
    }
}

impl<S, A> Default for TraceCollector<S, A> {
    fn default() -> Self {
        Self {
            traces: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<S: Clone, A: Clone> TraceCollector<S, A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names and traces written so far.
    pub fn traces(&self) -> Vec<(String, Trace<S, A>)> {
        self.traces.borrow().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.traces.borrow().iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Trace<S, A>> {
        self.traces
            .borrow()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, trace)| trace.clone())
    }
}

impl<S: Clone, A: Clone> TraceWriter<S, A> for TraceCollector<S, A> {
    fn write(&mut self, trace: &Trace<S, A>, name: &str) -> io::Result<()> {
        self.traces.borrow_mut().push((name.to_string(), trace.clone()));
        Ok(())
    }
}
