//! Detection of tau cycles reachable from a state.

use crate::error::GeneratorError;
use crate::generator::{Action, NextStateGenerator};
use crate::state::StateValue;
use indexmap::IndexSet;

struct Frame {
    id: usize,
    successors: Vec<usize>,
    pos: usize,
}

/// Searches the internal-transition subgraph for a cycle.
///
/// The search is an iterative depth-first sweep that keeps the states on the
/// current path. An internal transition back into the path closes a cycle.
/// Each state is entered at most once per call, so a call costs time linear
/// in the tau-reachable part of the state space.
pub struct DivergenceDetector<S> {
    visited: IndexSet<S>,
    entered: Vec<bool>,
    on_path: Vec<bool>,
    frames: Vec<Frame>,
}

impl<S: StateValue> Default for DivergenceDetector<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StateValue> DivergenceDetector<S> {
    pub fn new() -> Self {
        Self {
            visited: IndexSet::new(),
            entered: Vec::new(),
            on_path: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Whether an infinite sequence of internal transitions starts in `state`.
    pub fn has_divergence<G>(&mut self, generator: &G, state: &S) -> Result<bool, GeneratorError>
    where
        G: NextStateGenerator<State = S>,
    {
        self.visited.clear();
        self.entered.clear();
        self.on_path.clear();
        self.frames.clear();

        let root = self.intern(state.clone());
        if self.enter(generator, root)? {
            return Ok(true);
        }

        while let Some(frame) = self.frames.last_mut() {
            if frame.pos == frame.successors.len() {
                self.on_path[frame.id] = false;
                self.frames.pop();
                continue;
            }
            let u = frame.successors[frame.pos];
            frame.pos += 1;

            if self.on_path[u] {
                return Ok(true);
            }
            if !self.entered[u] && self.enter(generator, u)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Push a frame for `id`. Returns true if one of its tau successors is
    /// already on the path (this includes tau self-loops).
    fn enter<G>(&mut self, generator: &G, id: usize) -> Result<bool, GeneratorError>
    where
        G: NextStateGenerator<State = S>,
    {
        self.entered[id] = true;
        self.on_path[id] = true;

        let current = self.visited[id].clone();
        let mut successors = Vec::new();
        for succ in generator.successors(&current) {
            let succ = succ?;
            if succ.action.is_internal() {
                successors.push(self.intern(succ.state));
            }
        }
        if successors.iter().any(|&u| self.on_path[u]) {
            return Ok(true);
        }
        self.frames.push(Frame {
            id,
            successors,
            pos: 0,
        });
        Ok(false)
    }

    fn intern(&mut self, state: S) -> usize {
        let (i, is_new) = self.visited.insert_full(state);
        if is_new {
            self.entered.push(false);
            self.on_path.push(false);
        }
        i
    }
}
