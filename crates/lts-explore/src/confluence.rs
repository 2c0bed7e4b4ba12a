//! Confluence reduction.
//!
//! States connected by confluent internal transitions are behaviourally
//! equivalent, so only one representative per class needs to be explored.
//! The representative is taken from the first bottom strongly connected
//! component reached over confluent transitions (Blom, "Partial
//! tau-confluence for efficient state space generation", CWI SEN-R0123).
//!
//! Within that component the representative is not the Tarjan root, which
//! depends on where the sweep started, but the member with the smallest
//! [`Fingerprint`]. Every member of a bottom component therefore maps to the
//! same state. Members whose 64-bit fingerprints collide are ordered by
//! discovery number instead, and that order does depend on the start state.

use crate::error::GeneratorError;
use crate::generator::NextStateGenerator;
use crate::state::{Fingerprint, StateValue};
use indexmap::IndexSet;
use tracing::trace;

/// Computes confluence representatives with an iterative Tarjan sweep.
///
/// Every `get_repr` call starts from empty working tables. States visited
/// during a call get dense local indices (0 = the start state) and the sweep
/// itself runs on those integers, so the search depth is limited by heap
/// memory only.
pub struct ConfluenceReducer<S> {
    enabled: bool,
    visited: IndexSet<S>,
    /// Discovery number, 0 = not yet discovered.
    number: Vec<usize>,
    low: Vec<usize>,
    /// Confluent successors still to be examined, last entry first.
    pending: Vec<Vec<usize>>,
    /// DFS parent.
    parent: Vec<Option<usize>>,
    /// Discovered states in discovery order.
    stack: Vec<usize>,
}

impl<S: StateValue> ConfluenceReducer<S> {
    /// A reducer that returns every state unchanged.
    pub fn disabled() -> Self {
        Self::with_enabled(false)
    }

    pub fn enabled() -> Self {
        Self::with_enabled(true)
    }

    fn with_enabled(enabled: bool) -> Self {
        Self {
            enabled,
            visited: IndexSet::new(),
            number: Vec::new(),
            low: Vec::new(),
            pending: Vec::new(),
            parent: Vec::new(),
            stack: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Representative of the confluence class of `state`.
    ///
    /// Only transitions the generator flags as confluent are followed. The
    /// first component found to be closed under confluent transitions is a
    /// bottom component; its member with the smallest fingerprint is the
    /// representative, so every member of a bottom component maps to the same
    /// state and representatives are fixed points.
    pub fn get_repr<G>(&mut self, generator: &G, state: S) -> Result<S, GeneratorError>
    where
        G: NextStateGenerator<State = S>,
    {
        if !self.enabled {
            return Ok(state);
        }
        self.reset();

        let mut v = self.intern(state);
        let mut count = 0;
        loop {
            if self.number[v] == 0 {
                count += 1;
                self.number[v] = count;
                self.low[v] = count;
                self.stack.push(v);

                let current = self.visited[v].clone();
                let mut pending = Vec::new();
                for succ in generator.successors(&current) {
                    let succ = succ?;
                    if succ.confluent {
                        pending.push(self.intern(succ.state));
                    }
                }
                pending.reverse();
                self.pending[v] = pending;
            }

            if let Some(u) = self.pending[v].pop() {
                let nu = self.number[u];
                if nu == 0 {
                    self.parent[u] = Some(v);
                    v = u;
                } else if nu < self.number[v] && nu < self.low[v] {
                    self.low[v] = nu;
                }
            } else {
                if self.number[v] == self.low[v] {
                    break;
                }
                match self.parent[v] {
                    Some(p) => {
                        self.low[p] = self.low[p].min(self.low[v]);
                        v = p;
                    }
                    // The start state has the smallest number, so it always
                    // satisfies number == low.
                    None => break,
                }
            }
        }

        // Nothing has been popped off the discovery stack yet, so the
        // component rooted at v is everything discovered from v onwards.
        let start = self.stack.iter().position(|&x| x == v).unwrap_or(0);
        let repr = self.stack[start..]
            .iter()
            .copied()
            .min_by_key(|&x| (Fingerprint::of(&self.visited[x]), self.number[x]))
            .unwrap_or(v);

        trace!(
            visited = self.visited.len(),
            component = self.stack.len() - start,
            "computed confluence representative"
        );
        Ok(self.visited[repr].clone())
    }

    fn reset(&mut self) {
        self.visited.clear();
        self.number.clear();
        self.low.clear();
        self.pending.clear();
        self.parent.clear();
        self.stack.clear();
    }

    fn intern(&mut self, state: S) -> usize {
        let (i, is_new) = self.visited.insert_full(state);
        if is_new {
            self.number.push(0);
            self.low.push(0);
            self.pending.push(Vec::new());
            self.parent.push(None);
        }
        i
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explicit::{ExplicitModel, Label};

    fn diamond() -> ExplicitModel<&'static str> {
        ExplicitModel::new("A")
            .confluent_edge("A", Label::tau(), "B")
            .confluent_edge("A", Label::tau(), "C")
            .confluent_edge("B", Label::new("act"), "D")
            .confluent_edge("C", Label::new("act"), "D")
    }

    #[test]
    fn test_disabled_is_identity() {
        let model = diamond();
        let mut reducer = ConfluenceReducer::disabled();
        assert_eq!(reducer.get_repr(&model, "A").unwrap(), "A");
        assert_eq!(reducer.get_repr(&model, "B").unwrap(), "B");
    }

    #[test]
    fn test_diamond_collapses() {
        let model = diamond();
        let mut reducer = ConfluenceReducer::enabled();
        let a = reducer.get_repr(&model, "A").unwrap();
        let b = reducer.get_repr(&model, "B").unwrap();
        let c = reducer.get_repr(&model, "C").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a, "D");
    }

    #[test]
    fn test_no_confluent_successors_is_own_repr() {
        let model = ExplicitModel::new(1u32)
            .edge(1, Label::tau(), 2)
            .edge(2, Label::new("a"), 3);
        let mut reducer = ConfluenceReducer::enabled();
        assert_eq!(reducer.get_repr(&model, 1).unwrap(), 1);
        assert_eq!(reducer.get_repr(&model, 2).unwrap(), 2);
    }

    #[test]
    fn test_self_loop_is_absorbed() {
        let model = ExplicitModel::new(1u32).confluent_edge(1, Label::tau(), 1);
        let mut reducer = ConfluenceReducer::enabled();
        assert_eq!(reducer.get_repr(&model, 1).unwrap(), 1);
    }

    #[test]
    fn test_cycle_members_share_repr() {
        // 1 -> 2 -> 3 -> 1 is a confluent cycle with no way out
        let model = ExplicitModel::new(0u32)
            .confluent_edge(0, Label::tau(), 1)
            .confluent_edge(1, Label::tau(), 2)
            .confluent_edge(2, Label::tau(), 3)
            .confluent_edge(3, Label::tau(), 1);
        let mut reducer = ConfluenceReducer::enabled();

        let r0 = reducer.get_repr(&model, 0).unwrap();
        assert_ne!(r0, 0);
        for s in 1..=3 {
            assert_eq!(reducer.get_repr(&model, s).unwrap(), r0);
        }
        assert_eq!(reducer.get_repr(&model, r0).unwrap(), r0);
    }

    #[test]
    fn test_repr_is_smallest_fingerprint_member() {
        let model = ExplicitModel::new(1u32)
            .confluent_edge(1, Label::tau(), 2)
            .confluent_edge(2, Label::tau(), 3)
            .confluent_edge(3, Label::tau(), 1);
        let expected = (1..=3u32).min_by_key(|s| Fingerprint::of(s)).unwrap();

        let mut reducer = ConfluenceReducer::enabled();
        for s in 1..=3 {
            assert_eq!(reducer.get_repr(&model, s).unwrap(), expected);
        }
    }

    #[test]
    fn test_generator_error_propagates() {
        let model = ExplicitModel::new(1u32)
            .confluent_edge(1, Label::tau(), 2)
            .fail_at(2, "boom");
        let mut reducer = ConfluenceReducer::enabled();
        let err = reducer.get_repr(&model, 1).unwrap_err();
        assert_eq!(err.message(), "boom");

        // Working tables are reset: an unrelated call still works
        assert_eq!(reducer.get_repr(&model, 3).unwrap(), 3);
    }
}
