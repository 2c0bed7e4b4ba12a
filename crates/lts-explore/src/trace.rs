//! Counterexample traces and their reconstruction from backpointers.

use crate::confluence::ConfluenceReducer;
use crate::error::{ExploreError, ExploreResult, GeneratorError};
use crate::generator::NextStateGenerator;
use crate::state::StateIndex;
use crate::store::StateStore;

/// One step of a trace: the action taken and the state it led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep<S, A> {
    pub action: A,
    pub state: S,
}

/// A path from the initial state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace<S, A> {
    initial: S,
    steps: Vec<TraceStep<S, A>>,
}

impl<S, A> Trace<S, A> {
    pub fn new(initial: S) -> Self {
        Self {
            initial,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, action: A, state: S) {
        self.steps.push(TraceStep { action, state });
    }

    pub fn initial(&self) -> &S {
        &self.initial
    }

    pub fn steps(&self) -> &[TraceStep<S, A>] {
        &self.steps
    }

    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The state the trace ends in.
    pub fn last_state(&self) -> &S {
        self.steps.last().map_or(&self.initial, |step| &step.state)
    }

    pub fn actions(&self) -> impl Iterator<Item = &A> + '_ {
        self.steps.iter().map(|step| &step.action)
    }

    /// All states along the trace, the initial one included.
    pub fn states(&self) -> impl Iterator<Item = &S> + '_ {
        std::iter::once(&self.initial).chain(self.steps.iter().map(|step| &step.state))
    }
}

/// File name for a trace: `"{prefix}_{info}.trc"`, or `"{info}.trc"` when
/// the prefix is empty.
pub fn trace_file_name(prefix: &str, info: &str) -> String {
    if prefix.is_empty() {
        format!("{info}.trc")
    } else {
        format!("{prefix}_{info}.trc")
    }
}

/// Rebuild the path from the initial state to `target`.
///
/// Follows `backpointers` back to the state without a parent and replays the
/// path forwards: for each recorded edge the predecessor's successors are
/// enumerated again and the first transition whose representative is the
/// recorded successor supplies the action. Confluent transitions are skipped
/// when the reducer is enabled, as they are during exploration.
pub fn reconstruct_trace<G>(
    generator: &G,
    reducer: &mut ConfluenceReducer<G::State>,
    store: &StateStore<G::State>,
    backpointers: &[Option<StateIndex>],
    target: StateIndex,
) -> ExploreResult<Trace<G::State, G::Action>>
where
    G: NextStateGenerator,
{
    let mut path = vec![target];
    let mut current = target;
    while let Some(parent) = backpointers.get(current.as_usize()).copied().flatten() {
        path.push(parent);
        current = parent;
    }
    path.reverse();

    let lookup = |index: StateIndex| store.get(index).ok_or(ExploreError::UnknownState(index));

    let mut trace = Trace::new(lookup(path[0])?.clone());
    for pair in path.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let from_state = lookup(from)?;
        let to_state = lookup(to)?;

        let mut found = None;
        for succ in generator.successors(from_state) {
            let succ = succ.map_err(|source| ExploreError::Generator {
                state: from,
                source,
                error_trace: None,
            })?;
            if reducer.is_enabled() && succ.confluent {
                continue;
            }
            let repr = reducer
                .get_repr(generator, succ.state)
                .map_err(|source| ExploreError::Generator {
                    state: from,
                    source,
                    error_trace: None,
                })?;
            if repr == *to_state {
                found = Some(succ.action);
                break;
            }
        }

        match found {
            Some(action) => trace.push(action, to_state.clone()),
            None => return Err(ExploreError::Inconsistent { from, to }),
        }
    }
    Ok(trace)
}

/// Replay the actions of `trace` through `generator` and return the reached
/// state, or None if some action is not enabled along the way.
///
/// Each step takes the first successor carrying an equal action label whose
/// representative is the recorded state.
pub fn replay_trace<G>(
    generator: &G,
    reducer: &mut ConfluenceReducer<G::State>,
    trace: &Trace<G::State, G::Action>,
) -> Result<Option<G::State>, GeneratorError>
where
    G: NextStateGenerator,
    G::Action: PartialEq,
{
    let mut current = generator.initial_state()?;
    current = reducer.get_repr(generator, current)?;
    if current != *trace.initial() {
        return Ok(None);
    }
    for step in trace.steps() {
        let mut next = None;
        for succ in generator.successors(&current) {
            let succ = succ?;
            if succ.action != step.action {
                continue;
            }
            let repr = reducer.get_repr(generator, succ.state)?;
            if repr == step.state {
                next = Some(repr);
                break;
            }
        }
        match next {
            Some(state) => current = state,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explicit::{ExplicitModel, Label};

    #[test]
    fn test_trace_file_name() {
        assert_eq!(trace_file_name("run", "dlk_0"), "run_dlk_0.trc");
        assert_eq!(trace_file_name("", "error"), "error.trc");
    }

    #[test]
    fn test_trace_accessors() {
        let mut trace: Trace<u32, &str> = Trace::new(0);
        assert!(trace.is_empty());
        assert_eq!(*trace.last_state(), 0);

        trace.push("a", 1);
        trace.push("b", 2);
        assert_eq!(trace.len(), 2);
        assert_eq!(*trace.last_state(), 2);
        assert_eq!(trace.actions().copied().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(trace.states().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    fn chain_store() -> (ExplicitModel<u32>, StateStore<u32>, Vec<Option<StateIndex>>) {
        let model = ExplicitModel::new(0u32)
            .edge(0, Label::new("a"), 1)
            .edge(0, Label::new("b"), 2)
            .edge(2, Label::new("c"), 3);
        let mut store = StateStore::exact(8);
        for s in 0..4u32 {
            store.add(&s);
        }
        let backpointers = vec![
            None,
            Some(StateIndex::new(0)),
            Some(StateIndex::new(0)),
            Some(StateIndex::new(2)),
        ];
        (model, store, backpointers)
    }

    #[test]
    fn test_reconstruct_follows_backpointers() {
        let (model, store, backpointers) = chain_store();
        let mut reducer = ConfluenceReducer::disabled();

        let trace =
            reconstruct_trace(&model, &mut reducer, &store, &backpointers, StateIndex::new(3))
                .unwrap();
        assert_eq!(*trace.initial(), 0);
        let names: Vec<String> = trace.actions().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(*trace.last_state(), 3);

        let reached = replay_trace(&model, &mut reducer, &trace).unwrap();
        assert_eq!(reached, Some(3));
    }

    #[test]
    fn test_reconstruct_initial_is_empty_trace() {
        let (model, store, backpointers) = chain_store();
        let mut reducer = ConfluenceReducer::disabled();
        let trace =
            reconstruct_trace(&model, &mut reducer, &store, &backpointers, StateIndex::new(0))
                .unwrap();
        assert!(trace.is_empty());
    }

    #[test]
    fn test_reconstruct_detects_bad_backpointer() {
        let (model, store, mut backpointers) = chain_store();
        // 1 is not a successor of 3
        backpointers[1] = Some(StateIndex::new(3));
        let mut reducer = ConfluenceReducer::disabled();

        let err =
            reconstruct_trace(&model, &mut reducer, &store, &backpointers, StateIndex::new(1))
                .unwrap_err();
        assert!(matches!(
            err,
            ExploreError::Inconsistent { from, to }
                if from == StateIndex::new(3) && to == StateIndex::new(1)
        ));
    }
}
