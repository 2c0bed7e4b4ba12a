//! Reference oracles and helpers for testing the explorer on small explicit
//! graphs.
//!
//! The oracles are deliberately naive (plain reachability over the edge
//! list) so that they share no code with the engine under test.

use lts_explore::{
    ExplicitModel, ExploreConfig, Explorer, Label, MemoryLts, NextStateGenerator, OrdComparator,
    StateIndex, Strategy, Summary, TraceCollector,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// An edge of a generated graph: source, target, internal, confluent.
pub type Edge = (u32, u32, bool, bool);

pub type TestExplorer = Explorer<ExplicitModel<u32>, OrdComparator, MemoryLts<Label>>;

/// Build a model from an edge list, with initial state 0.
///
/// Visible edges are labelled `a{from}_{to}` so every transition can be told
/// apart by its label.
pub fn build_model(edges: &[Edge]) -> ExplicitModel<u32> {
    let mut model = ExplicitModel::new(0u32);
    for &(from, to, internal, confluent) in edges {
        let label = if internal {
            Label::tau()
        } else {
            Label::new(format!("a{from}_{to}"))
        };
        model.add_edge(from, label, to, internal && confluent);
    }
    model
}

pub fn config(strategy: Strategy) -> ExploreConfig {
    ExploreConfig {
        strategy,
        seed: Some(0),
        ..ExploreConfig::default()
    }
}

pub fn explorer(model: ExplicitModel<u32>, config: ExploreConfig) -> TestExplorer {
    Explorer::initialise(config, model, OrdComparator, MemoryLts::new())
        .expect("test configuration should be valid")
}

/// Run to completion and return the summary with the explorer, for store
/// and sink inspection.
pub fn run(model: ExplicitModel<u32>, config: ExploreConfig) -> (Summary, TestExplorer) {
    let mut explorer = explorer(model, config);
    let summary = explorer.run().expect("exploration should succeed");
    (summary, explorer)
}

/// Run with traces collected in memory.
pub fn run_traced(
    model: ExplicitModel<u32>,
    config: ExploreConfig,
) -> (Summary, TestExplorer, TraceCollector<u32, Label>) {
    let collector = TraceCollector::new();
    let mut explorer = explorer(model, config).with_trace_writer(collector.clone());
    let summary = explorer.run().expect("exploration should succeed");
    (summary, explorer, collector)
}

/// Breadth-first distance of every state reachable from the initial state.
pub fn distances(model: &ExplicitModel<u32>) -> BTreeMap<u32, usize> {
    let mut dist = BTreeMap::new();
    let mut queue = VecDeque::new();
    dist.insert(*model.initial(), 0);
    queue.push_back(*model.initial());
    while let Some(s) = queue.pop_front() {
        let d = dist[&s];
        for succ in model.edges_from(&s) {
            if !dist.contains_key(&succ.state) {
                dist.insert(succ.state, d + 1);
                queue.push_back(succ.state);
            }
        }
    }
    dist
}

pub fn reachable(model: &ExplicitModel<u32>) -> BTreeSet<u32> {
    distances(model).into_keys().collect()
}

/// States reachable from `from` in one or more steps along edges accepted by
/// `follow`.
pub fn reach_plus(
    model: &ExplicitModel<u32>,
    from: u32,
    follow: impl Fn(&Label, bool) -> bool,
) -> BTreeSet<u32> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![from];
    while let Some(s) = stack.pop() {
        for succ in model.edges_from(&s) {
            if follow(&succ.action, succ.confluent) && seen.insert(succ.state) {
                stack.push(succ.state);
            }
        }
    }
    seen
}

/// Whether some state tau-reachable from `from` (itself included) lies on a
/// tau cycle.
pub fn diverges(model: &ExplicitModel<u32>, from: u32) -> bool {
    use lts_explore::Action;
    let tau = |a: &Label, _: bool| a.is_internal();
    let mut candidates = reach_plus(model, from, tau);
    candidates.insert(from);
    candidates
        .into_iter()
        .any(|s| reach_plus(model, s, tau).contains(&s))
}

/// Strongly connected components of the confluent subgraph, each tagged
/// with whether it is bottom (no confluent edge leaves it).
pub fn confluent_components(model: &ExplicitModel<u32>) -> Vec<(BTreeSet<u32>, bool)> {
    let confluent = |_: &Label, c: bool| c;
    let states = model.states();
    let reach: BTreeMap<u32, BTreeSet<u32>> = states
        .iter()
        .map(|&s| {
            let mut r = reach_plus(model, s, confluent);
            r.insert(s);
            (s, r)
        })
        .collect();

    let mut assigned = BTreeSet::new();
    let mut components = Vec::new();
    for &s in &states {
        if assigned.contains(&s) {
            continue;
        }
        let component: BTreeSet<u32> = reach[&s]
            .iter()
            .copied()
            .filter(|t| reach[t].contains(&s))
            .collect();
        let bottom = component.iter().all(|t| reach[t].is_subset(&component));
        assigned.extend(component.iter().copied());
        components.push((component, bottom));
    }
    components
}

/// Out-degree of a state in the model.
pub fn out_degree(model: &ExplicitModel<u32>, state: u32) -> usize {
    model.successors(&state).count()
}

/// The stored state behind an index of an exact store.
pub fn state_at(explorer: &TestExplorer, index: StateIndex) -> u32 {
    *explorer
        .store()
        .get(index)
        .expect("exact store should return every index it handed out")
}
