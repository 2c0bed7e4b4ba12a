//! State space explorer.
//!
//! Drives a [`NextStateGenerator`] with one of five strategies, deduplicates
//! states in a [`StateStore`], streams the resulting transition system to an
//! [`OutputSink`] and reports deadlocks, divergences and watched actions.

use crate::config::{ExploreConfig, ProgressCounters, Strategy};
use crate::confluence::ConfluenceReducer;
use crate::divergence::DivergenceDetector;
use crate::error::{ExploreError, ExploreResult, GeneratorError};
use crate::generator::{Action, Comparator, NextStateGenerator, ParamOf};
use crate::queue::{LevelQueue, WalkWindow};
use crate::sink::{OutputSink, TraceWriter};
use crate::state::StateIndex;
use crate::store::StateStore;
use crate::trace::{reconstruct_trace, trace_file_name, Trace};
use indexmap::IndexSet;
use memory_stats::memory_stats;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Returns current process memory usage in MB, or None if unavailable.
fn current_memory_mb() -> Option<usize> {
    memory_stats().map(|stats| stats.physical_mem / (1024 * 1024))
}

/// Expanded states between two monitor lines.
const MONITOR_INTERVAL: usize = 1000;

/// Successors of one state after confluence reduction.
type Expansion<G> = SmallVec<
    [(
        <G as NextStateGenerator>::Action,
        <G as NextStateGenerator>::State,
    ); 8],
>;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Every stored state was expanded. Walks and value-prioritized runs
    /// that stop at a deadlock only complete if nothing else is left.
    Completed,
    /// Stopped at the first deadlock with stored states left unexpanded.
    Deadlock,
    /// `max_states` states were expanded (or walk steps taken) with work left.
    StateLimit,
    /// `max_traces` traces were written.
    TraceLimit,
    /// States were dropped because the frontier was bounded by `todo_max`.
    FrontierLimit,
    MemoryLimit,
    /// The stop flag was raised.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindingKind {
    Deadlock,
    Divergence,
    /// A transition carrying the watched action name.
    Action(String),
}

/// Something the detectors reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub kind: FindingKind,
    /// The deadlocked or divergent state, or the source of the watched
    /// transition.
    pub state: StateIndex,
    /// Name of the saved trace, if one was written.
    pub trace: Option<String>,
}

/// Result of a run that did not fail.
#[derive(Debug, Clone)]
pub struct Summary {
    pub states: usize,
    pub transitions: usize,
    /// Completed breadth-first levels; 0 for the other strategies.
    pub levels: usize,
    /// Expanded states, or steps for the walks.
    pub explored: usize,
    pub termination: Termination,
    pub findings: Vec<Finding>,
    /// Names of all traces written successfully.
    pub traces: Vec<String>,
}

impl Summary {
    pub fn is_complete(&self) -> bool {
        self.termination == Termination::Completed
    }

    pub fn deadlocks(&self) -> impl Iterator<Item = &Finding> + '_ {
        self.findings
            .iter()
            .filter(|f| f.kind == FindingKind::Deadlock)
    }
}

/// DFS stack entry: a state and its not yet examined successors.
struct DfsFrame<G: NextStateGenerator> {
    index: StateIndex,
    successors: smallvec::IntoIter<[(G::Action, G::State); 8]>,
}

/// Explicit state space explorer.
pub struct Explorer<G: NextStateGenerator, C, K> {
    config: ExploreConfig,
    generator: G,
    comparator: C,
    sink: K,
    trace_writer: Option<Box<dyn TraceWriter<G::State, G::Action>>>,
    store: StateStore<G::State>,
    /// First predecessor of every stored state. Only kept when traces can be
    /// requested.
    backpointers: Option<Vec<Option<StateIndex>>>,
    reducer: ConfluenceReducer<G::State>,
    divergence: DivergenceDetector<G::State>,
    rng: StdRng,
    transitions: usize,
    levels: usize,
    explored: usize,
    trace_count: usize,
    last_monitor: usize,
    findings: Vec<Finding>,
    traces: Vec<String>,
    stop: Option<Arc<AtomicBool>>,
    has_run: bool,
}

impl<G, C, K> Explorer<G, C, K>
where
    G: NextStateGenerator,
    C: Comparator<ParamOf<G>>,
    K: OutputSink<G::Action>,
{
    /// Set up an explorer. Fails on an incoherent configuration.
    ///
    /// When confluence reduction is enabled the generator is told the
    /// confluence action through [`NextStateGenerator::prioritise`].
    pub fn initialise(
        config: ExploreConfig,
        mut generator: G,
        comparator: C,
        sink: K,
    ) -> ExploreResult<Self> {
        config.validate()?;

        let reducer = match config.confluence() {
            Some(action) => {
                debug!(action, "applying confluence reduction");
                generator.prioritise(action);
                ConfluenceReducer::enabled()
            }
            None => ConfluenceReducer::disabled(),
        };
        if config.detect_deadlock {
            debug!("detecting deadlocks");
        }
        if config.detect_divergence {
            debug!("detecting divergences");
        }
        if config.detect_action && !config.trace_actions.is_empty() {
            debug!(actions = ?config.trace_actions, "detecting actions");
        }

        let store = if config.bithashing {
            debug!(bits = config.bithash_size, "using bithashing");
            StateStore::bithash(config.bithash_size)
        } else {
            StateStore::exact(config.initial_table_size)
        };
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let backpointers = config.needs_backpointers().then(Vec::new);

        Ok(Self {
            config,
            generator,
            comparator,
            sink,
            trace_writer: None,
            store,
            backpointers,
            reducer,
            divergence: DivergenceDetector::new(),
            rng,
            transitions: 0,
            levels: 0,
            explored: 0,
            trace_count: 0,
            last_monitor: 0,
            findings: Vec::new(),
            traces: Vec::new(),
            stop: None,
            has_run: false,
        })
    }

    /// Install the writer that receives traces.
    pub fn with_trace_writer<W>(mut self, writer: W) -> Self
    where
        W: TraceWriter<G::State, G::Action> + 'static,
    {
        self.trace_writer = Some(Box::new(writer));
        self
    }

    /// Stop the run at the next expanded state once `flag` is set.
    pub fn set_stop_flag(&mut self, flag: Arc<AtomicBool>) {
        self.stop = Some(flag);
    }

    pub fn config(&self) -> &ExploreConfig {
        &self.config
    }

    pub fn store(&self) -> &StateStore<G::State> {
        &self.store
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Progress so far as a summary-shaped snapshot.
    pub fn counters(&self) -> ProgressCounters {
        let counters = ProgressCounters::new();
        counters.publish(
            self.store.len(),
            self.transitions,
            self.levels,
            self.explored,
            self.trace_count,
        );
        counters
    }

    /// Path from the initial state to the stored state `index`.
    pub fn trace_to(&mut self, index: StateIndex) -> ExploreResult<Trace<G::State, G::Action>> {
        let Some(backpointers) = self.backpointers.as_deref() else {
            return Err(ExploreError::invalid_config(
                "traces are only available with trace or error trace saving enabled",
            ));
        };
        reconstruct_trace(
            &self.generator,
            &mut self.reducer,
            &self.store,
            backpointers,
            index,
        )
    }

    /// Generate the state space. Can be called once.
    pub fn run(&mut self) -> ExploreResult<Summary> {
        if self.has_run {
            return Err(ExploreError::AlreadyRun);
        }
        self.has_run = true;

        info!(
            strategy = %self.config.strategy,
            bithashing = self.config.bithashing,
            "generating state space"
        );

        let initial = self
            .generator
            .initial_state()
            .map_err(ExploreError::InitialState)?;
        let initial = self
            .reducer
            .get_repr(&self.generator, initial)
            .map_err(ExploreError::InitialState)?;
        let (initial_index, _) = self.store.add(&initial);
        if let Some(backpointers) = self.backpointers.as_mut() {
            backpointers.push(None);
        }
        self.sink.save_initial_state(initial_index);
        self.publish();

        let termination = match self.config.strategy {
            Strategy::Breadth if self.config.bithashing => {
                self.explore_breadth_bithash(initial_index, initial)?
            }
            Strategy::Breadth => self.explore_breadth()?,
            Strategy::Depth => self.explore_depth(initial_index, initial)?,
            Strategy::Random => self.explore_walk(initial_index, initial, false)?,
            Strategy::ValuePrioritized => self.explore_prioritized()?,
            Strategy::ValueRandomPrioritized => self.explore_walk(initial_index, initial, true)?,
        };

        self.publish();
        self.sink.finish(self.store.len(), self.transitions);

        let summary = Summary {
            states: self.store.len(),
            transitions: self.transitions,
            levels: self.levels,
            explored: self.explored,
            termination,
            findings: self.findings.clone(),
            traces: self.traces.clone(),
        };
        info!(
            states = summary.states,
            transitions = summary.transitions,
            termination = ?summary.termination,
            "done with state space generation"
        );
        Ok(summary)
    }

    fn explore_breadth(&mut self) -> ExploreResult<Termination> {
        let limit = self.config.max_states;
        let mut current = 0;
        let mut end_of_level = limit.min(self.store.len());
        let mut level_start = 0;
        let mut level_transitions = 0;

        while current < end_of_level {
            if let Some(stop) = self.checkpoint() {
                return Ok(stop);
            }

            let index = StateIndex::new(current);
            let state = self
                .store
                .get(index)
                .cloned()
                .ok_or(ExploreError::UnknownState(index))?;

            self.check_divergence(index, &state)?;
            let successors = self.expand(index, &state)?;
            if successors.is_empty() {
                self.report_deadlock(index)?;
            }
            for (action, next) in successors {
                self.add_transition(index, &action, &next)?;
            }

            current += 1;
            self.explored += 1;
            self.publish();

            if current == end_of_level {
                self.levels += 1;
                debug!(
                    level = self.levels,
                    states = current - level_start,
                    transitions = self.transitions - level_transitions,
                    "level done"
                );
                end_of_level = limit.min(self.store.len());
                level_start = current;
                level_transitions = self.transitions;
            }
        }

        info!(
            levels = self.levels,
            states = self.store.len(),
            transitions = self.transitions,
            "done with breadth-first search"
        );
        if current < self.store.len() {
            Ok(Termination::StateLimit)
        } else {
            Ok(Termination::Completed)
        }
    }

    /// Breadth-first search with a bounded level queue. States that do not
    /// fit in the queue are released from the bit-hash table.
    fn explore_breadth_bithash(
        &mut self,
        initial_index: StateIndex,
        initial: G::State,
    ) -> ExploreResult<Termination> {
        let limit = self.config.max_states;
        let mut queue = LevelQueue::new(limit.saturating_sub(1).min(self.config.todo_max));
        queue.start((initial_index, initial));

        let mut current = 0;
        let mut end_of_level = limit.min(self.store.len());
        let mut level_start = 0;
        let mut level_transitions = 0;
        let mut dropped = false;

        while current < end_of_level {
            if let Some(stop) = self.checkpoint() {
                return Ok(stop);
            }
            let Some((index, state)) = queue.get() else {
                break;
            };

            self.check_divergence(index, &state)?;
            let successors = self.expand(index, &state)?;
            if successors.is_empty() {
                self.report_deadlock(index)?;
            }
            for (action, next) in successors {
                let (next_index, is_new) = self.add_transition(index, &action, &next)?;
                if is_new {
                    if let Some((_, evicted)) = queue.put((next_index, next), &mut self.rng) {
                        self.store.remove(&evicted);
                        dropped = true;
                    }
                }
            }

            current += 1;
            self.explored += 1;
            self.publish();

            if current == end_of_level {
                queue.swap();
                self.levels += 1;
                debug!(
                    level = self.levels,
                    states = current - level_start,
                    transitions = self.transitions - level_transitions,
                    "level done"
                );
                end_of_level = limit.min(self.store.len());
                let room = limit.saturating_sub(self.store.len());
                if room < queue.max_size() {
                    queue.set_max_size(room);
                }
                level_start = current;
                level_transitions = self.transitions;
            }
        }

        info!(
            levels = self.levels,
            states = self.store.len(),
            transitions = self.transitions,
            "done with breadth-first search"
        );
        let work_left = queue.remaining() > 0 || queue.queued() > 0;
        if current >= limit && (work_left || dropped) {
            Ok(Termination::StateLimit)
        } else if dropped {
            Ok(Termination::FrontierLimit)
        } else {
            Ok(Termination::Completed)
        }
    }

    fn explore_depth(
        &mut self,
        initial_index: StateIndex,
        initial: G::State,
    ) -> ExploreResult<Termination> {
        let todo_max = self.config.todo_max;
        let mut capacity = todo_max.min(128);
        let mut stack: Vec<DfsFrame<G>> = Vec::with_capacity(capacity);
        let mut state_limit_hit = false;
        let mut overflow = false;

        if self.explored >= self.config.max_states {
            return Ok(Termination::StateLimit);
        }
        if let Some(stop) = self.checkpoint() {
            return Ok(stop);
        }
        stack.push(self.push_frame(initial_index, &initial)?);

        loop {
            let Some(top) = stack.last_mut() else {
                break;
            };
            let from = top.index;
            let Some((action, next)) = top.successors.next() else {
                stack.pop();
                continue;
            };

            let (index, is_new) = self.add_transition(from, &action, &next)?;
            if !is_new {
                continue;
            }
            if self.explored >= self.config.max_states {
                state_limit_hit = true;
                continue;
            }
            if stack.len() == capacity && capacity < todo_max {
                capacity = capacity.saturating_mul(2).min(todo_max);
                stack.reserve_exact(capacity - stack.len());
                trace!(capacity, "enlarged state stack");
            }
            if stack.len() < capacity {
                if let Some(stop) = self.checkpoint() {
                    return Ok(stop);
                }
                let frame = self.push_frame(index, &next)?;
                stack.push(frame);
            } else {
                overflow = true;
            }
        }

        info!(
            states = self.store.len(),
            transitions = self.transitions,
            "done with depth-first search"
        );
        if state_limit_hit {
            Ok(Termination::StateLimit)
        } else if overflow {
            Ok(Termination::FrontierLimit)
        } else {
            Ok(Termination::Completed)
        }
    }

    /// Expand a state about to be pushed on the DFS stack.
    fn push_frame(&mut self, index: StateIndex, state: &G::State) -> ExploreResult<DfsFrame<G>> {
        self.check_divergence(index, state)?;
        let successors = self.expand(index, state)?;
        if successors.is_empty() {
            self.report_deadlock(index)?;
        }
        self.explored += 1;
        self.publish();
        Ok(DfsFrame {
            index,
            successors: successors.into_iter(),
        })
    }

    /// Single walk. The plain random walk records every transition of the
    /// current state and moves along a random one; the prioritized walk only
    /// considers the lowest-priority transitions and records the one taken.
    fn explore_walk(
        &mut self,
        initial_index: StateIndex,
        initial: G::State,
        prioritized: bool,
    ) -> ExploreResult<Termination> {
        let mut window = self
            .store
            .is_bithashing()
            .then(|| WalkWindow::new(self.config.todo_max));
        if let Some(window) = window.as_mut() {
            window.push(initial.clone());
        }

        let mut index = initial_index;
        let mut state = initial;
        let mut termination = Termination::StateLimit;
        let mut expanded = IndexSet::new();

        while self.explored < self.config.max_states {
            if let Some(stop) = self.checkpoint() {
                return Ok(stop);
            }

            self.check_divergence(index, &state)?;
            let mut successors = self.expand(index, &state)?;
            if prioritized {
                successors = self.lowest_priority(index, successors)?;
            }
            expanded.insert(index);
            if successors.is_empty() {
                self.report_deadlock(index)?;
                termination = if expanded.len() < self.store.len() {
                    Termination::Deadlock
                } else {
                    Termination::Completed
                };
                break;
            }

            let chosen = self.rng.gen_range(0..successors.len());
            let mut next_step = None;
            for (i, (action, next)) in successors.into_iter().enumerate() {
                if prioritized && i != chosen {
                    continue;
                }
                let (next_index, is_new) = self.add_transition(index, &action, &next)?;
                if is_new {
                    if let Some(window) = window.as_mut() {
                        if let Some(evicted) = window.push(next.clone()) {
                            self.store.remove(&evicted);
                        }
                    }
                }
                if i == chosen {
                    next_step = Some((next_index, next));
                }
            }
            if let Some((next_index, next)) = next_step {
                index = next_index;
                state = next;
            }

            self.explored += 1;
            self.publish();
        }

        info!(
            steps = self.explored,
            states = self.store.len(),
            transitions = self.transitions,
            "done with random walk"
        );
        Ok(termination)
    }

    /// Explores the stored states in index order, keeping only the
    /// lowest-priority successors of each. Once more than `todo_max` states
    /// wait for expansion, each candidate is either dropped or admitted at the
    /// cost of skipping the oldest waiting state.
    fn explore_prioritized(&mut self) -> ExploreResult<Termination> {
        let todo_max = self.config.todo_max;
        let drop_probability = self.config.priority_drop_probability;
        let mut current = 0;
        let mut dropped = false;

        let termination = loop {
            if current >= self.store.len() {
                break if dropped {
                    Termination::FrontierLimit
                } else {
                    Termination::Completed
                };
            }
            if self.explored >= self.config.max_states {
                break Termination::StateLimit;
            }
            if let Some(stop) = self.checkpoint() {
                return Ok(stop);
            }

            let index = StateIndex::new(current);
            let state = self
                .store
                .get(index)
                .cloned()
                .ok_or(ExploreError::UnknownState(index))?;

            self.check_divergence(index, &state)?;
            let successors = self.expand(index, &state)?;
            let successors = self.lowest_priority(index, successors)?;
            if successors.is_empty() {
                self.report_deadlock(index)?;
                self.explored += 1;
                break if current + 1 < self.store.len() {
                    Termination::Deadlock
                } else if dropped {
                    Termination::FrontierLimit
                } else {
                    Termination::Completed
                };
            }

            for (action, next) in successors {
                if self.store.len() - current <= todo_max {
                    self.add_transition(index, &action, &next)?;
                } else if !self.rng.gen_bool(drop_probability) {
                    current += 1;
                    dropped = true;
                    self.add_transition(index, &action, &next)?;
                } else {
                    dropped = true;
                }
            }

            current += 1;
            self.explored += 1;
            self.publish();
        };

        info!(
            states = self.store.len(),
            transitions = self.transitions,
            todo_max,
            "done with value prioritized exploration"
        );
        Ok(termination)
    }

    /// Successors of `state` with confluent transitions removed and targets
    /// replaced by their representatives. Fails without recording anything.
    fn expand(&mut self, index: StateIndex, state: &G::State) -> ExploreResult<Expansion<G>> {
        match self.collect_successors(state) {
            Ok(successors) => Ok(successors),
            Err(source) => Err(self.fail(index, source)),
        }
    }

    fn collect_successors(&mut self, state: &G::State) -> Result<Expansion<G>, GeneratorError> {
        let reduce = self.reducer.is_enabled();
        let mut out = SmallVec::new();
        for succ in self.generator.successors(state) {
            let succ = succ?;
            if reduce && succ.confluent {
                continue;
            }
            let next = self.reducer.get_repr(&self.generator, succ.state)?;
            out.push((succ.action, next));
        }
        Ok(out)
    }

    fn lowest_priority(
        &mut self,
        index: StateIndex,
        successors: Expansion<G>,
    ) -> ExploreResult<Expansion<G>> {
        match self.filter_lowest(successors) {
            Ok(kept) => Ok(kept),
            Err(source) => Err(self.fail(index, source)),
        }
    }

    /// Keep transitions without a priority parameter and those whose
    /// parameter equals the lowest one present.
    fn filter_lowest(&self, successors: Expansion<G>) -> Result<Expansion<G>, GeneratorError> {
        let mut lowest: Option<ParamOf<G>> = None;
        for (action, _) in &successors {
            if let Some(p) = action.priority_param() {
                lowest = match lowest {
                    Some(l) if !self.comparator.greater(&l, &p)? => Some(l),
                    _ => Some(p),
                };
            }
        }
        let Some(lowest) = lowest else {
            return Ok(successors);
        };

        let mut kept = SmallVec::new();
        for (action, state) in successors {
            let keep = match action.priority_param() {
                Some(p) => self.comparator.equal(&lowest, &p)?,
                None => true,
            };
            if keep {
                kept.push((action, state));
            }
        }
        Ok(kept)
    }

    /// Record one accepted transition: deduplicate the target and set its
    /// backpointer, then run the action watchers and hand it to the sink.
    fn add_transition(
        &mut self,
        from: StateIndex,
        action: &G::Action,
        to: &G::State,
    ) -> ExploreResult<(StateIndex, bool)> {
        let (index, is_new) = self.store.add(to);
        if is_new {
            if let Some(backpointers) = self.backpointers.as_mut() {
                let slot = index.as_usize();
                if slot >= backpointers.len() {
                    backpointers.resize(slot + 1, None);
                }
                backpointers[slot] = Some(from);
            }
        }

        self.check_action(from, action, to)?;
        self.sink.save_transition(from, action, index);
        self.transitions += 1;
        Ok((index, is_new))
    }

    fn check_action(
        &mut self,
        from: StateIndex,
        action: &G::Action,
        to: &G::State,
    ) -> ExploreResult<()> {
        if !self.config.detect_action {
            return Ok(());
        }
        let Some(name) = self
            .config
            .trace_actions
            .iter()
            .find(|name| action.has_label(name))
            .cloned()
        else {
            return Ok(());
        };

        let info = format!("act_{}_{}", self.trace_count, name);
        let saved = self.save_trace(from, &info, Some((action.clone(), to.clone())))?;
        match &saved {
            Some(file) => warn!(action = %name, state = %from, trace = %file, "detected action"),
            None => warn!(action = %name, state = %from, "detected action"),
        }
        self.findings.push(Finding {
            kind: FindingKind::Action(name),
            state: from,
            trace: saved,
        });
        Ok(())
    }

    fn report_deadlock(&mut self, index: StateIndex) -> ExploreResult<()> {
        if !self.config.detect_deadlock {
            return Ok(());
        }
        let info = format!("dlk_{}", self.trace_count);
        let saved = self.save_trace(index, &info, None)?;
        match &saved {
            Some(file) => warn!(state = %index, trace = %file, "deadlock found"),
            None => warn!(state = %index, "deadlock found"),
        }
        self.findings.push(Finding {
            kind: FindingKind::Deadlock,
            state: index,
            trace: saved,
        });
        Ok(())
    }

    fn check_divergence(&mut self, index: StateIndex, state: &G::State) -> ExploreResult<()> {
        if !self.config.detect_divergence {
            return Ok(());
        }
        let diverges = match self.divergence.has_divergence(&self.generator, state) {
            Ok(diverges) => diverges,
            Err(source) => return Err(self.fail(index, source)),
        };
        if !diverges {
            return Ok(());
        }

        let info = format!("divergence_{}", self.trace_count);
        let saved = self.save_trace(index, &info, None)?;
        match &saved {
            Some(file) => warn!(state = %index, trace = %file, "divergence found"),
            None => warn!(state = %index, "divergence found"),
        }
        self.findings.push(Finding {
            kind: FindingKind::Divergence,
            state: index,
            trace: saved,
        });
        Ok(())
    }

    /// Write the trace to `target` (plus `extra` as a last step) if traces
    /// are enabled and the budget allows. Returns the file name on success.
    fn save_trace(
        &mut self,
        target: StateIndex,
        info: &str,
        extra: Option<(G::Action, G::State)>,
    ) -> ExploreResult<Option<String>> {
        if !self.config.trace || self.trace_count >= self.config.max_traces {
            return Ok(None);
        }
        let mut trace = self.trace_to(target)?;
        if let Some((action, state)) = extra {
            trace.push(action, state);
        }
        self.trace_count += 1;
        let name = trace_file_name(&self.config.trace_prefix, info);
        Ok(self.write_trace(&trace, name))
    }

    fn write_trace(&mut self, trace: &Trace<G::State, G::Action>, name: String) -> Option<String> {
        let Some(writer) = self.trace_writer.as_mut() else {
            warn!(trace = %name, "no trace writer installed, trace not saved");
            return None;
        };
        match writer.write(trace, &name) {
            Ok(()) => {
                self.traces.push(name.clone());
                Some(name)
            }
            Err(e) => {
                warn!(trace = %name, error = %e, "writing trace failed");
                None
            }
        }
    }

    /// Turn a generator failure into the run's error, saving an error trace
    /// first if requested.
    fn fail(&mut self, index: StateIndex, source: GeneratorError) -> ExploreError {
        error!(state = %index, error = %source, "error while exploring state space");

        let mut error_trace = None;
        if self.config.save_error_trace {
            match self.trace_to(index) {
                Ok(trace) => {
                    let name = trace_file_name(&self.config.trace_prefix, "error");
                    error_trace = self.write_trace(&trace, name);
                    if let Some(file) = &error_trace {
                        info!(trace = %file, "saved trace to error");
                    }
                }
                Err(e) => warn!(error = %e, "could not reconstruct error trace"),
            }
        }
        ExploreError::Generator {
            state: index,
            source,
            error_trace,
        }
    }

    /// Cancellation point, passed once per expanded state. Also emits the
    /// periodic monitor line and enforces the memory limit.
    fn checkpoint(&mut self) -> Option<Termination> {
        if self.config.trace && self.trace_count >= self.config.max_traces {
            info!(traces = self.trace_count, "reached trace limit");
            return Some(Termination::TraceLimit);
        }
        if self
            .stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            info!("exploration cancelled");
            return Some(Termination::Cancelled);
        }

        if self.explored > 0
            && self.explored % MONITOR_INTERVAL == 0
            && self.explored != self.last_monitor
        {
            self.last_monitor = self.explored;
            let memory_mb = current_memory_mb();
            debug!(
                level = self.levels + 1,
                explored = self.explored,
                states = self.store.len(),
                transitions = self.transitions,
                memory_mb = ?memory_mb,
                "monitor"
            );
            if self.config.memory_limit_mb > 0 {
                if let Some(mb) = memory_mb {
                    if mb >= self.config.memory_limit_mb {
                        warn!(memory_mb = mb, "reached memory limit");
                        return Some(Termination::MemoryLimit);
                    }
                }
            }
        }
        None
    }

    fn publish(&self) {
        if let Some(progress) = &self.config.progress {
            let level = if self.config.strategy == Strategy::Breadth {
                self.levels + 1
            } else {
                0
            };
            progress.publish(
                self.store.len(),
                self.transitions,
                level,
                self.explored,
                self.trace_count,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explicit::{ExplicitModel, Label};
    use crate::generator::OrdComparator;
    use crate::sink::{MemoryLts, NullSink, TraceCollector};

    fn explorer(
        model: ExplicitModel<u32>,
        config: ExploreConfig,
    ) -> Explorer<ExplicitModel<u32>, OrdComparator, MemoryLts<Label>> {
        Explorer::initialise(config, model, OrdComparator, MemoryLts::new()).unwrap()
    }

    /// 0 -> 1 -> 2, 0 -> 2, 2 -> 0
    fn triangle() -> ExplicitModel<u32> {
        ExplicitModel::new(0)
            .edge(0, Label::new("a"), 1)
            .edge(0, Label::new("b"), 2)
            .edge(1, Label::new("c"), 2)
            .edge(2, Label::new("d"), 0)
    }

    #[test]
    fn test_breadth_first_complete() {
        let mut explorer = explorer(triangle(), ExploreConfig::default());
        let summary = explorer.run().unwrap();

        assert_eq!(summary.states, 3);
        assert_eq!(summary.transitions, 4);
        assert_eq!(summary.levels, 2);
        assert_eq!(summary.termination, Termination::Completed);
        assert!(summary.findings.is_empty());

        let lts = explorer.into_sink();
        assert_eq!(lts.initial_state, Some(StateIndex::new(0)));
        assert_eq!(lts.num_states, Some(3));
        assert_eq!(lts.transitions.len(), 4);
    }

    #[test]
    fn test_run_twice_fails() {
        let mut explorer = explorer(triangle(), ExploreConfig::default());
        explorer.run().unwrap();
        assert!(matches!(explorer.run(), Err(ExploreError::AlreadyRun)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ExploreConfig {
            bithashing: true,
            trace: true,
            ..ExploreConfig::default()
        };
        let result = Explorer::initialise(config, triangle(), OrdComparator, NullSink);
        assert!(matches!(result, Err(ExploreError::InvalidConfig { .. })));
    }

    #[test]
    fn test_state_limit() {
        let model = ExplicitModel::new(0u32)
            .edge(0, Label::new("a"), 1)
            .edge(1, Label::new("a"), 2)
            .edge(2, Label::new("a"), 3);
        let config = ExploreConfig {
            max_states: 2,
            ..ExploreConfig::default()
        };
        let summary = explorer(model, config).run().unwrap();
        assert_eq!(summary.explored, 2);
        assert_eq!(summary.states, 3);
        assert_eq!(summary.termination, Termination::StateLimit);
    }

    #[test]
    fn test_depth_first_matches_breadth_first() {
        let bfs = explorer(triangle(), ExploreConfig::default()).run().unwrap();
        let config = ExploreConfig {
            strategy: Strategy::Depth,
            ..ExploreConfig::default()
        };
        let dfs = explorer(triangle(), config).run().unwrap();

        assert_eq!(dfs.states, bfs.states);
        assert_eq!(dfs.transitions, bfs.transitions);
        assert_eq!(dfs.termination, Termination::Completed);
    }

    #[test]
    fn test_depth_first_bounded_stack() {
        let model = ExplicitModel::new(0u32)
            .edge(0, Label::new("a"), 1)
            .edge(1, Label::new("a"), 2)
            .edge(2, Label::new("a"), 3);
        let config = ExploreConfig {
            strategy: Strategy::Depth,
            todo_max: 2,
            ..ExploreConfig::default()
        };
        let summary = explorer(model, config).run().unwrap();
        assert_eq!(summary.termination, Termination::FrontierLimit);
        assert_eq!(summary.explored, 2);
        // 2 was recorded but never expanded
        assert_eq!(summary.states, 3);
        assert_eq!(summary.transitions, 2);
    }

    #[test]
    fn test_deadlock_detection_and_trace() {
        let model = ExplicitModel::new(0u32)
            .edge(0, Label::new("a"), 1)
            .edge(1, Label::new("b"), 2);
        let collector = TraceCollector::new();
        let config = ExploreConfig {
            detect_deadlock: true,
            trace: true,
            trace_prefix: "run".to_string(),
            ..ExploreConfig::default()
        };
        let mut explorer = explorer(model, config).with_trace_writer(collector.clone());
        let summary = explorer.run().unwrap();

        assert_eq!(summary.deadlocks().count(), 1);
        assert_eq!(summary.findings[0].state, StateIndex::new(2));
        assert_eq!(summary.findings[0].trace.as_deref(), Some("run_dlk_0.trc"));
        assert_eq!(summary.traces, vec!["run_dlk_0.trc".to_string()]);

        let trace = collector.get("run_dlk_0.trc").unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(*trace.last_state(), 2);
    }

    #[test]
    fn test_deadlock_not_reported_when_disabled() {
        let model = ExplicitModel::new(0u32).edge(0, Label::new("a"), 1);
        let summary = explorer(model, ExploreConfig::default()).run().unwrap();
        assert!(summary.findings.is_empty());
    }

    #[test]
    fn test_trace_limit_stops_run() {
        // Every state of the chain beyond 0 is reported
        let model = ExplicitModel::new(0u32)
            .edge(0, Label::new("a"), 1)
            .edge(0, Label::new("a"), 2)
            .edge(0, Label::new("a"), 3);
        let config = ExploreConfig {
            detect_deadlock: true,
            trace: true,
            max_traces: 1,
            ..ExploreConfig::default()
        };
        let collector = TraceCollector::new();
        let summary = explorer(model, config)
            .with_trace_writer(collector.clone())
            .run()
            .unwrap();

        assert_eq!(summary.termination, Termination::TraceLimit);
        assert_eq!(collector.names(), vec!["dlk_0.trc".to_string()]);
    }

    #[test]
    fn test_watched_action_trace_includes_transition() {
        let model = ExplicitModel::new(0u32)
            .edge(0, Label::new("a"), 1)
            .edge(1, Label::new("error"), 2);
        let collector = TraceCollector::new();
        let config = ExploreConfig {
            detect_action: true,
            trace: true,
            trace_actions: ["error".to_string()].into_iter().collect(),
            ..ExploreConfig::default()
        };
        let summary = explorer(model, config)
            .with_trace_writer(collector.clone())
            .run()
            .unwrap();

        assert_eq!(summary.findings.len(), 1);
        assert_eq!(
            summary.findings[0].kind,
            FindingKind::Action("error".to_string())
        );
        let trace = collector.get("act_0_error.trc").unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.steps()[1].action.name(), "error");
    }

    #[test]
    fn test_divergence_detection() {
        let model = ExplicitModel::new(0u32)
            .edge(0, Label::new("a"), 1)
            .edge(1, Label::tau(), 1);
        let config = ExploreConfig {
            detect_divergence: true,
            ..ExploreConfig::default()
        };
        let summary = explorer(model, config).run().unwrap();
        let divergent: Vec<_> = summary
            .findings
            .iter()
            .filter(|f| f.kind == FindingKind::Divergence)
            .map(|f| f.state)
            .collect();
        assert_eq!(divergent, vec![StateIndex::new(1)]);
    }

    #[test]
    fn test_generator_error_aborts_with_error_trace() {
        let model = ExplicitModel::new(0u32)
            .edge(0, Label::new("a"), 1)
            .edge(1, Label::new("b"), 2)
            .fail_at(1, "cannot rewrite");
        let collector = TraceCollector::new();
        let config = ExploreConfig {
            save_error_trace: true,
            trace_prefix: "p".to_string(),
            ..ExploreConfig::default()
        };
        let mut explorer = explorer(model, config).with_trace_writer(collector.clone());
        let err = explorer.run().unwrap_err();

        match err {
            ExploreError::Generator {
                state,
                source,
                error_trace,
            } => {
                assert_eq!(state, StateIndex::new(1));
                assert_eq!(source.message(), "cannot rewrite");
                assert_eq!(error_trace.as_deref(), Some("p_error.trc"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing of state 1 was recorded
        let lts = explorer.sink();
        assert!(lts.outgoing(StateIndex::new(1)).next().is_none());
        assert!(!lts.is_finished());
    }

    #[test]
    fn test_initial_state_error() {
        let model = ExplicitModel::new(0u32).fail_initial("no init");
        let err = explorer(model, ExploreConfig::default()).run().unwrap_err();
        assert!(matches!(err, ExploreError::InitialState(_)));
    }

    #[test]
    fn test_random_walk_ends_in_deadlock() {
        let model = ExplicitModel::new(0u32)
            .edge(0, Label::new("a"), 1)
            .edge(0, Label::new("b"), 2)
            .edge(1, Label::new("c"), 3)
            .edge(2, Label::new("c"), 3);
        let config = ExploreConfig {
            strategy: Strategy::Random,
            seed: Some(42),
            ..ExploreConfig::default()
        };
        let summary = explorer(model, config).run().unwrap();
        // Only one of 1 and 2 is walked through
        assert_eq!(summary.termination, Termination::Deadlock);
        assert!(!summary.is_complete());
        assert_eq!(summary.explored, 2);
        // Both transitions of the initial state are recorded
        assert_eq!(summary.transitions, 3);
    }

    #[test]
    fn test_random_walk_step_limit() {
        let model = ExplicitModel::new(0u32).edge(0, Label::new("loop"), 0);
        let config = ExploreConfig {
            strategy: Strategy::Random,
            max_states: 10,
            seed: Some(1),
            ..ExploreConfig::default()
        };
        let summary = explorer(model, config).run().unwrap();
        assert_eq!(summary.termination, Termination::StateLimit);
        assert_eq!(summary.explored, 10);
        assert_eq!(summary.transitions, 10);
        assert_eq!(summary.states, 1);
    }

    fn lottery() -> ExplicitModel<u32> {
        ExplicitModel::new(0u32)
            .edge(0, Label::new("draw").with_priority(3), 1)
            .edge(0, Label::new("draw").with_priority(1), 2)
            .edge(0, Label::new("draw").with_priority(1), 3)
            .edge(0, Label::new("skip"), 4)
    }

    #[test]
    fn test_value_prioritized_keeps_lowest_and_unparameterised() {
        let config = ExploreConfig {
            strategy: Strategy::ValuePrioritized,
            ..ExploreConfig::default()
        };
        let mut explorer = explorer(lottery(), config);
        let summary = explorer.run().unwrap();

        // 1 is never reached: its draw has the higher priority value
        assert_eq!(summary.states, 4);
        assert_eq!(summary.transitions, 3);
        assert!(explorer.store().index_of(&1).is_none());
    }

    #[test]
    fn test_value_random_prioritized_takes_one() {
        let config = ExploreConfig {
            strategy: Strategy::ValueRandomPrioritized,
            seed: Some(9),
            ..ExploreConfig::default()
        };
        let mut explorer = explorer(lottery(), config);
        let summary = explorer.run().unwrap();

        assert_eq!(summary.transitions, 1);
        assert_eq!(summary.states, 2);
        assert!(explorer.store().index_of(&1).is_none());
    }

    #[test]
    fn test_confluence_reduces_diamond() {
        let model = ExplicitModel::new(0u32)
            .confluent_edge(0, Label::tau(), 1)
            .edge(0, Label::new("a"), 5)
            .edge(1, Label::new("b"), 2);
        let config = ExploreConfig {
            confluence_action: Some("tau".to_string()),
            ..ExploreConfig::default()
        };
        let mut explorer = explorer(model, config);
        let summary = explorer.run().unwrap();

        assert_eq!(explorer.generator().prioritised(), Some("tau"));
        // 0 is represented by 1, which has a single b transition
        assert_eq!(summary.states, 2);
        assert_eq!(summary.transitions, 1);
        assert_eq!(explorer.store().get(StateIndex::new(0)), Some(&1));
    }

    #[test]
    fn test_confluence_flags_ignored_when_disabled() {
        let model = ExplicitModel::new(0u32).confluent_edge(0, Label::tau(), 1);
        let summary = explorer(model, ExploreConfig::default()).run().unwrap();
        assert_eq!(summary.states, 2);
        assert_eq!(summary.transitions, 1);
    }

    #[test]
    fn test_bithash_breadth_first() {
        let config = ExploreConfig {
            bithashing: true,
            bithash_size: 1 << 16,
            ..ExploreConfig::default()
        };
        let mut explorer = explorer(triangle(), config);
        let summary = explorer.run().unwrap();
        assert!(explorer.store().is_bithashing());
        assert!(summary.states <= 3);
        assert_eq!(summary.termination, Termination::Completed);
    }

    #[test]
    fn test_stop_flag_cancels() {
        let mut explorer = explorer(triangle(), ExploreConfig::default());
        let flag = Arc::new(AtomicBool::new(true));
        explorer.set_stop_flag(flag);
        let summary = explorer.run().unwrap();
        assert_eq!(summary.termination, Termination::Cancelled);
        assert_eq!(summary.explored, 0);
    }

    #[test]
    fn test_progress_counters_published() {
        let progress = Arc::new(ProgressCounters::new());
        let config = ExploreConfig {
            progress: Some(Arc::clone(&progress)),
            ..ExploreConfig::default()
        };
        explorer(triangle(), config).run().unwrap();
        assert_eq!(progress.states.load(Ordering::Relaxed), 3);
        assert_eq!(progress.transitions.load(Ordering::Relaxed), 4);
        assert_eq!(progress.explored.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_zero_state_budget_expands_nothing() {
        for strategy in Strategy::ALL {
            let config = ExploreConfig {
                strategy,
                max_states: 0,
                detect_deadlock: true,
                seed: Some(3),
                ..ExploreConfig::default()
            };
            let model = ExplicitModel::new(0u32).edge(0, Label::new("a"), 1);
            let summary = explorer(model, config).run().unwrap();
            assert_eq!(summary.explored, 0, "{strategy}");
            assert_eq!(summary.transitions, 0, "{strategy}");
            assert_eq!(summary.states, 1, "{strategy}");
            assert!(summary.findings.is_empty(), "{strategy}");
            assert_eq!(summary.termination, Termination::StateLimit, "{strategy}");
        }
    }

    #[test]
    fn test_value_prioritized_deadlock_with_work_left() {
        // 0 -draw(1)-> 1 deadlocks before 2 is expanded and 3 discovered
        let model = ExplicitModel::new(0u32)
            .edge(0, Label::new("draw").with_priority(1), 1)
            .edge(0, Label::new("skip"), 2)
            .edge(2, Label::new("go"), 3);
        let config = ExploreConfig {
            strategy: Strategy::ValuePrioritized,
            ..ExploreConfig::default()
        };
        let mut explorer = explorer(model, config);
        let summary = explorer.run().unwrap();

        assert_eq!(summary.explored, 2);
        assert_eq!(summary.states, 3);
        assert_eq!(summary.termination, Termination::Deadlock);
        assert!(!summary.is_complete());
        assert!(explorer.store().index_of(&3).is_none());
    }

    #[test]
    fn test_value_prioritized_final_deadlock_completes() {
        let model = ExplicitModel::new(0u32)
            .edge(0, Label::new("draw").with_priority(1), 1)
            .edge(1, Label::new("draw").with_priority(1), 2);
        let config = ExploreConfig {
            strategy: Strategy::ValuePrioritized,
            ..ExploreConfig::default()
        };
        let summary = explorer(model, config).run().unwrap();
        assert_eq!(summary.states, 3);
        assert_eq!(summary.termination, Termination::Completed);
    }

    #[test]
    fn test_walk_over_every_state_completes() {
        let model = ExplicitModel::new(0u32)
            .edge(0, Label::new("a"), 1)
            .edge(1, Label::new("b"), 2);
        let config = ExploreConfig {
            strategy: Strategy::Random,
            seed: Some(5),
            ..ExploreConfig::default()
        };
        let summary = explorer(model, config).run().unwrap();
        assert_eq!(summary.termination, Termination::Completed);
    }

    #[test]
    fn test_level_published_for_breadth_first_only() {
        for (strategy, level) in [(Strategy::Breadth, 3), (Strategy::Depth, 0)] {
            let progress = Arc::new(ProgressCounters::new());
            let config = ExploreConfig {
                strategy,
                progress: Some(Arc::clone(&progress)),
                ..ExploreConfig::default()
            };
            explorer(triangle(), config).run().unwrap();
            assert_eq!(progress.level.load(Ordering::Relaxed), level, "{strategy}");
        }
    }
}
