//! Exploration configuration.

use crate::bithash::DEFAULT_BITHASH_SIZE;
use crate::error::{ExploreError, ExploreResult};
use crate::store::DEFAULT_INIT_TABLE_SIZE;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Order in which the state space is visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// Level by level; every state at distance n is expanded before any at
    /// distance n + 1.
    #[default]
    Breadth,
    Depth,
    /// A single walk choosing a uniformly random successor at each step.
    Random,
    /// Expands only the successors with the lowest priority parameter.
    ValuePrioritized,
    /// A walk over the lowest-priority successors.
    ValueRandomPrioritized,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Breadth,
        Strategy::Depth,
        Strategy::Random,
        Strategy::ValuePrioritized,
        Strategy::ValueRandomPrioritized,
    ];

    /// Whether the strategy is a single walk rather than a search.
    pub fn is_walk(self) -> bool {
        matches!(self, Strategy::Random | Strategy::ValueRandomPrioritized)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Breadth => "breadth",
            Strategy::Depth => "depth",
            Strategy::Random => "random",
            Strategy::ValuePrioritized => "priority",
            Strategy::ValueRandomPrioritized => "rpriority",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown exploration strategy '{0}' (expected one of b, d, r, p, q or their long names)")]
pub struct ParseStrategyError(String);

impl FromStr for Strategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "b" | "breadth" => Ok(Strategy::Breadth),
            "d" | "depth" => Ok(Strategy::Depth),
            "r" | "random" => Ok(Strategy::Random),
            "p" | "priority" => Ok(Strategy::ValuePrioritized),
            "q" | "rpriority" => Ok(Strategy::ValueRandomPrioritized),
            other => Err(ParseStrategyError(other.to_string())),
        }
    }
}

/// Lock-free counters the explorer publishes once per expanded state.
#[derive(Debug, Default)]
pub struct ProgressCounters {
    pub states: AtomicUsize,
    pub transitions: AtomicUsize,
    /// Current breadth-first level.
    pub level: AtomicUsize,
    /// States expanded so far.
    pub explored: AtomicUsize,
    pub traces: AtomicUsize,
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn publish(
        &self,
        states: usize,
        transitions: usize,
        level: usize,
        explored: usize,
        traces: usize,
    ) {
        self.states.store(states, Ordering::Relaxed);
        self.transitions.store(transitions, Ordering::Relaxed);
        self.level.store(level, Ordering::Relaxed);
        self.explored.store(explored, Ordering::Relaxed);
        self.traces.store(traces, Ordering::Relaxed);
    }
}

/// Configuration for state space exploration.
#[derive(Clone)]
pub struct ExploreConfig {
    pub strategy: Strategy,
    /// Maximum number of states to store.
    pub max_states: usize,
    /// Maximum number of traces to write.
    pub max_traces: usize,
    /// Store one bit per state instead of the state itself.
    pub bithashing: bool,
    /// Bit-hash table size in bits.
    pub bithash_size: usize,
    /// Bound on the frontier (DFS stack, bit-hash BFS queue and walk window,
    /// unexplored states for the priority strategy).
    pub todo_max: usize,
    /// Initial capacity of the exact store.
    pub initial_table_size: usize,
    /// Write traces for findings.
    pub trace: bool,
    /// Write a trace to the state whose expansion failed.
    pub save_error_trace: bool,
    pub trace_prefix: String,
    /// Name of the internal action used for confluence reduction. None or
    /// empty disables the reduction.
    pub confluence_action: Option<String>,
    pub detect_deadlock: bool,
    pub detect_divergence: bool,
    /// Report transitions carrying a name from `trace_actions`.
    pub detect_action: bool,
    pub trace_actions: BTreeSet<String>,
    /// Chance of skipping a candidate when the priority strategy's frontier
    /// exceeds `todo_max`.
    pub priority_drop_probability: f64,
    /// Seed for the random strategies and bit-hash queue sampling. None seeds
    /// from entropy.
    pub seed: Option<u64>,
    /// Maximum memory usage in MB (0 = unlimited).
    pub memory_limit_mb: usize,
    pub progress: Option<Arc<ProgressCounters>>,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Breadth,
            max_states: usize::MAX,
            max_traces: usize::MAX,
            bithashing: false,
            bithash_size: DEFAULT_BITHASH_SIZE,
            todo_max: usize::MAX,
            initial_table_size: DEFAULT_INIT_TABLE_SIZE,
            trace: false,
            save_error_trace: false,
            trace_prefix: String::new(),
            confluence_action: None,
            detect_deadlock: false,
            detect_divergence: false,
            detect_action: false,
            trace_actions: BTreeSet::new(),
            priority_drop_probability: 0.5,
            seed: None,
            memory_limit_mb: 0,
            progress: None,
        }
    }
}

impl fmt::Debug for ExploreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExploreConfig")
            .field("strategy", &self.strategy)
            .field("max_states", &self.max_states)
            .field("max_traces", &self.max_traces)
            .field("bithashing", &self.bithashing)
            .field("bithash_size", &self.bithash_size)
            .field("todo_max", &self.todo_max)
            .field("initial_table_size", &self.initial_table_size)
            .field("trace", &self.trace)
            .field("save_error_trace", &self.save_error_trace)
            .field("trace_prefix", &self.trace_prefix)
            .field("confluence_action", &self.confluence_action)
            .field("detect_deadlock", &self.detect_deadlock)
            .field("detect_divergence", &self.detect_divergence)
            .field("detect_action", &self.detect_action)
            .field("trace_actions", &self.trace_actions)
            .field("priority_drop_probability", &self.priority_drop_probability)
            .field("seed", &self.seed)
            .field("memory_limit_mb", &self.memory_limit_mb)
            .field("progress", &self.progress.as_ref().map(|_| "..."))
            .finish()
    }
}

impl ExploreConfig {
    /// The confluence action, if reduction is enabled.
    pub fn confluence(&self) -> Option<&str> {
        self.confluence_action.as_deref().filter(|a| !a.is_empty())
    }

    /// Whether states must be kept so traces can be rebuilt.
    pub fn needs_backpointers(&self) -> bool {
        self.trace || self.save_error_trace
    }

    /// Reject settings that cannot work together.
    pub fn validate(&self) -> ExploreResult<()> {
        if self.bithashing {
            if self.needs_backpointers() {
                return Err(ExploreError::invalid_config(
                    "traces cannot be saved with bithashing: states are not stored",
                ));
            }
            if self.strategy == Strategy::ValuePrioritized {
                return Err(ExploreError::invalid_config(
                    "the priority strategy draws states from the store and cannot be combined with bithashing",
                ));
            }
            if self.bithash_size == 0 {
                return Err(ExploreError::invalid_config("bithash size must be positive"));
            }
        }
        if self.todo_max == 0 {
            return Err(ExploreError::invalid_config("todo max must be positive"));
        }
        if !(0.0..=1.0).contains(&self.priority_drop_probability) {
            return Err(ExploreError::invalid_config(format!(
                "priority drop probability {} is not in [0, 1]",
                self.priority_drop_probability
            )));
        }
        Ok(())
    }
}
