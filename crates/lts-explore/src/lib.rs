//! Explicit state space exploration.
//!
//! Enumerates the reachable states of an implicitly given transition system
//! (a [`NextStateGenerator`]) and streams the resulting labelled transition
//! system to an [`OutputSink`]. Optional confluence reduction collapses
//! states joined by confluent internal transitions; deadlock, divergence and
//! action detectors report their findings with counterexample traces.

pub mod bithash;
pub mod config;
pub mod confluence;
pub mod divergence;
pub mod error;
pub mod explicit;
pub mod explorer;
pub mod generator;
pub mod queue;
pub mod sink;
pub mod state;
pub mod store;
pub mod trace;

pub use config::{ExploreConfig, ParseStrategyError, ProgressCounters, Strategy};
pub use confluence::ConfluenceReducer;
pub use divergence::DivergenceDetector;
pub use error::{ExploreError, ExploreResult, GeneratorError};
pub use explicit::{ExplicitModel, Label, TAU};
pub use explorer::{Explorer, Finding, FindingKind, Summary, Termination};
pub use generator::{Action, Comparator, NextStateGenerator, OrdComparator, ParamOf, Successor};
pub use sink::{MemoryLts, NullSink, OutputSink, TraceCollector, TraceWriter};
pub use state::{Fingerprint, StateIndex, StateValue};
pub use store::StateStore;
pub use trace::{reconstruct_trace, replay_trace, trace_file_name, Trace, TraceStep};
