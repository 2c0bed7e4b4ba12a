//! Built-in demo models.

use clap::ValueEnum;
use lts_explore::{GeneratorError, Label, NextStateGenerator, Successor, TAU};

type Successors<S> = std::vec::IntoIter<Result<Successor<Label, S>, GeneratorError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelKind {
    /// Alternating internal and visible steps ending in a deadlock
    Chain,
    /// A token passed around a ring by internal steps
    Ring,
    /// Dining philosophers taking the left fork first
    Philosophers,
    /// Rounds of draws with a priority parameter
    Lottery,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Chain,
        ModelKind::Ring,
        ModelKind::Philosophers,
        ModelKind::Lottery,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Chain => "chain",
            ModelKind::Ring => "ring",
            ModelKind::Philosophers => "philosophers",
            ModelKind::Lottery => "lottery",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ModelKind::Chain => "SIZE visible steps, each preceded by a confluent tau; deadlocks at the end",
            ModelKind::Ring => "SIZE stations passing a token by tau; every state diverges",
            ModelKind::Philosophers => "SIZE dining philosophers; deadlocks when all hold their left fork",
            ModelKind::Lottery => "SIZE rounds of draw(p) for p in 1..=SIZE; suited to the priority strategies",
        }
    }
}

/// `0 -tau-> 1 -step-> 2 -tau-> 3 ...` up to state `2 * length`.
///
/// The tau steps are the only transitions of their source state, so they are
/// flagged confluent once `prioritise("tau")` has been called.
#[derive(Debug, Clone)]
pub struct Chain {
    length: u32,
    flag_confluent: bool,
}

impl Chain {
    pub fn new(length: u32) -> Self {
        Self {
            length,
            flag_confluent: false,
        }
    }
}

impl NextStateGenerator for Chain {
    type State = u32;
    type Action = Label;
    type Successors = Successors<u32>;

    fn initial_state(&self) -> Result<u32, GeneratorError> {
        Ok(0)
    }

    fn successors(&self, state: &u32) -> Self::Successors {
        let s = *state;
        let mut out = Vec::new();
        if s < 2 * self.length {
            let succ = if s % 2 == 0 {
                Successor {
                    action: Label::tau(),
                    state: s + 1,
                    confluent: self.flag_confluent,
                }
            } else {
                Successor::new(Label::new("step"), s + 1)
            };
            out.push(Ok(succ));
        }
        out.into_iter()
    }

    fn prioritise(&mut self, action: &str) {
        self.flag_confluent = action == TAU;
    }
}

/// Token ring: the holder may `work`, or pass the token on with a tau.
#[derive(Debug, Clone)]
pub struct Ring {
    stations: u32,
}

impl Ring {
    pub fn new(stations: u32) -> Self {
        Self {
            stations: stations.max(1),
        }
    }
}

impl NextStateGenerator for Ring {
    type State = u32;
    type Action = Label;
    type Successors = Successors<u32>;

    fn initial_state(&self) -> Result<u32, GeneratorError> {
        Ok(0)
    }

    fn successors(&self, holder: &u32) -> Self::Successors {
        vec![
            Ok(Successor::new(Label::new(format!("work_{holder}")), *holder)),
            Ok(Successor::new(Label::tau(), (holder + 1) % self.stations)),
        ]
        .into_iter()
    }
}

const THINKING: u8 = 0;
const HUNGRY: u8 = 1;
const EATING: u8 = 2;

/// Philosopher i needs fork i (left) and fork i + 1 (right), picked up in
/// that order.
#[derive(Debug, Clone)]
pub struct Philosophers {
    count: usize,
}

impl Philosophers {
    pub fn new(count: usize) -> Self {
        Self {
            count: count.max(1),
        }
    }

    fn fork_taken(&self, phases: &[u8], fork: usize) -> bool {
        let left_user = fork;
        let right_user = (fork + self.count - 1) % self.count;
        phases[left_user] != THINKING || phases[right_user] == EATING
    }
}

impl NextStateGenerator for Philosophers {
    type State = Vec<u8>;
    type Action = Label;
    type Successors = Successors<Vec<u8>>;

    fn initial_state(&self) -> Result<Vec<u8>, GeneratorError> {
        Ok(vec![THINKING; self.count])
    }

    fn successors(&self, phases: &Vec<u8>) -> Self::Successors {
        if phases.len() != self.count {
            return vec![Err(GeneratorError::new(format!(
                "state has {} philosophers, expected {}",
                phases.len(),
                self.count
            )))]
            .into_iter();
        }

        let mut out = Vec::new();
        for i in 0..self.count {
            let right = (i + 1) % self.count;
            let (name, next_phase) = match phases[i] {
                THINKING if !self.fork_taken(phases, i) => ("take_left", HUNGRY),
                HUNGRY if right != i && !self.fork_taken(phases, right) => ("eat", EATING),
                EATING => ("release", THINKING),
                _ => continue,
            };
            let mut next = phases.clone();
            next[i] = next_phase;
            out.push(Ok(Successor::new(Label::new(format!("{name}_{i}")), next)));
        }
        out.into_iter()
    }
}

/// Each round draws a ticket `p` in `1..=rounds`; `draw(p)` carries `p` as
/// its priority parameter. The state is (round, last ticket).
#[derive(Debug, Clone)]
pub struct Lottery {
    rounds: u32,
}

impl Lottery {
    pub fn new(rounds: u32) -> Self {
        Self { rounds }
    }
}

impl NextStateGenerator for Lottery {
    type State = (u32, u32);
    type Action = Label;
    type Successors = Successors<(u32, u32)>;

    fn initial_state(&self) -> Result<(u32, u32), GeneratorError> {
        Ok((0, 0))
    }

    fn successors(&self, &(round, _): &(u32, u32)) -> Self::Successors {
        let mut out = Vec::new();
        if round < self.rounds {
            for p in 1..=self.rounds {
                let action = Label::new("draw").with_priority(u64::from(p));
                out.push(Ok(Successor::new(action, (round + 1, p))));
            }
        }
        out.into_iter()
    }
}
