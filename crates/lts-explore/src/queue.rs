//! Bounded frontier structures for bit-hash exploration.
//!
//! With a bit-hash store a frontier state that is dropped must also be
//! released from the table, otherwise it would count as explored forever.
//! Both structures here therefore hand back every state they refuse or evict.

use rand::Rng;
use std::collections::VecDeque;

const INITIAL_QUEUE_SIZE: usize = 128;

/// Breadth-first frontier made of a get queue (the level being expanded) and
/// a put queue (the next level), swapped at level boundaries.
///
/// The put queue holds at most `max_size` states. Once it is full, the i-th
/// offered state replaces a uniformly chosen queued state with probability
/// `max_size / i`, so every offered state ends up queued with equal chance.
pub struct LevelQueue<S> {
    get: std::vec::IntoIter<S>,
    put: Vec<S>,
    max_size: usize,
    offered: usize,
}

impl<S> LevelQueue<S> {
    pub fn new(max_size: usize) -> Self {
        Self {
            get: Vec::new().into_iter(),
            put: Vec::with_capacity(max_size.min(INITIAL_QUEUE_SIZE)),
            max_size,
            offered: 0,
        }
    }

    /// Make `state` the whole current level, regardless of `max_size`.
    pub fn start(&mut self, state: S) {
        self.get = vec![state].into_iter();
    }

    /// Offer a state for the next level. Returns the state that did not make
    /// it: the replaced one, the refused newcomer, or None if it was queued
    /// without displacing anything.
    pub fn put<R: Rng>(&mut self, state: S, rng: &mut R) -> Option<S> {
        self.offered += 1;
        if self.put.len() < self.max_size {
            if self.put.len() == self.put.capacity() {
                let target = (self.put.capacity() * 2)
                    .max(INITIAL_QUEUE_SIZE)
                    .min(self.max_size);
                self.put.reserve_exact(target - self.put.len());
            }
            self.put.push(state);
            return None;
        }
        if self.max_size == 0 {
            return Some(state);
        }
        if rng.gen_range(0..self.offered) < self.max_size {
            let pos = rng.gen_range(0..self.max_size);
            Some(std::mem::replace(&mut self.put[pos], state))
        } else {
            Some(state)
        }
    }

    /// Next state of the current level.
    pub fn get(&mut self) -> Option<S> {
        self.get.next()
    }

    /// Make the queued next level the current one. Returns its size.
    pub fn swap(&mut self) -> usize {
        let next = std::mem::replace(
            &mut self.put,
            Vec::with_capacity(self.max_size.min(INITIAL_QUEUE_SIZE)),
        );
        self.get = next.into_iter();
        self.offered = 0;
        self.get.len()
    }

    /// States left in the current level.
    pub fn remaining(&self) -> usize {
        self.get.len()
    }

    /// States queued for the next level.
    pub fn queued(&self) -> usize {
        self.put.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Lower the capacity of the put queue. Takes effect for states offered
    /// from now on.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
    }
}

/// First-in first-out window over the most recently seen states of a walk.
pub struct WalkWindow<S> {
    states: VecDeque<S>,
    capacity: usize,
}

impl<S> WalkWindow<S> {
    pub fn new(capacity: usize) -> Self {
        Self {
            states: VecDeque::with_capacity(capacity.min(INITIAL_QUEUE_SIZE)),
            capacity,
        }
    }

    /// Remember a state, returning the oldest one if the window overflowed.
    pub fn push(&mut self, state: S) -> Option<S> {
        self.states.push_back(state);
        if self.states.len() > self.capacity {
            self.states.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_level_queue_levels() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut queue = LevelQueue::new(usize::MAX);

        assert!(queue.put(1, &mut rng).is_none());
        assert_eq!(queue.swap(), 1);
        assert_eq!(queue.get(), Some(1));
        assert!(queue.put(2, &mut rng).is_none());
        assert!(queue.put(3, &mut rng).is_none());
        assert_eq!(queue.get(), None);

        assert_eq!(queue.swap(), 2);
        assert_eq!(queue.get(), Some(2));
        assert_eq!(queue.remaining(), 1);
        assert_eq!(queue.get(), Some(3));
    }

    #[test]
    fn test_level_queue_full_returns_displaced() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut queue = LevelQueue::new(4);

        for i in 0..4 {
            assert!(queue.put(i, &mut rng).is_none());
        }
        let mut dropped = Vec::new();
        for i in 4..100 {
            dropped.push(queue.put(i, &mut rng).expect("full queue must drop a state"));
        }
        assert_eq!(queue.queued(), 4);

        // Every offered state is either queued or handed back, exactly once
        let mut kept: Vec<i32> = Vec::new();
        queue.swap();
        while let Some(s) = queue.get() {
            kept.push(s);
        }
        let mut all: Vec<i32> = kept.into_iter().chain(dropped).collect();
        all.sort();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_level_queue_zero_capacity() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut queue = LevelQueue::new(0);
        assert_eq!(queue.put("s", &mut rng), Some("s"));
        assert_eq!(queue.swap(), 0);
    }

    #[test]
    fn test_walk_window_evicts_oldest() {
        let mut window = WalkWindow::new(2);
        assert_eq!(window.push('a'), None);
        assert_eq!(window.push('b'), None);
        assert_eq!(window.push('c'), Some('a'));
        assert_eq!(window.len(), 2);
    }
}
