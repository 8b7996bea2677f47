use crate::net::matrix::Matrix;
use rand::Rng;
use std::collections::VecDeque;

/// One recorded experience. Immutable once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub features: Vec<f32>,
    pub action: usize,
    pub reward: f32,
    pub next_features: Vec<f32>,
    pub done: bool,
}

/// A sampled training batch, already packed for whole-batch predicts.
pub struct SampleBatch {
    pub states: Matrix,
    pub actions: Vec<usize>,
    pub rewards: Vec<f32>,
    pub next_states: Matrix,
    pub dones: Vec<bool>,
}

/// Bounded FIFO store of transitions: once full, every insertion evicts
/// the oldest entry.
pub struct ReplayBuffer {
    buffer: VecDeque<Transition>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, transition: Transition) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }

    /// Draw `batch_size` transitions independently and uniformly at random,
    /// with replacement. Returns `None` while the buffer holds fewer than
    /// `batch_size` entries.
    pub fn sample(&self, rng: &mut impl Rng, batch_size: usize) -> Option<SampleBatch> {
        if self.buffer.len() < batch_size {
            return None;
        }

        let feature_len = self.buffer[0].features.len();
        let mut states = Vec::with_capacity(batch_size * feature_len);
        let mut next_states = Vec::with_capacity(batch_size * feature_len);
        let mut actions = Vec::with_capacity(batch_size);
        let mut rewards = Vec::with_capacity(batch_size);
        let mut dones = Vec::with_capacity(batch_size);

        for _ in 0..batch_size {
            let transition = &self.buffer[rng.random_range(0..self.buffer.len())];
            states.extend_from_slice(&transition.features);
            next_states.extend_from_slice(&transition.next_features);
            actions.push(transition.action);
            rewards.push(transition.reward);
            dones.push(transition.done);
        }

        Some(SampleBatch {
            states: Matrix::from_vec(states, batch_size, feature_len),
            actions,
            rewards,
            next_states: Matrix::from_vec(next_states, batch_size, feature_len),
            dones,
        })
    }
}
