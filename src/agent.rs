pub mod replaybuffer;

use crate::error::AgentError;
use crate::features::FeatureMode;
use crate::game::ACTION_COUNT;
use crate::net::matrix::Matrix;
use crate::net::{Mlp, ValueModel};
use crate::persistence::{self, ModelBundle, ModelStore};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use replaybuffer::{ReplayBuffer, Transition};
use serde::{Deserialize, Serialize};

/// Hyperparameters, fixed for the agent's lifetime. Only epsilon moves
/// after construction, and only downward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub feature_mode: FeatureMode,
    pub action_count: usize,
    pub discount: f32,
    pub epsilon_start: f32,
    pub epsilon_min: f32,
    pub epsilon_decay: f32,
    pub batch_size: usize,
    pub buffer_capacity: usize,
    pub learning_rate: f32,
    pub hidden_dims: Vec<usize>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            feature_mode: FeatureMode::Full,
            action_count: ACTION_COUNT,
            discount: 0.95,
            epsilon_start: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            batch_size: 64,
            buffer_capacity: 50_000,
            learning_rate: 0.001,
            hidden_dims: vec![256, 64],
        }
    }
}

impl AgentConfig {
    /// Layer widths of the value network this config implies.
    pub fn model_dims(&self) -> Vec<usize> {
        let mut dims = Vec::with_capacity(self.hidden_dims.len() + 2);
        dims.push(self.feature_mode.width());
        dims.extend_from_slice(&self.hidden_dims);
        dims.push(self.action_count);
        dims
    }
}

/// DQN agent: epsilon-greedy policy over a value model, backed by a replay
/// buffer it exclusively owns.
///
/// Training is one-step Q-learning bootstrapped off the same network; no
/// separate target network.
pub struct Agent {
    model: Box<dyn ValueModel>,
    replay: ReplayBuffer,
    config: AgentConfig,
    epsilon: f32,
    rng: StdRng,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        let model = Box::new(Mlp::new(&config.model_dims(), config.learning_rate));
        Self::assemble(model, config, StdRng::from_os_rng())
    }

    /// Deterministic exploration and sampling for tests.
    pub fn with_seed(config: AgentConfig, seed: u64) -> Self {
        let model = Box::new(Mlp::new(&config.model_dims(), config.learning_rate));
        Self::assemble(model, config, StdRng::seed_from_u64(seed))
    }

    /// Use any value-model backend. Fails if the model's input width does
    /// not match the configured feature layout, or its output width the
    /// action count.
    pub fn with_model(model: Box<dyn ValueModel>, config: AgentConfig) -> Result<Self, AgentError> {
        if model.input_dim() != config.feature_mode.width() {
            return Err(AgentError::ConfigMismatch {
                expected: config.feature_mode.width(),
                got: model.input_dim(),
            });
        }
        if model.output_dim() != config.action_count {
            return Err(AgentError::ConfigMismatch {
                expected: config.action_count,
                got: model.output_dim(),
            });
        }
        Ok(Self::assemble(model, config, StdRng::from_os_rng()))
    }

    fn assemble(model: Box<dyn ValueModel>, config: AgentConfig, rng: StdRng) -> Self {
        Self {
            replay: ReplayBuffer::new(config.buffer_capacity),
            epsilon: config.epsilon_start,
            model,
            config,
            rng,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn buffer_len(&self) -> usize {
        self.replay.len()
    }

    /// Epsilon-greedy action selection. The exploration branch never
    /// touches the value model.
    pub fn act(&mut self, features: &[f32]) -> usize {
        self.check_feature_len(features);

        if self.rng.random::<f32>() < self.epsilon {
            self.rng.random_range(0..self.config.action_count)
        } else {
            self.greedy(features)
        }
    }

    /// Pure exploitation: argmax over predicted Q-values. Used when
    /// evaluating a frozen or loaded policy.
    pub fn act_greedy(&mut self, features: &[f32]) -> usize {
        self.check_feature_len(features);
        self.greedy(features)
    }

    fn greedy(&mut self, features: &[f32]) -> usize {
        let input = Matrix::from_vec(features.to_vec(), 1, features.len());
        let q_values = self.model.predict(&input);
        argmax(q_values.row(0))
    }

    pub fn remember(&mut self, transition: Transition) {
        self.check_feature_len(&transition.features);
        self.check_feature_len(&transition.next_features);
        self.replay.push(transition);
    }

    /// One training pass over a sampled batch. A no-op, not an error, while
    /// the buffer holds fewer transitions than one batch; returns the loss
    /// otherwise.
    pub fn train(&mut self) -> Option<f32> {
        let batch = self.replay.sample(&mut self.rng, self.config.batch_size)?;

        let q_current = self.model.predict(&batch.states);
        let q_next = self.model.predict(&batch.next_states);

        let mut targets = q_current;
        for i in 0..batch.actions.len() {
            let target = if batch.dones[i] {
                batch.rewards[i]
            } else {
                batch.rewards[i] + self.config.discount * row_max(q_next.row(i))
            };
            targets.row_mut(i)[batch.actions[i]] = target;
        }

        Some(self.model.fit(&batch.states, &targets))
    }

    /// epsilon <- max(epsilon_min, epsilon * decay). Called by the driver
    /// once per completed episode.
    pub fn decay_epsilon(&mut self) {
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
    }

    /// Durable save of the model plus epsilon into a named store slot.
    pub fn save(&mut self, store: &mut dyn ModelStore, slot: &str) -> Result<(), AgentError> {
        let bytes = persistence::encode_durable(&self.bundle());
        store.put(slot, &bytes)?;
        Ok(())
    }

    /// Durable load. Returns whether a valid model was found; on any
    /// failure the current model is left untouched and `false` is returned.
    pub fn load(&mut self, store: &dyn ModelStore, slot: &str) -> bool {
        let bytes = match store.get(slot) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return false,
            Err(err) => {
                log::warn!("model slot {slot} unreadable: {err}");
                return false;
            }
        };
        let bundle = match persistence::decode_durable(&bytes) {
            Ok(bundle) => bundle,
            Err(err) => {
                log::warn!("discarding corrupt model slot {slot}: {err}");
                return false;
            }
        };
        match self.install_bundle(bundle) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("model slot {slot} does not fit this agent: {err}");
                false
            }
        }
    }

    /// Portable export: the full model bundle as a flat byte payload.
    pub fn export_model(&self) -> Vec<u8> {
        persistence::encode_portable(&self.bundle())
    }

    /// Portable import. Decodes into a temporary model first, so a failure
    /// leaves the agent exactly as it was; on success the old model is
    /// replaced wholesale and epsilon restored from the bundle metadata
    /// (epsilon_min when absent).
    pub fn import_model(&mut self, bytes: &[u8]) -> Result<(), AgentError> {
        let bundle = persistence::decode_portable(bytes)?;
        self.install_bundle(bundle)
    }

    fn bundle(&self) -> ModelBundle {
        let mut bundle = self.model.to_bundle();
        bundle.meta.epsilon = Some(self.epsilon);
        bundle
    }

    fn install_bundle(&mut self, bundle: ModelBundle) -> Result<(), AgentError> {
        let model = persistence::model_from_bundle(&bundle)?;
        if model.input_dim() != self.config.feature_mode.width() {
            return Err(AgentError::ConfigMismatch {
                expected: self.config.feature_mode.width(),
                got: model.input_dim(),
            });
        }
        if model.output_dim() != self.config.action_count {
            return Err(AgentError::ConfigMismatch {
                expected: self.config.action_count,
                got: model.output_dim(),
            });
        }

        self.model = model;
        self.epsilon = bundle.meta.epsilon.unwrap_or(self.config.epsilon_min);
        Ok(())
    }

    fn check_feature_len(&self, features: &[f32]) {
        assert_eq!(
            features.len(),
            self.config.feature_mode.width(),
            "feature vector length {} does not match configured width {}",
            features.len(),
            self.config.feature_mode.width(),
        );
    }
}

fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn row_max(row: &[f32]) -> f32 {
    row.iter().fold(f32::NEG_INFINITY, |acc, &v| acc.max(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use std::cell::Cell;
    use std::rc::Rc;

    fn compact_config() -> AgentConfig {
        AgentConfig {
            feature_mode: FeatureMode::Compact,
            hidden_dims: vec![8],
            batch_size: 4,
            buffer_capacity: 32,
            ..Default::default()
        }
    }

    fn compact_features(tag: f32) -> Vec<f32> {
        vec![tag; FeatureMode::Compact.width()]
    }

    fn transition(tag: f32, done: bool) -> Transition {
        Transition {
            features: compact_features(tag),
            action: 1,
            reward: tag,
            next_features: compact_features(tag + 1.0),
            done,
        }
    }

    /// Backend that counts predict calls and always prefers action 2.
    struct CountingModel {
        input_dim: usize,
        predicts: Rc<Cell<usize>>,
    }

    impl ValueModel for CountingModel {
        fn input_dim(&self) -> usize {
            self.input_dim
        }

        fn output_dim(&self) -> usize {
            ACTION_COUNT
        }

        fn predict(&mut self, states: &Matrix) -> Matrix {
            self.predicts.set(self.predicts.get() + 1);
            let mut out = Matrix::zeros(states.rows, ACTION_COUNT);
            for r in 0..states.rows {
                out.row_mut(r)[2] = 1.0;
            }
            out
        }

        fn fit(&mut self, _states: &Matrix, _targets: &Matrix) -> f32 {
            0.0
        }

        fn to_bundle(&self) -> ModelBundle {
            unimplemented!("counting mock is never persisted")
        }
    }

    fn counting_agent(epsilon: f32) -> (Agent, Rc<Cell<usize>>) {
        let predicts = Rc::new(Cell::new(0));
        let model = Box::new(CountingModel {
            input_dim: FeatureMode::Compact.width(),
            predicts: Rc::clone(&predicts),
        });
        let mut config = compact_config();
        config.epsilon_start = epsilon;
        let agent = Agent::with_model(model, config).unwrap();
        (agent, predicts)
    }

    #[test]
    fn test_with_model_rejects_width_mismatch() {
        let predicts = Rc::new(Cell::new(0));
        let model = Box::new(CountingModel {
            input_dim: 5,
            predicts,
        });

        let result = Agent::with_model(model, compact_config());
        assert!(matches!(result, Err(AgentError::ConfigMismatch { expected: 11, got: 5 })));
    }

    #[test]
    fn test_full_exploration_never_predicts() {
        let (mut agent, predicts) = counting_agent(1.0);

        for _ in 0..200 {
            let action = agent.act(&compact_features(0.5));
            assert!(action < ACTION_COUNT);
        }

        assert_eq!(predicts.get(), 0, "epsilon 1.0 must never reach the model");
    }

    #[test]
    fn test_full_exploitation_is_deterministic() {
        let (mut agent, predicts) = counting_agent(0.0);

        for _ in 0..50 {
            assert_eq!(agent.act(&compact_features(0.5)), 2);
        }
        assert_eq!(predicts.get(), 50);
    }

    #[test]
    fn test_act_greedy_ignores_epsilon() {
        let (mut agent, _) = counting_agent(1.0);
        assert_eq!(agent.act_greedy(&compact_features(0.0)), 2);
    }

    #[test]
    fn test_epsilon_decay_clamps_at_minimum() {
        let mut agent = Agent::with_seed(compact_config(), 9);

        for _ in 0..5000 {
            agent.decay_epsilon();
        }

        assert_eq!(agent.epsilon(), agent.config().epsilon_min);
    }

    #[test]
    fn test_epsilon_decays_monotonically() {
        let mut agent = Agent::with_seed(compact_config(), 9);
        let mut previous = agent.epsilon();

        for _ in 0..100 {
            agent.decay_epsilon();
            assert!(agent.epsilon() <= previous);
            previous = agent.epsilon();
        }
    }

    #[test]
    fn test_train_underflow_is_noop() {
        let mut agent = Agent::with_seed(compact_config(), 11);

        assert!(agent.train().is_none(), "empty buffer");
        for i in 0..3 {
            agent.remember(transition(i as f32, false));
        }
        assert!(agent.train().is_none(), "fewer transitions than one batch");
    }

    #[test]
    fn test_train_returns_loss_once_filled() {
        let mut agent = Agent::with_seed(compact_config(), 12);

        for i in 0..8 {
            agent.remember(transition(i as f32 * 0.1, i % 4 == 3));
        }

        let loss = agent.train().expect("buffer holds a full batch");
        assert!(loss.is_finite());
    }

    #[test]
    #[should_panic(expected = "does not match configured width")]
    fn test_act_rejects_malformed_features() {
        let mut agent = Agent::with_seed(compact_config(), 13);
        agent.act(&[0.0; 7]);
    }

    #[test]
    #[should_panic(expected = "does not match configured width")]
    fn test_remember_rejects_malformed_features() {
        let mut agent = Agent::with_seed(compact_config(), 13);
        agent.remember(Transition {
            features: vec![0.0; 7],
            action: 0,
            reward: 0.0,
            next_features: vec![0.0; 7],
            done: false,
        });
    }

    #[test]
    fn test_export_import_roundtrip() {
        let mut source = Agent::with_seed(compact_config(), 21);
        source.decay_epsilon();
        source.decay_epsilon();
        let bytes = source.export_model();

        let mut fresh = Agent::with_seed(compact_config(), 22);
        fresh.import_model(&bytes).unwrap();

        // identical greedy choices on a fixed batch of feature vectors
        for i in 0..20 {
            let features: Vec<f32> = (0..11).map(|j| ((i * 11 + j) as f32).sin()).collect();
            assert_eq!(source.act_greedy(&features), fresh.act_greedy(&features));
        }
        assert_eq!(source.epsilon(), fresh.epsilon());
    }

    #[test]
    fn test_import_failure_leaves_model_untouched() {
        let mut agent = Agent::with_seed(compact_config(), 31);
        let features = compact_features(0.3);
        let before = agent.act_greedy(&features);

        assert!(agent.import_model(b"definitely not a bundle").is_err());

        assert_eq!(agent.act_greedy(&features), before);
    }

    #[test]
    fn test_import_restores_epsilon_min_when_meta_absent() {
        let source = Agent::with_seed(compact_config(), 41);
        let mut bundle = source.model.to_bundle();
        bundle.meta.epsilon = None;
        let bytes = persistence::encode_portable(&bundle);

        let mut fresh = Agent::with_seed(compact_config(), 42);
        fresh.import_model(&bytes).unwrap();

        assert_eq!(fresh.epsilon(), fresh.config().epsilon_min);
    }

    #[test]
    fn test_durable_save_load_roundtrip() {
        let mut store = MemoryStore::new();
        let mut source = Agent::with_seed(compact_config(), 51);
        source.decay_epsilon();
        source.save(&mut store, "snake-dqn").unwrap();

        let mut restored = Agent::with_seed(compact_config(), 52);
        assert!(restored.load(&store, "snake-dqn"));
        assert_eq!(restored.epsilon(), source.epsilon());

        let features = compact_features(0.7);
        assert_eq!(restored.act_greedy(&features), source.act_greedy(&features));
    }

    #[test]
    fn test_load_missing_slot_returns_false() {
        let store = MemoryStore::new();
        let mut agent = Agent::with_seed(compact_config(), 61);
        assert!(!agent.load(&store, "nothing-here"));
    }

    #[test]
    fn test_load_corrupt_slot_returns_false_and_keeps_model() {
        let mut store = MemoryStore::new();
        store.put("snake-dqn", b"corrupted bytes").unwrap();

        let mut agent = Agent::with_seed(compact_config(), 62);
        let features = compact_features(0.2);
        let before = agent.act_greedy(&features);

        assert!(!agent.load(&store, "snake-dqn"));
        assert_eq!(agent.act_greedy(&features), before);
    }
}
