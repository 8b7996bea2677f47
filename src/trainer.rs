//! Time-sliced training driver.
//!
//! The driver never owns the host loop: callers invoke [`Trainer::run_slice`]
//! from whatever cooperative scheduler they have (a render frame, a plain
//! loop) and the driver does a bounded amount of work per call. Episode
//! progress survives across slices through an internal cursor.

use crate::agent::Agent;
use crate::agent::replaybuffer::Transition;
use crate::features::extract_features;
use crate::game::{Game, GameState};
use crate::persistence::ModelStore;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Wall-clock budget per slice.
    pub slice_budget: Duration,
    /// Iteration backstop so a slice stays bounded even under a coarse clock.
    pub max_steps_per_slice: usize,
    /// Completed-episode window for the moving average reward.
    pub reward_window: usize,
    /// Store slot for the best-effort save on cancellation.
    pub autosave_slot: Option<String>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            slice_budget: Duration::from_millis(8),
            max_steps_per_slice: 512,
            reward_window: 100,
            autosave_slot: None,
        }
    }
}

/// Progress snapshot, published at slice boundaries only.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrainingStats {
    pub episode: usize,
    pub epsilon: f32,
    pub avg_reward: f32,
    pub best_score: u32,
}

/// Shared cooperative cancellation flag, checked at slice and step
/// boundaries. The current step always completes.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

struct EpisodeCursor {
    features: Vec<f32>,
    total_reward: f32,
}

/// Owns one environment and one agent for the lifetime of a training
/// session; all access to either is serialized through slice calls.
pub struct Trainer {
    game: Game,
    agent: Agent,
    config: TrainerConfig,
    cancel: CancelToken,
    store: Option<Box<dyn ModelStore>>,
    episode: usize,
    best_score: u32,
    reward_window: VecDeque<f32>,
    cursor: EpisodeCursor,
    autosave_done: bool,
}

impl Trainer {
    pub fn new(mut game: Game, agent: Agent, config: TrainerConfig) -> Self {
        game.reset();
        let features = extract_features(game.state(), agent.config().feature_mode);
        Self {
            game,
            agent,
            config,
            cancel: CancelToken::new(),
            store: None,
            episode: 0,
            best_score: 0,
            reward_window: VecDeque::new(),
            cursor: EpisodeCursor {
                features,
                total_reward: 0.0,
            },
            autosave_done: false,
        }
    }

    /// Attach the durable store used for the best-effort save on stop.
    pub fn with_store(mut self, store: Box<dyn ModelStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut Agent {
        &mut self.agent
    }

    pub fn into_agent(self) -> Agent {
        self.agent
    }

    /// The training environment's current state, for observers that render
    /// the session.
    pub fn game_state(&self) -> &GameState {
        self.game.state()
    }

    pub fn stats(&self) -> TrainingStats {
        let avg_reward = if self.reward_window.is_empty() {
            0.0
        } else {
            self.reward_window.iter().sum::<f32>() / self.reward_window.len() as f32
        };
        TrainingStats {
            episode: self.episode,
            epsilon: self.agent.epsilon(),
            avg_reward,
            best_score: self.best_score,
        }
    }

    /// Run one bounded slice of environment interaction, then train once if
    /// at least one episode completed inside it. Returns the stats snapshot
    /// for this boundary. After cancellation the call degenerates to the
    /// best-effort save and an unchanged snapshot.
    pub fn run_slice(&mut self) -> TrainingStats {
        if self.cancel.is_cancelled() {
            self.autosave();
            return self.stats();
        }

        let mode = self.agent.config().feature_mode;
        let deadline = Instant::now() + self.config.slice_budget;
        let mut episodes_completed = 0;

        for _ in 0..self.config.max_steps_per_slice {
            if self.cancel.is_cancelled() {
                break;
            }

            let action = self.agent.act(&self.cursor.features);
            let outcome = self.game.step(action);
            let next_features = extract_features(self.game.state(), mode);

            self.agent.remember(Transition {
                features: std::mem::take(&mut self.cursor.features),
                action,
                reward: outcome.reward,
                next_features: next_features.clone(),
                done: outcome.done,
            });
            self.cursor.total_reward += outcome.reward;

            if outcome.done {
                self.episode += 1;
                episodes_completed += 1;
                self.agent.decay_epsilon();

                if self.reward_window.len() == self.config.reward_window {
                    self.reward_window.pop_front();
                }
                self.reward_window.push_back(self.cursor.total_reward);
                self.best_score = self.best_score.max(self.game.state().score);

                self.game.reset();
                self.cursor = EpisodeCursor {
                    features: extract_features(self.game.state(), mode),
                    total_reward: 0.0,
                };
            } else {
                self.cursor.features = next_features;
            }

            if Instant::now() >= deadline {
                break;
            }
        }

        if episodes_completed > 0 {
            self.agent.train();
        }
        if self.cancel.is_cancelled() {
            self.autosave();
        }

        self.stats()
    }

    /// Drive whole slices until the episode target is reached or the
    /// session is cancelled.
    pub fn run_to_episodes(&mut self, target: usize) -> TrainingStats {
        while self.episode < target && !self.cancel.is_cancelled() {
            self.run_slice();
        }
        if self.cancel.is_cancelled() {
            self.autosave();
        }
        self.stats()
    }

    fn autosave(&mut self) {
        if self.autosave_done {
            return;
        }
        self.autosave_done = true;

        let Some(slot) = self.config.autosave_slot.clone() else {
            return;
        };
        let Some(store) = self.store.as_deref_mut() else {
            return;
        };
        if let Err(err) = self.agent.save(store, &slot) {
            log::warn!("best-effort model save failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;
    use crate::features::FeatureMode;
    use crate::game::GameConfig;
    use crate::persistence::{MemoryStore, ModelStore};

    fn small_trainer(config: TrainerConfig) -> Trainer {
        let game = Game::with_seed(GameConfig::small(), 5);
        let agent = Agent::with_seed(
            AgentConfig {
                feature_mode: FeatureMode::Compact,
                hidden_dims: vec![16],
                batch_size: 8,
                buffer_capacity: 1024,
                ..Default::default()
            },
            6,
        );
        Trainer::new(game, agent, config)
    }

    fn roomy_config() -> TrainerConfig {
        TrainerConfig {
            slice_budget: Duration::from_millis(50),
            max_steps_per_slice: 2000,
            ..Default::default()
        }
    }

    #[test]
    fn test_slices_complete_episodes() {
        let mut trainer = small_trainer(roomy_config());

        let mut stats = TrainingStats::default();
        for _ in 0..30 {
            stats = trainer.run_slice();
            if stats.episode >= 3 {
                break;
            }
        }

        assert!(stats.episode >= 3, "expected episodes to finish, got {}", stats.episode);
        assert!(stats.epsilon < 1.0, "epsilon decays once per completed episode");
        assert!(!trainer.reward_window.is_empty());
    }

    #[test]
    fn test_epsilon_decays_once_per_episode() {
        let mut trainer = small_trainer(roomy_config());

        let mut stats = trainer.stats();
        while stats.episode < 5 {
            stats = trainer.run_slice();
        }

        let expected = (0.995f32).powi(stats.episode as i32).max(0.01);
        assert!((stats.epsilon - expected).abs() < 1e-5);
    }

    #[test]
    fn test_reward_window_is_bounded() {
        let mut trainer = small_trainer(TrainerConfig {
            reward_window: 3,
            ..roomy_config()
        });

        let mut stats = trainer.stats();
        while stats.episode < 8 {
            stats = trainer.run_slice();
        }

        assert!(trainer.reward_window.len() <= 3);
    }

    #[test]
    fn test_iteration_backstop_bounds_slice() {
        let mut trainer = small_trainer(TrainerConfig {
            slice_budget: Duration::from_secs(60),
            max_steps_per_slice: 10,
            ..Default::default()
        });

        trainer.run_slice();

        // at most one transition per permitted step
        assert!(trainer.agent().buffer_len() <= 10);
    }

    #[test]
    fn test_cancellation_stops_work_and_autosaves() {
        let mut trainer = small_trainer(TrainerConfig {
            autosave_slot: Some("autosave".into()),
            ..roomy_config()
        })
        .with_store(Box::new(MemoryStore::new()));

        trainer.run_slice();
        let token = trainer.cancel_token();
        token.cancel();

        let stats_at_cancel = trainer.run_slice();
        let buffered = trainer.agent().buffer_len();

        // further slices do no environment work
        trainer.run_slice();
        assert_eq!(trainer.agent().buffer_len(), buffered);
        assert_eq!(trainer.stats(), stats_at_cancel);

        // the best-effort save landed in the store
        let store = trainer.store.as_ref().unwrap();
        assert!(store.get("autosave").unwrap().is_some());
    }

    #[test]
    fn test_run_to_episodes_reaches_target() {
        let mut trainer = small_trainer(roomy_config());
        let stats = trainer.run_to_episodes(4);
        assert!(stats.episode >= 4);
    }

    #[test]
    fn test_stats_are_slice_boundary_snapshots() {
        let trainer = small_trainer(roomy_config());
        let stats = trainer.stats();

        assert_eq!(stats.episode, 0);
        assert_eq!(stats.avg_reward, 0.0);
        assert_eq!(stats.best_score, 0);
        assert_eq!(stats.epsilon, 1.0);
    }
}
