pub mod agent;
pub mod error;
pub mod features;
pub mod game;
pub mod net;
pub mod persistence;
pub mod trainer;

pub use agent::replaybuffer::{ReplayBuffer, SampleBatch, Transition};
pub use agent::{Agent, AgentConfig};
pub use error::AgentError;
pub use features::{FeatureMode, extract_features};
pub use game::{ACTION_COUNT, Direction, Game, GameConfig, GameState, Position, StepOutcome};
pub use net::matrix::Matrix;
pub use net::{Mlp, ValueModel};
pub use persistence::{FileStore, MemoryStore, ModelBundle, ModelStore, ModelTopology, WeightSpec};
pub use trainer::{CancelToken, Trainer, TrainerConfig, TrainingStats};
