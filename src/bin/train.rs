use anyhow::Result;
use log::info;
use snakeq::{Agent, AgentConfig, FileStore, Game, GameConfig, Trainer, TrainerConfig};

const EPISODES: usize = 500;
const MODEL_DIR: &str = "models";
const MODEL_SLOT: &str = "snake-dqn";
const LOG_EVERY: usize = 25;

fn main() -> Result<()> {
    env_logger::init();

    let game = Game::new(GameConfig::default());
    let agent = Agent::new(AgentConfig::default());
    let config = TrainerConfig {
        autosave_slot: Some(MODEL_SLOT.to_string()),
        ..Default::default()
    };
    let mut trainer =
        Trainer::new(game, agent, config).with_store(Box::new(FileStore::new(MODEL_DIR)));

    info!("training for {EPISODES} episodes");

    let mut last_logged = 0;
    while trainer.stats().episode < EPISODES {
        let stats = trainer.run_slice();
        if stats.episode >= last_logged + LOG_EVERY {
            info!(
                "episode {} | epsilon {:.3} | avg reward {:.1} | best score {}",
                stats.episode, stats.epsilon, stats.avg_reward, stats.best_score
            );
            last_logged = stats.episode;
        }
    }

    let mut agent = trainer.into_agent();
    let mut store = FileStore::new(MODEL_DIR);
    agent.save(&mut store, MODEL_SLOT)?;

    let bundle_path = format!("{MODEL_DIR}/{MODEL_SLOT}.bundle");
    std::fs::write(&bundle_path, agent.export_model())?;

    info!("saved model slot {MODEL_SLOT} and portable bundle {bundle_path}");
    Ok(())
}
