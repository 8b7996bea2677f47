use macroquad::prelude::*;
use snakeq::{
    Agent, AgentConfig, Direction, FileStore, Game, GameConfig, GameState, Trainer, TrainerConfig,
    TrainingStats, extract_features,
};

const SCORE_AREA_HEIGHT: f32 = 60.0;
const SCORE_TEXT_SIZE: f32 = 40.0;
const CELL_SIZE: i32 = 30;
const BASE_TICK_SPEED: f32 = 0.15; // seconds
const TICK_INCREASE_RATE: f32 = 0.004; // per score point
const MIN_TICK_SPEED: f32 = 0.05; // seconds
const AGENT_TICK_SPEED: f32 = 0.05; // seconds
const MODEL_DIR: &str = "models";
const MODEL_SLOT: &str = "snake-dqn";

enum Mode {
    Menu,
    Human,
    Watch,
    Train,
}

fn window_conf() -> Conf {
    let grid_size = GameConfig::default().grid_size;
    Conf {
        window_title: "snakeq".to_owned(),
        window_width: grid_size * CELL_SIZE,
        window_height: (SCORE_AREA_HEIGHT as i32) + grid_size * CELL_SIZE,
        window_resizable: false,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    let store = FileStore::new(MODEL_DIR);
    let mut game = Game::new(GameConfig::default());

    let mut loaded_agent = Agent::new(AgentConfig::default());
    if !loaded_agent.load(&store, MODEL_SLOT) {
        println!("no saved model found; starting with an untrained agent");
    }
    let mut agent = Some(loaded_agent);
    let mut trainer: Option<Trainer> = None;

    let mut mode = Mode::Menu;
    let mut curr_tick_speed = BASE_TICK_SPEED;
    let mut time_accumulator = 0.0f32;

    loop {
        match mode {
            Mode::Menu => {
                if let Some(next) = draw_menu() {
                    game.reset();
                    time_accumulator = 0.0;
                    curr_tick_speed = BASE_TICK_SPEED;
                    if matches!(next, Mode::Train) {
                        let config = TrainerConfig {
                            autosave_slot: Some(MODEL_SLOT.to_string()),
                            ..Default::default()
                        };
                        trainer = Some(
                            Trainer::new(
                                Game::new(GameConfig::default()),
                                agent.take().expect("agent is parked while not training"),
                                config,
                            )
                            .with_store(Box::new(FileStore::new(MODEL_DIR))),
                        );
                    }
                    mode = next;
                }
            }
            Mode::Human => {
                if game.state().game_over {
                    game.reset();
                    mode = Mode::Menu;
                } else {
                    time_accumulator += get_frame_time();
                    while time_accumulator >= curr_tick_speed {
                        time_accumulator -= curr_tick_speed;
                        game.update();

                        // speed up as the score grows
                        curr_tick_speed = 1.0
                            / ((1.0 / BASE_TICK_SPEED)
                                * (1.0 + game.state().score as f32 * TICK_INCREASE_RATE));
                        curr_tick_speed = curr_tick_speed.max(MIN_TICK_SPEED);
                    }

                    handle_key_inputs(&mut game);
                    draw_game(game.state(), None);
                }
            }
            Mode::Watch => {
                if game.state().game_over {
                    game.reset();
                    mode = Mode::Menu;
                } else {
                    let greedy = agent.as_mut().expect("agent is parked while not training");
                    time_accumulator += get_frame_time();
                    while time_accumulator >= AGENT_TICK_SPEED {
                        time_accumulator -= AGENT_TICK_SPEED;
                        let features =
                            extract_features(game.state(), greedy.config().feature_mode);
                        let action = greedy.act_greedy(&features);
                        game.step(action);
                    }

                    draw_game(game.state(), None);
                }
            }
            Mode::Train => {
                let session = trainer.as_mut().expect("training session is active");
                let stats = session.run_slice();
                draw_game(session.game_state(), Some(stats));

                if is_key_pressed(KeyCode::Escape) {
                    session.cancel_token().cancel();
                    session.run_slice(); // lets the best-effort save happen
                    agent = Some(trainer.take().expect("training session is active").into_agent());
                    mode = Mode::Menu;
                }
            }
        }

        next_frame().await
    }
}

struct Button {
    rect: Rect,
    text: &'static str,
}

impl Button {
    fn new(x: f32, y: f32, w: f32, h: f32, text: &'static str) -> Self {
        Self {
            rect: Rect::new(x, y, w, h),
            text,
        }
    }

    fn draw_and_check_click(&self) -> bool {
        let mouse_pos = mouse_position();
        let mouse_over = self.rect.contains(vec2(mouse_pos.0, mouse_pos.1));

        let color = if mouse_over {
            Color::from_rgba(100, 100, 120, 255)
        } else {
            Color::from_rgba(80, 80, 100, 255)
        };

        draw_rectangle(self.rect.x, self.rect.y, self.rect.w, self.rect.h, color);
        let text_dims = measure_text(self.text, None, 30, 1.0);
        let text_x = self.rect.x + (self.rect.w - text_dims.width) / 2.0;
        let text_y = self.rect.y + (self.rect.h - text_dims.height) / 2.0 + text_dims.offset_y;
        draw_text(self.text, text_x, text_y, 30.0, WHITE);
        mouse_over && is_mouse_button_pressed(MouseButton::Left)
    }
}

fn draw_menu() -> Option<Mode> {
    let center_x = screen_width() / 2.0;
    let center_y = screen_height() / 2.0;
    let button_width = 250.0;
    let button_height = 60.0;
    let spacing = 20.0;

    let title = "snakeq";
    let title_dims = measure_text(title, None, 50, 1.0);
    draw_text(title, center_x - title_dims.width / 2.0, center_y - 140.0, 50.0, BLACK);

    let buttons = [
        ("Human Player", Mode::Human),
        ("Watch Agent", Mode::Watch),
        ("Train Agent", Mode::Train),
    ];

    for (i, (label, next)) in buttons.into_iter().enumerate() {
        let y = center_y - button_height - spacing / 2.0 + i as f32 * (button_height + spacing);
        let button = Button::new(center_x - button_width / 2.0, y, button_width, button_height, label);
        if button.draw_and_check_click() {
            return Some(next);
        }
    }
    None
}

fn draw_game(state: &GameState, stats: Option<TrainingStats>) {
    let screen_w = screen_width();
    let screen_h = screen_height();

    // score area

    let score_area = Rect::new(0.0, 0.0, screen_w, SCORE_AREA_HEIGHT);

    draw_rectangle(
        score_area.x,
        score_area.y,
        score_area.w,
        score_area.h,
        Color::new(0.1, 0.1, 0.2, 1.0),
    );
    draw_line(score_area.x, score_area.h, screen_w, score_area.h, 2.0, BLACK);

    match stats {
        Some(stats) => {
            let line = format!(
                "Ep {}  eps {:.3}  avg {:.1}  best {}  (Esc stops)",
                stats.episode, stats.epsilon, stats.avg_reward, stats.best_score
            );
            draw_text(&line, 10.0, score_area.h / 2.0 + 8.0, 24.0, WHITE);
        }
        None => {
            let score_text = format!("Score: {}", state.score);
            let text_dims = measure_text(&score_text, None, SCORE_TEXT_SIZE as u16, 1.0);
            draw_text(
                &score_text,
                score_area.w / 2.0 - text_dims.width / 2.0,
                score_area.y + score_area.h / 2.0 + text_dims.height / 2.0,
                SCORE_TEXT_SIZE,
                WHITE,
            );
        }
    }

    // game area

    let game_area = Rect::new(0.0, score_area.h, screen_w, screen_h - score_area.h);

    let cell_width = game_area.w / state.grid_size as f32;
    let cell_height = game_area.h / state.grid_size as f32;
    let grid_line_color = Color::new(0.4, 0.4, 0.4, 0.3);

    for i in 1..state.grid_size {
        let x = game_area.x + i as f32 * cell_width;
        draw_line(x, game_area.y, x, game_area.y + game_area.h, 1.0, grid_line_color);
    }
    for i in 1..state.grid_size {
        let y = game_area.y + i as f32 * cell_height;
        draw_line(game_area.x, y, game_area.x + game_area.w, y, 1.0, grid_line_color);
    }

    let cell_fill_border: f32 = 2.0;

    // food

    let food_x = game_area.x + state.food.x as f32 * cell_width;
    let food_y = game_area.y + state.food.y as f32 * cell_height;
    draw_rectangle(
        food_x,
        food_y,
        cell_width - 1.0,
        cell_height - 1.0,
        Color::new(0.5, 0.0, 0.0, 1.0),
    );
    draw_rectangle(
        food_x + cell_fill_border,
        food_y + cell_fill_border,
        (cell_width - 1.0) - cell_fill_border * 2.0,
        (cell_height - 1.0) - cell_fill_border * 2.0,
        RED,
    );

    // snake

    for (i, segment) in state.snake.iter().enumerate() {
        let segment_x = game_area.x + segment.x as f32 * cell_width;
        let segment_y = game_area.y + segment.y as f32 * cell_height;
        draw_rectangle(
            segment_x,
            segment_y,
            cell_width - 1.0,
            cell_height - 1.0,
            DARKGREEN,
        );
        draw_rectangle(
            segment_x + cell_fill_border,
            segment_y + cell_fill_border,
            (cell_width - 1.0) - cell_fill_border * 2.0,
            (cell_height - 1.0) - cell_fill_border * 2.0,
            if i == 0 { LIME } else { GREEN },
        );
    }
}

fn handle_key_inputs(game: &mut Game) {
    // use WASD or arrow keys for input
    if is_key_pressed(KeyCode::Up) || is_key_pressed(KeyCode::W) {
        game.set_direction(Direction::Up);
    } else if is_key_pressed(KeyCode::Down) || is_key_pressed(KeyCode::S) {
        game.set_direction(Direction::Down);
    } else if is_key_pressed(KeyCode::Right) || is_key_pressed(KeyCode::D) {
        game.set_direction(Direction::Right);
    } else if is_key_pressed(KeyCode::Left) || is_key_pressed(KeyCode::A) {
        game.set_direction(Direction::Left);
    }
}
