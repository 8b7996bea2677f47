use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of discrete movement actions.
pub const ACTION_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Right, Direction::Down, Direction::Left];

    /// Unit delta as (dx, dy); y grows downward.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Right => Direction::Left,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
        }
    }

    /// 90 degrees clockwise, i.e. the heading-relative "right".
    pub fn clockwise(self) -> Direction {
        match self {
            Direction::Up => Direction::Right,
            Direction::Right => Direction::Down,
            Direction::Down => Direction::Left,
            Direction::Left => Direction::Up,
        }
    }

    /// 90 degrees counter-clockwise, i.e. the heading-relative "left".
    pub fn counter_clockwise(self) -> Direction {
        self.clockwise().opposite()
    }

    /// Action indices are Up=0, Right=1, Down=2, Left=3.
    pub fn from_action(action: usize) -> Direction {
        match action {
            0 => Direction::Up,
            1 => Direction::Right,
            2 => Direction::Down,
            3 => Direction::Left,
            _ => panic!("action index {action} out of range"),
        }
    }

    pub fn action_index(self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Right => 1,
            Direction::Down => 2,
            Direction::Left => 3,
        }
    }
}

/// A cell on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn moved_by(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub fn moved_in(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        self.moved_by(dx, dy)
    }

    pub fn manhattan_distance(self, other: Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Side length of the square grid.
    pub grid_size: i32,
    pub initial_snake_length: usize,
    /// Score added per food eaten; the score stays a multiple of this.
    pub score_increment: u32,

    // reward shaping
    pub food_reward: f32,
    pub death_penalty: f32,
    pub approach_reward: f32,
    pub retreat_penalty: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            grid_size: 20,
            initial_snake_length: 3,
            score_increment: 10,
            food_reward: 10.0,
            death_penalty: -10.0,
            approach_reward: 1.0,
            retreat_penalty: -1.0,
        }
    }
}

impl GameConfig {
    pub fn with_grid_size(grid_size: i32) -> Self {
        Self {
            grid_size,
            ..Default::default()
        }
    }

    /// Small grid for tests; the starvation timeout is only 64 steps.
    pub fn small() -> Self {
        Self::with_grid_size(8)
    }
}

/// Full observable simulation state. Segments are head-first, all distinct
/// and in bounds; the food cell never coincides with a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub snake: VecDeque<Position>,
    pub food: Position,
    pub direction: Direction,
    pub score: u32,
    pub game_over: bool,
    pub grid_size: i32,
}

impl GameState {
    pub fn head(&self) -> Position {
        *self.snake.front().expect("snake is never empty")
    }

    pub fn tail(&self) -> Position {
        *self.snake.back().expect("snake is never empty")
    }

    pub fn is_in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.x < self.grid_size && pos.y >= 0 && pos.y < self.grid_size
    }

    pub fn is_occupied(&self, pos: Position) -> bool {
        self.snake.contains(&pos)
    }
}

/// Per-step result handed back to the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub reward: f32,
    pub done: bool,
    pub ate_food: bool,
}

/// The grid environment. Owns one [`GameState`], a buffered pending heading,
/// and the starvation counter; terminal states are absorbing until `reset`.
pub struct Game {
    config: GameConfig,
    state: GameState,
    pending_direction: Direction,
    steps_without_food: u32,
    rng: StdRng,
}

impl Game {
    pub fn new(config: GameConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Deterministic food spawning for tests.
    pub fn with_seed(config: GameConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GameConfig, rng: StdRng) -> Self {
        let mut game = Self {
            state: GameState {
                snake: VecDeque::new(),
                food: Position::new(0, 0),
                direction: Direction::Right,
                score: 0,
                game_over: false,
                grid_size: config.grid_size,
            },
            pending_direction: Direction::Right,
            steps_without_food: 0,
            config,
            rng,
        };
        game.reset();
        game
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Read-only snapshot of the current state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Start a fresh episode: three segments centered on the grid heading
    /// right, score zero, food on a random free cell.
    pub fn reset(&mut self) -> &GameState {
        let mid = self.config.grid_size / 2;
        let mut snake = VecDeque::with_capacity(self.config.initial_snake_length);
        for i in 0..self.config.initial_snake_length {
            snake.push_back(Position::new(mid - i as i32, mid));
        }

        self.state.snake = snake;
        self.state.direction = Direction::Right;
        self.state.score = 0;
        self.state.game_over = false;
        self.pending_direction = Direction::Right;
        self.steps_without_food = 0;
        self.spawn_food();

        &self.state
    }

    /// Buffer a heading change for the next `update`. A reversal onto the
    /// snake's own neck is rejected.
    pub fn set_direction(&mut self, direction: Direction) {
        if direction == self.state.direction.opposite() {
            return;
        }
        self.pending_direction = direction;
    }

    /// Advance the simulation one tick. No-op once terminal.
    pub fn update(&mut self) {
        if self.state.game_over {
            return;
        }

        self.state.direction = self.pending_direction;
        let new_head = self.state.head().moved_in(self.state.direction);

        // strict grow-or-move: every current segment blocks, tail included
        if !self.state.is_in_bounds(new_head) || self.state.is_occupied(new_head) {
            self.state.game_over = true;
            return;
        }

        self.state.snake.push_front(new_head);

        if new_head == self.state.food {
            self.state.score += self.config.score_increment;
            self.spawn_food();
        } else {
            self.state.snake.pop_back();
        }
    }

    /// Apply one discrete action and compute the shaped reward.
    ///
    /// Panics if `action` is outside `0..ACTION_COUNT`. On an already
    /// terminal state this is a no-op that reports `done`.
    pub fn step(&mut self, action: usize) -> StepOutcome {
        assert!(action < ACTION_COUNT, "action index {action} out of range");

        if self.state.game_over {
            return StepOutcome {
                reward: 0.0,
                done: true,
                ate_food: false,
            };
        }

        let prev_distance = self.state.head().manhattan_distance(self.state.food);
        let prev_score = self.state.score;

        self.set_direction(Direction::from_action(action));
        self.update();

        let ate_food = self.state.score > prev_score;
        let reward = if ate_food {
            self.steps_without_food = 0;
            self.config.food_reward
        } else if self.state.game_over {
            self.config.death_penalty
        } else {
            self.steps_without_food += 1;
            let timeout = (self.state.grid_size * self.state.grid_size) as u32;
            if self.steps_without_food > timeout {
                self.state.game_over = true;
                self.config.death_penalty
            } else {
                let distance = self.state.head().manhattan_distance(self.state.food);
                if distance < prev_distance {
                    self.config.approach_reward
                } else {
                    self.config.retreat_penalty
                }
            }
        };

        StepOutcome {
            reward,
            done: self.state.game_over,
            ate_food,
        }
    }

    /// Uniform choice over currently free cells. A full grid ends the
    /// episode, since the food invariant cannot be kept.
    fn spawn_food(&mut self) {
        let mut free = Vec::new();
        for y in 0..self.state.grid_size {
            for x in 0..self.state.grid_size {
                let pos = Position::new(x, y);
                if !self.state.is_occupied(pos) {
                    free.push(pos);
                }
            }
        }

        if free.is_empty() {
            self.state.game_over = true;
            return;
        }
        self.state.food = free[self.rng.random_range(0..free.len())];
    }
}
