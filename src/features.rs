//! Pure mapping from a [`GameState`] to the agent's input vector.
//!
//! Everything here is heading-relative where it matters: danger flags,
//! ray casts, and the directional flood fills are computed for
//! straight/right/left relative to the snake's current heading, not for
//! absolute grid directions.

use crate::game::{Direction, GameState, Position};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Which feature layout the extractor produces. The value model's input
/// width must match `width()` exactly; the agent treats a mismatch as a
/// configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureMode {
    /// 1-step danger flags, heading one-hot, food direction flags.
    Compact,
    /// Full layout: dangers at one and two steps, ray distances, heading
    /// one-hot, food flags, wall distances, length, flood-fill ratios,
    /// tail offset signs.
    Full,
}

impl FeatureMode {
    pub fn width(self) -> usize {
        match self {
            FeatureMode::Compact => 11,
            FeatureMode::Full => 28,
        }
    }
}

/// Extract the feature vector for `state`. Pure: no randomness, no caching,
/// bit-identical output for identical input.
pub fn extract_features(state: &GameState, mode: FeatureMode) -> Vec<f32> {
    let gs = state.grid_size;
    let head = state.head();
    let heading = state.direction;

    let straight = heading;
    let right = heading.clockwise();
    let left = heading.counter_clockwise();

    let occupied = occupancy_grid(state);
    let blocked =
        |pos: Position| !state.is_in_bounds(pos) || occupied[cell_index(pos, gs)];

    let danger_straight = blocked(head.moved_in(straight));
    let danger_right = blocked(head.moved_in(right));
    let danger_left = blocked(head.moved_in(left));

    let food_up = state.food.y < head.y;
    let food_right = state.food.x > head.x;
    let food_down = state.food.y > head.y;
    let food_left = state.food.x < head.x;

    let heading_one_hot = [
        (heading == Direction::Up) as i32 as f32,
        (heading == Direction::Right) as i32 as f32,
        (heading == Direction::Down) as i32 as f32,
        (heading == Direction::Left) as i32 as f32,
    ];

    if mode == FeatureMode::Compact {
        return vec![
            danger_straight as i32 as f32,
            danger_right as i32 as f32,
            danger_left as i32 as f32,
            heading_one_hot[0],
            heading_one_hot[1],
            heading_one_hot[2],
            heading_one_hot[3],
            food_up as i32 as f32,
            food_right as i32 as f32,
            food_down as i32 as f32,
            food_left as i32 as f32,
        ];
    }

    let two_steps = |dir: Direction| {
        let (dx, dy) = dir.delta();
        blocked(head.moved_by(dx * 2, dy * 2))
    };

    let tail = state.tail();
    let total_free = (gs * gs) as usize - state.snake.len();
    let flood_max = total_free.max(1) as f32;

    let reachable = reachable_from_head(state, &occupied);
    let flood_ratio = if total_free > 0 {
        reachable as f32 / total_free as f32
    } else {
        0.0
    };

    vec![
        danger_straight as i32 as f32,
        danger_right as i32 as f32,
        danger_left as i32 as f32,
        two_steps(straight) as i32 as f32,
        two_steps(right) as i32 as f32,
        two_steps(left) as i32 as f32,
        ray_distance(state, &occupied, straight),
        ray_distance(state, &occupied, right),
        ray_distance(state, &occupied, left),
        heading_one_hot[0],
        heading_one_hot[1],
        heading_one_hot[2],
        heading_one_hot[3],
        food_up as i32 as f32,
        food_right as i32 as f32,
        food_down as i32 as f32,
        food_left as i32 as f32,
        head.y as f32 / gs as f32,
        (gs - 1 - head.x) as f32 / gs as f32,
        (gs - 1 - head.y) as f32 / gs as f32,
        head.x as f32 / gs as f32,
        state.snake.len() as f32 / (gs * gs) as f32,
        flood_ratio,
        reachable_area(state, &occupied, head.moved_in(straight)) as f32 / flood_max,
        reachable_area(state, &occupied, head.moved_in(right)) as f32 / flood_max,
        reachable_area(state, &occupied, head.moved_in(left)) as f32 / flood_max,
        (tail.x - head.x).signum() as f32,
        (tail.y - head.y).signum() as f32,
    ]
}

fn cell_index(pos: Position, grid_size: i32) -> usize {
    (pos.y * grid_size + pos.x) as usize
}

fn occupancy_grid(state: &GameState) -> Vec<bool> {
    let gs = state.grid_size;
    let mut grid = vec![false; (gs * gs) as usize];
    for segment in &state.snake {
        grid[cell_index(*segment, gs)] = true;
    }
    grid
}

/// Steps to the first wall or body cell along `dir`, normalized by the grid
/// dimension. The first cell already counts as one step.
fn ray_distance(state: &GameState, occupied: &[bool], dir: Direction) -> f32 {
    let (dx, dy) = dir.delta();
    let mut pos = state.head().moved_by(dx, dy);
    let mut distance = 1;

    while state.is_in_bounds(pos) && !occupied[cell_index(pos, state.grid_size)] {
        pos = pos.moved_by(dx, dy);
        distance += 1;
    }

    distance as f32 / state.grid_size as f32
}

/// Free cells reachable from the head by 4-connected flood fill. The head
/// itself is the seed, not part of the count.
fn reachable_from_head(state: &GameState, occupied: &[bool]) -> usize {
    let gs = state.grid_size;
    let head = state.head();

    let mut visited = vec![false; (gs * gs) as usize];
    visited[cell_index(head, gs)] = true;

    let mut queue = VecDeque::from([head]);
    let mut count = 0;

    while let Some(pos) = queue.pop_front() {
        for dir in Direction::ALL {
            let next = pos.moved_in(dir);
            if !state.is_in_bounds(next) {
                continue;
            }
            let idx = cell_index(next, gs);
            if !occupied[idx] && !visited[idx] {
                visited[idx] = true;
                count += 1;
                queue.push_back(next);
            }
        }
    }

    count
}

/// Free cells reachable from `start` inclusive; zero if `start` is blocked.
fn reachable_area(state: &GameState, occupied: &[bool], start: Position) -> usize {
    let gs = state.grid_size;
    if !state.is_in_bounds(start) || occupied[cell_index(start, gs)] {
        return 0;
    }

    let mut visited = vec![false; (gs * gs) as usize];
    visited[cell_index(start, gs)] = true;

    let mut queue = VecDeque::from([start]);
    let mut count = 1;

    while let Some(pos) = queue.pop_front() {
        for dir in Direction::ALL {
            let next = pos.moved_in(dir);
            if !state.is_in_bounds(next) {
                continue;
            }
            let idx = cell_index(next, gs);
            if !occupied[idx] && !visited[idx] {
                visited[idx] = true;
                count += 1;
                queue.push_back(next);
            }
        }
    }

    count
}
