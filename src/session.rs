//! Headless games with a fixed policy, for comparing policies offline.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::config::AutoplayConfig;
use crate::engine::{Game, GameHost};
use crate::evaluator::Evaluator;
use crate::policy::Policy;

/// Final state of one headless game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSummary {
    pub seed: u64,
    pub score: u64,
    pub moves: u64,
    pub highest_tile: u32,
    pub simulations: u64,
}

/// Play one game to the end with `policy`, without ticks or a ledger.
///
/// `max_moves` caps the game length; `None` plays until no move remains.
pub fn play_game(config: &AutoplayConfig, policy: &Policy, seed: u64, max_moves: Option<u64>) -> GameSummary {
    let mut game = Game::new(config, seed);
    let mut rng = StdRng::seed_from_u64(seed ^ 0x9e37_79b9_7f4a_7c15);
    let mut simulations = 0;
    while !game.is_game_over() {
        if max_moves.is_some_and(|limit| game.moves() >= limit) {
            break;
        }
        let mut evaluator = Evaluator::new(game.rules());
        let decision = evaluator.select_move(game.grid(), policy, &mut rng);
        simulations += evaluator.last_stats().simulations;
        let Some(direction) = decision.direction else { break };
        game.apply_move(direction);
    }
    GameSummary {
        seed,
        score: game.score(),
        moves: game.moves(),
        highest_tile: game.grid().highest_tile(),
        simulations,
    }
}

/// Play `games` independent games in parallel, seeded `base_seed..base_seed + games`.
///
/// `on_done` is called from worker threads as games finish.
pub fn evaluate<F>(
    config: &AutoplayConfig,
    policy: &Policy,
    games: u64,
    base_seed: u64,
    max_moves: Option<u64>,
    on_done: F,
) -> Vec<GameSummary>
where
    F: Fn(&GameSummary) + Sync,
{
    (0..games)
        .into_par_iter()
        .map(|i| {
            let summary = play_game(config, policy, base_seed.wrapping_add(i), max_moves);
            on_done(&summary);
            summary
        })
        .collect()
}

/// Mean, best and worst score over a batch of games.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSummary {
    pub games: usize,
    pub mean_score: f64,
    pub best_score: u64,
    pub worst_score: u64,
    pub highest_tile: u32,
    pub mean_moves: f64,
}

impl BatchSummary {
    pub fn from_games(games: &[GameSummary]) -> Option<Self> {
        if games.is_empty() {
            return None;
        }
        let n = games.len() as f64;
        Some(BatchSummary {
            games: games.len(),
            mean_score: games.iter().map(|g| g.score as f64).sum::<f64>() / n,
            best_score: games.iter().map(|g| g.score).max().unwrap_or(0),
            worst_score: games.iter().map(|g| g.score).min().unwrap_or(0),
            highest_tile: games.iter().map(|g| g.highest_tile).max().unwrap_or(0),
            mean_moves: games.iter().map(|g| g.moves as f64).sum::<f64>() / n,
        })
    }
}
