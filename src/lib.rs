//! autoplay-2048: a self-tuning autoplayer for 2048-style games
//!
//! This crate provides:
//! - A square `Grid` snapshot, the `Rules` slide/merge primitive and a playable `Game` (`engine` module)
//! - Speculative moves on grid copies (`simulator` module)
//! - A randomized two-heuristic move evaluator with bounded lookahead (`evaluator` module)
//! - Policies mixing the heuristics (`policy` module) and a persisted outcome ledger that
//!   retires them after enough trials (`ledger` module)
//! - A cooperative, cancellable tick loop driving live games (`driver` module)
//! - Parallel headless evaluation of a fixed policy (`session` module)
//!
//! Quick start:
//! ```
//! use autoplay_2048::config::AutoplayConfig;
//! use autoplay_2048::engine::{Game, GameHost};
//! use autoplay_2048::evaluator::Evaluator;
//! use autoplay_2048::policy::Policy;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let cfg = AutoplayConfig::default();
//! let mut game = Game::new(&cfg, 42);
//! let mut rng = StdRng::seed_from_u64(42);
//! let policy = Policy::randomize(&mut rng);
//!
//! let mut moves = 0;
//! while !game.is_game_over() && moves < 8 {
//!     let decision = Evaluator::new(game.rules()).select_move(game.grid(), &policy, &mut rng);
//!     match decision.direction {
//!         Some(dir) => { game.apply_move(dir); moves += 1; }
//!         None => break,
//!     }
//! }
//! assert!(moves > 0);
//! ```
//!
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod ledger;
pub mod policy;
pub mod session;
pub mod simulator;
