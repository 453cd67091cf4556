//! Move selection: legality scan, randomized heuristic choice and bounded lookahead.
//!
//! Each decision flips one weighted coin to pick between two cheap heuristics
//! (see [`Heuristic`]). With a non-zero lookahead the evaluator then simulates
//! every legal direction and re-runs itself on the resulting grid, letting a
//! strictly better predicted score override the heuristic's choice. There is
//! no chance node: tile spawns are not modelled, so this is a forward
//! simulation rather than expectimax.
//!
//! Quick start
//! ```
//! use autoplay_2048::engine::{ClassicRules, Grid};
//! use autoplay_2048::evaluator::Evaluator;
//! use autoplay_2048::policy::Policy;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let grid = Grid::from_rows(&[[2, 2, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 4]]);
//! let mut rng = StdRng::seed_from_u64(5);
//! let mut ev = Evaluator::new(&ClassicRules);
//! let decision = ev.select_move(&grid, &Policy::new(1, 0.5), &mut rng);
//! assert!(decision.direction.is_some());
//! ```

use log::trace;
use rand::Rng;

use crate::engine::{Direction, Grid, Rules};
use crate::policy::{Heuristic, Policy};
use crate::simulator::{simulate, MoveResult};

/// Set of directions in which at least one tile can slide or merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LegalMoves(u8);

impl LegalMoves {
    #[inline]
    pub fn contains(self, dir: Direction) -> bool { self.0 & (1 << dir.index()) != 0 }

    #[inline]
    pub fn is_empty(self) -> bool { self.0 == 0 }

    #[inline]
    fn insert(&mut self, dir: Direction) { self.0 |= 1 << dir.index(); }

    /// Legal directions in index order.
    pub fn iter(self) -> impl Iterator<Item = Direction> {
        Direction::ALL.into_iter().filter(move |&d| self.contains(d))
    }

    /// Lowest-index legal direction.
    #[inline]
    pub fn first(self) -> Option<Direction> { self.iter().next() }

    pub fn len(self) -> usize { self.0.count_ones() as usize }
}

/// Scan every occupied cell against the four direction vectors.
///
/// A direction is legal when some tile has an empty in-bounds neighbour
/// or an equal-valued neighbour that way.
pub fn legal_moves(grid: &Grid) -> LegalMoves {
    let mut moves = LegalMoves::default();
    for (x, y, value) in grid.tiles() {
        for dir in Direction::ALL {
            let (dx, dy) = dir.vector();
            let (nx, ny) = (x as isize + dx, y as isize + dy);
            let other = grid.cell_at(nx, ny);
            if (other.is_none() && grid.within_bounds(nx, ny)) || other == Some(value) {
                moves.insert(dir);
            }
        }
    }
    moves
}

/// Chosen direction and the score that justified it.
///
/// `direction` is `None` when no move is legal, which ends the tick loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub direction: Option<Direction>,
    pub score: u64,
}

impl Decision {
    pub const NO_MOVE: Decision = Decision { direction: None, score: 0 };
}

/// Work done for the last decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionStats {
    /// Calls into the move simulator, lookahead included.
    pub simulations: u64,
    /// Decisions evaluated, the root included.
    pub nodes: u64,
}

/// Move evaluator bound to a game's slide/merge rules.
pub struct Evaluator<'r, R: Rules + ?Sized> {
    rules: &'r R,
    stats: DecisionStats,
}

impl<'r, R: Rules + ?Sized> Evaluator<'r, R> {
    pub fn new(rules: &'r R) -> Self { Evaluator { rules, stats: DecisionStats::default() } }

    /// Pick a move for `grid` under `policy`, drawing heuristic choices from `rng`.
    ///
    /// The input grid is never mutated. Returns [`Decision::NO_MOVE`] without
    /// simulating anything when no direction is legal.
    pub fn select_move<G: Rng + ?Sized>(&mut self, grid: &Grid, policy: &Policy, rng: &mut G) -> Decision {
        self.stats = DecisionStats::default();
        let decision = self.decide(grid, policy, policy.lookahead, rng);
        trace!(
            "decision {:?} score={} sims={} nodes={}",
            decision.direction,
            decision.score,
            self.stats.simulations,
            self.stats.nodes
        );
        decision
    }

    /// Stats collected from the last call to [`Self::select_move`].
    #[inline]
    pub fn last_stats(&self) -> DecisionStats { self.stats }

    fn decide<G: Rng + ?Sized>(&mut self, grid: &Grid, policy: &Policy, depth: u8, rng: &mut G) -> Decision {
        self.stats.nodes += 1;
        let legal = legal_moves(grid);
        let Some(fallback) = legal.first() else {
            return Decision::NO_MOVE;
        };

        let sample: f64 = rng.gen();
        let mut best = match policy.choose_heuristic(sample) {
            Heuristic::MergeHighestPair => merge_highest_pair(grid),
            Heuristic::MaximizeSimulatedScore => self.maximize_simulated_score(grid, legal),
        };
        if best.direction.is_none() {
            best.direction = Some(fallback);
        }

        if depth > 0 {
            let mut next_score = 0;
            for dir in legal.iter() {
                let step = self.simulate(grid, dir);
                let ahead = self.decide(&step.grid, policy, depth - 1, rng);
                if ahead.score > next_score {
                    next_score = ahead.score;
                    best = Decision { direction: Some(dir), score: ahead.score };
                }
            }
        }
        best
    }

    fn maximize_simulated_score(&mut self, grid: &Grid, legal: LegalMoves) -> Decision {
        let mut best = Decision { direction: None, score: 0 };
        for dir in legal.iter() {
            let gained = self.simulate(grid, dir).score;
            if gained > best.score {
                best = Decision { direction: Some(dir), score: gained };
            }
        }
        best
    }

    #[inline]
    fn simulate(&mut self, grid: &Grid, dir: Direction) -> MoveResult {
        self.stats.simulations += 1;
        simulate(self.rules, grid, dir)
    }
}

/// Direction merging the highest adjacent equal pair, scored as twice the tile value.
///
/// Ties keep the first pair found scanning cells column by column.
fn merge_highest_pair(grid: &Grid) -> Decision {
    let mut best = Decision { direction: None, score: 0 };
    for (x, y, value) in grid.tiles() {
        for dir in Direction::ALL {
            let (dx, dy) = dir.vector();
            if grid.cell_at(x as isize + dx, y as isize + dy) == Some(value) {
                let candidate = value as u64 * 2;
                if candidate > best.score {
                    best = Decision { direction: Some(dir), score: candidate };
                }
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ClassicRules, Game, GameHost, MoveOutcome};
    use rand::rngs::mock::StepRng;
    use rand::{rngs::StdRng, SeedableRng};

    // `gen::<f64>()` yields 0.0 from an all-zero source and just below 1.0 from an all-ones source.
    fn low() -> StepRng { StepRng::new(0, 0) }
    fn high() -> StepRng { StepRng::new(u64::MAX, 0) }

    fn stuck_grid() -> Grid {
        Grid::from_rows(&[[2, 4, 2, 4], [4, 2, 4, 2], [2, 4, 2, 4], [4, 2, 4, 2]])
    }

    #[test]
    fn corner_tile_legality() {
        let mut g = Grid::new(4);
        g.set(0, 0, Some(2));
        let legal = legal_moves(&g);
        assert!(!legal.contains(Direction::Up));
        assert!(!legal.contains(Direction::Left));
        assert!(legal.contains(Direction::Down));
        assert!(legal.contains(Direction::Right));
        assert_eq!(legal.first(), Some(Direction::Right));
    }

    #[test]
    fn full_grid_without_pairs_has_no_move() {
        let g = stuck_grid();
        assert!(legal_moves(&g).is_empty());
        for lookahead in 0..=3 {
            let mut ev = Evaluator::new(&ClassicRules);
            let d = ev.select_move(&g, &Policy::new(lookahead, 0.5), &mut StdRng::seed_from_u64(1));
            assert_eq!(d, Decision::NO_MOVE);
            assert_eq!(ev.last_stats().simulations, 0);
        }
    }

    #[test]
    fn full_grid_with_pair_is_playable() {
        let g = Grid::from_rows(&[[2, 2, 4, 8], [4, 8, 16, 32], [8, 16, 32, 64], [16, 32, 64, 128]]);
        let legal = legal_moves(&g);
        assert!(legal.contains(Direction::Left) && legal.contains(Direction::Right));
        assert!(!legal.contains(Direction::Up) && !legal.contains(Direction::Down));
    }

    #[test]
    fn merge_highest_pair_prefers_bigger_tiles() {
        let g = Grid::from_rows(&[[2, 2, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 16, 16]]);
        let mut ev = Evaluator::new(&ClassicRules);
        let d = ev.select_move(&g, &Policy::new(0, 1.0), &mut low());
        assert_eq!(d.score, 32);
        // first match while scanning column 2 is its right-hand neighbour
        assert_eq!(d.direction, Some(Direction::Right));
        assert_eq!(ev.last_stats().simulations, 0);
    }

    #[test]
    fn maximize_simulated_score_prefers_bigger_delta() {
        let g = Grid::from_rows(&[[2, 0, 0, 0], [2, 0, 0, 0], [8, 8, 0, 0], [0, 0, 0, 0]]);
        let mut ev = Evaluator::new(&ClassicRules);
        let d = ev.select_move(&g, &Policy::new(0, 0.0), &mut high());
        // up/down merge the 2s (4 points), left/right merge the 8s (16 points)
        assert_eq!(d, Decision { direction: Some(Direction::Right), score: 16 });
        assert_eq!(ev.last_stats().simulations, 4);
    }

    #[test]
    fn zero_scores_fall_back_to_first_legal() {
        let mut g = Grid::new(4);
        g.set(3, 3, Some(2));
        let mut ev = Evaluator::new(&ClassicRules);
        for (policy, mut rng) in [(Policy::new(0, 1.0), low()), (Policy::new(0, 0.0), high())] {
            let d = ev.select_move(&g, &policy, &mut rng);
            assert_eq!(d, Decision { direction: Some(Direction::Up), score: 0 });
        }
    }

    #[test]
    fn lookahead_overrides_on_strictly_better_future() {
        // No pair now; moving up lines the 4s up for a merge next turn.
        let g = Grid::from_rows(&[[4, 0, 0, 0], [0, 4, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]);
        let mut ev = Evaluator::new(&ClassicRules);
        let flat = ev.select_move(&g, &Policy::new(0, 1.0), &mut low());
        assert_eq!(flat.score, 0);

        let ahead = ev.select_move(&g, &Policy::new(1, 1.0), &mut low());
        assert_eq!(ahead.score, 8);
        assert_eq!(ahead.direction, Some(Direction::Up));
        // one simulation per legal direction at the root
        assert_eq!(ev.last_stats().simulations, legal_moves(&g).len() as u64);
    }

    #[test]
    fn returned_direction_is_always_legal() {
        let mut rng = StdRng::seed_from_u64(99);
        let cfg = crate::config::AutoplayConfig::default();
        for seed in 0..20 {
            let mut game = Game::new(&cfg, seed);
            let policy = Policy::randomize(&mut rng);
            for _ in 0..40 {
                let grid = game.grid().clone();
                let mut ev = Evaluator::new(game.rules());
                let d = ev.select_move(&grid, &policy, &mut rng);
                let Some(dir) = d.direction else { break };
                assert!(legal_moves(&grid).contains(dir));
                assert_eq!(game.grid(), &grid);
                game.apply_move(dir);
            }
        }
    }

    #[test]
    fn pinned_randomness_is_deterministic() {
        let g = Grid::from_rows(&[[2, 2, 4, 0], [0, 4, 0, 8], [2, 0, 8, 0], [0, 0, 0, 2]]);
        let policy = Policy::new(0, 0.6);
        let mut ev = Evaluator::new(&ClassicRules);
        let a = ev.select_move(&g, &policy, &mut StdRng::seed_from_u64(3));
        let b = ev.select_move(&g, &policy, &mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    struct ScriptedRules;

    impl Rules for ScriptedRules {
        fn apply(&self, _grid: &mut Grid, dir: Direction) -> MoveOutcome {
            let score = match dir {
                Direction::Up | Direction::Down => 5,
                Direction::Right | Direction::Left => 4,
            };
            MoveOutcome { score, moved: true }
        }
    }

    #[test]
    fn simulated_score_ties_keep_lower_index() {
        // Up and Down both score 5; Up wins the tie.
        let mut g = Grid::new(3);
        g.set(1, 1, Some(2));
        let mut ev = Evaluator::new(&ScriptedRules);
        let d = ev.select_move(&g, &Policy::new(0, 0.0), &mut high());
        assert_eq!(d, Decision { direction: Some(Direction::Up), score: 5 });
    }
    /// Counts plies in the corner cell and scores each step through `payout`.
    struct PlyRules(fn(u32, Direction) -> u64);

    impl Rules for PlyRules {
        fn apply(&self, grid: &mut Grid, dir: Direction) -> MoveOutcome {
            let ply = grid.cell(0, 0).unwrap_or(0) + 1;
            grid.set(0, 0, Some(ply));
            MoveOutcome { score: (self.0)(ply, dir), moved: true }
        }
    }

    fn open_grid() -> Grid {
        let mut g = Grid::new(3);
        g.set(1, 1, Some(2));
        g
    }

    #[test]
    fn lookahead_ties_keep_lower_index() {
        // every child predicts the same score, so Up (index 0) keeps it
        let rules = PlyRules(|ply, dir| if ply == 1 && dir == Direction::Left { 9 } else { 3 });
        let mut ev = Evaluator::new(&rules);
        let d = ev.select_move(&open_grid(), &Policy::new(1, 0.0), &mut high());
        assert_eq!(d, Decision { direction: Some(Direction::Up), score: 3 });
    }

    #[test]
    fn zero_lookahead_keeps_heuristic_choice() {
        let rules = PlyRules(|ply, dir| if ply == 1 && dir == Direction::Down { 7 } else { 0 });
        let mut ev = Evaluator::new(&rules);
        let d = ev.select_move(&open_grid(), &Policy::new(1, 0.0), &mut high());
        assert_eq!(d, Decision { direction: Some(Direction::Down), score: 7 });
    }

    #[test]
    fn grandchild_score_reaches_root() {
        let rules = PlyRules(|ply, dir| if ply == 3 && dir == Direction::Down { 100 } else { 1 });
        let mut ev = Evaluator::new(&rules);

        let shallow = ev.select_move(&open_grid(), &Policy::new(1, 0.0), &mut high());
        assert_eq!(shallow.score, 1);

        let deep = ev.select_move(&open_grid(), &Policy::new(2, 0.0), &mut high());
        assert_eq!(deep, Decision { direction: Some(Direction::Up), score: 100 });
        // 1 root, 4 children and 16 grandchildren; each scores 4 directions,
        // and every non-leaf also steps into 4 children
        let stats = ev.last_stats();
        assert_eq!(stats.nodes, 21);
        assert_eq!(stats.simulations, 21 * 4 + 5 * 4);
    }
}
