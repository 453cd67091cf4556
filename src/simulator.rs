//! Speculative moves on a copy of a grid.

use crate::engine::{Direction, Grid, Rules};

/// Grid and score gained after simulating one direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveResult {
    pub grid: Grid,
    pub score: u64,
    pub moved: bool,
}

/// Apply `dir` to a fresh copy of `snapshot` using `rules`.
///
/// The snapshot itself is never touched.
///
/// ```
/// use autoplay_2048::engine::{ClassicRules, Direction, Grid};
/// use autoplay_2048::simulator::simulate;
/// let g = Grid::from_rows(&[[2, 2], [0, 0]]);
/// let r = simulate(&ClassicRules, &g, Direction::Left);
/// assert_eq!(r.score, 4);
/// assert_eq!(g.cell(1, 0), Some(2));
/// ```
#[inline]
pub fn simulate<R: Rules + ?Sized>(rules: &R, snapshot: &Grid, dir: Direction) -> MoveResult {
    let mut grid = snapshot.clone();
    let outcome = rules.apply(&mut grid, dir);
    MoveResult { grid, score: outcome.score, moved: outcome.moved }
}
