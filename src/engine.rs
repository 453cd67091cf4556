use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::AutoplayConfig;

/// A direction to move/merge tiles.
///
/// The discriminant is the direction index, which is also the scan order
/// (`Up = 0`, `Right = 1`, `Down = 2`, `Left = 3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Direction {
    /// All directions in scan order.
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Right, Direction::Down, Direction::Left];

    #[inline]
    pub fn index(self) -> usize { self as usize }

    #[inline]
    pub fn from_index(idx: usize) -> Option<Self> { Self::ALL.get(idx).copied() }

    /// Unit offset `(dx, dy)` for this direction; `y` grows downwards.
    #[inline]
    pub fn vector(self) -> (isize, isize) {
        match self {
            Direction::Up => (0, -1),
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Up => "up",
            Direction::Right => "right",
            Direction::Down => "down",
            Direction::Left => "left",
        };
        f.write_str(name)
    }
}

/// Square grid of optional tile values (e.g. 2, 4, 8, ...).
///
/// Cells are addressed by `(x, y)` with `x` the column and `y` the row,
/// both starting at the top-left corner.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Grid {
    size: usize,
    cells: Vec<Option<u32>>,
}

impl Grid {
    /// An empty `size` x `size` grid.
    pub fn new(size: usize) -> Self {
        Grid { size, cells: vec![None; size * size] }
    }

    /// Build a grid from rows of tile values, `0` meaning empty.
    ///
    /// ```
    /// use autoplay_2048::engine::Grid;
    /// let g = Grid::from_rows(&[[2, 0], [0, 4]]);
    /// assert_eq!(g.cell(0, 0), Some(2));
    /// assert_eq!(g.cell(1, 1), Some(4));
    /// assert_eq!(g.cell(1, 0), None);
    /// ```
    pub fn from_rows<Row: AsRef<[u32]>>(rows: &[Row]) -> Self {
        let size = rows.len();
        let mut grid = Grid::new(size);
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            assert_eq!(row.len(), size, "grid rows must be square");
            for (x, &val) in row.iter().enumerate() {
                grid.set(x, y, (val != 0).then_some(val));
            }
        }
        grid
    }

    #[inline]
    pub fn size(&self) -> usize { self.size }

    /// Tile at `(x, y)`. Panics if out of bounds.
    #[inline]
    pub fn cell(&self, x: usize, y: usize) -> Option<u32> { self.cells[y * self.size + x] }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, tile: Option<u32>) { self.cells[y * self.size + x] = tile; }

    /// True when `(x, y)` lies on the grid.
    #[inline]
    pub fn within_bounds(&self, x: isize, y: isize) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.size && (y as usize) < self.size
    }

    /// Tile at a possibly out-of-bounds position; `None` when empty or outside.
    #[inline]
    pub fn cell_at(&self, x: isize, y: isize) -> Option<u32> {
        if self.within_bounds(x, y) { self.cell(x as usize, y as usize) } else { None }
    }

    /// Occupied cells as `(x, y, value)` in column-major scan order.
    pub fn tiles(&self) -> impl Iterator<Item = (usize, usize, u32)> + '_ {
        (0..self.size).flat_map(move |x| (0..self.size).filter_map(move |y| self.cell(x, y).map(|v| (x, y, v))))
    }

    pub fn empty_cells(&self) -> Vec<(usize, usize)> {
        (0..self.size)
            .flat_map(|x| (0..self.size).map(move |y| (x, y)))
            .filter(|&(x, y)| self.cell(x, y).is_none())
            .collect()
    }

    pub fn count_empty(&self) -> usize { self.cells.iter().filter(|c| c.is_none()).count() }

    pub fn highest_tile(&self) -> u32 { self.cells.iter().flatten().copied().max().unwrap_or(0) }

    /// Row-major copy of the tile values, `0` meaning empty.
    pub fn to_rows(&self) -> Vec<Vec<u32>> {
        (0..self.size)
            .map(|y| (0..self.size).map(|x| self.cell(x, y).unwrap_or(0)).collect())
            .collect()
    }

    /// Positions of line `k` for a slide toward `dir`, leading edge first.
    fn line(&self, dir: Direction, k: usize) -> Vec<(usize, usize)> {
        let n = self.size;
        (0..n)
            .map(|i| match dir {
                Direction::Left => (i, k),
                Direction::Right => (n - 1 - i, k),
                Direction::Up => (k, i),
                Direction::Down => (k, n - 1 - i),
            })
            .collect()
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Grid({:?})", self.to_rows())
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat((self.size * 8).saturating_sub(1));
        for y in 0..self.size {
            if y > 0 {
                writeln!(f, "{}", rule)?;
            }
            let row: Vec<String> = (0..self.size).map(|x| format_val(self.cell(x, y))).collect();
            writeln!(f, "{}", row.join("|"))?;
        }
        Ok(())
    }
}

fn format_val(val: Option<u32>) -> String {
    match val {
        None => " ".repeat(7),
        Some(v) => format!("{:^7}", v),
    }
}

/// Result of applying one move with a [`Rules`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveOutcome {
    /// Points gained from merges.
    pub score: u64,
    /// Whether any tile changed position or value.
    pub moved: bool,
}

/// The authoritative slide/merge/score rule of a game.
///
/// The autoplay engine never slides tiles itself; it calls into this
/// primitive both for speculative simulation and for the live game.
pub trait Rules {
    /// Slide and merge all tiles of `grid` toward `dir` in place.
    fn apply(&self, grid: &mut Grid, dir: Direction) -> MoveOutcome;
}

/// Standard 2048 rules: tiles slide as far as possible, equal neighbours
/// merge once per move and the merged value is added to the score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassicRules;

impl Rules for ClassicRules {
    fn apply(&self, grid: &mut Grid, dir: Direction) -> MoveOutcome {
        let mut outcome = MoveOutcome::default();
        for k in 0..grid.size() {
            let positions = grid.line(dir, k);
            let mut line: Vec<u32> = positions.iter().map(|&(x, y)| grid.cell(x, y).unwrap_or(0)).collect();
            let before = line.clone();
            outcome.score += slide_line(&mut line);
            if line != before {
                outcome.moved = true;
                for (&(x, y), &val) in positions.iter().zip(&line) {
                    grid.set(x, y, (val != 0).then_some(val));
                }
            }
        }
        outcome
    }
}

/// Slide a line toward index 0, merging each tile at most once.
fn slide_line(line: &mut [u32]) -> u64 {
    let mut gained = 0;
    for i in 0..line.len() {
        gained += settle_front(&mut line[i..]);
    }
    gained
}

/// Pull the next tile into `slice[0]`, merging it with the following equal tile.
fn settle_front(slice: &mut [u32]) -> u64 {
    let mut acc = 0;
    let mut gained = 0;
    for idx in 0..slice.len() {
        let val = slice[idx];
        if acc != 0 && acc == val {
            slice[idx] = 0;
            acc *= 2;
            gained = acc as u64;
            break;
        } else if acc != 0 && val != 0 {
            break;
        } else if acc == 0 && val != 0 {
            slice[idx] = 0;
            acc = val;
        }
    }
    slice[0] = acc;
    gained
}

/// True if any tile could slide or merge in some direction.
pub fn moves_available(grid: &Grid) -> bool {
    grid.count_empty() > 0
        || grid.tiles().any(|(x, y, v)| {
            Direction::ALL.iter().any(|d| {
                let (dx, dy) = d.vector();
                grid.cell_at(x as isize + dx, y as isize + dy) == Some(v)
            })
        })
}

/// Interface the autoplay engine consumes from the live game.
pub trait GameHost {
    type Rules: Rules;

    /// Slide/merge primitive used for speculative moves.
    fn rules(&self) -> &Self::Rules;
    /// Current live grid.
    fn grid(&self) -> &Grid;
    /// Apply `dir` to the live game. Returns whether the grid changed.
    fn apply_move(&mut self, dir: Direction) -> bool;
    /// Whether the live game has terminated (lost, or won without continuing).
    fn is_game_over(&self) -> bool;
    fn score(&self) -> u64;
    fn restart(&mut self);
}

/// A live game: grid, running score and random tile spawns.
pub struct Game<R: Rules = ClassicRules> {
    rules: R,
    grid: Grid,
    score: u64,
    over: bool,
    won: bool,
    keep_playing: bool,
    win_tile: u32,
    start_tiles: usize,
    moves: u64,
    rng: StdRng,
}

impl Game<ClassicRules> {
    /// A fresh game with classic rules, seeded for reproducibility.
    pub fn new(config: &AutoplayConfig, seed: u64) -> Self {
        Self::with_rules(ClassicRules, config, seed)
    }
}

impl<R: Rules> Game<R> {
    pub fn with_rules(rules: R, config: &AutoplayConfig, seed: u64) -> Self {
        let mut game = Game {
            rules,
            grid: Grid::new(config.grid_size),
            score: 0,
            over: false,
            won: false,
            keep_playing: config.keep_playing,
            win_tile: config.win_tile,
            start_tiles: config.start_tiles,
            moves: 0,
            rng: StdRng::seed_from_u64(seed),
        };
        game.setup();
        game
    }

    /// Take over an existing grid, e.g. a position loaded from elsewhere.
    pub fn from_grid(rules: R, grid: Grid, score: u64, seed: u64) -> Self {
        let over = !moves_available(&grid);
        Game {
            rules,
            grid,
            score,
            over,
            won: false,
            keep_playing: true,
            win_tile: 2048,
            start_tiles: 2,
            moves: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn setup(&mut self) {
        self.grid = Grid::new(self.grid.size());
        self.score = 0;
        self.over = false;
        self.won = false;
        self.moves = 0;
        for _ in 0..self.start_tiles {
            self.add_random_tile();
        }
    }

    /// Insert a 2 (90%) or 4 (10%) tile into a random empty cell.
    pub fn add_random_tile(&mut self) {
        let empty = self.grid.empty_cells();
        if empty.is_empty() {
            return;
        }
        let (x, y) = empty[self.rng.gen_range(0..empty.len())];
        let value = if self.rng.gen_range(0..10) < 9 { 2 } else { 4 };
        self.grid.set(x, y, Some(value));
    }

    pub fn moves(&self) -> u64 { self.moves }
}

impl<R: Rules> GameHost for Game<R> {
    type Rules = R;

    fn rules(&self) -> &R { &self.rules }

    fn grid(&self) -> &Grid { &self.grid }

    fn apply_move(&mut self, dir: Direction) -> bool {
        if self.is_game_over() {
            return false;
        }
        let outcome = self.rules.apply(&mut self.grid, dir);
        if !outcome.moved {
            return false;
        }
        self.score += outcome.score;
        self.moves += 1;
        if self.grid.highest_tile() >= self.win_tile {
            self.won = true;
        }
        self.add_random_tile();
        if !moves_available(&self.grid) {
            self.over = true;
        }
        true
    }

    fn is_game_over(&self) -> bool { self.over || (self.won && !self.keep_playing) }

    fn score(&self) -> u64 { self.score }

    fn restart(&mut self) { self.setup(); }
}
