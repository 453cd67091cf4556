//! Cooperative tick loop driving a live game.
//!
//! The driver never sleeps or spawns anything itself. It hands delayed
//! [`Task`]s to a [`Scheduler`] and keeps the handle of the one task it is
//! waiting for, cancelling it whenever a game starts, ends or the driver is
//! dropped. The host fires due tasks back into [`TickDriver::fire`].
//!
//! ```
//! use autoplay_2048::config::AutoplayConfig;
//! use autoplay_2048::driver::{Event, TickDriver, TickQueue};
//! use autoplay_2048::engine::Game;
//! use autoplay_2048::ledger::{Ledger, MemoryStorage};
//! use autoplay_2048::policy::Policy;
//!
//! let cfg = AutoplayConfig { auto_restart: false, ..AutoplayConfig::default() };
//! let ledger = Ledger::new(MemoryStorage::new(), &cfg.storage_key, cfg.rotate_after);
//! let mut driver = TickDriver::new(Game::new(&cfg, 1), TickQueue::new(), ledger, &cfg, 1)
//!     .with_policy(Policy::new(0, 0.5));
//! driver.on_start();
//! let mut ended = false;
//! while let Some(event) = driver.run_next().unwrap() {
//!     ended |= matches!(event, Event::GameEnded(_));
//! }
//! assert!(ended);
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::AutoplayConfig;
use crate::engine::{Direction, GameHost};
use crate::error::DriverError;
use crate::evaluator::{DecisionStats, Evaluator};
use crate::ledger::{Ledger, Recorded, Storage};
use crate::policy::Policy;

/// Work a driver can ask to be woken up for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Tick,
    Restart,
}

/// Cancellation handle for a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TickHandle(u64);

/// Timer primitive the driver schedules its work on.
pub trait Scheduler {
    fn schedule(&mut self, delay: Duration, task: Task) -> TickHandle;
    /// Returns whether the task was still pending.
    fn cancel(&mut self, handle: TickHandle) -> bool;
}

/// A due task popped from a [`TickQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Due {
    pub handle: TickHandle,
    pub task: Task,
    /// Virtual time elapsed since the previously popped task.
    pub wait: Duration,
}

/// Single-threaded scheduler over a virtual clock.
///
/// Tasks come out in deadline order, ties in scheduling order. Popping a task
/// advances the clock to its deadline; the host decides whether to actually
/// sleep for `Due::wait`.
#[derive(Debug, Default)]
pub struct TickQueue {
    now: Duration,
    next_id: u64,
    pending: BTreeMap<(Duration, u64), Task>,
}

impl TickQueue {
    pub fn new() -> Self { Self::default() }

    /// Current virtual time.
    pub fn now(&self) -> Duration { self.now }

    pub fn len(&self) -> usize { self.pending.len() }

    pub fn is_empty(&self) -> bool { self.pending.is_empty() }

    /// Time until the next task is due.
    pub fn next_wait(&self) -> Option<Duration> {
        self.pending.keys().next().map(|&(at, _)| at.saturating_sub(self.now))
    }

    pub fn pop_due(&mut self) -> Option<Due> {
        let ((at, id), task) = self.pending.pop_first()?;
        let wait = at.saturating_sub(self.now);
        self.now = self.now.max(at);
        Some(Due { handle: TickHandle(id), task, wait })
    }
}

impl Scheduler for TickQueue {
    fn schedule(&mut self, delay: Duration, task: Task) -> TickHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert((self.now + delay, id), task);
        TickHandle(id)
    }

    fn cancel(&mut self, handle: TickHandle) -> bool {
        let key = self.pending.keys().find(|&&(_, id)| id == handle.0).copied();
        key.and_then(|k| self.pending.remove(&k)).is_some()
    }
}

/// Lifecycle of a [`TickDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Running,
    Terminated,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A move was applied and the next tick is scheduled.
    Moved { direction: Direction, score: u64 },
    /// A move was applied and the game reports termination.
    GameOver { direction: Direction, score: u64 },
    /// No legal move, or the host refused the chosen one; the loop stops without rescheduling.
    NoMove,
}

/// Something observable that happened while firing a task.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Tick(TickOutcome),
    GameEnded(Recorded),
    Restarted { policy: Policy },
}

/// Per-game bookkeeping of a driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub games_completed: u64,
    pub ticks: u64,
    pub simulations: u64,
    pub last_decision: DecisionStats,
}

/// Tick loop tying a live game, the move evaluator and the outcome ledger together.
pub struct TickDriver<H: GameHost, S: Scheduler, St: Storage> {
    host: H,
    scheduler: S,
    ledger: Ledger<St>,
    policy: Policy,
    state: DriverState,
    pending: Option<TickHandle>,
    tick_interval: Duration,
    restart_delay: Duration,
    auto_restart: bool,
    stats: DriverStats,
    rng: StdRng,
}

impl<H: GameHost, S: Scheduler, St: Storage> TickDriver<H, S, St> {
    /// A driver in `Idle` with a random starting policy drawn from `seed`.
    pub fn new(host: H, scheduler: S, ledger: Ledger<St>, config: &AutoplayConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let policy = Policy::randomize(&mut rng);
        TickDriver {
            host,
            scheduler,
            ledger,
            policy,
            state: DriverState::Idle,
            pending: None,
            tick_interval: config.tick_interval(),
            restart_delay: config.restart_delay(),
            auto_restart: config.auto_restart,
            stats: DriverStats::default(),
            rng,
        }
    }

    /// Start with `policy` instead of a random one.
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn host(&self) -> &H { &self.host }

    pub fn scheduler(&self) -> &S { &self.scheduler }

    pub fn ledger(&self) -> &Ledger<St> { &self.ledger }

    /// Policy the current (or next) game is played with.
    pub fn policy(&self) -> Policy { self.policy }

    pub fn state(&self) -> DriverState { self.state }

    pub fn stats(&self) -> DriverStats { self.stats }

    /// Whether a task is scheduled on behalf of this driver.
    pub fn has_pending(&self) -> bool { self.pending.is_some() }

    /// Begin driving the current game. Any loop still pending is cancelled first.
    pub fn on_start(&mut self) {
        self.clear_pending();
        self.state = DriverState::Running;
        debug!("game started with policy [{}]", self.policy);
        self.schedule(Duration::ZERO, Task::Tick);
    }

    /// Decide and apply one move.
    pub fn tick(&mut self) -> Result<TickOutcome, DriverError> {
        if self.state != DriverState::Running {
            return Err(DriverError::NotRunning);
        }
        // a direct call supersedes whatever tick was queued
        self.clear_pending();
        self.stats.ticks += 1;

        let policy = self.policy;
        let grid = self.host.grid().clone();
        let mut evaluator = Evaluator::new(self.host.rules());
        let decision = evaluator.select_move(&grid, &policy, &mut self.rng);
        self.stats.last_decision = evaluator.last_stats();
        self.stats.simulations += self.stats.last_decision.simulations;

        let Some(direction) = decision.direction else {
            debug!("no legal move, tick loop stopped");
            return Ok(TickOutcome::NoMove);
        };
        if !self.host.apply_move(direction) {
            debug!("host rejected {direction}, tick loop stopped");
            return Ok(TickOutcome::NoMove);
        }
        let score = self.host.score();
        if self.host.is_game_over() {
            return Ok(TickOutcome::GameOver { direction, score });
        }
        self.schedule(self.tick_interval, Task::Tick);
        Ok(TickOutcome::Moved { direction, score })
    }

    /// Record the finished game and adopt the ledger's next policy.
    ///
    /// Schedules a restart after the configured delay when auto restart is on.
    pub fn on_end(&mut self) -> Result<Recorded, DriverError> {
        self.clear_pending();
        self.state = DriverState::Terminated;
        let recorded = self.ledger.record_outcome(&self.policy, self.host.score(), &mut self.rng)?;
        self.policy = recorded.next_policy;
        self.stats.games_completed += 1;
        if self.auto_restart {
            self.schedule(self.restart_delay, Task::Restart);
        }
        Ok(recorded)
    }

    /// Restart the live game and start driving it again.
    pub fn restart(&mut self) {
        self.host.restart();
        self.on_start();
    }

    /// Run a task handed back by the scheduler.
    ///
    /// A tick that finishes the game is followed by [`Self::on_end`], whose
    /// event is returned in place of the tick's.
    pub fn fire(&mut self, task: Task) -> Result<Event, DriverError> {
        match task {
            Task::Tick => match self.tick()? {
                TickOutcome::GameOver { .. } => Ok(Event::GameEnded(self.on_end()?)),
                TickOutcome::NoMove if self.host.is_game_over() => Ok(Event::GameEnded(self.on_end()?)),
                outcome => Ok(Event::Tick(outcome)),
            },
            Task::Restart => {
                self.restart();
                Ok(Event::Restarted { policy: self.policy })
            }
        }
    }

    fn schedule(&mut self, delay: Duration, task: Task) {
        self.clear_pending();
        self.pending = Some(self.scheduler.schedule(delay, task));
    }

    fn clear_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            self.scheduler.cancel(handle);
        }
    }
}

impl<H: GameHost, St: Storage> TickDriver<H, TickQueue, St> {
    /// Time until the next scheduled task, if any.
    pub fn next_wait(&self) -> Option<Duration> { self.scheduler.next_wait() }

    /// Pop the next due task and fire it. `None` once nothing is scheduled.
    pub fn run_next(&mut self) -> Result<Option<Event>, DriverError> {
        let Some(due) = self.scheduler.pop_due() else {
            return Ok(None);
        };
        if self.pending == Some(due.handle) {
            self.pending = None;
        }
        self.fire(due.task).map(Some)
    }
}

impl<H: GameHost, S: Scheduler, St: Storage> Drop for TickDriver<H, S, St> {
    fn drop(&mut self) { self.clear_pending(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ClassicRules, Game, Grid};
    use crate::ledger::MemoryStorage;

    fn config() -> AutoplayConfig { AutoplayConfig { auto_restart: false, ..AutoplayConfig::default() } }

    fn driver(cfg: &AutoplayConfig, seed: u64) -> TickDriver<Game, TickQueue, MemoryStorage> {
        let ledger = Ledger::new(MemoryStorage::new(), &cfg.storage_key, cfg.rotate_after);
        TickDriver::new(Game::new(cfg, seed), TickQueue::new(), ledger, cfg, seed)
    }

    #[test]
    fn queue_orders_by_deadline_then_insertion() {
        let mut q = TickQueue::new();
        let a = q.schedule(Duration::from_millis(400), Task::Tick);
        let b = q.schedule(Duration::from_millis(100), Task::Restart);
        let c = q.schedule(Duration::from_millis(100), Task::Tick);
        assert_eq!(q.next_wait(), Some(Duration::from_millis(100)));
        assert_eq!(q.pop_due().map(|d| d.handle), Some(b));
        let d = q.pop_due().unwrap();
        assert_eq!((d.handle, d.wait), (c, Duration::ZERO));
        let d = q.pop_due().unwrap();
        assert_eq!((d.handle, d.wait), (a, Duration::from_millis(300)));
        assert_eq!(q.now(), Duration::from_millis(400));
        assert!(q.pop_due().is_none());
    }

    #[test]
    fn queue_cancel() {
        let mut q = TickQueue::new();
        let a = q.schedule(Duration::from_millis(5), Task::Tick);
        assert!(q.cancel(a));
        assert!(!q.cancel(a));
        assert!(q.is_empty());
    }

    #[test]
    fn tick_requires_running() {
        let cfg = config();
        let mut d = driver(&cfg, 1);
        assert_eq!(d.state(), DriverState::Idle);
        assert!(matches!(d.tick(), Err(DriverError::NotRunning)));
    }

    #[test]
    fn start_schedules_exactly_one_tick() {
        let cfg = config();
        let mut d = driver(&cfg, 2);
        d.on_start();
        assert_eq!(d.state(), DriverState::Running);
        assert_eq!(d.scheduler().len(), 1);
        // restarting cancels the previous loop instead of stacking a second one
        d.on_start();
        assert_eq!(d.scheduler().len(), 1);
        assert_eq!(d.next_wait(), Some(Duration::ZERO));
    }

    #[test]
    fn direct_tick_replaces_queued_tick() {
        let cfg = config();
        let mut d = driver(&cfg, 2);
        d.on_start();
        assert!(matches!(d.tick(), Ok(TickOutcome::Moved { .. })));
        assert_eq!(d.scheduler().len(), 1);
        assert_eq!(d.next_wait(), Some(cfg.tick_interval()));
        d.run_next().unwrap();
        assert_eq!(d.scheduler().len(), 1);
        assert_eq!(d.stats().ticks, 2);
    }

    #[test]
    fn tick_reschedules_after_interval() {
        let cfg = config();
        let mut d = driver(&cfg, 3);
        d.on_start();
        let ev = d.run_next().unwrap();
        assert!(matches!(ev, Some(Event::Tick(TickOutcome::Moved { .. }))));
        assert_eq!(d.scheduler().len(), 1);
        assert_eq!(d.next_wait(), Some(cfg.tick_interval()));
        assert_eq!(d.stats().ticks, 1);
    }

    #[test]
    fn plays_to_the_end_and_records() {
        let cfg = config();
        let mut d = driver(&cfg, 4).with_policy(Policy::new(1, 0.5));
        d.on_start();
        let mut last = None;
        while let Some(ev) = d.run_next().unwrap() {
            last = Some(ev);
        }
        let Some(Event::GameEnded(rec)) = last else { panic!("game did not end: {last:?}") };
        assert_eq!(rec.record.count, 1);
        assert_eq!(rec.record.score, d.host().score() as f64);
        assert!(d.host().is_game_over());
        assert_eq!(d.state(), DriverState::Terminated);
        assert!(!d.has_pending());
        assert_eq!(d.ledger().load().len(), 1);
    }

    #[test]
    fn auto_restart_starts_next_game() {
        let cfg = AutoplayConfig { auto_restart: true, ..AutoplayConfig::default() };
        let mut d = driver(&cfg, 5);
        d.on_start();
        let mut restarted = false;
        while let Some(ev) = d.run_next().unwrap() {
            if let Event::Restarted { policy } = ev {
                assert_eq!(policy, d.policy());
                restarted = true;
                break;
            }
        }
        assert!(restarted);
        assert_eq!(d.state(), DriverState::Running);
        assert_eq!(d.stats().games_completed, 1);
        assert_eq!(d.host().score(), 0);
    }

    #[test]
    fn stuck_grid_stops_silently() {
        let cfg = config();
        let grid = Grid::from_rows(&[[2, 4], [4, 2]]);
        let ledger = Ledger::new(MemoryStorage::new(), "k", 10);
        // the host is told it is not over, so the stop must come from the evaluator
        struct Stubborn(Game);
        impl GameHost for Stubborn {
            type Rules = ClassicRules;
            fn rules(&self) -> &ClassicRules { self.0.rules() }
            fn grid(&self) -> &Grid { self.0.grid() }
            fn apply_move(&mut self, dir: Direction) -> bool { self.0.apply_move(dir) }
            fn is_game_over(&self) -> bool { false }
            fn score(&self) -> u64 { self.0.score() }
            fn restart(&mut self) { self.0.restart() }
        }
        let host = Stubborn(Game::from_grid(ClassicRules, grid, 0, 1));
        let mut d = TickDriver::new(host, TickQueue::new(), ledger, &cfg, 1);
        d.on_start();
        assert_eq!(d.run_next().unwrap(), Some(Event::Tick(TickOutcome::NoMove)));
        assert_eq!(d.run_next().unwrap(), None);
        assert_eq!(d.state(), DriverState::Running);
    }

    #[test]
    fn refused_move_stops_loop() {
        struct Frozen(Game);
        impl GameHost for Frozen {
            type Rules = ClassicRules;
            fn rules(&self) -> &ClassicRules { self.0.rules() }
            fn grid(&self) -> &Grid { self.0.grid() }
            fn apply_move(&mut self, _dir: Direction) -> bool { false }
            fn is_game_over(&self) -> bool { false }
            fn score(&self) -> u64 { self.0.score() }
            fn restart(&mut self) { self.0.restart() }
        }
        let cfg = config();
        let ledger = Ledger::new(MemoryStorage::new(), "k", 10);
        let mut d = TickDriver::new(Frozen(Game::new(&cfg, 7)), TickQueue::new(), ledger, &cfg, 7);
        d.on_start();
        assert_eq!(d.run_next().unwrap(), Some(Event::Tick(TickOutcome::NoMove)));
        assert!(!d.has_pending());
        assert_eq!(d.run_next().unwrap(), None);
    }

    #[test]
    fn drop_cancels_pending() {
        struct Shared(std::rc::Rc<std::cell::RefCell<TickQueue>>);
        impl Scheduler for Shared {
            fn schedule(&mut self, delay: Duration, task: Task) -> TickHandle { self.0.borrow_mut().schedule(delay, task) }
            fn cancel(&mut self, handle: TickHandle) -> bool { self.0.borrow_mut().cancel(handle) }
        }
        let cfg = config();
        let queue = std::rc::Rc::new(std::cell::RefCell::new(TickQueue::new()));
        {
            let ledger = Ledger::new(MemoryStorage::new(), "k", 10);
            let mut d = TickDriver::new(Game::new(&cfg, 6), Shared(queue.clone()), ledger, &cfg, 6);
            d.on_start();
            assert_eq!(queue.borrow().len(), 1);
        }
        assert!(queue.borrow().is_empty());
    }
}
