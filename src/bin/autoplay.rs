use autoplay_2048::config::AutoplayConfig;
use autoplay_2048::driver::{Event, TickDriver, TickOutcome, TickQueue};
use autoplay_2048::engine::{Game, GameHost};
use autoplay_2048::ledger::{FileStorage, Ledger, Storage};
use autoplay_2048::policy::{Policy, MAX_LOOKAHEAD};
use autoplay_2048::session::{self, BatchSummary};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => AutoplayConfig::load(path)?,
        None => AutoplayConfig::default(),
    };
    match args.cmd {
        Cmd::Play { games, ledger_dir, seed, lookahead, weight, realtime, show, quiet, verbose } => {
            let policy = fixed_policy(lookahead, weight, &config)?;
            run_play(&config, games, ledger_dir, seed, policy, realtime, show, quiet, verbose)
        }
        Cmd::Eval { games, lookahead, weight, seed, max_moves, quiet } => {
            let policy = fixed_policy(lookahead, weight, &config)?.unwrap_or_else(|| Policy::new(0, 0.5));
            run_eval(&config, games, &policy, seed, max_moves, quiet)
        }
        Cmd::Ledger { ledger_dir, top } => run_ledger(&config, ledger_dir, top),
    }
}

#[derive(Debug, Parser)]
#[command(name = "autoplay", about = "Self-tuning 2048 autoplayer")]
struct Args {
    /// YAML config file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Play games through the tick loop, learning into the ledger
    Play {
        /// Number of games to play before exiting
        #[arg(long, default_value_t = 1)]
        games: u64,
        /// Directory holding the persisted ledger
        #[arg(long, default_value = ".autoplay")]
        ledger_dir: PathBuf,
        /// Seed for the game and the policy draws
        #[arg(long)]
        seed: Option<u64>,
        /// Start with this lookahead instead of a random policy
        #[arg(long)]
        lookahead: Option<u8>,
        /// Start with this heuristic weight instead of a random policy
        #[arg(long)]
        weight: Option<f64>,
        /// Wait out tick intervals in wall-clock time
        #[arg(long)]
        realtime: bool,
        /// Print the grid after every move
        #[arg(long)]
        show: bool,
        /// Suppress the status line
        #[arg(long)]
        quiet: bool,
        /// Print the ledger record after every game
        #[arg(short, long)]
        verbose: bool,
    },
    /// Play independent games in parallel with one fixed policy
    Eval {
        #[arg(long, default_value_t = 32)]
        games: u64,
        #[arg(long)]
        lookahead: Option<u8>,
        #[arg(long)]
        weight: Option<f64>,
        /// First seed; game i uses seed + i
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Per-game move cap
        #[arg(long)]
        max_moves: Option<u64>,
        #[arg(long)]
        quiet: bool,
    },
    /// Print the persisted ledger, best games first
    Ledger {
        #[arg(long, default_value = ".autoplay")]
        ledger_dir: PathBuf,
        /// Only show this many records
        #[arg(long)]
        top: Option<usize>,
    },
}

fn fixed_policy(lookahead: Option<u8>, weight: Option<f64>, config: &AutoplayConfig) -> anyhow::Result<Option<Policy>> {
    if let Some(l) = lookahead {
        if l > config.max_lookahead {
            anyhow::bail!("--lookahead must be at most {} (hard limit {MAX_LOOKAHEAD}), got {l}", config.max_lookahead);
        }
    }
    if let Some(w) = weight {
        if !(0.0..=1.0).contains(&w) {
            anyhow::bail!("--weight must lie in [0, 1], got {w}");
        }
    }
    Ok(match (lookahead, weight) {
        (None, None) => None,
        (l, w) => Some(Policy::new(l.unwrap_or(0), w.unwrap_or(0.5))),
    })
}

#[allow(clippy::too_many_arguments)]
fn run_play(
    config: &AutoplayConfig,
    games: u64,
    ledger_dir: PathBuf,
    seed: Option<u64>,
    policy: Option<Policy>,
    realtime: bool,
    show: bool,
    quiet: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    let seed = seed.unwrap_or_else(rand::random);
    let mut config = config.clone();
    // the session ends after `games`, restarts in between are driven here
    config.auto_restart = games > 1;
    let ledger = Ledger::new(FileStorage::new(&ledger_dir), &config.storage_key, config.rotate_after);
    let mut driver = TickDriver::new(Game::new(&config, seed), TickQueue::new(), ledger, &config, seed);
    if let Some(p) = policy {
        driver = driver.with_policy(p);
    }

    let pb = if !quiet {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner} {elapsed_precise} | Game {pos} | {msg}")?
                .tick_chars("⠁⠃⠇⠧⠷⠿⠻⠟⠯⠷⠧⠇⠃"),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let start = Instant::now();
    let mut finished = 0u64;
    let mut best = 0u64;
    driver.on_start();
    loop {
        if realtime {
            if let Some(wait) = driver.next_wait() {
                thread::sleep(wait);
            }
        }
        let Some(event) = driver.run_next()? else { break };
        match event {
            Event::Tick(TickOutcome::Moved { direction, score }) => {
                if show {
                    println!("{direction} (score {score})\n{}", driver.host().grid());
                }
                if let Some(pb) = &pb {
                    pb.set_message(format!("score: {} | policy: {}", score, driver.policy()));
                }
            }
            Event::Tick(TickOutcome::NoMove) => {
                eprintln!("No legal move but the game is not over; stopping.");
            }
            Event::Tick(TickOutcome::GameOver { .. }) => {}
            Event::GameEnded(recorded) => {
                finished += 1;
                let score = driver.host().score();
                best = best.max(score);
                if let Some(pb) = &pb {
                    pb.set_position(finished);
                }
                if verbose {
                    let r = &recorded.record;
                    let line = format!(
                        "game {finished}: score {score} | trials {} avg {:.1} best {:.0} | lookahead {} a1 {:.4}{}",
                        r.count,
                        r.score,
                        r.best_score,
                        r.lookahead,
                        r.weights.a1,
                        if recorded.rotated { " | rotated" } else { "" }
                    );
                    match &pb {
                        Some(pb) => pb.println(line),
                        None => println!("{line}"),
                    }
                }
                if finished >= games {
                    break;
                }
            }
            Event::Restarted { .. } => {}
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    println!(
        "Games: {} | best score: {} | elapsed: {:.1}s | ledger: {}",
        finished,
        best,
        start.elapsed().as_secs_f64(),
        driver.ledger().storage().path_for(&config.storage_key).display()
    );
    Ok(())
}

fn run_eval(
    config: &AutoplayConfig,
    games: u64,
    policy: &Policy,
    seed: u64,
    max_moves: Option<u64>,
    quiet: bool,
) -> anyhow::Result<()> {
    let pb = if !quiet {
        let pb = ProgressBar::new(games);
        pb.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} games | {elapsed_precise}")?);
        Some(pb)
    } else {
        None
    };
    let start = Instant::now();
    let results = session::evaluate(config, policy, games, seed, max_moves, |_| {
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    });
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let Some(summary) = BatchSummary::from_games(&results) else {
        anyhow::bail!("no games played");
    };
    let simulations: u64 = results.iter().map(|g| g.simulations).sum();
    println!("Policy: {policy}");
    println!(
        "Games: {} | mean score: {:.1} | best: {} | worst: {} | highest tile: {} | mean moves: {:.1}",
        summary.games, summary.mean_score, summary.best_score, summary.worst_score, summary.highest_tile, summary.mean_moves
    );
    println!("Simulations: {} | elapsed: {:.2}s", simulations, start.elapsed().as_secs_f64());
    Ok(())
}

fn run_ledger(config: &AutoplayConfig, ledger_dir: PathBuf, top: Option<usize>) -> anyhow::Result<()> {
    let storage = FileStorage::new(&ledger_dir);
    if storage.get(&config.storage_key)?.is_none() {
        anyhow::bail!("No ledger found at {}", storage.path_for(&config.storage_key).display());
    }
    let ledger = Ledger::new(storage, &config.storage_key, config.rotate_after);
    let mut records = ledger.load();
    records.sort_by(|a, b| b.best_score.total_cmp(&a.best_score));
    println!("{:>6} {:>9} {:>8} {:>8} {:>12} {:>10}", "trials", "lookahead", "a1", "a2", "score", "best");
    for r in records.iter().take(top.unwrap_or(usize::MAX)) {
        println!(
            "{:>6} {:>9} {:>8.4} {:>8.4} {:>12.1} {:>10.0}",
            r.count, r.lookahead, r.weights.a1, r.weights.a2, r.score, r.best_score
        );
    }
    Ok(())
}
