//! Command-line front door.
//!
//! This is *not* a session/checkpoint manager (it has no notion of
//! already-played games, `-c/--continue`, or merging several matches' worth
//! of config) — it is the minimum surface needed to assemble one
//! `MatchPlan` and hand it to the match runner, so the crate has a runnable
//! binary. Engine command-line parsing (`shlex` on Unix,
//! `CommandLineToArgvW` on Windows) lives in
//! `engine::spec::parse_command_line`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::engine::spec::EngineSpec;
use crate::engine::supervisor::GtpTimeouts;
use crate::error::{DumbarbError, Result};
use crate::game::GameSettings;
use crate::match_runner::{MatchPlan, Waits};
use crate::time_control::{TimeSettings, TimeSystem as TcTimeSystem};

/// `clap`'s `ValueEnum` needs a type it owns; this mirrors
/// `time_control::TimeSystem` one-for-one and converts at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TimeSystemArg {
    None,
    Absolute,
    Canadian,
    Japanese,
}

impl From<TimeSystemArg> for TcTimeSystem {
    fn from(arg: TimeSystemArg) -> TcTimeSystem {
        match arg {
            TimeSystemArg::None => TcTimeSystem::None,
            TimeSystemArg::Absolute => TcTimeSystem::Absolute,
            TimeSystemArg::Canadian => TcTimeSystem::Canadian,
            TimeSystemArg::Japanese => TcTimeSystem::Japanese,
        }
    }
}

/// Runs an n-game GTP match between two engines under an exact time control,
/// writing the `.log`/`.mvtimes`/`.run`/SGF artifacts spec.md §6 defines.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Config {
    /// Command line for engine A (program and arguments, e.g. "gnugo --mode gtp").
    #[arg(long = "engine-a", short = 'a')]
    pub engine_a_cmd: String,
    /// Display name for engine A in logs/SGF (defaults to the program basename).
    #[arg(long = "engine-a-name")]
    pub engine_a_name: Option<String>,
    #[arg(long = "engine-a-workdir")]
    pub engine_a_workdir: Option<PathBuf>,

    /// Command line for engine B.
    #[arg(long = "engine-b", short = 'b')]
    pub engine_b_cmd: String,
    #[arg(long = "engine-b-name")]
    pub engine_b_name: Option<String>,
    #[arg(long = "engine-b-workdir")]
    pub engine_b_workdir: Option<PathBuf>,

    /// Scorer engine command line, invoked on `final_score` when a game
    /// passes out. Omit to leave passed-out games unscored (`Passed`).
    #[arg(long = "scorer")]
    pub scorer_cmd: Option<String>,
    #[arg(long = "scorer-name")]
    pub scorer_name: Option<String>,
    #[arg(long = "scorer-workdir")]
    pub scorer_workdir: Option<PathBuf>,

    /// Output directory for `.log`/`.mvtimes`/`.run`/SGFs/stderr.
    #[arg(long = "outdir", short = 'o')]
    pub outdir: PathBuf,
    /// Base name for the artifact files; defaults to the output directory's
    /// own name.
    #[arg(long = "match-name")]
    pub match_name: Option<String>,

    #[arg(long, default_value_t = 19)]
    pub board_size: u32,
    #[arg(long, default_value_t = 6.5)]
    pub komi: f32,
    #[arg(long, default_value_t = 1)]
    pub games: u32,

    #[arg(long = "time-system", value_enum, default_value_t = TimeSystemArg::None)]
    pub time_system: TimeSystemArg,
    #[arg(long, default_value_t = 0.0)]
    pub main_time: f64,
    #[arg(long, default_value_t = 0.0)]
    pub period_time: f64,
    #[arg(long, default_value_t = 1)]
    pub period_count: u32,
    /// Seconds of slack before an over-run counts as a clock violation;
    /// negative disables violation checking entirely.
    #[arg(long, default_value_t = -1.0)]
    pub tolerance: f64,
    /// End the game immediately on a clock violation (loss by time) instead
    /// of only logging it.
    #[arg(long)]
    pub enforce_time: bool,

    /// Consecutive passes (by either side) that end a game and move to the
    /// scoring phase.
    #[arg(long, default_value_t = 2)]
    pub consecutive_passes: u32,

    #[arg(long, value_parser = parse_seconds, default_value = "0")]
    pub match_wait: Duration,
    #[arg(long, value_parser = parse_seconds, default_value = "0")]
    pub game_wait: Duration,
    #[arg(long, value_parser = parse_seconds, default_value = "0")]
    pub move_wait: Duration,

    #[arg(long, value_parser = parse_seconds, default_value = "10")]
    pub gtp_timeout: Duration,
    /// Defaults to `max(15, gtp_timeout)` per spec.md §4.2 when left unset.
    #[arg(long, value_parser = parse_seconds)]
    pub gtp_initial_timeout: Option<Duration>,
    #[arg(long, value_parser = parse_seconds, default_value = "5")]
    pub gtp_genmove_extra: Duration,
    #[arg(long, value_parser = parse_seconds, default_value = "60")]
    pub gtp_genmove_untimed_timeout: Duration,
    #[arg(long, value_parser = parse_seconds, default_value = "30")]
    pub gtp_scorer_timeout: Duration,

    /// Suppress engine stderr from being mirrored to the arbiter's own
    /// stderr (it is still written to `stderr/` when `--log-stderr` is set).
    #[arg(long)]
    pub quiet: bool,
    /// Capture each engine's stderr to `stderr/<match>-<seq>-<name>.err`.
    #[arg(long)]
    pub log_stderr: bool,
    /// Skip writing SGF game records.
    #[arg(long)]
    pub disable_sgf: bool,
}

impl Config {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Assembles the typed `MatchPlan` the match runner consumes, resolving
    /// names, timeouts, and engine specs from the raw CLI flags.
    pub fn into_match_plan(self) -> Result<MatchPlan> {
        let time = TimeSettings {
            system: self.time_system.into(),
            main_time: self.main_time,
            period_time: self.period_time,
            period_count: self.period_count,
            tolerance: self.tolerance,
        };
        time.validate()?;

        let match_name = self.match_name.clone().unwrap_or_else(|| {
            self.outdir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "match".to_string())
        });

        let gtp_timeout = self.gtp_timeout;
        let gtp_initial_timeout = self
            .gtp_initial_timeout
            .unwrap_or_else(|| gtp_timeout.max(Duration::from_secs(15)));

        let engine_a = build_engine_spec(
            "engineA",
            &self.engine_a_cmd,
            self.engine_a_name,
            self.engine_a_workdir,
            self.quiet,
            self.log_stderr,
            gtp_initial_timeout,
        );
        let engine_b = build_engine_spec(
            "engineB",
            &self.engine_b_cmd,
            self.engine_b_name,
            self.engine_b_workdir,
            self.quiet,
            self.log_stderr,
            gtp_initial_timeout,
        );
        let scorer = self.scorer_cmd.as_ref().map(|cmd| {
            build_engine_spec(
                "scorer",
                cmd,
                self.scorer_name.clone(),
                self.scorer_workdir.clone(),
                self.quiet,
                self.log_stderr,
                gtp_initial_timeout,
            )
        });

        if self.games == 0 {
            return Err(DumbarbError::Config("games must be at least 1".into()));
        }

        Ok(MatchPlan {
            match_name,
            match_dir: self.outdir,
            engine_a,
            engine_b,
            scorer,
            settings: GameSettings {
                board_size: self.board_size,
                komi: self.komi,
                time,
            },
            num_games: self.games,
            waits: Waits {
                match_wait: self.match_wait,
                game_wait: self.game_wait,
                move_wait: self.move_wait,
            },
            gtp_timeouts: GtpTimeouts {
                gtp_timeout,
                gtp_initial_timeout,
                gtp_genmove_extra: self.gtp_genmove_extra,
                gtp_genmove_untimed_timeout: self.gtp_genmove_untimed_timeout,
                gtp_scorer_timeout: self.gtp_scorer_timeout,
            },
            consecutive_passes_to_end: self.consecutive_passes,
            enforce_time: self.enforce_time,
            disable_sgf: self.disable_sgf,
        })
    }
}

fn build_engine_spec(
    default_name: &str,
    cmd_line: &str,
    name: Option<String>,
    work_dir: Option<PathBuf>,
    quiet: bool,
    log_stderr: bool,
    gtp_initial_timeout: Duration,
) -> EngineSpec {
    EngineSpec {
        name: name.unwrap_or_else(|| default_name.to_string()),
        cmd_line: cmd_line.to_string(),
        work_dir,
        quiet,
        log_stderr,
        gtp_initial_timeout,
        pre_match: Vec::new(),
        post_match: Vec::new(),
        pre_game: Vec::new(),
        post_game: Vec::new(),
    }
}

fn parse_seconds(raw: &str) -> std::result::Result<Duration, String> {
    raw.parse::<f64>()
        .map(Duration::from_secs_f64)
        .map_err(|e| format!("invalid duration '{raw}': {e}"))
}
