//! Game driver (component D): runs one game end to end — setup, alternating
//! `genmove`/`play`, resign/pass/illegal/timeout detection, optional scoring
//! phase, and `GameResult` assembly. See spec.md §4.4.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use log::{info, warn};

use crate::engine::supervisor::{time_settings_command, EngineSupervisor, GtpTimeouts};
use crate::error::GtpError;
use crate::time_control::{Color, TimeSettings, TimeTracker};

/// `{ boardSize, komi, time }` from spec.md §3.
#[derive(Debug, Clone, Copy)]
pub struct GameSettings {
    pub board_size: u32,
    pub komi: f32,
    pub time: TimeSettings,
}

/// Which `.log` reason code (spec.md §6) a non-decisive ending maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReason {
    /// An engine's channel closed or a command it needed timed out outside
    /// of `genmove` — `EE` in the log line.
    Crash,
    /// A `?`-error or malformed body that isn't a crash and isn't the
    /// scorer — `XX`.
    Protocol,
    /// The scorer failed (timeout, crash, or unparseable `final_score`) —
    /// `SD`.
    Scorer,
}

/// Tagged outcome of one game (spec.md §3 `GameOutcome`).
#[derive(Debug, Clone)]
pub enum GameOutcome {
    Resign { loser: Color },
    Score { loser: Color, margin: String },
    Time { loser: Color },
    Illegal { offender: Color },
    Passed,
    Jigo,
    Unfinished,
    Error { detail: String, reason: ErrorReason },
}

/// `{ color, coord, elapsed }` from spec.md §3. `coord` is `"pass"`,
/// `"resign"`, or a raw board vertex exactly as the engine returned it.
#[derive(Debug, Clone)]
pub struct MoveRecord {
    pub color: Color,
    pub coord: String,
    pub elapsed: f64,
}

/// Per-side aggregate move statistics (spec.md §8 invariant 2).
#[derive(Debug, Clone, Copy, Default)]
pub struct SideStats {
    pub move_count: u32,
    pub total_think: f64,
    pub avg_think: f64,
    pub max_think: f64,
}

impl SideStats {
    fn from_moves<'a>(moves: impl Iterator<Item = &'a MoveRecord>) -> SideStats {
        let mut stats = SideStats::default();
        for mv in moves {
            stats.move_count += 1;
            stats.total_think += mv.elapsed;
            stats.max_think = stats.max_think.max(mv.elapsed);
        }
        if stats.move_count > 0 {
            stats.avg_think = stats.total_think / stats.move_count as f64;
        }
        stats
    }
}

/// A clock violation, named by the engine it happened to (spec.md §3).
#[derive(Debug, Clone)]
pub struct Violation {
    pub engine_name: String,
    pub move_num: u32,
    pub elapsed: f64,
}

/// Completed game record (spec.md §3 `GameResult`), handed to the result
/// emitter.
#[derive(Debug, Clone)]
pub struct GameResult {
    pub seq: u32,
    pub timestamp: DateTime<Local>,
    pub engine_a_name: String,
    pub engine_b_name: String,
    pub engine_a_color: Color,
    pub outcome: GameOutcome,
    pub moves: Vec<MoveRecord>,
    pub side_a: SideStats,
    pub side_b: SideStats,
    pub violations: Vec<Violation>,
}

impl GameResult {
    pub fn engine_b_color(&self) -> Color {
        self.engine_a_color.opponent()
    }

    /// Invariant 1 of spec.md §8: total moves excludes the resign itself.
    pub fn total_moves(&self) -> u32 {
        let sum = self.side_a.move_count + self.side_b.move_count;
        if matches!(self.outcome, GameOutcome::Resign { .. }) {
            sum.saturating_sub(1)
        } else {
            sum
        }
    }
}

/// Which engine slot (A or B) a restart applies to, reported back to the
/// match runner so restart-on-crash happens between games (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartTarget {
    A,
    B,
    Scorer,
}

/// Outcome of `play_game`: the result plus any engines that need a restart
/// before the next game.
pub struct GameOutput {
    pub result: GameResult,
    pub restarts: Vec<RestartTarget>,
}

/// What happened when `color` was asked for a move.
enum AttemptKind {
    Vertex(String),
    Pass,
    Resign,
    TimedOut,
    Failed(GtpError),
}

struct Attempt {
    elapsed: f64,
    kind: AttemptKind,
}

/// Runs `genmove` for `color` against `mover`, having already advertised its
/// clock via `time_left`. The timeout is the clock's remaining budget plus
/// `GtpGenmoveExtra`, or `GtpGenmoveUntimedTO` when untimed (spec.md §4.3).
fn attempt_move(
    mover: &mut EngineSupervisor,
    color: Color,
    tracker: &TimeTracker,
    timeouts: &GtpTimeouts,
) -> Attempt {
    let (seconds, stones_or_periods) = tracker.time_left_args(color);
    if tracker.is_timed() {
        let _ = mover.command(
            &format!("time_left {} {:.2} {}", color.as_gtp(), seconds, stones_or_periods),
            timeouts.gtp_timeout,
        );
    }

    let deadline = if tracker.is_timed() {
        Duration::from_secs_f64(tracker.remaining_budget(color)) + timeouts.gtp_genmove_extra
    } else {
        timeouts.gtp_genmove_untimed_timeout
    };

    let t0 = Instant::now();
    let response = mover.genmove(color.as_gtp(), deadline);
    let elapsed = t0.elapsed().as_secs_f64();

    let kind = match response {
        Ok(r) if r.ok => {
            let body = r.body.trim();
            if body.eq_ignore_ascii_case("resign") {
                AttemptKind::Resign
            } else if body.eq_ignore_ascii_case("pass") {
                AttemptKind::Pass
            } else {
                AttemptKind::Vertex(body.to_string())
            }
        }
        Ok(r) => AttemptKind::Failed(GtpError::EngineError(r.body)),
        Err(GtpError::Timeout) => AttemptKind::TimedOut,
        Err(e) => AttemptKind::Failed(e),
    };
    Attempt { elapsed, kind }
}

/// Arguments for one game, borrowing both playing engines (and optionally a
/// scorer) for the duration of the call.
pub struct PlayGameArgs<'a> {
    pub seq: u32,
    pub settings: &'a GameSettings,
    pub engine_a: &'a mut EngineSupervisor,
    pub engine_b: &'a mut EngineSupervisor,
    pub engine_a_color: Color,
    pub scorer: Option<&'a mut EngineSupervisor>,
    pub consecutive_passes_to_end: u32,
    pub enforce_time: bool,
    pub move_wait: Duration,
    pub timeouts: &'a GtpTimeouts,
    pub use_kgs_a: bool,
    pub use_kgs_b: bool,
    pub cancel: &'a crate::cancel::Cancel,
}

/// Runs one game (component D). See spec.md §4.4 for the numbered steps
/// this function follows.
pub fn play_game(args: PlayGameArgs<'_>) -> GameOutput {
    let PlayGameArgs {
        seq,
        settings,
        engine_a,
        engine_b,
        engine_a_color,
        mut scorer,
        consecutive_passes_to_end,
        enforce_time,
        move_wait,
        timeouts,
        use_kgs_a,
        use_kgs_b,
        cancel,
    } = args;

    let engine_a_name = engine_a.name().to_string();
    let engine_b_name = engine_b.name().to_string();
    let mut restarts = Vec::new();

    // Step 2: setup both engines. A setup-phase failure ends the game before
    // a single move is played; per spec.md §7's error table a bare Timeout
    // here is `Unfinished` (the engine gets another chance next game after a
    // restart), anything else is `Error`.
    if let Err(e) = setup_engine(engine_a, settings, use_kgs_a, timeouts) {
        return setup_error(
            seq,
            engine_a_name,
            engine_b_name,
            engine_a_color,
            RestartTarget::A,
            "engine A",
            e,
        );
    }
    if let Err(e) = setup_engine(engine_b, settings, use_kgs_b, timeouts) {
        return setup_error(
            seq,
            engine_a_name,
            engine_b_name,
            engine_a_color,
            RestartTarget::B,
            "engine B",
            e,
        );
    }

    let mut tracker = TimeTracker::new(settings.time);
    let mut moves: Vec<MoveRecord> = Vec::new();
    let mut violations: Vec<Violation> = Vec::new();
    let mut consecutive_passes: u32 = 0;
    let mut to_move = Color::Black;
    let mut ended_by_passes = false;
    let mut final_outcome: Option<GameOutcome> = None;

    'moves: loop {
        if cancel.is_tripped() {
            final_outcome = Some(GameOutcome::Unfinished);
            break;
        }

        let mover_is_a = to_move == engine_a_color;
        let (mover, other): (&mut EngineSupervisor, &mut EngineSupervisor) = if mover_is_a {
            (engine_a, engine_b)
        } else {
            (engine_b, engine_a)
        };
        let mover_target = if mover_is_a { RestartTarget::A } else { RestartTarget::B };
        let other_target = if mover_is_a { RestartTarget::B } else { RestartTarget::A };

        let attempt = attempt_move(mover, to_move, &tracker, timeouts);
        let move_num = moves.len() as u32 + 1;

        match attempt.kind {
            AttemptKind::TimedOut => {
                tracker.deduct(to_move, attempt.elapsed);
                violations.push(Violation {
                    engine_name: mover.name().to_string(),
                    move_num,
                    elapsed: attempt.elapsed,
                });
                // No response arrived, so there is no coord to log: the move
                // log only ever holds `pass`/`resign`/a board vertex
                // (spec.md §3 MoveRecord), never a synthetic timeout token.
                warn!("engine {} timed out on move {move_num}", mover.name());
                final_outcome = Some(GameOutcome::Time { loser: to_move });
                restarts.push(mover_target);
                break 'moves;
            }
            AttemptKind::Failed(GtpError::ChannelClosed) => {
                final_outcome = Some(GameOutcome::Error {
                    detail: format!("{} crashed", mover.name()),
                    reason: ErrorReason::Crash,
                });
                restarts.push(mover_target);
                break 'moves;
            }
            AttemptKind::Failed(e) => {
                final_outcome = Some(GameOutcome::Error {
                    detail: format!("{}: {e}", mover.name()),
                    reason: ErrorReason::Protocol,
                });
                restarts.push(mover_target);
                break 'moves;
            }
            AttemptKind::Resign => {
                let violated = tracker.deduct(to_move, attempt.elapsed);
                if violated {
                    violations.push(Violation {
                        engine_name: mover.name().to_string(),
                        move_num,
                        elapsed: attempt.elapsed,
                    });
                }
                moves.push(MoveRecord {
                    color: to_move,
                    coord: "resign".to_string(),
                    elapsed: attempt.elapsed,
                });
                // spec.md §4.4 step c runs before step d's resign/pass
                // parsing: a clock violation under enforcement ends the
                // game on time even if the body itself was a resign.
                final_outcome = Some(if violated && enforce_time {
                    GameOutcome::Time { loser: to_move }
                } else {
                    GameOutcome::Resign { loser: to_move }
                });
                break 'moves;
            }
            AttemptKind::Pass => {
                let violated = tracker.deduct(to_move, attempt.elapsed);
                if violated {
                    violations.push(Violation {
                        engine_name: mover.name().to_string(),
                        move_num,
                        elapsed: attempt.elapsed,
                    });
                }
                moves.push(MoveRecord {
                    color: to_move,
                    coord: "pass".to_string(),
                    elapsed: attempt.elapsed,
                });
                if violated && enforce_time {
                    final_outcome = Some(GameOutcome::Time { loser: to_move });
                    break 'moves;
                }
                consecutive_passes += 1;
                if consecutive_passes >= consecutive_passes_to_end {
                    ended_by_passes = true;
                    break 'moves;
                }
            }
            AttemptKind::Vertex(vertex) => {
                let violated = tracker.deduct(to_move, attempt.elapsed);
                if violated {
                    violations.push(Violation {
                        engine_name: mover.name().to_string(),
                        move_num,
                        elapsed: attempt.elapsed,
                    });
                }
                moves.push(MoveRecord {
                    color: to_move,
                    coord: vertex.clone(),
                    elapsed: attempt.elapsed,
                });
                if violated && enforce_time {
                    final_outcome = Some(GameOutcome::Time { loser: to_move });
                    break 'moves;
                }
                consecutive_passes = 0;

                let play_cmd = format!("play {} {vertex}", to_move.as_gtp());
                match other.command(&play_cmd, timeouts.gtp_timeout) {
                    Ok(_) => {}
                    Err(GtpError::EngineError(body)) if body.to_ascii_lowercase().contains("illegal") => {
                        final_outcome = Some(GameOutcome::Illegal { offender: to_move });
                        break 'moves;
                    }
                    Err(GtpError::ChannelClosed) => {
                        final_outcome = Some(GameOutcome::Error {
                            detail: format!("{} crashed", other.name()),
                            reason: ErrorReason::Crash,
                        });
                        restarts.push(other_target);
                        break 'moves;
                    }
                    Err(e) => {
                        final_outcome = Some(GameOutcome::Error {
                            detail: format!("{}: {e}", other.name()),
                            reason: ErrorReason::Protocol,
                        });
                        restarts.push(other_target);
                        break 'moves;
                    }
                }
            }
        }

        if !cancel.sleep(move_wait) {
            final_outcome = Some(GameOutcome::Unfinished);
            break 'moves;
        }
        to_move = to_move.opponent();
    }

    let outcome = if ended_by_passes {
        let (outcome, scorer_needs_restart) = score_game(scorer.as_deref_mut(), &moves, timeouts);
        if scorer_needs_restart {
            restarts.push(RestartTarget::Scorer);
        }
        outcome
    } else {
        final_outcome.unwrap_or(GameOutcome::Unfinished)
    };

    engine_a.run_post_game();
    engine_b.run_post_game();

    let side_a = SideStats::from_moves(moves.iter().filter(|m| m.color == engine_a_color));
    let side_b = SideStats::from_moves(moves.iter().filter(|m| m.color == engine_a_color.opponent()));

    let result = GameResult {
        seq,
        timestamp: Local::now(),
        engine_a_name,
        engine_b_name,
        engine_a_color,
        outcome,
        moves,
        side_a,
        side_b,
        violations,
    };

    info!(
        "game {seq} finished: {:?} ({} moves)",
        result.outcome,
        result.total_moves()
    );

    GameOutput { result, restarts }
}

fn setup_engine(
    engine: &mut EngineSupervisor,
    settings: &GameSettings,
    use_kgs: bool,
    timeouts: &GtpTimeouts,
) -> Result<(), GtpError> {
    engine.command(&format!("boardsize {}", settings.board_size), timeouts.gtp_timeout)?;
    engine.command(&format!("komi {}", settings.komi), timeouts.gtp_timeout)?;
    let ts_cmd = time_settings_command(
        settings.time.system,
        settings.time.main_time,
        settings.time.period_time,
        settings.time.period_count,
        use_kgs,
    );
    engine.command(&ts_cmd, timeouts.gtp_timeout)?;
    engine.command("clear_board", timeouts.gtp_timeout)?;
    engine
        .run_pre_game()
        .map_err(|e| GtpError::EngineError(e.to_string()))?;
    Ok(())
}

/// Scoring phase (spec.md §4.4 step 4): replay the move history through the
/// scorer and parse `final_score`. With no scorer configured the outcome is
/// `Passed`.
fn score_game(
    scorer: Option<&mut EngineSupervisor>,
    moves: &[MoveRecord],
    timeouts: &GtpTimeouts,
) -> (GameOutcome, bool) {
    let Some(scorer) = scorer else {
        return (GameOutcome::Passed, false);
    };

    if let Err(e) = scorer.command("clear_board", timeouts.gtp_timeout) {
        return (
            GameOutcome::Error {
                detail: format!("scorer clear_board failed: {e}"),
                reason: ErrorReason::Scorer,
            },
            matches!(e, GtpError::ChannelClosed | GtpError::Timeout),
        );
    }
    for mv in moves {
        let cmd = format!("play {} {}", mv.color.as_gtp(), mv.coord);
        if let Err(e) = scorer.command(&cmd, timeouts.gtp_timeout) {
            return (
                GameOutcome::Error {
                    detail: format!("scorer replay failed at '{cmd}': {e}"),
                    reason: ErrorReason::Scorer,
                },
                matches!(e, GtpError::ChannelClosed | GtpError::Timeout),
            );
        }
    }

    match scorer.command("final_score", timeouts.gtp_scorer_timeout) {
        Ok(body) => match crate::gtp::response::parse_score(&body) {
            crate::gtp::response::ScoreToken::Jigo => (GameOutcome::Jigo, false),
            crate::gtp::response::ScoreToken::Margin { white_wins, margin } => (
                GameOutcome::Score {
                    loser: if white_wins { Color::Black } else { Color::White },
                    margin: margin.to_string(),
                },
                false,
            ),
            crate::gtp::response::ScoreToken::Unparseable => (
                GameOutcome::Error {
                    detail: format!("unparseable final_score body: '{body}'"),
                    reason: ErrorReason::Scorer,
                },
                false,
            ),
        },
        Err(e) => (
            GameOutcome::Error {
                detail: format!("final_score failed: {e}"),
                reason: ErrorReason::Scorer,
            },
            matches!(e, GtpError::ChannelClosed | GtpError::Timeout),
        ),
    }
}

/// Ends a game before any move was played because a setup command (spec.md
/// §4.4 step 2) failed. A bare `Timeout` is `Unfinished` (spec.md §7); any
/// other failure is `Error`. Either way the offending engine is scheduled
/// for a restart before the next game.
fn setup_error(
    seq: u32,
    engine_a_name: String,
    engine_b_name: String,
    engine_a_color: Color,
    target: RestartTarget,
    who: &str,
    e: GtpError,
) -> GameOutput {
    let outcome = match e {
        GtpError::Timeout => GameOutcome::Unfinished,
        GtpError::ChannelClosed => GameOutcome::Error {
            detail: format!("{who} crashed during setup"),
            reason: ErrorReason::Crash,
        },
        other => GameOutcome::Error {
            detail: format!("{who} setup failed: {other}"),
            reason: ErrorReason::Protocol,
        },
    };
    GameOutput {
        result: GameResult {
            seq,
            timestamp: Local::now(),
            engine_a_name,
            engine_b_name,
            engine_a_color,
            outcome,
            moves: Vec::new(),
            side_a: SideStats::default(),
            side_b: SideStats::default(),
            violations: Vec::new(),
        },
        restarts: vec![target],
    }
}

/// Reports the `.mvtimes`-format move-times line for one game (spec.md §6),
/// without the leading `[#N]` (the result emitter prepends that).
pub fn format_move_times(moves: &[MoveRecord]) -> String {
    moves
        .iter()
        .map(|m| format!("{}[{:.2}]", m.coord, m.elapsed))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn match_dir_stderr_path(match_dir: &Path, match_name: &str, seq: u32, engine_name: &str) -> std::path::PathBuf {
    match_dir
        .join("stderr")
        .join(format!("{match_name}-{seq}-{engine_name}.err"))
}
