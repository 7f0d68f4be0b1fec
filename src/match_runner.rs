//! Match runner (component E): sequences N games between two engines,
//! alternates colours, restarts crashed engines between games, and drives
//! the result emitter. See spec.md §4.5.

use std::path::PathBuf;
use std::time::Duration;

use log::{error, warn};

use crate::cancel::Cancel;
use crate::display::MatchProgress;
use crate::engine::spec::TemplateContext;
use crate::engine::supervisor::{EngineRole, EngineSupervisor, GtpTimeouts};
use crate::error::{DumbarbError, Result};
use crate::game::{play_game, GameOutput, GameSettings, PlayGameArgs, RestartTarget};
use crate::result_emitter::ResultEmitter;
use crate::time_control::Color;

/// The three configurable sleeps of spec.md §3/§5.
#[derive(Debug, Clone, Copy)]
pub struct Waits {
    pub match_wait: Duration,
    pub game_wait: Duration,
    pub move_wait: Duration,
}

/// `{ engineA, engineB, scorer?, settings, numGames, waits, gtpTimeouts,
/// consecutivePassesToEnd, enforceTime, disableSgf, matchDir }` from
/// spec.md §3 `MatchPlan`.
pub struct MatchPlan {
    pub match_name: String,
    pub match_dir: PathBuf,
    pub engine_a: crate::engine::spec::EngineSpec,
    pub engine_b: crate::engine::spec::EngineSpec,
    pub scorer: Option<crate::engine::spec::EngineSpec>,
    pub settings: GameSettings,
    pub num_games: u32,
    pub waits: Waits,
    pub gtp_timeouts: GtpTimeouts,
    pub consecutive_passes_to_end: u32,
    pub enforce_time: bool,
    pub disable_sgf: bool,
}

/// Builds the placeholder-substitution context for `name`'s command line.
/// A free function over `&MatchPlan` (rather than a `&self` method) so the
/// borrow checker can see it only touches `plan`, leaving `engine_a`/
/// `engine_b`/`scorer` free to be borrowed mutably alongside it.
fn template_ctx<'a>(plan: &'a MatchPlan, name: &'a str) -> TemplateContext<'a> {
    TemplateContext {
        name,
        match_dir: &plan.match_dir,
        board_size: plan.settings.board_size,
        komi: plan.settings.komi,
        main_time: plan.settings.time.main_time,
        period_time: plan.settings.time.period_time,
        period_count: plan.settings.time.period_count,
        time_system: plan.settings.time.system,
    }
}

/// Which side `EngineA` plays is alternated one-indexed per spec.md §4.5:
/// odd games it plays Black, even games White.
fn engine_a_color_for_game(seq: u32) -> Color {
    if seq % 2 == 1 {
        Color::Black
    } else {
        Color::White
    }
}

/// Owns both supervisors for the lifetime of the match and drives the per-
/// game sequence.
pub struct MatchRunner {
    plan: MatchPlan,
    cancel: Cancel,
    engine_a: EngineSupervisor,
    engine_b: EngineSupervisor,
    scorer: Option<EngineSupervisor>,
    emitter: ResultEmitter,
    noted_kgs_fallback_a: bool,
    noted_kgs_fallback_b: bool,
}

impl MatchRunner {
    pub fn new(plan: MatchPlan, cancel: Cancel) -> Result<MatchRunner> {
        std::fs::create_dir_all(&plan.match_dir)?;
        let emitter = ResultEmitter::new(
            &plan.match_dir,
            &plan.match_name,
            plan.disable_sgf,
            plan.settings.board_size,
            plan.settings.komi,
        )?;

        let engine_a = EngineSupervisor::new(
            EngineRole::EngineA,
            plan.engine_a.clone(),
            plan.gtp_timeouts,
            cancel.clone(),
        );
        let engine_b = EngineSupervisor::new(
            EngineRole::EngineB,
            plan.engine_b.clone(),
            plan.gtp_timeouts,
            cancel.clone(),
        );
        let scorer = plan.scorer.clone().map(|spec| {
            EngineSupervisor::new(EngineRole::Scorer, spec, plan.gtp_timeouts, cancel.clone())
        });

        Ok(MatchRunner {
            plan,
            cancel,
            engine_a,
            engine_b,
            scorer,
            emitter,
            noted_kgs_fallback_a: false,
            noted_kgs_fallback_b: false,
        })
    }

    /// Runs the whole match: `MatchWait`, then each game with `GameWait`
    /// between, then `PostMatch` + `quit` on both engines. A restart that
    /// fails after its retry (spec.md §4.5) terminates the match with every
    /// remaining game recorded `Unfinished`, rather than propagating an
    /// error past already-played games.
    pub fn run(&mut self, progress: &MatchProgress) -> Result<()> {
        if !self.cancel.sleep(self.plan.waits.match_wait) {
            self.emitter.note("match cancelled before game 1");
            self.record_remaining_unfinished(1)?;
            return Ok(());
        }

        self.start_engine(EngineRole::EngineA)?;
        self.start_engine(EngineRole::EngineB)?;

        for seq in 1..=self.plan.num_games {
            if self.cancel.is_tripped() {
                self.emitter.note(&format!("match cancelled before game {seq}"));
                self.record_remaining_unfinished(seq)?;
                break;
            }

            if seq > 1 && !self.cancel.sleep(self.plan.waits.game_wait) {
                self.emitter.note(&format!("match cancelled before game {seq}"));
                self.record_remaining_unfinished(seq)?;
                break;
            }

            let output = match self.play_one_game(seq) {
                Ok(output) => output,
                Err(e) => {
                    self.emitter
                        .note(&format!("match terminated before game {seq}: {e}"));
                    self.record_remaining_unfinished(seq)?;
                    return Err(e);
                }
            };

            // Record the decided outcome immediately, before touching any
            // engine again: spec.md §4.4 step (c) schedules a supervisor
            // restart only *after* the game result has been emitted, so a
            // restart failure below must never cost this game its real
            // outcome.
            progress.report_game(&output.result);
            self.emitter.record_game(&output.result)?;

            for target in &output.restarts {
                if let Err(e) = self.restart(*target, "previous game ended with this engine unresponsive") {
                    self.emitter
                        .note(&format!("match terminated after game {seq}: {e}"));
                    self.record_remaining_unfinished(seq + 1)?;
                    return Err(e);
                }
            }
        }

        self.engine_a.run_post_match();
        self.engine_b.run_post_match();
        self.engine_a.quit();
        self.engine_b.quit();
        if let Some(scorer) = self.scorer.as_mut() {
            scorer.quit();
        }

        Ok(())
    }

    fn record_remaining_unfinished(&mut self, from_seq: u32) -> Result<()> {
        let engine_a_name = self.engine_a.name().to_string();
        let engine_b_name = self.engine_b.name().to_string();
        for seq in from_seq..=self.plan.num_games {
            let color = engine_a_color_for_game(seq);
            self.emitter
                .record_unfinished(seq, &engine_a_name, &engine_b_name, color)?;
        }
        Ok(())
    }

    fn start_engine(&mut self, role: EngineRole) -> Result<()> {
        let name: &str = match role {
            EngineRole::EngineA => &self.plan.engine_a.name,
            EngineRole::EngineB => &self.plan.engine_b.name,
            EngineRole::Scorer => &self.plan.scorer.as_ref().expect("scorer configured").name,
        };
        let ctx = template_ctx(&self.plan, name);
        let engine = match role {
            EngineRole::EngineA => &mut self.engine_a,
            EngineRole::EngineB => &mut self.engine_b,
            EngineRole::Scorer => self.scorer.as_mut().expect("scorer constructed"),
        };
        engine.start(&ctx, true).map_err(|e| {
            error!("engine {name} failed to start: {e}");
            e
        })?;
        self.emitter.note(&format!(
            "{name} started: reports as {} {}",
            engine.reported_name, engine.reported_version
        ));
        Ok(())
    }

    /// Ensures the scorer is running, spawning it on first use and reusing
    /// it across every game of the match (spec.md §4.4 step 4).
    fn ensure_scorer(&mut self) -> Result<()> {
        if self.scorer.is_none() {
            return Ok(());
        }
        let running = self.scorer.as_ref().map(|s| s.is_running()).unwrap_or(false);
        if !running {
            self.start_engine(EngineRole::Scorer)?;
        }
        Ok(())
    }

    fn play_one_game(&mut self, seq: u32) -> Result<GameOutput> {
        self.ensure_scorer()?;

        let stderr_path_a = self.emitter.stderr_path(seq, self.engine_a.name());
        let stderr_path_b = self.emitter.stderr_path(seq, self.engine_b.name());
        self.engine_a.open_stderr_log(&stderr_path_a)?;
        self.engine_b.open_stderr_log(&stderr_path_b)?;

        let engine_a_color = engine_a_color_for_game(seq);
        let use_kgs_a = self.engine_a.wants_kgs_time_settings();
        let use_kgs_b = self.engine_b.wants_kgs_time_settings();
        if matches!(self.plan.settings.time.system, crate::time_control::TimeSystem::Japanese) {
            if !use_kgs_a && !self.noted_kgs_fallback_a {
                self.noted_kgs_fallback_a = true;
                self.emitter.note(&format!(
                    "{} lacks kgs-time_settings; approximating Japanese byo-yomi as Canadian",
                    self.engine_a.name()
                ));
            }
            if !use_kgs_b && !self.noted_kgs_fallback_b {
                self.noted_kgs_fallback_b = true;
                self.emitter.note(&format!(
                    "{} lacks kgs-time_settings; approximating Japanese byo-yomi as Canadian",
                    self.engine_b.name()
                ));
            }
        }

        let output = play_game(PlayGameArgs {
            seq,
            settings: &self.plan.settings,
            engine_a: &mut self.engine_a,
            engine_b: &mut self.engine_b,
            engine_a_color,
            scorer: self.scorer.as_mut(),
            consecutive_passes_to_end: self.plan.consecutive_passes_to_end,
            enforce_time: self.plan.enforce_time,
            move_wait: self.plan.waits.move_wait,
            timeouts: &self.plan.gtp_timeouts,
            use_kgs_a,
            use_kgs_b,
            cancel: &self.cancel,
        });

        // Restart-on-crash happens in `run()`, after the result below has
        // been recorded, not here.
        Ok(output)
    }

    /// Restarts the engine at `target`, retrying once more before giving up
    /// (spec.md §4.5: "a supervisor that fails to start/restart after one
    /// retry causes the match to terminate" — one initial attempt plus one
    /// retry, not a single shot).
    fn restart(&mut self, target: RestartTarget, reason: &str) -> Result<()> {
        if target == RestartTarget::Scorer && self.scorer.is_none() {
            return Ok(());
        }
        let name: &str = match target {
            RestartTarget::A => &self.plan.engine_a.name,
            RestartTarget::B => &self.plan.engine_b.name,
            RestartTarget::Scorer => self.plan.scorer.as_ref().map(|s| s.name.as_str()).unwrap_or("scorer"),
        };
        let ctx = template_ctx(&self.plan, name);
        let engine = match target {
            RestartTarget::A => &mut self.engine_a,
            RestartTarget::B => &mut self.engine_b,
            RestartTarget::Scorer => self.scorer.as_mut().expect("checked above"),
        };
        warn!("restarting {name}: {reason}");

        let mut last_err = match engine.restart(&ctx, reason) {
            Ok(()) => {
                self.emitter.note_restart(name, engine.restart_count, reason);
                return Ok(());
            }
            Err(e) => e,
        };

        warn!("{name} failed to restart: {last_err}; retrying once");
        self.emitter
            .note(&format!("{name} failed to restart: {last_err}; retrying once"));

        last_err = match engine.restart(&ctx, reason) {
            Ok(()) => {
                self.emitter.note_restart(name, engine.restart_count, reason);
                return Ok(());
            }
            Err(e) => e,
        };

        error!("{name} failed to restart after one retry: {last_err}");
        self.emitter.note(&format!(
            "{name} failed to restart after one retry: {last_err}; terminating match"
        ));
        Err(DumbarbError::Supervisor(format!(
            "{name} failed to restart after one retry: {last_err}"
        )))
    }
}
