//! One supervised engine process (component B): spawn, handshake, command
//! dispatch through the transport, restart-on-crash, and shutdown.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::time::Duration;

use log::{info, warn};

use crate::cancel::Cancel;
use crate::engine::spec::{parse_command_line, resolve_template, EngineSpec, TemplateContext};
use crate::error::{DumbarbError, GtpError};
use crate::gtp::response::Response;
use crate::gtp::transport::Transport;
use crate::time_control::TimeSystem;

/// Which match-fixed identity an engine has. Distinct from the per-game
/// colour assignment, which alternates from game to game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRole {
    EngineA,
    EngineB,
    Scorer,
}

impl EngineRole {
    pub fn label(self) -> &'static str {
        match self {
            EngineRole::EngineA => "engineA",
            EngineRole::EngineB => "engineB",
            EngineRole::Scorer => "scorer",
        }
    }
}

/// The five configurable GTP timeouts.
#[derive(Debug, Clone, Copy)]
pub struct GtpTimeouts {
    pub gtp_timeout: Duration,
    pub gtp_initial_timeout: Duration,
    pub gtp_genmove_extra: Duration,
    pub gtp_genmove_untimed_timeout: Duration,
    pub gtp_scorer_timeout: Duration,
}

impl Default for GtpTimeouts {
    fn default() -> Self {
        GtpTimeouts {
            gtp_timeout: Duration::from_secs(10),
            gtp_initial_timeout: Duration::from_secs(15),
            gtp_genmove_extra: Duration::from_secs(5),
            gtp_genmove_untimed_timeout: Duration::from_secs(60),
            gtp_scorer_timeout: Duration::from_secs(30),
        }
    }
}

/// A running (or not-yet-started) supervised engine.
pub struct EngineSupervisor {
    pub role: EngineRole,
    spec: EngineSpec,
    timeouts: GtpTimeouts,
    cancel: Cancel,
    transport: Option<Transport>,
    pub reported_name: String,
    pub reported_version: String,
    supported_commands: HashSet<String>,
    pub restart_count: u32,
    stderr_log: Option<File>,
}

impl EngineSupervisor {
    pub fn new(role: EngineRole, spec: EngineSpec, timeouts: GtpTimeouts, cancel: Cancel) -> Self {
        EngineSupervisor {
            role,
            spec,
            timeouts,
            cancel,
            transport: None,
            reported_name: String::new(),
            reported_version: String::new(),
            supported_commands: HashSet::new(),
            restart_count: 0,
            stderr_log: None,
        }
    }

    pub fn name(&self) -> &str {
        if self.reported_name.is_empty() {
            &self.spec.name
        } else {
            &self.reported_name
        }
    }

    pub fn supports(&self, command: &str) -> bool {
        self.supported_commands.contains(command)
    }

    /// Spawns the child and runs the handshake (`list_commands`, `name`,
    /// `version`). Runs `PreMatch` commands only when `first_start` is set;
    /// `PreGame` commands are the match/game driver's responsibility via
    /// `run_pre_game`, since they must re-run before every game including
    /// after a restart.
    pub fn start(&mut self, ctx: &TemplateContext, first_start: bool) -> Result<(), DumbarbError> {
        let resolved = resolve_template(&self.spec.cmd_line, ctx)?;
        let (program, args) = parse_command_line(&resolved);
        if program.is_empty() {
            return Err(DumbarbError::Config(format!(
                "engine {} has an empty command line",
                self.spec.name
            )));
        }

        info!("starting engine {} ({})", self.spec.name, resolved);
        let transport = Transport::spawn(
            &program,
            &args,
            self.spec.work_dir.as_deref(),
            self.cancel.clone(),
        )
        .map_err(|e| DumbarbError::Supervisor(format!("{} failed to start: {e}", self.spec.name)))?;
        self.transport = Some(transport);

        if self.spec.log_stderr {
            let path = ctx.match_dir.join("stderr").join(format!(
                "{}-{}.err",
                ctx.match_dir.file_name().unwrap_or_default().to_string_lossy(),
                self.spec.name
            ));
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.stderr_log = Some(OpenOptions::new().create(true).append(true).open(path)?);
        }

        let commands_resp = self.command("list_commands", self.spec.gtp_initial_timeout)?;
        self.supported_commands = commands_resp
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();

        let name = self.command("name", self.timeouts.gtp_timeout).unwrap_or_default();
        let version = self
            .command("version", self.timeouts.gtp_timeout)
            .unwrap_or_default();
        self.reported_name = name.trim().to_string();
        self.reported_version = version.trim().to_string();
        info!(
            "engine {} reports as {} {}",
            self.spec.name, self.reported_name, self.reported_version
        );

        if first_start {
            self.run_hooks(&self.spec.pre_match.clone(), "PreMatch")?;
        }

        Ok(())
    }

    /// Runs this engine's `PreGame` hooks. Failures are fatal: the game
    /// cannot proceed with the engine in an unknown state.
    pub fn run_pre_game(&mut self) -> Result<(), DumbarbError> {
        self.run_hooks(&self.spec.pre_game.clone(), "PreGame")
    }

    /// Runs this engine's `PostGame` hooks best-effort: failures are logged
    /// but never change the game outcome (see DESIGN.md's Open Questions).
    pub fn run_post_game(&mut self) {
        for cmd in self.spec.post_game.clone() {
            if let Err(e) = self.command(&cmd, self.timeouts.gtp_timeout) {
                warn!("{}: PostGame command '{cmd}' failed: {e}", self.spec.name);
            }
        }
    }

    /// Runs this engine's `PostMatch` hooks best-effort.
    pub fn run_post_match(&mut self) {
        for cmd in self.spec.post_match.clone() {
            if let Err(e) = self.command(&cmd, self.timeouts.gtp_timeout) {
                warn!("{}: PostMatch command '{cmd}' failed: {e}", self.spec.name);
            }
        }
    }

    fn run_hooks(&mut self, commands: &[String], label: &str) -> Result<(), DumbarbError> {
        for cmd in commands {
            self.command(cmd, self.timeouts.gtp_timeout).map_err(|e| {
                DumbarbError::Supervisor(format!(
                    "{}: {label} command '{cmd}' failed: {e}",
                    self.spec.name
                ))
            })?;
        }
        Ok(())
    }

    /// Sends one command with an explicit timeout and returns its body,
    /// folding an `EngineError` into a `GtpError` the caller can match on.
    pub fn command(&mut self, cmd: &str, timeout: Duration) -> Result<String, GtpError> {
        self.drain_stderr();
        let transport = self
            .transport
            .as_mut()
            .ok_or(GtpError::ChannelClosed)?;
        let response = transport.send(cmd, timeout)?;
        self.drain_stderr();
        response.into_ok()
    }

    /// Sends `genmove` with the caller-computed deadline and returns the
    /// raw response, without folding an engine-side error: the game driver
    /// needs to see `Response::ok` to distinguish `resign`/`pass` bodies
    /// from a protocol failure.
    pub fn genmove(&mut self, color: &str, timeout: Duration) -> Result<Response, GtpError> {
        self.drain_stderr();
        let transport = self
            .transport
            .as_mut()
            .ok_or(GtpError::ChannelClosed)?;
        let response = transport.send(&format!("genmove {color}"), timeout)?;
        self.drain_stderr();
        Ok(response)
    }

    /// Whether Japanese-style `kgs-time_settings` should be used for this
    /// engine, based on whether it advertised the command in `list_commands`.
    pub fn wants_kgs_time_settings(&self) -> bool {
        self.supports("kgs-time_settings")
    }

    /// Points the stderr drain at a fresh per-game file
    /// (`stderr/<match>-<seq>-<enginename>.err`), replacing whichever file
    /// (if any) was open for the previous game or the startup handshake.
    /// A no-op when `LogStdErr` is unset.
    pub fn open_stderr_log(&mut self, path: &std::path::Path) -> std::io::Result<()> {
        if !self.spec.log_stderr {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.stderr_log = Some(OpenOptions::new().create(true).truncate(true).write(true).open(path)?);
        Ok(())
    }

    fn drain_stderr(&mut self) {
        let lines = match self.transport.as_ref() {
            Some(t) => t.drain_stderr(),
            None => return,
        };
        if lines.is_empty() {
            return;
        }
        if let Some(log) = self.stderr_log.as_mut() {
            for line in &lines {
                let _ = writeln!(log, "{line}");
            }
            let _ = log.flush();
        }
        if !self.spec.quiet {
            for line in &lines {
                eprintln!("[{}] {line}", self.spec.name);
            }
        }
    }

    /// Kills the child (short grace, then force) and increments the
    /// restart counter, re-running `start`. Does not re-run `PreMatch`.
    pub fn restart(&mut self, ctx: &TemplateContext, reason: &str) -> Result<(), DumbarbError> {
        warn!("restarting engine {} ({reason})", self.spec.name);
        if let Some(mut transport) = self.transport.take() {
            transport.kill_and_reap(Duration::from_millis(500));
        }
        self.restart_count += 1;
        self.start(ctx, false)
    }

    /// Sends `quit`, ignoring errors, then ensures the process is reaped.
    pub fn quit(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            let _ = transport.send("quit", self.timeouts.gtp_timeout);
        }
        if let Some(mut transport) = self.transport.take() {
            transport.kill_and_reap(Duration::from_millis(500));
        }
    }

    pub fn is_running(&self) -> bool {
        self.transport.is_some()
    }
}

/// Builds the `time_settings`/`kgs-time_settings` command to send before a
/// game, per the engine's advertised support.
pub fn time_settings_command(
    system: TimeSystem,
    main_time: f64,
    period_time: f64,
    period_count: u32,
    use_kgs: bool,
) -> String {
    if use_kgs && matches!(system, TimeSystem::Japanese) {
        format!("kgs-time_settings byoyomi {main_time} {period_time} {period_count}")
    } else {
        match system {
            TimeSystem::None => "time_settings 0 0 0".to_string(),
            TimeSystem::Absolute => format!("time_settings {main_time} 0 0"),
            TimeSystem::Canadian => {
                format!("time_settings {main_time} {period_time} {period_count}")
            }
            // Engines without kgs-time_settings get Japanese byo-yomi
            // approximated as Canadian with periodCount stones per period
            TimeSystem::Japanese => {
                format!("time_settings {main_time} {period_time} {period_count}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn japanese_without_kgs_support_falls_back_to_time_settings() {
        let cmd = time_settings_command(TimeSystem::Japanese, 0.0, 10.0, 3, false);
        assert_eq!(cmd, "time_settings 0 10 3");
    }

    #[test]
    fn japanese_with_kgs_support_uses_byoyomi_variant() {
        let cmd = time_settings_command(TimeSystem::Japanese, 0.0, 10.0, 3, true);
        assert_eq!(cmd, "kgs-time_settings byoyomi 0 10 3");
    }

    #[test]
    fn absolute_zeros_the_period_fields() {
        let cmd = time_settings_command(TimeSystem::Absolute, 300.0, 0.0, 0, false);
        assert_eq!(cmd, "time_settings 300 0 0");
    }
}
