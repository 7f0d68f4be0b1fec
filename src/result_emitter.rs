//! Result emitter (component F): formats the `.log`/`.mvtimes`/`.run`/SGF/
//! stderr artifacts a match leaves behind (spec.md §4.6, exact grammar in
//! §6). Every write is flushed immediately after a game so an abrupt
//! termination leaves a consistent prefix, per spec.md §4.6's durability
//! requirement.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use chrono::Local;

use crate::error::Result;
use crate::game::{ErrorReason, GameOutcome, GameResult};
use crate::time_control::Color;

fn color_letter(color: Color) -> &'static str {
    match color {
        Color::Black => "B",
        Color::White => "W",
    }
}

/// `<winner|Jigo|None|UFIN|ERR>` and `<reason>` tokens of the `.log` line
/// (spec.md §6), derived from a `GameOutcome` plus the two engine names.
fn outcome_fields(result: &GameResult) -> (String, String) {
    let name_of = |color: Color| -> String {
        if color == result.engine_a_color {
            result.engine_a_name.clone()
        } else {
            result.engine_b_name.clone()
        }
    };
    match &result.outcome {
        GameOutcome::Resign { loser } => {
            let winner = loser.opponent();
            (name_of(winner), format!("{}+Resign", color_letter(winner)))
        }
        GameOutcome::Score { loser, margin } => {
            let winner = loser.opponent();
            (name_of(winner), format!("{}+{margin}", color_letter(winner)))
        }
        GameOutcome::Time { loser } => {
            let winner = loser.opponent();
            (name_of(winner), format!("{}+Time", color_letter(winner)))
        }
        GameOutcome::Illegal { .. } => ("ERR".to_string(), "IL".to_string()),
        GameOutcome::Passed => ("None".to_string(), "==".to_string()),
        GameOutcome::Jigo => ("Jigo".to_string(), "==".to_string()),
        GameOutcome::Unfinished => ("UFIN".to_string(), "XX".to_string()),
        GameOutcome::Error { reason, .. } => (
            "ERR".to_string(),
            match reason {
                ErrorReason::Crash => "EE".to_string(),
                ErrorReason::Protocol => "XX".to_string(),
                ErrorReason::Scorer => "SD".to_string(),
            },
        ),
    }
}

/// The SGF `RE[]` result token (standard SGF, independent of the `.log`
/// reason vocabulary).
fn sgf_result(result: &GameResult) -> String {
    match &result.outcome {
        GameOutcome::Resign { loser } => format!("{}+R", color_letter(loser.opponent())),
        GameOutcome::Score { loser, margin } => {
            format!("{}+{margin}", color_letter(loser.opponent()))
        }
        GameOutcome::Time { loser } => format!("{}+T", color_letter(loser.opponent())),
        GameOutcome::Jigo => "0".to_string(),
        GameOutcome::Illegal { .. }
        | GameOutcome::Passed
        | GameOutcome::Unfinished
        | GameOutcome::Error { .. } => "Void".to_string(),
    }
}

/// Formats the `.log` line for one game (spec.md §6's whitespace-separated
/// grammar).
pub fn format_log_line(result: &GameResult) -> String {
    let (winner, reason) = outcome_fields(result);
    let vio = if result.violations.is_empty() {
        "None".to_string()
    } else {
        result
            .violations
            .iter()
            .map(|v| format!("{} {}[{:.2}]", v.engine_name, v.move_num, v.elapsed))
            .collect::<Vec<_>>()
            .join(",")
    };
    format!(
        "{} [#{}] {} {} {} {} = {} {} {} {} {} {:.2} {:.2} {:.2} {:.2} {:.2} {:.2} VIO: {}",
        result.timestamp.format("%y%m%d-%H:%M:%S"),
        result.seq,
        result.engine_a_name,
        color_letter(result.engine_a_color),
        result.engine_b_name,
        color_letter(result.engine_b_color()),
        winner,
        reason,
        result.total_moves(),
        result.side_a.move_count,
        result.side_b.move_count,
        result.side_a.total_think,
        result.side_a.avg_think,
        result.side_a.max_think,
        result.side_b.total_think,
        result.side_b.avg_think,
        result.side_b.max_think,
        vio,
    )
}

/// `[#N] <coord1>[<t1>] ...` (spec.md §6 move-times grammar).
pub fn format_mvtimes_line(result: &GameResult) -> String {
    format!(
        "[#{}] {}",
        result.seq,
        crate::game::format_move_times(&result.moves)
    )
}

/// Maps a GTP vertex onto an SGF point. GTP columns skip `I`; SGF rows count
/// from the top while GTP rows count from the bottom, so this is not a pure
/// relabelling. `pass`/`resign` carry no point (pass is an empty SGF value;
/// resign is recorded only in `RE[]`, never as a move node).
fn vertex_to_sgf(vertex: &str, board_size: u32) -> Option<String> {
    let v = vertex.trim();
    if v.eq_ignore_ascii_case("pass") {
        return Some(String::new());
    }
    if v.eq_ignore_ascii_case("resign") {
        return None;
    }
    let mut chars = v.chars();
    let col_char = chars.next()?.to_ascii_uppercase();
    if !col_char.is_ascii_alphabetic() || col_char == 'I' {
        return None;
    }
    let col_index = if col_char > 'I' {
        col_char as u32 - 'A' as u32 - 1
    } else {
        col_char as u32 - 'A' as u32
    };
    let row: u32 = chars.as_str().parse().ok()?;
    if row == 0 || row > board_size || col_index >= board_size {
        return None;
    }
    let sgf_col = (b'a' + col_index as u8) as char;
    let sgf_row = (b'a' + (board_size - row) as u8) as char;
    Some(format!("{sgf_col}{sgf_row}"))
}

fn escape_sgf_text(text: &str) -> String {
    text.replace('\\', "\\\\").replace(']', "\\]")
}

/// Renders one game's SGF record (spec.md §4.6/§6): a stable format so a
/// byte-equal comparison minus the first line identifies identical games
/// (the first line is the only one carrying a timestamp).
pub fn format_sgf(result: &GameResult, board_size: u32, komi: f32) -> String {
    let black_name = if result.engine_a_color == Color::Black {
        &result.engine_a_name
    } else {
        &result.engine_b_name
    };
    let white_name = if result.engine_a_color == Color::White {
        &result.engine_a_name
    } else {
        &result.engine_b_name
    };
    let mut out = format!(
        "(;GM[1]FF[4]SZ[{board_size}]KM[{komi}]PB[{}]PW[{}]DT[{}]RE[{}]\n",
        escape_sgf_text(black_name),
        escape_sgf_text(white_name),
        result.timestamp.format("%Y-%m-%d"),
        sgf_result(result),
    );
    for mv in &result.moves {
        if let Some(point) = vertex_to_sgf(&mv.coord, board_size) {
            out.push_str(&format!(";{}[{point}]\n", color_letter(mv.color)));
        }
    }
    out.push(')');
    out
}

/// Owns the three append-only per-match files plus the SGF/stderr
/// directories.
pub struct ResultEmitter {
    match_dir: PathBuf,
    match_name: String,
    disable_sgf: bool,
    board_size: u32,
    komi: f32,
    log_file: BufWriter<File>,
    mvtimes_file: BufWriter<File>,
    run_file: BufWriter<File>,
}

impl ResultEmitter {
    pub fn new(
        match_dir: &std::path::Path,
        match_name: &str,
        disable_sgf: bool,
        board_size: u32,
        komi: f32,
    ) -> Result<ResultEmitter> {
        std::fs::create_dir_all(match_dir)?;
        if !disable_sgf {
            std::fs::create_dir_all(match_dir.join("SGFs"))?;
        }
        let open = |suffix: &str| -> std::io::Result<BufWriter<File>> {
            Ok(BufWriter::new(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(match_dir.join(format!("{match_name}.{suffix}")))?,
            ))
        };
        Ok(ResultEmitter {
            match_dir: match_dir.to_path_buf(),
            match_name: match_name.to_string(),
            disable_sgf,
            board_size,
            komi,
            log_file: open("log")?,
            mvtimes_file: open("mvtimes")?,
            run_file: open("run")?,
        })
    }

    /// Appends a timestamped free-form trace line to the `.run` file
    /// (engine handshakes, restart events, scorer-fallback notes, …).
    pub fn note(&mut self, message: &str) {
        let _ = writeln!(
            self.run_file,
            "{} {message}",
            Local::now().format("%y%m%d-%H:%M:%S")
        );
        let _ = self.run_file.flush();
    }

    /// Records a restart event in the `.run` trace (spec.md §8 invariant 6:
    /// the restart counter increases by exactly one per event).
    pub fn note_restart(&mut self, engine_name: &str, restart_count: u32, reason: &str) {
        self.note(&format!(
            "{engine_name} restarted (restart #{restart_count}): {reason}"
        ));
    }

    /// Writes the `.log`, `.mvtimes`, and SGF artifacts for a finished game,
    /// flushing every stream.
    pub fn record_game(&mut self, result: &GameResult) -> Result<()> {
        writeln!(self.log_file, "{}", format_log_line(result))?;
        self.log_file.flush()?;

        writeln!(self.mvtimes_file, "{}", format_mvtimes_line(result))?;
        self.mvtimes_file.flush()?;

        if !self.disable_sgf {
            let sgf_path = self
                .match_dir
                .join("SGFs")
                .join(format!("{}-{}.sgf", self.match_name, result.seq));
            std::fs::write(sgf_path, format_sgf(result, self.board_size, self.komi))?;
        }

        Ok(())
    }

    /// Records a game that was never played (match cancelled or terminated
    /// mid-run) as `Unfinished`, per spec.md §4.5's "remaining games
    /// recorded as Unfinished".
    pub fn record_unfinished(
        &mut self,
        seq: u32,
        engine_a_name: &str,
        engine_b_name: &str,
        engine_a_color: Color,
    ) -> Result<()> {
        let result = GameResult {
            seq,
            timestamp: Local::now(),
            engine_a_name: engine_a_name.to_string(),
            engine_b_name: engine_b_name.to_string(),
            engine_a_color,
            outcome: GameOutcome::Unfinished,
            moves: Vec::new(),
            side_a: Default::default(),
            side_b: Default::default(),
            violations: Vec::new(),
        };
        writeln!(self.log_file, "{}", format_log_line(&result))?;
        self.log_file.flush()?;
        Ok(())
    }

    /// Path the engine supervisor should open for a game's stderr capture
    /// (spec.md §4.6: `stderr/<match>-<seq>-<enginename>.err`).
    pub fn stderr_path(&self, seq: u32, engine_name: &str) -> PathBuf {
        crate::game::match_dir_stderr_path(&self.match_dir, &self.match_name, seq, engine_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{MoveRecord, SideStats};
    use chrono::TimeZone;

    fn sample_result(outcome: GameOutcome) -> GameResult {
        GameResult {
            seq: 3,
            timestamp: Local.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap(),
            engine_a_name: "gnugo".to_string(),
            engine_b_name: "pachi".to_string(),
            engine_a_color: Color::Black,
            outcome,
            moves: vec![
                MoveRecord { color: Color::Black, coord: "D4".into(), elapsed: 1.0 },
                MoveRecord { color: Color::White, coord: "Q16".into(), elapsed: 2.0 },
            ],
            side_a: SideStats { move_count: 1, total_think: 1.0, avg_think: 1.0, max_think: 1.0 },
            side_b: SideStats { move_count: 1, total_think: 2.0, avg_think: 2.0, max_think: 2.0 },
            violations: Vec::new(),
        }
    }

    #[test]
    fn s1_black_resigns_produces_w_resign() {
        let result = sample_result(GameOutcome::Resign { loser: Color::Black });
        let (winner, reason) = outcome_fields(&result);
        assert_eq!(winner, "pachi");
        assert_eq!(reason, "W+Resign");
    }

    #[test]
    fn log_line_matches_spec_grammar_field_count() {
        let result = sample_result(GameOutcome::Resign { loser: Color::Black });
        let line = format_log_line(&result);
        // timestamp, [#N], engA, colA, engB, colB, '=', winner, reason,
        // totalMoves, mvA, mvB, ttA, avgA, maxA, ttB, avgB, maxB, 'VIO:', value
        assert_eq!(line.split_whitespace().count(), 19);
        assert!(line.contains("VIO: None"));
    }

    #[test]
    fn illegal_move_logs_err_il() {
        let result = sample_result(GameOutcome::Illegal { offender: Color::Black });
        let (winner, reason) = outcome_fields(&result);
        assert_eq!(winner, "ERR");
        assert_eq!(reason, "IL");
    }

    #[test]
    fn scorer_failure_logs_err_sd() {
        let result = sample_result(GameOutcome::Error {
            detail: "boom".into(),
            reason: ErrorReason::Scorer,
        });
        let (winner, reason) = outcome_fields(&result);
        assert_eq!(winner, "ERR");
        assert_eq!(reason, "SD");
    }

    #[test]
    fn vertex_to_sgf_flips_row_and_skips_i_column() {
        // 19x19: D4 -> column index 3 ('d'), row 19-4=15 -> 'p'.
        assert_eq!(vertex_to_sgf("D4", 19).as_deref(), Some("dp"));
        // J column follows I in GTP letters but is index 8, not 9.
        assert_eq!(vertex_to_sgf("J10", 19).as_deref(), Some("ij"));
        assert_eq!(vertex_to_sgf("pass", 19).as_deref(), Some(""));
        assert_eq!(vertex_to_sgf("resign", 19), None);
    }

    #[test]
    fn sgf_round_trips_move_count() {
        let result = sample_result(GameOutcome::Jigo);
        let sgf = format_sgf(&result, 19, 6.5);
        let move_nodes = sgf.matches(";B[").count() + sgf.matches(";W[").count();
        assert_eq!(move_nodes, result.moves.len());
        assert!(sgf.contains("RE[0]"));
    }

    #[test]
    fn mvtimes_line_has_game_number_prefix() {
        let result = sample_result(GameOutcome::Jigo);
        assert_eq!(format_mvtimes_line(&result), "[#3] D4[1.00] Q16[2.00]");
    }
}
