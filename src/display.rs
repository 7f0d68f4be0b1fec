//! Match progress display.
//!
//! The real output of a match is the file artifacts written alongside it,
//! not a terminal UI, so this stays to a single `indicatif` progress bar
//! across the match's games plus a `colored` one-line-per-game status —
//! scrollback-friendly and safe to redirect to a log file, unlike a
//! live-redrawing dashboard.

use indicatif::{ProgressBar, ProgressStyle};

use crate::colors::ThemeColor;
use crate::game::{GameOutcome, GameResult};

pub struct MatchProgress {
    bar: ProgressBar,
}

impl MatchProgress {
    pub fn new(num_games: u32, engine_a_name: &str, engine_b_name: &str) -> MatchProgress {
        let bar = ProgressBar::new(num_games as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{msg} [{bar:40.cyan/blue}] {pos}/{len} games ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        bar.set_message(format!("{engine_a_name} vs {engine_b_name}").primary().to_string());
        MatchProgress { bar }
    }

    /// Prints a one-line summary of a finished game above the bar, then
    /// advances it.
    pub fn report_game(&self, result: &GameResult) {
        let line = format!(
            "  game {:>3}: {}",
            result.seq,
            describe_outcome(result)
        );
        self.bar.println(line);
        self.bar.inc(1);
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

fn describe_outcome(result: &GameResult) -> String {
    let name_of = |color: crate::time_control::Color| -> &str {
        if color == result.engine_a_color {
            &result.engine_a_name
        } else {
            &result.engine_b_name
        }
    };
    match &result.outcome {
        GameOutcome::Resign { loser } => {
            format!("{} wins by resignation", name_of(loser.opponent())).success().to_string()
        }
        GameOutcome::Score { loser, margin } => {
            format!("{} wins by {margin}", name_of(loser.opponent())).success().to_string()
        }
        GameOutcome::Time { loser } => {
            format!("{} loses on time", name_of(*loser)).failure().to_string()
        }
        GameOutcome::Illegal { offender } => {
            format!("illegal move claimed against {}", name_of(*offender)).danger().to_string()
        }
        GameOutcome::Passed => "passed out, unscored".subtext().to_string(),
        GameOutcome::Jigo => "jigo".info().to_string(),
        GameOutcome::Unfinished => "unfinished".warning().to_string(),
        GameOutcome::Error { detail, .. } => format!("error: {detail}").danger().to_string(),
    }
}
