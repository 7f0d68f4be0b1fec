//! End-to-end coverage of `MatchRunner::run` itself, not just the game
//! driver it calls: the restart-after-crash sequencing in spec.md §4.4
//! step (c) / §4.5's error table ("Restart fails -> terminate match;
//! remaining games -> Unfinished") is only observable by actually running
//! a match across more than one game.

use std::time::Duration;

use dumbarb::cancel::Cancel;
use dumbarb::display::MatchProgress;
use dumbarb::engine::spec::EngineSpec;
use dumbarb::engine::supervisor::GtpTimeouts;
use dumbarb::game::GameSettings;
use dumbarb::match_runner::{MatchPlan, MatchRunner, Waits};
use dumbarb::time_control::{TimeSettings, TimeSystem};

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn spec(name: &str, script: &str) -> EngineSpec {
    EngineSpec {
        name: name.to_string(),
        cmd_line: format!("/bin/sh -c {}", shell_quote(script)),
        work_dir: None,
        quiet: true,
        log_stderr: false,
        gtp_initial_timeout: Duration::from_secs(2),
        pre_match: Vec::new(),
        post_match: Vec::new(),
        pre_game: Vec::new(),
        post_game: Vec::new(),
    }
}

fn scripted_engine(moves: &[&str]) -> String {
    let mut script = String::from("set -- ");
    script.push_str(&moves.join(" "));
    script.push_str(
        "\nwhile IFS= read -r line; do\n  case \"$line\" in\n    genmove*)\n      mv=$1\n      if [ -z \"$mv\" ]; then mv=pass; fi\n      shift 2>/dev/null || true\n      echo \"= $mv\"\n      ;;\n    *)\n      echo \"= \"\n      ;;\n  esac\n  echo\ndone\n",
    );
    script
}

/// Answers the handshake normally and plays one move, then exits (process
/// death) on its second `genmove` -- the first restart trigger. On any
/// later start (the restart itself, and its retry) `marker_path` already
/// exists, so the script exits before reading a single line: the restart's
/// handshake never completes and `EngineSupervisor::restart` fails both
/// its attempt and its retry.
fn crash_then_refuse_to_restart(marker_path: &std::path::Path) -> String {
    format!(
        r#"
MARKER={}
if [ -f "$MARKER" ]; then
  exit 1
fi
touch "$MARKER"
n=0
while IFS= read -r line; do
  case "$line" in
    genmove*)
      n=$((n+1))
      if [ "$n" -ge 2 ]; then
        exit 0
      fi
      echo "= D4"
      ;;
    *) echo "= " ;;
  esac
  echo
done
"#,
        shell_quote(marker_path.to_str().expect("utf8 temp path"))
    )
}

fn untimed_settings() -> GameSettings {
    GameSettings {
        board_size: 9,
        komi: 6.5,
        time: TimeSettings {
            system: TimeSystem::None,
            main_time: 0.0,
            period_time: 0.0,
            period_count: 1,
            tolerance: -1.0,
        },
    }
}

#[test]
fn a_failed_restart_keeps_the_just_finished_games_real_outcome() {
    let match_dir = std::env::temp_dir().join(format!(
        "dumbarb-restart-fail-test-{}-{}",
        std::process::id(),
        "a_failed_restart_keeps_the_just_finished_games_real_outcome"
    ));
    let _ = std::fs::remove_dir_all(&match_dir);
    let marker = match_dir.join("started-once");

    let plan = MatchPlan {
        match_name: "m".to_string(),
        match_dir: match_dir.clone(),
        engine_a: spec("engineA", &crash_then_refuse_to_restart(&marker)),
        engine_b: spec("engineB", &scripted_engine(&["Q4", "Q5", "Q6", "Q7", "Q8"])),
        scorer: None,
        settings: untimed_settings(),
        num_games: 3,
        waits: Waits {
            match_wait: Duration::from_millis(0),
            game_wait: Duration::from_millis(0),
            move_wait: Duration::from_millis(0),
        },
        gtp_timeouts: GtpTimeouts::default(),
        consecutive_passes_to_end: 2,
        enforce_time: false,
        disable_sgf: true,
    };

    let cancel = Cancel::new();
    let mut runner = MatchRunner::new(plan, cancel).expect("match runner constructs");
    let progress = MatchProgress::new(3, "engineA", "engineB");

    let err = runner.run(&progress).expect_err("restart failure terminates the match");
    assert!(err.to_string().contains("failed to restart after one retry"));

    let log = std::fs::read_to_string(match_dir.join("m.log")).expect("log file written");
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 3, "every game gets a line, finished or not: {lines:?}");

    // Game 1: engineA crashed mid-game (its real outcome), not a generic
    // restart-failure placeholder.
    assert!(lines[0].contains("[#1]"));
    assert!(lines[0].contains("ERR EE"), "game 1 line: {}", lines[0]);

    // Games 2 and 3 never ran: the failed restart terminates the match and
    // they're recorded Unfinished.
    assert!(lines[1].contains("[#2]"));
    assert!(lines[1].contains("UFIN XX"), "game 2 line: {}", lines[1]);
    assert!(lines[2].contains("[#3]"));
    assert!(lines[2].contains("UFIN XX"), "game 3 line: {}", lines[2]);

    let _ = std::fs::remove_dir_all(&match_dir);
}
