//! End-to-end coverage driving the real transport -> supervisor -> game
//! driver stack against disposable `/bin/sh` GTP engines, for the
//! scenarios that need more than one process talking to each other
//! (spec.md §8 S4-S6; S1-S3 are covered by unit tests next to the code
//! they exercise).

use std::time::Duration;

use dumbarb::cancel::Cancel;
use dumbarb::engine::spec::{EngineSpec, TemplateContext};
use dumbarb::engine::supervisor::{EngineRole, EngineSupervisor, GtpTimeouts};
use dumbarb::game::{play_game, GameOutcome, GameSettings, PlayGameArgs};
use dumbarb::time_control::{TimeSettings, TimeSystem};

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

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn started(spec: EngineSpec, role: EngineRole, cancel: Cancel) -> EngineSupervisor {
    let mut engine = EngineSupervisor::new(role, spec, GtpTimeouts::default(), cancel);
    let dir = std::env::temp_dir();
    let ctx = TemplateContext {
        name: "test",
        match_dir: &dir,
        board_size: 9,
        komi: 6.5,
        main_time: 0.0,
        period_time: 0.0,
        period_count: 1,
        time_system: TimeSystem::None,
    };
    engine.start(&ctx, true).expect("engine starts");
    engine
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

/// Responds `= ok` to every handshake/setup command and then hands out
/// moves in order, popping one off the front per `genmove` and falling
/// back to `pass` once exhausted. Avoids `{`/`}` entirely since the
/// command line goes through the placeholder-template resolver first.
fn scripted_engine(moves: &[&str]) -> String {
    let mut script = String::from("set -- ");
    script.push_str(&moves.join(" "));
    script.push_str(
        "\nwhile IFS= read -r line; do\n  case \"$line\" in\n    genmove*)\n      mv=$1\n      if [ -z \"$mv\" ]; then mv=pass; fi\n      shift 2>/dev/null || true\n      echo \"= $mv\"\n      ;;\n    *)\n      echo \"= \"\n      ;;\n  esac\n  echo\ndone\n",
    );
    script
}

#[test]
fn s4_consecutive_passes_are_scored_by_a_third_engine() {
    let cancel = Cancel::new();
    let mut engine_a = started(spec("engineA", &scripted_engine(&["pass"])), EngineRole::EngineA, cancel.clone());
    let mut engine_b = started(spec("engineB", &scripted_engine(&["pass"])), EngineRole::EngineB, cancel.clone());

    let scorer_script = r#"
while IFS= read -r line; do
  case "$line" in
    final_score*) echo "= W+7.5" ;;
    *) echo "= " ;;
  esac
  echo
done
"#;
    let mut scorer = started(spec("scorer", scorer_script), EngineRole::Scorer, cancel.clone());

    let settings = untimed_settings();
    let timeouts = GtpTimeouts::default();
    let output = play_game(PlayGameArgs {
        seq: 1,
        settings: &settings,
        engine_a: &mut engine_a,
        engine_b: &mut engine_b,
        engine_a_color: dumbarb::time_control::Color::Black,
        scorer: Some(&mut scorer),
        consecutive_passes_to_end: 2,
        enforce_time: false,
        move_wait: Duration::from_millis(0),
        timeouts: &timeouts,
        use_kgs_a: false,
        use_kgs_b: false,
        cancel: &cancel,
    });

    match output.result.outcome {
        GameOutcome::Score { loser, margin } => {
            assert_eq!(loser, dumbarb::time_control::Color::Black);
            assert_eq!(margin, "7.5");
        }
        other => panic!("expected Score outcome, got {other:?}"),
    }
    assert!(output.restarts.is_empty());
}

#[test]
fn s5_engine_crash_mid_game_is_reported_and_scheduled_for_restart() {
    let cancel = Cancel::new();
    // Engine A answers its first genmove normally, then its stdout closes
    // (process exits) on the second one.
    let crashy = r#"
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
"#;
    let mut engine_a = started(spec("engineA", crashy), EngineRole::EngineA, cancel.clone());
    let mut engine_b = started(spec("engineB", &scripted_engine(&["Q4", "Q5", "Q6"])), EngineRole::EngineB, cancel.clone());

    let settings = untimed_settings();
    let timeouts = GtpTimeouts::default();
    let output = play_game(PlayGameArgs {
        seq: 2,
        settings: &settings,
        engine_a: &mut engine_a,
        engine_b: &mut engine_b,
        engine_a_color: dumbarb::time_control::Color::Black,
        scorer: None,
        consecutive_passes_to_end: 2,
        enforce_time: false,
        move_wait: Duration::from_millis(0),
        timeouts: &timeouts,
        use_kgs_a: false,
        use_kgs_b: false,
        cancel: &cancel,
    });

    match output.result.outcome {
        GameOutcome::Error { reason, .. } => {
            assert_eq!(reason, dumbarb::game::ErrorReason::Crash);
        }
        other => panic!("expected a crash Error outcome, got {other:?}"),
    }
    assert!(!output.restarts.is_empty());
}

#[test]
fn resign_under_an_enforced_time_violation_ends_as_time_not_resign() {
    // spec.md §4.4 step (c) runs before step (d)'s resign/pass parsing: a
    // clock violation on the very move that resigned must still end the
    // game as `Time`, not `Resign`, so invariant 4 (no violation survives
    // a non-`Time` outcome under enforcement) holds.
    let cancel = Cancel::new();
    let slow_resign = r#"
while IFS= read -r line; do
  case "$line" in
    genmove*) sleep 0.3; echo "= resign" ;;
    *) echo "= " ;;
  esac
  echo
done
"#;
    let mut engine_a = started(spec("engineA", slow_resign), EngineRole::EngineA, cancel.clone());
    let mut engine_b = started(spec("engineB", &scripted_engine(&["Q4"])), EngineRole::EngineB, cancel.clone());

    let settings = GameSettings {
        board_size: 9,
        komi: 6.5,
        time: TimeSettings {
            system: TimeSystem::Canadian,
            main_time: 0.0,
            period_time: 0.1,
            period_count: 1,
            tolerance: 0.0,
        },
    };
    let timeouts = GtpTimeouts::default();
    let output = play_game(PlayGameArgs {
        seq: 4,
        settings: &settings,
        engine_a: &mut engine_a,
        engine_b: &mut engine_b,
        engine_a_color: dumbarb::time_control::Color::Black,
        scorer: None,
        consecutive_passes_to_end: 2,
        enforce_time: true,
        move_wait: Duration::from_millis(0),
        timeouts: &timeouts,
        use_kgs_a: false,
        use_kgs_b: false,
        cancel: &cancel,
    });

    match output.result.outcome {
        GameOutcome::Time { loser } => assert_eq!(loser, dumbarb::time_control::Color::Black),
        other => panic!("expected Time outcome overriding the resign, got {other:?}"),
    }
    assert_eq!(output.result.violations.len(), 1);
}

#[test]
fn s6_illegal_move_claim_ends_the_game_with_the_mover_as_offender() {
    let cancel = Cancel::new();
    let mut engine_a = started(spec("engineA", &scripted_engine(&["D4"])), EngineRole::EngineA, cancel.clone());

    let rejecting_b = r#"
while IFS= read -r line; do
  case "$line" in
    play*) echo "? illegal move" ;;
    *) echo "= " ;;
  esac
  echo
done
"#;
    let mut engine_b = started(spec("engineB", rejecting_b), EngineRole::EngineB, cancel.clone());

    let settings = untimed_settings();
    let timeouts = GtpTimeouts::default();
    let output = play_game(PlayGameArgs {
        seq: 3,
        settings: &settings,
        engine_a: &mut engine_a,
        engine_b: &mut engine_b,
        engine_a_color: dumbarb::time_control::Color::Black,
        scorer: None,
        consecutive_passes_to_end: 2,
        enforce_time: false,
        move_wait: Duration::from_millis(0),
        timeouts: &timeouts,
        use_kgs_a: false,
        use_kgs_b: false,
        cancel: &cancel,
    });

    match output.result.outcome {
        GameOutcome::Illegal { offender } => {
            assert_eq!(offender, dumbarb::time_control::Color::Black);
        }
        other => panic!("expected Illegal outcome, got {other:?}"),
    }
}
