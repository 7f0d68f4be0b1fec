//! Time-control ledger (component C): per-side clock state machine for the
//! four time systems, consuming a measured `elapsed` after every `genmove`
//! and reporting whether the move violated the clock.

use crate::error::DumbarbError;

/// Which side a clock/move/outcome refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Black,
    White,
}

impl Color {
    pub fn opponent(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    pub fn as_gtp(self) -> &'static str {
        match self {
            Color::Black => "black",
            Color::White => "white",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSystem {
    None,
    Absolute,
    Canadian,
    Japanese,
}

impl TimeSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeSystem::None => "none",
            TimeSystem::Absolute => "absolute",
            TimeSystem::Canadian => "canadian",
            TimeSystem::Japanese => "japanese",
        }
    }
}

/// `{ system, mainTime, periodTime, periodCount, tolerance }` from spec.md §3.
/// All times in seconds; `tolerance` of `-1` disables violation checking
/// entirely (every move is accepted, `deduct` always reports no violation).
#[derive(Debug, Clone, Copy)]
pub struct TimeSettings {
    pub system: TimeSystem,
    pub main_time: f64,
    pub period_time: f64,
    pub period_count: u32,
    pub tolerance: f64,
}

impl TimeSettings {
    pub fn validate(&self) -> Result<(), DumbarbError> {
        if self.main_time < 0.0 || self.period_time < 0.0 {
            return Err(DumbarbError::Config(
                "time settings must be non-negative".into(),
            ));
        }
        if matches!(self.system, TimeSystem::Canadian | TimeSystem::Japanese)
            && (self.period_time <= 0.0 || self.period_count < 1)
        {
            return Err(DumbarbError::Config(
                "Canadian/Japanese byo-yomi require periodTime > 0 and periodCount >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Checking is disabled when tolerance is negative (spec.md §3: "-1 disables checking").
    fn checking_enabled(&self) -> bool {
        self.tolerance >= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Main,
    Period,
}

/// Per-side, per-game clock state (spec.md §3 `ClockState`).
#[derive(Debug, Clone, Copy)]
pub struct ClockState {
    pub phase: Phase,
    pub main_left: f64,
    pub period_left: f64,
    pub stones_left: u32,
    pub periods_left: i32,
    pub violated: bool,
}

impl ClockState {
    fn initial(settings: &TimeSettings) -> ClockState {
        match settings.system {
            TimeSystem::None => ClockState {
                phase: Phase::Main,
                main_left: f64::INFINITY,
                period_left: 0.0,
                stones_left: 0,
                periods_left: 0,
                violated: false,
            },
            TimeSystem::Absolute => ClockState {
                phase: Phase::Main,
                main_left: settings.main_time,
                period_left: 0.0,
                stones_left: 0,
                periods_left: 0,
                violated: false,
            },
            TimeSystem::Canadian => ClockState {
                phase: Phase::Main,
                main_left: settings.main_time,
                period_left: settings.period_time,
                stones_left: settings.period_count,
                periods_left: 0,
                violated: false,
            },
            TimeSystem::Japanese => ClockState {
                phase: Phase::Main,
                main_left: settings.main_time,
                period_left: settings.period_time,
                stones_left: 0,
                periods_left: settings.period_count as i32,
                violated: false,
            },
        }
    }
}

/// Owns both sides' clocks for one game.
pub struct TimeTracker {
    settings: TimeSettings,
    black: ClockState,
    white: ClockState,
}

impl TimeTracker {
    pub fn new(settings: TimeSettings) -> TimeTracker {
        TimeTracker {
            black: ClockState::initial(&settings),
            white: ClockState::initial(&settings),
            settings,
        }
    }

    pub fn reset(&mut self) {
        self.black = ClockState::initial(&self.settings);
        self.white = ClockState::initial(&self.settings);
    }

    pub fn settings(&self) -> &TimeSettings {
        &self.settings
    }

    pub fn is_timed(&self) -> bool {
        !matches!(self.settings.system, TimeSystem::None)
    }

    pub fn state(&self, color: Color) -> &ClockState {
        match color {
            Color::Black => &self.black,
            Color::White => &self.white,
        }
    }

    fn state_mut(&mut self, color: Color) -> &mut ClockState {
        match color {
            Color::Black => &mut self.black,
            Color::White => &mut self.white,
        }
    }

    /// Consumes `elapsed` seconds off `color`'s clock after a `genmove`.
    /// Returns `true` if this move violated the clock (and was clamped per
    /// spec.md §4.3's "after a violation without enforcement" rules).
    pub fn deduct(&mut self, color: Color, elapsed: f64) -> bool {
        let tolerance = if self.settings.checking_enabled() {
            self.settings.tolerance
        } else {
            f64::INFINITY
        };
        let settings = self.settings;
        let state = self.state_mut(color);
        let violated = match settings.system {
            TimeSystem::None => false,
            TimeSystem::Absolute => deduct_absolute(state, elapsed, tolerance),
            TimeSystem::Canadian => deduct_canadian(state, &settings, elapsed, tolerance),
            TimeSystem::Japanese => deduct_japanese(state, &settings, elapsed, tolerance),
        };
        if violated {
            state.violated = true;
        }
        violated
    }

    /// Upper bound on time `color` could still legally spend before a clock
    /// violation (spec.md §4.3's genmove timeout budget, before the
    /// caller adds `GtpGenmoveExtra`).
    pub fn remaining_budget(&self, color: Color) -> f64 {
        let state = self.state(color);
        match self.settings.system {
            TimeSystem::None => f64::INFINITY,
            TimeSystem::Absolute => state.main_left + self.settings.period_time,
            TimeSystem::Canadian => state.main_left + self.settings.period_time,
            TimeSystem::Japanese => {
                state.main_left + state.periods_left.max(0) as f64 * self.settings.period_time
            }
        }
    }

    /// `(S, M)` to send in a `time_left` command: seconds remaining in the
    /// active phase, and stones (Canadian) or periods (Japanese) remaining,
    /// 0 otherwise.
    pub fn time_left_args(&self, color: Color) -> (f64, u32) {
        let state = self.state(color);
        match (self.settings.system, state.phase) {
            (TimeSystem::None, _) => (0.0, 0),
            (TimeSystem::Absolute, _) => (state.main_left, 0),
            (TimeSystem::Canadian, Phase::Main) => (state.main_left, 0),
            (TimeSystem::Canadian, Phase::Period) => (state.period_left, state.stones_left),
            (TimeSystem::Japanese, Phase::Main) => (state.main_left, 0),
            (TimeSystem::Japanese, Phase::Period) => {
                (state.period_left, state.periods_left.max(0) as u32)
            }
        }
    }
}

fn deduct_absolute(state: &mut ClockState, elapsed: f64, tolerance: f64) -> bool {
    state.main_left -= elapsed;
    let violated = state.main_left < -tolerance;
    if violated {
        state.main_left = 0.0;
    }
    violated
}

fn deduct_canadian(
    state: &mut ClockState,
    settings: &TimeSettings,
    elapsed: f64,
    tolerance: f64,
) -> bool {
    if state.phase == Phase::Main {
        if elapsed <= state.main_left {
            state.main_left -= elapsed;
            return false;
        }
        let residual = elapsed - state.main_left;
        state.main_left = 0.0;
        state.phase = Phase::Period;
        state.period_left = settings.period_time;
        state.stones_left = settings.period_count;
        apply_canadian_period_move(state, settings, residual, tolerance)
    } else {
        apply_canadian_period_move(state, settings, elapsed, tolerance)
    }
}

fn apply_canadian_period_move(
    state: &mut ClockState,
    settings: &TimeSettings,
    elapsed: f64,
    tolerance: f64,
) -> bool {
    state.period_left -= elapsed;
    state.stones_left = state.stones_left.saturating_sub(1);
    if state.stones_left == 0 {
        let violated = state.period_left < -tolerance;
        state.period_left = settings.period_time;
        state.stones_left = if violated { 1 } else { settings.period_count };
        violated
    } else {
        false
    }
}

fn deduct_japanese(
    state: &mut ClockState,
    settings: &TimeSettings,
    elapsed: f64,
    tolerance: f64,
) -> bool {
    if state.phase == Phase::Main {
        if elapsed <= state.main_left {
            state.main_left -= elapsed;
            return false;
        }
        let residual = elapsed - state.main_left;
        state.main_left = 0.0;
        state.phase = Phase::Period;
        state.periods_left = settings.period_count as i32;
        state.period_left = settings.period_time;
        apply_japanese_period_move(state, settings, residual, tolerance)
    } else {
        apply_japanese_period_move(state, settings, elapsed, tolerance)
    }
}

fn apply_japanese_period_move(
    state: &mut ClockState,
    settings: &TimeSettings,
    mut elapsed: f64,
    tolerance: f64,
) -> bool {
    loop {
        if elapsed <= state.period_left + tolerance {
            state.period_left = settings.period_time;
            return false;
        }
        elapsed -= state.period_left;
        state.period_left = settings.period_time;
        state.periods_left -= 1;
        if state.periods_left < 0 {
            state.periods_left = 1;
            state.period_left = settings.period_time;
            return true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(system: TimeSystem, main: f64, period: f64, count: u32, tol: f64) -> TimeSettings {
        TimeSettings {
            system,
            main_time: main,
            period_time: period,
            period_count: count,
            tolerance: tol,
        }
    }

    #[test]
    fn none_never_violates() {
        let mut t = TimeTracker::new(settings(TimeSystem::None, 0.0, 0.0, 0, -1.0));
        assert!(!t.deduct(Color::Black, 1e6));
        assert_eq!(t.remaining_budget(Color::Black), f64::INFINITY);
    }

    #[test]
    fn s2_canadian_timeout_enforced() {
        // S2: Canadian, mainTime=0, periodTime=5, periodCount=1, tolerance=0.05.
        let mut t = TimeTracker::new(settings(TimeSystem::Canadian, 0.0, 5.0, 1, 0.05));
        let violated = t.deduct(Color::Black, 5.20);
        assert!(violated);
        assert!(t.state(Color::Black).violated);
    }

    #[test]
    fn canadian_block_refill_without_violation() {
        let mut t = TimeTracker::new(settings(TimeSystem::Canadian, 0.0, 5.0, 1, 0.05));
        let violated = t.deduct(Color::Black, 4.0);
        assert!(!violated);
        // stonesLeft hit 0 with periodLeft still positive: refill to full stones.
        assert_eq!(t.state(Color::Black).stones_left, 1);
        assert_eq!(t.state(Color::Black).period_left, 5.0);
    }

    #[test]
    fn s3_japanese_period_refill() {
        // S3: Japanese, mainTime=0, periodTime=10, periodCount=3, tolerance=0.
        let mut t = TimeTracker::new(settings(TimeSystem::Japanese, 0.0, 10.0, 3, 0.0));
        assert!(!t.deduct(Color::Black, 9.0));
        assert_eq!(t.state(Color::Black).periods_left, 3);

        assert!(!t.deduct(Color::Black, 11.0));
        assert_eq!(t.state(Color::Black).periods_left, 2);
        assert_eq!(t.state(Color::Black).period_left, 10.0);

        assert!(!t.deduct(Color::Black, 9.0));
        assert_eq!(t.state(Color::Black).periods_left, 2);
        assert_eq!(t.state(Color::Black).period_left, 10.0);
    }

    #[test]
    fn japanese_runs_out_of_periods() {
        let mut t = TimeTracker::new(settings(TimeSystem::Japanese, 0.0, 10.0, 2, 0.0));
        assert!(!t.deduct(Color::Black, 10.0)); // consumes period 1 exactly -> fits, no decrement
        assert!(!t.deduct(Color::Black, 21.0)); // spans two periods: 1st and 2nd consumed -> violation
            // after 21s: fits(<=10)? no; consume 10, periodsLeft 2->1; remaining 11; fits(<=10)? no;
            // consume 10, periodsLeft 1->0; remaining 1; fits? yes (<=10) -> no violation, resets.
        assert!(t.deduct(Color::Black, 31.0)); // forces periodsLeft below 0 -> violation
        assert_eq!(t.state(Color::Black).periods_left, 1);
        assert_eq!(t.state(Color::Black).period_left, 10.0);
    }

    #[test]
    fn absolute_violation_clamps_to_zero() {
        let mut t = TimeTracker::new(settings(TimeSystem::Absolute, 10.0, 0.0, 0, 0.0));
        assert!(t.deduct(Color::Black, 10.5));
        assert_eq!(t.state(Color::Black).main_left, 0.0);
    }

    #[test]
    fn negative_tolerance_disables_checking() {
        let mut t = TimeTracker::new(settings(TimeSystem::Absolute, 1.0, 0.0, 0, -1.0));
        assert!(!t.deduct(Color::Black, 100.0));
    }
}
