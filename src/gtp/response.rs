//! The small explicit GTP response tokeniser.
//!
//! A full frame is the accumulated content lines of one exchange, newline
//! joined, with the trailing blank terminator line already stripped by the
//! transport. This module only pulls the status prefix off and trims; it
//! never parses command-specific bodies (`final_score`, vertices, …) —
//! those live next to their callers in `game.rs` and `time_control.rs`.

use crate::error::GtpError;

/// A parsed GTP frame: success/failure status plus trimmed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub ok: bool,
    pub body: String,
}

impl Response {
    /// Parses a raw accumulated frame (content lines, newline-joined, no
    /// trailing blank line) into a status + body.
    ///
    /// GTP frames may carry an optional integer id directly after the
    /// `=`/`?` (dumbarb never sends one, but engines echo what they're
    /// given and some emit one unprompted); it is discarded.
    pub fn parse(raw: &str) -> Result<Response, GtpError> {
        let raw = raw.trim_end_matches('\n');
        let mut chars = raw.chars();
        let ok = match chars.next() {
            Some('=') => true,
            Some('?') => false,
            _ => return Err(GtpError::MalformedFrame(raw.to_string())),
        };
        let rest = chars.as_str();
        let rest = rest.strip_prefix(|c: char| c.is_ascii_digit()).unwrap_or(rest);
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());
        Ok(Response {
            ok,
            body: rest.trim().to_string(),
        })
    }

    /// Returns the body if `ok`, otherwise a `GtpError::EngineError`.
    pub fn into_ok(self) -> Result<String, GtpError> {
        if self.ok {
            Ok(self.body)
        } else {
            Err(GtpError::EngineError(self.body))
        }
    }
}

/// Splits a successful `genmove` body into a vertex token, lower-cased.
///
/// `pass` and `resign` are returned as-is; anything else is returned
/// unparsed for the caller to validate against board bounds (dumbarb does
/// not know board rules, only board-coordinate syntax).
pub fn parse_vertex(body: &str) -> &str {
    body.trim()
}

/// Splits a `final_score` body (`W+7.5`, `B+R`, `0`, `draw`) into a
/// winner-or-none plus the raw margin text, for the game driver to turn
/// into a `GameOutcome`.
pub fn parse_score(body: &str) -> ScoreToken<'_> {
    let body = body.trim();
    if body.eq_ignore_ascii_case("0") || body.eq_ignore_ascii_case("draw") {
        return ScoreToken::Jigo;
    }
    let mut chars = body.chars();
    match chars.next() {
        Some('W') | Some('w') => ScoreToken::Margin {
            white_wins: true,
            margin: chars.as_str().trim_start_matches('+'),
        },
        Some('B') | Some('b') => ScoreToken::Margin {
            white_wins: false,
            margin: chars.as_str().trim_start_matches('+'),
        },
        _ => ScoreToken::Unparseable,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreToken<'a> {
    Jigo,
    Margin { white_wins: bool, margin: &'a str },
    Unparseable,
}
