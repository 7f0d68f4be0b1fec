//! Engine configuration: command templates, working directory, and the
//! custom command hooks run around a match/game.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::DumbarbError;
use crate::time_control::TimeSystem;

/// Static description of one engine, as the external config parser would
/// hand it to the core.
#[derive(Debug, Clone)]
pub struct EngineSpec {
    pub name: String,
    /// Command line, possibly containing `{placeholder}` tokens; resolved
    /// fresh at every `start()` since `{matchdir}` etc. can vary.
    pub cmd_line: String,
    pub work_dir: Option<PathBuf>,
    pub quiet: bool,
    pub log_stderr: bool,
    pub gtp_initial_timeout: Duration,
    pub pre_match: Vec<String>,
    pub post_match: Vec<String>,
    pub pre_game: Vec<String>,
    pub post_game: Vec<String>,
}

/// Values substituted into a command-line template for one game.
pub struct TemplateContext<'a> {
    pub name: &'a str,
    pub match_dir: &'a std::path::Path,
    pub board_size: u32,
    pub komi: f32,
    pub main_time: f64,
    pub period_time: f64,
    pub period_count: u32,
    pub time_system: TimeSystem,
}

/// Resolves `{name}`, `{matchdir}`, `{boardsize}`, `{komi}`, `{maintime}`,
/// `{periodtime}`, `{periodcount}`, `{timesys}`; `{{`/`}}` escape a literal
/// brace. Unknown placeholders are an error rather than passed through
/// silently, since a typo'd token left in the command line would otherwise
/// spawn the wrong process.
pub fn resolve_template(template: &str, ctx: &TemplateContext) -> Result<String, DumbarbError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for c2 in chars.by_ref() {
                    if c2 == '}' {
                        closed = true;
                        break;
                    }
                    key.push(c2);
                }
                if !closed {
                    return Err(DumbarbError::Config(format!(
                        "unterminated placeholder in command line: {{{key}"
                    )));
                }
                out.push_str(&placeholder_value(&key, ctx)?);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn placeholder_value(key: &str, ctx: &TemplateContext) -> Result<String, DumbarbError> {
    Ok(match key {
        "name" => ctx.name.to_string(),
        "matchdir" => ctx.match_dir.display().to_string(),
        "boardsize" => ctx.board_size.to_string(),
        "komi" => ctx.komi.to_string(),
        "maintime" => ctx.main_time.to_string(),
        "periodtime" => ctx.period_time.to_string(),
        "periodcount" => ctx.period_count.to_string(),
        "timesys" => ctx.time_system.as_str().to_string(),
        other => {
            return Err(DumbarbError::Config(format!(
                "unknown command-line placeholder {{{other}}}"
            )))
        }
    })
}

/// Tokenises a resolved command line into program + args, using
/// platform-appropriate quoting rules.
pub fn parse_command_line(cmd: &str) -> (String, Vec<String>) {
    #[cfg(target_os = "windows")]
    {
        parse_windows_command(cmd)
    }
    #[cfg(not(target_os = "windows"))]
    {
        parse_unix_command(cmd)
    }
}

#[cfg(not(target_os = "windows"))]
fn parse_unix_command(cmd: &str) -> (String, Vec<String>) {
    match shlex::split(cmd) {
        Some(parts) if !parts.is_empty() => {
            let program = parts[0].clone();
            let args = parts[1..].to_vec();
            (program, args)
        }
        _ => {
            let parts: Vec<&str> = cmd.split_whitespace().collect();
            if parts.is_empty() {
                (String::new(), Vec::new())
            } else {
                (
                    parts[0].to_string(),
                    parts[1..].iter().map(|s| s.to_string()).collect(),
                )
            }
        }
    }
}

#[cfg(target_os = "windows")]
fn parse_windows_command(cmd: &str) -> (String, Vec<String>) {
    if cmd.trim().is_empty() {
        return (String::new(), Vec::new());
    }

    use std::ffi::{OsStr, OsString};
    use std::os::windows::ffi::{OsStrExt, OsStringExt};
    use windows_sys::Win32::Foundation::LocalFree;
    use windows_sys::Win32::UI::Shell::CommandLineToArgvW;

    unsafe {
        let cmd_wide: Vec<u16> = OsStr::new(cmd)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let mut argc = 0;
        let argv_ptr = CommandLineToArgvW(cmd_wide.as_ptr(), &mut argc);

        if argv_ptr.is_null() || argc == 0 {
            let parts: Vec<&str> = cmd.split_whitespace().collect();
            if parts.is_empty() {
                return (String::new(), Vec::new());
            }
            return (
                parts[0].to_string(),
                parts[1..].iter().map(|s| s.to_string()).collect(),
            );
        }

        let mut args = Vec::new();
        for i in 0..argc {
            let arg_ptr = *argv_ptr.add(i as usize);
            let len = (0..).take_while(|&j| *arg_ptr.add(j) != 0).count();
            let arg_slice = std::slice::from_raw_parts(arg_ptr, len);
            args.push(OsString::from_wide(arg_slice).to_string_lossy().into_owned());
        }

        LocalFree(argv_ptr as _);

        if args.is_empty() {
            (String::new(), Vec::new())
        } else {
            let program = args[0].clone();
            (program, args[1..].to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(dir: &std::path::Path) -> TemplateContext<'_> {
        TemplateContext {
            name: "gnugo",
            match_dir: dir,
            board_size: 19,
            komi: 6.5,
            main_time: 300.0,
            period_time: 30.0,
            period_count: 5,
            time_system: TimeSystem::Canadian,
        }
    }

    #[test]
    fn substitutes_known_placeholders() {
        let dir = PathBuf::from("/tmp/m1");
        let resolved =
            resolve_template("--name {name} --komi {komi} --dir {matchdir}", &ctx(&dir)).unwrap();
        assert_eq!(resolved, "--name gnugo --komi 6.5 --dir /tmp/m1");
    }

    #[test]
    fn escapes_literal_braces() {
        let dir = PathBuf::from("/tmp/m1");
        let resolved = resolve_template("{{literal}} {name}", &ctx(&dir)).unwrap();
        assert_eq!(resolved, "{literal} gnugo");
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let dir = PathBuf::from("/tmp/m1");
        assert!(resolve_template("{bogus}", &ctx(&dir)).is_err());
    }

    #[test]
    fn parses_simple_command() {
        let (program, args) = parse_command_line("./engine --level 10");
        assert_eq!(program, "./engine");
        assert_eq!(args, vec!["--level", "10"]);
    }
}
