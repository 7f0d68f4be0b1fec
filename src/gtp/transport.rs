//! Framed GTP request/response over a child process's stdio.
//!
//! `Transport` is the lowest primitive (component A): one entry point,
//! `send`, bounded by a deadline and abortable by a shared `Cancel` token,
//! plus a side channel of raw stderr lines that never blocks or
//! participates in request/response pairing.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use crate::cancel::Cancel;
use crate::error::GtpError;
use crate::gtp::response::Response;

/// How often `send` re-checks the cancellation token while waiting for a
/// frame. Small enough that a cancelled match stops promptly, large enough
/// not to busy-loop.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A spawned engine's stdio, framed into GTP request/response plus a
/// stderr side-channel.
pub struct Transport {
    child: Child,
    stdin: ChildStdin,
    frames: Receiver<Result<String, GtpError>>,
    stderr_lines: Receiver<String>,
    cancel: Cancel,
}

impl Transport {
    /// Spawns `program args` in `work_dir` and wires up the reader and
    /// stderr-drain background threads.
    pub fn spawn(
        program: &str,
        args: &[String],
        work_dir: Option<&std::path::Path>,
        cancel: Cancel,
    ) -> Result<Transport, GtpError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = work_dir {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn()?;

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");
        let stdin = child.stdin.take().expect("piped stdin");

        let (frame_tx, frames) = mpsc::channel();
        thread::spawn(move || read_frames(stdout, frame_tx));

        let (stderr_tx, stderr_lines) = mpsc::channel();
        thread::spawn(move || drain_stderr(stderr, stderr_tx));

        Ok(Transport {
            child,
            stdin,
            frames,
            stderr_lines,
            cancel,
        })
    }

    /// Sends one GTP command and waits up to `timeout` for the framed
    /// response. Returns early with `GtpError::Cancelled` if the shared
    /// token trips while waiting.
    pub fn send(&mut self, command: &str, timeout: Duration) -> Result<Response, GtpError> {
        if self.cancel.is_tripped() {
            return Err(GtpError::Cancelled);
        }
        writeln!(self.stdin, "{command}")?;
        self.stdin.flush()?;

        let deadline = Instant::now() + timeout;
        loop {
            if self.cancel.is_tripped() {
                return Err(GtpError::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(GtpError::Timeout);
            }
            let step = remaining.min(POLL_INTERVAL);
            match self.frames.recv_timeout(step) {
                Ok(Ok(raw)) => return Response::parse(&raw),
                Ok(Err(e)) => return Err(e),
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => return Err(GtpError::ChannelClosed),
            }
        }
    }

    /// Drains any stderr lines buffered since the last call without
    /// blocking. Callers poll this between commands; it never gates
    /// protocol timing.
    pub fn drain_stderr(&self) -> Vec<String> {
        self.stderr_lines.try_iter().collect()
    }

    /// Sends a terminate request, then force-kills and reaps after a short
    /// grace period if the child hasn't already exited.
    pub fn kill_and_reap(&mut self, grace: Duration) {
        if self.child.try_wait().ok().flatten().is_some() {
            return;
        }
        let _ = self.child.kill();
        let start = Instant::now();
        while start.elapsed() < grace {
            if self.child.try_wait().ok().flatten().is_some() {
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }
        let _ = self.child.wait();
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.kill_and_reap(Duration::from_millis(500));
    }
}

/// Reads lines off `stdout` and reassembles them into the complete frames
/// the GTP blank-line terminator delimits, forwarding each one whole.
fn read_frames(stdout: impl std::io::Read, tx: mpsc::Sender<Result<String, GtpError>>) {
    let mut reader = BufReader::new(stdout);
    let mut frame = String::new();
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => {
                let _ = tx.send(Err(GtpError::ChannelClosed));
                return;
            }
            Ok(_) => {
                if line.trim().is_empty() {
                    if !frame.is_empty() {
                        let _ = tx.send(Ok(std::mem::take(&mut frame)));
                    }
                    continue;
                }
                frame.push_str(line.trim_end_matches(['\r', '\n']));
                frame.push('\n');
            }
            Err(e) => {
                let _ = tx.send(Err(GtpError::Io(e)));
                return;
            }
        }
    }
}

fn drain_stderr(stderr: impl std::io::Read, tx: mpsc::Sender<String>) {
    let reader = BufReader::new(stderr);
    for line in reader.lines() {
        match line {
            Ok(line) => {
                if tx.send(line).is_err() {
                    return;
                }
            }
            Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh_engine(script: &str) -> Transport {
        Transport::spawn(
            "/bin/sh",
            &["-c".to_string(), script.to_string()],
            None,
            Cancel::new(),
        )
        .unwrap()
    }

    #[test]
    fn round_trips_a_simple_echo_engine() {
        let script = r#"
while IFS= read -r line; do
  echo "= ok"
  echo
done
"#;
        let mut t = sh_engine(script);
        let r = t.send("name", Duration::from_secs(2)).unwrap();
        assert!(r.ok);
        assert_eq!(r.body, "ok");
    }

    #[test]
    fn times_out_on_a_silent_engine() {
        let mut t = sh_engine("sleep 5\n");
        let r = t.send("name", Duration::from_millis(100));
        assert!(matches!(r, Err(GtpError::Timeout)));
    }

    #[test]
    fn reports_channel_closed_when_engine_exits() {
        let mut t = sh_engine("exit 0\n");
        let r = t.send("name", Duration::from_secs(2));
        assert!(matches!(r, Err(GtpError::ChannelClosed)));
    }

    #[test]
    fn cancel_aborts_an_in_flight_send() {
        let cancel = Cancel::new();
        let mut t = Transport::spawn(
            "/bin/sh",
            &["-c".to_string(), "sleep 5\n".to_string()],
            None,
            cancel.clone(),
        )
        .unwrap();
        let waiter_cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            waiter_cancel.trip();
        });
        let r = t.send("name", Duration::from_secs(5));
        assert!(matches!(r, Err(GtpError::Cancelled)));
    }
}
