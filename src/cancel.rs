//! Process-wide cancellation token.
//!
//! A single `Cancel` is shared by the match runner, every engine supervisor,
//! and the GTP transport's reader threads. Tripping it unblocks whichever of
//! the three suspension points (awaiting a GTP response, sleeping between
//! games/moves, awaiting a child reap) happens to be active, with a
//! `Cancelled` outcome rather than a hang.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
pub struct Cancel {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    tripped: AtomicBool,
    gate: Mutex<()>,
    cvar: Condvar,
}

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a Ctrl-C handler that trips this token. Mirrors the
    /// all-children-die-on-signal behaviour of the registry this replaces,
    /// without a static/global registry: the match runner's owned
    /// supervisors observe the trip and tear down on their own.
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let cancel = self.clone();
        ctrlc::set_handler(move || cancel.trip())
    }

    pub fn trip(&self) {
        self.inner.tripped.store(true, Ordering::SeqCst);
        let _guard = self.inner.gate.lock().unwrap();
        self.inner.cvar.notify_all();
    }

    pub fn is_tripped(&self) -> bool {
        self.inner.tripped.load(Ordering::SeqCst)
    }

    /// Sleeps for `dur`, returning early if the token trips. Returns `true`
    /// if the sleep ran to completion, `false` if it was cut short.
    pub fn sleep(&self, dur: Duration) -> bool {
        if dur.is_zero() {
            return !self.is_tripped();
        }
        let guard = self.inner.gate.lock().unwrap();
        if self.is_tripped() {
            return false;
        }
        let (_guard, result) = self.inner.cvar.wait_timeout(guard, dur).unwrap();
        result.timed_out() && !self.is_tripped()
    }
}
