//! Unix signal handling for the reactor.
//!
//! SIGINT and SIGTERM request a graceful shutdown. The reactor is blocked in
//! `poll` without a timeout, so the signal thread sets a shared flag and then
//! wakes the poll through a [`mio::Waker`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use mio::Waker;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{debug, info, warn};

use crate::error::ServerResult;

/// Listens for termination signals on a background thread.
pub struct SignalHandler {
    handle: ShutdownHandle,
}

impl SignalHandler {
    /// Creates a handler that reports through the given shutdown handle.
    pub fn new(handle: ShutdownHandle) -> Self {
        Self { handle }
    }

    /// Spawns the signal listener thread.
    ///
    /// This should be called once at server startup.
    pub fn spawn_listener(&self) -> ServerResult<()> {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let handle = self.handle.clone();

        thread::Builder::new()
            .name("chatdir-signals".to_string())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    let name = if signal == SIGINT { "SIGINT" } else { "SIGTERM" };
                    info!(signal = name, "Received signal, initiating shutdown");
                    handle.trigger();
                }
                debug!("Signal listener stopped");
            })?;
        Ok(())
    }
}

/// A handle for triggering or checking shutdown status.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub(crate) fn new(waker: Arc<Waker>) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            waker,
        }
    }

    /// Triggers a shutdown and wakes the reactor.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "Failed to wake reactor");
        }
    }

    /// Returns true if shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
