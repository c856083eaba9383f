//! Signal-driven interruption requests
//!
//! Signals arrive asynchronously on a listener thread which only records the
//! request. The processing loop observes requests at a single checkpoint,
//! after each unit of work, so at most one tarball's work is in flight when a
//! run stops.
//!
//! | signal  | request     | loop reaction                        |
//! |---------|-------------|--------------------------------------|
//! | SIGTERM | `Terminate` | stop after the current unit, abort   |
//! | SIGINT  | `Interrupt` | same as `Terminate`                  |
//! | SIGHUP  | `Resync`    | recollect work after the current unit |

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{info, warn};

use tarflow_core::{AbortCause, Error, Result};

#[cfg(unix)]
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
#[cfg(unix)]
type SignalHandle = signal_hook::iterator::Handle;
#[cfg(not(unix))]
#[derive(Debug, Clone, Copy)]
struct SignalHandle;

#[cfg(not(unix))]
impl SignalHandle {
    fn close(self) {}
}

const NO_ABORT: u8 = 0;
const ABORT_TERMINATE: u8 = 1;
const ABORT_INTERRUPT: u8 = 2;

/// An interruption request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// Stop after the current unit of work (SIGTERM)
    Terminate,
    /// Stop after the current unit of work (SIGINT)
    Interrupt,
    /// Recollect work after the current unit (SIGHUP)
    Resync,
}

/// What the loop must do at a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// Keep going
    Continue,
    /// Recollect work, then keep going
    Resync,
    /// Stop and return what was accumulated
    Abort(AbortCause),
}

/// Records interruption requests and answers checkpoints
#[derive(Debug, Default)]
pub struct SignalController {
    abort: AtomicU8,
    resync: AtomicBool,
    registration_active: AtomicBool,
    signal_handle: Mutex<Option<SignalHandle>>,
    listener: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SignalController {
    /// Controller with no pending requests and no OS registration
    pub fn new() -> Self {
        Self::default()
    }

    /// Register SIGTERM, SIGINT and SIGHUP listeners exactly once
    ///
    /// # Errors
    ///
    /// Returns an error when signal registration or the listener thread fails.
    pub fn register(self: &Arc<Self>) -> Result<()> {
        if self
            .registration_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        #[cfg(not(unix))]
        {
            warn!("signal listener is not supported on this platform; using programmatic requests only");
        }

        #[cfg(unix)]
        {
            let mut signals = signal_hook::iterator::Signals::new([SIGTERM, SIGINT, SIGHUP])
                .map_err(|e| {
                    self.registration_active.store(false, Ordering::Release);
                    Error::Io(e)
                })?;
            let handle = signals.handle();

            let controller = Arc::clone(self);
            let listener = thread::Builder::new()
                .name("tarflow-signal-listener".to_owned())
                .spawn(move || {
                    for signal in signals.forever() {
                        controller.handle_signal(signal);
                    }
                })
                .map_err(|e| {
                    self.registration_active.store(false, Ordering::Release);
                    Error::Io(e)
                })?;

            *self.signal_handle.lock() = Some(handle);
            *self.listener.lock() = Some(listener);
        }

        Ok(())
    }

    /// Stop the listener thread and clear registration state
    pub fn unregister(&self) {
        if let Some(handle) = self.signal_handle.lock().take() {
            handle.close();
        }
        if let Some(listener) = self.listener.lock().take() {
            if listener.join().is_err() {
                warn!("signal listener thread panicked while stopping");
            }
        }
        self.registration_active.store(false, Ordering::Release);
    }

    #[cfg(unix)]
    fn handle_signal(&self, signal: i32) {
        match signal {
            SIGTERM => self.request(Interruption::Terminate),
            SIGINT => self.request(Interruption::Interrupt),
            SIGHUP => self.request(Interruption::Resync),
            other => warn!(signal = other, "ignoring unexpected signal"),
        }
    }

    /// Record a request; safe to call from any thread
    pub fn request(&self, interruption: Interruption) {
        match interruption {
            Interruption::Terminate => self.set_abort(ABORT_TERMINATE),
            Interruption::Interrupt => self.set_abort(ABORT_INTERRUPT),
            Interruption::Resync => self.resync.store(true, Ordering::Release),
        }
        info!(?interruption, "interruption requested");
    }

    fn set_abort(&self, code: u8) {
        // the first abort cause wins
        let _ = self
            .abort
            .compare_exchange(NO_ABORT, code, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Pending fatal request, if any (does not consume it)
    pub fn pending_abort(&self) -> Option<AbortCause> {
        match self.abort.load(Ordering::Acquire) {
            ABORT_TERMINATE => Some(AbortCause::Terminate),
            ABORT_INTERRUPT => Some(AbortCause::Interrupt),
            _ => None,
        }
    }

    /// Observe pending requests
    ///
    /// Aborts are sticky and take precedence; a resync request is consumed by
    /// the checkpoint that reports it.
    pub fn checkpoint(&self) -> Checkpoint {
        if let Some(cause) = self.pending_abort() {
            return Checkpoint::Abort(cause);
        }
        if self.resync.swap(false, Ordering::AcqRel) {
            return Checkpoint::Resync;
        }
        Checkpoint::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_idle_checkpoint_continues() {
        let controller = SignalController::new();
        assert_eq!(controller.checkpoint(), Checkpoint::Continue);
        assert_eq!(controller.pending_abort(), None);
    }

    #[test]
    fn test_resync_is_consumed() {
        let controller = SignalController::new();
        controller.request(Interruption::Resync);
        assert_eq!(controller.checkpoint(), Checkpoint::Resync);
        assert_eq!(controller.checkpoint(), Checkpoint::Continue);
    }

    #[test]
    fn test_abort_is_sticky_and_wins() {
        let controller = SignalController::new();
        controller.request(Interruption::Resync);
        controller.request(Interruption::Interrupt);
        assert_eq!(controller.checkpoint(), Checkpoint::Abort(AbortCause::Interrupt));
        assert_eq!(controller.checkpoint(), Checkpoint::Abort(AbortCause::Interrupt));
    }

    #[test]
    fn test_first_abort_cause_kept() {
        let controller = SignalController::new();
        controller.request(Interruption::Terminate);
        controller.request(Interruption::Interrupt);
        assert_eq!(controller.pending_abort(), Some(AbortCause::Terminate));
    }

    #[cfg(unix)]
    #[test]
    fn test_os_signal_is_recorded() {
        let controller = Arc::new(SignalController::new());
        controller.register().unwrap();
        // second registration is a no-op
        controller.register().unwrap();

        signal_hook::low_level::raise(SIGHUP).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = controller.checkpoint();
        while seen == Checkpoint::Continue && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
            seen = controller.checkpoint();
        }
        assert_eq!(seen, Checkpoint::Resync);
        controller.unregister();
    }
}
