//! Background health monitor for the native adapter.

use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::AdapterState;

/// Periodic maintenance thread. Stopped and joined on drop.
pub(super) struct Monitor {
    signal: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Start a thread that runs maintenance every `interval` until the
    /// monitor is dropped or the adapter state goes away.
    pub fn spawn(interval: Duration, state: Weak<AdapterState>) -> Self {
        let signal = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_signal = Arc::clone(&signal);

        let spawned = thread::Builder::new()
            .name("tierscan-native-monitor".to_string())
            .spawn(move || {
                let (lock, cvar) = &*thread_signal;
                loop {
                    let stopped = {
                        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
                        let (guard, _) = cvar
                            .wait_timeout_while(guard, interval, |stop| !*stop)
                            .unwrap_or_else(PoisonError::into_inner);
                        *guard
                    };
                    if stopped {
                        break;
                    }
                    match state.upgrade() {
                        Some(state) => state.maintain(),
                        None => break,
                    }
                }
            });

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "could not start native parser monitor");
                None
            }
        };

        Self { signal, handle }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        let (lock, cvar) = &*self.signal;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("native parser monitor panicked");
            }
        }
    }
}
