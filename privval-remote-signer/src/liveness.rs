//! Background keepalive for the signer channel.
//!
//! A silently dead connection is only noticed when something is sent over
//! it. The monitor wakes up every interval and, if the channel has been idle
//! for a whole interval, sends a `PingRequest` through the supervisor. The
//! ping takes the same exchange slot as sign requests, so it waits for any
//! in-flight sign exchange instead of interleaving with it.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, trace, warn};

use crate::supervisor::Supervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(3),
        }
    }
}

/// Handle to the keepalive thread. Dropping it stops the thread.
pub struct LivenessMonitor {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LivenessMonitor {
    /// Start the keepalive thread. Both the interval and the ping timeout
    /// must be non-zero.
    pub fn spawn(supervisor: Arc<Supervisor>, config: LivenessConfig) -> io::Result<Self> {
        if config.interval.is_zero() || config.timeout.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "liveness interval and ping timeout must be non-zero",
            ));
        }

        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("privval-liveness".to_string())
            .spawn(move || {
                debug!(
                    "Liveness monitor started for {} (interval {:?})",
                    supervisor.peer(),
                    config.interval
                );
                loop {
                    match stopped.recv_timeout(config.interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    match supervisor.ping_if_idle(config.interval, config.timeout) {
                        Ok(true) => trace!("Signer answered ping"),
                        Ok(false) => trace!("Channel recently active, ping skipped"),
                        Err(e) if e.is_fatal() => {
                            error!("Liveness monitor stopping: {}", e);
                            break;
                        }
                        // the supervisor has already rebuilt the channel
                        Err(e) => warn!("Liveness ping failed: {}", e),
                    }
                }
                debug!("Liveness monitor stopped");
            })?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stop the thread and wait for it. An in-flight ping finishes first.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Liveness monitor thread panicked");
            }
        }
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
