//! Background polling for registry roots

use std::io;
use std::sync::Weak;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::ObjectRegistry;

/// Handle to a running poll thread
#[derive(Debug)]
pub struct WatchHandle {
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Signal the thread and wait for it, unless called from the thread itself
    pub fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(thread) = self.thread.take()
            && thread.thread().id() != thread::current().id()
        {
            let _ = thread.join();
        }
    }
}

/// Poll the registry every `interval` until stopped or the registry is dropped
pub(super) fn spawn(registry: Weak<ObjectRegistry>, interval: Duration) -> io::Result<WatchHandle> {
    let (stop, stopped) = mpsc::channel::<()>();

    let thread = thread::Builder::new().name("traitsmith-watch".into()).spawn(move || {
        log::debug!("Registry watcher started ({}ms interval)", interval.as_millis());
        loop {
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            let Some(registry) = registry.upgrade() else {
                break;
            };
            if registry.is_closed() {
                break;
            }
            if let Err(e) = registry.refresh() {
                registry.report_watch_error(e.to_string());
            }
        }
        log::debug!("Registry watcher stopped");
    })?;

    Ok(WatchHandle {
        stop,
        thread: Some(thread),
    })
}
