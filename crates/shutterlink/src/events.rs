//! Device event delivery — bounded queue, single consumer thread.
//!
//! Device-initiated notifications (capture complete, card inserted, ...)
//! are pushed onto a bounded channel and drained by one worker thread, so
//! an inbound event can be handled even while a command exchange is waiting
//! on its response. The worker must go through the protocol engine like any
//! other caller if it wants to issue commands of its own.
//!
//! When the queue is full, new events are dropped with a warning — bursts
//! are bounded instead of coalesced, so distinct events keep their identity
//! up to the queue capacity.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Default bound on queued, not-yet-consumed events.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 32;

/// One device-initiated notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    /// PTP event code (see [`crate::protocol`]).
    pub code: u16,
    /// Event parameters from the interrupt payload.
    pub params: Vec<u32>,
}

impl DeviceEvent {
    pub fn new(code: u16, params: Vec<u32>) -> Self {
        DeviceEvent { code, params }
    }
}

/// Receives every delivered event, on the worker thread.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &DeviceEvent);
}

/// The single consumer behind a device's event channel.
#[derive(Debug)]
pub struct EventWorker {
    tx: Option<SyncSender<DeviceEvent>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EventWorker {
    /// Spawn the consumer thread with a queue bound of `capacity`.
    ///
    /// A zero capacity is rejected: a rendezvous channel would make
    /// [`notify`](Self::notify) drop every event the worker is not already
    /// waiting for.
    pub fn spawn(capacity: usize, sink: Option<Arc<dyn EventSink>>) -> io::Result<EventWorker> {
        if capacity == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "event queue capacity must be non-zero",
            ));
        }

        let (tx, rx) = sync_channel(capacity);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("shutterlink-events".into())
            .spawn(move || Self::run(rx, sink, stop_flag))?;

        Ok(EventWorker {
            tx: Some(tx),
            stop,
            handle: Some(handle),
        })
    }

    fn run(rx: Receiver<DeviceEvent>, sink: Option<Arc<dyn EventSink>>, stop: Arc<AtomicBool>) {
        while let Ok(event) = rx.recv() {
            if stop.load(Ordering::Acquire) {
                break;
            }
            log::debug!("processing device event 0x{:04x}", event.code);
            if let Some(sink) = &sink {
                sink.on_event(&event);
            }
        }
    }

    /// Enqueue one event. Returns `false` when the event was dropped
    /// because the queue is full or the worker is gone.
    pub fn notify(&self, event: DeviceEvent) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(ev)) => {
                log::warn!("event queue full, dropping event 0x{:04x}", ev.code);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// The event being processed finishes; events still queued are
    /// discarded. Dropping the worker does the same.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            // Wake a worker blocked in recv by closing the channel; join
            // failures only mean the thread already panicked.
            let _ = handle.join();
        }
    }
}

impl Drop for EventWorker {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
