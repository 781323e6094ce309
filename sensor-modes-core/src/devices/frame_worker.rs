//! Dedicated thread for blocking frame reads.
//!
//! ```text
//! camera reaction ──request()──► [channel, cap 1] ──► worker: read_frame() ──► on_frame(result)
//! ```
//!
//! The worker owns the video session. At most one read is in flight; a
//! request made while one is pending is refused with `Busy`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Sender, TrySendError};

use crate::models::error::DeviceError;
use crate::models::payload::Frame;
use crate::traits::session::Session;
use crate::traits::video_backend::VideoSession;

/// Completion callback, invoked on the worker thread once per read.
pub type FrameCallback = Box<dyn Fn(Result<Frame, DeviceError>) + Send + 'static>;

/// Result of asking the worker for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRequest {
    Requested,
    /// A read is already in flight.
    Busy,
    /// The worker has stopped.
    Closed,
}

pub struct FrameWorker {
    requests: Option<Sender<()>>,
    in_flight: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FrameWorker {
    /// Move `session` onto a new worker thread.
    pub fn spawn<S: VideoSession>(session: S, on_frame: FrameCallback) -> Result<Self, DeviceError> {
        let (tx, rx) = crossbeam_channel::bounded::<()>(1);
        let in_flight = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&in_flight);

        let handle = thread::Builder::new()
            .name("frame-worker".into())
            .spawn(move || {
                let mut session = session;
                for () in rx.iter() {
                    let result = session.read_frame();
                    // Cleared first so the runtime never sees a completion
                    // while the worker still reports busy.
                    flag.store(false, Ordering::SeqCst);
                    on_frame(result);
                }
                session.release();
                log::debug!("frame worker stopped");
            })
            .map_err(|e| DeviceError::Backend(format!("failed to spawn frame worker: {}", e)))?;

        Ok(Self {
            requests: Some(tx),
            in_flight,
            handle: Some(handle),
        })
    }

    /// Ask for one frame without blocking.
    pub fn request(&self) -> WorkerRequest {
        let Some(requests) = &self.requests else {
            return WorkerRequest::Closed;
        };
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return WorkerRequest::Busy;
        }
        match requests.try_send(()) {
            Ok(()) => WorkerRequest::Requested,
            Err(TrySendError::Full(())) => WorkerRequest::Busy,
            Err(TrySendError::Disconnected(())) => {
                self.in_flight.store(false, Ordering::SeqCst);
                WorkerRequest::Closed
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop the thread and release the session. Waits for an in-flight read
    /// to complete. Idempotent.
    pub fn release(&mut self) {
        self.requests = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("frame worker panicked");
            }
        }
    }
}

impl Session for FrameWorker {
    fn close(&mut self) -> Result<(), DeviceError> {
        self.release();
        Ok(())
    }
}

impl Drop for FrameWorker {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for FrameWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameWorker")
            .field("running", &self.handle.is_some())
            .field("busy", &self.is_busy())
            .finish()
    }
}
