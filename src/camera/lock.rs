//! Per-device exclusivity between preview and still capture.
//!
//! A device node has at most one holder at a time. Still capture has
//! priority: while a capture is waiting, previews cannot (re)acquire the
//! device, and a preview holder sees [`DeviceLock::capture_pending`] and
//! lets go between frames.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Who currently owns a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holder {
    /// A preview loop is streaming from the device.
    Preview,
    /// A still capture is running.
    Capture,
}

/// The device stayed busy for the whole wait.
#[derive(Debug, Clone, Error)]
#[error("device {device} busy (held by {holder:?}) after waiting {waited:?}")]
pub struct DeviceBusy {
    /// Device path.
    pub device: String,
    /// Holder at the time the wait gave up.
    pub holder: Holder,
    /// How long the caller waited.
    pub waited: Duration,
}

#[derive(Debug, Default)]
struct LockState {
    holder: Option<Holder>,
    waiting_captures: usize,
}

/// Exclusivity lock for one device path.
#[derive(Debug)]
pub struct DeviceLock {
    device: String,
    state: Mutex<LockState>,
    changed: Condvar,
}

impl DeviceLock {
    /// Creates an unheld lock for `device`.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            state: Mutex::new(LockState::default()),
            changed: Condvar::new(),
        }
    }

    /// Device path this lock guards.
    pub fn device(&self) -> &str {
        &self.device
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current holder, if any.
    pub fn holder(&self) -> Option<Holder> {
        self.state().holder
    }

    /// True while at least one capture waits for or holds the device.
    pub fn capture_pending(&self) -> bool {
        let state = self.state();
        state.waiting_captures > 0 || state.holder == Some(Holder::Capture)
    }

    /// Acquires the device for preview, waiting at most `wait`.
    ///
    /// Returns `None` if the device is held or a capture is queued.
    pub fn acquire_preview(self: &Arc<Self>, wait: Duration) -> Option<DeviceGuard> {
        let state = self.state();
        let (mut state, _) = self
            .changed
            .wait_timeout_while(state, wait, |s| {
                s.holder.is_some() || s.waiting_captures > 0
            })
            .unwrap_or_else(PoisonError::into_inner);

        if state.holder.is_some() || state.waiting_captures > 0 {
            return None;
        }
        state.holder = Some(Holder::Preview);
        Some(DeviceGuard {
            lock: Arc::clone(self),
            holder: Holder::Preview,
        })
    }

    /// Acquires the device for still capture, waiting at most `wait` for the
    /// current holder to release it.
    pub fn acquire_capture(self: &Arc<Self>, wait: Duration) -> Result<DeviceGuard, DeviceBusy> {
        let mut state = self.state();
        state.waiting_captures += 1;

        let (mut state, _) = self
            .changed
            .wait_timeout_while(state, wait, |s| s.holder.is_some())
            .unwrap_or_else(PoisonError::into_inner);
        state.waiting_captures -= 1;

        if let Some(holder) = state.holder {
            drop(state);
            self.changed.notify_all();
            return Err(DeviceBusy {
                device: self.device.clone(),
                holder,
                waited: wait,
            });
        }

        state.holder = Some(Holder::Capture);
        Ok(DeviceGuard {
            lock: Arc::clone(self),
            holder: Holder::Capture,
        })
    }

    fn release(&self) {
        self.state().holder = None;
        self.changed.notify_all();
    }
}

/// Held device; releases on drop.
#[derive(Debug)]
pub struct DeviceGuard {
    lock: Arc<DeviceLock>,
    holder: Holder,
}

impl DeviceGuard {
    /// Role this guard was acquired for.
    pub fn holder(&self) -> Holder {
        self.holder
    }

    /// Lock this guard belongs to.
    pub fn lock(&self) -> &Arc<DeviceLock> {
        &self.lock
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// Locks keyed by device path, shared by preview and capture.
#[derive(Debug, Default)]
pub struct DeviceLocks {
    locks: Mutex<HashMap<String, Arc<DeviceLock>>>,
}

impl DeviceLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `device`, creating it on first use.
    ///
    /// Two cameras configured with the same path share one lock.
    pub fn lock_for(&self, device: &str) -> Arc<DeviceLock> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            locks
                .entry(device.to_owned())
                .or_insert_with(|| Arc::new(DeviceLock::new(device))),
        )
    }
}
