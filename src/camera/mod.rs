//! Camera input, device access and exclusivity.
//!
//! This module provides the [`Camera`] abstraction used by both the
//! fallback still-capture path and the preview loops, plus the helpers that
//! decide whether a device node can be used and who may use it right now.

mod access;
mod device;
mod frame;
mod lock;
#[cfg(feature = "camera")]
mod nokhwa_backend;

pub use access::{check_device, device_exists, AccessError};
pub use device::{
    default_provider, Camera, CameraError, CameraProvider, DeviceUsage, MockBehavior, MockCamera,
    MockCameraProvider, OpenSettings, PixelFormat, UnsupportedProvider,
};
pub use frame::{Frame, BYTES_PER_PIXEL};
pub use lock::{DeviceBusy, DeviceGuard, DeviceLock, DeviceLocks, Holder};
#[cfg(feature = "camera")]
pub use nokhwa_backend::{device_index, NokhwaCamera, NokhwaProvider};
