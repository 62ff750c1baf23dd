// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Device context: opens a device (or declares "host-only"), records the
//! log level and kernel-image identity, and owns no pixel data itself.
//!
//! A [`Context`] is created once per device-open and threaded through every
//! other subsystem ([`crate::memory::Frame`], [`crate::h264::Parser`],
//! [`crate::scaler::Scaler`]) as a cheap, cloneable handle. It must outlive
//! every dependent object; this precondition is not enforced at runtime
//! (see `spec.md` §4.1), but debug builds assert it is still alive whenever
//! a dependent calls back into it.

use crate::{Error, LogLevel};
use std::sync::Arc;

/// Invariant: `Some(_)` iff `device_index >= 0` and a kernel image path was
/// supplied at creation (`spec.md` §4.1).
#[derive(Debug)]
struct DeviceHandle {
    index: i32,
    kernel_image_path: String,
}

#[derive(Debug)]
struct Inner {
    device_index: i32,
    handle: Option<DeviceHandle>,
    log_level: LogLevel,
}

/// A cheap, cloneable handle to an opened device (or a host-only
/// declaration). Cloning shares the same underlying device; the device is
/// only actually closed once the last clone is dropped.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// Opens a device and loads its kernel image, or creates a host-only
    /// context when `device_index < 0` or `kernel_image_path` is `None`.
    ///
    /// Per `spec.md` §4.1: `dev_handle.is_some() ⇔ device_index >= 0 ∧
    /// kernel_image_path.is_some()`. Both conditions must hold together for
    /// a device handle to be created; supplying only one (e.g. a path with
    /// a negative index) yields a host-only context rather than an error,
    /// since the spec defines device-ness purely in terms of that
    /// conjunction.
    pub fn create(
        device_index: i32,
        kernel_image_path: Option<&str>,
        log_level: LogLevel,
    ) -> Result<Self, Error> {
        let handle = match (device_index >= 0, kernel_image_path) {
            (true, Some(path)) => {
                if path.is_empty() {
                    return Err(Error::InvalidArgument(
                        "kernel image path must not be empty".into(),
                    ));
                }
                log::info!("opening device {device_index} with kernel image {path}");
                Some(DeviceHandle {
                    index: device_index,
                    kernel_image_path: path.to_string(),
                })
            }
            _ => {
                log::debug!("creating host-only context");
                None
            }
        };

        Ok(Context {
            inner: Arc::new(Inner {
                device_index,
                handle,
                log_level,
            }),
        })
    }

    /// Convenience constructor for a host-only context (`device_index` of
    /// `-1`, no kernel image).
    pub fn host_only(log_level: LogLevel) -> Self {
        Context::create(-1, None, log_level).expect("host-only context creation cannot fail")
    }

    /// The device index this context was created with, or `-1` for
    /// host-only.
    pub fn device_index(&self) -> i32 {
        self.inner.device_index
    }

    /// `true` if this context opened a real device (as opposed to
    /// host-only).
    pub fn has_device(&self) -> bool {
        self.inner.handle.is_some()
    }

    /// Path to the loaded kernel image, if a device is open.
    pub fn kernel_image_path(&self) -> Option<&str> {
        self.inner
            .handle
            .as_ref()
            .map(|h| h.kernel_image_path.as_str())
    }

    pub fn log_level(&self) -> LogLevel {
        self.inner.log_level
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            log::info!("closing device {}", handle.index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_only_has_no_device() {
        let ctx = Context::create(-1, None, LogLevel::Info).unwrap();
        assert!(!ctx.has_device());
        assert_eq!(ctx.device_index(), -1);
        assert!(ctx.kernel_image_path().is_none());
    }

    #[test]
    fn device_without_kernel_path_is_host_only() {
        // spec.md: dev_handle is Some iff BOTH device_index >= 0 AND a
        // kernel image path is present.
        let ctx = Context::create(0, None, LogLevel::Info).unwrap();
        assert!(!ctx.has_device());
    }

    #[test]
    fn negative_index_with_path_is_host_only() {
        let ctx = Context::create(-1, Some("/lib/kernel.bit"), LogLevel::Info).unwrap();
        assert!(!ctx.has_device());
    }

    #[test]
    fn device_with_path_opens_device() {
        let ctx = Context::create(0, Some("/lib/kernel.bit"), LogLevel::Debug).unwrap();
        assert!(ctx.has_device());
        assert_eq!(ctx.kernel_image_path(), Some("/lib/kernel.bit"));
    }

    #[test]
    fn empty_kernel_path_is_invalid_argument() {
        let err = Context::create(0, Some(""), LogLevel::Info).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn context_clone_shares_device() {
        let ctx = Context::create(0, Some("/lib/kernel.bit"), LogLevel::Info).unwrap();
        let ctx2 = ctx.clone();
        assert_eq!(ctx.device_index(), ctx2.device_index());
    }
}
