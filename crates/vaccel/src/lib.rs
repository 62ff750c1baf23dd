// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Video-analytics acceleration core.
//!
//! Provides the three tightly coupled subsystems that make up a
//! hardware-accelerated (or software-fallback) video frame processing
//! pipeline:
//!
//! - [`device`]: a device context that is threaded, as a cheap handle,
//!   through every other subsystem.
//! - [`format`] / [`memory`]: a unified host/device memory and
//!   planar-video-frame object model.
//! - [`h264`]: a stateful H.264 Annex-B parser that reassembles access
//!   units and tracks SPS/PPS state across fragmented input.
//! - [`scaler`]: an N-channel polyphase multi-scaler engine, dispatching to
//!   either a registered hardware backend or the bundled software
//!   reference implementation.
//!
//! # Architecture
//!
//! Bytes flow through the parser into access units, which an external
//! decoder (not part of this core) turns into decoded frames. Frames are
//! held as [`memory::Frame`] values and fed through the scaler zero-to-N
//! times per frame. A [`device::Context`] is threaded through all three
//! subsystems as a lightweight handle; it owns no pixel data itself.
//!
//! # Example
//!
//! ```no_run
//! use vaccel::device::Context;
//! use vaccel::format::{AllocKind, AllocFlags, VideoInfo, VideoFormat};
//! use vaccel::memory::Frame;
//!
//! # fn run() -> Result<(), vaccel::Error> {
//! let ctx = Context::create(-1, None, Default::default())?;
//! let info = VideoInfo::new(1920, 1080, VideoFormat::Y_UV8_420, Default::default());
//! let frame = Frame::allocate(&ctx, AllocKind::HostOnly, AllocFlags::empty(), 0, info)?;
//! let map = frame.map(vaccel::memory::MapFlags::WRITE)?;
//! println!("plane 0 is {} bytes", map.plane_sizes()[0]);
//! # Ok(())
//! # }
//! ```

use std::{error, fmt, io};

/// Unified error taxonomy for the device/memory subsystems (`spec.md` §7).
///
/// The H.264 parser and scaler engine have their own error types
/// ([`h264::Error`], [`scaler::Error`]) that add subsystem-specific normal
/// outcomes (`NeedMoreData`, `Timeout`, ...) on top of the same shape.
#[non_exhaustive]
#[derive(Debug)]
pub enum Error {
    /// A null, out-of-range, or malformed argument (e.g. an invalid rect).
    InvalidArgument(String),

    /// A memory allocation failed (host heap or device-backed buffer).
    AllocationFailure(String),

    /// Device open, buffer allocation on device, sync, or execution failed.
    DeviceError(String),

    /// The requested format or configuration was declined by the backend.
    NotSupported(String),

    /// Underlying I/O error (e.g. a bad file descriptor passed to `attach`).
    Io(io::Error),

    /// A null pointer or empty buffer was encountered where a valid one
    /// was expected.
    NullPointer,

    /// Catch-all for internal invariants violated.
    Error(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::AllocationFailure(msg) => write!(f, "allocation failure: {msg}"),
            Error::DeviceError(msg) => write!(f, "device error: {msg}"),
            Error::NotSupported(msg) => write!(f, "not supported: {msg}"),
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::NullPointer => write!(f, "null pointer or empty buffer"),
            Error::Error(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// Device/parser/scaler log level, threaded through [`device::Context`].
///
/// Maps onto the `log` crate's [`log::LevelFilter`] so a consumer that
/// installs any `log` subscriber sees the same verbosity the spec's
/// contexts record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Warning,
    Info,
    Debug,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
        }
    }
}

/// Device context: opens a device (or declares host-only), owns the
/// kernel-image identity, and is threaded through memory/parser/scaler as a
/// cheap handle.
pub mod device;

/// Video format, plane layout, and video-info data model (`spec.md` §3,
/// §4.2's plane-layout algorithm).
pub mod format;

/// Memory object / video-frame operations: allocate, map, sync, free.
pub mod memory;

/// H.264 Annex-B byte-stream parser.
pub mod h264;

/// Polyphase multi-scaler engine and its software reference backend.
pub mod scaler;
