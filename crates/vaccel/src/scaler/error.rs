// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use std::{error, fmt};

/// Error taxonomy for the scaler engine (`spec.md` §7).
#[non_exhaustive]
#[derive(Debug)]
pub enum Error {
    InvalidArgument(String),
    AllocationFailure(String),
    DeviceError(String),
    NotSupported(String),
    /// The hardware backend exhausted its wait budget (`spec.md` §4.4
    /// execution: 1-second timeout, up to 10 retries).
    Timeout,
    Error(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::AllocationFailure(msg) => write!(f, "allocation failure: {msg}"),
            Error::DeviceError(msg) => write!(f, "device error: {msg}"),
            Error::NotSupported(msg) => write!(f, "not supported: {msg}"),
            Error::Timeout => write!(f, "timed out waiting for backend completion"),
            Error::Error(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl error::Error for Error {}

impl From<crate::Error> for Error {
    fn from(err: crate::Error) -> Self {
        match err {
            crate::Error::InvalidArgument(msg) => Error::InvalidArgument(msg),
            crate::Error::AllocationFailure(msg) => Error::AllocationFailure(msg),
            crate::Error::DeviceError(msg) => Error::DeviceError(msg),
            crate::Error::NotSupported(msg) => Error::NotSupported(msg),
            other => Error::Error(other.to_string()),
        }
    }
}
