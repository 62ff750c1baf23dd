// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use std::{error, fmt};

/// Error/normal-outcome taxonomy for the H.264 parser (`spec.md` §7).
///
/// `NeedMoreData` and `EndOfStream` are not failures: they are returned
/// from [`crate::h264::Parser::get_access_unit`] as ordinary control flow.
#[non_exhaustive]
#[derive(Debug)]
pub enum Error {
    InvalidArgument(String),
    AllocationFailure(String),
    /// More input is required before an access unit can be produced.
    NeedMoreData,
    /// The caller signaled `is_eos` and the parser has nothing left to
    /// flush.
    EndOfStream,
    /// Catch-all for internal invariants violated (malformed SPS/PPS,
    /// zero `clock_ratio`, and similar).
    Error(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::AllocationFailure(msg) => write!(f, "allocation failure: {msg}"),
            Error::NeedMoreData => write!(f, "need more data"),
            Error::EndOfStream => write!(f, "end of stream"),
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
            other => Error::Error(other.to_string()),
        }
    }
}
