// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Stateful H.264 Annex-B parser: reassembles NAL units into access units
//! and tracks SPS/PPS state across fragmented input (`spec.md` §4.3).
//!
//! `Codec::H265` is accepted by the type system (the contract in
//! `spec.md` §4.3 names both codecs) but [`Parser::create`] rejects it;
//! H.265 parsing is equivalent in shape but out of scope for this core.

mod bitreader;
mod config;
mod error;
mod nal;
mod parser;
mod pps;
mod slice;
mod sps;

pub use bitreader::{strip_emulation_prevention, BitReader};
pub use config::{DecoderInputConfig, ScanType};
pub use error::Error;
pub use nal::{NalHeader, NalUnitType};
pub use parser::{AccessUnit, Parser, Status};
pub use pps::Pps;
pub use slice::SliceHeader;
pub use sps::Sps;

/// Elementary stream codec a [`Parser`] is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    H265,
}
