// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Picture parameter set parsing.

use super::bitreader::BitReader;
use super::Error;

/// Maximum number of distinct `pic_parameter_set_id` values tracked
/// (`spec.md` §3 "Parser state").
pub const MAX_PPS: usize = 256;

/// Parsed picture parameter set fields needed by slice-header parsing and
/// the new-picture predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pps {
    pub pic_parameter_set_id: u32,
    pub seq_parameter_set_id: u32,
    pub bottom_field_pic_order_in_frame_present_flag: bool,
}

impl Pps {
    /// Parses a PPS RBSP (emulation-prevention bytes already stripped).
    ///
    /// Only the fields the parser's slice-header logic depends on are
    /// decoded; the remaining PPS syntax (deblocking/quantization
    /// defaults) is irrelevant to access-unit reassembly and is skipped.
    pub fn parse(rbsp: &[u8]) -> Result<Pps, Error> {
        let mut r = BitReader::new(rbsp);
        let pic_parameter_set_id = r.read_ue()?;
        let seq_parameter_set_id = r.read_ue()?;
        let _entropy_coding_mode_flag = r.read_flag()?;
        let bottom_field_pic_order_in_frame_present_flag = r.read_flag()?;

        Ok(Pps {
            pic_parameter_set_id,
            seq_parameter_set_id,
            bottom_field_pic_order_in_frame_present_flag,
        })
    }
}
