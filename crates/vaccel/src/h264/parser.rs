// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Annex-B byte-stream state machine: reassembles NAL units into access
//! units and tracks SPS/PPS state across fragmented input (`spec.md`
//! §4.3).

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::device::Context;
use crate::LogLevel;

use super::bitreader::strip_emulation_prevention;
use super::config::DecoderInputConfig;
use super::nal::{NalHeader, NalUnitType};
use super::pps::{Pps, MAX_PPS};
use super::slice::{is_new_picture, SliceHeader};
use super::sps::{Sps, MAX_SPS};
use super::{Codec, Error};

bitflags! {
    /// Cumulative parser state (`spec.md` §4.3 "State machine").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct ParseState: u8 {
        const HAVE_SPS   = 0b001;
        const HAVE_PPS   = 0b010;
        const HAVE_FRAME = 0b100;
    }
}

/// Outcome of a single [`Parser::get_access_unit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    NeedMoreData,
    EndOfStream,
}

/// Result of [`Parser::get_access_unit`]: `(out_buffer?, config?,
/// new_in_offset, status)` from `spec.md` §4.3, as a named struct.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessUnit {
    pub out_buffer: Option<Vec<u8>>,
    pub config: Option<DecoderInputConfig>,
    pub new_in_offset: usize,
    pub status: Status,
}

/// Stateful Annex-B parser. One `Parser` tracks one elementary stream: its
/// SPS/PPS tables, the access unit under construction, and residue carried
/// across fragmented `get_access_unit` calls.
pub struct Parser {
    #[allow(dead_code)]
    context: Context,
    codec: Codec,
    #[allow(dead_code)]
    log_level: LogLevel,

    sps_table: BTreeMap<u32, Sps>,
    pps_table: BTreeMap<u32, Pps>,
    state: ParseState,

    /// Bytes (with Annex-B start codes) of NALUs already folded into the
    /// access unit under construction.
    partial_au: Vec<u8>,
    has_slice: bool,
    last_slice_header: Option<SliceHeader>,

    /// Tail bytes carried over from the previous call: either an
    /// undecided trailing NALU, or (at end of buffer) nothing at all
    /// (`spec.md` §4.3 "Partial-input management").
    partial_input: Vec<u8>,

    last_emitted_config: Option<DecoderInputConfig>,
}

impl Parser {
    /// Creates a parser bound to `ctx`. Only `Codec::H264` is implemented;
    /// H.265 is equivalent in shape but out of scope (`spec.md` §4.3).
    pub fn create(ctx: &Context, codec: Codec, log_level: LogLevel) -> Result<Parser, Error> {
        if codec != Codec::H264 {
            return Err(Error::InvalidArgument(
                "only Codec::H264 is implemented by this parser core".into(),
            ));
        }
        Ok(Parser {
            context: ctx.clone(),
            codec,
            log_level,
            sps_table: BTreeMap::new(),
            pps_table: BTreeMap::new(),
            state: ParseState::empty(),
            partial_au: Vec::new(),
            has_slice: false,
            last_slice_header: None,
            partial_input: Vec::new(),
            last_emitted_config: None,
        })
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Feeds `in_buffer` into the parser and attempts to produce exactly
    /// one access unit, per `spec.md` §4.3.
    pub fn get_access_unit(&mut self, in_buffer: &[u8], is_eos: bool) -> Result<AccessUnit, Error> {
        let carry_len = self.partial_input.len();
        let mut buffer = std::mem::take(&mut self.partial_input);
        buffer.extend_from_slice(in_buffer);

        let consumed_of_new = |absolute: usize| absolute.saturating_sub(carry_len).min(in_buffer.len());

        let mut cursor = 0usize;
        loop {
            let sc_pos = match find_next_start_code(&buffer, cursor) {
                Some(pos) => pos,
                None => {
                    self.partial_input = buffer[cursor..].to_vec();
                    if is_eos {
                        return Ok(self.flush(in_buffer.len()));
                    }
                    return Ok(AccessUnit {
                        out_buffer: None,
                        config: None,
                        new_in_offset: in_buffer.len(),
                        status: Status::NeedMoreData,
                    });
                }
            };
            let start_len = start_code_len(&buffer, sc_pos);
            let payload_start = sc_pos + start_len;

            match find_next_start_code(&buffer, payload_start) {
                Some(next_sc) => {
                    let raw_nalu = buffer[sc_pos..next_sc].to_vec();
                    if let Some(out) = self.process_nalu(&raw_nalu)? {
                        self.partial_input = buffer[next_sc..].to_vec();
                        return Ok(AccessUnit {
                            out_buffer: Some(out),
                            config: self.take_config_if_changed(),
                            new_in_offset: consumed_of_new(next_sc),
                            status: Status::Success,
                        });
                    }
                    cursor = next_sc;
                }
                None => {
                    if is_eos {
                        let raw_nalu = buffer[sc_pos..].to_vec();
                        if let Some(out) = self.process_nalu(&raw_nalu)? {
                            // This final NALU started a new picture (transition
                            // 5): the just-completed access unit is emitted now
                            // and the NALU that opened the next one stays in
                            // `partial_au` for `flush` to emit on the caller's
                            // next `is_eos` call.
                            self.partial_input.clear();
                            return Ok(AccessUnit {
                                out_buffer: Some(out),
                                config: self.take_config_if_changed(),
                                new_in_offset: in_buffer.len(),
                                status: Status::Success,
                            });
                        }
                        return Ok(self.flush(in_buffer.len()));
                    }
                    self.partial_input = buffer[sc_pos..].to_vec();
                    return Ok(AccessUnit {
                        out_buffer: None,
                        config: None,
                        new_in_offset: in_buffer.len(),
                        status: Status::NeedMoreData,
                    });
                }
            }
        }
    }

    /// Transition 7: flush whatever partial output exists as one final
    /// access unit.
    fn flush(&mut self, new_in_offset: usize) -> AccessUnit {
        self.partial_input.clear();
        if self.has_slice || !self.partial_au.is_empty() {
            let out = std::mem::take(&mut self.partial_au);
            self.has_slice = false;
            AccessUnit {
                out_buffer: Some(out),
                config: self.take_config_if_changed(),
                new_in_offset,
                status: Status::Success,
            }
        } else {
            AccessUnit {
                out_buffer: None,
                config: None,
                new_in_offset,
                status: Status::EndOfStream,
            }
        }
    }

    /// Applies transitions 1-6 of `spec.md` §4.3 to a single raw NALU
    /// (Annex-B start code included). Returns the just-completed access
    /// unit's bytes when this NALU triggers an emission.
    fn process_nalu(&mut self, raw: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let start_len = start_code_len(raw, 0);
        if raw.len() <= start_len {
            return Ok(None);
        }
        let payload = &raw[start_len..];
        let nal = NalHeader::parse(payload[0]);
        let rbsp = strip_emulation_prevention(&payload[1..]);

        match nal.nal_unit_type {
            NalUnitType::Sps => {
                let sps = Sps::parse(&rbsp)?;
                let id = sps.seq_parameter_set_id;
                if id as usize >= MAX_SPS {
                    return Err(Error::InvalidArgument(format!(
                        "seq_parameter_set_id {id} exceeds the {MAX_SPS}-entry SPS table"
                    )));
                }
                self.sps_table.insert(id, sps);
                self.state.insert(ParseState::HAVE_SPS);
                Ok(None)
            }
            NalUnitType::Pps => {
                let pps = Pps::parse(&rbsp)?;
                let id = pps.pic_parameter_set_id;
                if id as usize >= MAX_PPS {
                    return Err(Error::InvalidArgument(format!(
                        "pic_parameter_set_id {id} exceeds the {MAX_PPS}-entry PPS table"
                    )));
                }
                self.pps_table.insert(id, pps);
                self.state.insert(ParseState::HAVE_PPS);
                Ok(None)
            }
            _ if !self.state.contains(ParseState::HAVE_SPS) => {
                // Transition 3: no SPS yet, discard any partial output.
                self.partial_au.clear();
                self.has_slice = false;
                self.last_slice_header = None;
                Ok(None)
            }
            nal_type if nal_type.is_vcl() => self.process_vcl_nalu(nal, raw, &rbsp),
            _ => {
                // Transition 6: non-VCL NALU other than SPS/PPS.
                if self.has_slice {
                    let completed = std::mem::take(&mut self.partial_au);
                    self.has_slice = false;
                    self.last_slice_header = None;
                    self.partial_au.extend_from_slice(raw);
                    self.state.remove(ParseState::HAVE_FRAME);
                    Ok(Some(completed))
                } else {
                    self.partial_au.extend_from_slice(raw);
                    Ok(None)
                }
            }
        }
    }

    fn process_vcl_nalu(
        &mut self,
        nal: NalHeader,
        raw: &[u8],
        rbsp: &[u8],
    ) -> Result<Option<Vec<u8>>, Error> {
        let header = SliceHeader::parse(nal, rbsp, &self.pps_table, &self.sps_table)?;
        let sps_id = self
            .pps_table
            .get(&header.pic_parameter_set_id)
            .map(|pps| pps.seq_parameter_set_id)
            .ok_or_else(|| {
                Error::Error(format!(
                    "slice references unknown pic_parameter_set_id {}",
                    header.pic_parameter_set_id
                ))
            })?;
        let sps = self
            .sps_table
            .get(&sps_id)
            .cloned()
            .ok_or_else(|| Error::Error(format!("PPS references unknown seq_parameter_set_id {sps_id}")))?;

        if !self.has_slice {
            // Transition 4: first slice of a new access unit.
            self.partial_au.extend_from_slice(raw);
            self.has_slice = true;
            self.last_slice_header = Some(header);
            self.state.insert(ParseState::HAVE_FRAME);
            return Ok(None);
        }

        // Transition 5: compare against the previous slice header.
        let previous = self
            .last_slice_header
            .as_ref()
            .expect("has_slice implies a previous slice header");
        if is_new_picture(previous, &header, &sps) {
            let completed = std::mem::take(&mut self.partial_au);
            self.partial_au.extend_from_slice(raw);
            self.last_slice_header = Some(header);
            Ok(Some(completed))
        } else {
            self.partial_au.extend_from_slice(raw);
            self.last_slice_header = Some(header);
            Ok(None)
        }
    }

    /// Re-derives `DecoderInputConfig` from the most recently parsed SPS
    /// and exposes it only if it changed since the last emission
    /// (`spec.md` §4.3 "Configuration emission").
    fn take_config_if_changed(&mut self) -> Option<DecoderInputConfig> {
        let sps_id = self.last_slice_header.as_ref().and_then(|header| {
            self.pps_table
                .get(&header.pic_parameter_set_id)
                .map(|pps| pps.seq_parameter_set_id)
        })?;
        let sps = self.sps_table.get(&sps_id)?;
        let config = DecoderInputConfig::from_sps(sps, self.codec);
        if self.last_emitted_config.as_ref() == Some(&config) {
            None
        } else {
            self.last_emitted_config = Some(config.clone());
            Some(config)
        }
    }
}

/// Searches `data[from..]` for the next Annex-B start code
/// (`00 00 01` or `00 00 00 01`), returning the index of its first byte.
fn find_next_start_code(data: &[u8], from: usize) -> Option<usize> {
    if data.len() < 3 {
        return None;
    }
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// `3` for `00 00 01`, `4` for `00 00 00 01`.
fn start_code_len(data: &[u8], pos: usize) -> usize {
    if pos + 4 <= data.len() && data[pos..pos + 4] == [0, 0, 0, 1] {
        4
    } else {
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_context() -> Context {
        Context::create(-1, None, LogLevel::Warning).unwrap()
    }

    fn sps_nalu() -> Vec<u8> {
        // Minimal baseline-profile SPS for 64x64 (4x4 macroblocks, no
        // VUI), matching the shape used by sps.rs's own unit tests.
        fn ue(value: u32) -> String {
            let code = value + 1;
            let bit_len = 32 - code.leading_zeros();
            let prefix_zeros = bit_len - 1;
            format!(
                "{}{:0width$b}",
                "0".repeat(prefix_zeros as usize),
                code,
                width = bit_len as usize
            )
        }
        fn bits_to_bytes(bits: &str) -> Vec<u8> {
            let mut padded = bits.to_string();
            while padded.len() % 8 != 0 {
                padded.push('0');
            }
            padded
                .as_bytes()
                .chunks(8)
                .map(|chunk| u8::from_str_radix(std::str::from_utf8(chunk).unwrap(), 2).unwrap())
                .collect()
        }
        let mut bits = String::new();
        bits.push_str(&format!("{:08b}", 66u8)); // profile_idc
        bits.push_str("00000000"); // constraint flags
        bits.push_str(&format!("{:08b}", 30u8)); // level_idc
        bits.push_str(&ue(0)); // seq_parameter_set_id
        bits.push_str(&ue(0)); // log2_max_frame_num_minus4
        bits.push_str(&ue(0)); // pic_order_cnt_type
        bits.push_str(&ue(0)); // log2_max_pic_order_cnt_lsb_minus4
        bits.push_str(&ue(0)); // max_num_ref_frames
        bits.push('0'); // gaps_in_frame_num_value_allowed_flag
        bits.push_str(&ue(3)); // pic_width_in_mbs_minus1 -> 4 mbs -> 64px
        bits.push_str(&ue(3)); // pic_height_in_map_units_minus1 -> 64px
        bits.push('1'); // frame_mbs_only_flag
        bits.push('0'); // direct_8x8_inference_flag
        bits.push('0'); // frame_cropping_flag
        bits.push('0'); // vui_parameters_present_flag
        let rbsp = bits_to_bytes(&bits);

        let mut nalu = vec![0, 0, 0, 1, 0b0_11_00111]; // ref_idc=3, type=7 (SPS)
        nalu.extend_from_slice(&rbsp);
        nalu
    }

    fn pps_nalu() -> Vec<u8> {
        // pps_id=0, sps_id=0, entropy_coding_mode_flag=0,
        // bottom_field_pic_order_in_frame_present_flag=0
        let rbsp = [0b1100_0000u8];
        let mut nalu = vec![0, 0, 0, 1, 0b0_11_01000]; // type=8 (PPS)
        nalu.extend_from_slice(&rbsp);
        nalu
    }

    fn idr_slice_nalu(frame_num_bit: u8) -> Vec<u8> {
        // first_mb_in_slice=0, slice_type=0, pps_id=0, frame_num(4 bits),
        // idr_pic_id=0, pic_order_cnt_lsb(4 bits)=0
        let bits = format!("111{frame_num_bit:01}000" ) + "1" + "0000";
        let mut padded = bits.clone();
        while padded.len() % 8 != 0 {
            padded.push('0');
        }
        let rbsp: Vec<u8> = padded
            .as_bytes()
            .chunks(8)
            .map(|c| u8::from_str_radix(std::str::from_utf8(c).unwrap(), 2).unwrap())
            .collect();
        let mut nalu = vec![0, 0, 0, 1, 0b0_11_00101]; // ref_idc=3, type=5 (IDR)
        nalu.extend_from_slice(&rbsp);
        nalu
    }

    #[test]
    fn sps_then_pps_sets_state_without_emitting() {
        let ctx = make_context();
        let mut parser = Parser::create(&ctx, Codec::H264, LogLevel::Warning).unwrap();
        let mut input = sps_nalu();
        input.extend_from_slice(&pps_nalu());
        let result = parser.get_access_unit(&input, false).unwrap();
        assert_eq!(result.status, Status::NeedMoreData);
        assert!(result.out_buffer.is_none());
    }

    #[test]
    fn two_idr_slices_with_different_frame_num_split_into_two_access_units() {
        let ctx = make_context();
        let mut parser = Parser::create(&ctx, Codec::H264, LogLevel::Warning).unwrap();

        let mut input = sps_nalu();
        input.extend_from_slice(&pps_nalu());
        input.extend_from_slice(&idr_slice_nalu(0));
        input.extend_from_slice(&idr_slice_nalu(1));

        // IDR(1) is the trailing NALU with no following start code and
        // `is_eos` is false, so the parser cannot yet tell whether more
        // bytes belonging to it are still coming.
        let first = parser.get_access_unit(&input, false).unwrap();
        assert_eq!(first.status, Status::NeedMoreData);
        assert!(first.out_buffer.is_none());

        let remainder = &input[first.new_in_offset..];
        let second = parser.get_access_unit(remainder, true).unwrap();
        assert_eq!(second.status, Status::Success);
        assert!(second.out_buffer.is_some());
        assert!(second.config.is_some());
    }

    #[test]
    fn eos_with_no_pending_output_reports_end_of_stream() {
        let ctx = make_context();
        let mut parser = Parser::create(&ctx, Codec::H264, LogLevel::Warning).unwrap();
        let result = parser.get_access_unit(&[], true).unwrap();
        assert_eq!(result.status, Status::EndOfStream);
    }

    #[test]
    fn eos_flushes_remaining_partial_access_unit() {
        let ctx = make_context();
        let mut parser = Parser::create(&ctx, Codec::H264, LogLevel::Warning).unwrap();
        let mut input = sps_nalu();
        input.extend_from_slice(&pps_nalu());
        input.extend_from_slice(&idr_slice_nalu(0));
        let result = parser.get_access_unit(&input, true).unwrap();
        assert_eq!(result.status, Status::Success);
        assert!(result.out_buffer.unwrap().len() > 0);
    }

    #[test]
    fn byte_at_a_time_fragmentation_still_reassembles() {
        let ctx = make_context();
        let mut parser = Parser::create(&ctx, Codec::H264, LogLevel::Warning).unwrap();

        let mut input = sps_nalu();
        input.extend_from_slice(&pps_nalu());
        input.extend_from_slice(&idr_slice_nalu(0));
        input.extend_from_slice(&idr_slice_nalu(1));

        let mut produced = 0;
        let mut offset = 0;
        while offset < input.len() {
            let end = (offset + 1).min(input.len());
            let result = parser.get_access_unit(&input[offset..end], false).unwrap();
            offset = end;
            if result.status == Status::Success {
                produced += 1;
            }
        }
        // Draining at EOS may itself take more than one call now: the
        // trailing IDR(1) NALU completes IDR(0)'s access unit first, and
        // IDR(1)'s own access unit isn't flushed until the next call.
        loop {
            let flush = parser.get_access_unit(&[], true).unwrap();
            match flush.status {
                Status::Success => produced += 1,
                Status::EndOfStream => break,
                Status::NeedMoreData => panic!("is_eos=true must not report NeedMoreData"),
            }
        }
        assert_eq!(produced, 2);
    }

    #[test]
    fn non_h264_codec_is_rejected() {
        let ctx = make_context();
        assert!(Parser::create(&ctx, Codec::H265, LogLevel::Warning).is_err());
    }

    #[test]
    fn config_emitted_once_per_sps_change() {
        let ctx = make_context();
        let mut parser = Parser::create(&ctx, Codec::H264, LogLevel::Warning).unwrap();
        let mut input = sps_nalu();
        input.extend_from_slice(&pps_nalu());
        input.extend_from_slice(&idr_slice_nalu(0));
        input.extend_from_slice(&idr_slice_nalu(1));
        let first = parser.get_access_unit(&input, false).unwrap();
        assert_eq!(first.status, Status::NeedMoreData);
        assert!(first.config.is_none());

        // First successful access unit (IDR(0)) carries the config.
        let remainder = input[first.new_in_offset..].to_vec();
        let second = parser.get_access_unit(&remainder, true).unwrap();
        assert_eq!(second.status, Status::Success);
        assert!(second.config.is_some());

        // IDR(1)'s access unit, flushed on the next call, is still under
        // the same unchanged SPS, so no config is re-emitted.
        let third = parser.get_access_unit(&[], true).unwrap();
        assert_eq!(third.status, Status::Success);
        assert!(third.config.is_none());
    }
}
