// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! `DecoderInputConfig`: the decoder-facing summary re-derived after every
//! access unit and exposed only when it changes (`spec.md` §4.3
//! "Configuration emission").

/// Picture scan type. The parser core only ever derives `Progressive`
/// (interlaced derivation is out of scope, `spec.md` §1 Non-goals); the
/// variant exists so the field has a stable representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    Progressive,
    Interlaced,
}

/// Decoder-facing stream configuration, re-derived from the active SPS
/// after every successfully reassembled access unit.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderInputConfig {
    pub profile_idc: u8,
    pub level_idc: u8,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub width: u32,
    pub height: u32,
    /// `frame_rate` numerator, `None` if the stream carries no VUI timing.
    pub frame_rate: Option<u32>,
    /// `clock_ratio` denominator.
    pub clock_ratio: Option<u32>,
    /// Chroma mode is fixed at 4:2:0 for this core (`spec.md` §4.3).
    pub chroma_format_idc: u32,
    pub scan_type: ScanType,
    pub codec_id: super::Codec,
    /// Number of entropy buffers the consuming decoder should allocate.
    pub entropy_buffer_count: u32,
    pub split_buffer_mode: bool,
    pub low_latency: bool,
}

impl DecoderInputConfig {
    /// Builds the config from the currently active SPS, with the
    /// decoder-side defaults spelled out in `spec.md` §4.3.
    pub fn from_sps(sps: &super::sps::Sps, codec_id: super::Codec) -> DecoderInputConfig {
        DecoderInputConfig {
            profile_idc: sps.profile_idc,
            level_idc: sps.level_idc,
            bit_depth_luma_minus8: sps.bit_depth_luma_minus8,
            bit_depth_chroma_minus8: sps.bit_depth_chroma_minus8,
            width: sps.width,
            height: sps.height,
            frame_rate: sps.frame_rate,
            clock_ratio: sps.clock_ratio,
            chroma_format_idc: 1,
            scan_type: if sps.frame_mbs_only_flag {
                ScanType::Progressive
            } else {
                ScanType::Interlaced
            },
            codec_id,
            entropy_buffer_count: 2,
            split_buffer_mode: false,
            low_latency: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h264::sps::Sps;
    use crate::h264::Codec;

    fn sps_1080p() -> Sps {
        Sps {
            seq_parameter_set_id: 0,
            profile_idc: 100,
            level_idc: 40,
            chroma_format_idc: 1,
            bit_depth_luma_minus8: 0,
            bit_depth_chroma_minus8: 0,
            log2_max_frame_num_minus4: 0,
            pic_order_cnt_type: 0,
            log2_max_pic_order_cnt_lsb_minus4: 0,
            delta_pic_order_always_zero_flag: false,
            frame_mbs_only_flag: true,
            width: 1920,
            height: 1080,
            frame_rate: Some(30),
            clock_ratio: Some(1),
        }
    }

    #[test]
    fn derives_progressive_config_from_sps() {
        let config = DecoderInputConfig::from_sps(&sps_1080p(), Codec::H264);
        assert_eq!(config.width, 1920);
        assert_eq!(config.height, 1080);
        assert_eq!(config.scan_type, ScanType::Progressive);
        assert_eq!(config.chroma_format_idc, 1);
        assert_eq!(config.entropy_buffer_count, 2);
    }

    #[test]
    fn interlaced_sps_yields_interlaced_scan_type() {
        let mut sps = sps_1080p();
        sps.frame_mbs_only_flag = false;
        let config = DecoderInputConfig::from_sps(&sps, Codec::H264);
        assert_eq!(config.scan_type, ScanType::Interlaced);
    }

    #[test]
    fn unchanged_config_compares_equal() {
        let a = DecoderInputConfig::from_sps(&sps_1080p(), Codec::H264);
        let b = DecoderInputConfig::from_sps(&sps_1080p(), Codec::H264);
        assert_eq!(a, b);
    }

    #[test]
    fn width_change_is_detected_by_equality() {
        let a = DecoderInputConfig::from_sps(&sps_1080p(), Codec::H264);
        let mut changed_sps = sps_1080p();
        changed_sps.width = 1280;
        let b = DecoderInputConfig::from_sps(&changed_sps, Codec::H264);
        assert_ne!(a, b);
    }
}
