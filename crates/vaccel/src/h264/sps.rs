// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Sequence parameter set parsing and width/height/frame-rate derivation.

use super::bitreader::BitReader;
use super::Error;

/// Maximum number of distinct `seq_parameter_set_id` values tracked
/// (`spec.md` §3 "Parser state").
pub const MAX_SPS: usize = 32;

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Parsed sequence parameter set fields needed by access-unit reassembly,
/// the new-picture predicate, and `DecoderInputConfig` derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    pub seq_parameter_set_id: u32,
    pub profile_idc: u8,
    pub level_idc: u8,
    pub chroma_format_idc: u32,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub log2_max_frame_num_minus4: u32,
    pub pic_order_cnt_type: u32,
    pub log2_max_pic_order_cnt_lsb_minus4: u32,
    pub delta_pic_order_always_zero_flag: bool,
    pub frame_mbs_only_flag: bool,
    pub width: u32,
    pub height: u32,
    /// `frame_rate` numerator as defined by `spec.md` §4.3 ("`frame_rate =
    /// time_scale`"), or `None` if the VUI carried no timing info.
    pub frame_rate: Option<u32>,
    /// `clock_ratio` denominator, reduced by GCD against `frame_rate`.
    pub clock_ratio: Option<u32>,
}

const PROFILES_WITH_CHROMA_INFO: &[u8] = &[
    100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134, 135,
];

/// Crop-unit table keyed by chroma format, per `spec.md` §4.3 ("chroma-format-dependent crop-unit table").
fn crop_units(chroma_format_idc: u32, frame_mbs_only_flag: bool) -> (u32, u32) {
    let (sub_width_c, sub_height_c) = match chroma_format_idc {
        0 => (1, 1),  // monochrome
        1 => (2, 2),  // 4:2:0
        2 => (2, 1),  // 4:2:2
        3 => (1, 1),  // 4:4:4
        _ => (1, 1),
    };
    let crop_unit_x = sub_width_c;
    let crop_unit_y = sub_height_c * if frame_mbs_only_flag { 1 } else { 2 };
    (crop_unit_x, crop_unit_y)
}

impl Sps {
    /// Parses an SPS RBSP (emulation-prevention bytes already stripped).
    pub fn parse(rbsp: &[u8]) -> Result<Sps, Error> {
        let mut r = BitReader::new(rbsp);

        let profile_idc = r.read_bits(8)? as u8;
        let _constraint_flags = r.read_bits(8)?;
        let level_idc = r.read_bits(8)? as u8;
        let seq_parameter_set_id = r.read_ue()?;

        let mut chroma_format_idc = 1u32; // default 4:2:0 when absent
        let mut bit_depth_luma_minus8 = 0u32;
        let mut bit_depth_chroma_minus8 = 0u32;
        if PROFILES_WITH_CHROMA_INFO.contains(&profile_idc) {
            chroma_format_idc = r.read_ue()?;
            if chroma_format_idc == 3 {
                let _separate_colour_plane_flag = r.read_flag()?;
            }
            bit_depth_luma_minus8 = r.read_ue()?;
            bit_depth_chroma_minus8 = r.read_ue()?;
            let _qpprime_y_zero_transform_bypass_flag = r.read_flag()?;
            let seq_scaling_matrix_present_flag = r.read_flag()?;
            if seq_scaling_matrix_present_flag {
                return Err(Error::Error(
                    "scaling matrices in SPS are not supported".into(),
                ));
            }
        }

        let log2_max_frame_num_minus4 = r.read_ue()?;
        let pic_order_cnt_type = r.read_ue()?;
        let mut log2_max_pic_order_cnt_lsb_minus4 = 0u32;
        let mut delta_pic_order_always_zero_flag = false;
        match pic_order_cnt_type {
            0 => {
                log2_max_pic_order_cnt_lsb_minus4 = r.read_ue()?;
            }
            1 => {
                delta_pic_order_always_zero_flag = r.read_flag()?;
                let _offset_for_non_ref_pic = r.read_se()?;
                let _offset_for_top_to_bottom_field = r.read_se()?;
                let num_ref_frames_in_pic_order_cnt_cycle = r.read_ue()?;
                for _ in 0..num_ref_frames_in_pic_order_cnt_cycle {
                    let _offset_for_ref_frame = r.read_se()?;
                }
            }
            _ => {}
        }

        let _max_num_ref_frames = r.read_ue()?;
        let _gaps_in_frame_num_value_allowed_flag = r.read_flag()?;
        let pic_width_in_mbs_minus1 = r.read_ue()?;
        let pic_height_in_map_units_minus1 = r.read_ue()?;
        let frame_mbs_only_flag = r.read_flag()?;
        if !frame_mbs_only_flag {
            let _mb_adaptive_frame_field_flag = r.read_flag()?;
        }
        let _direct_8x8_inference_flag = r.read_flag()?;

        let frame_cropping_flag = r.read_flag()?;
        let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0u32, 0u32, 0u32, 0u32);
        if frame_cropping_flag {
            crop_left = r.read_ue()?;
            crop_right = r.read_ue()?;
            crop_top = r.read_ue()?;
            crop_bottom = r.read_ue()?;
        }

        let pic_width_in_samples = (pic_width_in_mbs_minus1 + 1) * 16;
        let frame_height_in_mbs = (2 - frame_mbs_only_flag as u32) * (pic_height_in_map_units_minus1 + 1);
        let pic_height_in_samples = frame_height_in_mbs * 16;

        let (crop_unit_x, crop_unit_y) = crop_units(chroma_format_idc, frame_mbs_only_flag);
        let width = pic_width_in_samples - (crop_left + crop_right) * crop_unit_x;
        let height = pic_height_in_samples - (crop_top + crop_bottom) * crop_unit_y;

        let vui_parameters_present_flag = r.read_flag()?;
        let mut frame_rate = None;
        let mut clock_ratio = None;
        if vui_parameters_present_flag {
            let (fr, cr) = parse_vui_timing(&mut r)?;
            frame_rate = fr;
            clock_ratio = cr;
        }

        Ok(Sps {
            seq_parameter_set_id,
            profile_idc,
            level_idc,
            chroma_format_idc,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            log2_max_frame_num_minus4,
            pic_order_cnt_type,
            log2_max_pic_order_cnt_lsb_minus4,
            delta_pic_order_always_zero_flag,
            frame_mbs_only_flag,
            width,
            height,
            frame_rate,
            clock_ratio,
        })
    }
}

/// Walks just enough of the VUI to reach `timing_info`, skipping the
/// aspect-ratio and overscan/video-signal-type/chroma-loc sections this
/// core does not otherwise need.
fn parse_vui_timing(r: &mut BitReader<'_>) -> Result<(Option<u32>, Option<u32>), Error> {
    let aspect_ratio_info_present_flag = r.read_flag()?;
    if aspect_ratio_info_present_flag {
        let aspect_ratio_idc = r.read_bits(8)?;
        if aspect_ratio_idc == 255 {
            let _sar_width = r.read_bits(16)?;
            let _sar_height = r.read_bits(16)?;
        }
    }
    let overscan_info_present_flag = r.read_flag()?;
    if overscan_info_present_flag {
        let _overscan_appropriate_flag = r.read_flag()?;
    }
    let video_signal_type_present_flag = r.read_flag()?;
    if video_signal_type_present_flag {
        let _video_format = r.read_bits(3)?;
        let _video_full_range_flag = r.read_flag()?;
        let colour_description_present_flag = r.read_flag()?;
        if colour_description_present_flag {
            let _colour_primaries = r.read_bits(8)?;
            let _transfer_characteristics = r.read_bits(8)?;
            let _matrix_coefficients = r.read_bits(8)?;
        }
    }
    let chroma_loc_info_present_flag = r.read_flag()?;
    if chroma_loc_info_present_flag {
        let _chroma_sample_loc_type_top_field = r.read_ue()?;
        let _chroma_sample_loc_type_bottom_field = r.read_ue()?;
    }

    let timing_info_present_flag = r.read_flag()?;
    if !timing_info_present_flag {
        return Ok((None, None));
    }

    let num_units_in_tick = r.read_bits(32)?;
    let time_scale = r.read_bits(32)?;
    let _fixed_frame_rate_flag = r.read_flag()?;

    let frame_rate = time_scale;
    let mut clock_ratio = num_units_in_tick.saturating_mul(2);
    if clock_ratio == 0 {
        return Err(Error::Error(
            "invalid VUI timing info: clock_ratio is zero".into(),
        ));
    }
    let divisor = gcd(frame_rate, clock_ratio).max(1);
    Ok((Some(frame_rate / divisor), Some(clock_ratio / divisor)))
}
