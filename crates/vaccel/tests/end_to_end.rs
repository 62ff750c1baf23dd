// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies
//
// End-to-end scenarios exercising the device/memory, H.264 parsing, and
// scaler subsystems together through their public API, without any real
// hardware backend.
//
// RUN:
//   cargo test --test end_to_end

use vaccel::device::Context;
use vaccel::format::{AllocFlags, AllocKind, Alignment, VideoFormat, VideoInfo};
use vaccel::h264::{strip_emulation_prevention, Codec, Parser, Status};
use vaccel::memory::{Frame, MapFlags};
use vaccel::scaler::{PreProcess, Rect, ScaleType, Scaler};
use vaccel::LogLevel;

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

/// Baseline-profile SPS rbsp bits for a `16 * (mbs+1)` square frame, no VUI.
fn sps_rbsp_bits(mbs_minus1: u32) -> String {
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
    bits.push_str(&ue(mbs_minus1)); // pic_width_in_mbs_minus1
    bits.push_str(&ue(mbs_minus1)); // pic_height_in_map_units_minus1
    bits.push('1'); // frame_mbs_only_flag
    bits.push('0'); // direct_8x8_inference_flag
    bits.push('0'); // frame_cropping_flag
    bits.push('0'); // vui_parameters_present_flag
    bits
}

fn sps_nalu(mbs_minus1: u32) -> Vec<u8> {
    let rbsp = bits_to_bytes(&sps_rbsp_bits(mbs_minus1));
    let mut nalu = vec![0, 0, 0, 1, 0b0_11_00111]; // ref_idc=3, type=7 (SPS)
    nalu.extend_from_slice(&rbsp);
    nalu
}

fn pps_nalu() -> Vec<u8> {
    let rbsp = [0b1100_0000u8]; // pps_id=0, sps_id=0
    let mut nalu = vec![0, 0, 0, 1, 0b0_11_01000]; // type=8 (PPS)
    nalu.extend_from_slice(&rbsp);
    nalu
}

fn idr_slice_nalu(frame_num_bit: u8) -> Vec<u8> {
    let bits = format!("111{frame_num_bit:01}000") + "1" + "0000";
    let rbsp = bits_to_bytes(&bits);
    let mut nalu = vec![0, 0, 0, 1, 0b0_11_00101]; // ref_idc=3, type=5 (IDR)
    nalu.extend_from_slice(&rbsp);
    nalu
}

/// Scenario: a two-frame Annex-B stream (SPS/PPS + two IDR pictures) yields
/// one access unit per picture and a config sized to the SPS geometry.
#[test]
fn parse_two_pictures_into_two_access_units_with_config() {
    let _ = env_logger::builder().is_test(true).try_init();
    let ctx = Context::host_only(LogLevel::Warning);
    let mut parser = Parser::create(&ctx, Codec::H264, LogLevel::Warning).unwrap();

    let mut input = sps_nalu(3); // 4 mbs -> 64x64
    input.extend_from_slice(&pps_nalu());
    input.extend_from_slice(&idr_slice_nalu(0));
    input.extend_from_slice(&idr_slice_nalu(1));

    let first = parser.get_access_unit(&input, false).unwrap();
    assert_eq!(first.status, Status::Success);
    let config = first.config.expect("first access unit carries config");
    assert_eq!(config.width, 64);
    assert_eq!(config.height, 64);

    let remainder = &input[first.new_in_offset..];
    let second = parser.get_access_unit(remainder, true).unwrap();
    assert_eq!(second.status, Status::Success);
    assert!(second.out_buffer.is_some());
}

/// Scenario: an SPS whose encoded rbsp happens to contain a raw `00 00`
/// pair is only valid Annex-B once emulation-prevention-escaped; the parser
/// must strip the inserted `0x03` and recover the exact same geometry as
/// the unescaped encoding.
#[test]
fn emulation_prevention_bytes_are_stripped_before_parsing() {
    let _ = env_logger::builder().is_test(true).try_init();
    let rbsp = bits_to_bytes(&sps_rbsp_bits(3));
    assert!(
        rbsp.windows(2).any(|w| w == [0, 0]),
        "fixture must contain a 00 00 run to exercise escaping"
    );

    let mut escaped = Vec::with_capacity(rbsp.len() + 1);
    let mut zero_run = 0u32;
    for &byte in &rbsp {
        if zero_run >= 2 && byte <= 3 {
            escaped.push(0x03);
            zero_run = 0;
        }
        escaped.push(byte);
        if byte == 0 {
            zero_run += 1;
        } else {
            zero_run = 0;
        }
    }
    assert_ne!(escaped, rbsp, "escaping must have inserted at least one byte");

    let recovered = strip_emulation_prevention(&escaped);
    assert_eq!(recovered, rbsp);

    let ctx = Context::host_only(LogLevel::Warning);
    let mut parser = Parser::create(&ctx, Codec::H264, LogLevel::Warning).unwrap();
    let mut input = vec![0, 0, 0, 1, 0b0_11_00111];
    input.extend_from_slice(&escaped);
    input.extend_from_slice(&pps_nalu());
    input.extend_from_slice(&idr_slice_nalu(0));
    let result = parser.get_access_unit(&input, true).unwrap();
    assert_eq!(result.status, Status::Success);
    let config = result.config.expect("sps registration should surface a config");
    assert_eq!(config.width, 64);
    assert_eq!(config.height, 64);
}

/// Scenario: a host-only context can allocate host frames but not
/// device-contiguous ones, while a device-bound context can do both.
#[test]
fn host_only_context_allows_host_frames_but_rejects_device_frames() {
    let _ = env_logger::builder().is_test(true).try_init();
    let host_ctx = Context::host_only(LogLevel::Info);
    let info = VideoInfo::new(32, 32, VideoFormat::GRAY8, Alignment::default());

    let host_frame = Frame::allocate(&host_ctx, AllocKind::HostOnly, AllocFlags::empty(), -1, info.clone());
    assert!(host_frame.is_ok());

    let rejected = Frame::allocate(&host_ctx, AllocKind::ContiguousDevice, AllocFlags::empty(), -1, info.clone());
    assert!(rejected.is_err());

    let device_ctx = Context::create(0, Some("/lib/kernel.bit"), LogLevel::Info).unwrap();
    let device_frame = Frame::allocate(&device_ctx, AllocKind::ContiguousDevice, AllocFlags::empty(), 0, info);
    assert!(device_frame.is_ok());
}

/// Scenario: a scaler with a padded NV12 source (stride wider than the
/// active width) and two channels writing into disjoint halves of the same
/// BGR destination frame both complete, leaving the destination marked
/// pending a from-device sync.
#[test]
fn two_channels_compose_into_one_destination_frame() {
    let _ = env_logger::builder().is_test(true).try_init();
    let ctx = Context::host_only(LogLevel::Info);
    let mut scaler = Scaler::create(&ctx, "software").unwrap();

    // Alignment wide enough that NV12's luma stride is padded well past
    // the 64-pixel active width, exercising the padded-source path.
    let padded = Alignment {
        stride_align: [256, 256, 256],
        ..Alignment::default()
    };
    let source_info = VideoInfo::new(64, 64, VideoFormat::Y_UV8_420, padded);
    assert!(source_info.planes[0].stride > 64, "fixture should be padded");
    let source = Frame::allocate(&ctx, AllocKind::HostOnly, AllocFlags::empty(), -1, source_info).unwrap();
    {
        let map = source.map(MapFlags::WRITE).unwrap();
        assert_eq!(map.plane_sizes().len(), 2);
    }

    let destination_info = VideoInfo::new(64, 32, VideoFormat::BGR, Alignment::default());
    let destination =
        Frame::allocate(&ctx, AllocKind::HostOnly, AllocFlags::empty(), -1, destination_info).unwrap();

    scaler
        .add_channel(
            &source,
            Rect::new(0, 0, 64, 64),
            &destination,
            Rect::new(0, 0, 32, 32),
            None,
            ScaleType::Default,
        )
        .unwrap();
    scaler
        .add_channel(
            &source,
            Rect::new(0, 0, 64, 64),
            &destination,
            Rect::new(32, 0, 32, 32),
            Some(PreProcess { alpha: 0, scale: 1.0 }),
            ScaleType::Default,
        )
        .unwrap();

    scaler
        .process_frame(&[(&source, &destination), (&source, &destination)])
        .unwrap();

    assert!(destination
        .sync_flags()
        .contains(vaccel::format::SyncFlags::FROM_DEVICE));
}
