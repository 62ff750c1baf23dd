// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Builds one `vaccel-sys` [`Descriptor`] per channel: plane base
//! addresses (offset by the channel's aligned rect), input/output
//! geometry, coefficient-table addresses, and derived line/pixel rate
//! (`spec.md` §4.4 "Descriptor construction").

use vaccel_sys::{Descriptor, DeviceAddr, STEP_PRECISION};

use crate::format::VideoFormat;
use crate::memory::Frame;

use super::channel::Rect;
use super::Error;

/// How a plane's byte offset is derived from a channel's pixel rect.
/// `Linear` covers every format whose chroma (or packed macropixel)
/// geometry is expressible as "one sample is `bytes_per_element` bytes,
/// one sample covers `x_div` horizontal and `y_div` vertical luma
/// pixels". The two packed-10-bit formats instead pack three samples
/// into four bytes and need the same byte-boundary conversion
/// `spec.md` §4.4 step 3 applies at channel-add time.
enum AddressMode {
    Linear { x_div: u32, y_div: u32, bytes_per_element: u32 },
    Packed10 { x_div: u32, y_div: u32 },
}

fn address_mode(format: VideoFormat, plane: usize) -> AddressMode {
    use VideoFormat::*;
    match (format, plane) {
        (Y_UV8_420, 0) => AddressMode::Linear { x_div: 1, y_div: 1, bytes_per_element: 1 },
        (Y_UV8_420, 1) => AddressMode::Linear { x_div: 2, y_div: 2, bytes_per_element: 2 },
        (I420, 0) => AddressMode::Linear { x_div: 1, y_div: 1, bytes_per_element: 1 },
        (I420, 1) | (I420, 2) => AddressMode::Linear { x_div: 2, y_div: 2, bytes_per_element: 1 },
        (NV16, 0) => AddressMode::Linear { x_div: 1, y_div: 1, bytes_per_element: 1 },
        (NV16, 1) => AddressMode::Linear { x_div: 2, y_div: 1, bytes_per_element: 2 },
        (I422_10LE, 0) => AddressMode::Linear { x_div: 1, y_div: 1, bytes_per_element: 2 },
        (I422_10LE, 1) | (I422_10LE, 2) => {
            AddressMode::Linear { x_div: 2, y_div: 1, bytes_per_element: 2 }
        }
        (YUY2, 0) => AddressMode::Linear { x_div: 2, y_div: 1, bytes_per_element: 4 },
        (RGB, 0) | (BGR, 0) | (v308, 0) => {
            AddressMode::Linear { x_div: 1, y_div: 1, bytes_per_element: 3 }
        }
        (RGBx, 0) | (BGRx, 0) | (RGBA, 0) | (BGRA, 0) | (r210, 0) | (Y410, 0) => {
            AddressMode::Linear { x_div: 1, y_div: 1, bytes_per_element: 4 }
        }
        (GRAY8, 0) => AddressMode::Linear { x_div: 1, y_div: 1, bytes_per_element: 1 },
        (NV12_10LE32, 0) => AddressMode::Packed10 { x_div: 1, y_div: 1 },
        (NV12_10LE32, 1) => AddressMode::Packed10 { x_div: 2, y_div: 2 },
        (GRAY10_LE32, 0) => AddressMode::Packed10 { x_div: 1, y_div: 1 },
        _ => AddressMode::Linear { x_div: 1, y_div: 1, bytes_per_element: 1 },
    }
}

fn plane_byte_offset(format: VideoFormat, plane: usize, stride: u32, x: u32, y: u32) -> u32 {
    match address_mode(format, plane) {
        AddressMode::Linear { x_div, y_div, bytes_per_element } => {
            (y / y_div) * stride + (x / x_div) * bytes_per_element
        }
        AddressMode::Packed10 { x_div, y_div } => (y / y_div) * stride + ((x / x_div) / 3) * 4,
    }
}

/// `spec.md` §4.4: `((len_in * STEP_PRECISION) + len_out/2) / len_out`.
fn derive_rate(len_in: u32, len_out: u32) -> u32 {
    if len_out == 0 {
        return 0;
    }
    (((len_in as u64) * (STEP_PRECISION as u64)) + (len_out as u64) / 2) as u32 / len_out
}

fn plane_addresses(frame: &Frame, rect: Rect, format: VideoFormat) -> Result<[DeviceAddr; 3], Error> {
    let info = frame.video_info();
    let mut addrs = [0u64; 3];
    for plane in 0..(info.n_planes as usize).min(3) {
        let stride = info.planes[plane].stride;
        let base = frame.plane_address(plane)?;
        let byte_offset = plane_byte_offset(format, plane, stride, rect.x, rect.y);
        addrs[plane] = base + byte_offset as u64;
    }
    Ok(addrs)
}

/// Builds the descriptor for one channel. `horiz_coef`/`vert_coef` are the
/// already-resident addresses of the 64x12 coefficient tables selected or
/// generated for this channel (`spec.md` §4.4 "Coefficient generation").
#[allow(clippy::too_many_arguments)]
pub fn build(
    source: &Frame,
    source_rect: Rect,
    destination: &Frame,
    destination_rect: Rect,
    horiz_coef: DeviceAddr,
    horiz_taps: u32,
    vert_coef: DeviceAddr,
    vert_taps: u32,
    preprocess: Option<vaccel_sys::PreProcess>,
) -> Result<Descriptor, Error> {
    let src_info = source.video_info();
    let dst_info = destination.video_info();

    let src_planes = plane_addresses(source, source_rect, src_info.format)?;
    let dst_planes = plane_addresses(destination, destination_rect, dst_info.format)?;

    let mut in_plane_stride = [0u32; 3];
    let mut in_plane_elevation = [0u32; 3];
    let mut out_plane_stride = [0u32; 3];
    let mut out_plane_elevation = [0u32; 3];
    for plane in 0..(src_info.n_planes as usize).min(3) {
        in_plane_stride[plane] = src_info.planes[plane].stride;
        in_plane_elevation[plane] = src_info.planes[plane].elevation;
    }
    for plane in 0..(dst_info.n_planes as usize).min(3) {
        out_plane_stride[plane] = dst_info.planes[plane].stride;
        out_plane_elevation[plane] = dst_info.planes[plane].elevation;
    }

    Ok(Descriptor {
        src_planes,
        dst_planes,
        in_width: source_rect.width,
        in_height: source_rect.height,
        in_n_planes: src_info.n_planes,
        in_plane_stride,
        in_plane_elevation,
        in_format: src_info.format.to_code(),
        out_width: destination_rect.width,
        out_height: destination_rect.height,
        out_n_planes: dst_info.n_planes,
        out_plane_stride,
        out_plane_elevation,
        out_format: dst_info.format.to_code(),
        horiz_coef,
        vert_coef,
        horiz_taps,
        vert_taps,
        line_rate: derive_rate(source_rect.height, destination_rect.height),
        pixel_rate: derive_rate(source_rect.width, destination_rect.width),
        preprocess,
        next: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_rate_matches_spec_formula() {
        // 1080 -> 360: (1080 * STEP_PRECISION + 180) / 360
        let rate = derive_rate(1080, 360);
        let expected = (((1080u64 * STEP_PRECISION as u64) + 180) / 360) as u32;
        assert_eq!(rate, expected);
    }

    #[test]
    fn derive_rate_identity_scale_is_one_step() {
        assert_eq!(derive_rate(1920, 1920), STEP_PRECISION);
    }

    #[test]
    fn nv12_chroma_offset_halves_both_axes() {
        let offset = plane_byte_offset(VideoFormat::Y_UV8_420, 1, 1920, 4, 2);
        // x=4 -> 2 UV pairs in, each pair is 2 bytes -> byte 4; y=2 -> row 1
        assert_eq!(offset, 1920 + 4);
    }

    #[test]
    fn rgba_plane_offset_is_four_bytes_per_pixel() {
        let offset = plane_byte_offset(VideoFormat::RGBA, 0, 640 * 4, 10, 3);
        assert_eq!(offset, 3 * (640 * 4) + 10 * 4);
    }
}
