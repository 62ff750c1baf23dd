// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Pure-CPU reference backend, consumed by the scaler engine when no
//! compatible device is present (`spec.md` §4.5). Every descriptor is
//! executed independently: ingest, chroma upsample, separable polyphase
//! scale, color-space conversion, chroma downsample, optional RGB/BGR
//! pre-process, egress.
//!
//! The working representation between stages is always three planar
//! `Vec<i32>` components at full (already chroma-upsampled) resolution,
//! not a literal interleaved buffer — the descriptor chain's public
//! contract is pixel-domain semantics, not a specific intermediate
//! memory layout (`spec.md` §1 "bit-exact reproduction... is not
//! required").

use vaccel_sys::{Descriptor, DescriptorChain, COEF_PHASES, COEF_TAPS};

use crate::format::VideoFormat;

use super::backend::{BackendOutcome, ScalerBackend};
use super::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Yuv,
    Rgb,
    Gray,
}

fn family_of(format: VideoFormat) -> Family {
    match format {
        VideoFormat::GRAY8 | VideoFormat::GRAY10_LE32 => Family::Gray,
        VideoFormat::RGB
        | VideoFormat::BGR
        | VideoFormat::RGBx
        | VideoFormat::BGRx
        | VideoFormat::RGBA
        | VideoFormat::BGRA
        | VideoFormat::r210 => Family::Rgb,
        _ => Family::Yuv,
    }
}

fn bit_depth(format: VideoFormat) -> u32 {
    match format {
        VideoFormat::NV12_10LE32
        | VideoFormat::GRAY10_LE32
        | VideoFormat::I422_10LE
        | VideoFormat::r210
        | VideoFormat::Y410 => 10,
        _ => 8,
    }
}

fn max_sample(depth: u32) -> i32 {
    (1i32 << depth) - 1
}

/// How one sample is physically stored, independent of its numeric bit
/// depth: `NV12_10LE32`/`GRAY10_LE32` pack three 10-bit samples per
/// 4 bytes, `I422_10LE` stores one 10-bit sample per 16-bit LE container,
/// everything else is one byte per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    U8,
    U16Le,
    Packed10,
}

fn container_of(format: VideoFormat) -> Container {
    match format {
        VideoFormat::NV12_10LE32 | VideoFormat::GRAY10_LE32 => Container::Packed10,
        VideoFormat::I422_10LE => Container::U16Le,
        _ => Container::U8,
    }
}

/// Three full-resolution planar components plus the color family they're
/// expressed in (`Y,U,V` for [`Family::Yuv`]/[`Family::Gray`], `R,G,B`
/// canonical order for [`Family::Rgb`] regardless of the source byte
/// order).
struct Planar3 {
    width: u32,
    height: u32,
    family: Family,
    bit_depth: u32,
    c0: Vec<i32>,
    c1: Vec<i32>,
    c2: Vec<i32>,
}

// Each of these takes a raw `addr` that must point at a frame plane's
// mapped storage for at least `offset + size_of` bytes; the caller chain
// (`process_descriptor` <- the engine's `descriptor::build` <- a live
// `Frame`) is what actually upholds that, so the precondition is
// documented here rather than exposed as an `unsafe fn` boundary, the
// same way `memory::Frame::plane_ptr` wraps its one raw op internally.

fn read_u8(addr: u64, offset: usize) -> i32 {
    // SAFETY: see module-level note above this group of functions.
    unsafe { *(addr as *const u8).add(offset) as i32 }
}

fn read_u16le(addr: u64, offset: usize) -> i32 {
    // SAFETY: see module-level note above this group of functions.
    unsafe {
        let p = (addr as *const u8).add(offset);
        u16::from_le_bytes([*p, *p.add(1)]) as i32
    }
}

fn read_u32le(addr: u64, offset: usize) -> u32 {
    // SAFETY: see module-level note above this group of functions.
    unsafe {
        let p = (addr as *const u8).add(offset);
        u32::from_le_bytes([*p, *p.add(1), *p.add(2), *p.add(3)])
    }
}

fn write_u8(addr: u64, offset: usize, value: i32) {
    // SAFETY: see module-level note above this group of functions.
    unsafe { *(addr as *mut u8).add(offset) = value as u8 };
}

fn write_u16le(addr: u64, offset: usize, value: i32) {
    // SAFETY: see module-level note above this group of functions.
    unsafe {
        let p = (addr as *mut u8).add(offset);
        let bytes = (value as u16).to_le_bytes();
        *p = bytes[0];
        *p.add(1) = bytes[1];
    }
}

fn write_u32le(addr: u64, offset: usize, value: u32) {
    // SAFETY: see module-level note above this group of functions.
    unsafe {
        let p = (addr as *mut u8).add(offset);
        let bytes = value.to_le_bytes();
        for (i, b) in bytes.iter().enumerate() {
            *p.add(i) = *b;
        }
    }
}

/// Unpacks `count` 10-bit samples from a row packed 3-per-4-bytes
/// (`spec.md` §4.5 step 1, `NV12_10LE32`/`GRAY10_LE32`).
fn unpack10_row(addr: u64, count: u32) -> Vec<i32> {
    let mut out = Vec::with_capacity(count as usize);
    let mut i = 0u32;
    while i < count {
        let word = read_u32le(addr, (i / 3 * 4) as usize);
        out.push((word & 0x3ff) as i32);
        if i + 1 < count {
            out.push(((word >> 10) & 0x3ff) as i32);
        }
        if i + 2 < count {
            out.push(((word >> 20) & 0x3ff) as i32);
        }
        i += 3;
    }
    out.truncate(count as usize);
    out
}

/// Inverse of [`unpack10_row`]: packs `samples` 3-per-4-bytes into `addr`.
fn pack10_row(addr: u64, samples: &[i32]) {
    for (chunk_idx, chunk) in samples.chunks(3).enumerate() {
        let mut word = (chunk[0] as u32) & 0x3ff;
        if let Some(&s1) = chunk.get(1) {
            word |= ((s1 as u32) & 0x3ff) << 10;
        }
        if let Some(&s2) = chunk.get(2) {
            word |= ((s2 as u32) & 0x3ff) << 20;
        }
        write_u32le(addr, chunk_idx * 4, word);
    }
}

fn upsample_vertical(data: &[i32], w: u32, h: u32) -> Vec<i32> {
    let out_h = h * 2;
    let mut out = vec![0i32; (w * out_h) as usize];
    for y in 0..out_h {
        let src = (y as f64 - 0.5) / 2.0;
        let y0 = src.floor();
        let frac = src - y0;
        let y0c = (y0 as i64).clamp(0, h as i64 - 1) as u32;
        let y1c = (y0 as i64 + 1).clamp(0, h as i64 - 1) as u32;
        for x in 0..w {
            let a = data[(y0c * w + x) as usize] as f64;
            let b = data[(y1c * w + x) as usize] as f64;
            out[(y * w + x) as usize] = (a + (b - a) * frac).round() as i32;
        }
    }
    out
}

fn upsample_horizontal(data: &[i32], w: u32, h: u32) -> Vec<i32> {
    let out_w = w * 2;
    let mut out = vec![0i32; (out_w * h) as usize];
    for y in 0..h {
        for x in 0..out_w {
            let src = (x as f64 - 0.5) / 2.0;
            let x0 = src.floor();
            let frac = src - x0;
            let x0c = (x0 as i64).clamp(0, w as i64 - 1) as u32;
            let x1c = (x0 as i64 + 1).clamp(0, w as i64 - 1) as u32;
            let a = data[(y * w + x0c) as usize] as f64;
            let b = data[(y * w + x1c) as usize] as f64;
            out[(y * out_w + x) as usize] = (a + (b - a) * frac).round() as i32;
        }
    }
    out
}

fn downsample_vertical(data: &[i32], w: u32, h: u32) -> Vec<i32> {
    let out_h = (h / 2).max(1);
    let mut out = vec![0i32; (w * out_h) as usize];
    for y in 0..out_h {
        let y0 = (2 * y).min(h - 1);
        let y1 = (2 * y + 1).min(h - 1);
        for x in 0..w {
            let a = data[(y0 * w + x) as usize];
            let b = data[(y1 * w + x) as usize];
            out[(y * w + x) as usize] = (a + b + 1) / 2;
        }
    }
    out
}

fn downsample_horizontal(data: &[i32], w: u32, h: u32) -> Vec<i32> {
    let out_w = (w / 2).max(1);
    let mut out = vec![0i32; (out_w * h) as usize];
    for y in 0..h {
        for x in 0..out_w {
            let x0 = (2 * x).min(w - 1);
            let x1 = (2 * x + 1).min(w - 1);
            let a = data[(y * w + x0) as usize];
            let b = data[(y * w + x1) as usize];
            out[(y * out_w + x) as usize] = (a + b + 1) / 2;
        }
    }
    out
}

/// Reads a full plane (or chroma-pair plane, pre-deinterleave) of `rows`
/// rows, `samples_per_row` samples each, from a row-strided buffer.
fn read_plane(addr: u64, stride: u32, samples_per_row: u32, rows: u32, container: Container) -> Vec<i32> {
    let mut out = Vec::with_capacity((samples_per_row * rows) as usize);
    for row in 0..rows {
        let row_addr = addr + (row as u64) * (stride as u64);
        match container {
            Container::Packed10 => out.extend(unpack10_row(row_addr, samples_per_row)),
            Container::U16Le => {
                for col in 0..samples_per_row {
                    out.push(read_u16le(row_addr, (col * 2) as usize));
                }
            }
            Container::U8 => {
                for col in 0..samples_per_row {
                    out.push(read_u8(row_addr, col as usize));
                }
            }
        }
    }
    out
}

fn deinterleave(pairs: &[i32]) -> (Vec<i32>, Vec<i32>) {
    let mut a = Vec::with_capacity(pairs.len() / 2);
    let mut b = Vec::with_capacity(pairs.len() / 2);
    for chunk in pairs.chunks(2) {
        a.push(chunk[0]);
        b.push(*chunk.get(1).unwrap_or(&chunk[0]));
    }
    (a, b)
}

fn ingest(descriptor: &Descriptor) -> Planar3 {
    let format = VideoFormat::from_code(descriptor.in_format);
    let width = descriptor.in_width;
    let height = descriptor.in_height;
    let family = family_of(format);
    let depth = bit_depth(format);
    let container = container_of(format);
    let addrs = descriptor.src_planes;
    let strides = descriptor.in_plane_stride;

    let (c0, c1, c2) = match format {
        VideoFormat::Y_UV8_420 | VideoFormat::NV12_10LE32 => {
            let y = read_plane(addrs[0], strides[0], width, height, container);
            let uv = read_plane(addrs[1], strides[1], width, height / 2, container);
            let (u, v) = deinterleave(&uv);
            let u = upsample_vertical(&u, width / 2, height / 2);
            let v = upsample_vertical(&v, width / 2, height / 2);
            let u = upsample_horizontal(&u, width / 2, height);
            let v = upsample_horizontal(&v, width / 2, height);
            (y, u, v)
        }
        VideoFormat::I420 => {
            let y = read_plane(addrs[0], strides[0], width, height, container);
            let u = read_plane(addrs[1], strides[1], width / 2, height / 2, container);
            let v = read_plane(addrs[2], strides[2], width / 2, height / 2, container);
            let u = upsample_vertical(&u, width / 2, height / 2);
            let v = upsample_vertical(&v, width / 2, height / 2);
            let u = upsample_horizontal(&u, width / 2, height);
            let v = upsample_horizontal(&v, width / 2, height);
            (y, u, v)
        }
        VideoFormat::NV16 => {
            let y = read_plane(addrs[0], strides[0], width, height, container);
            let uv = read_plane(addrs[1], strides[1], width, height, container);
            let (u, v) = deinterleave(&uv);
            let u = upsample_horizontal(&u, width / 2, height);
            let v = upsample_horizontal(&v, width / 2, height);
            (y, u, v)
        }
        VideoFormat::I422_10LE => {
            let y = read_plane(addrs[0], strides[0], width, height, container);
            let u = read_plane(addrs[1], strides[1], width / 2, height, container);
            let v = read_plane(addrs[2], strides[2], width / 2, height, container);
            let u = upsample_horizontal(&u, width / 2, height);
            let v = upsample_horizontal(&v, width / 2, height);
            (y, u, v)
        }
        VideoFormat::YUY2 => {
            let packed = read_plane(addrs[0], strides[0], width * 2, height, Container::U8);
            let mut y = Vec::with_capacity((width * height) as usize);
            let mut u = Vec::with_capacity((width / 2 * height) as usize);
            let mut v = Vec::with_capacity((width / 2 * height) as usize);
            for row in packed.chunks((width * 2) as usize) {
                for quad in row.chunks(4) {
                    y.push(quad[0]);
                    u.push(quad[1]);
                    if let Some(&y1) = quad.get(2) {
                        y.push(y1);
                    }
                    if let Some(&v0) = quad.get(3) {
                        v.push(v0);
                    }
                }
            }
            let u = upsample_horizontal(&u, width / 2, height);
            let v = upsample_horizontal(&v, width / 2, height);
            (y, u, v)
        }
        VideoFormat::GRAY8 | VideoFormat::GRAY10_LE32 => {
            let y = read_plane(addrs[0], strides[0], width, height, container);
            let neutral = vec![1i32 << (depth - 1); (width * height) as usize];
            (y, neutral.clone(), neutral)
        }
        VideoFormat::RGB | VideoFormat::BGR | VideoFormat::v308 => {
            let bytes = read_plane(addrs[0], strides[0], width * 3, height, Container::U8);
            let mut c0 = Vec::with_capacity((width * height) as usize);
            let mut c1 = Vec::with_capacity((width * height) as usize);
            let mut c2 = Vec::with_capacity((width * height) as usize);
            for px in bytes.chunks(3) {
                let (a, b, c) = if format == VideoFormat::BGR {
                    (px[2], px[1], px[0])
                } else {
                    (px[0], px[1], px[2])
                };
                c0.push(a);
                c1.push(b);
                c2.push(c);
            }
            (c0, c1, c2)
        }
        VideoFormat::RGBx | VideoFormat::BGRx | VideoFormat::RGBA | VideoFormat::BGRA => {
            let bytes = read_plane(addrs[0], strides[0], width * 4, height, Container::U8);
            let mut c0 = Vec::with_capacity((width * height) as usize);
            let mut c1 = Vec::with_capacity((width * height) as usize);
            let mut c2 = Vec::with_capacity((width * height) as usize);
            let is_bgr = matches!(format, VideoFormat::BGRx | VideoFormat::BGRA);
            for px in bytes.chunks(4) {
                let (a, b, c) = if is_bgr {
                    (px[2], px[1], px[0])
                } else {
                    (px[0], px[1], px[2])
                };
                c0.push(a);
                c1.push(b);
                c2.push(c);
            }
            (c0, c1, c2)
        }
        VideoFormat::r210 | VideoFormat::Y410 => {
            let mut c0 = Vec::with_capacity((width * height) as usize);
            let mut c1 = Vec::with_capacity((width * height) as usize);
            let mut c2 = Vec::with_capacity((width * height) as usize);
            for row in 0..height {
                let row_addr = addrs[0] + (row as u64) * (strides[0] as u64);
                for col in 0..width {
                    let word = read_u32le(row_addr, (col * 4) as usize);
                    c0.push((word & 0x3ff) as i32);
                    c1.push(((word >> 10) & 0x3ff) as i32);
                    c2.push(((word >> 20) & 0x3ff) as i32);
                }
            }
            (c0, c1, c2)
        }
        VideoFormat::Unknown => {
            let len = (width * height) as usize;
            (vec![0; len], vec![0; len], vec![0; len])
        }
    };

    Planar3 {
        width,
        height,
        family,
        bit_depth: depth,
        c0,
        c1,
        c2,
    }
}

fn resample_component(
    data: &[i32],
    width: u32,
    height: u32,
    out_width: u32,
    out_height: u32,
    vert_rate: u32,
    vert_coef: &[[i32; COEF_TAPS]; COEF_PHASES],
    vert_taps: u32,
    horiz_rate: u32,
    horiz_coef: &[[i32; COEF_TAPS]; COEF_PHASES],
    horiz_taps: u32,
    max_value: i32,
) -> Vec<i32> {
    let v = scale_vertical(data, width, height, out_height, vert_rate, vert_coef, vert_taps, max_value);
    scale_horizontal(&v, width, out_height, out_width, horiz_rate, horiz_coef, horiz_taps, max_value)
}

fn scale_vertical(
    src: &[i32],
    width: u32,
    height: u32,
    out_height: u32,
    rate: u32,
    coef: &[[i32; COEF_TAPS]; COEF_PHASES],
    taps: u32,
    max_value: i32,
) -> Vec<i32> {
    let taps = taps.max(1) as i64;
    let half = taps / 2;
    let mut out = vec![0i32; (width * out_height) as usize];
    for oy in 0..out_height {
        let pos = (oy as u64) * (rate as u64);
        let base = (pos >> 20) as i64;
        let phase = ((pos >> 14) & (COEF_PHASES as u64 - 1)) as usize;
        let row = &coef[phase];
        for x in 0..width {
            let mut acc: i64 = 0;
            for t in 0..taps {
                let src_y = (base + t - half + 1).clamp(0, height as i64 - 1) as u32;
                acc += row[t as usize] as i64 * src[(src_y * width + x) as usize] as i64;
            }
            out[(oy * width + x) as usize] = (acc >> 12).clamp(0, max_value as i64) as i32;
        }
    }
    out
}

fn scale_horizontal(
    src: &[i32],
    width: u32,
    height: u32,
    out_width: u32,
    rate: u32,
    coef: &[[i32; COEF_TAPS]; COEF_PHASES],
    taps: u32,
    max_value: i32,
) -> Vec<i32> {
    let taps = taps.max(1) as i64;
    let half = taps / 2;
    let mut out = vec![0i32; (out_width * height) as usize];
    for y in 0..height {
        for ox in 0..out_width {
            let pos = (ox as u64) * (rate as u64);
            let base = (pos >> 20) as i64;
            let phase = ((pos >> 14) & (COEF_PHASES as u64 - 1)) as usize;
            let row = &coef[phase];
            let mut acc: i64 = 0;
            for t in 0..taps {
                let src_x = (base + t - half + 1).clamp(0, width as i64 - 1) as u32;
                acc += row[t as usize] as i64 * src[(y * width + src_x) as usize] as i64;
            }
            out[(y * out_width + ox) as usize] = (acc >> 12).clamp(0, max_value as i64) as i32;
        }
    }
    out
}

fn yuv_to_rgb(y: i32, u: i32, v: i32, depth: u32, max_value: i32) -> (i32, i32, i32) {
    let center = (1i32 << (depth - 1)) as f64;
    let cu = u as f64 - center;
    let cv = v as f64 - center;
    let r = y as f64 + 1.402 * cv;
    let g = y as f64 - 0.344_136 * cu - 0.714_136 * cv;
    let b = y as f64 + 1.772 * cu;
    let clamp = |v: f64| v.round().clamp(0.0, max_value as f64) as i32;
    (clamp(r), clamp(g), clamp(b))
}

fn rgb_to_yuv(r: i32, g: i32, b: i32, depth: u32, max_value: i32) -> (i32, i32, i32) {
    let center = (1i32 << (depth - 1)) as f64;
    let (rf, gf, bf) = (r as f64, g as f64, b as f64);
    let y = 0.299 * rf + 0.587 * gf + 0.114 * bf;
    let u = -0.168_736 * rf - 0.331_264 * gf + 0.5 * bf + center;
    let v = 0.5 * rf - 0.418_688 * gf - 0.081_312 * bf + center;
    let clamp = |v: f64| v.round().clamp(0.0, max_value as f64) as i32;
    (clamp(y), clamp(u), clamp(v))
}

fn convert_family(mut image: Planar3, target: Family, out_depth: u32) -> Planar3 {
    let max_value = max_sample(out_depth);
    if image.family == target || target == Family::Gray {
        if image.bit_depth != out_depth {
            image = rescale_depth(image, out_depth);
        }
        return image;
    }
    let len = image.c0.len();
    let (mut c0, mut c1, mut c2) = (Vec::with_capacity(len), Vec::with_capacity(len), Vec::with_capacity(len));
    match (image.family, target) {
        (Family::Yuv, Family::Rgb) | (Family::Gray, Family::Rgb) => {
            for i in 0..len {
                let (r, g, b) = yuv_to_rgb(image.c0[i], image.c1[i], image.c2[i], image.bit_depth, max_value);
                c0.push(r);
                c1.push(g);
                c2.push(b);
            }
        }
        (Family::Rgb, Family::Yuv) => {
            for i in 0..len {
                let (y, u, v) = rgb_to_yuv(image.c0[i], image.c1[i], image.c2[i], out_depth, max_value);
                c0.push(y);
                c1.push(u);
                c2.push(v);
            }
            return Planar3 {
                width: image.width,
                height: image.height,
                family: Family::Yuv,
                bit_depth: out_depth,
                c0,
                c1,
                c2,
            };
        }
        _ => return image,
    }
    Planar3 {
        width: image.width,
        height: image.height,
        family: target,
        bit_depth: out_depth,
        c0,
        c1,
        c2,
    }
}

fn rescale_depth(image: Planar3, out_depth: u32) -> Planar3 {
    if image.bit_depth == out_depth {
        return image;
    }
    let shift = out_depth as i32 - image.bit_depth as i32;
    let rescale = |v: &i32| -> i32 {
        if shift >= 0 {
            v << shift
        } else {
            v >> (-shift)
        }
    };
    Planar3 {
        width: image.width,
        height: image.height,
        family: image.family,
        bit_depth: out_depth,
        c0: image.c0.iter().map(rescale).collect(),
        c1: image.c1.iter().map(rescale).collect(),
        c2: image.c2.iter().map(rescale).collect(),
    }
}

fn egress(descriptor: &Descriptor, image: Planar3) {
    let format = VideoFormat::from_code(descriptor.out_format);
    let width = descriptor.out_width;
    let height = descriptor.out_height;
    let addrs = descriptor.dst_planes;
    let strides = descriptor.out_plane_stride;
    let depth = image.bit_depth;
    let container = container_of(format);

    let (c0, c1, c2) = if let Some(pp) = descriptor.preprocess.filter(|_| family_of(format) == Family::Rgb) {
        let is_bgr = matches!(format, VideoFormat::BGR | VideoFormat::BGRx | VideoFormat::BGRA);
        let apply = |channel: usize, v: &i32| -> i32 {
            let out_index = if is_bgr { 2 - channel } else { channel };
            (((*v - pp.alpha[out_index]) as i64 * pp.beta[out_index] as i64) >> 16) as i32
        };
        (
            image.c0.iter().map(|v| apply(0, v)).collect::<Vec<_>>(),
            image.c1.iter().map(|v| apply(1, v)).collect::<Vec<_>>(),
            image.c2.iter().map(|v| apply(2, v)).collect::<Vec<_>>(),
        )
    } else {
        (image.c0, image.c1, image.c2)
    };

    match format {
        VideoFormat::Y_UV8_420 | VideoFormat::NV12_10LE32 => {
            let u = downsample_horizontal(&c1, width, height);
            let v = downsample_horizontal(&c2, width, height);
            let u = downsample_vertical(&u, width / 2, height);
            let v = downsample_vertical(&v, width / 2, height);
            write_plane(addrs[0], strides[0], &c0, width, height, container);
            let mut uv = Vec::with_capacity(u.len() * 2);
            for (a, b) in u.iter().zip(v.iter()) {
                uv.push(*a);
                uv.push(*b);
            }
            write_plane(addrs[1], strides[1], &uv, width, height / 2, container);
        }
        VideoFormat::I420 => {
            let u = downsample_horizontal(&c1, width, height);
            let v = downsample_horizontal(&c2, width, height);
            let u = downsample_vertical(&u, width / 2, height);
            let v = downsample_vertical(&v, width / 2, height);
            write_plane(addrs[0], strides[0], &c0, width, height, container);
            write_plane(addrs[1], strides[1], &u, width / 2, height / 2, container);
            write_plane(addrs[2], strides[2], &v, width / 2, height / 2, container);
        }
        VideoFormat::NV16 => {
            let u = downsample_horizontal(&c1, width, height);
            let v = downsample_horizontal(&c2, width, height);
            write_plane(addrs[0], strides[0], &c0, width, height, container);
            let mut uv = Vec::with_capacity(u.len() * 2);
            for (a, b) in u.iter().zip(v.iter()) {
                uv.push(*a);
                uv.push(*b);
            }
            write_plane(addrs[1], strides[1], &uv, width, height, container);
        }
        VideoFormat::I422_10LE => {
            let u = downsample_horizontal(&c1, width, height);
            let v = downsample_horizontal(&c2, width, height);
            write_plane(addrs[0], strides[0], &c0, width, height, container);
            write_plane(addrs[1], strides[1], &u, width / 2, height, container);
            write_plane(addrs[2], strides[2], &v, width / 2, height, container);
        }
        VideoFormat::YUY2 => {
            let u = downsample_horizontal(&c1, width, height);
            let v = downsample_horizontal(&c2, width, height);
            let mut packed = Vec::with_capacity((width * 2 * height) as usize);
            for row in 0..height {
                for pair in 0..(width / 2) {
                    let y0 = c0[(row * width + pair * 2) as usize];
                    let y1 = c0[(row * width + pair * 2 + 1) as usize];
                    let ui = u[(row * (width / 2) + pair) as usize];
                    let vi = v[(row * (width / 2) + pair) as usize];
                    packed.push(y0);
                    packed.push(ui);
                    packed.push(y1);
                    packed.push(vi);
                }
            }
            write_plane(addrs[0], strides[0], &packed, width * 2, height, Container::U8);
        }
        VideoFormat::GRAY8 | VideoFormat::GRAY10_LE32 => {
            write_plane(addrs[0], strides[0], &c0, width, height, container);
        }
        VideoFormat::RGB | VideoFormat::BGR | VideoFormat::v308 => {
            let mut packed = Vec::with_capacity((width * height * 3) as usize);
            let is_bgr = format == VideoFormat::BGR;
            for i in 0..c0.len() {
                if is_bgr {
                    packed.push(c2[i]);
                    packed.push(c1[i]);
                    packed.push(c0[i]);
                } else {
                    packed.push(c0[i]);
                    packed.push(c1[i]);
                    packed.push(c2[i]);
                }
            }
            write_plane(addrs[0], strides[0], &packed, width * 3, height, Container::U8);
        }
        VideoFormat::RGBx | VideoFormat::BGRx | VideoFormat::RGBA | VideoFormat::BGRA => {
            let is_bgr = matches!(format, VideoFormat::BGRx | VideoFormat::BGRA);
            let max_alpha = max_sample(depth);
            let mut packed = Vec::with_capacity((width * height * 4) as usize);
            for i in 0..c0.len() {
                if is_bgr {
                    packed.push(c2[i]);
                    packed.push(c1[i]);
                    packed.push(c0[i]);
                } else {
                    packed.push(c0[i]);
                    packed.push(c1[i]);
                    packed.push(c2[i]);
                }
                packed.push(max_alpha);
            }
            write_plane(addrs[0], strides[0], &packed, width * 4, height, Container::U8);
        }
        VideoFormat::r210 | VideoFormat::Y410 => {
            for row in 0..height {
                let row_addr = addrs[0] + (row as u64) * (strides[0] as u64);
                for col in 0..width {
                    let idx = (row * width + col) as usize;
                    let word = (c0[idx] as u32 & 0x3ff)
                        | ((c1[idx] as u32 & 0x3ff) << 10)
                        | ((c2[idx] as u32 & 0x3ff) << 20);
                    write_u32le(row_addr, (col * 4) as usize, word);
                }
            }
        }
        VideoFormat::Unknown => {}
    }
}

fn write_plane(
    addr: u64,
    stride: u32,
    samples: &[i32],
    samples_per_row: u32,
    rows: u32,
    container: Container,
) {
    for row in 0..rows {
        let row_addr = addr + (row as u64) * (stride as u64);
        let row_samples = &samples[(row * samples_per_row) as usize..((row + 1) * samples_per_row) as usize];
        match container {
            Container::Packed10 => pack10_row(row_addr, row_samples),
            Container::U16Le => {
                for (col, &s) in row_samples.iter().enumerate() {
                    write_u16le(row_addr, col * 2, s);
                }
            }
            Container::U8 => {
                for (col, &s) in row_samples.iter().enumerate() {
                    write_u8(row_addr, col, s);
                }
            }
        }
    }
}

fn read_coef_table(addr: u64) -> [[i32; COEF_TAPS]; COEF_PHASES] {
    let ptr = addr as *const [i32; COEF_TAPS];
    let mut table = [[0i32; COEF_TAPS]; COEF_PHASES];
    // SAFETY: `addr` points at a `[[i32; COEF_TAPS]; COEF_PHASES]` boxed by
    // `scaler::engine::Scaler::process_frame` (either a generated table or
    // an override from `set_filter_coef`), kept alive for the duration of
    // this call.
    unsafe {
        for (i, row) in table.iter_mut().enumerate() {
            *row = *ptr.add(i);
        }
    }
    table
}

fn process_descriptor(descriptor: &Descriptor) -> Result<(), Error> {
    if descriptor.horiz_coef == 0 || descriptor.vert_coef == 0 {
        return Err(Error::InvalidArgument(
            "descriptor is missing a coefficient table address".into(),
        ));
    }

    let image = ingest(descriptor);

    let horiz_coef = read_coef_table(descriptor.horiz_coef);
    let vert_coef = read_coef_table(descriptor.vert_coef);
    let max_value = max_sample(image.bit_depth);

    let scale = |data: &[i32]| {
        resample_component(
            data,
            image.width,
            image.height,
            descriptor.out_width,
            descriptor.out_height,
            descriptor.line_rate,
            &vert_coef,
            descriptor.vert_taps,
            descriptor.pixel_rate,
            &horiz_coef,
            descriptor.horiz_taps,
            max_value,
        )
    };

    let scaled = Planar3 {
        width: descriptor.out_width,
        height: descriptor.out_height,
        family: image.family,
        bit_depth: image.bit_depth,
        c0: scale(&image.c0),
        c1: scale(&image.c1),
        c2: scale(&image.c2),
    };

    let out_format = VideoFormat::from_code(descriptor.out_format);
    let out_depth = bit_depth(out_format);
    let converted = convert_family(scaled, family_of(out_format), out_depth);

    egress(descriptor, converted);
    Ok(())
}

/// Reference scaler backend, always registered under `"software"`.
pub struct SoftwareScaler;

impl SoftwareScaler {
    pub fn new() -> Self {
        SoftwareScaler
    }
}

impl Default for SoftwareScaler {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerBackend for SoftwareScaler {
    fn name(&self) -> &'static str {
        "software"
    }

    fn requires_contiguous_device(&self) -> bool {
        false
    }

    fn process(&self, chain: &DescriptorChain) -> Result<BackendOutcome, Error> {
        for descriptor in chain.iter() {
            process_descriptor(descriptor)?;
        }
        Ok(BackendOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_and_pack_10bit_round_trip() {
        let mut word_storage = [0u8; 4];
        let samples = [5i32, 1000, 512];
        pack10_row(word_storage.as_mut_ptr() as u64, &samples);
        let unpacked = unpack10_row(word_storage.as_ptr() as u64, 3);
        assert_eq!(unpacked, samples);
    }

    #[test]
    fn yuv_rgb_round_trip_is_close_for_gray_values() {
        // Neutral chroma should reproduce the luma value in every channel.
        let (r, g, b) = yuv_to_rgb(128, 128, 128, 8, 255);
        assert_eq!((r, g, b), (128, 128, 128));
    }

    #[test]
    fn downsample_then_upsample_is_a_box_filter_round_trip_within_one() {
        let data = vec![10i32, 10, 20, 20, 30, 30, 40, 40];
        let down = downsample_horizontal(&data, 4, 2);
        assert_eq!(down.len(), 4);
        assert_eq!(down[0], 10);
    }

    #[test]
    fn software_backend_reports_correct_name() {
        let backend = SoftwareScaler::new();
        assert_eq!(backend.name(), "software");
        assert!(!backend.requires_contiguous_device());
    }

    #[test]
    fn empty_chain_processes_to_done() {
        let backend = SoftwareScaler::new();
        let chain = DescriptorChain::new();
        assert_eq!(backend.process(&chain).unwrap(), BackendOutcome::Done);
    }

    #[test]
    fn scale_identity_ratio_preserves_samples() {
        // 2-tap, all weight on the tap whose offset is 0 at zero fractional
        // position, so an identity-rate resample reproduces every sample.
        let coef = {
            let mut table = [[0i32; COEF_TAPS]; COEF_PHASES];
            table[0][0] = 4096;
            table
        };
        let data = vec![10i32, 20, 30, 40];
        let out = scale_horizontal(&data, 4, 1, 4, 1 << 20, &coef, 2, 255);
        assert_eq!(out, data);
    }
}
