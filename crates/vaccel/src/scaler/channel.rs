// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Scaler channel geometry: rects, scale-type geometry adjustment, and the
//! channel-add alignment/validation pipeline (`spec.md` §4.4 steps 1-6).

use crate::format::VideoFormat;

use super::Error;

/// A pixel (or, for packed-10-bit formats, occasionally byte-shifted)
/// rectangle within a frame (`spec.md` §3 "Scaler channel").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Rect {
        Rect { x, y, width, height }
    }
}

/// Destination horizontal placement under `ScaleType::Letterbox`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalAlign {
    Left,
    Center,
    Right,
}

/// Destination vertical placement under `ScaleType::Letterbox`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAlign {
    Top,
    Center,
    Bottom,
}

/// Channel-add geometry adjustment mode (`spec.md` §4.4 step 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleType {
    /// No geometry adjustment.
    Default,
    /// Preserve source aspect ratio by shrinking destination width or
    /// height, placing the result per the given alignment.
    Letterbox {
        horizontal: HorizontalAlign,
        vertical: VerticalAlign,
    },
    /// Scale so the source's smaller side equals `smallest_side_num`,
    /// center-crop the source to the destination aspect ratio, then scale.
    EnvelopeCropped { smallest_side_num: u32 },
}

/// Optional per-channel affine pre-process applied to RGB/BGR outputs
/// (`spec.md` §4.5 step 7): `(sample - alpha) * beta`, beta expressed as a
/// `scale * 2^16` fixed-point value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreProcess {
    pub alpha: i32,
    pub scale: f32,
}

impl PreProcess {
    /// `beta = scale * 2^16`, as used by the descriptor (`spec.md` §4.4
    /// "Descriptor construction").
    pub fn beta_fixed(&self) -> i32 {
        (self.scale * 65_536.0).round() as i32
    }
}

fn align_down(value: u32, align: u32) -> u32 {
    if align <= 1 {
        value
    } else {
        (value / align) * align
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

/// Parameters needed to align and validate a channel's source rect,
/// independent of any live `Frame` (kept pure so the alignment math is
/// unit-testable without allocating frames).
#[derive(Debug, Clone, Copy)]
pub struct GeometryLimits {
    pub format: VideoFormat,
    pub pixels_per_clock: u32,
    /// Plane-0 stride/elevation of the frame the rect is validated
    /// against, in the same units as `Rect::x`/`width` (pixels, or bytes
    /// for packed-10-bit formats after step 3's conversion back to
    /// pixels).
    pub stride: u32,
    pub elevation: u32,
}

/// Applies `spec.md` §4.4 steps 2-5 to `rect`: minimum-size check,
/// x/width alignment (byte-boundary detour for packed-10-bit formats),
/// y/height alignment for 4:2:0/4:2:2, and stride/elevation bounds
/// checking.
pub fn align_and_validate(rect: Rect, limits: &GeometryLimits) -> Result<Rect, Error> {
    if rect.width < 16 || rect.height < 16 {
        return Err(Error::InvalidArgument(format!(
            "source rect {}x{} is smaller than the 16x16 backend minimum",
            rect.width, rect.height
        )));
    }

    let ppc = limits.pixels_per_clock.max(1);
    let mut x = rect.x;
    let mut width = rect.width;

    if limits.format.is_packed_10bit() {
        let x_bytes = (x / 3) * 4;
        let aligned_bytes = align_down(x_bytes, 8 * ppc);
        let aligned_x = (aligned_bytes / 4) * 3;
        let delta = x - aligned_x;
        x = aligned_x;
        width = align_up(width + delta, ppc);
    } else {
        let aligned_x = align_down(x, 8 * ppc);
        let delta = x - aligned_x;
        x = aligned_x;
        width = align_up(width + delta, ppc);
    }

    let mut y = rect.y;
    let mut height = rect.height;
    if limits.format.is_420() || limits.format.is_422() {
        let aligned_y = align_down(y, 2);
        let delta = y - aligned_y;
        y = aligned_y;
        height = align_up(height + delta, 2);
    }

    if x + width > limits.stride || y + height > limits.elevation {
        return Err(Error::InvalidArgument(format!(
            "aligned rect ({x},{y},{width}x{height}) exceeds plane bounds {}x{}",
            limits.stride, limits.elevation
        )));
    }

    Ok(Rect { x, y, width, height })
}

/// Applies `spec.md` §4.4 step 6 to compute the destination rect actually
/// written to, given the (already-aligned) source rect and the
/// caller-requested destination rect.
pub fn apply_scale_type(source: Rect, destination: Rect, scale_type: ScaleType) -> Rect {
    match scale_type {
        ScaleType::Default => destination,
        ScaleType::Letterbox { horizontal, vertical } => {
            letterbox(source, destination, horizontal, vertical)
        }
        ScaleType::EnvelopeCropped { .. } => destination,
    }
}

fn letterbox(
    source: Rect,
    destination: Rect,
    horizontal: HorizontalAlign,
    vertical: VerticalAlign,
) -> Rect {
    if source.width == 0 || source.height == 0 || destination.width == 0 || destination.height == 0
    {
        return destination;
    }

    let src_aspect = source.width as f64 / source.height as f64;
    let dst_aspect = destination.width as f64 / destination.height as f64;

    let (width, height) = if src_aspect > dst_aspect {
        // Source is wider: destination width is the limiting dimension.
        let height = (destination.width as f64 / src_aspect).round() as u32;
        (destination.width, height.min(destination.height).max(1))
    } else {
        let width = (destination.height as f64 * src_aspect).round() as u32;
        (width.min(destination.width).max(1), destination.height)
    };

    let x = destination.x
        + match horizontal {
            HorizontalAlign::Left => 0,
            HorizontalAlign::Center => (destination.width - width) / 2,
            HorizontalAlign::Right => destination.width - width,
        };
    let y = destination.y
        + match vertical {
            VerticalAlign::Top => 0,
            VerticalAlign::Center => (destination.height - height) / 2,
            VerticalAlign::Bottom => destination.height - height,
        };

    Rect { x, y, width, height }
}

/// Step 6's `EnvelopeCropped` case: computes the source sub-rect to crop
/// to before scaling, given the destination aspect ratio.
pub fn envelope_crop_source(source: Rect, destination: Rect, smallest_side_num: u32) -> Rect {
    if source.width == 0 || source.height == 0 || destination.width == 0 || destination.height == 0
    {
        return source;
    }
    let dst_aspect = destination.width as f64 / destination.height as f64;
    let (crop_width, crop_height) = if source.width <= source.height {
        let crop_width = smallest_side_num.min(source.width).max(1);
        let crop_height = ((crop_width as f64) / dst_aspect).round() as u32;
        (crop_width, crop_height.min(source.height).max(1))
    } else {
        let crop_height = smallest_side_num.min(source.height).max(1);
        let crop_width = ((crop_height as f64) * dst_aspect).round() as u32;
        (crop_width.min(source.width).max(1), crop_height)
    };
    let x = source.x + (source.width - crop_width) / 2;
    let y = source.y + (source.height - crop_height) / 2;
    Rect {
        x,
        y,
        width: crop_width,
        height: crop_height,
    }
}
