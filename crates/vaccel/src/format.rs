// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Video format, plane layout, and video-info data model.
//!
//! Implements the plane-layout algorithm of `spec.md` §4.2: given
//! `(width, height, format, alignment)`, derive per-plane stride,
//! elevation (row count), offset, and size, growing right padding until
//! every plane's stride satisfies its alignment requirement.

use bitflags::bitflags;

/// Closed set of pixel formats this core understands (`spec.md` §3).
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoFormat {
    /// NV12: 4:2:0, interleaved UV plane.
    Y_UV8_420,
    /// 4:2:0, planar U then V.
    I420,
    /// 4:2:0 NV12 layout with 10-bit samples packed 3-per-4-bytes.
    NV12_10LE32,
    /// 4:2:2, interleaved UV plane, full chroma height.
    NV16,
    YUY2,
    RGB,
    BGR,
    RGBx,
    BGRx,
    RGBA,
    BGRA,
    GRAY8,
    GRAY10_LE32,
    /// 4:2:2, planar, 10-bit samples in 16-bit little-endian containers.
    I422_10LE,
    /// Packed 4:4:4 8-bit (`v308`).
    v308,
    /// Packed 4:4:4 10-bit (`r210`).
    r210,
    /// Packed 4:4:4 10-bit (`Y410`).
    Y410,
    Unknown,
}

impl VideoFormat {
    /// `true` for 4:2:0-subsampled formats (chroma alignment rules apply).
    pub fn is_420(self) -> bool {
        matches!(
            self,
            VideoFormat::Y_UV8_420 | VideoFormat::I420 | VideoFormat::NV12_10LE32
        )
    }

    /// `true` for 4:2:2-subsampled formats.
    pub fn is_422(self) -> bool {
        matches!(self, VideoFormat::NV16 | VideoFormat::I422_10LE)
    }

    /// `true` for the two packed-10-bit formats that force byte-boundary
    /// (rather than pixel-boundary) x-alignment in the scaler
    /// (`spec.md` §4.4 step 3).
    pub fn is_packed_10bit(self) -> bool {
        matches!(self, VideoFormat::NV12_10LE32 | VideoFormat::GRAY10_LE32)
    }

    /// Number of planes this format lays out to, or `None` for
    /// [`VideoFormat::Unknown`].
    pub fn n_planes(self) -> Option<u32> {
        plane_layout_table(self).map(|t| t.n_planes)
    }

    /// Maps to the stable numeric code a descriptor (`vaccel-sys`) carries
    /// across the backend boundary, so a hardware driver sees the same
    /// wire value this crate's own `VideoFormat` variant represents.
    pub fn to_code(self) -> u32 {
        use vaccel_sys::format_code::*;
        match self {
            VideoFormat::Y_UV8_420 => Y_UV8_420,
            VideoFormat::I420 => I420,
            VideoFormat::NV12_10LE32 => NV12_10LE32,
            VideoFormat::NV16 => NV16,
            VideoFormat::YUY2 => YUY2,
            VideoFormat::RGB => RGB,
            VideoFormat::BGR => BGR,
            VideoFormat::RGBx => RGBX,
            VideoFormat::BGRx => BGRX,
            VideoFormat::RGBA => RGBA,
            VideoFormat::BGRA => BGRA,
            VideoFormat::GRAY8 => GRAY8,
            VideoFormat::GRAY10_LE32 => GRAY10_LE32,
            VideoFormat::I422_10LE => I422_10LE,
            VideoFormat::v308 => V308,
            VideoFormat::r210 => R210,
            VideoFormat::Y410 => Y410,
            VideoFormat::Unknown => UNKNOWN,
        }
    }

    /// Inverse of [`VideoFormat::to_code`]; `Unknown` for any code this
    /// core does not recognize.
    pub fn from_code(code: u32) -> VideoFormat {
        use vaccel_sys::format_code::*;
        match code {
            Y_UV8_420 => VideoFormat::Y_UV8_420,
            I420 => VideoFormat::I420,
            NV12_10LE32 => VideoFormat::NV12_10LE32,
            NV16 => VideoFormat::NV16,
            YUY2 => VideoFormat::YUY2,
            RGB => VideoFormat::RGB,
            BGR => VideoFormat::BGR,
            RGBX => VideoFormat::RGBx,
            BGRX => VideoFormat::BGRx,
            RGBA => VideoFormat::RGBA,
            BGRA => VideoFormat::BGRA,
            GRAY8 => VideoFormat::GRAY8,
            GRAY10_LE32 => VideoFormat::GRAY10_LE32,
            I422_10LE => VideoFormat::I422_10LE,
            V308 => VideoFormat::v308,
            R210 => VideoFormat::r210,
            Y410 => VideoFormat::Y410,
            _ => VideoFormat::Unknown,
        }
    }

    /// `true` for formats whose pixels are RGB-ordered channels (as
    /// opposed to BGR-ordered or YUV), used by the software reference's
    /// color-space conversion step to decide whether a byte swap alone
    /// suffices (`spec.md` §4.5 step 5).
    pub fn is_rgb_order(self) -> bool {
        matches!(
            self,
            VideoFormat::RGB | VideoFormat::RGBx | VideoFormat::RGBA
        )
    }

    /// `true` for formats whose pixels are BGR-ordered channels.
    pub fn is_bgr_order(self) -> bool {
        matches!(
            self,
            VideoFormat::BGR | VideoFormat::BGRx | VideoFormat::BGRA
        )
    }

    /// `true` for packed RGB/BGR-family formats the software reference's
    /// pre-process step applies to (`spec.md` §4.5 step 7).
    pub fn is_rgb_family(self) -> bool {
        self.is_rgb_order() || self.is_bgr_order()
    }

    /// Bytes per pixel for single-plane packed formats (`spec.md` §4.2
    /// plane-layout table); `None` for planar/semi-planar formats where a
    /// single "bytes per pixel" does not describe the layout.
    pub fn packed_bytes_per_pixel(self) -> Option<u32> {
        match self {
            VideoFormat::RGBx
            | VideoFormat::BGRx
            | VideoFormat::RGBA
            | VideoFormat::BGRA
            | VideoFormat::r210
            | VideoFormat::Y410 => Some(4),
            VideoFormat::RGB | VideoFormat::BGR | VideoFormat::v308 => Some(3),
            VideoFormat::GRAY8 => Some(1),
            _ => None,
        }
    }
}

bitflags! {
    /// Pending host<->device synchronization directions for a frame.
    ///
    /// Invariant (`spec.md` §3): `TO_DEVICE` and `FROM_DEVICE` are never
    /// simultaneously set; a successful sync in one direction clears that
    /// bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SyncFlags: u8 {
        const TO_DEVICE = 0b01;
        const FROM_DEVICE = 0b10;
    }
}

bitflags! {
    /// Implementation-defined allocation hints passed through to
    /// [`crate::memory::Frame::allocate`]. The spec names this parameter
    /// but does not enumerate bit meanings beyond allocation kind (which is
    /// its own [`AllocKind`] enum); this reserves a `CACHEABLE` hint for
    /// host-mapped device buffers, the one hint every allocator in the
    /// corpus's device-memory code exposes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AllocFlags: u32 {
        const CACHEABLE = 0b01;
    }
}

/// Tagged allocation-kind enum (`spec.md` §3 "Allocation kind").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocKind {
    /// Mapped/backed by the device: physical address obtainable,
    /// synchronizable.
    ContiguousDevice,
    /// Ordinary heap memory.
    HostOnly,
    /// Caller-supplied buffer; the caller owns the underlying storage. A
    /// free callback may be attached (see [`crate::memory::Frame`]).
    External,
}

/// Per-plane layout: byte stride, row count, byte offset from frame start,
/// and total byte size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaneDescriptor {
    pub stride: u32,
    pub elevation: u32,
    pub offset: u32,
    pub size: u32,
}

/// Padding and per-plane stride alignment requirements.
///
/// `stride_align[i]` must be a power of two (or `0`, meaning "no alignment
/// requirement" for that plane).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Alignment {
    pub padding_left: u32,
    pub padding_right: u32,
    pub padding_top: u32,
    pub padding_bottom: u32,
    pub stride_align: [u32; 3],
}

const MAX_PLANES: usize = 3;
/// Safety cap on the padding-doubling loop in [`VideoInfo::new`]; no
/// realistic stride-alignment requirement should need more than a handful
/// of doublings (each doubling at least doubles `padding_right`, so this
/// bounds total padding growth to `2^20` which is already absurd for a
/// frame).
const MAX_ALIGN_ITERATIONS: u32 = 20;

fn roundup2(v: u32) -> u32 {
    v.div_ceil(2) * 2
}

fn roundup4(v: u32) -> u32 {
    v.div_ceil(4) * 4
}

struct PlaneShape {
    n_planes: u32,
    /// (stride, elevation) per plane, parameterized on padded_width/height.
    shape: fn(u32, u32) -> [(u32, u32); MAX_PLANES],
}

fn plane_layout_table(format: VideoFormat) -> Option<PlaneShape> {
    use VideoFormat::*;
    let shape: fn(u32, u32) -> [(u32, u32); MAX_PLANES] = match format {
        Y_UV8_420 => |pw, ph| {
            let s0 = roundup4(pw);
            let e0 = roundup2(ph);
            [(s0, e0), (s0, e0 / 2), (0, 0)]
        },
        I420 => |pw, ph| {
            let s0 = roundup4(pw);
            let e0 = roundup2(ph);
            let s1 = roundup4(roundup2(pw) / 2);
            let e1 = e0 / 2;
            [(s0, e0), (s1, e1), (s1, e1)]
        },
        RGBx | BGRx | RGBA | BGRA | r210 | Y410 => {
            |pw, ph| [(pw * 4, ph), (0, 0), (0, 0)]
        }
        YUY2 => |pw, ph| [(roundup4(pw * 2), ph), (0, 0), (0, 0)],
        NV16 => |pw, ph| {
            let s0 = roundup4(pw);
            [(s0, ph), (s0, ph), (0, 0)]
        },
        RGB | BGR | v308 => |pw, ph| [(roundup4(pw * 3), ph), (0, 0), (0, 0)],
        I422_10LE => |pw, ph| {
            let s0 = roundup4(pw * 2);
            let e0 = roundup2(ph);
            let s1 = roundup4(pw);
            [(s0, e0), (s1, e0), (s1, e0)]
        },
        NV12_10LE32 => |pw, ph| {
            let s0 = ((pw + 2) / 3) * 4;
            let e0 = roundup2(ph);
            [(s0, e0), (s0, e0 / 2), (0, 0)]
        },
        GRAY8 => |pw, ph| [(roundup4(pw), ph), (0, 0), (0, 0)],
        GRAY10_LE32 => |pw, ph| {
            let s0 = ((pw + 2) / 3) * 4;
            [(s0, roundup2(ph)), (0, 0), (0, 0)]
        },
        Unknown => return None,
    };

    let n_planes = match format {
        Y_UV8_420 | NV16 | NV12_10LE32 => 2,
        I420 | I422_10LE => 3,
        Unknown => unreachable!(),
        _ => 1,
    };

    Some(PlaneShape { n_planes, shape })
}

/// Full video geometry: dimensions, format, and derived plane layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub format: VideoFormat,
    pub n_planes: u32,
    pub planes: [PlaneDescriptor; MAX_PLANES],
    pub alignment: Alignment,
}

impl VideoInfo {
    /// Computes the full plane layout for `(width, height, format)` under
    /// `alignment`, per `spec.md` §4.2.
    ///
    /// Returns `None` for [`VideoFormat::Unknown`] (no layout rule is
    /// defined).
    pub fn new(width: u32, height: u32, format: VideoFormat, alignment: Alignment) -> Self {
        Self::try_new(width, height, format, alignment)
            .unwrap_or_else(|| VideoInfo::unknown(width, height))
    }

    /// Fallible variant of [`VideoInfo::new`]; `None` for
    /// [`VideoFormat::Unknown`] or any format without a layout rule.
    pub fn try_new(
        width: u32,
        height: u32,
        format: VideoFormat,
        mut alignment: Alignment,
    ) -> Option<Self> {
        let table = plane_layout_table(format)?;

        let mut iterations = 0u32;
        loop {
            let padded_width = width + alignment.padding_left + alignment.padding_right;
            let padded_height = height + alignment.padding_top + alignment.padding_bottom;
            let shape = (table.shape)(padded_width, padded_height);

            let mut aligned = true;
            for i in 0..table.n_planes as usize {
                let (stride, _) = shape[i];
                let mask = alignment.stride_align[i];
                if mask > 0 && stride % mask != 0 {
                    aligned = false;
                    break;
                }
            }

            if aligned || iterations >= MAX_ALIGN_ITERATIONS {
                let mut planes = [PlaneDescriptor::default(); MAX_PLANES];
                let mut offset = 0u32;
                for i in 0..table.n_planes as usize {
                    let (stride, elevation) = shape[i];
                    let size = stride * elevation;
                    planes[i] = PlaneDescriptor {
                        stride,
                        elevation,
                        offset,
                        size,
                    };
                    offset += size;
                }
                return Some(VideoInfo {
                    width,
                    height,
                    format,
                    n_planes: table.n_planes,
                    planes,
                    alignment,
                });
            }

            alignment.padding_right = alignment.padding_right.max(1) * 2;
            iterations += 1;
        }
    }

    fn unknown(width: u32, height: u32) -> Self {
        VideoInfo {
            width,
            height,
            format: VideoFormat::Unknown,
            n_planes: 0,
            planes: [PlaneDescriptor::default(); MAX_PLANES],
            alignment: Alignment::default(),
        }
    }

    /// Total buffer size across all planes.
    pub fn total_size(&self) -> u32 {
        self.planes[..self.n_planes as usize]
            .iter()
            .map(|p| p.size)
            .sum()
    }
}
