// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! The `Scaler` engine: channel accumulation, descriptor-chain
//! construction, and dispatch to a looked-up [`ScalerBackend`]
//! (`spec.md` §4.4).

use std::thread;
use std::time::Duration;

use vaccel_sys::{DescriptorChain, PreProcess as WirePreProcess};

use crate::device::Context;
use crate::format::{AllocKind, VideoFormat};
use crate::memory::{Frame, SyncDirection};

use super::backend::{self, BackendOutcome, ScalerBackend};
use super::channel::{self, GeometryLimits, PreProcess, Rect, ScaleType};
use super::coeffs::{self, CoefLoadType, CoefType, CoefficientTable};
use super::descriptor;
use super::Error;

/// `spec.md` §3 "Scaler properties".
#[derive(Debug, Clone, PartialEq)]
pub struct Properties {
    pub coefficient_load_type: CoefLoadType,
    pub scale_mode: ScaleMode,
    pub filter_taps: u32,
    pub pixels_per_clock: u32,
    pub memory_bank: u32,
    pub supported_formats: Vec<VideoFormat>,
}

impl Default for Properties {
    fn default() -> Self {
        Properties {
            coefficient_load_type: CoefLoadType::AutoGenerate,
            scale_mode: ScaleMode::Polyphase,
            filter_taps: 6,
            pixels_per_clock: 1,
            memory_bank: 0,
            supported_formats: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMode {
    Bilinear,
    Bicubic,
    Polyphase,
}

const MAX_RETRIES: u32 = 10;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// N-channel polyphase scaler (`spec.md` §4.4).
///
/// Holds a cloned [`Context`] handle, a looked-up backend, per-scaler
/// coefficient overrides set via [`Scaler::set_filter_coef`], and the
/// channel list accumulated by [`Scaler::add_channel`] until the next
/// [`Scaler::process_frame`] call clears it (on both success and failure,
/// per `spec.md` §4.4 "Execution").
pub struct Scaler {
    context: Context,
    backend: std::sync::Arc<dyn ScalerBackend>,
    properties: Properties,
    horiz_override: Option<CoefficientTable>,
    vert_override: Option<CoefficientTable>,
    channels: Vec<PendingChannelOwned>,
}

/// An accumulated channel's request parameters, owned (not borrowed) so
/// the channel list can outlive the call that added it until
/// `process_frame` consumes it. Frame references are re-borrowed from the
/// caller's `&Frame` at `process_frame` time instead, via index into a
/// parallel `Vec` supplied to `process_frame` — see [`Scaler::add_channel`].
struct PendingChannelOwned {
    source_rect: Rect,
    destination_rect: Rect,
    preprocess: Option<PreProcess>,
}

impl Scaler {
    /// *Create*(ctx, kernel_name, log_level) (`spec.md` §4.4). `log_level`
    /// is carried by `ctx` itself rather than duplicated here, matching
    /// `device::Context`'s existing role as the log-level handle threaded
    /// through every subsystem.
    pub fn create(context: &Context, kernel_name: &str) -> Result<Scaler, Error> {
        let backend = backend::lookup(kernel_name).ok_or_else(|| {
            Error::NotSupported(format!("no scaler backend registered as {kernel_name:?}"))
        })?;
        log::info!("scaler created with backend {kernel_name:?}");
        Ok(Scaler {
            context: context.clone(),
            backend,
            properties: Properties::default(),
            horiz_override: None,
            vert_override: None,
            channels: Vec::new(),
        })
    }

    /// The device context this scaler was created with.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// *PropSet* (`spec.md` §4.4).
    pub fn set_properties(&mut self, properties: Properties) {
        self.properties = properties;
    }

    /// *SetFilterCoef*(scaler, coef_type, table) (`spec.md` §4.4):
    /// overwrites the default coefficient table for one direction. Takes
    /// effect on the next channel added, not retroactively on already
    /// pending channels.
    pub fn set_filter_coef(&mut self, coef_type: CoefType, table: CoefficientTable) {
        match coef_type {
            CoefType::Horizontal => self.horiz_override = Some(table),
            CoefType::Vertical => self.vert_override = Some(table),
        }
    }

    /// *ChannelAdd*(scaler, source_rect, destination_rect, pre-process?,
    /// scale_type?) (`spec.md` §4.4 "Channel-add validation and
    /// alignment").
    #[allow(clippy::too_many_arguments)]
    pub fn add_channel(
        &mut self,
        source: &Frame,
        source_rect: Rect,
        destination: &Frame,
        destination_rect: Rect,
        preprocess: Option<PreProcess>,
        scale_type: ScaleType,
    ) -> Result<(), Error> {
        if self.backend.requires_contiguous_device() {
            if source.alloc_kind() != AllocKind::ContiguousDevice
                || destination.alloc_kind() != AllocKind::ContiguousDevice
            {
                return Err(Error::InvalidArgument(
                    "backend requires ContiguousDevice source and destination frames".into(),
                ));
            }
        }

        let src_info = source.video_info();
        let aligned_source = channel::align_and_validate(
            source_rect,
            &GeometryLimits {
                format: src_info.format,
                pixels_per_clock: self.properties.pixels_per_clock,
                stride: src_info.planes[0].stride,
                elevation: src_info.planes[0].elevation,
            },
        )?;

        let (source_rect, destination_rect) = match scale_type {
            ScaleType::EnvelopeCropped { smallest_side_num } => (
                channel::envelope_crop_source(aligned_source, destination_rect, smallest_side_num),
                destination_rect,
            ),
            _ => (
                aligned_source,
                channel::apply_scale_type(aligned_source, destination_rect, scale_type),
            ),
        };

        self.channels.push(PendingChannelOwned {
            source_rect,
            destination_rect,
            preprocess,
        });
        Ok(())
    }

    fn select_table(&self, override_table: &Option<CoefficientTable>, scale_ratio: f64) -> CoefficientTable {
        override_table
            .clone()
            .unwrap_or_else(|| coeffs::select_table(self.properties.coefficient_load_type, scale_ratio))
    }

    /// *ProcessFrame*(scaler) (`spec.md` §4.4 "Execution"). Takes the
    /// live `(source, destination)` frame pairs in the same order the
    /// corresponding channels were added, since `add_channel` itself only
    /// stores aligned rects (frame references are borrowed, not owned,
    /// and the engine holds only weak references to them per `spec.md`
    /// §3's ownership summary).
    pub fn process_frame(&mut self, frames: &[(&Frame, &Frame)]) -> Result<(), Error> {
        let result = self.process_frame_inner(frames);
        self.channels.clear();
        result
    }

    fn process_frame_inner(&mut self, frames: &[(&Frame, &Frame)]) -> Result<(), Error> {
        if frames.len() != self.channels.len() {
            return Err(Error::InvalidArgument(format!(
                "process_frame given {} frame pairs for {} pending channels",
                frames.len(),
                self.channels.len()
            )));
        }

        let mut chain = DescriptorChain::new();
        // Keeps every channel's boxed coefficient rows alive for the
        // duration of dispatch; `descriptor::build` only records their
        // addresses.
        let mut coef_storage: Vec<Box<[[i32; coeffs::MAX_TAPS]]>> = Vec::new();

        for (channel, (source, destination)) in self.channels.iter().zip(frames.iter()) {
            let horiz_ratio = channel.source_rect.width as f64 / channel.destination_rect.width.max(1) as f64;
            let vert_ratio = channel.source_rect.height as f64 / channel.destination_rect.height.max(1) as f64;

            let horiz_table = self.select_table(&self.horiz_override, horiz_ratio);
            let vert_table = self.select_table(&self.vert_override, vert_ratio);

            let horiz_rows = horiz_table.into_boxed_rows();
            let vert_rows = vert_table.into_boxed_rows();
            let horiz_addr = horiz_rows.as_ptr() as u64;
            let vert_addr = vert_rows.as_ptr() as u64;
            let horiz_taps = horiz_table.taps as u32;
            let vert_taps = vert_table.taps as u32;
            coef_storage.push(horiz_rows);
            coef_storage.push(vert_rows);

            let wire_preprocess = channel.preprocess.map(|pp| WirePreProcess {
                alpha: [pp.alpha; 3],
                beta: [pp.beta_fixed(); 3],
            });

            let descriptor = descriptor::build(
                source,
                channel.source_rect,
                destination,
                channel.destination_rect,
                horiz_addr,
                horiz_taps,
                vert_addr,
                vert_taps,
                wire_preprocess,
            )?;
            chain.push(descriptor);
        }

        for (source, _) in frames {
            source.mark_pending_to_device();
            source.sync_data(SyncDirection::ToDevice).map_err(Error::from)?;
        }

        let outcome = self.dispatch(&chain)?;
        match outcome {
            BackendOutcome::Done => {}
            BackendOutcome::TimedOut => return Err(Error::Timeout),
            BackendOutcome::Failed => {
                return Err(Error::DeviceError("backend reported failure".into()))
            }
        }

        for (_, destination) in frames {
            destination.mark_pending_from_device();
        }

        Ok(())
    }

    /// Runs `chain` through the looked-up backend. Host-side backends
    /// (the software reference) complete synchronously and need no retry
    /// loop; a hardware backend is retried up to [`MAX_RETRIES`] times,
    /// each attempt bounded by [`ATTEMPT_TIMEOUT`] (`spec.md` §4.4
    /// "Execution").
    fn dispatch(&self, chain: &DescriptorChain) -> Result<BackendOutcome, Error> {
        if !self.backend.requires_contiguous_device() {
            return self.backend.process(chain);
        }

        for attempt in 0..=MAX_RETRIES {
            let started = std::time::Instant::now();
            match self.backend.process(chain) {
                Ok(BackendOutcome::Done) => return Ok(BackendOutcome::Done),
                Ok(BackendOutcome::TimedOut) => {
                    log::warn!("scaler backend attempt {attempt} timed out");
                    let elapsed = started.elapsed();
                    if elapsed < ATTEMPT_TIMEOUT {
                        thread::sleep(ATTEMPT_TIMEOUT - elapsed);
                    }
                    continue;
                }
                Ok(BackendOutcome::Failed) => return Ok(BackendOutcome::Failed),
                Err(err) => return Err(err),
            }
        }
        Ok(BackendOutcome::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{AllocFlags, Alignment, VideoInfo};
    use crate::LogLevel;

    fn frame(ctx: &Context, width: u32, height: u32, format: VideoFormat) -> Frame {
        let info = VideoInfo::new(width, height, format, Alignment::default());
        Frame::allocate(ctx, AllocKind::HostOnly, AllocFlags::empty(), -1, info).unwrap()
    }

    #[test]
    fn create_fails_for_unknown_kernel_name() {
        let ctx = Context::create(-1, None, LogLevel::Info).unwrap();
        let err = Scaler::create(&ctx, "no-such-kernel").unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }

    #[test]
    fn create_succeeds_for_software_backend() {
        let ctx = Context::create(-1, None, LogLevel::Info).unwrap();
        let scaler = Scaler::create(&ctx, "software").unwrap();
        assert_eq!(scaler.properties().filter_taps, 6);
    }

    #[test]
    fn process_frame_with_no_channels_is_a_no_op() {
        let ctx = Context::create(-1, None, LogLevel::Info).unwrap();
        let mut scaler = Scaler::create(&ctx, "software").unwrap();
        assert!(scaler.process_frame(&[]).is_ok());
    }

    #[test]
    fn single_channel_nv12_to_bgr_marks_destination_from_device() {
        let ctx = Context::create(-1, None, LogLevel::Info).unwrap();
        let mut scaler = Scaler::create(&ctx, "software").unwrap();

        let source = frame(&ctx, 64, 64, VideoFormat::Y_UV8_420);
        let destination = frame(&ctx, 32, 32, VideoFormat::BGR);

        {
            let map = source.map(crate::memory::MapFlags::WRITE).unwrap();
            let _ = map.plane_sizes();
        }

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
            .process_frame(&[(&source, &destination)])
            .unwrap();

        assert!(destination
            .sync_flags()
            .contains(crate::format::SyncFlags::FROM_DEVICE));
        assert!(scaler.channels.is_empty());
    }

    #[test]
    fn failed_process_frame_still_clears_channel_list() {
        let ctx = Context::create(-1, None, LogLevel::Info).unwrap();
        let mut scaler = Scaler::create(&ctx, "software").unwrap();

        let source = frame(&ctx, 64, 64, VideoFormat::Y_UV8_420);
        let destination = frame(&ctx, 32, 32, VideoFormat::BGR);

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

        // Wrong frame-pair count: process_frame must fail but still empty
        // the channel list (`spec.md` §7 "failed ProcessFrame clears the
        // pending channel list").
        assert!(scaler.process_frame(&[]).is_err());
        assert!(scaler.channels.is_empty());
    }

    #[test]
    fn small_source_rect_rejects_channel_add() {
        let ctx = Context::create(-1, None, LogLevel::Info).unwrap();
        let mut scaler = Scaler::create(&ctx, "software").unwrap();
        let source = frame(&ctx, 64, 64, VideoFormat::Y_UV8_420);
        let destination = frame(&ctx, 32, 32, VideoFormat::BGR);

        let err = scaler
            .add_channel(
                &source,
                Rect::new(0, 0, 8, 8),
                &destination,
                Rect::new(0, 0, 32, 32),
                None,
                ScaleType::Default,
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
