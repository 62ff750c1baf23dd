// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! N-channel polyphase multi-scaler: channel geometry, coefficient
//! generation, descriptor construction, backend dispatch, and the
//! bundled software reference (`spec.md` §4.4, §4.5).

mod backend;
mod channel;
mod coeffs;
mod descriptor;
mod engine;
mod error;
mod software;

pub use backend::{BackendOutcome, ScalerBackend};
pub use channel::{HorizontalAlign, PreProcess, Rect, ScaleType, VerticalAlign};
pub use coeffs::{CoefLoadType, CoefType, CoefficientTable};
pub use engine::{Properties, ScaleMode, Scaler};
pub use error::Error;
pub use software::SoftwareScaler;

/// Registers a backend implementation under its own
/// [`ScalerBackend::name`], making it available to [`Scaler::create`].
pub fn register_backend(backend: std::sync::Arc<dyn ScalerBackend>) {
    backend::register(backend);
}
