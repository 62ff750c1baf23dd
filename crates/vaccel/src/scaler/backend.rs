// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Scaler backend trait and registry.
//!
//! A hardware kernel backend and the software reference both implement
//! [`ScalerBackend`] and are looked up by name from a small in-process
//! registry, rather than discovered by scanning `dlopen`-able shared
//! objects the way `videostream`'s codec backends are. The registry
//! always carries the built-in `"software"` backend; additional
//! backends register themselves with [`register`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use vaccel_sys::DescriptorChain;

use super::software::SoftwareScaler;
use super::Error;

/// Outcome of a backend's [`ScalerBackend::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOutcome {
    Done,
    TimedOut,
    Failed,
}

impl From<vaccel_sys::BackendStatus> for BackendOutcome {
    fn from(status: vaccel_sys::BackendStatus) -> Self {
        match status {
            vaccel_sys::BackendStatus::Done => BackendOutcome::Done,
            vaccel_sys::BackendStatus::TimedOut => BackendOutcome::TimedOut,
            vaccel_sys::BackendStatus::Failed => BackendOutcome::Failed,
        }
    }
}

/// Executes a descriptor chain built by [`crate::scaler::engine::Scaler`].
///
/// Implementations must be safe to call from whatever thread
/// `Scaler::process_frame` runs on; the software reference runs
/// synchronously, a hardware backend would typically block on a
/// completion interrupt or poll a status register.
pub trait ScalerBackend: Send + Sync {
    /// Name this backend is registered under (`spec.md` §4.4 "kernel
    /// name").
    fn name(&self) -> &'static str;

    /// `true` if this backend can only operate on
    /// [`crate::format::AllocKind::ContiguousDevice`] frames.
    fn requires_contiguous_device(&self) -> bool;

    /// Runs every descriptor in `chain` to completion (or failure).
    fn process(&self, chain: &DescriptorChain) -> Result<BackendOutcome, Error>;
}

type Registry = Mutex<HashMap<&'static str, Arc<dyn ScalerBackend>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut backends: HashMap<&'static str, Arc<dyn ScalerBackend>> = HashMap::new();
        let software: Arc<dyn ScalerBackend> = Arc::new(SoftwareScaler::new());
        backends.insert(software.name(), software);
        Mutex::new(backends)
    })
}

/// Registers (or replaces) a backend under its own [`ScalerBackend::name`].
pub fn register(backend: Arc<dyn ScalerBackend>) {
    registry().lock().unwrap().insert(backend.name(), backend);
}

/// Looks up a backend by kernel name. `"software"` is always present.
pub fn lookup(name: &str) -> Option<Arc<dyn ScalerBackend>> {
    registry().lock().unwrap().get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_backend_is_always_registered() {
        let backend = lookup("software").expect("software backend missing");
        assert_eq!(backend.name(), "software");
        assert!(!backend.requires_contiguous_device());
    }

    #[test]
    fn unknown_backend_name_is_absent() {
        assert!(lookup("no-such-backend").is_none());
    }

    struct NullBackend;

    impl ScalerBackend for NullBackend {
        fn name(&self) -> &'static str {
            "null"
        }

        fn requires_contiguous_device(&self) -> bool {
            false
        }

        fn process(&self, _chain: &DescriptorChain) -> Result<BackendOutcome, Error> {
            Ok(BackendOutcome::Done)
        }
    }

    #[test]
    #[serial_test::serial(scaler_backend_registry)]
    fn registering_a_backend_makes_it_look_up_able() {
        register(Arc::new(NullBackend));
        let backend = lookup("null").expect("registered backend missing");
        let chain = DescriptorChain::new();
        assert_eq!(backend.process(&chain).unwrap(), BackendOutcome::Done);
    }

    struct StubSoftwareBackend;

    impl ScalerBackend for StubSoftwareBackend {
        fn name(&self) -> &'static str {
            "software"
        }

        fn requires_contiguous_device(&self) -> bool {
            false
        }

        fn process(&self, _chain: &DescriptorChain) -> Result<BackendOutcome, Error> {
            Ok(BackendOutcome::Failed)
        }
    }

    /// Re-registering the built-in `"software"` name overrides what every
    /// other test in this crate sees from `lookup("software")`, so this
    /// test is serialized against the rest of the suite and restores the
    /// genuine backend before returning.
    #[test]
    #[serial_test::serial(scaler_backend_registry)]
    fn reregistering_software_name_overrides_lookup() {
        register(Arc::new(StubSoftwareBackend));
        let chain = DescriptorChain::new();
        let backend = lookup("software").expect("software backend missing");
        assert_eq!(backend.process(&chain).unwrap(), BackendOutcome::Failed);

        register(Arc::new(SoftwareScaler::new()));
        let restored = lookup("software").expect("software backend missing");
        assert!(!restored.requires_contiguous_device());
    }
}
