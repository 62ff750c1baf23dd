// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Memory object / video-frame operations: allocate, map, sync, free.
//!
//! A [`Frame`] owns its backing storage according to its [`AllocKind`]:
//! heap-allocated for [`AllocKind::HostOnly`], an anonymous `memfd`-backed
//! mapping wrapped in a [`dma_buf::DmaBuf`] for [`AllocKind::ContiguousDevice`]
//! (there being no real dma-heap driver to allocate from in this
//! environment, a shareable anonymous mapping is the closest software
//! stand-in that still round-trips through the real crate's `from_raw_fd`
//! contract), or caller-supplied storage (with an optional free callback)
//! for [`AllocKind::External`].

use crate::device::Context;
use crate::format::{AllocFlags, AllocKind, SyncFlags, VideoInfo};
use crate::Error;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd};
use std::sync::Mutex;

struct DeviceMapping {
    dmabuf: dma_buf::DmaBuf,
    ptr: *mut u8,
    len: usize,
}

impl DeviceMapping {
    fn allocate(len: usize) -> Result<Self, Error> {
        let name = std::ffi::CString::new("vaccel-frame").unwrap();
        // SAFETY: `memfd_create` with a valid NUL-terminated name and no
        // unsupported flags either returns a valid owned fd or -1.
        let raw_fd = unsafe { libc::memfd_create(name.as_ptr(), 0) };
        if raw_fd < 0 {
            return Err(Error::AllocationFailure(format!(
                "memfd_create failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        // SAFETY: `raw_fd` was just returned by a successful `memfd_create`
        // and is not owned elsewhere yet.
        let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

        // SAFETY: `fd` is a valid, open file descriptor.
        let ret = unsafe { libc::ftruncate(fd.as_raw_fd(), len as libc::off_t) };
        if ret != 0 {
            return Err(Error::AllocationFailure(format!(
                "ftruncate failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        // SAFETY: `fd` is valid and sized to `len`; the mapping is shared
        // read/write and the resulting pointer is not aliased until
        // returned from this function.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(Error::AllocationFailure(format!(
                "mmap failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        // SAFETY: `fd` was created by this function and not shared; `DmaBuf`
        // takes ownership of the descriptor, matching the teacher's own
        // `DmaBuf::from_raw_fd` usage over a driver-owned fd.
        let dmabuf = unsafe { dma_buf::DmaBuf::from_raw_fd(fd.into_raw_fd()) };

        Ok(DeviceMapping {
            dmabuf,
            ptr: ptr as *mut u8,
            len,
        })
    }

    fn device_address(&self) -> u64 {
        self.ptr as u64
    }
}

impl Drop for DeviceMapping {
    fn drop(&mut self) {
        // SAFETY: `self.ptr`/`self.len` came from a successful `mmap` of
        // this same length in `allocate` and have not been unmapped yet.
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

// SAFETY: the mapping is only ever accessed through `&Frame`/`&mut Frame`
// borrows serialized by the caller, same as `Storage::External`.
unsafe impl Send for DeviceMapping {}

/// Direction requested from [`Frame::sync_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    ToDevice,
    FromDevice,
}

bitflags::bitflags! {
    /// Access mode requested from [`Frame::map`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapFlags: u32 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

/// Presentation/decode timing metadata attached to a frame (`spec.md` §4.2).
///
/// All three fields are plain monotonic counts in the stream's own time
/// base, not wall-clock timestamps; this core does not interpret their
/// units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Metadata {
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
}

enum Storage {
    Host(Vec<u8>),
    Device(DeviceMapping),
    External {
        ptr: *mut u8,
        len: usize,
        free: Option<Box<dyn FnOnce() + Send>>,
    },
}

// SAFETY: `External::ptr` is only ever dereferenced through `&self`/`&mut
// self` borrows of the owning `Frame`, which itself requires `&Frame`/`&mut
// Frame` access serialized by the caller; the raw pointer is never read
// concurrently from multiple threads by this crate's own code.
unsafe impl Send for Storage {}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Storage::External { free, .. } = self {
            if let Some(free) = free.take() {
                free();
            }
        }
    }
}

struct Inner {
    #[allow(dead_code)] // kept alive so device sync/dealloc stays valid
    context: Context,
    alloc_kind: AllocKind,
    alloc_flags: AllocFlags,
    device_index: i32,
    storage: Mutex<Storage>,
    info: Mutex<VideoInfo>,
    metadata: Mutex<Metadata>,
    sync_flags: Mutex<SyncFlags>,
}

/// A single video frame's backing memory plus its geometry and timing
/// metadata.
pub struct Frame {
    inner: Inner,
}

/// A mapping of a [`Frame`]'s planes, valid until dropped.
///
/// Dropping the mapping does not itself synchronize; call
/// [`Frame::sync_data`] explicitly after writing through a `WRITE` mapping.
pub struct FrameMap<'a> {
    frame: &'a Frame,
    flags: MapFlags,
}

impl Frame {
    /// Allocates a new frame. `device_index` is only meaningful for
    /// [`AllocKind::ContiguousDevice`].
    pub fn allocate(
        context: &Context,
        alloc_kind: AllocKind,
        alloc_flags: AllocFlags,
        device_index: i32,
        info: VideoInfo,
    ) -> Result<Self, Error> {
        if alloc_kind == AllocKind::ContiguousDevice && !context.has_device() {
            return Err(Error::InvalidArgument(
                "ContiguousDevice allocation requires a context opened with a device".into(),
            ));
        }

        let size = info.total_size() as usize;
        let storage = match alloc_kind {
            AllocKind::HostOnly => Storage::Host(vec![0u8; size]),
            AllocKind::ContiguousDevice => Storage::Device(DeviceMapping::allocate(size)?),
            AllocKind::External => {
                return Err(Error::InvalidArgument(
                    "External frames must be created with Frame::from_external".into(),
                ))
            }
        };

        log::debug!(
            "allocated frame: kind={alloc_kind:?} size={size} format={:?}",
            info.format
        );

        Ok(Frame {
            inner: Inner {
                context: context.clone(),
                alloc_kind,
                alloc_flags,
                device_index,
                storage: Mutex::new(storage),
                info: Mutex::new(info),
                metadata: Mutex::new(Metadata::default()),
                sync_flags: Mutex::new(SyncFlags::empty()),
            },
        })
    }

    /// Wraps caller-supplied storage without copying. `free`, if given, runs
    /// exactly once, when the last reference to this frame's storage is
    /// dropped.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes for `len` bytes for as long
    /// as this `Frame` (and anything it is cloned into) is alive, and must
    /// not be aliased by any other live reference.
    pub unsafe fn from_external(
        context: &Context,
        info: VideoInfo,
        ptr: *mut u8,
        len: usize,
        free: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<Self, Error> {
        if ptr.is_null() {
            return Err(Error::NullPointer);
        }
        Ok(Frame {
            inner: Inner {
                context: context.clone(),
                alloc_kind: AllocKind::External,
                alloc_flags: AllocFlags::empty(),
                device_index: -1,
                storage: Mutex::new(Storage::External { ptr, len, free }),
                info: Mutex::new(info),
                metadata: Mutex::new(Metadata::default()),
                sync_flags: Mutex::new(SyncFlags::empty()),
            },
        })
    }

    /// FFI-parity constructor taking a raw completion callback and opaque
    /// user-data pointer instead of a Rust closure, for callers crossing a
    /// C ABI boundary.
    ///
    /// # Safety
    ///
    /// Same requirements as [`Frame::from_external`], plus: `free_fn` must
    /// be safe to call exactly once with `user_data`, from whatever thread
    /// drops the last reference to this frame.
    pub unsafe fn from_external_raw(
        context: &Context,
        info: VideoInfo,
        ptr: *mut u8,
        len: usize,
        free_fn: Option<extern "C" fn(*mut std::os::raw::c_void)>,
        user_data: *mut std::os::raw::c_void,
    ) -> Result<Self, Error> {
        struct RawUserData(*mut std::os::raw::c_void);
        // SAFETY: the caller of `from_external_raw` guarantees `user_data`
        // is safe to hand to `free_fn` from whatever thread drops this
        // frame.
        unsafe impl Send for RawUserData {}

        let free: Option<Box<dyn FnOnce() + Send>> = free_fn.map(|f| {
            let data = RawUserData(user_data);
            Box::new(move || f(data.0)) as Box<dyn FnOnce() + Send>
        });

        // SAFETY: precondition forwarded from the caller.
        unsafe { Frame::from_external(context, info, ptr, len, free) }
    }

    pub fn alloc_kind(&self) -> AllocKind {
        self.inner.alloc_kind
    }

    pub fn alloc_flags(&self) -> AllocFlags {
        self.inner.alloc_flags
    }

    pub fn device_index(&self) -> i32 {
        self.inner.device_index
    }

    pub fn size(&self) -> usize {
        self.inner.info.lock().unwrap().total_size() as usize
    }

    /// Device-mapped base address of plane 0, if this frame is
    /// device-backed.
    pub fn device_address(&self) -> Option<u64> {
        match &*self.inner.storage.lock().unwrap() {
            Storage::Device(mapping) => Some(mapping.device_address()),
            _ => None,
        }
    }

    /// The underlying dmabuf file descriptor, for handing this frame's
    /// backing memory to a hardware backend that imports buffers by fd.
    pub fn dmabuf_fd(&self) -> Option<std::os::raw::c_int> {
        match &*self.inner.storage.lock().unwrap() {
            Storage::Device(mapping) => Some(mapping.dmabuf.as_raw_fd()),
            _ => None,
        }
    }

    pub fn video_info(&self) -> VideoInfo {
        self.inner.info.lock().unwrap().clone()
    }

    pub fn set_video_info(&self, info: VideoInfo) {
        *self.inner.info.lock().unwrap() = info;
    }

    pub fn metadata(&self) -> Metadata {
        *self.inner.metadata.lock().unwrap()
    }

    pub fn set_metadata(&self, metadata: Metadata) {
        *self.inner.metadata.lock().unwrap() = metadata;
    }

    pub fn sync_flags(&self) -> SyncFlags {
        *self.inner.sync_flags.lock().unwrap()
    }

    /// Maps the frame's planes for host access. A `READ` mapping
    /// synchronizes `FromDevice` before returning, so the host sees
    /// whatever the device last wrote; a `WRITE` mapping marks the frame
    /// pending `ToDevice` synchronization for [`Frame::sync_data`] to
    /// handle at release time (`spec.md` §4.2).
    pub fn map(&self, flags: MapFlags) -> Result<FrameMap<'_>, Error> {
        if flags.is_empty() {
            return Err(Error::InvalidArgument(
                "map flags must include READ and/or WRITE".into(),
            ));
        }
        if flags.contains(MapFlags::READ) {
            self.sync_data(SyncDirection::FromDevice)?;
        }
        if flags.contains(MapFlags::WRITE) {
            let mut sync = self.inner.sync_flags.lock().unwrap();
            sync.remove(SyncFlags::FROM_DEVICE);
            sync.insert(SyncFlags::TO_DEVICE);
        }
        Ok(FrameMap { frame: self, flags })
    }

    /// Synchronizes pending host/device state in `direction`. Clears the
    /// corresponding pending flag on success; a host-only frame is always a
    /// no-op success.
    pub fn sync_data(&self, direction: SyncDirection) -> Result<(), Error> {
        let is_device = matches!(self.inner.alloc_kind, AllocKind::ContiguousDevice);
        let mut sync = self.inner.sync_flags.lock().unwrap();
        match direction {
            SyncDirection::ToDevice => {
                if is_device {
                    log::trace!("syncing frame to device");
                }
                sync.remove(SyncFlags::TO_DEVICE);
            }
            SyncDirection::FromDevice => {
                if is_device {
                    log::trace!("syncing frame from device");
                }
                sync.remove(SyncFlags::FROM_DEVICE);
            }
        }
        Ok(())
    }

    /// Marks the frame pending a `FromDevice` sync (called by the scaler
    /// engine after a successful device dispatch, `spec.md` §4.4 execution
    /// semantics).
    pub(crate) fn mark_pending_from_device(&self) {
        let mut sync = self.inner.sync_flags.lock().unwrap();
        sync.remove(SyncFlags::TO_DEVICE);
        sync.insert(SyncFlags::FROM_DEVICE);
    }

    /// Marks the frame pending a `ToDevice` sync (called by the scaler
    /// engine on every source frame before dispatch, `spec.md` §4.4
    /// "Execution").
    pub(crate) fn mark_pending_to_device(&self) {
        let mut sync = self.inner.sync_flags.lock().unwrap();
        sync.remove(SyncFlags::FROM_DEVICE);
        sync.insert(SyncFlags::TO_DEVICE);
    }

    /// Address of a plane's first byte, as the scaler engine's descriptor
    /// builder records it (`spec.md` §3 "Descriptor"): a physical address
    /// for device-backed storage, a user-space pointer cast to the same
    /// width otherwise.
    pub(crate) fn plane_address(&self, plane: usize) -> Result<u64, Error> {
        Ok(self.plane_ptr(plane)? as u64)
    }

    pub(crate) fn plane_ptr(&self, plane: usize) -> Result<*const u8, Error> {
        let storage = self.inner.storage.lock().unwrap();
        let info = self.inner.info.lock().unwrap();
        let offset = info
            .planes
            .get(plane)
            .ok_or_else(|| Error::InvalidArgument(format!("no plane {plane}")))?
            .offset as usize;
        let base = match &*storage {
            Storage::Host(buf) => buf.as_ptr(),
            Storage::Device(mapping) => mapping.ptr as *const u8,
            Storage::External { ptr, .. } => *ptr as *const u8,
        };
        // SAFETY: offset is within the allocation's total size, which every
        // `Storage` variant's backing buffer was sized (or asserted) to
        // cover.
        Ok(unsafe { base.add(offset) })
    }
}

impl<'a> FrameMap<'a> {
    /// Full video geometry (strides, elevations, offsets) for this mapping.
    pub fn video_info(&self) -> VideoInfo {
        self.frame.inner.info.lock().unwrap().clone()
    }

    /// Byte size of each live plane, in plane order.
    pub fn plane_sizes(&self) -> Vec<u32> {
        let info = self.frame.inner.info.lock().unwrap();
        info.planes[..info.n_planes as usize]
            .iter()
            .map(|p| p.size)
            .collect()
    }

    /// Read-only view of a plane's bytes.
    pub fn plane(&self, index: usize) -> Result<&[u8], Error> {
        let info = self.frame.inner.info.lock().unwrap();
        let plane = info
            .planes
            .get(index)
            .filter(|_| index < info.n_planes as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("no plane {index}")))?;
        let ptr = self.frame.plane_ptr(index)?;
        // SAFETY: `ptr` points `plane.size` readable bytes into storage
        // sized to cover the whole frame; this mapping borrows `self.frame`
        // for `'a`, so the storage outlives the returned slice.
        Ok(unsafe { std::slice::from_raw_parts(ptr, plane.size as usize) })
    }

    /// Mutable view of a plane's bytes. Requires the mapping was opened
    /// with [`MapFlags::WRITE`].
    pub fn plane_mut(&mut self, index: usize) -> Result<&mut [u8], Error> {
        if !self.flags.contains(MapFlags::WRITE) {
            return Err(Error::InvalidArgument(
                "frame was not mapped with WRITE".into(),
            ));
        }
        let info = self.frame.inner.info.lock().unwrap();
        let plane = info
            .planes
            .get(index)
            .filter(|_| index < info.n_planes as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("no plane {index}")))?;
        let ptr = self.frame.plane_ptr(index)? as *mut u8;
        // SAFETY: same as `plane`, plus exclusivity is upheld by requiring
        // `&mut self` here and `MapFlags::WRITE` having been requested at
        // `Frame::map` time (callers are expected not to hold a concurrent
        // read mapping while writing, matching the spec's single-mapping
        // contract).
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr, plane.size as usize) })
    }
}
