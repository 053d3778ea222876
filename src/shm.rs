//! Low-level POSIX shared memory operations

use crate::error::{Result, StatusError};
use rustix::fd::OwnedFd;
use rustix::fs::ftruncate;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use rustix::shm::{shm_open, shm_unlink, Mode, ShmOFlags};
use std::ffi::CString;
use std::ptr::NonNull;
use tracing::debug;

const SHM_PREFIX: &str = "/statusbuf_";

/// Longest segment name accepted (POSIX limits shm names to 255 bytes)
pub const MAX_NAME_LEN: usize = 255 - SHM_PREFIX.len();

/// Handle to one shared memory mapping
///
/// Construction is the only attach and `Drop` the only detach, so a region
/// can never be attached twice through one handle or used after detach.
#[derive(Debug)]
pub struct ShmRegion {
    #[allow(dead_code)]
    fd: OwnedFd,
    addr: NonNull<u8>,
    size: usize,
    name: String,
    is_owner: bool,
}

// SAFETY: the mapping stays valid for the lifetime of the handle and all
// access to the mapped bytes is serialized by the region lock.
unsafe impl Send for ShmRegion {}
unsafe impl Sync for ShmRegion {}

impl ShmRegion {
    /// Create (or re-open) a segment as its owner. Owner handles unlink the
    /// segment on drop. Freshly created segments are zero-filled.
    ///
    /// This is the pipeline/owner side; sessions attach with [`ShmRegion::open`].
    pub fn create(name: &str, size: usize) -> Result<Self> {
        let c_name = full_name(name)?;

        // Try to create exclusively first, fall back to open if it exists
        // (e.g. left behind by a previous owner of the same instance).
        let mut fresh = true;
        let fd = match shm_open(
            c_name.as_c_str(),
            ShmOFlags::CREATE | ShmOFlags::EXCL | ShmOFlags::RDWR,
            Mode::RUSR | Mode::WUSR | Mode::RGRP | Mode::WGRP | Mode::ROTH,
        ) {
            Ok(fd) => fd,
            Err(_) => {
                fresh = false;
                shm_open(c_name.as_c_str(), ShmOFlags::RDWR, Mode::empty()).map_err(|e| {
                    StatusError::ShmCreate {
                        name: name.to_string(),
                        source: e.into(),
                    }
                })?
            }
        };

        ftruncate(&fd, size as u64).map_err(|e| StatusError::Truncate(e.into()))?;

        let addr = map(&fd, size)?;

        if fresh {
            // SAFETY: addr maps `size` writable bytes we just created.
            unsafe {
                std::ptr::write_bytes(addr.as_ptr(), 0, size);
            }
        }

        debug!(name, size, fresh, "created status segment");

        Ok(Self {
            fd,
            addr,
            size,
            name: name.to_string(),
            is_owner: true,
        })
    }

    /// Attach to an existing segment.
    ///
    /// Fails if the segment does not exist, is not accessible, or is smaller
    /// than `min_size`; nothing is left mapped on any failure path.
    pub fn open(name: &str, min_size: usize) -> Result<Self> {
        let c_name = full_name(name)?;

        let fd = shm_open(c_name.as_c_str(), ShmOFlags::RDWR, Mode::empty()).map_err(|e| {
            StatusError::ShmOpen {
                name: name.to_string(),
                source: e.into(),
            }
        })?;

        let stat = rustix::fs::fstat(&fd).map_err(|e| StatusError::ShmOpen {
            name: name.to_string(),
            source: e.into(),
        })?;
        let size = stat.st_size as usize;
        if size < min_size {
            return Err(StatusError::RegionSize {
                name: name.to_string(),
                expected: min_size,
                got: size,
            });
        }

        let addr = map(&fd, size)?;

        debug!(name, size, "attached to status segment");

        Ok(Self {
            fd,
            addr,
            size,
            name: name.to_string(),
            is_owner: false,
        })
    }

    /// Raw pointer to the mapped bytes
    #[inline(always)]
    pub fn as_ptr(&self) -> *mut u8 {
        self.addr.as_ptr()
    }

    /// Size of the mapping in bytes
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Segment name (without the shm prefix)
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this handle owns (and will unlink) the segment
    #[inline(always)]
    pub fn is_owner(&self) -> bool {
        self.is_owner
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        // SAFETY: addr/size describe the live mapping created in new/open.
        unsafe {
            let _ = munmap(self.addr.as_ptr().cast(), self.size);
        }

        if self.is_owner {
            if let Ok(c_name) = full_name(&self.name) {
                let _ = shm_unlink(c_name.as_c_str());
            }
        }

        debug!(name = %self.name, owner = self.is_owner, "detached status segment");
    }
}

fn full_name(name: &str) -> Result<CString> {
    if name.len() > MAX_NAME_LEN {
        return Err(StatusError::KeyTooLong {
            max: MAX_NAME_LEN,
            got: name.len(),
        });
    }
    CString::new(format!("{}{}", SHM_PREFIX, name)).map_err(|_| StatusError::InvalidKey {
        reason: "NUL byte in segment name",
    })
}

fn map(fd: &OwnedFd, size: usize) -> Result<NonNull<u8>> {
    // SAFETY: fd is a live shm fd sized to at least `size`; we request a
    // fresh shared RW mapping chosen by the kernel.
    let addr = unsafe {
        mmap(
            std::ptr::null_mut(),
            size,
            ProtFlags::READ | ProtFlags::WRITE,
            MapFlags::SHARED,
            fd,
            0,
        )
        .map_err(|e| StatusError::Mmap(e.into()))?
    };

    NonNull::new(addr.cast::<u8>()).ok_or_else(|| {
        StatusError::Mmap(std::io::Error::new(
            std::io::ErrorKind::Other,
            "mmap returned null",
        ))
    })
}
