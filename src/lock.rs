//! Lock Coordinator - cross-process mutual exclusion for one status region
//!
//! Every status region has a companion segment holding a single futex word.
//! All processes attached to the region funnel their reads and writes through
//! this one lock; there is no finer-grained locking. The lock lives outside
//! the card region so the region bytes stay bit-compatible with external
//! readers.
//!
//! The word follows the usual three-state futex mutex protocol:
//! unlocked -> locked on the uncontended fast path, locked -> contended when
//! a waiter arrives, and a wake is issued on release only when the word was
//! contended.

// rustix 0.38 keeps the raw futex call available but steers new code toward
// a higher-level wrapper; the raw form is what this lock needs.
#![allow(deprecated)]

use crate::error::{Result, StatusError};
use crate::shm::ShmRegion;
use rustix::io::Errno;
use rustix::thread::{futex, FutexFlags, FutexOperation};
use rustix::time::Timespec;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

const LOCK_MAGIC: u32 = 0x5354_4C4B; // "STLK"

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;
const CONTENDED: u32 = 2;

/// Lock segments are one page; only the header at offset 0 is used
const LOCK_SEGMENT_SIZE: usize = 4096;

/// Header at the start of the lock segment
#[repr(C)]
struct LockHeader {
    magic: u32,
    state: AtomicU32,
}

/// Cross-process mutex guarding one status region
#[derive(Debug)]
pub struct RegionLock {
    shm: ShmRegion,
}

impl RegionLock {
    /// Create (or re-open) the lock segment as its owner and initialize it
    pub fn create(name: &str) -> Result<Self> {
        let shm = ShmRegion::create(name, LOCK_SEGMENT_SIZE)?;

        let header = shm.as_ptr() as *mut LockHeader;
        // SAFETY: the segment is at least a page, freshly mapped, and no
        // other process attaches before the owner finishes construction.
        unsafe {
            (*header).state = AtomicU32::new(UNLOCKED);
            (*header).magic = LOCK_MAGIC;
        }

        Ok(Self { shm })
    }

    /// Attach to an existing lock segment, validating its magic
    pub fn open(name: &str) -> Result<Self> {
        let shm = ShmRegion::open(name, std::mem::size_of::<LockHeader>())?;

        let magic = {
            let header = shm.as_ptr() as *const LockHeader;
            // SAFETY: open() guarantees the mapping covers the header.
            unsafe { (*header).magic }
        };
        if magic != LOCK_MAGIC {
            return Err(StatusError::InvalidMagic {
                expected: LOCK_MAGIC,
                got: magic,
            });
        }

        Ok(Self { shm })
    }

    /// Block until the lock is held, returning a guard that releases on drop.
    ///
    /// `timeout = None` preserves the original block-forever contract.
    /// With a timeout, expiry yields [`StatusError::LockTimeout`] and the
    /// region bytes are guaranteed untouched.
    pub fn acquire(&self, timeout: Option<Duration>) -> Result<LockGuard<'_>> {
        let state = self.state();

        if state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return Ok(LockGuard { lock: self });
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        while state.swap(CONTENDED, Ordering::Acquire) != UNLOCKED {
            self.wait(CONTENDED, deadline)?;
        }
        Ok(LockGuard { lock: self })
    }

    fn release(&self) {
        if self.state().swap(UNLOCKED, Ordering::Release) == CONTENDED {
            // Runs from guard Drop, nowhere to propagate a wake failure.
            let _ = self.futex_op(FutexOperation::Wake, 1, std::ptr::null());
        }
    }

    /// Sleep until the word changes away from `expected` or the deadline
    /// passes. Spurious wakeups are fine; the caller re-checks the word.
    fn wait(&self, expected: u32, deadline: Option<Instant>) -> Result<()> {
        let ts;
        let ts_ptr: *const Timespec = match deadline {
            None => std::ptr::null(),
            Some(d) => {
                let remaining = d
                    .checked_duration_since(Instant::now())
                    .ok_or(StatusError::LockTimeout)?;
                ts = Timespec {
                    tv_sec: remaining.as_secs() as _,
                    tv_nsec: remaining.subsec_nanos() as _,
                };
                &ts
            }
        };

        match self.futex_op(FutexOperation::Wait, expected, ts_ptr) {
            Ok(_) => Ok(()),
            // Word already changed, or interrupted by a signal: retry.
            Err(Errno::AGAIN) | Err(Errno::INTR) => Ok(()),
            Err(Errno::TIMEDOUT) => Err(StatusError::LockTimeout),
            Err(e) => Err(StatusError::Lock(e.into())),
        }
    }

    fn futex_op(
        &self,
        op: FutexOperation,
        val: u32,
        utime: *const Timespec,
    ) -> std::result::Result<usize, Errno> {
        let word = self.state().as_ptr();
        // SAFETY: word points into the live lock segment mapping; the op is
        // a plain shared (non-PRIVATE) wait/wake on that word.
        unsafe {
            futex(
                word,
                op,
                FutexFlags::empty(),
                val,
                utime,
                std::ptr::null_mut(),
                0,
            )
        }
    }

    #[inline(always)]
    fn state(&self) -> &AtomicU32 {
        // SAFETY: the mapping covers LockHeader for the lifetime of self and
        // the state word is only ever accessed atomically.
        unsafe { &(*(self.shm.as_ptr() as *const LockHeader)).state }
    }
}

/// Scoped lock ownership; releasing is automatic and happens on every exit
/// path, including panics and failed buffer operations.
#[derive(Debug)]
pub struct LockGuard<'a> {
    lock: &'a RegionLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn unique(name: &str) -> String {
        format!("lock_unit_{}_{}", name, std::process::id())
    }

    #[test]
    fn test_create_and_reopen() {
        let name = unique("basic");
        let owner = RegionLock::create(&name).unwrap();
        let other = RegionLock::open(&name).unwrap();

        let g = owner.acquire(None).unwrap();
        drop(g);
        let g = other.acquire(None).unwrap();
        drop(g);
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        let name = unique("badmagic");
        let _raw = ShmRegion::create(&name, LOCK_SEGMENT_SIZE).unwrap();
        // Zeroed segment: magic is 0, not LOCK_MAGIC.
        let err = RegionLock::open(&name).unwrap_err();
        assert!(matches!(err, StatusError::InvalidMagic { .. }));
    }

    #[test]
    fn test_mutual_exclusion_across_threads() {
        let name = unique("mutex");
        let owner = Arc::new(RegionLock::create(&name).unwrap());
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let lock = Arc::clone(&owner);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let _g = lock.acquire(None).unwrap();
                    // Non-atomic read-modify-write, safe only under the lock.
                    let v = counter.load(Ordering::Relaxed);
                    counter.store(v + 1, Ordering::Relaxed);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 4000);
    }

    #[test]
    fn test_timeout_fires_while_held() {
        let name = unique("timeout");
        let lock = RegionLock::create(&name).unwrap();

        let _held = lock.acquire(None).unwrap();
        let second = RegionLock::open(&name).unwrap();
        let err = second
            .acquire(Some(Duration::from_millis(50)))
            .unwrap_err();
        assert!(matches!(err, StatusError::LockTimeout));
    }

    #[test]
    fn test_release_unblocks_waiter() {
        let name = unique("handoff");
        let lock = Arc::new(RegionLock::create(&name).unwrap());

        let guard = lock.acquire(None).unwrap();
        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let _g = lock.acquire(Some(Duration::from_secs(5))).unwrap();
            })
        };
        thread::sleep(Duration::from_millis(50));
        drop(guard);
        waiter.join().unwrap();
    }
}
