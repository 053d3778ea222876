//! Status Session - the public façade over locator, segments, lock, and codec
//!
//! A [`StatusSession`] is one attach to one status region. Construction
//! resolves the region identity, maps the card segment, and opens its lock;
//! drop detaches. Every get/set takes the region lock, performs exactly one
//! codec operation against the mapped bytes, and releases the lock on all
//! exit paths.
//!
//! The region itself is created by the owning pipeline process. The Rust side
//! of that role is [`RegionOwner`], used by owner processes, the demos, and
//! the test suite.

use crate::card;
use crate::error::{Result, StatusError};
use crate::lock::RegionLock;
use crate::locator::RegionId;
use crate::shm::ShmRegion;
use std::time::Duration;
use tracing::debug;

/// Session construction parameters
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Instance id of the pipeline to attach to (masked to 6 bits)
    pub instance_id: u32,
    /// Optional region key override; `None` derives the identity from the id
    pub key: Option<String>,
    /// Upper bound on lock acquisition per get/set; `None` blocks forever
    pub lock_timeout: Option<Duration>,
}

/// One attached status region, exposing typed get/set over its cards
#[derive(Debug)]
pub struct StatusSession {
    id: RegionId,
    region: ShmRegion,
    lock: RegionLock,
    lock_timeout: Option<Duration>,
}

// SAFETY: all access to the mapped bytes goes through the region lock, which
// serializes across threads the same way it does across processes.
unsafe impl Send for StatusSession {}
unsafe impl Sync for StatusSession {}

impl StatusSession {
    /// Attach to the status region of `instance_id` with default settings
    pub fn attach(instance_id: u32) -> Result<Self> {
        Self::attach_with(SessionConfig {
            instance_id,
            ..SessionConfig::default()
        })
    }

    /// Attach with explicit configuration.
    ///
    /// Any failure (bad key, missing region, missing or corrupt lock) aborts
    /// construction with nothing left attached.
    pub fn attach_with(config: SessionConfig) -> Result<Self> {
        let id = RegionId::new(config.instance_id, config.key.as_deref())?;
        let region = ShmRegion::open(&id.region_name(), card::REGION_SIZE)?;
        let lock = RegionLock::open(&id.lock_name())?;

        debug!(
            instance_id = id.instance_id(),
            region = %id.region_name(),
            "status session attached"
        );

        Ok(Self {
            id,
            region,
            lock,
            lock_timeout: config.lock_timeout,
        })
    }

    /// Instance id this session is attached to (post-masking). No lock taken.
    #[inline(always)]
    pub fn instance_id(&self) -> u8 {
        self.id.instance_id()
    }

    /// Region key override, or the empty string. No lock taken.
    #[inline(always)]
    pub fn key(&self) -> &str {
        self.id.key()
    }

    /// Fetch the string value of a keyword.
    ///
    /// Absent keywords read as the empty string, never as an error; callers
    /// must inspect the value, not the `Result`, to detect absence. Keywords
    /// longer than the field width match on their first 8 bytes.
    pub fn get_string(&self, keyword: &str) -> Result<String> {
        validate_keyword(keyword)?;
        self.with_buf(|buf| Ok(card::get_str(buf, keyword).unwrap_or_default()))
    }

    /// Fetch the numeric value of a keyword.
    ///
    /// Absence is an explicit `Ok(None)`; a non-numeric value under the
    /// keyword is a [`StatusError::MalformedValue`].
    pub fn get_double(&self, keyword: &str) -> Result<Option<f64>> {
        validate_keyword(keyword)?;
        self.with_buf(|buf| card::get_f64(buf, keyword))
    }

    /// Store a string value, truncated to the card's value field.
    pub fn set_string(&self, keyword: &str, value: &str) -> Result<()> {
        validate_keyword(keyword)?;
        self.with_buf(|buf| card::put_str(buf, keyword, value))
    }

    /// Store a numeric value.
    pub fn set_double(&self, keyword: &str, value: f64) -> Result<()> {
        validate_keyword(keyword)?;
        self.with_buf(|buf| card::put_f64(buf, keyword, value))
    }

    /// Run one codec operation with the region lock held. The guard releases
    /// on every exit path, including codec errors.
    fn with_buf<R>(&self, f: impl FnOnce(&mut [u8]) -> Result<R>) -> Result<R> {
        let _guard = self.lock.acquire(self.lock_timeout)?;
        // SAFETY: the mapping is valid for the lifetime of self and the held
        // region lock gives this process exclusive access to the bytes.
        let buf =
            unsafe { std::slice::from_raw_parts_mut(self.region.as_ptr(), self.region.size()) };
        f(buf)
    }
}

/// Owner side of a status region: creates and initializes the card segment
/// and its lock, and unlinks both on drop.
pub struct RegionOwner {
    id: RegionId,
    region: ShmRegion,
    lock: RegionLock,
}

impl RegionOwner {
    /// Create the region for `instance_id` and reset it to an empty
    /// well-formed state (end marker at card 0).
    pub fn create(instance_id: u32, key: Option<&str>) -> Result<Self> {
        let id = RegionId::new(instance_id, key)?;
        let region = ShmRegion::create(&id.region_name(), card::REGION_SIZE)?;
        let lock = RegionLock::create(&id.lock_name())?;

        {
            let _guard = lock.acquire(None)?;
            // SAFETY: fresh exclusive mapping, held lock.
            let buf =
                unsafe { std::slice::from_raw_parts_mut(region.as_ptr(), region.size()) };
            card::init(buf);
        }

        debug!(
            instance_id = id.instance_id(),
            region = %id.region_name(),
            "status region created"
        );

        Ok(Self { id, region, lock })
    }

    /// Identity of the owned region
    #[inline(always)]
    pub fn id(&self) -> &RegionId {
        &self.id
    }

    /// Attach a session to the owned region
    pub fn session(&self) -> Result<StatusSession> {
        StatusSession::attach_with(SessionConfig {
            instance_id: self.id.instance_id() as u32,
            key: (!self.id.key().is_empty()).then(|| self.id.key().to_string()),
            lock_timeout: None,
        })
    }

    /// Cards in use right now, end marker included
    pub fn cards_used(&self) -> Result<usize> {
        let _guard = self.lock.acquire(None)?;
        // SAFETY: mapping valid for self's lifetime, lock held.
        let buf = unsafe { std::slice::from_raw_parts(self.region.as_ptr(), self.region.size()) };
        Ok(card::cards_used(buf))
    }
}

fn validate_keyword(keyword: &str) -> Result<()> {
    if keyword.is_empty() {
        return Err(StatusError::InvalidKeyword {
            keyword: keyword.to_string(),
            reason: "keyword is empty",
        });
    }
    if keyword.bytes().any(|b| b < 0x20 || b == 0x7f) {
        return Err(StatusError::InvalidKeyword {
            keyword: keyword.to_string(),
            reason: "control characters are not allowed",
        });
    }
    // The truncated form is what lands in the card, so "END", "end ", and
    // "ENDxxxxxXXX" truncating to the marker are all reserved.
    let truncated = &keyword.as_bytes()[..keyword.len().min(card::KEYWORD_WIDTH)];
    let mut field = [b' '; card::KEYWORD_WIDTH];
    field[..truncated.len()].copy_from_slice(truncated);
    if field.eq_ignore_ascii_case(b"END     ") {
        return Err(StatusError::InvalidKeyword {
            keyword: keyword.to_string(),
            reason: "END is reserved for the end marker",
        });
    }
    Ok(())
}
