//! Region Locator - resolves an instance id to concrete segment identities
//!
//! A pipeline host may run up to 64 independent pipeline instances, each with
//! its own status region. The instance id selects the region; an optional key
//! override selects an alternate namespace (e.g. a test sandbox) without
//! touching process-global state.

use crate::error::{Result, StatusError};
use crate::shm::MAX_NAME_LEN;

/// Instance ids occupy 6 bits; larger values wrap silently
pub const INSTANCE_ID_MASK: u32 = 0x3f;

// Room that must remain in the shm name for the "_NN" id suffix and the
// "_lock" suffix of the companion lock segment.
const NAME_RESERVED: usize = 3 + 5;

/// Identity of one status region: masked instance id plus optional key
/// override.
///
/// Two ids that agree in their low 6 bits name the same region. The key, when
/// present, is an explicit per-identity namespace, never an environment
/// setting, so one session's override cannot leak into another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionId {
    instance_id: u8,
    key: Option<String>,
}

impl RegionId {
    /// Build a region identity.
    ///
    /// The instance id is masked to its low 6 bits, never rejected. The key
    /// must fit a POSIX shm name and is validated here; a bad key is a
    /// configuration error that aborts session construction.
    pub fn new(instance_id: u32, key: Option<&str>) -> Result<Self> {
        let key = match key {
            None | Some("") => None,
            Some(k) => {
                if k.len() > MAX_NAME_LEN - NAME_RESERVED {
                    return Err(StatusError::KeyTooLong {
                        max: MAX_NAME_LEN - NAME_RESERVED,
                        got: k.len(),
                    });
                }
                if k.contains('/') {
                    return Err(StatusError::InvalidKey {
                        reason: "'/' is not allowed in a shm name",
                    });
                }
                if k.bytes().any(|b| b < 0x20 || b == 0x7f) {
                    return Err(StatusError::InvalidKey {
                        reason: "control characters are not allowed",
                    });
                }
                Some(k.to_string())
            }
        };

        Ok(Self {
            instance_id: (instance_id & INSTANCE_ID_MASK) as u8,
            key,
        })
    }

    /// Masked instance id this identity resolves
    #[inline(always)]
    pub fn instance_id(&self) -> u8 {
        self.instance_id
    }

    /// Key override, or the empty string when the default derivation is used
    #[inline(always)]
    pub fn key(&self) -> &str {
        self.key.as_deref().unwrap_or("")
    }

    /// Name of the card-region segment (without the shm prefix)
    pub fn region_name(&self) -> String {
        match &self.key {
            Some(k) => format!("{}_{:02}", k, self.instance_id),
            None => format!("{:02}", self.instance_id),
        }
    }

    /// Name of the companion lock segment
    pub fn lock_name(&self) -> String {
        format!("{}_lock", self.region_name())
    }
}
