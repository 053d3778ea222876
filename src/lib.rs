//! statusbuf - shared-memory status buffer access for pipeline tooling
//!
//! A running data-acquisition pipeline publishes its state as keyword/value
//! cards in a small shared-memory region. This library lets out-of-process
//! tools attach to that region by instance id and read or update individual
//! keywords without restarting anything.
//!
//! # Architecture
//!
//! - **Region locator**: instance id (0-63, masked) plus an optional key
//!   override resolve to concrete segment names
//! - **Segment handle**: RAII attach/detach of the POSIX shm mapping
//! - **Lock coordinator**: one futex-backed cross-process mutex per region;
//!   every buffer access happens under it
//! - **Card codec**: pure encode/decode of fixed-width 80-byte cards,
//!   terminated by an `END` marker, bit-compatible with the pipeline's
//!   native region layout
//! - **Status session**: the façade tying the above together
//!
//! # Example
//!
//! ```no_run
//! use statusbuf::StatusSession;
//!
//! # fn main() -> statusbuf::Result<()> {
//! let session = StatusSession::attach(0)?;
//! session.set_string("OBSMODE", "tracking")?;
//! session.set_double("OBSFREQ", 1420.405751)?;
//! let mode = session.get_string("OBSMODE")?; // "" when absent
//! # let _ = mode;
//! # Ok(())
//! # }
//! ```

pub mod card;
pub mod error;
pub mod lock;
pub mod locator;
pub mod session;
pub mod shm;

pub use error::{Result, StatusError};
pub use locator::RegionId;
pub use session::{RegionOwner, SessionConfig, StatusSession};
