//! # Trueshot Security
//!
//! Server-side validation of instant-hit fire requests.
//!
//! ## Features
//!
//! - **Latency Compensation**: bounded rewind from client time, clock offset,
//!   server frame rate and a per-player buffer policy
//! - **Buffer Policy**: legacy, softmax and clamp modes
//! - **Deferred Fire**: shots that beat the weapon's fire window are retried
//! - **Reasonableness Check**: reported eye position vs the server's pawn
//!
//! ## Architecture
//!
//! ```text
//! CLIENT CONNECTION                     FIRE AUTHORITY
//!     │                                      ▲
//!     │─── FireRequest ──► LatencyCompensator│
//!     │                      │  BufferPolicy │
//!     │                      │  Reasonable?  │
//!     │                      └── ValidatedShot ─► start | defer | resync
//!     │
//!     └─── parked shots ──► retry_deferred (every tick)
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod compensation;
pub mod validation;

pub use compensation::{
    BufferPolicy, CompensationBreakdown, CompensationError, CompensatorStats, DropReason,
    FireOutcome, LatencyCompensator, TickSummary,
};
pub use validation::ReasonablenessValidator;
