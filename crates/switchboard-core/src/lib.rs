//! # switchboard-core
//!
//! Foundation types shared by every Switchboard crate.
//!
//! - **Branded IDs**: [`RequestId`] as a newtype so request IDs are never
//!   confused with session keys
//! - **Clocks**: [`Clock`] with a wall-clock [`SystemClock`] and a
//!   test-driven [`ManualClock`]
//! - **Logging**: `tracing` subscriber setup and in-memory log capture

#![deny(unsafe_code)]

pub mod clock;
pub mod ids;
pub mod logging;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::RequestId;
