//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is open.
//!
//! # Tasks
//! - Expiry sweep: reclaims expired disk cache entries at a fixed interval

mod sweeper;

pub use sweeper::{spawn_sweeper_task, ExpirySweeper, SweepReport, SweeperHandle};
