//! Domain models for the CareCloud system.

mod log;
mod resident;

pub use log::*;
pub use resident::*;
