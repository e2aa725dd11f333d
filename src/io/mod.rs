//! Input/output helpers.
//!
//! - measurement session JSON read/write (`measurements`)
//! - calibration result JSON export (`result`)

pub mod measurements;
pub mod result;

pub use measurements::*;
pub use result::*;
