//! Mathematical utilities: the Levenberg-Marquardt fitter, numerical
//! differentiation and a couple of linear-algebra helpers.

pub mod linalg;
pub mod lm;
pub mod numdiff;

pub use linalg::*;
pub use lm::*;
pub use numdiff::*;
