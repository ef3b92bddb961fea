//! Utility modules

pub mod cancel;
pub mod vertex;

pub use cancel::{CancelHandle, new_cancel_handle};
pub use vertex::*;
