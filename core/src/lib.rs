pub mod log;
pub mod time;

pub use ::log::{debug, error, info, trace, warn};
