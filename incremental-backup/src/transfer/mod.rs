//! Copying files into the destination tree.

pub mod copy;
pub mod progress;

pub use copy::copy_file;
pub use progress::{format_bytes, format_duration, format_speed, CopyProgress};
