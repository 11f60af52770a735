//! Change detection: content fingerprints and snapshot comparison.

pub mod differ;
pub mod hasher;

pub use differ::{classify, Classification, DiffOptions};
pub use hasher::fingerprint;
