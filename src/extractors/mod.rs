//! Request extractors.

mod caller;

pub use caller::*;
