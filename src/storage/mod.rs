//! Storage layer for LOB content.

mod backing;
mod gc;
mod spill;

pub use backing::*;
pub use gc::*;
pub use spill::*;
