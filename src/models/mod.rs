//! Data models for the HTTP surface.

mod lob;
mod session;

pub use lob::*;
pub use session::*;
