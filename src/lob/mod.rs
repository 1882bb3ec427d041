//! BLOB and CLOB values, their streams and their lifecycle.

mod blob;
mod cell;
mod clob;
mod policy;
mod stream;

pub use blob::Blob;
pub use cell::{check_pos_and_length, LobId, LobKind};
pub use clob::Clob;
pub use policy::{AfterFree, FreePolicy, LobOperation};
pub use stream::{BlobReader, BlobWriter, ClobReader, ClobWriter, STREAM_BUFFER};

pub(crate) use cell::{LobCell, LockBinding};
