//! lobstore-rs: large-object (BLOB/CLOB) streaming and lifecycle engine.
//!
//! LOB values start in memory and move to a spill file once they outgrow a
//! threshold. Fetched LOBs hold row locks until they are freed, or until the
//! transaction ends under Repeatable Read. An HTTP session surface exposes the
//! engine to other processes.
//!
//! # Example
//!
//! ```no_run
//! use lobstore_rs::{Config, Database};
//!
//! let db = Database::open(Config::default()).unwrap();
//! let mut conn = db.connect();
//! let blob = conn.create_blob().unwrap();
//! blob.set_bytes(1, b"hello").unwrap();
//! assert_eq!(blob.length().unwrap(), 5);
//! conn.commit().unwrap();
//! ```

pub mod config;
pub mod connection;
pub mod context;
pub mod database;
pub mod error;
pub mod handlers;
pub mod lob;
pub mod models;
pub mod router;
pub mod server;
pub mod session;
pub mod storage;
pub mod table;
pub mod txn;
pub mod xml;

// Re-exports for convenience
pub use config::{Args, Config, FreePolicyKind, DEFAULT_PORT, DEFAULT_SPILL_THRESHOLD};
pub use connection::Connection;
pub use database::Database;
pub use error::{LobError, LobResult, SqlState};
pub use lob::{Blob, Clob, FreePolicy, LobId, LobOperation};
pub use server::{LobServer, LobServerBuilder};
pub use table::{Row, RowKey, Value};
pub use txn::IsolationLevel;
