//! SQLite persistence shared by the coordinator and the capture worker.
//!
//! Each context opens its own connection to the same file:
//! - `chunks`: the durable chunk buffer written by the worker
//! - `app_state`: the recording status record owned by the coordinator

pub mod chunks;
pub mod init;
pub mod status;

pub use chunks::{Chunk, ChunkStore};
pub use init::{migrate, open_db};
pub use status::{PersistedStatus, StatusStore};
