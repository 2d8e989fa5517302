//! Shared infrastructure utilities for the ECA rewrite tools.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename), used for
//!   the state file and for writing rewritten documents back to disk.

pub mod atomic_write;

pub use atomic_write::{AtomicWriteOptions, PersistMode, atomic_write, recover_bak_file};
