//! Purpose: Define the public Rust API boundary for fqueue.
//! Exports: `Queue`, `CircularFileQueue`, options/info types, and the error model.
//! Role: Public, additive-only surface; hides the header and ring codec modules.
//! Invariants: This module is the only public path to storage primitives.

mod capability;

pub use crate::core::error::{Error, ErrorKind};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::header::{DATA_START, MAX_FILE_SIZE};
pub use crate::core::queue::{CircularFileQueue, QueueInfo, QueueOptions};
pub use capability::Queue;
