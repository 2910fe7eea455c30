//! Purpose: The queue capability callers can be written against.
//! Exports: `Queue`.
//! Role: Object-safe trait so producers/consumers need not name the file-backed type.
//! Invariants: Implementations preserve FIFO order and never block in `push`.

use crate::core::error::Error;
use crate::core::queue::CircularFileQueue;

pub trait Queue: Send + Sync {
    fn is_empty(&self) -> bool;
    fn size(&self) -> usize;
    /// Blocks until a record is available or the queue is closed.
    fn pop(&self) -> Result<Vec<u8>, Error>;
    fn push(&self, data: &[u8]) -> Result<(), Error>;
    fn close(&self) -> Result<(), Error>;
}

impl Queue for CircularFileQueue {
    fn is_empty(&self) -> bool {
        CircularFileQueue::is_empty(self)
    }

    fn size(&self) -> usize {
        CircularFileQueue::size(self)
    }

    fn pop(&self) -> Result<Vec<u8>, Error> {
        CircularFileQueue::pop(self)
    }

    fn push(&self, data: &[u8]) -> Result<(), Error> {
        CircularFileQueue::push(self, data)
    }

    fn close(&self) -> Result<(), Error> {
        CircularFileQueue::close(self)
    }
}
