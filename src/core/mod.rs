// Core modules implementing the header, ring codec, queue monitor, and error modeling.
pub mod error;
pub mod header;
pub mod queue;
pub mod ring;
