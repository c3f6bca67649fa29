//! Domain models for the clinic queue.

mod snapshot;
mod ticket;

pub use snapshot::*;
pub use ticket::*;
