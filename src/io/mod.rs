mod multiplexer;
mod worker;

pub use multiplexer::IoMultiplexer;
pub use worker::{Endpoint, Worker};
