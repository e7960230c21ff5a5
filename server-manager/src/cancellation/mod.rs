//! Cooperative cancellation for subprocess and server waits.

mod token;

pub use token::CancellationToken;
