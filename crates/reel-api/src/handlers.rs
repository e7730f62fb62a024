//! Request handlers.

pub mod generations;
pub mod health;
pub mod merges;

pub use generations::*;
pub use health::*;
pub use merges::*;
