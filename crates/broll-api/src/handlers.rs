//! Request handlers.

pub mod health;
pub mod tasks;
pub mod video;

pub use health::*;
pub use tasks::*;
pub use video::*;
