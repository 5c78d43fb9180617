//! Business logic behind the handlers.

pub mod intake;

pub use intake::submit_merge_task;
