//! Shared data models for the B-roll merge service.
//!
//! This crate provides Serde-serializable types for:
//! - Merge requests and their timing windows
//! - Request validation
//! - Tasks and the task state machine
//! - Fixed render configuration
//! - API response schemas

pub mod encoding;
pub mod overlap;
pub mod request;
pub mod status;
pub mod task;
pub mod validation;

// Re-export common types
pub use encoding::{output_file_name, RenderConfig, OUTPUT_SUFFIX};
pub use overlap::OverlapPolicy;
pub use request::{MergeRequest, TimingWindow, BROLL_COUNT};
pub use status::{TaskStatusResponse, TaskSubmitResponse};
pub use task::{Task, TaskId, TaskStatus, TransitionError};
pub use validation::{validate_request, ValidationError};
