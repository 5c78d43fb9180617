//! Local artifact storage.
//!
//! This crate provides:
//! - Per-task scratch directories
//! - Publishing rendered files into the output directory
//! - Filename validation and lookup for download
//! - Idempotent artifact deletion
//! - Public URL derivation

pub mod artifacts;
pub mod error;
pub mod fs_utils;

pub use artifacts::{validate_filename, ArtifactEntry, ArtifactStore};
pub use error::{StorageError, StorageResult};
pub use fs_utils::{move_file, PARTIAL_SUFFIX};
