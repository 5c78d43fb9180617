//! Structural validation of merge requests.
//!
//! These checks are synchronous and never touch the network. Reachability
//! and size probing happen at intake, after the structure is known good.

use thiserror::Error;

use crate::request::{MergeRequest, BROLL_COUNT};

/// Reasons a merge request is rejected before a task is created.
///
/// The `Display` output is the exact message returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Exactly 6 B-roll videos are required")]
    BrollCount { found: usize },

    #[error("Exactly 6 timing pairs are required")]
    TimingCount { found: usize },

    #[error("B-roll timing {index} start time must be less than end time")]
    InvertedWindow { index: usize },

    #[error("B-roll timing {index} start time must not be negative")]
    NegativeStart { index: usize },

    #[error("Unable to access URL {url}: {reason}")]
    Unreachable { url: String, reason: String },
}

impl ValidationError {
    pub fn unreachable(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Validate the structure of a merge request.
///
/// Checks run in order and stop at the first failure. Window indices in
/// messages are 1-based.
#[allow(clippy::neg_cmp_op_on_partial_ord)]
pub fn validate_request(request: &MergeRequest) -> Result<(), ValidationError> {
    if request.broll_urls.len() != BROLL_COUNT {
        return Err(ValidationError::BrollCount {
            found: request.broll_urls.len(),
        });
    }

    if request.broll_timings.len() != BROLL_COUNT {
        return Err(ValidationError::TimingCount {
            found: request.broll_timings.len(),
        });
    }

    for (i, window) in request.broll_timings.iter().enumerate() {
        // Negated so NaN bounds are rejected too.
        if !(window.start < window.end) {
            return Err(ValidationError::InvertedWindow { index: i + 1 });
        }
        if window.start < 0.0 {
            return Err(ValidationError::NegativeStart { index: i + 1 });
        }
    }

    Ok(())
}
