//! Composition planning.
//!
//! Turns the six B-roll timing windows into a [`CompositionPlan`]: one
//! segment per B-roll (clamped to the main video), the explicit list of
//! overlaps between segments, and the resolved visible timeline.
//!
//! The timeline is computed by splitting the output into elementary
//! intervals at every segment boundary and picking one winner per interval
//! according to the [`OverlapPolicy`]. Adjacent intervals won by the same
//! segment are merged, so the resulting spans are sorted, disjoint and
//! maximal.

use serde::Serialize;
use std::path::{Path, PathBuf};

use broll_models::{OverlapPolicy, TimingWindow, BROLL_COUNT};

use crate::error::PlanError;

/// One B-roll placed on the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlaySegment {
    /// Position of the B-roll in the request (0-based)
    pub index: usize,
    /// Local path of the downloaded B-roll
    pub source: PathBuf,
    /// Start on the output timeline, in seconds
    pub start: f64,
    /// End on the output timeline after clamping
    pub end: f64,
    /// End as requested
    pub requested_end: f64,
    /// Whether `end` was clamped to the main duration
    pub clamped: bool,
}

impl OverlaySegment {
    /// A segment that starts at or past the end of the output has nothing to show.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Two segments competing for the same time range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlap {
    /// Lower request index
    pub earlier: usize,
    /// Higher request index
    pub later: usize,
    pub start: f64,
    pub end: f64,
    /// Index that is visible during the overlap
    pub winner: usize,
}

/// A maximal interval during which one segment is on screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisibleSpan {
    pub index: usize,
    pub start: f64,
    pub end: f64,
}

/// Immutable description of the output to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionPlan {
    pub main_source: PathBuf,
    /// Output duration, equal to the main video's duration
    pub output_duration: f64,
    pub main_has_audio: bool,
    /// Segments in request index order
    pub segments: Vec<OverlaySegment>,
    pub overlaps: Vec<Overlap>,
    /// Visible timeline, sorted by start and pairwise disjoint
    pub spans: Vec<VisibleSpan>,
    pub policy: OverlapPolicy,
}

impl CompositionPlan {
    /// Segments ordered by start time (ties by index).
    pub fn sorted_by_start(&self) -> Vec<&OverlaySegment> {
        let mut sorted: Vec<&OverlaySegment> = self.segments.iter().collect();
        sorted.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.index.cmp(&b.index)));
        sorted
    }

    /// Visible spans belonging to one segment.
    pub fn spans_for(&self, index: usize) -> impl Iterator<Item = &VisibleSpan> {
        self.spans.iter().filter(move |s| s.index == index)
    }

    /// Total on-screen time of a segment.
    pub fn visible_duration(&self, index: usize) -> f64 {
        self.spans_for(index).map(|s| s.end - s.start).sum()
    }
}

/// Build a composition plan.
///
/// `brolls[i]` and `windows[i]` describe B-roll `i`; the pairing is kept
/// throughout. Windows may be unsorted and may overlap.
pub fn plan_composition(
    main_source: impl AsRef<Path>,
    main_duration: f64,
    main_has_audio: bool,
    brolls: &[PathBuf],
    windows: &[TimingWindow],
    policy: OverlapPolicy,
) -> Result<CompositionPlan, PlanError> {
    if brolls.len() != BROLL_COUNT || windows.len() != BROLL_COUNT {
        return Err(PlanError::SegmentCount {
            expected: BROLL_COUNT,
            sources: brolls.len(),
            windows: windows.len(),
        });
    }

    if !main_duration.is_finite() || main_duration <= 0.0 {
        return Err(PlanError::InvalidDuration(main_duration));
    }

    let mut segments = Vec::with_capacity(BROLL_COUNT);
    for (index, (source, window)) in brolls.iter().zip(windows).enumerate() {
        if !window.is_valid() {
            return Err(PlanError::InvalidWindow {
                index,
                start: window.start,
                end: window.end,
            });
        }

        let clamped = window.end > main_duration;
        segments.push(OverlaySegment {
            index,
            source: source.clone(),
            start: window.start,
            end: window.end.min(main_duration),
            requested_end: window.end,
            clamped,
        });
    }

    let overlaps = find_overlaps(&segments, policy);
    let spans = resolve_timeline(&segments, policy);

    Ok(CompositionPlan {
        main_source: main_source.as_ref().to_path_buf(),
        output_duration: main_duration,
        main_has_audio,
        segments,
        overlaps,
        spans,
        policy,
    })
}

fn find_overlaps(segments: &[OverlaySegment], policy: OverlapPolicy) -> Vec<Overlap> {
    let mut overlaps = Vec::new();
    for (i, a) in segments.iter().enumerate() {
        for b in &segments[i + 1..] {
            let start = a.start.max(b.start);
            let end = a.end.min(b.end);
            if end > start {
                // Both indices are present, so a winner always exists.
                let winner = policy.winner([a.index, b.index]).unwrap_or(b.index);
                overlaps.push(Overlap {
                    earlier: a.index,
                    later: b.index,
                    start,
                    end,
                    winner,
                });
            }
        }
    }
    overlaps
}

fn resolve_timeline(segments: &[OverlaySegment], policy: OverlapPolicy) -> Vec<VisibleSpan> {
    let live: Vec<&OverlaySegment> = segments.iter().filter(|s| !s.is_empty()).collect();

    let mut boundaries: Vec<f64> = live.iter().flat_map(|s| [s.start, s.end]).collect();
    boundaries.sort_by(f64::total_cmp);
    boundaries.dedup();

    let mut spans: Vec<VisibleSpan> = Vec::new();
    for pair in boundaries.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let active = live
            .iter()
            .filter(|s| s.start <= from && s.end >= to)
            .map(|s| s.index);

        let Some(winner) = policy.winner(active) else {
            continue;
        };

        match spans.last_mut() {
            Some(last) if last.index == winner && last.end == from => last.end = to,
            _ => spans.push(VisibleSpan {
                index: winner,
                start: from,
                end: to,
            }),
        }
    }
    spans
}
