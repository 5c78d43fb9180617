//! FFmpeg filter graph construction for B-roll overlays.
//!
//! Input 0 is the main video; B-roll `i` is input `i + 1`. Each visible
//! B-roll is scaled to cover the output frame, shifted so its first frame
//! lands on the segment start, and overlaid only during its visible spans.

use broll_models::RenderConfig;

use crate::plan::CompositionPlan;

/// Output label of the composed video stream.
pub const VIDEO_OUT: &str = "[outv]";
/// Output label of the audio stream.
pub const AUDIO_OUT: &str = "[outa]";

/// Format seconds for filter expressions.
pub fn format_seconds(seconds: f64) -> String {
    format!("{:.3}", seconds)
}

/// Build the `enable` expression for one segment: a sum of half-open
/// `[start, end)` terms, one per visible span.
///
/// `between` is closed on both ends, which would enable two overlays at
/// the instant one span hands over to the next.
pub fn enable_expression(plan: &CompositionPlan, index: usize) -> Option<String> {
    let terms: Vec<String> = plan
        .spans_for(index)
        .map(|span| {
            format!(
                "gte(t,{})*lt(t,{})",
                format_seconds(span.start),
                format_seconds(span.end)
            )
        })
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join("+"))
    }
}

/// Build the complete `-filter_complex` graph for a plan.
pub fn build_overlay_graph(plan: &CompositionPlan, config: &RenderConfig) -> String {
    let cover = config.cover_filter();
    let mut chains = vec![format!("[0:v]{},setsar=1[base]", cover)];

    // Only segments with at least one visible span take part in the graph.
    let visible: Vec<(usize, String)> = plan
        .segments
        .iter()
        .filter_map(|segment| enable_expression(plan, segment.index).map(|expr| (segment.index, expr)))
        .collect();

    let mut previous = "[base]".to_string();
    for (n, (index, enable)) in visible.iter().enumerate() {
        let segment = &plan.segments[*index];
        let input = index + 1;
        let scaled = format!("[vb{}]", input);

        chains.push(format!(
            "[{}:v]{},setsar=1,setpts=PTS-STARTPTS+{}/TB{}",
            input,
            cover,
            format_seconds(segment.start),
            scaled
        ));

        let out = if n + 1 == visible.len() {
            VIDEO_OUT.to_string()
        } else {
            format!("[v{}]", input)
        };
        chains.push(format!(
            "{}{}overlay=enable='{}':eof_action=pass{}",
            previous, scaled, enable, out
        ));
        previous = out;
    }

    if visible.is_empty() {
        chains.push(format!("{}null{}", previous, VIDEO_OUT));
    }

    chains.push(audio_chain(plan));
    chains.join(";")
}

/// Main audio is copied when present, otherwise a silent track of the
/// output duration is synthesized.
fn audio_chain(plan: &CompositionPlan) -> String {
    if plan.main_has_audio {
        format!("[0:a]acopy{}", AUDIO_OUT)
    } else {
        format!(
            "anullsrc=channel_layout=stereo:sample_rate=44100,atrim=duration={}{}",
            format_seconds(plan.output_duration),
            AUDIO_OUT
        )
    }
}
