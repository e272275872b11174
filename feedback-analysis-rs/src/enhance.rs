// feedback-analysis-rs/src/enhance.rs
// Deterministic post-processing of a validated analysis

use tracing::debug;
use uuid::Uuid;

use crate::model::{OrderedSessionSet, StructuredAnalysis};

/// Fill in derivable fields the generator left out
///
/// - recommendations without an id get `rec_<uuid>`
/// - a blank time span is recomputed from the session dates
/// - a zero session count is replaced by the real count
/// - chronological trends are ordered by session number
pub fn enhance(analysis: &mut StructuredAnalysis, sessions: &OrderedSessionSet) {
    let mut assigned_ids = 0usize;
    for rec in analysis.recommendations.iter_mut() {
        if rec.id.trim().is_empty() {
            rec.id = format!("rec_{}", Uuid::new_v4().simple());
            assigned_ids += 1;
        }
    }

    if analysis.time_span.trim().is_empty() {
        if let Some(span) = sessions.time_span() {
            analysis.time_span = span;
        }
    }

    if analysis.total_sessions == 0 {
        analysis.total_sessions = u32::try_from(sessions.len()).unwrap_or(u32::MAX);
    }

    for category in analysis.skill_categories.values_mut() {
        category.chronological_trend.sort_by_key(|point| point.session);
    }

    debug!(
        assigned_ids,
        total_sessions = analysis.total_sessions,
        time_span = %analysis.time_span,
        "Enhanced structured analysis"
    );
}
