use serde::Serialize;

use queryfit_core::round_to;

/// One unit of refinement work, built fresh per input record.
#[derive(Debug, Clone)]
pub struct CandidateRow {
    pub query: String,
    /// Structural role of the fragment (h1, h2, p, li, ...). Passed through
    /// to the prompt unchanged; the edit-size policy lives there.
    pub markup_context: String,
    pub current_text: String,
    /// Previously computed similarity, when the input carried one.
    /// Zero or absent means "recompute from scratch".
    pub prior_score: Option<f32>,
}

/// The result of pushing one row through the refinement loop.
#[derive(Debug, Clone)]
pub struct RefinementOutcome {
    pub final_text: String,
    pub old_score: f32,
    pub new_score: f32,
    /// Strictly non-negative; exactly 0.0 when no improvement was found.
    pub change_pct: f32,
    /// Generation calls actually made for this row.
    pub attempts: u32,
}

const CHANGE_EPSILON: f32 = 1e-8;

impl RefinementOutcome {
    /// Non-improvement clamps to 0% change; improvement is relative to the
    /// row's fixed starting score, never the moving baseline.
    pub fn change_pct(old_score: f32, new_score: f32) -> f32 {
        if new_score > old_score {
            (new_score - old_score) / old_score.max(CHANGE_EPSILON) * 100.0
        } else {
            0.0
        }
    }
}

/// Output CSV row. Column set and order are fixed regardless of how the
/// input spelled its headers.
#[derive(Debug, Clone, Serialize)]
pub struct OutputRecord {
    #[serde(rename = "HTML Section")]
    pub markup_context: String,
    #[serde(rename = "Query")]
    pub query: String,
    #[serde(rename = "Old Text")]
    pub old_text: String,
    #[serde(rename = "New Text")]
    pub new_text: String,
    #[serde(rename = "Old Score")]
    pub old_score: f64,
    #[serde(rename = "New Score")]
    pub new_score: f64,
    #[serde(rename = "Change Pct")]
    pub change_pct: f64,
}

impl OutputRecord {
    pub fn new(row: &CandidateRow, outcome: &RefinementOutcome) -> Self {
        Self {
            markup_context: row.markup_context.clone(),
            query: row.query.clone(),
            old_text: row.current_text.clone(),
            new_text: outcome.final_text.clone(),
            old_score: round_to(outcome.old_score as f64, 6),
            new_score: round_to(outcome.new_score as f64, 6),
            change_pct: round_to(outcome.change_pct as f64, 2),
        }
    }
}
