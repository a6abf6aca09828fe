use shared::domain::{ClassificationResult, Status};

/// Human-readable projection of a nullable result plus the activity flag.
/// Everything a result view needs, precomputed; the textual fields pass
/// through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayModel {
    pub is_loading: bool,
    pub label: Option<String>,
    pub confidence_percent: Option<u8>,
    pub confidence_display: Option<String>,
    pub description: Option<String>,
    pub recommendation: Option<String>,
    pub elapsed_display: Option<String>,
    pub failure: Option<String>,
}

/// Pure mapping; no state, no side effects, inputs untouched.
pub fn present(result: Option<&ClassificationResult>, status: &Status) -> DisplayModel {
    let is_loading = matches!(status, Status::Busy);
    let failure = match status {
        Status::Failed(reason) => Some(reason.to_string()),
        _ => None,
    };

    match result {
        Some(result) => {
            let percent = (result.confidence * 100.0).round() as u8;
            DisplayModel {
                is_loading,
                label: Some(result.label.clone()),
                confidence_percent: Some(percent),
                confidence_display: Some(format!("{percent}%")),
                description: Some(result.description.clone()),
                recommendation: Some(result.recommendation.clone()),
                elapsed_display: Some(format_elapsed(result.elapsed_ms)),
                failure,
            }
        }
        None => DisplayModel {
            is_loading,
            label: None,
            confidence_percent: None,
            confidence_display: None,
            description: None,
            recommendation: None,
            elapsed_display: None,
            failure,
        },
    }
}

pub fn format_elapsed(elapsed_ms: u64) -> String {
    if elapsed_ms < 1000 {
        format!("{elapsed_ms} ms")
    } else {
        format!("{:.1} s", elapsed_ms as f64 / 1000.0)
    }
}
