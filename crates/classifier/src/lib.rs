use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use imaging::SourceImage;
use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::domain::{ClassificationResult, Region};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("classifier capability unavailable: {0}")]
    Unavailable(String),
    #[error("classifier transport failure: {0}")]
    Transport(String),
    #[error("classifier returned malformed response: {0}")]
    MalformedResponse(String),
    #[error("classifier rejected input: {0}")]
    RejectedInput(String),
}

/// The asynchronous classification capability. One call per invocation, no
/// built-in retry, never a partial result. Implementations may keep running
/// after the caller stops waiting; the orchestrator discards stale outcomes.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        image: &SourceImage,
        region: Region,
    ) -> Result<ClassificationResult, ClassificationError>;
}

/// Null capability for constructing a workflow without a backend.
pub struct MissingClassifier;

#[async_trait]
impl Classifier for MissingClassifier {
    async fn classify(
        &self,
        _image: &SourceImage,
        _region: Region,
    ) -> Result<ClassificationResult, ClassificationError> {
        Err(ClassificationError::Unavailable(
            "no classifier capability configured".into(),
        ))
    }
}

struct CariesClass {
    label: &'static str,
    description: &'static str,
    recommendation: &'static str,
}

const CARIES_CLASSES: [CariesClass; 7] = [
    CariesClass {
        label: "Class I Caries",
        description: "Caries detected in pits and fissures on the occlusal surfaces of molars and premolars, or on the buccal/lingual surfaces of molars/maxillary incisors.",
        recommendation: "Requires immediate attention. Consider composite resin restoration or amalgam filling depending on cavity size and location.",
    },
    CariesClass {
        label: "Class II Caries",
        description: "Caries present on the proximal (mesial or distal) surfaces of premolars and molars.",
        recommendation: "Treatment with composite or amalgam restoration recommended. Consider preventive resin restoration if caught early.",
    },
    CariesClass {
        label: "Class III Caries",
        description: "Caries on proximal surfaces of anterior teeth without incisal angle involvement.",
        recommendation: "Composite resin restoration recommended for aesthetic and functional restoration.",
    },
    CariesClass {
        label: "Class IV Caries",
        description: "Caries on proximal surfaces of anterior teeth with incisal angle involvement.",
        recommendation: "Immediate restoration needed. Consider composite buildup or crown depending on extent of damage.",
    },
    CariesClass {
        label: "Class V Caries",
        description: "Caries in the gingival third (cervical area) of facial or lingual surfaces.",
        recommendation: "Treatment with glass ionomer or composite restoration recommended. Monitor gingival health.",
    },
    CariesClass {
        label: "Class VI Caries",
        description: "Caries on incisal edges of anterior teeth or cusp tips of posterior teeth.",
        recommendation: "Restore with composite resin. Consider occlusal analysis to prevent future wear.",
    },
    CariesClass {
        label: "Non-Caries",
        description: "No carious lesions detected. May include normal teeth or non-caries conditions such as enamel hypoplasia, fluorosis, or trauma.",
        recommendation: "Continue regular dental hygiene practices and schedule routine check-ups every 6 months.",
    },
];

/// Stand-in capability that simulates a model backend: a fixed artificial
/// delay, then a uniformly drawn class from the reference table with a
/// plausible confidence and detection time.
pub struct MockClassifier {
    delay: Duration,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_secs(2),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(
        &self,
        _image: &SourceImage,
        region: Region,
    ) -> Result<ClassificationResult, ClassificationError> {
        tokio::time::sleep(self.delay).await;

        let (index, confidence, elapsed_ms) = {
            let mut rng = rand::rng();
            (
                rng.random_range(0..CARIES_CLASSES.len()),
                0.7 + rng.random::<f32>() * 0.29,
                500 + rng.random_range(0..1500u64),
            )
        };
        let class = &CARIES_CLASSES[index];
        debug!(label = class.label, %region, "mock classification drawn");

        Ok(ClassificationResult {
            label: class.label.to_string(),
            confidence,
            description: class.description.to_string(),
            recommendation: class.recommendation.to_string(),
            elapsed_ms,
            classified_at: Utc::now(),
        })
    }
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest {
    image_b64: String,
    region: Region,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    caries_class: String,
    description: String,
    recommendation: String,
    confidence_level: f32,
}

/// Capability backed by a remote analysis service. The region is cropped,
/// PNG-encoded and posted as base64 JSON; elapsed time is measured locally
/// since the service does not report it.
pub struct HttpClassifier {
    http: reqwest::Client,
    analyze_url: String,
}

impl HttpClassifier {
    pub fn new(analyze_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            analyze_url: analyze_url.into(),
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(
        &self,
        image: &SourceImage,
        region: Region,
    ) -> Result<ClassificationResult, ClassificationError> {
        let started = Instant::now();

        let png = image
            .crop_to_png(&region)
            .map_err(|error| ClassificationError::RejectedInput(error.to_string()))?;
        let request = AnalyzeRequest {
            image_b64: STANDARD.encode(&png),
            region,
        };

        let response = self
            .http
            .post(&self.analyze_url)
            .json(&request)
            .send()
            .await
            .map_err(|error| ClassificationError::Transport(error.to_string()))?
            .error_for_status()
            .map_err(|error| ClassificationError::Transport(error.to_string()))?;
        let body: AnalyzeResponse = response
            .json()
            .await
            .map_err(|error| ClassificationError::MalformedResponse(error.to_string()))?;

        if body.caries_class.trim().is_empty() {
            return Err(ClassificationError::MalformedResponse(
                "empty class label".into(),
            ));
        }

        Ok(ClassificationResult {
            label: body.caries_class,
            confidence: body.confidence_level.clamp(0.0, 1.0),
            description: body.description,
            recommendation: body.recommendation,
            elapsed_ms: started.elapsed().as_millis() as u64,
            classified_at: Utc::now(),
        })
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
