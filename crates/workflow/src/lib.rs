use std::{sync::Arc, time::Duration};

use classifier::Classifier;
use imaging::{ImageSource, SourceImage};
use shared::{
    domain::{ClassificationResult, Region, RequestId, RunId, Status, Step},
    error::FailureReason,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod presenter;

/// Deployment-policy knobs the core leaves open.
#[derive(Debug, Clone, Default)]
pub struct WorkflowConfig {
    /// Upper bound on one classification call. `None` waits indefinitely.
    pub classify_timeout: Option<Duration>,
}

/// Read-only view of the workflow state handed to the presentation layer.
#[derive(Debug, Clone)]
pub struct WorkflowSnapshot {
    pub run_id: RunId,
    pub step: Step,
    pub image: Option<SourceImage>,
    pub region: Option<Region>,
    pub result: Option<ClassificationResult>,
    pub status: Status,
}

/// Transition announcements for subscribers. `WorkflowReset` carries the id
/// of the new run.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    ImageAccepted {
        run_id: RunId,
        width: u32,
        height: u32,
    },
    ImageRejected {
        run_id: RunId,
        reason: FailureReason,
    },
    RegionUpdated {
        run_id: RunId,
        region: Region,
    },
    RegionRejected {
        run_id: RunId,
        reason: FailureReason,
    },
    ClassificationStarted {
        run_id: RunId,
        request: RequestId,
    },
    ClassificationCompleted {
        run_id: RunId,
        result: ClassificationResult,
    },
    ClassificationFailed {
        run_id: RunId,
        reason: FailureReason,
    },
    RegionReopened {
        run_id: RunId,
    },
    WorkflowReset {
        run_id: RunId,
    },
}

struct WorkflowInner {
    run_id: RunId,
    step: Step,
    status: Status,
    image: Option<SourceImage>,
    region: Option<Region>,
    result: Option<ClassificationResult>,
    latest_request: RequestId,
}

impl WorkflowInner {
    fn initial() -> Self {
        Self {
            run_id: RunId::new(),
            step: Step::AwaitingImage,
            status: Status::Idle,
            image: None,
            region: None,
            result: None,
            latest_request: RequestId(0),
        }
    }

    fn is_initial(&self) -> bool {
        self.step == Step::AwaitingImage
            && self.status == Status::Idle
            && self.image.is_none()
            && self.region.is_none()
            && self.result.is_none()
    }

    fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            run_id: self.run_id,
            step: self.step,
            image: self.image.clone(),
            region: self.region,
            result: self.result.clone(),
            status: self.status.clone(),
        }
    }
}

/// Owns the step state machine for one user session: holds the in-flight
/// artifacts, sequences the collaborators, and serializes every state
/// mutation through one lock. Strictly forward-moving except for `reset`
/// and the `recrop` convenience.
pub struct WorkflowOrchestrator {
    image_source: ImageSource,
    classifier: Arc<dyn Classifier>,
    config: WorkflowConfig,
    inner: Arc<Mutex<WorkflowInner>>,
    events: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowOrchestrator {
    pub fn new(
        image_source: ImageSource,
        classifier: Arc<dyn Classifier>,
        config: WorkflowConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            image_source,
            classifier,
            config,
            inner: Arc::new(Mutex::new(WorkflowInner::initial())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> WorkflowSnapshot {
        self.inner.lock().await.snapshot()
    }

    /// Decode a user-supplied blob and move to region selection. A decode
    /// failure keeps the workflow at `AwaitingImage` so another blob can be
    /// offered.
    pub async fn select_image(&self, blob: &[u8]) -> WorkflowSnapshot {
        let mut inner = self.inner.lock().await;
        if inner.step != Step::AwaitingImage {
            warn!(step = ?inner.step, "select_image ignored outside AwaitingImage");
            return inner.snapshot();
        }

        match self.image_source.load(blob) {
            Ok(image) => {
                info!(
                    run_id = %inner.run_id,
                    width = image.width(),
                    height = image.height(),
                    "image accepted"
                );
                let _ = self.events.send(WorkflowEvent::ImageAccepted {
                    run_id: inner.run_id,
                    width: image.width(),
                    height: image.height(),
                });
                inner.image = Some(image);
                inner.step = Step::AwaitingRegion;
                inner.status = Status::Idle;
            }
            Err(error) => {
                let reason = FailureReason::Decode(error.to_string());
                warn!(run_id = %inner.run_id, %reason, "image rejected");
                let _ = self.events.send(WorkflowEvent::ImageRejected {
                    run_id: inner.run_id,
                    reason: reason.clone(),
                });
                inner.status = Status::Failed(reason);
            }
        }
        inner.snapshot()
    }

    /// Record a region adjustment. Containment-invalid input never replaces
    /// the stored region; it surfaces as `Failed(InvalidRegion)` and a
    /// subsequent valid adjustment clears the failure.
    pub async fn update_region(&self, region: Region) -> WorkflowSnapshot {
        let mut inner = self.inner.lock().await;
        if inner.step != Step::AwaitingRegion {
            warn!(step = ?inner.step, "update_region ignored outside AwaitingRegion");
            return inner.snapshot();
        }
        let Some((image_width, image_height)) = inner
            .image
            .as_ref()
            .map(|image| (image.width(), image.height()))
        else {
            warn!("update_region with no stored image");
            return inner.snapshot();
        };

        if region.is_within(image_width, image_height) {
            debug!(run_id = %inner.run_id, %region, "region updated");
            let _ = self.events.send(WorkflowEvent::RegionUpdated {
                run_id: inner.run_id,
                region,
            });
            inner.region = Some(region);
            inner.status = Status::Idle;
        } else {
            let reason = FailureReason::InvalidRegion(format!(
                "region {region} exceeds image bounds {image_width}x{image_height}"
            ));
            warn!(run_id = %inner.run_id, %reason, "region rejected");
            let _ = self.events.send(WorkflowEvent::RegionRejected {
                run_id: inner.run_id,
                reason: reason.clone(),
            });
            inner.status = Status::Failed(reason);
        }
        inner.snapshot()
    }

    /// Commit to the stored region and issue the classification call. The
    /// call is tagged with a fresh request id; confirming again while the
    /// call is in flight is a no-op until it resolves or the workflow is
    /// reset.
    pub async fn confirm_region(&self) -> WorkflowSnapshot {
        let mut inner = self.inner.lock().await;
        if inner.step != Step::AwaitingRegion {
            warn!(step = ?inner.step, "confirm_region ignored outside AwaitingRegion");
            return inner.snapshot();
        }
        let (Some(image), Some(region)) = (inner.image.clone(), inner.region) else {
            warn!(run_id = %inner.run_id, "confirm_region without a selected region");
            return inner.snapshot();
        };

        // Containment must hold before the capability sees the input.
        if !region.is_within(image.width(), image.height()) {
            let reason = FailureReason::InvalidRegion(format!(
                "region {region} exceeds image bounds {}x{}",
                image.width(),
                image.height()
            ));
            warn!(run_id = %inner.run_id, %reason, "confirmed region rejected");
            let _ = self.events.send(WorkflowEvent::RegionRejected {
                run_id: inner.run_id,
                reason: reason.clone(),
            });
            inner.status = Status::Failed(reason);
            return inner.snapshot();
        }

        let request = inner.latest_request.next();
        inner.latest_request = request;
        inner.step = Step::Processing;
        inner.status = Status::Busy;
        inner.result = None;
        let run_id = inner.run_id;
        info!(%run_id, request = request.0, %region, "classification started");
        let _ = self
            .events
            .send(WorkflowEvent::ClassificationStarted { run_id, request });
        let snapshot = inner.snapshot();
        drop(inner);

        let classifier = Arc::clone(&self.classifier);
        let state = Arc::clone(&self.inner);
        let events = self.events.clone();
        let timeout = self.config.classify_timeout;
        tokio::spawn(async move {
            let outcome = run_classification(classifier.as_ref(), &image, region, timeout).await;
            apply_outcome(&state, &events, request, outcome).await;
        });

        snapshot
    }

    /// Reopen region selection on the stored image, discarding the region
    /// and any result. Supersedes an in-flight classification: its outcome
    /// no longer matches the latest request and will be discarded.
    pub async fn recrop(&self) -> WorkflowSnapshot {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.step, Step::Processing | Step::Done) || inner.image.is_none() {
            warn!(step = ?inner.step, "recrop ignored");
            return inner.snapshot();
        }

        inner.latest_request = inner.latest_request.next();
        inner.step = Step::AwaitingRegion;
        inner.region = None;
        inner.result = None;
        inner.status = Status::Idle;
        info!(run_id = %inner.run_id, "region selection reopened");
        let _ = self.events.send(WorkflowEvent::RegionReopened {
            run_id: inner.run_id,
        });
        inner.snapshot()
    }

    /// Return to the initial state, discarding image, region and result.
    /// Always available; a no-op when the workflow is already pristine. An
    /// in-flight classification is superseded, not awaited.
    pub async fn reset(&self) -> WorkflowSnapshot {
        let mut inner = self.inner.lock().await;
        if inner.is_initial() {
            debug!(run_id = %inner.run_id, "reset ignored; workflow already at initial state");
            return inner.snapshot();
        }

        inner.latest_request = inner.latest_request.next();
        inner.run_id = RunId::new();
        inner.step = Step::AwaitingImage;
        inner.image = None;
        inner.region = None;
        inner.result = None;
        inner.status = Status::Idle;
        info!(run_id = %inner.run_id, "workflow reset");
        let _ = self.events.send(WorkflowEvent::WorkflowReset {
            run_id: inner.run_id,
        });
        inner.snapshot()
    }
}

async fn run_classification(
    classifier: &dyn Classifier,
    image: &SourceImage,
    region: Region,
    timeout: Option<Duration>,
) -> Result<ClassificationResult, FailureReason> {
    let call = classifier.classify(image, region);
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(FailureReason::Classification(format!(
                    "classification timed out after {} ms",
                    limit.as_millis()
                )))
            }
        },
        None => call.await,
    };
    outcome.map_err(|error| FailureReason::Classification(error.to_string()))
}

async fn apply_outcome(
    state: &Mutex<WorkflowInner>,
    events: &broadcast::Sender<WorkflowEvent>,
    request: RequestId,
    outcome: Result<ClassificationResult, FailureReason>,
) {
    let mut inner = state.lock().await;
    if inner.latest_request != request || inner.step != Step::Processing {
        debug!(
            request = request.0,
            latest = inner.latest_request.0,
            step = ?inner.step,
            "stale classification outcome discarded"
        );
        return;
    }

    inner.step = Step::Done;
    match outcome {
        Ok(result) => {
            info!(
                run_id = %inner.run_id,
                label = %result.label,
                elapsed_ms = result.elapsed_ms,
                "classification completed"
            );
            let _ = events.send(WorkflowEvent::ClassificationCompleted {
                run_id: inner.run_id,
                result: result.clone(),
            });
            inner.result = Some(result);
            inner.status = Status::Idle;
        }
        Err(reason) => {
            warn!(run_id = %inner.run_id, %reason, "classification failed");
            let _ = events.send(WorkflowEvent::ClassificationFailed {
                run_id: inner.run_id,
                reason: reason.clone(),
            });
            inner.result = None;
            inner.status = Status::Failed(reason);
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
