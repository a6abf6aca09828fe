use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use classifier::{Classifier, HttpClassifier, MockClassifier};
use imaging::{ImageSource, RegionSelector};
use shared::domain::Status;
use tracing::info;
use workflow::{presenter, WorkflowConfig, WorkflowEvent, WorkflowOrchestrator};

mod config;

use config::load_settings;

#[derive(Parser, Debug)]
#[command(about = "Run one region-of-interest classification workflow over an image file")]
struct Args {
    /// Path to the image to analyze (jpeg, png or tiff by default).
    #[arg(long)]
    image: PathBuf,
    /// Region of interest as x,y,width,height in source pixels.
    #[arg(long, value_delimiter = ',', num_args = 4)]
    region: Vec<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();
    let settings = load_settings();

    let blob = fs::read(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let requested: [u32; 4] = args
        .region
        .as_slice()
        .try_into()
        .map_err(|_| anyhow::anyhow!("--region expects x,y,width,height"))?;

    let classifier: Arc<dyn Classifier> = match &settings.analyze_url {
        Some(url) => {
            info!(%url, "using remote analysis service");
            Arc::new(HttpClassifier::new(url.clone()))
        }
        None => Arc::new(MockClassifier::with_delay(Duration::from_millis(
            settings.mock_delay_ms,
        ))),
    };

    let orchestrator = WorkflowOrchestrator::new(
        ImageSource::new(settings.accepted_encodings.clone()),
        classifier,
        WorkflowConfig {
            classify_timeout: settings.classify_timeout_ms.map(Duration::from_millis),
        },
    );
    let mut events = orchestrator.subscribe();

    let snapshot = orchestrator.select_image(&blob).await;
    if let Status::Failed(reason) = &snapshot.status {
        bail!("image rejected: {reason}");
    }
    let Some(image) = snapshot.image.clone() else {
        bail!("no image stored after selection");
    };

    let mut selector = RegionSelector::new(&image);
    let region = selector.adjust(requested[0], requested[1], requested[2], requested[3]);
    if [region.x, region.y, region.width, region.height] != requested {
        info!(%region, "requested region clamped into image bounds");
    }
    orchestrator.update_region(region).await;
    selector.confirm()?;
    let snapshot = orchestrator.confirm_region().await;
    if let Status::Failed(reason) = &snapshot.status {
        bail!("region rejected: {reason}");
    }

    loop {
        match events.recv().await? {
            WorkflowEvent::ClassificationCompleted { .. }
            | WorkflowEvent::ClassificationFailed { .. } => break,
            event => info!(?event, "workflow event"),
        }
    }

    let snapshot = orchestrator.snapshot().await;
    let display = presenter::present(snapshot.result.as_ref(), &snapshot.status);
    if let Some(label) = &display.label {
        println!("Class:          {label}");
        println!(
            "Confidence:     {}",
            display.confidence_display.as_deref().unwrap_or("-")
        );
        println!(
            "Detection time: {}",
            display.elapsed_display.as_deref().unwrap_or("-")
        );
        if let Some(description) = &display.description {
            println!("Description:    {description}");
        }
        if let Some(recommendation) = &display.recommendation {
            println!("Recommendation: {recommendation}");
        }
    }
    if let Some(failure) = &display.failure {
        println!("Analysis failed: {failure}");
    }

    Ok(())
}
