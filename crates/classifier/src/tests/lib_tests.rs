use super::*;

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};

fn png_image(width: u32, height: u32) -> SourceImage {
    let mut buffer = Vec::new();
    image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height))
        .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
        .expect("encode png");
    imaging::ImageSource::default()
        .load(&buffer)
        .expect("load png")
}

#[derive(Clone)]
struct StubState {
    request_tx: Arc<Mutex<Option<oneshot::Sender<serde_json::Value>>>>,
    response: serde_json::Value,
    status: StatusCode,
}

async fn handle_analyze(
    State(state): State<StubState>,
    Json(payload): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    if let Some(tx) = state.request_tx.lock().await.take() {
        let _ = tx.send(payload);
    }
    (state.status, Json(state.response.clone()))
}

async fn spawn_stub(
    response: serde_json::Value,
    status: StatusCode,
) -> (String, oneshot::Receiver<serde_json::Value>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (tx, rx) = oneshot::channel();
    let state = StubState {
        request_tx: Arc::new(Mutex::new(Some(tx))),
        response,
        status,
    };
    let app = Router::new()
        .route("/api/v1/analyze", post(handle_analyze))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/api/v1/analyze"), rx)
}

#[tokio::test]
async fn missing_classifier_is_unavailable() {
    let err = MissingClassifier
        .classify(&png_image(16, 16), Region::new(0, 0, 8, 8))
        .await
        .expect_err("must fail");
    assert!(matches!(err, ClassificationError::Unavailable(_)));
}

#[tokio::test]
async fn mock_classifier_draws_from_the_reference_table() {
    let result = MockClassifier::with_delay(Duration::from_millis(0))
        .classify(&png_image(32, 32), Region::new(0, 0, 16, 16))
        .await
        .expect("classify");

    assert!(CARIES_CLASSES
        .iter()
        .any(|class| class.label == result.label
            && class.description == result.description
            && class.recommendation == result.recommendation));
    assert!((0.7..=0.99).contains(&result.confidence));
    assert!((500..2000).contains(&result.elapsed_ms));
}

#[tokio::test]
async fn http_classifier_maps_the_service_response() {
    let (url, request_rx) = spawn_stub(
        serde_json::json!({
            "caries_class": "Class I Caries",
            "description": "Pit and fissure lesion.",
            "recommendation": "Composite resin restoration.",
            "confidence_level": 0.85,
        }),
        StatusCode::OK,
    )
    .await;

    let image = png_image(64, 64);
    let result = HttpClassifier::new(url)
        .classify(&image, Region::new(8, 8, 16, 16))
        .await
        .expect("classify");

    assert_eq!(result.label, "Class I Caries");
    assert!((result.confidence - 0.85).abs() < 1e-6);
    assert_eq!(result.description, "Pit and fissure lesion.");
    assert_eq!(result.recommendation, "Composite resin restoration.");

    let payload = request_rx.await.expect("captured request");
    assert_eq!(payload["region"]["x"], 8);
    assert_eq!(payload["region"]["y"], 8);
    assert_eq!(payload["region"]["width"], 16);
    assert_eq!(payload["region"]["height"], 16);

    let png = STANDARD
        .decode(payload["image_b64"].as_str().expect("image_b64"))
        .expect("decode b64");
    let cropped = imaging::ImageSource::default()
        .load(&png)
        .expect("cropped png");
    assert_eq!(cropped.width(), 16);
    assert_eq!(cropped.height(), 16);
}

#[tokio::test]
async fn http_classifier_clamps_out_of_range_confidence() {
    let (url, _request_rx) = spawn_stub(
        serde_json::json!({
            "caries_class": "Non-Caries",
            "description": "d",
            "recommendation": "r",
            "confidence_level": 1.7,
        }),
        StatusCode::OK,
    )
    .await;

    let result = HttpClassifier::new(url)
        .classify(&png_image(32, 32), Region::new(0, 0, 8, 8))
        .await
        .expect("classify");
    assert_eq!(result.confidence, 1.0);
}

#[tokio::test]
async fn http_classifier_rejects_a_response_missing_fields() {
    let (url, _request_rx) =
        spawn_stub(serde_json::json!({ "unexpected": true }), StatusCode::OK).await;

    let err = HttpClassifier::new(url)
        .classify(&png_image(32, 32), Region::new(0, 0, 8, 8))
        .await
        .expect_err("must fail");
    assert!(matches!(err, ClassificationError::MalformedResponse(_)));
}

#[tokio::test]
async fn http_classifier_rejects_an_empty_label() {
    let (url, _request_rx) = spawn_stub(
        serde_json::json!({
            "caries_class": "  ",
            "description": "d",
            "recommendation": "r",
            "confidence_level": 0.9,
        }),
        StatusCode::OK,
    )
    .await;

    let err = HttpClassifier::new(url)
        .classify(&png_image(32, 32), Region::new(0, 0, 8, 8))
        .await
        .expect_err("must fail");
    assert!(matches!(err, ClassificationError::MalformedResponse(_)));
}

#[tokio::test]
async fn http_classifier_surfaces_a_server_error_as_transport_failure() {
    let (url, _request_rx) = spawn_stub(
        serde_json::json!({ "detail": "model exploded" }),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
    .await;

    let err = HttpClassifier::new(url)
        .classify(&png_image(32, 32), Region::new(0, 0, 8, 8))
        .await
        .expect_err("must fail");
    assert!(matches!(err, ClassificationError::Transport(_)));
}

#[tokio::test]
async fn http_classifier_rejects_out_of_bounds_input_before_sending() {
    // Unroutable URL on purpose: the crop must fail before any transport.
    let err = HttpClassifier::new("http://127.0.0.1:9/api/v1/analyze")
        .classify(&png_image(16, 16), Region::new(10, 10, 16, 16))
        .await
        .expect_err("must fail");
    assert!(matches!(err, ClassificationError::RejectedInput(_)));
}
