//! HTTP API over the perception pipeline

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sightline_core::{Mode, SightlineConfig};
use sightline_eye::modes::surveillance::strip_detections;
use sightline_eye::{
    prepare_frame_blocking, AdmissionGate, EncodedFrames, ModeDispatcher, ModeResponse, PerfTracker,
    PipelineOrchestrator, PipelineResult, RecordStore, VideoSampler, VisionError,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Upload size ceiling for image and frame-sequence bodies.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Seconds a rejected live client should wait before retrying.
pub const RETRY_AFTER_SECS: u64 = 1;

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: PipelineOrchestrator,
    pub dispatcher: ModeDispatcher,
    pub store: Arc<dyn RecordStore>,
    pub gate: AdmissionGate,
    pub perf: Arc<PerfTracker>,
    pub config: Arc<SightlineConfig>,
}

impl ApiState {
    pub fn new(orchestrator: PipelineOrchestrator, store: Arc<dyn RecordStore>, config: SightlineConfig) -> Self {
        Self {
            dispatcher: ModeDispatcher::new(Some(store.clone()), config.free_space.clone()),
            orchestrator,
            store,
            gate: AdmissionGate::new(),
            perf: Arc::new(PerfTracker::new(config.perf.window, config.perf.log_every)),
            config: Arc::new(config),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Request failure mapped onto a status code and an [`ErrorResponse`] body.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Vision(VisionError),
}

impl From<VisionError> for ApiError {
    fn from(err: VisionError) -> Self {
        ApiError::Vision(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Vision(err) if err.is_overload() => {
                (StatusCode::SERVICE_UNAVAILABLE, "BUSY", "Server busy, retry in a moment".to_string())
            }
            ApiError::Vision(err @ VisionError::InvalidMode(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_MODE", err.to_string())
            }
            ApiError::Vision(err) if err.is_client_error() => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", err.to_string())
            }
            ApiError::Vision(err) => {
                error!("Request failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Internal error".to_string())
            }
        };

        let mut response = (status, Json(ErrorResponse { error: message, code: code.to_string() })).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        response
    }
}

/// Fields of a multipart request; unknown fields are ignored.
#[derive(Default)]
struct UploadForm {
    file: Option<Bytes>,
    mode: Option<String>,
    fps: Option<f64>,
    frames: Vec<Bytes>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed to read field {}: {}", name, e)))?;
            match name.as_str() {
                "file" => form.file = Some(data),
                "frame" => form.frames.push(data),
                "mode" => form.mode = Some(String::from_utf8_lossy(&data).into_owned()),
                "fps" => {
                    let text = String::from_utf8_lossy(&data);
                    let fps = text
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| ApiError::BadRequest(format!("invalid fps: {}", text)))?;
                    form.fps = Some(fps);
                }
                _ => {}
            }
        }
        Ok(form)
    }

    fn take_file(&mut self) -> Result<Bytes, ApiError> {
        self.file
            .take()
            .ok_or_else(|| ApiError::BadRequest("missing multipart field: file".to_string()))
    }

    fn mode(&self) -> Result<Mode, ApiError> {
        match &self.mode {
            Some(mode) => Ok(mode.parse::<Mode>().map_err(VisionError::from)?),
            None => Ok(Mode::Surveillance),
        }
    }
}

/// Cheap overload check made before the multipart body is streamed in. The real
/// [`AdmissionGate::try_acquire`] still happens later and is authoritative.
fn reject_if_busy(gate: &AdmissionGate) -> Result<(), ApiError> {
    if gate.is_busy() {
        return Err(VisionError::Busy.into());
    }
    Ok(())
}

fn round1(ms: f64) -> f64 {
    (ms * 10.0).round() / 10.0
}

fn elapsed_ms(start: Instant) -> f64 {
    round1(start.elapsed().as_secs_f64() * 1000.0)
}

/// Shallow merge: keys of `overlay` replace keys of `base`.
fn merge_objects(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            base.extend(overlay);
            Value::Object(base)
        }
        (base, _) => base,
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Vision(VisionError::Core(e.into())))
}

/// Create HTTP router with all API routes
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(status_handler))
        .route("/upload", post(upload_handler))
        .route("/analyze-frame", post(analyze_frame_handler))
        .route("/process-frame", post(process_frame_handler))
        .route("/process-video", post(process_video_handler))
        .route("/depth", post(depth_handler))
        .route("/history", get(history_handler))
        .route("/delete/:id", delete(delete_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn status_handler(State(state): State<ApiState>) -> Json<Value> {
    let registry = state.orchestrator.registry();
    let detectors: Vec<Value> = registry
        .loaded_detectors()
        .into_iter()
        .map(|(mode, label)| json!({ "mode": mode, "model": label }))
        .collect();
    Json(json!({
        "message": "Sightline API is running",
        "version": env!("CARGO_PKG_VERSION"),
        "detectors": detectors,
        "depth": registry.depth().is_some(),
        "caption": registry.captioner().is_some(),
        "busy": state.gate.is_busy(),
    }))
}

/// Full surveillance analysis of an uploaded image; the result is persisted.
async fn upload_handler(State(state): State<ApiState>, multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let data = form.take_file()?;
    let frame = prepare_frame_blocking(data, state.config.pipeline.upload_max_edge).await?;
    let image = Arc::new(frame.rgb);

    let result = state
        .orchestrator
        .run_pipeline(image.clone(), Mode::Surveillance, true, false)
        .await;
    let response = state.dispatcher.dispatch(Mode::Surveillance, &result, Some(&image)).await;

    let ModeResponse::Surveillance(surveillance) = response else {
        return Err(ApiError::Vision(VisionError::Storage("unexpected mode response".to_string())));
    };
    info!("Upload processed: {}", surveillance.summary);

    Ok(Json(json!({
        "message": "File uploaded and processed successfully",
        "id": surveillance.record_id,
        "stored": surveillance.stored,
        "mode": Mode::Surveillance,
        "model": result.model,
        "frame_width": result.width,
        "frame_height": result.height,
        "detections": surveillance.detected_objects,
        "summary": surveillance.summary,
        "caption": result.caption,
        "scene_description": result.scene_description,
        "depth_map": result.depth_map,
        "navigation": result.navigation,
        "safe_ratio": result.safe_ratio,
        "free_mask": result.free_mask,
        "timing_ms": result.timing,
        "timestamp": surveillance.timestamp,
    })))
}

/// Live-camera surveillance frame. Gated: a second concurrent frame gets 503.
async fn analyze_frame_handler(State(state): State<ApiState>, multipart: Multipart) -> Result<Json<Value>, ApiError> {
    reject_if_busy(&state.gate)?;
    let mut form = UploadForm::read(multipart).await?;
    let data = form.take_file()?;
    let _permit = state.gate.try_acquire()?;
    let started = Instant::now();

    let t = Instant::now();
    let frame = prepare_frame_blocking(data, state.config.pipeline.live_max_edge).await?;
    let decode_ms = elapsed_ms(t);

    let result = state
        .orchestrator
        .run_pipeline(Arc::new(frame.rgb), Mode::Surveillance, true, true)
        .await;

    let mut timing = result.timing.clone();
    timing.insert("decode_resize_ms".to_string(), decode_ms);
    let total_ms = elapsed_ms(started);
    timing.insert("total_ms".to_string(), total_ms);
    let perf = state.perf.record(total_ms, "analyze-frame");
    timing.insert("avg_fps".to_string(), perf.avg_fps);
    timing.insert("avg_total_ms".to_string(), perf.avg_total_ms);

    Ok(Json(json!({
        "mode": Mode::Surveillance,
        "model": result.model,
        "detections": strip_detections(&result.detections),
        "navigation": result.navigation,
        "safe_ratio": result.safe_ratio,
        "scene_description": result.scene_description,
        "caption": result.caption,
        "depth_map": result.depth_map,
        "free_mask": Value::Null,
        "frame_width": result.width,
        "frame_height": result.height,
        "timing_ms": timing,
        "urgent_count": 0,
        "timestamp": Utc::now(),
    })))
}

/// Unified body for `/process-frame`: pipeline fields overlaid with the mode handler's fields.
fn unified_response(result: &PipelineResult, response: &ModeResponse) -> Result<Value, ApiError> {
    let mut base = Map::new();
    base.insert("mode".to_string(), to_json(&result.mode)?);
    base.insert("model".to_string(), Value::String(result.model.clone()));
    base.insert("frame_width".to_string(), Value::from(result.width));
    base.insert("frame_height".to_string(), Value::from(result.height));
    base.insert("detections".to_string(), to_json(&result.detections)?);
    base.insert("navigation".to_string(), to_json(&result.navigation)?);
    base.insert("safe_ratio".to_string(), to_json(&result.safe_ratio)?);
    base.insert("scene_description".to_string(), Value::String(result.scene_description.clone()));
    base.insert("caption".to_string(), Value::String(result.caption.clone()));
    base.insert("depth_map".to_string(), to_json(&result.depth_map)?);
    base.insert("free_mask".to_string(), to_json(&result.free_mask)?);
    base.insert("urgent_count".to_string(), Value::from(result.urgent_count()));

    let mut merged = merge_objects(Value::Object(base), to_json(response)?);
    if let (ModeResponse::Surveillance(s), Value::Object(map)) = (response, &mut merged) {
        map.insert("detections".to_string(), to_json(&s.detected_objects)?);
        map.remove("detected_objects");
    }
    Ok(merged)
}

/// Mode-aware frame processing.
///
/// A busy gate is reported before the body is read. Otherwise the mode is validated first, then
/// the gate is taken, then the frame decoded.
async fn process_frame_handler(State(state): State<ApiState>, multipart: Multipart) -> Result<Json<Value>, ApiError> {
    reject_if_busy(&state.gate)?;
    let mut form = UploadForm::read(multipart).await?;
    let mode = form.mode()?;
    let data = form.take_file()?;
    info!("/process-frame mode={} model={}", mode, state.orchestrator.registry().model_label(mode));

    let _permit = state.gate.try_acquire()?;
    let started = Instant::now();

    let t = Instant::now();
    let frame = prepare_frame_blocking(data, state.config.pipeline.live_max_edge).await?;
    let decode_ms = elapsed_ms(t);
    let image = Arc::new(frame.rgb);

    let want_caption = matches!(mode, Mode::Surveillance | Mode::Assistive);
    let is_live = mode != Mode::Surveillance;
    let result = state
        .orchestrator
        .run_pipeline(image.clone(), mode, want_caption, is_live)
        .await;

    let t = Instant::now();
    let response = state.dispatcher.dispatch(mode, &result, Some(&image)).await;
    let mode_ms = elapsed_ms(t);

    let mut timing = result.timing.clone();
    timing.insert("decode_resize_ms".to_string(), decode_ms);
    timing.insert("mode_ms".to_string(), mode_ms);
    let total_ms = elapsed_ms(started);
    timing.insert("total_ms".to_string(), total_ms);
    let perf = state.perf.record(total_ms, &format!("process/{}", mode));
    timing.insert("avg_fps".to_string(), perf.avg_fps);
    timing.insert("avg_total_ms".to_string(), perf.avg_total_ms);

    let mut body = unified_response(&result, &response)?;
    if let Value::Object(map) = &mut body {
        map.insert("timing_ms".to_string(), to_json(&timing)?);
    }
    Ok(Json(body))
}

/// Sampled analysis of a frame sequence sent as repeated `frame` parts with an `fps` field.
///
/// Only pre-split frames are accepted: each `frame` part is one encoded still image, in playback
/// order. Container files such as MP4 must be split into frames by the client.
async fn process_video_handler(State(state): State<ApiState>, multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let form = UploadForm::read(multipart).await?;
    let mode = form.mode()?;
    if form.frames.is_empty() {
        return Err(ApiError::BadRequest("missing multipart field: frame".to_string()));
    }
    let fps = form.fps.unwrap_or(sightline_eye::video::FALLBACK_FPS);
    let want_caption = mode != Mode::SelfDriving;

    let mut source = EncodedFrames::new(form.frames, fps);
    let sampler = VideoSampler::new(state.orchestrator.clone(), state.config.video.clone());
    let report = sampler.analyze(&mut source, mode, want_caption).await?;
    Ok(Json(to_json(&report)?))
}

/// Depth preview only. Not gated.
async fn depth_handler(State(state): State<ApiState>, multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let data = form.take_file()?;
    let frame = prepare_frame_blocking(data, state.config.pipeline.depth_max_edge).await?;
    let (width, height) = (frame.width, frame.height);

    let t = Instant::now();
    let depth_map = state.orchestrator.depth_preview(Arc::new(frame.rgb)).await?;
    Ok(Json(json!({
        "depth_map": depth_map,
        "frame_width": width,
        "frame_height": height,
        "depth_ms": elapsed_ms(t),
    })))
}

async fn history_handler(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let records = state.store.list().await?;
    Ok(Json(to_json(&records)?))
}

async fn delete_handler(State(state): State<ApiState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let deleted = state.store.delete(&id).await?;
    let message = if deleted { "Record deleted successfully" } else { "Record not found" };
    Ok(Json(json!({ "message": message, "deleted": deleted, "id": id })))
}
