//! Axum REST API handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

use crate::engine::ModelPool;
use crate::error::Error;
use crate::service::FaceService;
use crate::storage::{FaceStore, ImageStore};

use super::dto::*;

/// Application state shared across handlers.
pub struct AppState<S: FaceStore, I: ImageStore> {
    pub service: Arc<FaceService<S, I>>,
    pub pool: Arc<ModelPool>,
    pub start_time: Instant,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a core error to an HTTP status plus machine-readable code.
fn map_error(err: Error) -> ApiError {
    let status = match &err {
        Error::PersonNotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidPersonName(_) | Error::ImageDecode(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("request failed: {err}");
    }
    (status, Json(ErrorResponse::new(&err.to_string(), err.code())))
}

fn bad_request(message: &str, code: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message, code)))
}

/// Create the REST API router.
pub fn create_router<S: FaceStore, I: ImageStore>(state: Arc<AppState<S, I>>) -> Router {
    Router::new()
        .route(
            "/person",
            post(create_person_handler::<S, I>).get(list_persons_handler::<S, I>),
        )
        .route("/person/image", post(add_images_handler::<S, I>))
        .route("/person/train", post(train_person_handler::<S, I>))
        .route("/person/:name", delete(delete_person_handler::<S, I>))
        .route("/recognize", post(recognize_handler::<S, I>))
        .route("/health", get(health_handler::<S, I>))
        .route("/metrics", get(metrics_handler::<S, I>))
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create a person namespace.
async fn create_person_handler<S: FaceStore, I: ImageStore>(
    State(state): State<Arc<AppState<S, I>>>,
    Json(request): Json<CreatePersonRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let created = state
        .service
        .create_person(&request.person_name)
        .await
        .map_err(map_error)?;

    let message = if created {
        format!("Person '{}' created.", request.person_name)
    } else {
        format!("Person '{}' already exists.", request.person_name)
    };
    Ok(Json(MessageResponse { message }))
}

/// List persons with their training status.
async fn list_persons_handler<S: FaceStore, I: ImageStore>(
    State(state): State<Arc<AppState<S, I>>>,
) -> Result<Json<Vec<PersonDto>>, ApiError> {
    let persons = state.service.list_persons().await.map_err(map_error)?;
    Ok(Json(
        persons
            .into_iter()
            .map(|p| PersonDto {
                name: p.name,
                trained: p.trained,
            })
            .collect(),
    ))
}

/// Upload reference images for a person (multipart: `person_name` text
/// field plus one or more `file` fields).
async fn add_images_handler<S: FaceStore, I: ImageStore>(
    State(state): State<Arc<AppState<S, I>>>,
    mut multipart: Multipart,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut person_name: Option<String> = None;
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        bad_request(&e.to_string(), "MULTIPART_ERROR")
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "person_name" => person_name = Some(field.text().await.unwrap_or_default()),
            "file" | "image" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}.jpg", Uuid::new_v4()));
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(&e.to_string(), "READ_ERROR"))?;
                files.push((filename, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let person_name =
        person_name.ok_or_else(|| bad_request("Missing person_name field", "MISSING_PERSON_NAME"))?;
    if files.is_empty() {
        return Err(bad_request("Missing file field", "MISSING_FILE"));
    }

    let count = state
        .service
        .add_images(&person_name, files)
        .await
        .map_err(map_error)?;

    Ok(Json(MessageResponse {
        message: format!("{} images uploaded for '{}'.", count, person_name),
    }))
}

/// Run enrollment for a person.
async fn train_person_handler<S: FaceStore, I: ImageStore>(
    State(state): State<Arc<AppState<S, I>>>,
    Json(request): Json<TrainPersonRequest>,
) -> Result<Json<TrainResponse>, ApiError> {
    let outcome = state
        .service
        .enroll(&request.person_name)
        .await
        .map_err(map_error)?;

    Ok(Json(TrainResponse {
        message: format!(
            "Trained and saved {} embeddings for {}.",
            outcome.embeddings_added, outcome.person
        ),
        person: outcome.person,
        embeddings_added: outcome.embeddings_added,
        images_scanned: outcome.images_scanned,
    }))
}

/// Delete a person and all their data.
async fn delete_person_handler<S: FaceStore, I: ImageStore>(
    State(state): State<Arc<AppState<S, I>>>,
    Path(name): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.service.delete_person(&name).await.map_err(map_error)?;

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("All data for '{}' has been deleted.", name),
    }))
}

/// Recognize faces in an uploaded image (multipart: `file` field plus
/// an optional `threshold` text field).
async fn recognize_handler<S: FaceStore, I: ImageStore>(
    State(state): State<Arc<AppState<S, I>>>,
    mut multipart: Multipart,
) -> Result<Json<RecognizeResponse>, ApiError> {
    let mut image_data: Option<Vec<u8>> = None;
    let mut threshold: Option<f32> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        bad_request(&e.to_string(), "MULTIPART_ERROR")
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" | "image" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(&e.to_string(), "READ_ERROR"))?;
                image_data = Some(bytes.to_vec());
            }
            "threshold" => threshold = field.text().await.ok().and_then(|t| t.parse().ok()),
            _ => {}
        }
    }

    let image_data =
        image_data.ok_or_else(|| bad_request("Missing file field", "MISSING_FILE"))?;

    let outcome = state
        .service
        .recognize(image_data, threshold)
        .await
        .map_err(map_error)?;

    let results = outcome.faces.iter().map(|f| f.label.clone()).collect();
    let faces = outcome
        .faces
        .into_iter()
        .map(|f| RecognizedFaceDto {
            x1: f.x1,
            y1: f.y1,
            x2: f.x2,
            y2: f.y2,
            confidence: f.confidence,
            label: f.label,
            distance: f.distance,
        })
        .collect();

    Ok(Json(RecognizeResponse {
        results,
        faces,
        inference_time_ms: outcome.inference_time_ms,
    }))
}

/// Health check.
async fn health_handler<S: FaceStore, I: ImageStore>(
    State(state): State<Arc<AppState<S, I>>>,
) -> Json<HealthResponse> {
    let models_loaded = state
        .pool
        .status()
        .into_iter()
        .map(|(kind, loaded)| (kind.as_str().to_string(), loaded))
        .collect();

    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        models_loaded,
    })
}

/// Metrics.
async fn metrics_handler<S: FaceStore, I: ImageStore>(
    State(state): State<Arc<AppState<S, I>>>,
) -> Result<Json<MetricsResponse>, ApiError> {
    let total_records = state
        .service
        .faces()
        .count_records()
        .await
        .map_err(map_error)?;
    let models_loaded = state
        .pool
        .status()
        .into_iter()
        .map(|(kind, loaded)| (kind.as_str().to_string(), loaded))
        .collect();

    Ok(Json(MetricsResponse {
        total_records,
        models_loaded,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    }))
}
