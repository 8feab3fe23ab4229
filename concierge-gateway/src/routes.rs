//! HTTP routes for the concierge API.
//!
//! Provides endpoints for:
//! - Apartment document management
//! - Guest chat, history and reset
//! - The WhatsApp webhook and its phone registry

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use concierge_channels::{RegistryEntry, VerifyOutcome, WebhookStatus};
use concierge_common::Error;
use concierge_core::{ChatReply, GuestHistory};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ApartmentsResponse {
    apartments: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DocumentsResponse {
    apartment_id: String,
    documents: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DocumentChangeResponse {
    message: &'static str,
    apartment_id: String,
    filename: String,
}

/// Body of `POST /chat`. Fields are optional so missing ones surface as 400s.
#[derive(Debug, Deserialize)]
struct ChatBody {
    guest_id: Option<String>,
    apartment_id: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResetResponse {
    message: &'static str,
    guest_id: String,
}

/// WhatsApp webhook verification query parameters.
#[derive(Debug, Deserialize)]
struct WhatsAppVerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegisterGuestBody {
    phone_number: Option<String>,
    apartment_id: Option<String>,
    guest_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct GuestsResponse {
    guests: Vec<RegistryEntry>,
}

#[derive(Debug, Serialize)]
struct UnregisterResponse {
    message: &'static str,
    phone_number: String,
}

// ============================================================================
// Health
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "MyRentalHost Concierge",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Apartments and documents
// ============================================================================

/// GET /apartments
async fn list_apartments(State(state): State<Arc<AppState>>) -> ApiResult<Json<ApartmentsResponse>> {
    let apartments = state.documents.list_apartments().await?;
    Ok(Json(ApartmentsResponse { apartments }))
}

/// GET /apartments/:apartment_id/documents
async fn list_documents(
    State(state): State<Arc<AppState>>,
    Path(apartment_id): Path<String>,
) -> ApiResult<Json<DocumentsResponse>> {
    let documents = state.documents.list_documents(&apartment_id).await?;
    Ok(Json(DocumentsResponse {
        apartment_id,
        documents,
    }))
}

/// POST /apartments/:apartment_id/upload (multipart field `file`)
async fn upload_document(
    State(state): State<Arc<AppState>>,
    Path(apartment_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<DocumentChangeResponse>> {
    let mut multipart =
        multipart.map_err(|e| Error::InvalidInput(format!("Expected a multipart upload: {e}")))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error("Malformed upload", e))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| upload_error("Failed to read upload", e))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) =
        upload.ok_or_else(|| Error::InvalidInput("No file was sent".into()))?;
    let filename = state
        .documents
        .upload_document(&apartment_id, &filename, &bytes)
        .await?;

    Ok(Json(DocumentChangeResponse {
        message: "Document uploaded successfully",
        apartment_id,
        filename,
    }))
}

/// Chunked bodies only hit the size cap while the multipart stream is read.
fn upload_error(what: &str, e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(format!("upload exceeds the size limit: {e}"))
    } else {
        Error::InvalidInput(format!("{what}: {e}"))
    }
}

/// DELETE /apartments/:apartment_id/documents/:filename
async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path((apartment_id, filename)): Path<(String, String)>,
) -> ApiResult<Json<DocumentChangeResponse>> {
    let filename = state
        .documents
        .delete_document(&apartment_id, &filename)
        .await?;

    Ok(Json(DocumentChangeResponse {
        message: "Document deleted successfully",
        apartment_id,
        filename,
    }))
}

// ============================================================================
// Chat
// ============================================================================

/// POST /chat
async fn chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> ApiResult<Json<ChatReply>> {
    let Json(body) = body.map_err(|e| Error::InvalidInput(e.body_text()))?;

    let (Some(guest_id), Some(message)) = (body.guest_id, body.message) else {
        return Err(Error::InvalidInput("guest_id and message are required".into()).into());
    };

    let reply = state
        .concierge
        .handle_message(&guest_id, body.apartment_id.as_deref(), &message)
        .await?;
    Ok(Json(reply))
}

/// GET /chat/:guest_id/history
async fn get_chat_history(
    State(state): State<Arc<AppState>>,
    Path(guest_id): Path<String>,
) -> ApiResult<Json<GuestHistory>> {
    Ok(Json(state.concierge.history(&guest_id).await?))
}

/// POST /chat/:guest_id/reset
async fn reset_chat(
    State(state): State<Arc<AppState>>,
    Path(guest_id): Path<String>,
) -> ApiResult<Json<ResetResponse>> {
    state.concierge.reset(&guest_id).await?;
    Ok(Json(ResetResponse {
        message: "Chat history reset successfully",
        guest_id,
    }))
}

// ============================================================================
// WhatsApp
// ============================================================================

/// GET /whatsapp/webhook (Meta webhook verification)
async fn whatsapp_verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WhatsAppVerifyQuery>,
) -> impl IntoResponse {
    match state.webhook.verify(
        params.mode.as_deref(),
        params.verify_token.as_deref(),
        params.challenge.as_deref(),
    ) {
        VerifyOutcome::Verified(challenge) => (StatusCode::OK, challenge),
        VerifyOutcome::MissingChallenge => {
            (StatusCode::BAD_REQUEST, "Missing hub.challenge".to_string())
        }
        VerifyOutcome::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
    }
}

/// POST /whatsapp/webhook (incoming messages)
async fn whatsapp_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok());

    if !state.webhook.verify_signature(&body, signature) {
        tracing::warn!(
            "WhatsApp webhook signature verification failed (signature: {})",
            if signature.is_some() { "invalid" } else { "missing" }
        );
        return (
            StatusCode::UNAUTHORIZED,
            Json(WebhookStatus::Error {
                error: "Invalid signature".into(),
            }),
        );
    }

    let status = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(payload) => state.webhook.process(&payload).await,
        Err(e) => {
            tracing::warn!(error = %e, "WhatsApp webhook body is not JSON");
            WebhookStatus::Error {
                error: "Invalid JSON payload".into(),
            }
        }
    };

    (StatusCode::OK, Json(status))
}

/// GET /whatsapp/guests
async fn list_guests(State(state): State<Arc<AppState>>) -> ApiResult<Json<GuestsResponse>> {
    let guests = state.webhook.registry().list()?;
    Ok(Json(GuestsResponse { guests }))
}

/// POST /whatsapp/guests
async fn register_guest(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RegisterGuestBody>, JsonRejection>,
) -> ApiResult<Json<RegistryEntry>> {
    let Json(body) = body.map_err(|e| Error::InvalidInput(e.body_text()))?;

    let (Some(phone_number), Some(apartment_id)) = (body.phone_number, body.apartment_id) else {
        return Err(
            Error::InvalidInput("phone_number and apartment_id are required".into()).into(),
        );
    };

    let entry = state.webhook.registry().register_guest(
        &phone_number,
        &apartment_id,
        body.guest_name.as_deref(),
    )?;
    Ok(Json(entry))
}

/// DELETE /whatsapp/guests/:phone
async fn unregister_guest(
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
) -> ApiResult<Json<UnregisterResponse>> {
    if !state.webhook.registry().unregister_guest(&phone)? {
        return Err(Error::NotFound(format!("Phone number {phone} is not registered")).into());
    }
    Ok(Json(UnregisterResponse {
        message: "Guest unregistered successfully",
        phone_number: phone,
    }))
}

// ============================================================================
// Router Builder
// ============================================================================

/// Build the concierge HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/health", get(health))
        // Documents
        .route("/apartments", get(list_apartments))
        .route("/apartments/:apartment_id/documents", get(list_documents))
        .route("/apartments/:apartment_id/upload", post(upload_document))
        .route(
            "/apartments/:apartment_id/documents/:filename",
            delete(delete_document),
        )
        // Chat
        .route("/chat", post(chat))
        .route("/chat/:guest_id/history", get(get_chat_history))
        .route("/chat/:guest_id/reset", post(reset_chat))
        // WhatsApp
        .route("/whatsapp/webhook", get(whatsapp_verify).post(whatsapp_webhook))
        .route("/whatsapp/guests", get(list_guests).post(register_guest))
        .route("/whatsapp/guests/:phone", delete(unregister_guest))
        .with_state(state)
}
