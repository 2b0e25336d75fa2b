use crate::engine::BookingEngine;
use crate::error::Error;
use crate::onboarding::OnboardingGate;
use crate::store::{BookingStore, SlotFilter, SlotStore};
use crate::types::{Actor, Booking, MeetingType, Role, Slot, UserRef};
use crate::AppState;
use axum::body::Body;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use axum::{
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
struct SlotsQuery {
    advisor: Option<Uuid>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
struct BookingsQuery {
    #[serde(default = "default_upcoming")]
    upcoming: bool,
}

fn default_upcoming() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AddSlotRequest {
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    meeting_type: MeetingType,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeactivateSlotRequest {
    slot_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BookRequest {
    slot_id: Uuid,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CancelRequest {
    booking_id: Uuid,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BookingWithSlot {
    booking: Booking,
    slot: Slot,
}

pub async fn start_server<S, G>(state: AppState<S, G>, bind: &str)
where
    S: SlotStore + BookingStore,
    G: OnboardingGate,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .expect("failed to bind listener");
    tracing::info!(%bind, "listening");
    axum::serve(listener, app).await.expect("server error");
}

fn router<S, G>(state: AppState<S, G>) -> Router
where
    S: SlotStore + BookingStore,
    G: OnboardingGate,
{
    Router::new()
        .route("/slots", get(list_slots).post(add_slot))
        .route("/slots/deactivate", post(deactivate_slot))
        .route("/bookings", get(list_bookings))
        .route("/bookings/:id/invite", get(download_invite))
        .route("/book", post(book_slot))
        .route("/cancel", post(cancel_booking))
        .route_layer(middleware::from_fn(authenticate))
        .with_state(state)
}

/// Identity is established upstream (session service / reverse proxy) and
/// forwarded in headers; absent or malformed headers mean the request never
/// reaches a handler.
async fn authenticate(
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let actor = actor_from_headers(request.headers())
        .ok_or((StatusCode::UNAUTHORIZED, "Missing credentials".to_string()))?;
    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    let value = |name: &str| headers.get(name)?.to_str().ok();
    let id: Uuid = value("x-user-id")?.parse().ok()?;
    let role = Role::parse(value("x-user-role")?)?;
    let email = value("x-user-email")?.to_string();
    let name = value("x-user-name").unwrap_or_default().to_string();
    Some(Actor {
        user: UserRef { id, email, name },
        role,
    })
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Error::Authorization(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Error::Storage(msg) => {
                tracing::error!(error = %msg, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

async fn list_slots<S, G>(
    State(state): State<AppState<S, G>>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Vec<Slot>>, Error>
where
    S: SlotStore + BookingStore,
    G: OnboardingGate,
{
    let slots = state.engine.list_available(&SlotFilter {
        advisor: query.advisor,
        from: query.from,
        to: query.to,
    })?;
    Ok(Json(slots))
}

async fn add_slot<S, G>(
    State(state): State<AppState<S, G>>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<AddSlotRequest>,
) -> Result<impl IntoResponse, Error>
where
    S: SlotStore + BookingStore,
    G: OnboardingGate,
{
    let slot = state.engine.create_slot(
        &actor,
        request.starts_at,
        request.ends_at,
        request.meeting_type,
        request.message,
    )?;
    Ok(Json(json!({ "success": true, "slot": slot })))
}

async fn deactivate_slot<S, G>(
    State(state): State<AppState<S, G>>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<DeactivateSlotRequest>,
) -> Result<impl IntoResponse, Error>
where
    S: SlotStore + BookingStore,
    G: OnboardingGate,
{
    let event = state.engine.deactivate(&actor, request.slot_id)?;
    let cancelled = event.is_some();
    if let Some(event) = event {
        let dispatcher = state.dispatcher.clone();
        tokio::task::spawn_blocking(move || dispatcher.dispatch(&event));
    }
    Ok(Json(json!({
        "success": true,
        "cancelled_booking": cancelled,
    })))
}

async fn list_bookings<S, G>(
    State(state): State<AppState<S, G>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<BookingWithSlot>>, Error>
where
    S: SlotStore + BookingStore,
    G: OnboardingGate,
{
    let rows = state.engine.list_for_user(&actor, query.upcoming)?;
    Ok(Json(
        rows.into_iter()
            .map(|(booking, slot)| BookingWithSlot { booking, slot })
            .collect(),
    ))
}

async fn book_slot<S, G>(
    State(state): State<AppState<S, G>>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<BookRequest>,
) -> Result<impl IntoResponse, Error>
where
    S: SlotStore + BookingStore,
    G: OnboardingGate,
{
    let (booking, event) = state
        .engine
        .book(&actor, request.slot_id, request.message)?;

    // Notification happens after the store has committed; a transport
    // failure never affects the response.
    let dispatcher = state.dispatcher.clone();
    tokio::task::spawn_blocking(move || dispatcher.dispatch(&event));

    Ok(Json(json!({
        "success": true,
        "message": "Booking confirmed successfully!",
        "booking_id": booking.id,
    })))
}

async fn cancel_booking<S, G>(
    State(state): State<AppState<S, G>>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CancelRequest>,
) -> Result<impl IntoResponse, Error>
where
    S: SlotStore + BookingStore,
    G: OnboardingGate,
{
    let (booking, event) = state
        .engine
        .cancel(&actor, request.booking_id, request.message)?;

    if let Some(event) = event {
        let dispatcher = state.dispatcher.clone();
        tokio::task::spawn_blocking(move || dispatcher.dispatch(&event));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Booking cancelled successfully.",
        "booking": booking,
    })))
}

async fn download_invite<S, G>(
    State(state): State<AppState<S, G>>,
    Extension(actor): Extension<Actor>,
    Path(booking_id): Path<Uuid>,
) -> Result<Response, Error>
where
    S: SlotStore + BookingStore,
    G: OnboardingGate,
{
    let (booking, payload) = state.engine.booking_invite(&actor, booking_id)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"booking-{}.ics\"", booking.id),
            ),
        ],
        payload,
    )
        .into_response())
}
