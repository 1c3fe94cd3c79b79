use anyhow::{Context, Result};
use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    infra::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        auth::{Action, CurrentUser},
        middleware,
    },
    models::ReservationEntity,
    services::reservations::{self, ReservationRequest},
};

pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/customers/reservations",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_my_reservations, create_reservation))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::authenticate,
            )),
    )
}

#[derive(Deserialize, ToSchema, Debug)]
struct CreateReservationReq {
    table_id: i32,
    /// Start time today on the restaurant clock, `HH:MM`.
    reservation_time: String,
    number_of_guests: i32,
}

/// Book a table for today. The slot length is fixed by configuration.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Reservations"],
    security(("bearerAuth" = [])),
    request_body = CreateReservationReq,
    responses(
        (status = 200, description = "Reservation created as PENDING", body = StdResponse<ReservationEntity, String>),
        (status = 400, description = "Malformed time or too many guests"),
        (status = 404, description = "Table not found"),
        (status = 409, description = "Outside hours, in the past, too far ahead, or overlapping")
    )
)]
async fn create_reservation(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateReservationReq>,
) -> Result<impl IntoResponse, AppError> {
    user.authorize(Action::CreateReservation)?;

    let now = Utc::now();
    let policy = &state.config.schedule;
    let start = policy.resolve_start(&payload.reservation_time, now)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let reservation = reservations::create_reservation(
        conn,
        policy,
        ReservationRequest {
            user_id: user.user_id,
            table_id: payload.table_id,
            start,
            guests: payload.number_of_guests,
        },
        now,
    )
    .await?;

    Ok(StdResponse {
        data: Some(reservation),
        message: Some("Reservation created successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/",
    tags = ["Reservations"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List my reservations", body = StdResponse<Vec<ReservationEntity>, String>)
    )
)]
async fn get_my_reservations(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    user.authorize(Action::ViewOwnReservations)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let rows = reservations::list_for_user(conn, user.user_id).await?;

    Ok(StdResponse {
        data: Some(rows),
        message: Some("Get my reservations successfully"),
    })
}
