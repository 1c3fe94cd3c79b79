use anyhow::{Context, Result};
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    infra::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        auth::{Action, CurrentUser},
        middleware,
    },
    models::{CreateDiningTableEntity, DiningTableEntity, TableStatus},
    routes::UpdateStatusReq,
    services::{
        reservations::{self, TableAvailability},
        tables,
    },
};

pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/tables",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_tables, create_table))
            .routes(utoipa_axum::routes!(get_table_availability))
            .routes(utoipa_axum::routes!(set_table_status))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::authenticate,
            )),
    )
}

#[utoipa::path(
    get,
    path = "/",
    tags = ["Tables"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List all tables", body = StdResponse<Vec<DiningTableEntity>, String>)
    )
)]
async fn get_tables(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    user.authorize(Action::ViewTables)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let rows = tables::list(conn).await?;

    Ok(StdResponse {
        data: Some(rows),
        message: Some("Get tables successfully"),
    })
}

/// Every table with whether it can seat someone right now.
#[utoipa::path(
    get,
    path = "/availability",
    tags = ["Tables"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current availability", body = StdResponse<Vec<TableAvailability>, String>)
    )
)]
async fn get_table_availability(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    user.authorize(Action::ViewTables)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let availability = reservations::current_table_availability(conn, Utc::now()).await?;

    Ok(StdResponse {
        data: Some(availability),
        message: Some("Get table availability successfully"),
    })
}

#[utoipa::path(
    post,
    path = "/",
    tags = ["Tables"],
    security(("bearerAuth" = [])),
    request_body = CreateDiningTableEntity,
    responses(
        (status = 200, description = "Table created", body = StdResponse<DiningTableEntity, String>),
        (status = 400, description = "Invalid capacity or duplicate table number")
    )
)]
async fn create_table(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateDiningTableEntity>,
) -> Result<impl IntoResponse, AppError> {
    user.authorize(Action::ManageTables)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let table = tables::create(conn, payload).await?;

    Ok(StdResponse {
        data: Some(table),
        message: Some("Table created successfully"),
    })
}

/// Manual staff toggle between `AVAILABLE` and `OCCUPIED`.
#[utoipa::path(
    patch,
    path = "/{id}/status",
    tags = ["Tables"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Table ID to update")
    ),
    request_body = UpdateStatusReq,
    responses(
        (status = 200, description = "Table status updated", body = StdResponse<DiningTableEntity, String>),
        (status = 400, description = "Unknown status"),
        (status = 404, description = "Table not found")
    )
)]
async fn set_table_status(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<UpdateStatusReq>,
) -> Result<impl IntoResponse, AppError> {
    user.authorize(Action::SetTableStatus)?;
    let status: TableStatus = payload.status.parse()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let table = tables::set_status(conn, id, status).await?;

    Ok(StdResponse {
        data: Some(table),
        message: Some("Table status updated successfully"),
    })
}
