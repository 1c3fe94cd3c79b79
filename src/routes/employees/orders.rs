use anyhow::{Context, Result};
use axum::{Extension, Json, extract::State, response::IntoResponse};
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
    services::{
        line_items::LineItem,
        orders::{self, OrderSource, OrderView, PlaceOrder},
    },
};

pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/employees/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(create_walk_in_order))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::authenticate,
            )),
    )
}

#[derive(Deserialize, ToSchema, Debug)]
struct WalkInOrderReq {
    items: Vec<LineItem>,
    /// Serve at this table. Without it the order is a delivery.
    table_id: Option<i32>,
    payment_slip_url: Option<String>,
}

/// Enter an order on behalf of a walk-in customer. The employee is recorded as its creator.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    request_body = WalkInOrderReq,
    responses(
        (status = 200, description = "Order placed", body = StdResponse<OrderView, String>),
        (status = 400, description = "No items or invalid items"),
        (status = 404, description = "Unknown product or table"),
        (status = 409, description = "Not enough stock")
    )
)]
async fn create_walk_in_order(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<WalkInOrderReq>,
) -> Result<impl IntoResponse, AppError> {
    user.authorize(Action::PlaceWalkInOrder)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = orders::place_order(
        conn,
        PlaceOrder {
            acting_user_id: user.user_id,
            source: OrderSource::Inline(payload.items),
            table_id: payload.table_id,
            payment_slip_url: payload.payment_slip_url,
        },
    )
    .await?;

    Ok(StdResponse {
        data: Some(order),
        message: Some("Order placed successfully"),
    })
}
