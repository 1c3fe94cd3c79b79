use anyhow::{Context, Result};
use axum::{Extension, extract::State, response::IntoResponse};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    infra::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        auth::{Action, CurrentUser},
        middleware,
    },
    services::orders::{self, OrderView},
};

pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/kitchen/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_kitchen_queue))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::authenticate,
            )),
    )
}

/// Orders waiting on the kitchen, oldest first.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Kitchen"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Kitchen queue", body = StdResponse<Vec<OrderView>, String>)
    )
)]
async fn get_kitchen_queue(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    user.authorize(Action::ViewKitchenQueue)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let queue = orders::kitchen_queue(conn).await?;

    Ok(StdResponse {
        data: Some(queue),
        message: Some("Get kitchen queue successfully"),
    })
}
