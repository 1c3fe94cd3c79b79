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
    models::DeliveryMethod,
    services::{
        carts::{self, CartView},
        line_items::LineItem,
    },
};

/// Customer-facing cart routes. A customer owns at most one cart.
pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/customers/cart",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_cart, save_cart, delete_cart))
            .routes(utoipa_axum::routes!(set_delivery_option))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::authenticate,
            )),
    )
}

#[utoipa::path(
    get,
    path = "/",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get my cart successfully", body = StdResponse<CartView, String>),
        (status = 404, description = "No active cart")
    )
)]
async fn get_cart(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    user.authorize(Action::ManageCart)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = carts::get_cart(conn, user.user_id).await?;

    Ok(StdResponse {
        data: Some(cart),
        message: Some("Get cart successfully"),
    })
}

#[derive(Deserialize, ToSchema, Debug)]
struct SaveCartReq {
    /// The complete new cart. Omitted or empty deletes the cart.
    #[serde(default)]
    items: Vec<LineItem>,
}

/// Replace the whole cart with the submitted items.
///
/// This is not an incremental update: products missing from `items` are
/// removed from the cart.
#[utoipa::path(
    put,
    path = "/",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    request_body = SaveCartReq,
    responses(
        (status = 200, description = "Cart saved, or deleted when empty", body = StdResponse<CartView, String>),
        (status = 409, description = "Requested count exceeds stock")
    )
)]
async fn save_cart(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<SaveCartReq>,
) -> Result<impl IntoResponse, AppError> {
    user.authorize(Action::ManageCart)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = carts::save_cart(conn, user.user_id, payload.items).await?;
    let message = match cart {
        Some(_) => "Cart saved successfully",
        None => "Cart deleted successfully",
    };

    Ok(StdResponse {
        data: cart,
        message: Some(message),
    })
}

#[utoipa::path(
    delete,
    path = "/",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Cart deleted", body = StdResponse<bool, String>)
    )
)]
async fn delete_cart(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    user.authorize(Action::ManageCart)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted = carts::delete_cart(conn, user.user_id).await?;

    Ok(StdResponse {
        data: Some(deleted),
        message: Some("Cart deleted successfully"),
    })
}

#[derive(Deserialize, ToSchema, Debug)]
struct DeliveryOptionReq {
    /// `DELIVERY` or `TABLE`.
    delivery_method: String,
    table_id: Option<i32>,
}

#[utoipa::path(
    patch,
    path = "/delivery",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    request_body = DeliveryOptionReq,
    responses(
        (status = 200, description = "Delivery option saved", body = StdResponse<CartView, String>),
        (status = 400, description = "Unknown method or missing table"),
        (status = 404, description = "No active cart or unknown table")
    )
)]
async fn set_delivery_option(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<DeliveryOptionReq>,
) -> Result<impl IntoResponse, AppError> {
    user.authorize(Action::ManageCart)?;
    let method: DeliveryMethod = payload.delivery_method.parse()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = carts::set_delivery_option(conn, user.user_id, method, payload.table_id).await?;

    Ok(StdResponse {
        data: Some(cart),
        message: Some("Delivery option saved successfully"),
    })
}
