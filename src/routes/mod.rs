use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::infra::app_state::AppState;

pub mod customers;
pub mod employees;
pub mod kitchen;
pub mod orders;
pub mod products;
pub mod reservations;
pub mod tables;

/// Body shared by every status-changing endpoint. The string is parsed into
/// the target enum by the handler.
#[derive(Deserialize, ToSchema, Debug)]
pub struct UpdateStatusReq {
    pub status: String,
}

/// Every route of the service, each group behind the authentication layer.
pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .merge(products::routes_with_openapi(state))
        .merge(customers::carts::routes_with_openapi(state))
        .merge(customers::orders::routes_with_openapi(state))
        .merge(customers::reservations::routes_with_openapi(state))
        .merge(employees::orders::routes_with_openapi(state))
        .merge(kitchen::routes_with_openapi(state))
        .merge(orders::routes_with_openapi(state))
        .merge(reservations::routes_with_openapi(state))
        .merge(tables::routes_with_openapi(state))
}
