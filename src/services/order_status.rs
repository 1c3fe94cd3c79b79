//! Role-gated order status workflow.
//!
//! Admins may set any status. The kitchen may only finish (`COMPLETED`) or
//! drop (`CANCELLED`) orders that are in its queue. Stock is never
//! re-validated here; cancellation returns stock only when
//! [`OrderPolicy::restock_on_cancel`] is enabled.

use anyhow::Context;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::info;

use crate::{
    infra::{
        app_error::AppError,
        auth::{CurrentUser, Role},
        config::OrderPolicy,
    },
    models::{OrderEntity, OrderItemEntity, OrderStatus},
    schema::{order_items, orders},
    services::stock::{self, StockRequest},
};

/// Statuses shown in the kitchen queue.
///
/// The queue shows orders still awaiting confirmation, so admin confirmation
/// does not gate what the kitchen sees.
pub const KITCHEN_VISIBLE: &[OrderStatus] = &[OrderStatus::PendingConfirmation];

pub fn is_kitchen_visible(status: OrderStatus) -> bool {
    KITCHEN_VISIBLE.contains(&status)
}

pub fn authorize_transition(
    role: Role,
    current: OrderStatus,
    next: OrderStatus,
) -> Result<(), AppError> {
    match role {
        Role::Admin => Ok(()),
        Role::Cook => {
            if !next.is_terminal() {
                return Err(AppError::ForbiddenResource(format!(
                    "The kitchen cannot set an order to {next}"
                )));
            }
            if !is_kitchen_visible(current) {
                return Err(AppError::ForbiddenResource(format!(
                    "Order in status {current} is not in the kitchen queue"
                )));
            }
            Ok(())
        }
        Role::Customer | Role::Employee => Err(AppError::ForbiddenResource(
            "Only the kitchen and admins may change order status".into(),
        )),
    }
}

/// Whether moving `current` → `next` must return the order's stock.
pub fn needs_restock(
    policy: OrderPolicy,
    current: OrderStatus,
    next: OrderStatus,
) -> Result<bool, AppError> {
    if !policy.restock_on_cancel {
        return Ok(false);
    }

    match (current, next) {
        (OrderStatus::Cancelled, OrderStatus::Cancelled) => Ok(false),
        (OrderStatus::Cancelled, _) => Err(AppError::BadRequest(
            "A cancelled order cannot be reopened once its stock was returned".into(),
        )),
        (_, OrderStatus::Cancelled) => Ok(true),
        _ => Ok(false),
    }
}

pub async fn update_order_status(
    conn: &mut AsyncPgConnection,
    user: CurrentUser,
    order_id: i32,
    next: OrderStatus,
    policy: OrderPolicy,
) -> Result<OrderEntity, AppError> {
    conn.transaction(move |conn| {
        Box::pin(async move {
            let order: OrderEntity = orders::table
                .find(order_id)
                .select(OrderEntity::as_select())
                .for_update()
                .first(conn)
                .await
                .optional()
                .context("Failed to lock order")?
                .ok_or_else(|| AppError::NotFound(format!("Order #{order_id}")))?;

            authorize_transition(user.role, order.status, next)?;

            if needs_restock(policy, order.status, next)? {
                let items: Vec<OrderItemEntity> = order_items::table
                    .select(OrderItemEntity::as_select())
                    .filter(order_items::order_id.eq(order.id))
                    .order_by(order_items::product_id)
                    .get_results(conn)
                    .await
                    .context("Failed to get order items")?;

                let returned: Vec<StockRequest> = items
                    .iter()
                    .map(|item| StockRequest {
                        product_id: item.product_id,
                        count: item.count,
                    })
                    .collect();
                stock::restock(conn, &returned).await?;
                info!("Returned stock for {} items of order #{}", returned.len(), order.id);
            }

            let updated: OrderEntity = diesel::update(orders::table.find(order.id))
                .set((
                    orders::status.eq(next),
                    orders::updated_at.eq(diesel::dsl::now),
                ))
                .returning(OrderEntity::as_returning())
                .get_result(conn)
                .await
                .context("Failed to update order status")?;

            info!(
                "Order #{} moved from {} to {} by {:?} #{}",
                updated.id, order.status, updated.status, user.role, user.user_id
            );
            Ok(updated)
        })
    })
    .await
}
