//! Order conversion engine.
//!
//! [`place_order`] turns a stored cart, or a walk-in item list entered by an
//! employee, into an immutable order in a single transaction:
//!
//! 1. resolve the item list
//! 2. reject an empty list
//! 3. occupy the target table if it is free
//! 4. lock and re-check stock at current quantities
//! 5. insert the order with unit prices captured now
//! 6. move the ordered counts from on-hand to sold
//! 7. delete the stored cart
//!
//! Any failure rolls the whole transaction back.

use std::collections::HashMap;

use anyhow::Context;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    infra::app_error::AppError,
    models::{
        CartEntity, CartItemEntity, CreateOrderEntity, CreateOrderItemEntity, DeliveryMethod,
        OrderEntity, OrderItemEntity, OrderStatus,
    },
    schema::{cart_items, carts, order_items, orders},
    services::{
        carts::cart_total,
        line_items::{self, LineItem},
        order_status::KITCHEN_VISIBLE,
        stock, tables,
    },
};

#[derive(Debug, Clone)]
pub enum OrderSource {
    /// The acting user's stored cart.
    Cart,
    /// Items entered directly by staff for a walk-in customer.
    Inline(Vec<LineItem>),
}

#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub acting_user_id: i32,
    pub source: OrderSource,
    pub table_id: Option<i32>,
    pub payment_slip_url: Option<String>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct OrderView {
    pub order: OrderEntity,
    pub items: Vec<OrderItemEntity>,
}

pub fn delivery_method_for(table_id: Option<i32>) -> DeliveryMethod {
    match table_id {
        Some(_) => DeliveryMethod::Table,
        None => DeliveryMethod::Delivery,
    }
}

fn empty_cart() -> AppError {
    AppError::BadRequest("Cart is empty".into())
}

struct ResolvedSource {
    items: Vec<LineItem>,
    cart_id: Option<i32>,
    table_id: Option<i32>,
}

async fn resolve_stored_cart(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    table_override: Option<i32>,
) -> Result<ResolvedSource, AppError> {
    let cart: CartEntity = carts::table
        .select(CartEntity::as_select())
        .filter(carts::user_id.eq(user_id))
        .for_update()
        .first(conn)
        .await
        .optional()
        .context("Failed to lock cart")?
        .ok_or_else(empty_cart)?;

    let stored: Vec<CartItemEntity> = cart_items::table
        .select(CartItemEntity::as_select())
        .filter(cart_items::cart_id.eq(cart.id))
        .order_by(cart_items::product_id)
        .get_results(conn)
        .await
        .context("Failed to get cart items")?;

    let selected_table = match cart.delivery_method {
        Some(DeliveryMethod::Table) => Some(cart.table_id.ok_or_else(|| {
            AppError::BadRequest("The table selected for this cart no longer exists".into())
        })?),
        Some(DeliveryMethod::Delivery) | None => None,
    };

    Ok(ResolvedSource {
        items: stored
            .into_iter()
            .map(|item| LineItem {
                product_id: item.product_id,
                count: item.count,
                note: item.note,
            })
            .collect(),
        cart_id: Some(cart.id),
        table_id: table_override.or(selected_table),
    })
}

pub async fn place_order(
    conn: &mut AsyncPgConnection,
    request: PlaceOrder,
) -> Result<OrderView, AppError> {
    if let OrderSource::Inline(items) = &request.source {
        line_items::validate(items)?;
    }

    conn.transaction(move |conn| {
        Box::pin(async move {
            let resolved = match request.source {
                OrderSource::Cart => {
                    resolve_stored_cart(conn, request.acting_user_id, request.table_id).await?
                }
                OrderSource::Inline(items) => ResolvedSource {
                    items,
                    cart_id: None,
                    table_id: request.table_id,
                },
            };

            if resolved.items.is_empty() {
                return Err(empty_cart());
            }

            if let Some(table_id) = resolved.table_id {
                tables::occupy_for_order(conn, table_id).await?;
            }

            let requests = line_items::stock_requests(&resolved.items);
            let prices = stock::lock_and_check(conn, &requests).await?;

            let order: OrderEntity = diesel::insert_into(orders::table)
                .values(CreateOrderEntity {
                    user_id: request.acting_user_id,
                    cart_total: cart_total(&resolved.items, &prices),
                    status: OrderStatus::PendingConfirmation,
                    delivery_method: delivery_method_for(resolved.table_id),
                    table_id: resolved.table_id,
                    payment_slip_url: request.payment_slip_url,
                })
                .returning(OrderEntity::as_returning())
                .get_result(conn)
                .await
                .context("Failed to create order")?;

            let new_items: Vec<CreateOrderItemEntity> = resolved
                .items
                .into_iter()
                .map(|item| CreateOrderItemEntity {
                    order_id: order.id,
                    product_id: item.product_id,
                    count: item.count,
                    price: prices.get(&item.product_id).copied().unwrap_or_default(),
                    note: item.note,
                })
                .collect();

            let mut items: Vec<OrderItemEntity> = diesel::insert_into(order_items::table)
                .values(new_items)
                .returning(OrderItemEntity::as_returning())
                .get_results(conn)
                .await
                .context("Failed to create order items")?;
            items.sort_by_key(|item| item.product_id);

            stock::commit_decrement(conn, &requests).await?;

            if let Some(cart_id) = resolved.cart_id {
                diesel::delete(carts::table.find(cart_id))
                    .execute(conn)
                    .await
                    .context("Failed to delete converted cart")?;
            }

            info!(
                "Order #{} placed by user #{}: {} items, total {}, {}",
                order.id,
                order.user_id,
                items.len(),
                order.cart_total,
                order.delivery_method
            );
            Ok(OrderView { order, items })
        })
    })
    .await
}

async fn attach_items(
    conn: &mut AsyncPgConnection,
    orders: Vec<OrderEntity>,
) -> Result<Vec<OrderView>, AppError> {
    let order_ids: Vec<i32> = orders.iter().map(|order| order.id).collect();
    let items: Vec<OrderItemEntity> = order_items::table
        .select(OrderItemEntity::as_select())
        .filter(order_items::order_id.eq_any(&order_ids))
        .order_by((order_items::order_id, order_items::product_id))
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let mut group: HashMap<i32, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        group.entry(item.order_id).or_default().push(item);
    }

    Ok(orders
        .into_iter()
        .map(|order| OrderView {
            items: group.remove(&order.id).unwrap_or_default(),
            order,
        })
        .collect())
}

pub async fn get_order(conn: &mut AsyncPgConnection, order_id: i32) -> Result<OrderView, AppError> {
    let order: OrderEntity = orders::table
        .find(order_id)
        .select(OrderEntity::as_select())
        .first(conn)
        .await
        .optional()
        .context("Failed to get order")?
        .ok_or_else(|| AppError::NotFound(format!("Order #{order_id}")))?;

    let mut views = attach_items(conn, vec![order]).await?;
    views
        .pop()
        .ok_or_else(|| AppError::NotFound(format!("Order #{order_id}")))
}

/// Same as [`get_order`], but hides orders created by someone else.
pub async fn get_order_for_user(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    user_id: i32,
) -> Result<OrderView, AppError> {
    let view = get_order(conn, order_id).await?;
    if view.order.user_id != user_id {
        return Err(AppError::NotFound(format!("Order #{order_id}")));
    }
    Ok(view)
}

pub async fn list_orders(conn: &mut AsyncPgConnection) -> Result<Vec<OrderView>, AppError> {
    let orders: Vec<OrderEntity> = orders::table
        .select(OrderEntity::as_select())
        .order_by(orders::updated_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get orders")?;
    attach_items(conn, orders).await
}

pub async fn list_for_user(
    conn: &mut AsyncPgConnection,
    user_id: i32,
) -> Result<Vec<OrderView>, AppError> {
    let orders: Vec<OrderEntity> = orders::table
        .select(OrderEntity::as_select())
        .filter(orders::user_id.eq(user_id))
        .order_by(orders::updated_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get my orders")?;
    attach_items(conn, orders).await
}

/// Orders the kitchen works on, oldest first.
pub async fn kitchen_queue(conn: &mut AsyncPgConnection) -> Result<Vec<OrderView>, AppError> {
    let orders: Vec<OrderEntity> = orders::table
        .select(OrderEntity::as_select())
        .filter(orders::status.eq_any(KITCHEN_VISIBLE.to_vec()))
        .order_by(orders::created_at.asc())
        .get_results(conn)
        .await
        .context("Failed to get kitchen queue")?;
    attach_items(conn, orders).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_orders_are_served_at_the_table() {
        assert_eq!(delivery_method_for(Some(7)), DeliveryMethod::Table);
    }

    #[test]
    fn orders_without_a_table_are_delivered() {
        assert_eq!(delivery_method_for(None), DeliveryMethod::Delivery);
    }
}
