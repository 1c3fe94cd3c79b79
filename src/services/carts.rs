//! Cart aggregate.
//!
//! Saving a cart is a TOTAL REPLACE: the submitted item list becomes the whole
//! cart and anything not in it is dropped. Callers that want to add one item
//! must resend the full list. Stock checks here are advisory; the binding
//! check happens again when the cart is converted into an order.

use anyhow::Context;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    infra::app_error::AppError,
    models::{CartEntity, CartItemEntity, CreateCartEntity, CreateCartItemEntity, DeliveryMethod},
    schema::{cart_items, carts, dining_tables},
    services::{
        line_items::{self, LineItem},
        stock::{self, PriceSnapshot},
    },
};

#[derive(Serialize, ToSchema, Debug)]
pub struct CartView {
    pub cart: CartEntity,
    pub items: Vec<CartItemEntity>,
}

/// Σ(price × count) over `items`, using the captured unit prices.
pub fn cart_total(items: &[LineItem], prices: &PriceSnapshot) -> Decimal {
    items
        .iter()
        .map(|item| {
            let price = prices.get(&item.product_id).copied().unwrap_or_default();
            price * Decimal::from(item.count)
        })
        .sum()
}

async fn load_items(
    conn: &mut AsyncPgConnection,
    cart_id: i32,
) -> Result<Vec<CartItemEntity>, AppError> {
    let items = cart_items::table
        .select(CartItemEntity::as_select())
        .filter(cart_items::cart_id.eq(cart_id))
        .order_by(cart_items::product_id)
        .get_results(conn)
        .await
        .context("Failed to get cart items")?;
    Ok(items)
}

pub async fn find_cart(
    conn: &mut AsyncPgConnection,
    user_id: i32,
) -> Result<Option<CartEntity>, AppError> {
    let cart = carts::table
        .select(CartEntity::as_select())
        .filter(carts::user_id.eq(user_id))
        .first(conn)
        .await
        .optional()
        .context("Failed to get cart")?;
    Ok(cart)
}

pub async fn get_cart(conn: &mut AsyncPgConnection, user_id: i32) -> Result<CartView, AppError> {
    let cart = find_cart(conn, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Active cart".into()))?;
    let items = load_items(conn, cart.id).await?;
    Ok(CartView { cart, items })
}

/// Deletes the user's cart and its items. Returns whether a cart existed.
pub async fn delete_cart(conn: &mut AsyncPgConnection, user_id: i32) -> Result<bool, AppError> {
    let deleted = diesel::delete(carts::table.filter(carts::user_id.eq(user_id)))
        .execute(conn)
        .await
        .context("Failed to delete cart")?;
    Ok(deleted > 0)
}

/// Replaces the user's cart with `items`. An empty list deletes the cart.
pub async fn save_cart(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    items: Vec<LineItem>,
) -> Result<Option<CartView>, AppError> {
    line_items::validate(&items)?;

    if items.is_empty() {
        delete_cart(conn, user_id).await?;
        info!("Cart of user #{} cleared", user_id);
        return Ok(None);
    }

    conn.transaction(move |conn| {
        Box::pin(async move {
            let prices = stock::peek(conn, &line_items::stock_requests(&items)).await?;
            let cart_total = cart_total(&items, &prices);

            let cart: CartEntity = diesel::insert_into(carts::table)
                .values(CreateCartEntity {
                    user_id,
                    cart_total,
                })
                .on_conflict(carts::user_id)
                .do_update()
                .set((
                    carts::cart_total.eq(cart_total),
                    carts::updated_at.eq(diesel::dsl::now),
                ))
                .returning(CartEntity::as_returning())
                .get_result(conn)
                .await
                .context("Failed to upsert cart")?;

            diesel::delete(cart_items::table.filter(cart_items::cart_id.eq(cart.id)))
                .execute(conn)
                .await
                .context("Failed to clear cart items")?;

            let new_items: Vec<CreateCartItemEntity> = items
                .into_iter()
                .map(|item| CreateCartItemEntity {
                    cart_id: cart.id,
                    product_id: item.product_id,
                    count: item.count,
                    price: prices.get(&item.product_id).copied().unwrap_or_default(),
                    note: item.note,
                })
                .collect();

            let mut items: Vec<CartItemEntity> = diesel::insert_into(cart_items::table)
                .values(new_items)
                .returning(CartItemEntity::as_returning())
                .get_results(conn)
                .await
                .context("Failed to create cart items")?;
            items.sort_by_key(|item| item.product_id);

            info!(
                "Cart #{} of user #{} saved with {} items, total {}",
                cart.id,
                user_id,
                items.len(),
                cart.cart_total
            );
            Ok::<Option<CartView>, AppError>(Some(CartView { cart, items }))
        })
    })
    .await
}

/// Chooses how the cart will be fulfilled. `TABLE` requires an existing table.
pub async fn set_delivery_option(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    method: DeliveryMethod,
    table_id: Option<i32>,
) -> Result<CartView, AppError> {
    let table_id = match method {
        DeliveryMethod::Table => Some(table_id.ok_or_else(|| {
            AppError::BadRequest("A table is required for TABLE delivery".into())
        })?),
        DeliveryMethod::Delivery => None,
    };

    conn.transaction(move |conn| {
        Box::pin(async move {
            let cart = find_cart(conn, user_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Active cart".into()))?;

            if let Some(table_id) = table_id {
                let exists: bool =
                    diesel::select(diesel::dsl::exists(dining_tables::table.find(table_id)))
                        .get_result(conn)
                        .await
                        .context("Failed to check table")?;
                if !exists {
                    return Err(AppError::NotFound(format!("Table #{table_id}")));
                }
            }

            let cart: CartEntity = diesel::update(carts::table.find(cart.id))
                .set((
                    carts::delivery_method.eq(Some(method)),
                    carts::table_id.eq(table_id),
                    carts::updated_at.eq(diesel::dsl::now),
                ))
                .returning(CartEntity::as_returning())
                .get_result(conn)
                .await
                .context("Failed to update delivery option")?;

            let items = load_items(conn, cart.id).await?;
            Ok(CartView { cart, items })
        })
    })
    .await
}
