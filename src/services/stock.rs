//! Stock ledger: per-product on-hand quantity and sold counters.
//!
//! The authoritative path is [`lock_and_check`] followed by
//! [`commit_decrement`] inside the caller's transaction. Product rows are
//! locked in ascending id order so concurrent purchasers of overlapping
//! product sets serialize instead of deadlocking.

use std::collections::HashMap;

use anyhow::{Context, anyhow};
use diesel::{ExpressionMethods, QueryDsl, Selectable, SelectableHelper, prelude::Queryable};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use rust_decimal::Decimal;
use tracing::warn;

use crate::{infra::app_error::AppError, schema::products};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockRequest {
    pub product_id: i32,
    pub count: i32,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StockLevel {
    pub id: i32,
    pub price: Decimal,
    pub quantity: i32,
}

/// Unit price per product id, captured at check time.
pub type PriceSnapshot = HashMap<i32, Decimal>;

/// Verifies every request against `levels`, in request order.
pub fn check_availability(
    levels: &[StockLevel],
    requests: &[StockRequest],
) -> Result<PriceSnapshot, AppError> {
    let by_id: HashMap<i32, &StockLevel> = levels.iter().map(|level| (level.id, level)).collect();
    let mut prices = PriceSnapshot::with_capacity(requests.len());

    for request in requests {
        let level = by_id
            .get(&request.product_id)
            .ok_or_else(|| AppError::NotFound(format!("Product #{}", request.product_id)))?;

        if request.count > level.quantity {
            warn!(
                "Stock check failed for product #{}: requested {}, available {}",
                request.product_id, request.count, level.quantity
            );
            return Err(AppError::StockExceeded {
                product_id: request.product_id,
                available: level.quantity,
                requested: request.count,
            });
        }

        prices.insert(level.id, level.price);
    }

    Ok(prices)
}

fn product_ids(requests: &[StockRequest]) -> Vec<i32> {
    requests.iter().map(|r| r.product_id).collect()
}

/// Advisory check without row locks; the result may be stale by the time it is used.
pub async fn peek(
    conn: &mut AsyncPgConnection,
    requests: &[StockRequest],
) -> Result<PriceSnapshot, AppError> {
    let ids = product_ids(requests);
    let levels: Vec<StockLevel> = products::table
        .select(StockLevel::as_select())
        .filter(products::id.eq_any(&ids))
        .get_results(conn)
        .await
        .context("Failed to read product stock")?;

    check_availability(&levels, requests)
}

/// Locks the requested product rows and re-validates their current quantity.
pub async fn lock_and_check(
    conn: &mut AsyncPgConnection,
    requests: &[StockRequest],
) -> Result<PriceSnapshot, AppError> {
    let ids = product_ids(requests);
    let levels: Vec<StockLevel> = products::table
        .select(StockLevel::as_select())
        .filter(products::id.eq_any(&ids))
        .order_by(products::id)
        .for_update()
        .get_results(conn)
        .await
        .context("Failed to lock product stock")?;

    check_availability(&levels, requests)
}

/// Moves `count` from on-hand to sold for every request.
///
/// Must run in the same transaction as a successful [`lock_and_check`].
pub async fn commit_decrement(
    conn: &mut AsyncPgConnection,
    requests: &[StockRequest],
) -> Result<(), AppError> {
    for request in requests {
        let updated = diesel::update(
            products::table
                .find(request.product_id)
                .filter(products::quantity.ge(request.count)),
        )
        .set((
            products::quantity.eq(products::quantity - request.count),
            products::sold.eq(products::sold + request.count),
            products::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await
        .context("Failed to decrement product stock")?;

        if updated != 1 {
            return Err(AppError::Other(anyhow!(
                "Stock for product #{} changed after it was locked",
                request.product_id
            )));
        }
    }

    Ok(())
}

/// Returns units to on-hand stock. `sold` only ever grows, so it is left as is.
pub async fn restock(
    conn: &mut AsyncPgConnection,
    requests: &[StockRequest],
) -> Result<(), AppError> {
    for request in requests {
        diesel::update(products::table.find(request.product_id))
            .set((
                products::quantity.eq(products::quantity + request.count),
                products::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .await
            .context("Failed to restock product")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(id: i32, price: i64, quantity: i32) -> StockLevel {
        StockLevel {
            id,
            price: Decimal::new(price, 2),
            quantity,
        }
    }

    fn req(product_id: i32, count: i32) -> StockRequest {
        StockRequest { product_id, count }
    }

    #[test]
    fn exact_quantity_is_available() {
        let prices = check_availability(&[level(1, 1250, 3)], &[req(1, 3)]).unwrap();
        assert_eq!(prices[&1], Decimal::new(1250, 2));
    }

    #[test]
    fn shortfall_reports_available_quantity() {
        let err = check_availability(&[level(1, 100, 1)], &[req(1, 2)]).unwrap_err();
        match err {
            AppError::StockExceeded {
                product_id,
                available,
                requested,
            } => {
                assert_eq!((product_id, available, requested), (1, 1, 2));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn first_shortfall_in_request_order_wins() {
        let levels = [level(1, 100, 0), level(2, 100, 0)];
        let err = check_availability(&levels, &[req(2, 1), req(1, 1)]).unwrap_err();
        assert!(matches!(err, AppError::StockExceeded { product_id: 2, .. }));
    }

    #[test]
    fn unknown_product_is_not_found() {
        let err = check_availability(&[level(1, 100, 5)], &[req(9, 1)]).unwrap_err();
        assert_eq!(err.to_string(), "Product #9 not found");
    }

    #[test]
    fn empty_request_needs_no_stock() {
        assert!(check_availability(&[], &[]).unwrap().is_empty());
    }
}
