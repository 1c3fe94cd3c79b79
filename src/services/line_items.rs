use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{infra::app_error::AppError, services::stock::StockRequest};

pub const MAX_NOTE_LEN: usize = 500;

/// One product selection in a cart save or a walk-in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LineItem {
    pub product_id: i32,
    pub count: i32,
    pub note: Option<String>,
}

/// Rejects non-positive counts, repeated products and oversized notes.
pub fn validate(items: &[LineItem]) -> Result<(), AppError> {
    let mut seen = HashSet::with_capacity(items.len());

    for item in items {
        if item.count < 1 {
            return Err(AppError::BadRequest(format!(
                "Count for product #{} must be at least 1",
                item.product_id
            )));
        }
        if !seen.insert(item.product_id) {
            return Err(AppError::BadRequest(format!(
                "Product #{} appears more than once",
                item.product_id
            )));
        }
        if item
            .note
            .as_ref()
            .is_some_and(|note| note.chars().count() > MAX_NOTE_LEN)
        {
            return Err(AppError::BadRequest(format!(
                "Note for product #{} exceeds {} characters",
                item.product_id, MAX_NOTE_LEN
            )));
        }
    }

    Ok(())
}

pub fn stock_requests(items: &[LineItem]) -> Vec<StockRequest> {
    items
        .iter()
        .map(|item| StockRequest {
            product_id: item.product_id,
            count: item.count,
        })
        .collect()
}
