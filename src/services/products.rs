//! Menu maintenance. Price changes here never touch the prices already
//! captured on carts and orders.

use anyhow::Context;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use rust_decimal::Decimal;
use tracing::info;

use crate::{
    infra::app_error::AppError,
    models::{CreateProductEntity, ProductEntity, UpdateProductEntity},
    schema::products,
};

fn check_price(price: Decimal) -> Result<(), AppError> {
    if price.is_sign_negative() {
        return Err(AppError::BadRequest("Price cannot be negative".into()));
    }
    Ok(())
}

fn check_quantity(quantity: i32) -> Result<(), AppError> {
    if quantity < 0 {
        return Err(AppError::BadRequest("Quantity cannot be negative".into()));
    }
    Ok(())
}

fn check_title(title: &str) -> Result<(), AppError> {
    if title.trim().is_empty() {
        return Err(AppError::BadRequest("Title cannot be empty".into()));
    }
    Ok(())
}

pub fn validate_new(product: &CreateProductEntity) -> Result<(), AppError> {
    check_title(&product.title)?;
    check_price(product.price)?;
    check_quantity(product.quantity)
}

pub fn validate_changes(changes: &UpdateProductEntity) -> Result<(), AppError> {
    if changes.title.is_none()
        && changes.price.is_none()
        && changes.quantity.is_none()
        && changes.category_id.is_none()
    {
        return Err(AppError::BadRequest("Nothing to update".into()));
    }
    if let Some(title) = &changes.title {
        check_title(title)?;
    }
    if let Some(price) = changes.price {
        check_price(price)?;
    }
    if let Some(quantity) = changes.quantity {
        check_quantity(quantity)?;
    }
    Ok(())
}

pub async fn list(conn: &mut AsyncPgConnection) -> Result<Vec<ProductEntity>, AppError> {
    let products = products::table
        .select(ProductEntity::as_select())
        .order_by(products::id)
        .get_results(conn)
        .await
        .context("Failed to get products")?;
    Ok(products)
}

pub async fn create(
    conn: &mut AsyncPgConnection,
    product: CreateProductEntity,
) -> Result<ProductEntity, AppError> {
    validate_new(&product)?;

    let product: ProductEntity = diesel::insert_into(products::table)
        .values(product)
        .returning(ProductEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create product")?;

    info!("Created product #{} ({})", product.id, product.title);
    Ok(product)
}

pub async fn update(
    conn: &mut AsyncPgConnection,
    product_id: i32,
    changes: UpdateProductEntity,
) -> Result<ProductEntity, AppError> {
    validate_changes(&changes)?;

    let product = diesel::update(products::table.find(product_id))
        .set((changes, products::updated_at.eq(diesel::dsl::now)))
        .returning(ProductEntity::as_returning())
        .get_result(conn)
        .await
        .optional()
        .context("Failed to update product")?
        .ok_or_else(|| AppError::NotFound(format!("Product #{product_id}")))?;

    info!("Updated product #{}", product_id);
    Ok(product)
}
