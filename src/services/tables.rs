//! Table occupancy. Three writers flip a table's status: reservation
//! confirmation/cancellation, order placement, and the manual staff toggle.

use anyhow::Context;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::info;

use crate::{
    infra::app_error::AppError,
    models::{CreateDiningTableEntity, DiningTableEntity, ReservationStatus, TableStatus},
    schema::dining_tables,
};

/// Status a table must take when an order targets it, if it changes at all.
pub fn transition_for_order(current: TableStatus) -> Option<TableStatus> {
    match current {
        TableStatus::Available => Some(TableStatus::Occupied),
        TableStatus::Occupied => None,
    }
}

/// Status a table must take when one of its reservations moves to `next`.
///
/// `other_active` tells whether another confirmed reservation currently holds the table.
pub fn transition_for_reservation(
    current: TableStatus,
    next: ReservationStatus,
    other_active: bool,
) -> Option<TableStatus> {
    let target = match next {
        ReservationStatus::Confirmed => TableStatus::Occupied,
        ReservationStatus::Cancelled if other_active => return None,
        ReservationStatus::Cancelled => TableStatus::Available,
        ReservationStatus::Pending => return None,
    };

    (target != current).then_some(target)
}

/// Loads and row-locks a table for the rest of the transaction.
pub async fn lock(conn: &mut AsyncPgConnection, table_id: i32) -> Result<DiningTableEntity, AppError> {
    dining_tables::table
        .find(table_id)
        .select(DiningTableEntity::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()
        .context("Failed to lock table")?
        .ok_or_else(|| AppError::NotFound(format!("Table #{table_id}")))
}

/// Writes `status` to a table already locked by the caller.
pub async fn write_status(
    conn: &mut AsyncPgConnection,
    table_id: i32,
    status: TableStatus,
) -> Result<DiningTableEntity, AppError> {
    let table = diesel::update(dining_tables::table.find(table_id))
        .set((
            dining_tables::status.eq(status),
            dining_tables::updated_at.eq(diesel::dsl::now),
        ))
        .returning(DiningTableEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to update table status")?;

    info!("Table #{} is now {}", table.table_number, status);
    Ok(table)
}

/// Occupies a free table for an incoming order; an occupied table stays occupied.
pub async fn occupy_for_order(
    conn: &mut AsyncPgConnection,
    table_id: i32,
) -> Result<DiningTableEntity, AppError> {
    let table = lock(conn, table_id).await?;
    match transition_for_order(table.status) {
        Some(next) => write_status(conn, table.id, next).await,
        None => Ok(table),
    }
}

/// Manual staff toggle.
pub async fn set_status(
    conn: &mut AsyncPgConnection,
    table_id: i32,
    status: TableStatus,
) -> Result<DiningTableEntity, AppError> {
    conn.transaction(move |conn| {
        Box::pin(async move {
            let table = lock(conn, table_id).await?;
            if table.status == status {
                return Ok(table);
            }
            write_status(conn, table.id, status).await
        })
    })
    .await
}

pub async fn create(
    conn: &mut AsyncPgConnection,
    new_table: CreateDiningTableEntity,
) -> Result<DiningTableEntity, AppError> {
    if new_table.capacity < 1 {
        return Err(AppError::BadRequest("Table capacity must be at least 1".into()));
    }

    let exists: i64 = dining_tables::table
        .filter(dining_tables::table_number.eq(new_table.table_number))
        .count()
        .get_result(conn)
        .await
        .context("Failed to check table number")?;
    if exists > 0 {
        return Err(AppError::BadRequest(format!(
            "Table number {} is already in use",
            new_table.table_number
        )));
    }

    let table = diesel::insert_into(dining_tables::table)
        .values(new_table)
        .returning(DiningTableEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create table")?;

    info!("Created table #{} seating {}", table.table_number, table.capacity);
    Ok(table)
}

pub async fn list(conn: &mut AsyncPgConnection) -> Result<Vec<DiningTableEntity>, AppError> {
    let tables = dining_tables::table
        .select(DiningTableEntity::as_select())
        .order_by(dining_tables::table_number)
        .get_results(conn)
        .await
        .context("Failed to get tables")?;
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_occupies_available_table() {
        assert_eq!(
            transition_for_order(TableStatus::Available),
            Some(TableStatus::Occupied)
        );
    }

    #[test]
    fn order_at_occupied_table_leaves_it_occupied() {
        assert_eq!(transition_for_order(TableStatus::Occupied), None);
    }

    #[test]
    fn confirmation_occupies_the_table() {
        assert_eq!(
            transition_for_reservation(TableStatus::Available, ReservationStatus::Confirmed, false),
            Some(TableStatus::Occupied)
        );
        assert_eq!(
            transition_for_reservation(TableStatus::Occupied, ReservationStatus::Confirmed, false),
            None
        );
    }

    #[test]
    fn cancellation_frees_the_table_unless_another_booking_holds_it() {
        assert_eq!(
            transition_for_reservation(TableStatus::Occupied, ReservationStatus::Cancelled, false),
            Some(TableStatus::Available)
        );
        assert_eq!(
            transition_for_reservation(TableStatus::Occupied, ReservationStatus::Cancelled, true),
            None
        );
    }

    #[test]
    fn moving_back_to_pending_does_not_touch_the_table() {
        for current in TableStatus::ALL {
            assert_eq!(
                transition_for_reservation(*current, ReservationStatus::Pending, false),
                None
            );
        }
    }
}
