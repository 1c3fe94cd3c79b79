//! Reservation scheduler: validates a requested slot, allocates a table
//! interval, and lets an admin confirm or cancel.
//!
//! Invariant: per table, PENDING and CONFIRMED reservations never overlap.
//! Writers lock the table row before checking for overlaps, so two
//! concurrent requests for the same table serialize.

use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, Utc};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    infra::app_error::AppError,
    models::{
        CreateReservationEntity, DiningTableEntity, ReservationEntity, ReservationStatus,
        TableStatus,
    },
    schema::reservations,
    services::{
        schedule::{Interval, SchedulePolicy},
        tables,
    },
};

#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub user_id: i32,
    pub table_id: i32,
    pub start: DateTime<Utc>,
    pub guests: i32,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct TableAvailability {
    pub table: DiningTableEntity,
    pub is_available_now: bool,
}

pub fn check_capacity(table: &DiningTableEntity, guests: i32) -> Result<(), AppError> {
    if guests < 1 {
        return Err(AppError::BadRequest(
            "Number of guests must be at least 1".into(),
        ));
    }
    if guests > table.capacity {
        return Err(AppError::BadRequest(format!(
            "Table #{} seats at most {} guests",
            table.table_number, table.capacity
        )));
    }
    Ok(())
}

/// A table is free right now iff it is marked available and no confirmed
/// reservation covers `now`.
pub fn is_available_now(status: TableStatus, confirmed: &[Interval], now: DateTime<Utc>) -> bool {
    status == TableStatus::Available && !confirmed.iter().any(|slot| slot.contains(now))
}

fn interval_of(reservation: &ReservationEntity) -> Interval {
    Interval::new(
        reservation.reservation_time,
        reservation.reservation_end_time,
    )
}

/// Counts live reservations on `table_id` overlapping `interval`, ignoring `exclude`.
async fn count_overlapping(
    conn: &mut AsyncPgConnection,
    table_id: i32,
    interval: Interval,
    exclude: Option<i32>,
) -> Result<i64, AppError> {
    let mut query = reservations::table
        .filter(reservations::table_id.eq(table_id))
        .filter(reservations::status.ne(ReservationStatus::Cancelled))
        .filter(reservations::reservation_time.lt(interval.end))
        .filter(reservations::reservation_end_time.gt(interval.start))
        .into_boxed();

    if let Some(id) = exclude {
        query = query.filter(reservations::id.ne(id));
    }

    let count = query
        .count()
        .get_result(conn)
        .await
        .context("Failed to check overlapping reservations")?;
    Ok(count)
}

fn overlap_conflict(table: &DiningTableEntity) -> AppError {
    warn!("Overlapping reservation rejected for table #{}", table.table_number);
    AppError::ScheduleConflict {
        reason: format!(
            "Table #{} is already reserved for part of that time",
            table.table_number
        ),
        boundary: None,
    }
}

pub async fn create_reservation(
    conn: &mut AsyncPgConnection,
    policy: &SchedulePolicy,
    request: ReservationRequest,
    now: DateTime<Utc>,
) -> Result<ReservationEntity, AppError> {
    let interval = policy.validate_start(request.start, now)?;

    conn.transaction(move |conn| {
        Box::pin(async move {
            let table = tables::lock(conn, request.table_id).await?;
            check_capacity(&table, request.guests)?;

            if count_overlapping(conn, table.id, interval, None).await? > 0 {
                return Err(overlap_conflict(&table));
            }

            let reservation = diesel::insert_into(reservations::table)
                .values(CreateReservationEntity {
                    table_id: Some(table.id),
                    user_id: request.user_id,
                    reservation_time: interval.start,
                    reservation_end_time: interval.end,
                    number_of_guests: request.guests,
                    status: ReservationStatus::Pending,
                })
                .returning(ReservationEntity::as_returning())
                .get_result(conn)
                .await
                .context("Failed to create reservation")?;

            info!(
                "Reservation #{} created for table #{} from {} to {}",
                reservation.id, table.table_number, interval.start, interval.end
            );
            Ok(reservation)
        })
    })
    .await
}

/// Admin confirm/cancel. Updates the reservation and drives its table in one transaction.
pub async fn update_status(
    conn: &mut AsyncPgConnection,
    reservation_id: i32,
    next: ReservationStatus,
    now: DateTime<Utc>,
) -> Result<ReservationEntity, AppError> {
    conn.transaction(move |conn| {
        Box::pin(async move {
            let table_id: Option<i32> = reservations::table
                .find(reservation_id)
                .select(reservations::table_id)
                .first(conn)
                .await
                .optional()
                .context("Failed to get reservation")?
                .ok_or_else(|| AppError::NotFound(format!("Reservation #{reservation_id}")))?;

            let table = match table_id {
                Some(table_id) => Some(tables::lock(conn, table_id).await?),
                None => None,
            };

            // Re-read under the table lock so the status reflects any writer we waited on.
            let current: ReservationEntity = reservations::table
                .find(reservation_id)
                .select(ReservationEntity::as_select())
                .for_update()
                .first(conn)
                .await
                .optional()
                .context("Failed to lock reservation")?
                .ok_or_else(|| AppError::NotFound(format!("Reservation #{reservation_id}")))?;

            let reopening = current.status == ReservationStatus::Cancelled
                && next != ReservationStatus::Cancelled;
            if let (true, Some(table)) = (reopening, &table) {
                let overlapping =
                    count_overlapping(conn, table.id, interval_of(&current), Some(current.id))
                        .await?;
                if overlapping > 0 {
                    return Err(overlap_conflict(table));
                }
            }

            let updated: ReservationEntity = diesel::update(reservations::table.find(current.id))
                .set((
                    reservations::status.eq(next),
                    reservations::updated_at.eq(diesel::dsl::now),
                ))
                .returning(ReservationEntity::as_returning())
                .get_result(conn)
                .await
                .context("Failed to update reservation status")?;

            if let Some(table) = table {
                let other_active = next == ReservationStatus::Cancelled
                    && other_confirmed_now(conn, table.id, updated.id, now).await?;

                if let Some(status) =
                    tables::transition_for_reservation(table.status, next, other_active)
                {
                    tables::write_status(conn, table.id, status).await?;
                }
            }

            info!(
                "Reservation #{} moved from {} to {}",
                updated.id, current.status, updated.status
            );
            Ok(updated)
        })
    })
    .await
}

async fn other_confirmed_now(
    conn: &mut AsyncPgConnection,
    table_id: i32,
    exclude: i32,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    let count: i64 = reservations::table
        .filter(reservations::table_id.eq(table_id))
        .filter(reservations::id.ne(exclude))
        .filter(reservations::status.eq(ReservationStatus::Confirmed))
        .filter(reservations::reservation_time.le(now))
        .filter(reservations::reservation_end_time.gt(now))
        .count()
        .get_result(conn)
        .await
        .context("Failed to check active reservations")?;
    Ok(count > 0)
}

/// Derived read: every table with whether it can take a walk-in right now.
pub async fn current_table_availability(
    conn: &mut AsyncPgConnection,
    now: DateTime<Utc>,
) -> Result<Vec<TableAvailability>, AppError> {
    let all_tables = tables::list(conn).await?;

    let confirmed: Vec<ReservationEntity> = reservations::table
        .select(ReservationEntity::as_select())
        .filter(reservations::status.eq(ReservationStatus::Confirmed))
        .filter(reservations::reservation_end_time.gt(now))
        .get_results(conn)
        .await
        .context("Failed to get confirmed reservations")?;

    let mut by_table: HashMap<i32, Vec<Interval>> = HashMap::new();
    for reservation in &confirmed {
        if let Some(table_id) = reservation.table_id {
            by_table
                .entry(table_id)
                .or_default()
                .push(interval_of(reservation));
        }
    }

    Ok(all_tables
        .into_iter()
        .map(|table| {
            let slots = by_table.get(&table.id).map(Vec::as_slice).unwrap_or_default();
            TableAvailability {
                is_available_now: is_available_now(table.status, slots, now),
                table,
            }
        })
        .collect())
}

pub async fn list_all(conn: &mut AsyncPgConnection) -> Result<Vec<ReservationEntity>, AppError> {
    let rows = reservations::table
        .select(ReservationEntity::as_select())
        .order_by(reservations::reservation_time.desc())
        .get_results(conn)
        .await
        .context("Failed to get reservations")?;
    Ok(rows)
}

pub async fn list_for_user(
    conn: &mut AsyncPgConnection,
    user_id: i32,
) -> Result<Vec<ReservationEntity>, AppError> {
    let rows = reservations::table
        .select(ReservationEntity::as_select())
        .filter(reservations::user_id.eq(user_id))
        .order_by(reservations::reservation_time.desc())
        .get_results(conn)
        .await
        .context("Failed to get my reservations")?;
    Ok(rows)
}
