//! PostgreSQL-backed `NotificationWatermarkRepository` using Diesel ORM.
//!
//! Watermarks live in a singleton row (`id = 1`). Advancing is a conditional
//! update, so a watermark never moves backwards even if two writers race.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{NotificationWatermarkRepository, NotificationWatermarkRepositoryError};
use crate::domain::{NotificationKind, NotificationWatermarks};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::WatermarkRow;
use super::pool::{DbPool, PoolError};
use super::schema::notification_watermarks;

const SINGLETON_ID: i16 = 1;

/// Diesel-backed implementation of the `NotificationWatermarkRepository` port.
#[derive(Clone)]
pub struct DieselNotificationWatermarkRepository {
    pool: DbPool,
}

impl DieselNotificationWatermarkRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> NotificationWatermarkRepositoryError {
    map_basic_pool_error(error, NotificationWatermarkRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> NotificationWatermarkRepositoryError {
    map_basic_diesel_error(
        error,
        NotificationWatermarkRepositoryError::query,
        NotificationWatermarkRepositoryError::connection,
    )
}

#[async_trait]
impl NotificationWatermarkRepository for DieselNotificationWatermarkRepository {
    async fn load(&self) -> Result<NotificationWatermarks, NotificationWatermarkRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<WatermarkRow> = notification_watermarks::table
            .filter(notification_watermarks::id.eq(SINGLETON_ID))
            .select(WatermarkRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map_or_else(NotificationWatermarks::default, |row| {
            NotificationWatermarks {
                last_released: row.last_released,
                last_validated: row.last_validated,
            }
        }))
    }

    async fn advance(
        &self,
        kind: NotificationKind,
        to: DateTime<Utc>,
    ) -> Result<(), NotificationWatermarkRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        diesel::insert_into(notification_watermarks::table)
            .values(notification_watermarks::id.eq(SINGLETON_ID))
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        let singleton =
            notification_watermarks::table.filter(notification_watermarks::id.eq(SINGLETON_ID));
        let updated = match kind {
            NotificationKind::Released => {
                diesel::update(singleton.filter(
                    notification_watermarks::last_released
                        .is_null()
                        .or(notification_watermarks::last_released.lt(to)),
                ))
                .set(notification_watermarks::last_released.eq(Some(to)))
                .execute(&mut conn)
                .await
            }
            NotificationKind::Validated => {
                diesel::update(singleton.filter(
                    notification_watermarks::last_validated
                        .is_null()
                        .or(notification_watermarks::last_validated.lt(to)),
                ))
                .set(notification_watermarks::last_validated.eq(Some(to)))
                .execute(&mut conn)
                .await
            }
        };
        updated.map(|_| ()).map_err(map_diesel_error)
    }
}
