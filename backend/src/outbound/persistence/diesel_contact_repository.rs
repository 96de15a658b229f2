//! PostgreSQL-backed `ContactRepository` implementation using Diesel ORM.
//!
//! Both writes are single `INSERT .. ON CONFLICT .. DO UPDATE` statements on
//! the `(project_id, contact_type)` key, so concurrent resets collapse into
//! one row without an explicit transaction.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{ContactRepository, ContactRepositoryError};
use crate::domain::{Contact, ContactStatus, ContactType, Credential, ProjectId};

use super::diesel_basic_error_mapping::{corrupt_row, map_basic_diesel_error, map_basic_pool_error};
use super::models::ContactRow;
use super::pool::{DbPool, PoolError};
use super::schema::contacts;

/// Diesel-backed implementation of the `ContactRepository` port.
#[derive(Clone)]
pub struct DieselContactRepository {
    pool: DbPool,
}

impl DieselContactRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> ContactRepositoryError {
    map_basic_pool_error(error, ContactRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> ContactRepositoryError {
    map_basic_diesel_error(
        error,
        ContactRepositoryError::query,
        ContactRepositoryError::connection,
    )
}

fn to_domain(row: ContactRow) -> Result<Contact, ContactRepositoryError> {
    Contact::try_from(row).map_err(|err| ContactRepositoryError::query(corrupt_row(&err)))
}

#[async_trait]
impl ContactRepository for DieselContactRepository {
    async fn request_reset(
        &self,
        project_id: &ProjectId,
        contact_type: ContactType,
    ) -> Result<Contact, ContactRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = ContactRow {
            project_id: project_id.as_str().to_owned(),
            contact_type: contact_type.as_str().to_owned(),
            status: ContactStatus::Modified.as_str().to_owned(),
            depth: None,
        };
        let stored: ContactRow = diesel::insert_into(contacts::table)
            .values(&row)
            .on_conflict((contacts::project_id, contacts::contact_type))
            .do_update()
            .set((
                contacts::status.eq(excluded(contacts::status)),
                contacts::depth.eq(None::<String>),
            ))
            .returning(ContactRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        to_domain(stored)
    }

    async fn record_credential(
        &self,
        project_id: &ProjectId,
        contact_type: ContactType,
        credential: &Credential,
    ) -> Result<Contact, ContactRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = ContactRow {
            project_id: project_id.as_str().to_owned(),
            contact_type: contact_type.as_str().to_owned(),
            status: ContactStatus::New.as_str().to_owned(),
            depth: Some(credential.expose().to_owned()),
        };
        let stored: ContactRow = diesel::insert_into(contacts::table)
            .values(&row)
            .on_conflict((contacts::project_id, contacts::contact_type))
            .do_update()
            .set(contacts::depth.eq(excluded(contacts::depth)))
            .returning(ContactRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        to_domain(stored)
    }

    async fn list_ready(&self) -> Result<Vec<Contact>, ContactRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<ContactRow> = contacts::table
            .filter(contacts::depth.is_not_null())
            .order((contacts::project_id.asc(), contacts::contact_type.asc()))
            .select(ContactRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(to_domain).collect()
    }

    async fn find(
        &self,
        project_id: &ProjectId,
        contact_type: ContactType,
    ) -> Result<Option<Contact>, ContactRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<ContactRow> = contacts::table
            .filter(contacts::project_id.eq(project_id.as_str()))
            .filter(contacts::contact_type.eq(contact_type.as_str()))
            .select(ContactRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(to_domain).transpose()
    }

    async fn remove_delivered(
        &self,
        project_id: &ProjectId,
        contact_type: ContactType,
        delivered: &Credential,
    ) -> Result<bool, ContactRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let removed = diesel::delete(
            contacts::table
                .filter(contacts::project_id.eq(project_id.as_str()))
                .filter(contacts::contact_type.eq(contact_type.as_str()))
                .filter(contacts::depth.eq(delivered.expose())),
        )
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(removed > 0)
    }
}
