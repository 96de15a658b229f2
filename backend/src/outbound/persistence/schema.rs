//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly. Regenerate
//! with `diesel print-schema` after changing a migration.

diesel::table! {
    /// Staging requests.
    ///
    /// A partial unique index on `(dataset_id, transfer_type) WHERE NOT
    /// should_delete` keeps at most one live request per pair.
    download_requests (id) {
        /// Generated primary key.
        id -> Int8,
        /// LIMS dataset identifier.
        dataset_id -> Varchar,
        /// Owning project.
        project_id -> Varchar,
        /// `HTTP`, `SFTP` or `GLOBUS`.
        transfer_type -> Varchar,
        /// `REQUESTED`, `PENDING`, `QUEUED`, `SUCCESS` or `FAILED`.
        status -> Varchar,
        /// Who asked for the staging.
        requester -> Varchar,
        /// Creation instant.
        creation_date -> Timestamptz,
        /// Set when staging succeeded.
        completion_date -> Nullable<Timestamptz>,
        /// End of the staging window.
        expiry_date -> Nullable<Timestamptz>,
        /// Set when staging failed.
        failure_date -> Nullable<Timestamptz>,
        /// Last outcome notice sent.
        notification_date -> Nullable<Timestamptz>,
        /// Flagged for teardown.
        should_delete -> Bool,
        /// Cancelled upstream.
        is_cancelled -> Bool,
    }
}

diesel::table! {
    /// Files staged for a dataset, unique per `(dataset_id, source)`.
    download_files (dataset_id, source) {
        /// LIMS dataset identifier.
        dataset_id -> Varchar,
        /// Path in the LIMS storage.
        source -> Text,
        /// Path on the staging medium.
        destination -> Text,
    }
}

diesel::table! {
    /// Pending credential deliveries.
    contacts (project_id, contact_type) {
        /// Project the credential is for.
        project_id -> Varchar,
        /// `SFTP` or `GLOBUS`.
        contact_type -> Varchar,
        /// `NEW` or `MODIFIED`.
        status -> Varchar,
        /// Undelivered credential; null while generation is pending.
        depth -> Nullable<Text>,
    }
}

diesel::table! {
    /// Singleton row of staging constants.
    staging_constants (id) {
        /// Always 1.
        id -> Int2,
        /// Days a successful staging stays available.
        expiry_days -> Int4,
        /// Globus project quota in bytes.
        globus_project_size -> Int8,
        /// SFTP project quota in bytes.
        sftp_project_size -> Int8,
    }
}

diesel::table! {
    /// Singleton row of change-feed watermarks.
    notification_watermarks (id) {
        /// Always 1.
        id -> Int2,
        /// Released feed watermark.
        last_released -> Nullable<Timestamptz>,
        /// Validated feed watermark.
        last_validated -> Nullable<Timestamptz>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(download_requests, download_files);
