//! Database operations for the `machines` table.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use vendmap_core::{
    Category, Coordinate, FilterState, ImagePatch, ImageRef, Machine, MachinePatch, NewMachine,
    OperatingStatus, PaymentMethod,
};
use vendmap_sync::{Ordering, StoreError};

use crate::DbError;

/// Channel the `machines_changed` trigger notifies on. The payload is the
/// collection name of the changed row.
pub const NOTIFY_CHANNEL: &str = "machines_changed";

const SELECT_COLUMNS: &str = "SELECT id, latitude, longitude, description, category, status, \
     payment_methods, image_url, thumbnail_url, image_uploaded_at, last_updated \
     FROM machines";

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `machines` table. Enumerated columns hold their wire form.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MachineRow {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
    pub category: String,
    pub status: String,
    pub payment_methods: Vec<String>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub image_uploaded_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl MachineRow {
    /// Convert into the domain record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] when an enumerated column holds an
    /// unknown value or the image columns are only partly set.
    pub fn into_machine(self) -> Result<Machine, StoreError> {
        let malformed = |reason: String| StoreError::Malformed {
            id: self.id.clone(),
            reason,
        };

        let category = self
            .category
            .parse::<Category>()
            .map_err(|e| malformed(e.to_string()))?;
        let status = self
            .status
            .parse::<OperatingStatus>()
            .map_err(|e| malformed(e.to_string()))?;
        let payment_methods = self
            .payment_methods
            .iter()
            .map(|m| m.parse::<PaymentMethod>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| malformed(e.to_string()))?;

        let image = match (self.image_url, self.thumbnail_url, self.image_uploaded_at) {
            (Some(image_url), Some(thumbnail_url), Some(uploaded_at)) => Some(ImageRef {
                image_url,
                thumbnail_url,
                uploaded_at,
            }),
            (None, None, None) => None,
            _ => return Err(malformed("image columns are only partly set".to_string())),
        };

        Ok(Machine {
            id: self.id,
            coordinate: Coordinate::new(self.latitude, self.longitude),
            description: self.description,
            category,
            status,
            payment_methods,
            last_updated: self.last_updated,
            image,
        })
    }
}

impl From<&Machine> for MachineRow {
    fn from(machine: &Machine) -> Self {
        let image = machine.image.as_ref();
        Self {
            id: machine.id.clone(),
            latitude: machine.coordinate.latitude,
            longitude: machine.coordinate.longitude,
            description: machine.description.clone(),
            category: machine.category.as_str().to_string(),
            status: machine.status.as_str().to_string(),
            payment_methods: wire_methods(&machine.payment_methods),
            image_url: image.map(|i| i.image_url.clone()),
            thumbnail_url: image.map(|i| i.thumbnail_url.clone()),
            image_uploaded_at: image.map(|i| i.uploaded_at),
            last_updated: machine.last_updated,
        }
    }
}

fn wire_methods(methods: &[PaymentMethod]) -> Vec<String> {
    methods.iter().map(|m| m.as_str().to_string()).collect()
}

fn order_clause(order: Ordering) -> &'static str {
    match order {
        Ordering::LastUpdatedDesc => " ORDER BY last_updated DESC, id ASC",
        Ordering::LastUpdatedAsc => " ORDER BY last_updated ASC, id ASC",
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Inserts a machine and returns the generated id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn insert_machine(
    pool: &PgPool,
    collection: &str,
    machine: &NewMachine,
) -> Result<String, DbError> {
    let id = sqlx::query_scalar::<_, String>(
        "INSERT INTO machines \
             (collection, latitude, longitude, description, category, status, payment_methods) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING id",
    )
    .bind(collection)
    .bind(machine.coordinate.latitude)
    .bind(machine.coordinate.longitude)
    .bind(&machine.description)
    .bind(machine.category.as_str())
    .bind(machine.status.as_str())
    .bind(wire_methods(&machine.payment_methods))
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Applies the present fields of `patch` and stamps `last_updated`.
///
/// Returns the number of rows touched (0 or 1).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn update_machine(
    pool: &PgPool,
    collection: &str,
    id: &str,
    patch: &MachinePatch,
) -> Result<u64, DbError> {
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE machines SET last_updated = clock_timestamp()");

    if let Some(coordinate) = patch.coordinate {
        qb.push(", latitude = ").push_bind(coordinate.latitude);
        qb.push(", longitude = ").push_bind(coordinate.longitude);
    }
    if let Some(description) = &patch.description {
        qb.push(", description = ").push_bind(description.clone());
    }
    if let Some(category) = patch.category {
        qb.push(", category = ").push_bind(category.as_str());
    }
    if let Some(status) = patch.status {
        qb.push(", status = ").push_bind(status.as_str());
    }
    if let Some(methods) = &patch.payment_methods {
        qb.push(", payment_methods = ").push_bind(wire_methods(methods));
    }
    match &patch.image {
        Some(ImagePatch::Attach(image)) => {
            qb.push(", image_url = ").push_bind(image.image_url.clone());
            qb.push(", thumbnail_url = ").push_bind(image.thumbnail_url.clone());
            qb.push(", image_uploaded_at = ").push_bind(image.uploaded_at);
        }
        Some(ImagePatch::Detach) => {
            qb.push(", image_url = NULL, thumbnail_url = NULL, image_uploaded_at = NULL");
        }
        None => {}
    }

    qb.push(" WHERE collection = ").push_bind(collection);
    qb.push(" AND id = ").push_bind(id);

    let result = qb.build().execute(pool).await?;
    Ok(result.rows_affected())
}

/// Deletes a machine. Deleting a missing id affects no rows and succeeds.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn delete_machine(pool: &PgPool, collection: &str, id: &str) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM machines WHERE collection = $1 AND id = $2")
        .bind(collection)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Returns a single machine row by id, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_machine(
    pool: &PgPool,
    collection: &str,
    id: &str,
) -> Result<Option<MachineRow>, DbError> {
    let row = sqlx::query_as::<_, MachineRow>(&format!(
        "{SELECT_COLUMNS} WHERE collection = $1 AND id = $2"
    ))
    .bind(collection)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns the rows of `collection` matching `filter`, in `order`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_machines(
    pool: &PgPool,
    collection: &str,
    filter: &FilterState,
    order: Ordering,
) -> Result<Vec<MachineRow>, DbError> {
    let sql = format!(
        "{SELECT_COLUMNS} \
         WHERE collection = $1 \
           AND ($2::text IS NULL OR category = $2) \
           AND ($3::text IS NULL OR status = $3){}",
        order_clause(order)
    );
    let rows = sqlx::query_as::<_, MachineRow>(&sql)
        .bind(collection)
        .bind(filter.category.map(|c| c.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
