//! SQL against the `active_tracking` table.
//!
//! Everything here is a plain statement on whatever executor it is handed;
//! transactions and the writer lock are the caller's business.

use crate::error::{ErrorKind, Result};
use crate::models::{EntityRow, GroupRow};
use exn::ResultExt;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqliteExecutor};

// 13 bound parameters per row; stays well below SQLite's variable limit.
const ROWS_PER_STATEMENT: usize = 500;

const UPSERT_HEAD: &str = "INSERT INTO active_tracking (\
    icao24, manufacturer, model, marker, \
    latitude, longitude, altitude, \
    velocity, heading, on_ground, active, last_contact, last_seen\
) ";

/// Insert-or-update every row, keyed on `icao24`.
///
/// Splits into several statements when the batch is large; run it inside a
/// transaction to keep the batch atomic.
pub(crate) async fn upsert(conn: &mut SqliteConnection, rows: &[EntityRow]) -> Result<u64> {
    let mut written = 0;
    for chunk in rows.chunks(ROWS_PER_STATEMENT) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(UPSERT_HEAD);
        builder.push_values(chunk, |mut values, row| {
            values
                .push_bind(row.icao24.as_str())
                .push_bind(row.manufacturer.as_str())
                .push_bind(row.model.as_deref())
                .push_bind(row.marker.as_deref())
                .push_bind(row.latitude)
                .push_bind(row.longitude)
                .push_bind(row.altitude)
                .push_bind(row.velocity)
                .push_bind(row.heading)
                .push_bind(row.on_ground)
                .push_bind(row.active)
                .push_bind(row.last_contact)
                .push_bind(row.last_seen);
        });
        builder.push(' ');
        builder.push(include_str!("../queries/upsert_conflict.sql"));
        let result = builder.build().execute(&mut *conn).await.or_raise(|| ErrorKind::Transaction)?;
        written += result.rows_affected();
    }
    Ok(written)
}

/// Live rows for one group, most recently seen first.
pub(crate) async fn live_by_group<'e>(
    executor: impl SqliteExecutor<'e>,
    manufacturer: &str,
    cutoff: i64,
) -> Result<Vec<EntityRow>> {
    sqlx::query_as(include_str!("../queries/live_by_group.sql"))
        .bind(manufacturer)
        .bind(cutoff)
        .fetch_all(executor)
        .await
        .or_raise(|| ErrorKind::Transaction)
}

pub(crate) async fn delete_group<'e>(executor: impl SqliteExecutor<'e>, manufacturer: &str) -> Result<u64> {
    let result = sqlx::query(include_str!("../queries/delete_group.sql"))
        .bind(manufacturer)
        .execute(executor)
        .await
        .or_raise(|| ErrorKind::Transaction)?;
    Ok(result.rows_affected())
}

pub(crate) async fn delete_stale<'e>(executor: impl SqliteExecutor<'e>, cutoff: i64) -> Result<u64> {
    let result = sqlx::query(include_str!("../queries/delete_stale.sql"))
        .bind(cutoff)
        .execute(executor)
        .await
        .or_raise(|| ErrorKind::Transaction)?;
    Ok(result.rows_affected())
}

pub(crate) async fn group_summaries<'e>(executor: impl SqliteExecutor<'e>, cutoff: i64) -> Result<Vec<GroupRow>> {
    sqlx::query_as(include_str!("../queries/group_summaries.sql"))
        .bind(cutoff)
        .fetch_all(executor)
        .await
        .or_raise(|| ErrorKind::Transaction)
}
