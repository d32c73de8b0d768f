use crate::db::model::*;
use sqlx::SqliteConnection;

pub async fn insert_known_event(
    conn: &mut SqliteConnection,
    event: &KnownEventDao,
) -> Result<KnownEventDao, sqlx::Error> {
    let res = sqlx::query_as::<_, KnownEventDao>(
        r"INSERT INTO known_events
(event_name, event_type, event_date, chain_name, description, estimated_loss, primary_address, reference_url, date_added)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *;
",
    )
    .bind(&event.event_name)
    .bind(&event.event_type)
    .bind(event.event_date)
    .bind(&event.chain_name)
    .bind(&event.description)
    .bind(&event.estimated_loss)
    .bind(&event.primary_address)
    .bind(&event.reference_url)
    .bind(event.date_added)
    .fetch_one(conn)
    .await?;
    Ok(res)
}

/// Insert, or overwrite every descriptive column of the event with the same name.
pub async fn upsert_known_event(
    conn: &mut SqliteConnection,
    event: &KnownEventDao,
) -> Result<KnownEventDao, sqlx::Error> {
    let res = sqlx::query_as::<_, KnownEventDao>(
        r"INSERT INTO known_events
(event_name, event_type, event_date, chain_name, description, estimated_loss, primary_address, reference_url, date_added)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
ON CONFLICT(event_name) DO UPDATE SET
event_type = excluded.event_type,
event_date = excluded.event_date,
chain_name = excluded.chain_name,
description = excluded.description,
estimated_loss = excluded.estimated_loss,
primary_address = excluded.primary_address,
reference_url = excluded.reference_url
RETURNING *;
",
    )
    .bind(&event.event_name)
    .bind(&event.event_type)
    .bind(event.event_date)
    .bind(&event.chain_name)
    .bind(&event.description)
    .bind(&event.estimated_loss)
    .bind(&event.primary_address)
    .bind(&event.reference_url)
    .bind(event.date_added)
    .fetch_one(conn)
    .await?;
    Ok(res)
}

pub async fn get_known_event_by_name(
    conn: &mut SqliteConnection,
    event_name: &str,
) -> Result<Option<KnownEventDao>, sqlx::Error> {
    let row = sqlx::query_as::<_, KnownEventDao>(r"SELECT * FROM known_events WHERE event_name = $1")
        .bind(event_name)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn get_known_events(
    conn: &mut SqliteConnection,
    limit: Option<i64>,
) -> Result<Vec<KnownEventDao>, sqlx::Error> {
    let limit = limit.unwrap_or(i64::MAX);
    let rows = sqlx::query_as::<_, KnownEventDao>(
        r"SELECT * FROM known_events ORDER BY event_date IS NULL, event_date DESC, id DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
