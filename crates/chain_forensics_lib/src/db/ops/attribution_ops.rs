use crate::db::model::*;
use sqlx::SqliteConnection;

/// Insert or replace the attribution with the same (address, chain type, label).
pub async fn upsert_attribution(
    conn: &mut SqliteConnection,
    attribution: &AttributionDao,
) -> Result<AttributionDao, sqlx::Error> {
    let res = sqlx::query_as::<_, AttributionDao>(
        r"INSERT INTO address_attributions
(address, chain_type, label, category, risk_level, description, source, date_added)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT(address, chain_type, label) DO UPDATE SET
category = excluded.category,
risk_level = excluded.risk_level,
description = excluded.description,
source = excluded.source,
date_added = excluded.date_added
RETURNING *;
",
    )
    .bind(&attribution.address)
    .bind(&attribution.chain_type)
    .bind(&attribution.label)
    .bind(&attribution.category)
    .bind(&attribution.risk_level)
    .bind(&attribution.description)
    .bind(&attribution.source)
    .bind(attribution.date_added)
    .fetch_one(conn)
    .await?;
    Ok(res)
}

pub async fn get_address_attributions(
    conn: &mut SqliteConnection,
    address: &str,
) -> Result<Vec<AttributionDao>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AttributionDao>(
        r"SELECT * FROM address_attributions WHERE address = $1 ORDER BY date_added DESC, id DESC",
    )
    .bind(address)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub async fn get_all_attributions(
    conn: &mut SqliteConnection,
) -> Result<Vec<AttributionDao>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AttributionDao>(
        r"SELECT * FROM address_attributions ORDER BY date_added DESC, id DESC",
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
