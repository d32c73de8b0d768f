use crate::db::model::*;
use sqlx::SqliteConnection;

pub async fn insert_cluster_member(
    conn: &mut SqliteConnection,
    member: &ClusterMemberDao,
) -> Result<ClusterMemberDao, sqlx::Error> {
    let res = sqlx::query_as::<_, ClusterMemberDao>(
        r"INSERT INTO address_clusters
(cluster_name, address, chain_type, confidence_score, evidence, date_added)
VALUES ($1, $2, $3, $4, $5, $6) RETURNING *;
",
    )
    .bind(&member.cluster_name)
    .bind(&member.address)
    .bind(&member.chain_type)
    .bind(member.confidence_score)
    .bind(&member.evidence)
    .bind(member.date_added)
    .fetch_one(conn)
    .await?;
    Ok(res)
}

/// Cluster rows naming `address`, compared case-insensitively.
pub async fn get_address_clusters(
    conn: &mut SqliteConnection,
    address: &str,
) -> Result<Vec<ClusterMemberDao>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ClusterMemberDao>(
        r"SELECT * FROM address_clusters WHERE lower(address) = lower($1) ORDER BY cluster_name ASC, id ASC",
    )
    .bind(address)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub async fn get_cluster_members(
    conn: &mut SqliteConnection,
    cluster_name: &str,
) -> Result<Vec<ClusterMemberDao>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ClusterMemberDao>(
        r"SELECT * FROM address_clusters WHERE cluster_name = $1 ORDER BY confidence_score DESC, id ASC",
    )
    .bind(cluster_name)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub async fn get_all_clusters(
    conn: &mut SqliteConnection,
) -> Result<Vec<ClusterSummaryDao>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ClusterSummaryDao>(
        r"SELECT cluster_name, COUNT(*) AS address_count
FROM address_clusters
GROUP BY cluster_name
ORDER BY address_count DESC, cluster_name ASC",
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
