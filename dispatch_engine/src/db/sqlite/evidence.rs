use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{Evidence, NewEvidence},
};

pub(crate) async fn insert_evidence(
    order_pk: i64,
    evidence: &NewEvidence,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Evidence, SqliteDatabaseError> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
            INSERT INTO order_evidence (order_pk, evidence_type, url, checksum, uploaded_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
        "#,
    )
    .bind(order_pk)
    .bind(&evidence.evidence_type)
    .bind(&evidence.url)
    .bind(&evidence.checksum)
    .bind(&evidence.uploaded_by)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    Ok(Evidence {
        id,
        order_pk,
        evidence_type: evidence.evidence_type.clone(),
        url: evidence.url.clone(),
        checksum: evidence.checksum.clone(),
        uploaded_by: evidence.uploaded_by.clone(),
        created_at: now,
    })
}

pub async fn fetch_evidence(order_pk: i64, conn: &mut SqliteConnection) -> Result<Vec<Evidence>, SqliteDatabaseError> {
    let evidence = sqlx::query_as::<_, Evidence>(
        r#"
            SELECT id, order_pk, evidence_type, url, checksum, uploaded_by, created_at
            FROM order_evidence WHERE order_pk = $1 ORDER BY id ASC
        "#,
    )
    .bind(order_pk)
    .fetch_all(conn)
    .await?;
    Ok(evidence)
}
