//! Token record and blacklist queries.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::token::{TokenRecord, TokenType};
use crate::store::StoreError;

type TokenRow = (
    Uuid,
    Uuid,
    String,
    Option<Uuid>,
    DateTime<Utc>,
    Option<serde_json::Value>,
);

fn token_from_row(row: TokenRow) -> Result<TokenRecord, StoreError> {
    let (id, account, token_type, associated, expired_at, device_info) = row;
    Ok(TokenRecord {
        id,
        account,
        token_type: token_type.parse::<TokenType>().map_err(StoreError::Corrupt)?,
        associated,
        expired_at,
        device_info,
    })
}

/// Insert an access record and its refresh record in one transaction.
pub async fn insert_token_pair(
    pool: &PgPool,
    access: &TokenRecord,
    refresh: &TokenRecord,
) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    for record in [access, refresh] {
        sqlx::query(
            "INSERT INTO tokens (id, account, type, associated, expired_at, device_info) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id)
        .bind(record.account)
        .bind(record.token_type.as_str())
        .bind(record.associated)
        .bind(record.expired_at)
        .bind(&record.device_info)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Fetch a token record by id.
pub async fn get_token(pool: &PgPool, id: Uuid) -> Result<Option<TokenRecord>, StoreError> {
    let row = sqlx::query_as::<_, TokenRow>(
        "SELECT id, account, type, associated, expired_at, device_info \
         FROM tokens WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(token_from_row).transpose()
}

/// List every token record owned by an account.
pub async fn list_account_tokens(
    pool: &PgPool,
    account_id: Uuid,
) -> Result<Vec<TokenRecord>, StoreError> {
    let rows = sqlx::query_as::<_, TokenRow>(
        "SELECT id, account, type, associated, expired_at, device_info \
         FROM tokens WHERE account = $1 ORDER BY id",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(token_from_row).collect()
}

/// Ids of records whose expiry lies strictly before `cutoff`.
pub async fn list_expired_tokens(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Uuid>, StoreError> {
    let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM tokens WHERE expired_at < $1")
        .bind(cutoff)
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

/// Delete the given token records.
pub async fn delete_tokens(pool: &PgPool, ids: &[Uuid]) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM tokens WHERE id = ANY($1)")
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Add ids to the blacklist; existing entries are kept. Returns the number
/// of ids that were newly inserted.
pub async fn blacklist_add(pool: &PgPool, ids: &[Uuid]) -> Result<u64, StoreError> {
    let result = sqlx::query(
        "INSERT INTO token_blacklist (id) SELECT * FROM UNNEST($1::uuid[]) \
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(ids)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Check blacklist membership.
pub async fn blacklist_contains(pool: &PgPool, id: Uuid) -> Result<bool, StoreError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM token_blacklist WHERE id = $1)",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Remove ids from the blacklist.
pub async fn blacklist_remove(pool: &PgPool, ids: &[Uuid]) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM token_blacklist WHERE id = ANY($1)")
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(())
}
