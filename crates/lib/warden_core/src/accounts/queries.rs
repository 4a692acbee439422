//! Account queries.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::account::{Account, AccountFilter, AccountStatus, OrderDirection, Page};
use crate::store::StoreError;

const ACCOUNT_COLUMNS: &str =
    "id, login, password, status, roles, created_at, updated_at, deleted";

type AccountRow = (
    Uuid,
    String,
    String,
    String,
    Vec<String>,
    DateTime<Utc>,
    DateTime<Utc>,
    bool,
);

fn account_from_row(row: AccountRow) -> Result<Account, StoreError> {
    let (id, login, password, status, roles, created_at, updated_at, deleted) = row;
    Ok(Account {
        id,
        login,
        password,
        status: status.parse::<AccountStatus>().map_err(StoreError::Corrupt)?,
        roles,
        created_at,
        updated_at,
        deleted,
    })
}

/// Postgres `BIGINT` for a page bound; values past `i64::MAX` saturate.
fn to_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Append the shared WHERE clause of list/count queries.
fn push_filter<'a>(qb: &mut QueryBuilder<'a, Postgres>, filter: &'a AccountFilter) {
    qb.push(" WHERE deleted = FALSE");
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(search) = filter.search.as_deref() {
        qb.push(" AND strpos(login, ").push_bind(search).push(") > 0");
    }
}

/// List non-deleted accounts.
pub async fn list_accounts(
    pool: &PgPool,
    filter: &AccountFilter,
) -> Result<Page<Account>, StoreError> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM accounts");
    push_filter(&mut count, filter);
    let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let direction = match filter.direction {
        OrderDirection::Asc => "ASC",
        OrderDirection::Desc => "DESC",
    };
    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {ACCOUNT_COLUMNS} FROM accounts"));
    push_filter(&mut qb, filter);
    qb.push(format!(
        " ORDER BY {} {direction}, id {direction}",
        filter.order_by.column()
    ));
    qb.push(" LIMIT ")
        .push_bind(to_bigint(filter.limit))
        .push(" OFFSET ")
        .push_bind(to_bigint(filter.offset));

    let rows = qb.build_query_as::<AccountRow>().fetch_all(pool).await?;
    let items = rows
        .into_iter()
        .map(account_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        items,
        total: total as u64,
        offset: filter.offset,
        limit: filter.limit,
    })
}

/// Fetch an account by id.
pub async fn get_account(pool: &PgPool, id: Uuid) -> Result<Option<Account>, StoreError> {
    let row = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(account_from_row).transpose()
}

/// Fetch a non-deleted account by login.
pub async fn find_account_by_login(
    pool: &PgPool,
    login: &str,
) -> Result<Option<Account>, StoreError> {
    let row = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE login = $1 AND deleted = FALSE"
    ))
    .bind(login)
    .fetch_optional(pool)
    .await?;
    row.map(account_from_row).transpose()
}

/// Insert a new account row.
pub async fn insert_account(pool: &PgPool, account: &Account) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO accounts (id, login, password, status, roles, created_at, updated_at, deleted) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(account.id)
    .bind(&account.login)
    .bind(&account.password)
    .bind(account.status.as_str())
    .bind(&account.roles)
    .bind(account.created_at)
    .bind(account.updated_at)
    .bind(account.deleted)
    .execute(pool)
    .await?;
    Ok(())
}

/// Overwrite an account row.
pub async fn update_account(pool: &PgPool, account: &Account) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE accounts SET login = $2, password = $3, status = $4, roles = $5, \
         updated_at = $6, deleted = $7 WHERE id = $1",
    )
    .bind(account.id)
    .bind(&account.login)
    .bind(&account.password)
    .bind(account.status.as_str())
    .bind(&account.roles)
    .bind(account.updated_at)
    .bind(account.deleted)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::Corrupt(format!(
            "account {} does not exist",
            account.id
        )));
    }
    Ok(())
}
