//! Postgres-backed implementation of the storage ports.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / other | N/A | `Backend` |
//!
//! Binding replacement and role deletion run in a single transaction each, so
//! concurrent readers see either the old or the new binding set.

mod migrations;

pub use migrations::run_migrations;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;

use haulbase_auth::{Permission, RoleName};
use haulbase_core::{AuditRecordId, GrantId, Page, PageRequest, RoleId, TenantId, UserId};

use super::{
    AuditFilter, AuditRecord, AuditRecordView, AuditStore, AuditUserRef, GrantRecord, GrantStore,
    NewAuditRecord, OperatorRef, RoleFilter, RoleRecord, RoleStore, StoreError, StoreResult, TenantDirectory,
    TenantRecord, UserDirectory, UserRecord,
};

const AUDIT_VIEW_SELECT: &str = r#"
    SELECT
        a.id, a.user_id, a.operator_id, a.action, a.resource, a.resource_id,
        a.details, a.ip_address, a.user_agent, a.created_at,
        u.username, u.first_name, u.last_name,
        o.name AS operator_name
    FROM audit_log a
    LEFT JOIN users u ON u.id = a.user_id
    LEFT JOIN operators o ON o.id = a.operator_id
"#;

const AUDIT_FILTER: &str = r#"
    WHERE ($1::bigint IS NULL OR a.user_id = $1)
      AND ($2::bigint IS NULL OR a.operator_id = $2)
      AND ($3::text IS NULL OR strpos(a.action, $3) > 0)
      AND ($4::text IS NULL OR a.resource = $4)
      AND ($5::timestamptz IS NULL OR a.created_at >= $5)
      AND ($6::timestamptz IS NULL OR a.created_at <= $6)
"#;

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, then bring the schema up to date.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        run_migrations(&pool)
            .await
            .map_err(|e| map_sqlx_error("run_migrations", e))?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TenantDirectory for PostgresStore {
    #[instrument(skip(self), fields(tenant_id = %id), err)]
    async fn find_tenant(&self, id: TenantId) -> StoreResult<Option<TenantRecord>> {
        let row = sqlx::query(
            "SELECT id, name, tax_id, is_super, expires_at, active FROM operators WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_tenant", e))?;

        row.map(|r| tenant_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("find_tenant", e))
    }
}

#[async_trait]
impl UserDirectory for PostgresStore {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn find_user(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, email, first_name, last_name, operator_id, role_id, active, last_activity_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user", e))?;

        row.map(|r| user_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("find_user", e))
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn touch_last_activity(&self, id: UserId, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET last_activity_at = $2 WHERE id = $1")
            .bind(id.get())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("touch_last_activity", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(role_id = %role_id), err)]
    async fn count_users_with_role(&self, role_id: RoleId) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role_id = $1")
            .bind(role_id.get())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_users_with_role", e))?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl RoleStore for PostgresStore {
    #[instrument(skip(self), fields(tenant_id = %tenant_id, name = %name), err)]
    async fn insert_role(&self, tenant_id: TenantId, name: &RoleName) -> StoreResult<RoleRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO roles (name, operator_id)
            VALUES ($1, $2)
            RETURNING id, name, operator_id, created_at, updated_at
            "#,
        )
        .bind(name.as_str())
        .bind(tenant_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;

        role_from_row(&row).map_err(|e| map_sqlx_error("insert_role", e))
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn find_role(&self, id: RoleId) -> StoreResult<Option<RoleRecord>> {
        let row = sqlx::query("SELECT id, name, operator_id, created_at, updated_at FROM roles WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role", e))?;

        row.map(|r| role_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("find_role", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn find_role_by_name(&self, tenant_id: TenantId, name: &str) -> StoreResult<Option<RoleRecord>> {
        let row = sqlx::query(
            "SELECT id, name, operator_id, created_at, updated_at FROM roles WHERE operator_id = $1 AND name = $2",
        )
        .bind(tenant_id.get())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_role_by_name", e))?;

        row.map(|r| role_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("find_role_by_name", e))
    }

    #[instrument(skip(self), fields(role_id = %id, name = %name), err)]
    async fn rename_role(&self, id: RoleId, name: &RoleName) -> StoreResult<RoleRecord> {
        let row = sqlx::query(
            r#"
            UPDATE roles SET name = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, name, operator_id, created_at, updated_at
            "#,
        )
        .bind(id.get())
        .bind(name.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("rename_role", e))?
        .ok_or_else(|| StoreError::NotFound(format!("role {id}")))?;

        role_from_row(&row).map_err(|e| map_sqlx_error("rename_role", e))
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn delete_role(&self, id: RoleId) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;

        sqlx::query("DELETE FROM role_grants WHERE role_id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;

        let deleted = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?
            .rows_affected();

        if deleted == 0 {
            return Err(StoreError::NotFound(format!("role {id}")));
        }

        tx.commit().await.map_err(|e| map_sqlx_error("delete_role", e))
    }

    #[instrument(skip(self), err)]
    async fn list_roles(&self, filter: &RoleFilter, page: PageRequest) -> StoreResult<Page<RoleRecord>> {
        let tenant = filter.tenant_id.map(|t| t.get());
        let search = filter.search.as_deref();

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM roles
            WHERE ($1::bigint IS NULL OR operator_id = $1)
              AND ($2::text IS NULL OR strpos(lower(name), lower($2)) > 0)
            "#,
        )
        .bind(tenant)
        .bind(search)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_roles", e))?;

        let rows = sqlx::query(
            r#"
            SELECT id, name, operator_id, created_at, updated_at FROM roles
            WHERE ($1::bigint IS NULL OR operator_id = $1)
              AND ($2::text IS NULL OR strpos(lower(name), lower($2)) > 0)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(tenant)
        .bind(search)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_roles", e))?;

        let roles = rows
            .iter()
            .map(role_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("list_roles", e))?;

        Ok(Page::new(roles, page, total.max(0) as u64))
    }
}

#[async_trait]
impl GrantStore for PostgresStore {
    #[instrument(skip(self), fields(permission = %permission), err)]
    async fn ensure_grant(&self, permission: &Permission) -> StoreResult<GrantRecord> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query(
            r#"
            INSERT INTO grants (resource, action)
            VALUES ($1, $2)
            ON CONFLICT (resource, action) DO UPDATE SET resource = EXCLUDED.resource
            RETURNING id, resource, action
            "#,
        )
        .bind(permission.resource())
        .bind(permission.action())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_grant", e))?;

        grant_from_row(&row).map_err(|e| map_sqlx_error("ensure_grant", e))
    }

    #[instrument(skip(self), err)]
    async fn list_grants(&self) -> StoreResult<Vec<GrantRecord>> {
        let rows = sqlx::query("SELECT id, resource, action FROM grants ORDER BY resource, action")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_grants", e))?;

        rows.iter()
            .map(grant_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("list_grants", e))
    }

    #[instrument(skip(self), fields(role_id = %role_id), err)]
    async fn role_grants(&self, role_id: RoleId) -> StoreResult<Vec<GrantRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT g.id, g.resource, g.action
            FROM role_grants rg
            JOIN grants g ON g.id = rg.grant_id
            WHERE rg.role_id = $1
            ORDER BY g.resource, g.action
            "#,
        )
        .bind(role_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("role_grants", e))?;

        rows.iter()
            .map(grant_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("role_grants", e))
    }

    #[instrument(skip(self, grant_ids), fields(role_id = %role_id, grant_count = grant_ids.len()), err)]
    async fn replace_role_grants(&self, role_id: RoleId, grant_ids: &[GrantId]) -> StoreResult<()> {
        let ids: Vec<i64> = grant_ids.iter().map(|g| g.get()).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("replace_role_grants", e))?;

        // Serialize concurrent replacements of the same role.
        let locked = sqlx::query("SELECT id FROM roles WHERE id = $1 FOR UPDATE")
            .bind(role_id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_role_grants", e))?;
        if locked.is_none() {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }

        sqlx::query("DELETE FROM role_grants WHERE role_id = $1")
            .bind(role_id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_role_grants", e))?;

        if !ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO role_grants (role_id, grant_id)
                SELECT $1, g FROM unnest($2::bigint[]) AS g
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(role_id.get())
            .bind(&ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_role_grants", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("replace_role_grants", e))
    }

    #[instrument(skip(self), fields(role_id = %role_id, permission = %permission), err)]
    async fn has_grant(&self, role_id: RoleId, permission: &Permission) -> StoreResult<bool> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM role_grants rg
                JOIN grants g ON g.id = rg.grant_id
                WHERE rg.role_id = $1 AND g.resource = $2 AND g.action = $3
            )
            "#,
        )
        .bind(role_id.get())
        .bind(permission.resource())
        .bind(permission.action())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("has_grant", e))
    }
}

#[async_trait]
impl AuditStore for PostgresStore {
    #[instrument(skip(self, record), fields(user_id = %record.user_id, action = %record.action), err)]
    async fn append(&self, record: NewAuditRecord) -> StoreResult<AuditRecordId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO audit_log
                (user_id, operator_id, action, resource, resource_id, details, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(record.user_id.get())
        .bind(record.tenant_id.get())
        .bind(&record.action)
        .bind(&record.resource)
        .bind(record.resource_id)
        .bind(&record.details)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_audit", e))?;

        Ok(AuditRecordId::new(id))
    }

    #[instrument(skip(self), err)]
    async fn query(&self, filter: &AuditFilter, page: PageRequest) -> StoreResult<Page<AuditRecordView>> {
        let count_sql = format!("SELECT COUNT(*) FROM audit_log a {AUDIT_FILTER}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(filter.user_id.map(|u| u.get()))
            .bind(filter.tenant_id.map(|t| t.get()))
            .bind(filter.action.as_deref())
            .bind(filter.resource.as_deref())
            .bind(filter.start)
            .bind(filter.end)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("query_audit", e))?;

        let data_sql = format!(
            "{AUDIT_VIEW_SELECT} {AUDIT_FILTER} ORDER BY a.created_at DESC, a.id DESC LIMIT $7 OFFSET $8"
        );
        let rows = sqlx::query(&data_sql)
            .bind(filter.user_id.map(|u| u.get()))
            .bind(filter.tenant_id.map(|t| t.get()))
            .bind(filter.action.as_deref())
            .bind(filter.resource.as_deref())
            .bind(filter.start)
            .bind(filter.end)
            .bind(i64::from(page.limit))
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("query_audit", e))?;

        let views = rows
            .iter()
            .map(audit_view_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("query_audit", e))?;

        Ok(Page::new(views, page, total.max(0) as u64))
    }

    #[instrument(skip(self), fields(audit_id = %id), err)]
    async fn find(&self, id: AuditRecordId) -> StoreResult<Option<AuditRecordView>> {
        let sql = format!("{AUDIT_VIEW_SELECT} WHERE a.id = $1");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_audit", e))?;

        row.map(|r| audit_view_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("find_audit", e))
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn user_activity(&self, user_id: UserId, limit: u32) -> StoreResult<Vec<AuditRecordView>> {
        let sql = format!("{AUDIT_VIEW_SELECT} WHERE a.user_id = $1 ORDER BY a.created_at DESC, a.id DESC LIMIT $2");
        let rows = sqlx::query(&sql)
            .bind(user_id.get())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_activity", e))?;

        rows.iter()
            .map(audit_view_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("user_activity", e))
    }
}

fn tenant_from_row(row: &PgRow) -> Result<TenantRecord, sqlx::Error> {
    Ok(TenantRecord {
        id: TenantId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        tax_id: row.try_get("tax_id")?,
        is_super_tenant: row.try_get("is_super")?,
        expires_at: row.try_get("expires_at")?,
        active: row.try_get("active")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<UserRecord, sqlx::Error> {
    Ok(UserRecord {
        id: UserId::new(row.try_get("id")?),
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        tenant_id: TenantId::new(row.try_get("operator_id")?),
        role_id: RoleId::new(row.try_get("role_id")?),
        active: row.try_get("active")?,
        last_activity_at: row.try_get("last_activity_at")?,
    })
}

fn role_from_row(row: &PgRow) -> Result<RoleRecord, sqlx::Error> {
    Ok(RoleRecord {
        id: RoleId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        tenant_id: TenantId::new(row.try_get("operator_id")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn grant_from_row(row: &PgRow) -> Result<GrantRecord, sqlx::Error> {
    Ok(GrantRecord {
        id: GrantId::new(row.try_get("id")?),
        resource: row.try_get("resource")?,
        action: row.try_get("action")?,
    })
}

fn audit_view_from_row(row: &PgRow) -> Result<AuditRecordView, sqlx::Error> {
    let record = AuditRecord {
        id: AuditRecordId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        tenant_id: TenantId::new(row.try_get("operator_id")?),
        action: row.try_get("action")?,
        resource: row.try_get("resource")?,
        resource_id: row.try_get("resource_id")?,
        details: row.try_get("details")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        created_at: row.try_get("created_at")?,
    };

    let username: Option<String> = row.try_get("username")?;
    let user = match username {
        Some(username) => Some(AuditUserRef {
            id: record.user_id,
            username,
            first_name: row.try_get::<Option<String>, _>("first_name")?.unwrap_or_default(),
            last_name: row.try_get::<Option<String>, _>("last_name")?.unwrap_or_default(),
        }),
        None => None,
    };
    let operator = row
        .try_get::<Option<String>, _>("operator_name")?
        .map(|name| OperatorRef {
            id: record.tenant_id,
            name,
        });

    Ok(AuditRecordView { record, user, operator })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::NotFound(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
