use sqlx::PgPool;

/// Statements are idempotent so startup can run them unconditionally.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS operators (
        id          BIGSERIAL PRIMARY KEY,
        name        VARCHAR(255) NOT NULL,
        tax_id      VARCHAR(20) UNIQUE,
        is_super    BOOLEAN NOT NULL DEFAULT FALSE,
        expires_at  TIMESTAMPTZ,
        active      BOOLEAN NOT NULL DEFAULT TRUE,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id          BIGSERIAL PRIMARY KEY,
        name        VARCHAR(100) NOT NULL,
        operator_id BIGINT NOT NULL REFERENCES operators(id),
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (operator_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS grants (
        id          BIGSERIAL PRIMARY KEY,
        resource    VARCHAR(100) NOT NULL,
        action      VARCHAR(50) NOT NULL,
        UNIQUE (resource, action)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_grants (
        role_id     BIGINT NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        grant_id    BIGINT NOT NULL REFERENCES grants(id) ON DELETE CASCADE,
        PRIMARY KEY (role_id, grant_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id               BIGSERIAL PRIMARY KEY,
        username         VARCHAR(100) NOT NULL UNIQUE,
        email            VARCHAR(255) NOT NULL UNIQUE,
        password_hash    VARCHAR(255) NOT NULL,
        first_name       VARCHAR(100) NOT NULL DEFAULT '',
        last_name        VARCHAR(100) NOT NULL DEFAULT '',
        active           BOOLEAN NOT NULL DEFAULT TRUE,
        last_activity_at TIMESTAMPTZ,
        operator_id      BIGINT NOT NULL REFERENCES operators(id),
        role_id          BIGINT NOT NULL REFERENCES roles(id),
        created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at       TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id          BIGSERIAL PRIMARY KEY,
        user_id     BIGINT NOT NULL,
        operator_id BIGINT NOT NULL,
        action      VARCHAR(100) NOT NULL,
        resource    VARCHAR(100),
        resource_id BIGINT,
        details     VARCHAR(1000),
        ip_address  VARCHAR(45),
        user_agent  VARCHAR(500),
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS audit_log_user_created_idx ON audit_log (user_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS audit_log_operator_created_idx ON audit_log (operator_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS users_role_idx ON users (role_id)",
];

/// Create every table the authorization core reads or writes.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
