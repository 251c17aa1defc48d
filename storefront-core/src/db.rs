use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// Create the catalog and account tables if they are missing. Idempotent.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id           BIGINT PRIMARY KEY,
            title        TEXT NOT NULL DEFAULT '',
            description  TEXT NOT NULL DEFAULT '',
            category     TEXT NOT NULL DEFAULT '',
            price        DOUBLE PRECISION NOT NULL DEFAULT 0,
            image        TEXT NOT NULL DEFAULT '',
            rating_rate  DOUBLE PRECISION NOT NULL DEFAULT 0,
            rating_count BIGINT NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_state (
            singleton  BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (singleton),
            version    BIGINT NOT NULL DEFAULT 0,
            synced_at  TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT INTO catalog_state (singleton, version) VALUES (TRUE, 0) ON CONFLICT DO NOTHING")
        .execute(pool)
        .await?;

    // Cart and wishlist rows reference products by id only: the catalog is
    // replaced wholesale and lines for vanished products are skipped on read.
    for ddl in ACCOUNT_TABLES {
        sqlx::query(ddl).execute(pool).await?;
    }

    Ok(())
}

const ACCOUNT_TABLES: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id            UUID PRIMARY KEY,
        name          TEXT NOT NULL,
        email         TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cart_items (
        id         UUID PRIMARY KEY,
        user_id    UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        product_id BIGINT NOT NULL,
        quantity   BIGINT NOT NULL CHECK (quantity > 0),
        added_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (user_id, product_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS wishlist_items (
        id         UUID PRIMARY KEY,
        user_id    UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        product_id BIGINT NOT NULL,
        added_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (user_id, product_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id               UUID PRIMARY KEY,
        user_id          UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        items            JSONB NOT NULL,
        total_amount     DOUBLE PRECISION NOT NULL,
        status           TEXT NOT NULL,
        shipping_address JSONB NOT NULL,
        created_at       TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contact_messages (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL,
        email       TEXT NOT NULL,
        message     TEXT NOT NULL,
        received_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];
