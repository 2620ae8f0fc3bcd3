use sqlx::PgPool;

/// Create the ledger tables if they do not exist yet
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Initializing ledger schema...");

    for (name, statement) in SCHEMA {
        sqlx::query(statement).execute(pool).await.map_err(|e| {
            tracing::error!(object = name, error = %e, "Failed to create schema object");
            e
        })?;
    }

    tracing::info!("Ledger schema initialized successfully");
    Ok(())
}

const SCHEMA: [(&str, &str); 7] = [
    ("accounts", CREATE_ACCOUNTS_TABLE),
    ("accounts_owner_idx", CREATE_ACCOUNTS_OWNER_INDEX),
    ("entries", CREATE_ENTRIES_TABLE),
    ("entries_account_id_idx", CREATE_ENTRIES_ACCOUNT_INDEX),
    ("transfers", CREATE_TRANSFERS_TABLE),
    ("transfers_from_account_id_idx", CREATE_TRANSFERS_FROM_INDEX),
    ("transfers_to_account_id_idx", CREATE_TRANSFERS_TO_INDEX),
];

const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id          BIGSERIAL PRIMARY KEY,
    owner       VARCHAR NOT NULL,
    balance     BIGINT NOT NULL,
    currency    VARCHAR NOT NULL CHECK (currency IN ('USD', 'EUR', 'UAH')),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_ACCOUNTS_OWNER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS accounts_owner_idx ON accounts (owner)";

const CREATE_ENTRIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    id          BIGSERIAL PRIMARY KEY,
    account_id  BIGINT NOT NULL REFERENCES accounts (id),
    amount      BIGINT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_ENTRIES_ACCOUNT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS entries_account_id_idx ON entries (account_id)";

const CREATE_TRANSFERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfers (
    id               BIGSERIAL PRIMARY KEY,
    from_account_id  BIGINT NOT NULL REFERENCES accounts (id),
    to_account_id    BIGINT NOT NULL REFERENCES accounts (id),
    amount           BIGINT NOT NULL CHECK (amount > 0),
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
    CHECK (from_account_id <> to_account_id)
)
"#;

const CREATE_TRANSFERS_FROM_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS transfers_from_account_id_idx ON transfers (from_account_id)";

const CREATE_TRANSFERS_TO_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS transfers_to_account_id_idx ON transfers (to_account_id)";
