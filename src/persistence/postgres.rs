use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::Row;
use std::time::Duration;
use uuid::Uuid;

use super::{CustomerStore, FailedLoginUpdate, StoreError, UniqueField};
use crate::domain::customer::{Address, CardTier, Customer, CustomerCounts, Guardian, LockoutState};

// ============================================================================
// PostgreSQL Customer Store
// ============================================================================
//
// Unique indexes are the authoritative uniqueness check. Their names are
// mapped back to `UniqueField` so callers can report the same error as the
// application-level pre-check.
//
// ============================================================================

type PgQuery<'q> = Query<'q, sqlx::Postgres, PgArguments>;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS customers (
        id UUID PRIMARY KEY,
        full_name TEXT NOT NULL,
        national_id TEXT NOT NULL,
        mother_maiden_name TEXT NOT NULL,
        birth_place TEXT NOT NULL,
        birth_date DATE NOT NULL,
        sex TEXT NOT NULL,
        religion TEXT NOT NULL,
        phone TEXT NOT NULL,
        email TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        account_code BIGINT NOT NULL,
        card_tier TEXT NOT NULL,
        card_number TEXT NOT NULL,
        account_type TEXT NOT NULL,
        failed_login_attempts INTEGER NOT NULL DEFAULT 0,
        locked_until TIMESTAMPTZ,
        email_verified BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_customers_national_id ON customers (national_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_customers_email ON customers (lower(email))",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_customers_phone ON customers (phone)",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_customers_account_code ON customers (account_code)",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_customers_card_number ON customers (card_number)",
    r#"
    CREATE TABLE IF NOT EXISTS customer_addresses (
        customer_id UUID PRIMARY KEY REFERENCES customers (id),
        street TEXT NOT NULL,
        village TEXT NOT NULL,
        district TEXT NOT NULL,
        city TEXT NOT NULL,
        province TEXT NOT NULL,
        postal_code TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS customer_guardians (
        customer_id UUID PRIMARY KEY REFERENCES customers (id),
        full_name TEXT NOT NULL,
        relationship TEXT NOT NULL,
        phone TEXT NOT NULL,
        address TEXT NOT NULL,
        occupation TEXT NOT NULL
    )
    "#,
];

const SELECT_CUSTOMER: &str = r#"
    SELECT c.id, c.full_name, c.national_id, c.mother_maiden_name, c.birth_place,
           c.birth_date, c.sex, c.religion, c.phone, c.email, c.password_hash,
           c.account_code, c.card_tier, c.card_number, c.account_type,
           c.failed_login_attempts, c.locked_until, c.email_verified,
           c.created_at, c.updated_at,
           a.street, a.village, a.district, a.city, a.province, a.postal_code,
           g.full_name AS guardian_full_name, g.relationship AS guardian_relationship,
           g.phone AS guardian_phone, g.address AS guardian_address,
           g.occupation AS guardian_occupation
    FROM customers c
    LEFT JOIN customer_addresses a ON a.customer_id = c.id
    LEFT JOIN customer_guardians g ON g.customer_id = c.id
"#;

pub struct PgCustomerStore {
    pool: PgPool,
}

impl PgCustomerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Create tables and unique indexes if they do not exist yet
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!("Customer schema ready");
        Ok(())
    }

    async fn exists(&self, sql: &str, value: QueryValue<'_>) -> Result<bool, StoreError> {
        let row = value.bind_to(sqlx::query(sql)).fetch_one(&self.pool).await?;
        Ok(row.try_get::<bool, _>(0)?)
    }

    async fn find_one(&self, filter: &str, value: QueryValue<'_>) -> Result<Option<Customer>, StoreError> {
        let sql = format!("{SELECT_CUSTOMER} WHERE {filter}");
        value
            .bind_to(sqlx::query(&sql))
            .fetch_optional(&self.pool)
            .await?
            .map(|row| customer_from_row(&row))
            .transpose()
    }
}

enum QueryValue<'a> {
    Text(&'a str),
    BigInt(i64),
}

impl<'a> QueryValue<'a> {
    fn bind_to<'q>(self, query: PgQuery<'q>) -> PgQuery<'q>
    where
        'a: 'q,
    {
        match self {
            QueryValue::Text(text) => query.bind(text),
            QueryValue::BigInt(number) => query.bind(number),
        }
    }
}

fn customer_from_row(row: &PgRow) -> Result<Customer, StoreError> {
    let tier: String = row.try_get("card_tier")?;

    let guardian = match row.try_get::<Option<String>, _>("guardian_full_name")? {
        Some(full_name) => Some(Guardian {
            full_name,
            relationship: row.try_get("guardian_relationship")?,
            phone: row.try_get("guardian_phone")?,
            address: row.try_get("guardian_address")?,
            occupation: row.try_get("guardian_occupation")?,
        }),
        None => None,
    };

    let address = Address {
        street: row.try_get::<Option<String>, _>("street")?.unwrap_or_default(),
        village: row.try_get::<Option<String>, _>("village")?.unwrap_or_default(),
        district: row.try_get::<Option<String>, _>("district")?.unwrap_or_default(),
        city: row.try_get::<Option<String>, _>("city")?.unwrap_or_default(),
        province: row.try_get::<Option<String>, _>("province")?.unwrap_or_default(),
        postal_code: row.try_get::<Option<String>, _>("postal_code")?.unwrap_or_default(),
    };

    Ok(Customer {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        national_id: row.try_get("national_id")?,
        mother_maiden_name: row.try_get("mother_maiden_name")?,
        birth_place: row.try_get("birth_place")?,
        birth_date: row.try_get("birth_date")?,
        sex: row.try_get("sex")?,
        religion: row.try_get("religion")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        account_code: row.try_get("account_code")?,
        card_tier: CardTier::from_name_or_base(&tier),
        card_number: row.try_get("card_number")?,
        account_type: row.try_get("account_type")?,
        failed_login_attempts: row.try_get("failed_login_attempts")?,
        locked_until: row.try_get("locked_until")?,
        email_verified: row.try_get("email_verified")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        address,
        guardian,
    })
}

/// Field protected by a unique index, by index name
fn field_for_constraint(constraint: &str) -> Option<UniqueField> {
    match constraint {
        "uq_customers_national_id" => Some(UniqueField::NationalId),
        "uq_customers_email" => Some(UniqueField::Email),
        "uq_customers_phone" => Some(UniqueField::Phone),
        "uq_customers_account_code" => Some(UniqueField::AccountCode),
        "uq_customers_card_number" => Some(UniqueField::CardNumber),
        _ => None,
    }
}

/// Translate a unique-index rejection into the field it protects
fn map_write_error(err: sqlx::Error) -> StoreError {
    let field = match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            db.constraint().and_then(field_for_constraint)
        }
        _ => None,
    };

    match field {
        Some(field) => StoreError::UniqueViolation(field),
        None => StoreError::Database(err),
    }
}

#[async_trait]
impl CustomerStore for PgCustomerStore {
    async fn insert_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, full_name, national_id, mother_maiden_name, birth_place, birth_date,
                sex, religion, phone, email, password_hash, account_code, card_tier,
                card_number, account_type, failed_login_attempts, locked_until,
                email_verified, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(customer.id)
        .bind(&customer.full_name)
        .bind(&customer.national_id)
        .bind(&customer.mother_maiden_name)
        .bind(&customer.birth_place)
        .bind(customer.birth_date)
        .bind(&customer.sex)
        .bind(&customer.religion)
        .bind(&customer.phone)
        .bind(&customer.email)
        .bind(&customer.password_hash)
        .bind(customer.account_code)
        .bind(customer.card_tier.name())
        .bind(&customer.card_number)
        .bind(&customer.account_type)
        .bind(customer.failed_login_attempts)
        .bind(customer.locked_until)
        .bind(customer.email_verified)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;

        let address = &customer.address;
        sqlx::query(
            r#"
            INSERT INTO customer_addresses (customer_id, street, village, district, city, province, postal_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(customer.id)
        .bind(&address.street)
        .bind(&address.village)
        .bind(&address.district)
        .bind(&address.city)
        .bind(&address.province)
        .bind(&address.postal_code)
        .execute(&mut *tx)
        .await?;

        if let Some(guardian) = &customer.guardian {
            sqlx::query(
                r#"
                INSERT INTO customer_guardians (customer_id, full_name, relationship, phone, address, occupation)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(customer.id)
            .bind(&guardian.full_name)
            .bind(&guardian.relationship)
            .bind(&guardian.phone)
            .bind(&guardian.address)
            .bind(&guardian.occupation)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await.map_err(map_write_error)?;

        tracing::debug!(customer_id = %customer.id, "Customer row committed");
        Ok(())
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM customers WHERE lower(email) = lower($1))",
            QueryValue::Text(email),
        )
        .await
    }

    async fn phone_exists(&self, phone: &str) -> Result<bool, StoreError> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM customers WHERE phone = $1)",
            QueryValue::Text(phone),
        )
        .await
    }

    async fn national_id_exists(&self, national_id: &str) -> Result<bool, StoreError> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM customers WHERE national_id = $1)",
            QueryValue::Text(national_id),
        )
        .await
    }

    async fn account_code_exists(&self, account_code: i64) -> Result<bool, StoreError> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM customers WHERE account_code = $1)",
            QueryValue::BigInt(account_code),
        )
        .await
    }

    async fn card_number_exists(&self, card_number: &str) -> Result<bool, StoreError> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM customers WHERE card_number = $1)",
            QueryValue::Text(card_number),
        )
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
        self.find_one("lower(c.email) = lower($1)", QueryValue::Text(email)).await
    }

    async fn find_by_national_id(&self, national_id: &str) -> Result<Option<Customer>, StoreError> {
        self.find_one("c.national_id = $1", QueryValue::Text(national_id)).await
    }

    async fn find_by_account_code(&self, account_code: i64) -> Result<Option<Customer>, StoreError> {
        self.find_one("c.account_code = $1", QueryValue::BigInt(account_code)).await
    }

    async fn record_failed_login(
        &self,
        customer_id: Uuid,
        update: FailedLoginUpdate,
    ) -> Result<LockoutState, StoreError> {
        // Runs on the pool, outside any caller transaction
        let row = sqlx::query(
            r#"
            UPDATE customers SET
                failed_login_attempts = CASE
                    WHEN failed_login_attempts + 1 >= $2 THEN 0
                    ELSE failed_login_attempts + 1
                END,
                locked_until = CASE
                    WHEN failed_login_attempts + 1 >= $2 THEN $3
                    ELSE locked_until
                END,
                updated_at = now()
            WHERE id = $1
            RETURNING failed_login_attempts, locked_until
            "#,
        )
        .bind(customer_id)
        .bind(update.threshold)
        .bind(update.lock_until)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(customer_id))?;

        Ok(LockoutState {
            failed_attempts: row.try_get("failed_login_attempts")?,
            locked_until: row.try_get("locked_until")?,
        })
    }

    async fn reset_failed_logins(&self, customer_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE customers SET failed_login_attempts = 0, updated_at = now() WHERE id = $1",
        )
        .bind(customer_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(customer_id));
        }
        Ok(())
    }

    async fn mark_email_verified(&self, email: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE customers SET email_verified = TRUE, updated_at = now()
            WHERE lower(email) = lower($1) AND NOT email_verified
            "#,
        )
        .bind(email)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn counts(&self) -> Result<CustomerCounts, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE email_verified) AS email_verified
            FROM customers
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CustomerCounts {
            total: row.try_get("total")?,
            email_verified: row.try_get("email_verified")?,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
