//! SQLite-backed contact store
use crate::{
    contacts::{Contact, ContactStore, PrivacySetting},
    error::{AuthzError, AuthzResult},
    identity::{ExtendedPublicKey, PublicKey},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::debug;

/// Contact store over the `contact` table
#[derive(Clone)]
pub struct SqliteContactStore {
    db: SqlitePool,
}

impl SqliteContactStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    fn row_to_contact(row: &SqliteRow) -> AuthzResult<Contact> {
        let public_key = PublicKey::parse(&row.try_get::<String, _>("public_key")?)
            .map_err(|e| AuthzError::Internal(format!("Corrupt contact key: {}", e)))?;

        let privacy: PrivacySetting = row.try_get::<String, _>("privacy")?.parse()?;

        let send_trx_address = row
            .try_get::<Option<String>, _>("send_trx_address")?
            .map(|s| ExtendedPublicKey::parse(&s))
            .transpose()
            .map_err(|e| AuthzError::Internal(format!("Corrupt extended key: {}", e)))?;

        Ok(Contact {
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            handle: row.try_get("handle")?,
            public_key,
            privacy,
            send_trx_address,
            icon: row.try_get("icon")?,
            updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
        })
    }
}

#[async_trait]
impl ContactStore for SqliteContactStore {
    async fn lookup_by_public_key(&self, key: &PublicKey) -> AuthzResult<Option<Contact>> {
        let result = sqlx::query(
            r#"
            SELECT public_key, first_name, last_name, handle, privacy,
                   send_trx_address, icon, updated_at
            FROM contact
            WHERE public_key = ?1
            "#,
        )
        .bind(key.to_address())
        .fetch_optional(&self.db)
        .await?;

        result.as_ref().map(Self::row_to_contact).transpose()
    }

    async fn upsert(&self, contact: &Contact) -> AuthzResult<()> {
        debug!("Upserting contact {}", contact.public_key);

        sqlx::query(
            r#"
            INSERT INTO contact (public_key, first_name, last_name, handle, privacy,
                                 send_trx_address, icon, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(public_key) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                handle = excluded.handle,
                privacy = excluded.privacy,
                send_trx_address = excluded.send_trx_address,
                icon = excluded.icon,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(contact.public_key.to_address())
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .bind(&contact.handle)
        .bind(contact.privacy.as_str())
        .bind(contact.send_trx_address.as_ref().map(|k| k.encode()))
        .bind(&contact.icon)
        .bind(contact.updated_at.to_rfc3339())
        .execute(&self.db)
        .await
        .map_err(|e| AuthzError::StoreWriteFailure(e.to_string()))?;

        Ok(())
    }
}

/// Parse RFC3339 timestamp
fn parse_timestamp(s: &str) -> AuthzResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AuthzError::Internal(format!("Invalid timestamp: {}", e)))
}
