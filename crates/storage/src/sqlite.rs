use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use shared::domain::{Lead, LeadId, NewLead};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{validate_new_lead, LeadStore, StoreError, StoreResult};

const LEAD_COLUMNS: &str =
    "id, name, email, phone, source, stage, created_at, last_contact, notes, property_preferences";

/// SQLite-backed lead store.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` opens a separate database.
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(database_url, "lead storage ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Inserts a record that already carries an id, e.g. when importing seed
    /// data. Existing ids are left untouched; returns whether a row was added.
    pub async fn import_lead(&self, lead: &Lead) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO leads (id, name, email, phone, source, stage, created_at, last_contact, notes, property_preferences)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(lead.id.as_str())
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(lead.phone.as_deref())
        .bind(lead.source.as_deref())
        .bind(&lead.stage)
        .bind(lead.created_at)
        .bind(lead.last_contact)
        .bind(encode_notes(&lead.notes)?)
        .bind(encode_preferences(&lead.property_preferences)?)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to import lead {}", lead.id))?;
        Ok(result.rows_affected() > 0)
    }

    /// Closes the pool. Later calls fail with a backend error.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl LeadStore for Storage {
    async fn get_all(&self) -> StoreResult<Vec<Lead>> {
        let rows = sqlx::query(&format!("SELECT {LEAD_COLUMNS} FROM leads ORDER BY seq"))
            .fetch_all(&self.pool)
            .await
            .context("failed to list leads")?;
        let leads = rows.iter().map(lead_from_row).collect::<Result<Vec<_>>>()?;
        Ok(leads)
    }

    async fn get(&self, id: &LeadId) -> StoreResult<Option<Lead>> {
        let row = sqlx::query(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to fetch lead {id}"))?;
        Ok(row.as_ref().map(lead_from_row).transpose()?)
    }

    async fn create(&self, lead: NewLead) -> StoreResult<Lead> {
        validate_new_lead(&lead)?;
        let lead = lead.into_lead(LeadId::new(Uuid::new_v4().to_string()));
        let row = sqlx::query(&format!(
            "INSERT INTO leads (id, name, email, phone, source, stage, created_at, last_contact, notes, property_preferences)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {LEAD_COLUMNS}"
        ))
        .bind(lead.id.as_str())
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(lead.phone.as_deref())
        .bind(lead.source.as_deref())
        .bind(&lead.stage)
        .bind(lead.created_at)
        .bind(lead.last_contact)
        .bind(encode_notes(&lead.notes)?)
        .bind(encode_preferences(&lead.property_preferences)?)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert lead")?;
        let created = lead_from_row(&row)?;
        debug!(lead_id = %created.id, "created lead in sqlite store");
        Ok(created)
    }

    async fn update(&self, id: &LeadId, lead: Lead) -> StoreResult<Lead> {
        let row = sqlx::query(&format!(
            "UPDATE leads
             SET name = ?, email = ?, phone = ?, source = ?, stage = ?, last_contact = ?, notes = ?, property_preferences = ?
             WHERE id = ?
             RETURNING {LEAD_COLUMNS}"
        ))
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(lead.phone.as_deref())
        .bind(lead.source.as_deref())
        .bind(&lead.stage)
        .bind(lead.last_contact)
        .bind(encode_notes(&lead.notes)?)
        .bind(encode_preferences(&lead.property_preferences)?)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to update lead {id}"))?;

        match row {
            Some(row) => Ok(lead_from_row(&row)?),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    async fn delete(&self, id: &LeadId) -> StoreResult<Lead> {
        let row = sqlx::query(&format!(
            "DELETE FROM leads WHERE id = ? RETURNING {LEAD_COLUMNS}"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to delete lead {id}"))?;

        match row {
            Some(row) => Ok(lead_from_row(&row)?),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }
}

fn lead_from_row(row: &SqliteRow) -> Result<Lead> {
    let id: String = row.try_get("id")?;
    let notes: String = row.try_get("notes")?;
    let preferences: String = row.try_get("property_preferences")?;
    Ok(Lead {
        notes: serde_json::from_str(&notes)
            .with_context(|| format!("corrupt notes column for lead {id}"))?,
        property_preferences: serde_json::from_str(&preferences)
            .with_context(|| format!("corrupt property_preferences column for lead {id}"))?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        source: row.try_get("source")?,
        stage: row.try_get("stage")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        last_contact: row.try_get::<Option<DateTime<Utc>>, _>("last_contact")?,
        id: LeadId(id),
    })
}

fn encode_notes(notes: &[String]) -> Result<String> {
    serde_json::to_string(notes).context("failed to encode notes")
}

fn encode_preferences(preferences: &Map<String, Value>) -> Result<String> {
    serde_json::to_string(preferences).context("failed to encode property preferences")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}
