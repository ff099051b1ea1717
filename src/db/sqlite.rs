use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::schema::{split_sql_statements, SCHEMA_SQL, SCHEMA_VERSION};
use crate::db::{StateRepository, StorageError};
use crate::kt::types::{
    ContentItemId, KnowledgeState, LearningPath, PathEntry, PathStatus, Response, SkillId,
    StudentId,
};

#[derive(Debug, thiserror::Error)]
pub enum SqliteInitError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Opens (creating if needed) the database at `url` and applies the schema.
    pub async fn connect(url: &str) -> Result<Self, SqliteInitError> {
        if let Some(path) = file_path_of(url) {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| SqliteInitError::Io(e.to_string()))?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| SqliteInitError::Config(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, SqliteInitError> {
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn file_path_of(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(path)
    }
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    let has_metadata: Option<String> = sqlx::query_scalar(
        r#"SELECT "name" FROM "sqlite_master" WHERE "type" = 'table' AND "name" = '_db_metadata'"#,
    )
    .fetch_optional(pool)
    .await?;

    let version: Option<String> = match has_metadata {
        Some(_) => {
            sqlx::query_scalar(
                r#"SELECT "value" FROM "_db_metadata" WHERE "key" = 'schema_version'"#,
            )
            .fetch_optional(pool)
            .await?
        }
        None => None,
    };

    if version.as_deref() == Some(SCHEMA_VERSION) {
        return Ok(());
    }

    for stmt in split_sql_statements(SCHEMA_SQL) {
        sqlx::query(&stmt).execute(pool).await?;
    }

    sqlx::query(r#"INSERT OR REPLACE INTO "_db_metadata" ("key", "value") VALUES ('schema_version', ?)"#)
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    tracing::info!(version = SCHEMA_VERSION, "sqlite schema applied");
    Ok(())
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StorageError::Corrupt(format!("timestamp out of range: {ms}")))
}

fn map_state_row(row: &SqliteRow) -> Result<KnowledgeState, StorageError> {
    Ok(KnowledgeState {
        student_id: StudentId::new(row.try_get::<String, _>("student_id")?),
        skill_id: SkillId::new(row.try_get::<String, _>("skill_id")?),
        mastery: row.try_get("mastery")?,
        opportunities: row.try_get::<i64, _>("opportunities")?.max(0) as u32,
        updated_at: from_millis(row.try_get("updated_at")?)?,
    })
}

fn map_response_row(row: &SqliteRow) -> Result<Response, StorageError> {
    let raw_id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&raw_id)
        .map_err(|e| StorageError::Corrupt(format!("response id {raw_id}: {e}")))?;

    Ok(Response {
        id,
        student_id: StudentId::new(row.try_get::<String, _>("student_id")?),
        item_id: ContentItemId::new(row.try_get::<String, _>("item_id")?),
        skill_id: SkillId::new(row.try_get::<String, _>("skill_id")?),
        correct: row.try_get("correct")?,
        answered_at: from_millis(row.try_get("answered_at")?)?,
        latency_ms: row.try_get("latency_ms")?,
    })
}

async fn upsert_state<'e, E>(executor: E, state: &KnowledgeState) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO "knowledge_states" ("student_id", "skill_id", "mastery", "opportunities", "updated_at")
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT ("student_id", "skill_id") DO UPDATE SET
            "mastery" = excluded."mastery",
            "opportunities" = excluded."opportunities",
            "updated_at" = excluded."updated_at"
        "#,
    )
    .bind(state.student_id.as_str())
    .bind(state.skill_id.as_str())
    .bind(state.mastery)
    .bind(i64::from(state.opportunities))
    .bind(state.updated_at.timestamp_millis())
    .execute(executor)
    .await?;
    Ok(())
}

const RESPONSE_COLUMNS: &str =
    r#""id", "student_id", "item_id", "skill_id", "correct", "answered_at", "latency_ms""#;

#[async_trait]
impl StateRepository for SqliteRepository {
    async fn load_mastery(
        &self,
        student: &StudentId,
        skill: &SkillId,
    ) -> Result<Option<KnowledgeState>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT "student_id", "skill_id", "mastery", "opportunities", "updated_at"
            FROM "knowledge_states"
            WHERE "student_id" = ? AND "skill_id" = ?
            "#,
        )
        .bind(student.as_str())
        .bind(skill.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_state_row).transpose()
    }

    async fn mastery_snapshot(
        &self,
        student: &StudentId,
    ) -> Result<HashMap<SkillId, f64>, StorageError> {
        let rows = sqlx::query(
            r#"SELECT "skill_id", "mastery" FROM "knowledge_states" WHERE "student_id" = ?"#,
        )
        .bind(student.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<(SkillId, f64), StorageError> {
                Ok((
                    SkillId::new(row.try_get::<String, _>("skill_id")?),
                    row.try_get::<f64, _>("mastery")?,
                ))
            })
            .collect()
    }

    async fn save_state(&self, state: &KnowledgeState) -> Result<(), StorageError> {
        upsert_state(&self.pool, state).await?;
        Ok(())
    }

    async fn commit_observation(
        &self,
        response: &Response,
        state: &KnowledgeState,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            r#"INSERT INTO "responses" ({RESPONSE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"#
        ))
        .bind(response.id.to_string())
        .bind(response.student_id.as_str())
        .bind(response.item_id.as_str())
        .bind(response.skill_id.as_str())
        .bind(response.correct)
        .bind(response.answered_at.timestamp_millis())
        .bind(response.latency_ms)
        .execute(&mut *tx)
        .await?;

        upsert_state(&mut *tx, state).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn responses_for(
        &self,
        student: &StudentId,
        skill: &SkillId,
    ) -> Result<Vec<Response>, StorageError> {
        let rows = sqlx::query(&format!(
            r#"SELECT {RESPONSE_COLUMNS} FROM "responses"
               WHERE "student_id" = ? AND "skill_id" = ?
               ORDER BY "seq" ASC"#
        ))
        .bind(student.as_str())
        .bind(skill.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_response_row).collect()
    }

    async fn load_path(&self, student: &StudentId) -> Result<Option<LearningPath>, StorageError> {
        let mut tx = self.pool.begin().await?;

        let header = sqlx::query(
            r#"SELECT "status", "updated_at" FROM "learning_paths" WHERE "student_id" = ?"#,
        )
        .bind(student.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT "skill_id", "is_completed", "completed_at"
            FROM "learning_path_entries"
            WHERE "student_id" = ?
            ORDER BY "position" ASC
            "#,
        )
        .bind(student.as_str())
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let entries = rows
            .iter()
            .map(|row| -> Result<PathEntry, StorageError> {
                let completed_at: Option<i64> = row.try_get("completed_at")?;
                Ok(PathEntry {
                    skill_id: SkillId::new(row.try_get::<String, _>("skill_id")?),
                    is_completed: row.try_get("is_completed")?,
                    completed_at: completed_at.map(from_millis).transpose()?,
                })
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        Ok(Some(LearningPath {
            student_id: student.clone(),
            status: PathStatus::parse(&header.try_get::<String, _>("status")?),
            entries,
            updated_at: from_millis(header.try_get("updated_at")?)?,
        }))
    }

    async fn save_path(&self, path: &LearningPath) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO "learning_paths" ("student_id", "status", "updated_at")
            VALUES (?, ?, ?)
            ON CONFLICT ("student_id") DO UPDATE SET
                "status" = excluded."status",
                "updated_at" = excluded."updated_at"
            "#,
        )
        .bind(path.student_id.as_str())
        .bind(path.status.as_str())
        .bind(path.updated_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        sqlx::query(r#"DELETE FROM "learning_path_entries" WHERE "student_id" = ?"#)
            .bind(path.student_id.as_str())
            .execute(&mut *tx)
            .await?;

        for (position, entry) in path.entries.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO "learning_path_entries"
                    ("student_id", "skill_id", "position", "is_completed", "completed_at")
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(path.student_id.as_str())
            .bind(entry.skill_id.as_str())
            .bind(position as i64)
            .bind(entry.is_completed)
            .bind(entry.completed_at.map(|t| t.timestamp_millis()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_student(&self, student: &StudentId) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "learning_path_entries",
            "learning_paths",
            "responses",
            "knowledge_states",
        ] {
            sqlx::query(&format!(r#"DELETE FROM "{table}" WHERE "student_id" = ?"#))
                .bind(student.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
