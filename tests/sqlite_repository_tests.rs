mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

use tutor_core::db::{SqliteRepository, StateRepository};
use tutor_core::kt::{
    ContentItem, ContentItemId, KnowledgeState, LearningPath, PathEntry, PathStatus, Response,
    SkillId, StudentId,
};

async fn open(dir: &TempDir) -> SqliteRepository {
    let path = dir.path().join("nested").join("kt.db");
    let url = format!("sqlite:{}?mode=rwc", path.display());
    SqliteRepository::connect(&url).await.unwrap()
}

fn state(student: &str, skill: &str, mastery: f64, opportunities: u32) -> KnowledgeState {
    KnowledgeState {
        student_id: StudentId::from(student),
        skill_id: SkillId::from(skill),
        mastery,
        opportunities,
        updated_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
    }
}

fn response(student: &str, item: &ContentItem, correct: bool, minute: i64) -> Response {
    let at = Utc.timestamp_millis_opt(1_700_000_000_000 + minute * 60_000).unwrap();
    let mut r = Response::new(StudentId::from(student), item, correct, at);
    r.latency_ms = Some(1500);
    r
}

#[tokio::test]
async fn test_commit_observation_round_trip() {
    let dir = TempDir::new().unwrap();
    let repo = open(&dir).await;
    let item = ContentItem::new("a-1", "a", 1);

    let first = response("s", &item, true, 0);
    repo.commit_observation(&first, &state("s", "a", 0.6, 1)).await.unwrap();
    let second = response("s", &item, false, 1);
    repo.commit_observation(&second, &state("s", "a", 0.4, 2)).await.unwrap();

    let loaded = repo
        .load_mastery(&StudentId::from("s"), &SkillId::from("a"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.mastery, 0.4);
    assert_eq!(loaded.opportunities, 2);
    assert_eq!(loaded.updated_at, Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());

    let log = repo
        .responses_for(&StudentId::from("s"), &SkillId::from("a"))
        .await
        .unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].id, first.id);
    assert!(log[0].correct);
    assert_eq!(log[1].id, second.id);
    assert_eq!(log[1].latency_ms, Some(1500));
}

#[tokio::test]
async fn test_mastery_snapshot_is_per_student() {
    let dir = TempDir::new().unwrap();
    let repo = open(&dir).await;

    repo.save_state(&state("s", "a", 0.7, 3)).await.unwrap();
    repo.save_state(&state("s", "b", 0.2, 1)).await.unwrap();
    repo.save_state(&state("t", "a", 0.9, 4)).await.unwrap();

    let snapshot = repo.mastery_snapshot(&StudentId::from("s")).await.unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[&SkillId::from("a")], 0.7);
    assert_eq!(snapshot[&SkillId::from("b")], 0.2);
}

#[tokio::test]
async fn test_learning_path_round_trip_preserves_order() {
    let dir = TempDir::new().unwrap();
    let repo = open(&dir).await;
    let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

    let mut path = LearningPath::new(StudentId::from("s"), now);
    path.status = PathStatus::Active;
    let mut done = PathEntry::new(SkillId::from("z"));
    done.is_completed = true;
    done.completed_at = Some(now);
    path.entries = vec![done, PathEntry::new(SkillId::from("m")), PathEntry::new(SkillId::from("b"))];
    repo.save_path(&path).await.unwrap();

    let loaded = repo.load_path(&StudentId::from("s")).await.unwrap().unwrap();
    assert_eq!(loaded, path);

    path.entries.truncate(1);
    path.status = PathStatus::Completed;
    repo.save_path(&path).await.unwrap();
    let reloaded = repo.load_path(&StudentId::from("s")).await.unwrap().unwrap();
    assert_eq!(reloaded.entries.len(), 1);
    assert_eq!(reloaded.status, PathStatus::Completed);
}

#[tokio::test]
async fn test_delete_student_removes_all_rows() {
    let dir = TempDir::new().unwrap();
    let repo = open(&dir).await;
    let item = ContentItem::new("a-1", "a", 1);
    let student = StudentId::from("s");

    repo.commit_observation(&response("s", &item, true, 0), &state("s", "a", 0.6, 1))
        .await
        .unwrap();
    repo.save_path(&LearningPath::new(student.clone(), Utc::now())).await.unwrap();
    repo.save_state(&state("other", "a", 0.5, 1)).await.unwrap();

    repo.delete_student(&student).await.unwrap();

    assert!(repo.mastery_snapshot(&student).await.unwrap().is_empty());
    assert!(repo
        .responses_for(&student, &SkillId::from("a"))
        .await
        .unwrap()
        .is_empty());
    assert!(repo.load_path(&student).await.unwrap().is_none());
    assert!(repo
        .load_mastery(&StudentId::from("other"), &SkillId::from("a"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_reopen_keeps_data() {
    let dir = TempDir::new().unwrap();
    {
        let repo = open(&dir).await;
        repo.save_state(&state("s", "a", 0.8, 2)).await.unwrap();
        repo.close().await;
    }
    let repo = open(&dir).await;
    let loaded = repo
        .load_mastery(&StudentId::from("s"), &SkillId::from("a"))
        .await
        .unwrap();
    assert_eq!(loaded.map(|s| s.mastery), Some(0.8));
}

#[tokio::test]
async fn test_unreadable_schema_version_is_reported() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::query(r#"CREATE TABLE "_db_metadata" ("key" TEXT PRIMARY KEY, "value" INTEGER)"#)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(r#"INSERT INTO "_db_metadata" VALUES ('schema_version', 7)"#)
        .execute(&pool)
        .await
        .unwrap();

    assert!(SqliteRepository::from_pool(pool.clone()).await.is_err());

    let created: Option<String> = sqlx::query_scalar(
        r#"SELECT "name" FROM "sqlite_master" WHERE "type" = 'table' AND "name" = 'knowledge_states'"#,
    )
    .fetch_optional(&pool)
    .await
    .unwrap();
    assert!(created.is_none());
}

#[tokio::test]
async fn test_fresh_pool_gets_schema() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let repo = SqliteRepository::from_pool(pool.clone()).await.unwrap();
    repo.save_state(&state("s", "a", 0.5, 1)).await.unwrap();

    // A second migration pass over the same database is a no-op.
    let again = SqliteRepository::from_pool(pool).await.unwrap();
    let loaded = again
        .load_mastery(&StudentId::from("s"), &SkillId::from("a"))
        .await
        .unwrap();
    assert_eq!(loaded.map(|s| s.opportunities), Some(1));
}

#[tokio::test]
async fn test_engine_over_sqlite() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(open(&dir).await);
    let engine = common::engine_with(repo.clone());
    let student = StudentId::from("s");

    for item in ["a-1", "a-2"] {
        engine
            .record_response(&student, &ContentItemId::from(item), true)
            .await
            .unwrap();
    }

    let path = engine.get_path(&student).await.unwrap();
    let pending: Vec<&str> = path
        .entries
        .iter()
        .filter(|e| !e.is_completed)
        .map(|e| e.skill_id.as_str())
        .collect();
    assert_eq!(pending, vec!["b", "c"]);

    let replayed = engine.store().replay(&student, &SkillId::from("a")).await.unwrap();
    let stored = engine.get_mastery(&student, &SkillId::from("a")).await.unwrap();
    assert!((replayed - stored).abs() < 1e-12);
}
