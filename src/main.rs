use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use tutor_core::config::Config;
use tutor_core::db::{SqliteInitError, SqliteRepository};
use tutor_core::kt::{
    Curriculum, CurriculumError, ContentItem, KnowledgeEngine, KtError, ResponseEvent, SkillId,
    StudentId,
};
use tutor_core::logging::init_tracing;

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("KT_CURRICULUM_PATH is not set")]
    MissingCurriculum,
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
    #[error(transparent)]
    Database(#[from] SqliteInitError),
    #[error(transparent)]
    Engine(#[from] KtError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventReply {
    student_id: StudentId,
    skill_id: SkillId,
    new_mastery: f64,
    mastery_achieved: bool,
    next_skill: Option<SkillId>,
    next_item: Option<ContentItem>,
}

#[derive(Debug, Serialize)]
struct ErrorReply {
    error: String,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config);

    if let Err(err) = run(config).await {
        tracing::error!(error = %err, "tutor-core stopped");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), AppError> {
    let path = config
        .curriculum_path
        .clone()
        .ok_or(AppError::MissingCurriculum)?;
    let curriculum = Curriculum::load(&path)
        .await?
        .build(config.engine.default_params)
        .map_err(CurriculumError::from)?;

    let repo = Arc::new(SqliteRepository::connect(&config.database_url).await?);
    tracing::info!(url = %config.database_url, "knowledge store ready");

    let engine = KnowledgeEngine::from_curriculum(config.engine.clone(), curriculum, repo.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match handle_line(&engine, &line).await {
            Ok(reply) => serde_json::to_string(&reply)?,
            Err(err) => {
                tracing::warn!(error = %err, "event rejected");
                serde_json::to_string(&ErrorReply {
                    error: err.to_string(),
                })?
            }
        };
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    repo.close().await;
    tracing::info!("input drained, exiting");
    Ok(())
}

async fn handle_line(engine: &KnowledgeEngine, line: &str) -> Result<EventReply, AppError> {
    let event: ResponseEvent = serde_json::from_str(line)?;
    let student = event.student_id.clone();
    let outcome = engine.record(event).await?;

    let path = engine.get_path(&student).await?;
    let next_skill = path.pending_skills().into_iter().next();
    let next_item = match &next_skill {
        Some(skill) => match engine.select_next(&student, skill).await {
            Ok(item) => Some(item),
            Err(KtError::NoContentAvailable(_)) => None,
            Err(err) => return Err(err.into()),
        },
        None => None,
    };

    Ok(EventReply {
        student_id: student,
        skill_id: outcome.skill_id,
        new_mastery: outcome.new_mastery,
        mastery_achieved: outcome.mastery_achieved,
        next_skill,
        next_item,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
