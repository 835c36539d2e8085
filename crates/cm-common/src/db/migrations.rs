use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{info, instrument};

use crate::db::{DbPoolError, PgPool};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to build pool: {0}")]
    PoolBuild(#[from] DbPoolError),
}

struct Migration {
    id: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        description: "workflow core tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS cm.job_descriptions (
    id UUID PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    requirements JSONB NOT NULL DEFAULT '[]'::jsonb,
    parsed_content TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS cm.workflow_states (
    job_description_id UUID PRIMARY KEY
        REFERENCES cm.job_descriptions(id),
    iteration_count INTEGER NOT NULL DEFAULT 0,
    current_phase TEXT NOT NULL DEFAULT 'INITIAL',
    should_terminate BOOLEAN NOT NULL DEFAULT FALSE,
    scoring_criteria JSONB NOT NULL,
    refined_criteria JSONB,
    error TEXT,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT chk_iteration_count
        CHECK (iteration_count >= 0 AND iteration_count <= 5)
);

CREATE TABLE IF NOT EXISTS cm.candidate_feedback (
    id BIGSERIAL PRIMARY KEY,
    job_description_id UUID NOT NULL
        REFERENCES cm.job_descriptions(id),
    candidate_id UUID NOT NULL,
    is_positive BOOLEAN NOT NULL,
    reason TEXT,
    criteria JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_candidate_feedback_job
    ON cm.candidate_feedback(job_description_id, created_at, id);
"#,
    },
    Migration {
        id: 2,
        description: "refinement history, candidate profiles and iteration summaries",
        sql: r#"
CREATE TABLE IF NOT EXISTS cm.workflow_refinements (
    id BIGSERIAL PRIMARY KEY,
    job_description_id UUID NOT NULL
        REFERENCES cm.job_descriptions(id),
    iteration INTEGER NOT NULL,
    refinement JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT uq_workflow_refinements_job_iteration
        UNIQUE (job_description_id, iteration)
);

CREATE TABLE IF NOT EXISTS cm.candidate_profiles (
    id UUID PRIMARY KEY,
    job_description_id UUID NOT NULL
        REFERENCES cm.job_descriptions(id),
    iteration INTEGER NOT NULL,
    status TEXT NOT NULL,
    match_score REAL NOT NULL,
    profile JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT chk_match_score_range
        CHECK (match_score >= 0.0 AND match_score <= 100.0),
    CONSTRAINT chk_profile_status
        CHECK (status IN ('generated', 'final'))
);

CREATE INDEX IF NOT EXISTS idx_candidate_profiles_job_iteration
    ON cm.candidate_profiles(job_description_id, iteration);

CREATE TABLE IF NOT EXISTS cm.matching_iterations (
    job_description_id UUID NOT NULL
        REFERENCES cm.job_descriptions(id),
    iteration INTEGER NOT NULL,
    total_feedback INTEGER NOT NULL,
    positive_feedback INTEGER NOT NULL,
    upvote_percentage REAL NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (job_description_id, iteration)
);
"#,
    },
];

#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    let mut client = pool.get().await?;
    client
        .batch_execute(
            "CREATE SCHEMA IF NOT EXISTS cm;
             CREATE TABLE IF NOT EXISTS cm.schema_migrations (
                id INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );",
        )
        .await?;

    for migration in MIGRATIONS {
        let already_applied: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM cm.schema_migrations WHERE id = $1)",
                &[&migration.id],
            )
            .await?
            .get(0);

        if already_applied {
            continue;
        }

        let tx = client.transaction().await?;
        tx.batch_execute(migration.sql).await?;
        tx.execute(
            "INSERT INTO cm.schema_migrations (id, description) VALUES ($1, $2)",
            &[&migration.id, &migration.description],
        )
        .await?;
        tx.commit().await?;

        info!(
            id = migration.id,
            description = migration.description,
            "applied migration"
        );
    }

    Ok(())
}
