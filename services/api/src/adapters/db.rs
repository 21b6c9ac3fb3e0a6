//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ExamStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::domain::{ExamDefinition, Incident, Question, Submission};
use exam_core::ports::{ExamStore, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `ExamStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ExamRecord {
    id: Uuid,
    title: String,
    duration_minutes: i32,
    access_code: Option<String>,
    available: bool,
}

impl ExamRecord {
    fn to_domain(self, questions: Vec<Question>) -> ExamDefinition {
        ExamDefinition {
            id: self.id,
            title: self.title,
            duration_minutes: self.duration_minutes.max(0) as u32,
            access_code: self.access_code,
            available: self.available,
            questions,
        }
    }
}

#[derive(FromRow)]
struct QuestionRecord {
    id: Uuid,
    prompt: String,
    options: Option<serde_json::Value>,
    correct_answer: Option<String>,
    points: Option<i32>,
}

impl QuestionRecord {
    fn to_domain(self) -> Question {
        // Options are stored as a JSON array; anything else in the column is
        // treated as "no options" rather than failing the whole exam read.
        let options = self.options.and_then(|value| match value {
            serde_json::Value::Array(items) => Some(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        serde_json::Value::String(s) => Some(s),
                        other => Some(other.to_string()),
                    })
                    .collect::<Vec<String>>(),
            ),
            _ => None,
        });

        Question {
            id: self.id,
            prompt: self.prompt,
            options,
            correct_answer: self.correct_answer,
            points: self.points.and_then(|p| u32::try_from(p).ok()),
        }
    }
}

#[derive(FromRow)]
struct SubmissionRecord {
    exam_id: Uuid,
    admission_id: String,
    score: i32,
    total: i32,
    answers: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl SubmissionRecord {
    fn to_domain(self) -> Submission {
        let answers: BTreeMap<Uuid, String> =
            serde_json::from_value(self.answers).unwrap_or_default();
        Submission {
            exam_id: self.exam_id,
            admission_id: self.admission_id,
            score: self.score.max(0) as u32,
            total: self.total.max(0) as u32,
            answers,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct IncidentRecord {
    exam_id: Uuid,
    admission_id: String,
    reason: String,
    created_at: DateTime<Utc>,
}

impl IncidentRecord {
    fn to_domain(self) -> Incident {
        Incident {
            exam_id: self.exam_id,
            admission_id: self.admission_id,
            reason: self.reason,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `ExamStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ExamStore for DbAdapter {
    async fn read_exam(&self, exam_id: Uuid) -> PortResult<ExamDefinition> {
        let record = sqlx::query_as::<_, ExamRecord>(
            "SELECT id, title, duration_minutes, access_code, available FROM exams WHERE id = $1",
        )
        .bind(exam_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Exam {} not found", exam_id)),
            _ => unexpected(e),
        })?;

        let questions = self.read_questions(exam_id).await?;
        Ok(record.to_domain(questions))
    }

    async fn read_questions(&self, exam_id: Uuid) -> PortResult<Vec<Question>> {
        let records = sqlx::query_as::<_, QuestionRecord>(
            "SELECT id, prompt, options, correct_answer, points \
             FROM exam_questions WHERE exam_id = $1 ORDER BY order_index ASC",
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn read_access_code(&self, exam_id: Uuid) -> PortResult<Option<String>> {
        let code: Option<Option<String>> =
            sqlx::query_scalar("SELECT access_code FROM exams WHERE id = $1")
                .bind(exam_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?;

        match code {
            Some(code) => Ok(code),
            None => Err(PortError::NotFound(format!("Exam {} not found", exam_id))),
        }
    }

    async fn read_retake_flag(&self, exam_id: Uuid, admission_id: &str) -> PortResult<bool> {
        let enabled: Option<bool> = sqlx::query_scalar(
            "SELECT enabled FROM exam_retakes WHERE exam_id = $1 AND admission_id = $2",
        )
        .bind(exam_id)
        .bind(admission_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(enabled.unwrap_or(false))
    }

    async fn find_submission(
        &self,
        exam_id: Uuid,
        admission_id: &str,
    ) -> PortResult<Option<Submission>> {
        let record = sqlx::query_as::<_, SubmissionRecord>(
            "SELECT exam_id, admission_id, score, total, answers, created_at \
             FROM exam_submissions WHERE exam_id = $1 AND admission_id = $2",
        )
        .bind(exam_id)
        .bind(admission_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(|r| r.to_domain()))
    }

    async fn find_incident(
        &self,
        exam_id: Uuid,
        admission_id: &str,
    ) -> PortResult<Option<Incident>> {
        let record = sqlx::query_as::<_, IncidentRecord>(
            "SELECT exam_id, admission_id, reason, created_at \
             FROM exam_incidents WHERE exam_id = $1 AND admission_id = $2 \
             ORDER BY created_at ASC LIMIT 1",
        )
        .bind(exam_id)
        .bind(admission_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(|r| r.to_domain()))
    }

    async fn record_incident(
        &self,
        exam_id: Uuid,
        admission_id: &str,
        reason: &str,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO exam_incidents (id, exam_id, admission_id, reason) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(exam_id)
        .bind(admission_id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn upsert_submission(&self, submission: &Submission) -> PortResult<()> {
        let answers = serde_json::to_value(&submission.answers)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        sqlx::query(
            "INSERT INTO exam_submissions (id, exam_id, admission_id, score, total, answers, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (exam_id, admission_id) DO UPDATE \
             SET score = EXCLUDED.score, total = EXCLUDED.total, \
                 answers = EXCLUDED.answers, created_at = EXCLUDED.created_at",
        )
        .bind(Uuid::new_v4())
        .bind(submission.exam_id)
        .bind(&submission.admission_id)
        .bind(submission.score as i32)
        .bind(submission.total as i32)
        .bind(answers)
        .bind(submission.created_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}
