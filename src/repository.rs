use async_trait::async_trait;

use crate::models::{CourseObjective, CourseOffering, ScoreEntry, ScoreRecord};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored row is malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Unchanged,
}

impl SaveOutcome {
    pub fn message(self) -> &'static str {
        match self {
            SaveOutcome::Saved => "Course objectives saved successfully",
            SaveOutcome::Unchanged => "No changes were made to the course objectives.",
        }
    }
}

#[async_trait]
pub trait ScoreRepository: Send + Sync {
    /// Flattened rows, one per CO assessment the student sat.
    async fn results_for_student(&self, student_id: &str)
        -> Result<Vec<ScoreRecord>, RepositoryError>;

    /// Dashboard rows for a session and program outcome, scores nested per entry.
    async fn entries_for_outcome(
        &self,
        session: &str,
        po_no: &str,
    ) -> Result<Vec<ScoreEntry>, RepositoryError>;
}

#[async_trait]
pub trait ObjectiveRepository: Send + Sync {
    /// Ordered objectives, `CO1` first. Unknown offerings return an empty list.
    async fn objectives(
        &self,
        offering: &CourseOffering,
    ) -> Result<Vec<CourseObjective>, RepositoryError>;

    /// Replaces the objective list of an offering. Last write wins.
    async fn upsert_objectives(
        &self,
        offering: &CourseOffering,
        objectives: &[CourseObjective],
    ) -> Result<SaveOutcome, RepositoryError>;
}
