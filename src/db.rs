use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};
use uuid::Uuid;

use crate::models::{
    CourseObjective, CourseOffering, ObtainedMark, ScoreEntry, ScoreRecord, StudentScore,
    TaxonomyCodes,
};
use crate::repository::{ObjectiveRepository, RepositoryError, SaveOutcome, ScoreRepository};

const DEFAULT_ABSENT_MARKER: &str = "AB";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Stored marks keep a number or an absence marker, never both.
pub fn mark_from_columns(
    obtained: Option<f64>,
    marker: Option<String>,
) -> Result<ObtainedMark, RepositoryError> {
    match (obtained, marker) {
        (Some(value), None) => Ok(ObtainedMark::Numeric(value)),
        (None, Some(marker)) => Ok(ObtainedMark::Absent(marker)),
        (Some(value), Some(marker)) => Err(RepositoryError::Malformed(format!(
            "score has both mark {value} and marker {marker:?}"
        ))),
        (None, None) => Err(RepositoryError::Malformed(
            "score has neither mark nor marker".to_string(),
        )),
    }
}

fn mark_columns(mark: &ObtainedMark) -> (Option<f64>, Option<&str>) {
    match mark {
        ObtainedMark::Numeric(value) => (Some(*value), None),
        ObtainedMark::Absent(marker) => (None, Some(marker.as_str())),
    }
}

/// Spreadsheet cells hold either a number or whatever marker the grader typed.
pub fn parse_mark(cell: &str) -> ObtainedMark {
    let cell = cell.trim();
    match cell.parse::<f64>() {
        Ok(value) if value.is_finite() => ObtainedMark::Numeric(value),
        _ if cell.is_empty() => ObtainedMark::Absent(DEFAULT_ABSENT_MARKER.to_string()),
        _ => ObtainedMark::Absent(cell.to_string()),
    }
}

fn objective_from_row(row: &PgRow) -> Result<CourseObjective, sqlx::Error> {
    Ok(CourseObjective {
        co_no: row.try_get("co_no")?,
        course_objective: row.try_get("course_objective")?,
        mapped_program_outcome: row.try_get("mapped_program_outcome")?,
        taxonomies: TaxonomyCodes {
            blooms: row.try_get("blooms")?,
            fundamental: row.try_get("fundamental")?,
            social: row.try_get("social")?,
            thinking: row.try_get("thinking")?,
            personal: row.try_get("personal")?,
        },
    })
}

const OBJECTIVES_BY_OFFERING: &str = r#"
    SELECT o.co_no, o.course_objective, o.mapped_program_outcome,
           o.blooms, o.fundamental, o.social, o.thinking, o.personal
    FROM coa.course_objectives o
    JOIN coa.course_offerings c ON c.id = o.offering_id
    WHERE c.teacher_id = $1 AND c.course_id = $2 AND c.session = $3
    ORDER BY o.position
"#;

/// Shared by plain reads on the pool and the read inside the save transaction.
async fn fetch_objectives<'e, E>(
    executor: E,
    offering: &'e CourseOffering,
) -> Result<Vec<CourseObjective>, RepositoryError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query(OBJECTIVES_BY_OFFERING)
        .bind(&offering.teacher_id)
        .bind(&offering.course_id)
        .bind(&offering.session)
        .fetch_all(executor)
        .await?;
    rows.iter()
        .map(|row| objective_from_row(row).map_err(RepositoryError::from))
        .collect()
}

#[async_trait]
impl ObjectiveRepository for PgStore {
    async fn objectives(
        &self,
        offering: &CourseOffering,
    ) -> Result<Vec<CourseObjective>, RepositoryError> {
        fetch_objectives(&self.pool, offering).await
    }

    async fn upsert_objectives(
        &self,
        offering: &CourseOffering,
        objectives: &[CourseObjective],
    ) -> Result<SaveOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let existing = fetch_objectives(&mut *tx, offering).await?;
        if existing == objectives {
            tx.commit().await?;
            return Ok(SaveOutcome::Unchanged);
        }

        let offering_id: Uuid = sqlx::query(
            r#"
            INSERT INTO coa.course_offerings (id, teacher_id, course_id, session)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (teacher_id, course_id, session) DO UPDATE
            SET last_modified = now()
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&offering.teacher_id)
        .bind(&offering.course_id)
        .bind(&offering.session)
        .fetch_one(&mut *tx)
        .await?
        .try_get("id")?;

        sqlx::query("DELETE FROM coa.course_objectives WHERE offering_id = $1")
            .bind(offering_id)
            .execute(&mut *tx)
            .await?;

        for (position, objective) in objectives.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| RepositoryError::Malformed("too many objectives".to_string()))?;
            sqlx::query(
                r#"
                INSERT INTO coa.course_objectives
                (offering_id, position, co_no, course_objective, mapped_program_outcome,
                 blooms, fundamental, social, thinking, personal)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(offering_id)
            .bind(position)
            .bind(&objective.co_no)
            .bind(&objective.course_objective)
            .bind(&objective.mapped_program_outcome)
            .bind(&objective.taxonomies.blooms)
            .bind(&objective.taxonomies.fundamental)
            .bind(&objective.taxonomies.social)
            .bind(&objective.taxonomies.thinking)
            .bind(&objective.taxonomies.personal)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(
            target: "db",
            offering = %offering,
            objectives = objectives.len(),
            "course objectives saved"
        );
        Ok(SaveOutcome::Saved)
    }
}

#[async_trait]
impl ScoreRepository for PgStore {
    async fn results_for_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<ScoreRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT s.student_id, s.student_name, s.obtained_mark, s.absent_marker,
                   a.course_id, a.session, a.teacher_id, a.co_no, a.assessment_type,
                   a.pass_mark, a.po_no
            FROM coa.scores s
            JOIN coa.assessments a ON a.id = s.assessment_id
            WHERE s.student_id = $1
            ORDER BY a.created_at, a.course_id, a.co_no
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(ScoreRecord {
                student_id: row.try_get("student_id")?,
                student_name: row.try_get("student_name")?,
                course_id: row.try_get("course_id")?,
                session: row.try_get("session")?,
                teacher_id: row.try_get("teacher_id")?,
                co_no: row.try_get("co_no")?,
                assessment_type: row.try_get("assessment_type")?,
                pass_mark: row.try_get("pass_mark")?,
                obtained_mark: mark_from_columns(
                    row.try_get("obtained_mark")?,
                    row.try_get("absent_marker")?,
                )?,
                po_no: row.try_get("po_no")?,
            });
        }

        Ok(records)
    }

    async fn entries_for_outcome(
        &self,
        session: &str,
        po_no: &str,
    ) -> Result<Vec<ScoreEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.teacher_id, a.course_id, a.co_no, a.assessment_type,
                   a.pass_mark, a.po_no, a.session,
                   s.student_id, s.student_name, s.obtained_mark, s.absent_marker
            FROM coa.assessments a
            LEFT JOIN coa.scores s ON s.assessment_id = a.id
            WHERE a.session = $1 AND a.po_no = $2
            ORDER BY a.created_at, a.id, s.student_id
            "#,
        )
        .bind(session)
        .bind(po_no)
        .fetch_all(&self.pool)
        .await?;

        let mut entries: Vec<(Uuid, ScoreEntry)> = Vec::new();
        for row in rows {
            let id: Uuid = row.try_get("id")?;
            if entries.last().map(|(last, _)| *last) != Some(id) {
                entries.push((
                    id,
                    ScoreEntry {
                        teacher_id: row.try_get("teacher_id")?,
                        course_id: row.try_get("course_id")?,
                        co_no: row.try_get("co_no")?,
                        assessment_type: row.try_get("assessment_type")?,
                        pass_mark: row.try_get("pass_mark")?,
                        scores: Vec::new(),
                        po_no: row.try_get("po_no")?,
                        session: row.try_get("session")?,
                    },
                ));
            }

            let student_id: Option<String> = row.try_get("student_id")?;
            if let (Some(student_id), Some((_, entry))) = (student_id, entries.last_mut()) {
                entry.scores.push(StudentScore {
                    student_id,
                    name: row.try_get("student_name")?,
                    obtained_mark: mark_from_columns(
                        row.try_get("obtained_mark")?,
                        row.try_get("absent_marker")?,
                    )?,
                });
            }
        }

        Ok(entries.into_iter().map(|(_, entry)| entry).collect())
    }
}

async fn upsert_score(pool: &PgPool, record: &ScoreRecord) -> anyhow::Result<u64> {
    let assessment_id: Uuid = sqlx::query(
        r#"
        INSERT INTO coa.assessments
        (id, teacher_id, course_id, session, co_no, assessment_type, pass_mark, po_no)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (teacher_id, course_id, session, co_no, assessment_type) DO UPDATE
        SET pass_mark = EXCLUDED.pass_mark, po_no = EXCLUDED.po_no
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&record.teacher_id)
    .bind(&record.course_id)
    .bind(&record.session)
    .bind(&record.co_no)
    .bind(&record.assessment_type)
    .bind(record.pass_mark)
    .bind(&record.po_no)
    .fetch_one(pool)
    .await?
    .get("id");

    let (obtained, marker) = mark_columns(&record.obtained_mark);
    let result = sqlx::query(
        r#"
        INSERT INTO coa.scores
        (assessment_id, student_id, student_name, obtained_mark, absent_marker)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (assessment_id, student_id) DO UPDATE
        SET student_name = EXCLUDED.student_name,
            obtained_mark = EXCLUDED.obtained_mark,
            absent_marker = EXCLUDED.absent_marker
        "#,
    )
    .bind(assessment_id)
    .bind(&record.student_id)
    .bind(&record.student_name)
    .bind(obtained)
    .bind(marker)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn seed(store: &PgStore) -> anyhow::Result<()> {
    let objectives = vec![
        (
            CourseOffering {
                course_id: "CSE101".to_string(),
                session: "2024-25".to_string(),
                teacher_id: "T1001".to_string(),
            },
            vec![
                seed_objective(
                    1,
                    "Explain program structure and control flow",
                    "PO1",
                    &["C2"],
                    &["F1"],
                    &[],
                    &["T1"],
                    &[],
                ),
                seed_objective(
                    2,
                    "Apply recursion to search problems",
                    "PO2",
                    &["C3", "C4"],
                    &["F2"],
                    &[],
                    &["T2"],
                    &[],
                ),
                seed_objective(
                    3,
                    "Collaborate on a documented project",
                    "PO9",
                    &["A2"],
                    &[],
                    &["S1", "S2"],
                    &[],
                    &["P1"],
                ),
            ],
        ),
        (
            CourseOffering {
                course_id: "EEE205".to_string(),
                session: "2024-25".to_string(),
                teacher_id: "T2040".to_string(),
            },
            vec![
                seed_objective(
                    1,
                    "Analyse linear circuits",
                    "PO2",
                    &["C4"],
                    &["F3"],
                    &[],
                    &["T3"],
                    &[],
                ),
                seed_objective(
                    2,
                    "Evaluate measurement error",
                    "PO4",
                    &["C5"],
                    &["F4", "F5"],
                    &[],
                    &[],
                    &["P3"],
                ),
            ],
        ),
    ];

    for (offering, objectives) in &objectives {
        store
            .upsert_objectives(offering, objectives)
            .await
            .with_context(|| format!("failed to seed objectives for {offering}"))?;
    }

    let scores = vec![
        ("2254901027", "Nadia Rahman", "CSE101", "T1001", "CO1", "Quiz 1", 40.0, "72", "PO1"),
        ("2254901027", "Nadia Rahman", "CSE101", "T1001", "CO2", "Mid Term", 40.0, "35", "PO2"),
        ("2254901027", "Nadia Rahman", "CSE101", "T1001", "CO3", "Project", 40.0, "AB", "PO9"),
        ("2254901027", "Nadia Rahman", "EEE205", "T2040", "CO1", "Final", 40.0, "58", "PO2"),
        ("2254901031", "Imran Hossain", "CSE101", "T1001", "CO2", "Mid Term", 40.0, "81", "PO2"),
        ("2254901031", "Imran Hossain", "EEE205", "T2040", "CO2", "Lab", 40.0, "44", "PO4"),
    ];

    for (student_id, student_name, course_id, teacher_id, co_no, assessment_type, pass_mark, mark, po_no) in
        scores
    {
        let record = ScoreRecord {
            student_id: student_id.to_string(),
            student_name: student_name.to_string(),
            course_id: course_id.to_string(),
            session: "2024-25".to_string(),
            teacher_id: teacher_id.to_string(),
            co_no: co_no.to_string(),
            assessment_type: assessment_type.to_string(),
            pass_mark,
            obtained_mark: parse_mark(mark),
            po_no: po_no.to_string(),
        };
        upsert_score(store.pool(), &record).await?;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn seed_objective(
    index: usize,
    text: &str,
    po_no: &str,
    blooms: &[&str],
    fundamental: &[&str],
    social: &[&str],
    thinking: &[&str],
    personal: &[&str],
) -> CourseObjective {
    let owned = |codes: &[&str]| -> Vec<String> { codes.iter().map(|code| code.to_string()).collect() };
    CourseObjective {
        co_no: format!("CO{index}"),
        course_objective: text.to_string(),
        mapped_program_outcome: po_no.to_string(),
        taxonomies: TaxonomyCodes {
            blooms: owned(blooms),
            fundamental: owned(fundamental),
            social: owned(social),
            thinking: owned(thinking),
            personal: owned(personal),
        },
    }
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: String,
        student_name: String,
        course_id: String,
        session: String,
        teacher_id: String,
        co_no: String,
        assessment_type: String,
        pass_mark: f64,
        obtained_mark: String,
        po_no: String,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut written = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid score row {}", line + 2))?;
        let record = ScoreRecord {
            student_id: row.student_id,
            student_name: row.student_name,
            course_id: row.course_id,
            session: row.session,
            teacher_id: row.teacher_id,
            co_no: row.co_no,
            assessment_type: row.assessment_type,
            pass_mark: row.pass_mark,
            obtained_mark: parse_mark(&row.obtained_mark),
            po_no: row.po_no,
        };

        if upsert_score(pool, &record).await? > 0 {
            written += 1;
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mark_keeps_markers_verbatim() {
        assert_eq!(parse_mark(" 72.5 "), ObtainedMark::Numeric(72.5));
        assert_eq!(parse_mark("AB"), ObtainedMark::Absent("AB".to_string()));
        assert_eq!(parse_mark("Med"), ObtainedMark::Absent("Med".to_string()));
        assert_eq!(parse_mark(""), ObtainedMark::Absent("AB".to_string()));
        assert_eq!(parse_mark("NaN"), ObtainedMark::Absent("NaN".to_string()));
    }

    #[test]
    fn stored_mark_columns_are_exclusive() {
        assert_eq!(
            mark_from_columns(Some(40.0), None).unwrap(),
            ObtainedMark::Numeric(40.0)
        );
        assert_eq!(
            mark_from_columns(None, Some("AB".to_string())).unwrap(),
            ObtainedMark::Absent("AB".to_string())
        );
        assert!(mark_from_columns(Some(40.0), Some("AB".to_string())).is_err());
        assert!(mark_from_columns(None, None).is_err());
    }

    #[test]
    fn mark_columns_round_trip_through_storage_shape() {
        let absent = ObtainedMark::Absent("AB".to_string());
        let (obtained, marker) = mark_columns(&absent);
        assert_eq!(
            mark_from_columns(obtained, marker.map(str::to_string)).unwrap(),
            absent
        );
    }
}
