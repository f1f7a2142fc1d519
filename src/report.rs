use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::attainment::{Attainment, Verdict};
use crate::models::{program_outcome_name, ScoreEntry, ScoreRecord, Taxonomy};
use crate::paginate::{page_count, paginate, PageGeometry, Placement, Section};

/// What a renderer draws for one placed section.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportSection<'a> {
    /// Dashboard: one CO assessment with its student scores.
    Entry(&'a ScoreEntry),
    /// Student report: every record the student has in one course.
    Course {
        course_id: String,
        rows: Vec<(&'a ScoreRecord, Verdict)>,
    },
}

impl ReportSection<'_> {
    pub fn title(&self) -> String {
        match self {
            ReportSection::Entry(entry) => format!("{} - {}", entry.course_id, entry.co_no),
            ReportSection::Course { course_id, .. } => course_id.clone(),
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            ReportSection::Entry(entry) => entry.scores.len(),
            ReportSection::Course { rows, .. } => rows.len(),
        }
    }
}

pub fn entry_estimate(rows: usize) -> f64 {
    ((rows + 1) * 10 + 20) as f64
}

pub fn course_estimate(rows: usize) -> f64 {
    (15 + rows * 8) as f64
}

/// One section per dashboard entry, in repository order.
pub fn dashboard_sections(entries: &[ScoreEntry]) -> Vec<Section<ReportSection<'_>>> {
    entries
        .iter()
        .map(|entry| Section::new(entry_estimate(entry.scores.len()), ReportSection::Entry(entry)))
        .collect()
}

/// One section per course, ordered by course id.
pub fn student_sections<'a>(
    records: &'a [ScoreRecord],
    verdicts: &[Verdict],
) -> Vec<Section<ReportSection<'a>>> {
    let mut by_course: BTreeMap<&str, Vec<(&'a ScoreRecord, Verdict)>> = BTreeMap::new();
    for (record, verdict) in records.iter().zip(verdicts.iter()) {
        by_course
            .entry(record.course_id.as_str())
            .or_default()
            .push((record, *verdict));
    }

    by_course
        .into_iter()
        .map(|(course_id, rows)| {
            Section::new(
                course_estimate(rows.len()),
                ReportSection::Course {
                    course_id: course_id.to_string(),
                    rows,
                },
            )
        })
        .collect()
}

/// Draws placed sections. Returns the true end-Y when it can be measured.
pub trait DocumentRenderer<T> {
    fn draw(&mut self, placement: &Placement<T>) -> Option<f64>;
}

pub fn lay_out<T, R>(
    geometry: PageGeometry,
    sections: Vec<Section<T>>,
    renderer: &mut R,
) -> Vec<Placement<T>>
where
    R: DocumentRenderer<T>,
{
    paginate(geometry, sections, |placement, _estimate| renderer.draw(placement))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowMetrics {
    pub header_height: f64,
    pub row_height: f64,
}

impl RowMetrics {
    pub fn dashboard() -> Self {
        Self {
            header_height: 8.0,
            row_height: 8.5,
        }
    }

    pub fn student_report() -> Self {
        Self {
            header_height: 5.0,
            row_height: 7.0,
        }
    }

    /// Height of a table with a head row and `rows` body rows.
    pub fn table_height(self, rows: usize) -> f64 {
        self.header_height + (rows + 1) as f64 * self.row_height
    }
}

pub struct MarkdownRenderer {
    metrics: RowMetrics,
    continued_title: Option<String>,
    pages: Vec<String>,
}

impl MarkdownRenderer {
    pub fn new(metrics: RowMetrics) -> Self {
        Self {
            metrics,
            continued_title: None,
            pages: Vec::new(),
        }
    }

    /// Heading repeated on every page after the first.
    pub fn with_continued_title(mut self, title: impl Into<String>) -> Self {
        self.continued_title = Some(title.into());
        self
    }

    fn page(&mut self, page_index: usize) -> &mut String {
        while self.pages.len() <= page_index {
            let number = self.pages.len() + 1;
            let mut page = String::new();
            let _ = writeln!(page, "## Page {number}");
            if number > 1 {
                if let Some(title) = &self.continued_title {
                    let _ = writeln!(page, "_{title}_");
                }
            }
            self.pages.push(page);
        }
        &mut self.pages[page_index]
    }

    pub fn finish(self) -> String {
        self.pages.join("\n")
    }
}

fn write_section(output: &mut String, section: &ReportSection<'_>) {
    let _ = writeln!(output);
    let _ = writeln!(output, "### {}", section.title());
    match section {
        ReportSection::Entry(entry) => {
            let _ = writeln!(
                output,
                "Teacher: {} | Assessment: {} | Pass Mark: {}",
                entry.teacher_id, entry.assessment_type, entry.pass_mark
            );
            let _ = writeln!(output);
            let _ = writeln!(output, "| Student ID | Student Name | Mark |");
            let _ = writeln!(output, "|---|---|---|");
            for score in &entry.scores {
                let _ = writeln!(
                    output,
                    "| {} | {} | {} |",
                    score.student_id, score.name, score.obtained_mark
                );
            }
        }
        ReportSection::Course { rows, .. } => {
            let _ = writeln!(output);
            let _ = writeln!(
                output,
                "| CO | Assessment | Session | Teacher | PO | Pass Mark | Obtained | Verdict |"
            );
            let _ = writeln!(output, "|---|---|---|---|---|---|---|---|");
            for (record, verdict) in rows {
                let _ = writeln!(
                    output,
                    "| {} | {} | {} | {} | {} | {} | {} | {} |",
                    record.co_no,
                    record.assessment_type,
                    record.session,
                    record.teacher_id,
                    record.po_no,
                    record.pass_mark,
                    record.obtained_mark,
                    verdict.label()
                );
            }
        }
    }
}

impl<'a> DocumentRenderer<ReportSection<'a>> for MarkdownRenderer {
    fn draw(&mut self, placement: &Placement<ReportSection<'a>>) -> Option<f64> {
        let page = self.page(placement.page_index);
        write_section(page, &placement.contract);
        Some(placement.y + self.metrics.table_height(placement.contract.row_count()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementSummary {
    pub page_number: usize,
    pub y: f64,
    pub title: String,
    pub rows: usize,
}

pub fn summarize_placements(placements: &[Placement<ReportSection<'_>>]) -> Vec<PlacementSummary> {
    placements
        .iter()
        .map(|placement| PlacementSummary {
            page_number: placement.page_number(),
            y: placement.y,
            title: placement.contract.title(),
            rows: placement.contract.row_count(),
        })
        .collect()
}

/// A laid-out report: the rendered document plus where each section went.
pub struct RenderedReport<'a> {
    pub document: String,
    pub placements: Vec<Placement<ReportSection<'a>>>,
}

impl RenderedReport<'_> {
    pub fn placements_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(&summarize_placements(
            &self.placements,
        ))?)
    }
}

pub fn build_po_report<'a>(
    session: &str,
    po_no: &str,
    entries: &'a [ScoreEntry],
) -> RenderedReport<'a> {
    let mut output = String::new();
    let _ = writeln!(output, "# Program Outcome Achievement Report");
    match program_outcome_name(po_no) {
        Some(name) => {
            let _ = writeln!(output, "Program Outcome: {po_no} ({name})");
        }
        None => {
            let _ = writeln!(output, "Program Outcome: {po_no}");
        }
    }
    let _ = writeln!(output, "Session: {session}");
    let _ = writeln!(output);

    if entries.is_empty() {
        let _ = writeln!(output, "No assessments recorded for this outcome.");
        return RenderedReport {
            document: output,
            placements: Vec::new(),
        };
    }

    let mut renderer = MarkdownRenderer::new(RowMetrics::dashboard());
    let placements = lay_out(
        PageGeometry::dashboard(),
        dashboard_sections(entries),
        &mut renderer,
    );
    output.push_str(&renderer.finish());

    RenderedReport {
        document: output,
        placements,
    }
}

fn write_overview(output: &mut String, attainment: &Attainment) {
    let _ = writeln!(output, "## Profile Achievement Overview");
    let _ = writeln!(output);
    let _ = writeln!(output, "| Category | Achieved | Total | Percentage |");
    let _ = writeln!(output, "|---|---|---|---|");
    for taxonomy in Taxonomy::ALL {
        let count = attainment.tally.get(taxonomy);
        let _ = writeln!(
            output,
            "| {} | {} | {} | {:.1}% |",
            taxonomy.label(),
            count.achieved,
            count.total,
            count.percentage()
        );
    }

    if !attainment.skipped.is_empty() || !attainment.failed_groups.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Note: {} record(s) had no matching course objective and {} course offering(s) could not be loaded; they are excluded from the overview.",
            attainment.skipped.len(),
            attainment.failed_groups.len()
        );
    }
    let _ = writeln!(output);
}

pub fn build_student_report<'a>(
    student_id: &str,
    records: &'a [ScoreRecord],
    attainment: &Attainment,
    generated_at: DateTime<Utc>,
) -> RenderedReport<'a> {
    let student_name = records
        .first()
        .map(|record| record.student_name.as_str())
        .unwrap_or("Unknown student");

    let mut output = String::new();
    let _ = writeln!(output, "# Student Assessment Report");
    let _ = writeln!(output, "Student: {student_name} ({student_id})");
    let _ = writeln!(output, "Generated on: {}", generated_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(output);

    if records.is_empty() {
        let _ = writeln!(output, "No data found for the student ID: {student_id}");
        return RenderedReport {
            document: output,
            placements: Vec::new(),
        };
    }

    write_overview(&mut output, attainment);

    let mut renderer = MarkdownRenderer::new(RowMetrics::student_report())
        .with_continued_title("Student Assessment Report (Continued)");
    let placements = lay_out(
        PageGeometry::student_report(),
        student_sections(records, &attainment.verdicts),
        &mut renderer,
    );
    output.push_str(&renderer.finish());

    tracing::debug!(
        target: "report",
        student_id,
        sections = placements.len(),
        pages = page_count(&placements),
        "student report laid out"
    );

    RenderedReport {
        document: output,
        placements,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::attainment::{AchievementTally, CategoryCount};
    use crate::models::{ObtainedMark, StudentScore};

    fn entry(course: &str, co: &str, students: usize) -> ScoreEntry {
        ScoreEntry {
            teacher_id: "T1001".to_string(),
            course_id: course.to_string(),
            co_no: co.to_string(),
            assessment_type: "Mid Term".to_string(),
            pass_mark: 40.0,
            scores: (0..students)
                .map(|i| StudentScore {
                    student_id: format!("22549010{i:02}"),
                    name: format!("Student {i}"),
                    obtained_mark: if i % 5 == 4 {
                        ObtainedMark::Absent("AB".to_string())
                    } else {
                        ObtainedMark::Numeric(30.0 + i as f64)
                    },
                })
                .collect(),
            po_no: "PO2".to_string(),
            session: "2024-25".to_string(),
        }
    }

    fn record(course: &str, co: &str, mark: ObtainedMark) -> ScoreRecord {
        ScoreRecord {
            student_id: "2254901027".to_string(),
            student_name: "Nadia Rahman".to_string(),
            course_id: course.to_string(),
            session: "2024-25".to_string(),
            teacher_id: "T1001".to_string(),
            co_no: co.to_string(),
            assessment_type: "Quiz".to_string(),
            pass_mark: 40.0,
            obtained_mark: mark,
            po_no: "PO1".to_string(),
        }
    }

    fn attainment_for(records: &[ScoreRecord]) -> Attainment {
        Attainment {
            tally: AchievementTally {
                blooms: CategoryCount { achieved: 2, total: 4 },
                ..AchievementTally::default()
            },
            verdicts: records
                .iter()
                .map(|r| Verdict::classify(&r.obtained_mark, r.pass_mark))
                .collect(),
            skipped: Vec::new(),
            failed_groups: Vec::new(),
        }
    }

    #[test]
    fn estimates_match_table_shapes() {
        assert_eq!(entry_estimate(3), 60.0);
        assert_eq!(course_estimate(3), 39.0);
    }

    #[test]
    fn student_sections_sort_by_course() {
        let records = vec![
            record("EEE205", "CO1", ObtainedMark::Numeric(50.0)),
            record("CSE101", "CO1", ObtainedMark::Numeric(20.0)),
            record("EEE205", "CO2", ObtainedMark::Absent("AB".to_string())),
        ];
        let verdicts = attainment_for(&records).verdicts;

        let sections = student_sections(&records, &verdicts);

        let titles: Vec<String> = sections.iter().map(|s| s.contract.title()).collect();
        assert_eq!(titles, vec!["CSE101", "EEE205"]);
        assert_eq!(sections[1].estimated_height, course_estimate(2));
        match &sections[1].contract {
            ReportSection::Course { rows, .. } => {
                assert_eq!(rows[0].1, Verdict::Pass);
                assert_eq!(rows[1].1, Verdict::Absent);
            }
            other => panic!("unexpected section {other:?}"),
        }
    }

    #[test]
    fn po_report_breaks_pages_without_splitting_tables() {
        let entries: Vec<ScoreEntry> = (1..=6)
            .map(|co| entry("CSE101", &format!("CO{co}"), 12))
            .collect();

        let report = build_po_report("2024-25", "PO2", &entries);

        assert_eq!(report.placements.len(), 6);
        assert!(report.placements.iter().any(|p| p.page_index > 0));
        for placement in &report.placements {
            let estimated_end = placement.y + entry_estimate(placement.contract.row_count());
            let first_on_page = report
                .placements
                .iter()
                .find(|p| p.page_index == placement.page_index)
                .map(|p| std::ptr::eq(p, placement))
                .unwrap_or(false);
            assert!(first_on_page || estimated_end <= PageGeometry::dashboard().content_height);
        }
        assert!(report.document.contains("## Page 2"));
        assert!(report.document.contains("Program Outcome: PO2 (Problem analysis)"));
    }

    #[test]
    fn renderer_measurement_drives_cursor() {
        let entries = vec![entry("CSE101", "CO1", 2), entry("CSE101", "CO2", 2)];
        let report = build_po_report("2024-25", "PO2", &entries);

        let first = &report.placements[0];
        let expected = first.y + RowMetrics::dashboard().table_height(2) + 15.0;
        assert_eq!(report.placements[1].y, expected);
    }

    #[test]
    fn student_report_has_overview_and_continued_pages() {
        let mut records = Vec::new();
        for course in ["CSE101", "CSE203", "EEE205", "MAT110"] {
            for co in 1..=6 {
                records.push(record(course, &format!("CO{co}"), ObtainedMark::Numeric(55.0)));
            }
        }
        let attainment = attainment_for(&records);
        let generated = Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap();

        let report = build_student_report("2254901027", &records, &attainment, generated);

        assert!(report.document.contains("Student: Nadia Rahman (2254901027)"));
        assert!(report.document.contains("| Bloom's | 2 | 4 | 50.0% |"));
        assert!(report.document.contains("Generated on: 2026-10-16 09:30 UTC"));
        assert!(report.document.contains("Student Assessment Report (Continued)"));
        assert!(page_count(&report.placements) >= 2);
    }

    #[test]
    fn long_first_course_starts_on_second_page() {
        let records: Vec<ScoreRecord> = (1..=18)
            .map(|co| record("CSE101", &format!("CO{co}"), ObtainedMark::Numeric(62.0)))
            .collect();
        let attainment = attainment_for(&records);
        let generated = Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap();

        let report = build_student_report("2254901027", &records, &attainment, generated);

        assert_eq!(report.placements.len(), 1);
        let placement = &report.placements[0];
        assert_eq!(placement.page_number(), 2);
        assert_eq!(placement.y, 20.0);
        let geometry = PageGeometry::student_report();
        assert!(placement.y + course_estimate(18) <= geometry.content_height);
        assert!(report.document.contains("Student Assessment Report (Continued)"));
    }

    #[test]
    fn empty_student_report_has_no_placements() {
        let attainment = attainment_for(&[]);
        let generated = Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap();

        let report = build_student_report("2254901099", &[], &attainment, generated);

        assert!(report.placements.is_empty());
        assert!(report.document.contains("No data found"));
    }

    #[test]
    fn placements_serialize_with_page_numbers() {
        let entries = vec![entry("CSE101", "CO1", 1)];
        let report = build_po_report("2024-25", "PO2", &entries);

        let json = report.placements_json().unwrap();
        assert!(json.contains("\"page_number\": 1"));
        assert!(json.contains("\"title\": \"CSE101 - CO1\""));
    }
}
