use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Program outcomes every course objective maps onto.
pub const PROGRAM_OUTCOMES: [(&str, &str); 12] = [
    ("PO1", "Engineering knowledge"),
    ("PO2", "Problem analysis"),
    ("PO3", "Design/development of solutions"),
    ("PO4", "Conduct investigations of complex problems"),
    ("PO5", "Modern tool usage"),
    ("PO6", "The engineer and society"),
    ("PO7", "Environment and sustainability"),
    ("PO8", "Ethics"),
    ("PO9", "Individual and team work"),
    ("PO10", "Communication"),
    ("PO11", "Project management and finance"),
    ("PO12", "Life-long learning"),
];

pub fn program_outcome_name(po_no: &str) -> Option<&'static str> {
    PROGRAM_OUTCOMES
        .iter()
        .find(|(no, _)| *no == po_no)
        .map(|(_, name)| *name)
}

/// A mark is either a number or a non-numeric absence marker such as `"AB"`.
#[derive(Debug, Clone, PartialEq)]
pub enum ObtainedMark {
    Numeric(f64),
    Absent(String),
}

impl ObtainedMark {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            ObtainedMark::Numeric(value) => Some(*value),
            ObtainedMark::Absent(_) => None,
        }
    }
}

impl fmt::Display for ObtainedMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObtainedMark::Numeric(value) => write!(f, "{value}"),
            ObtainedMark::Absent(marker) => write!(f, "{marker}"),
        }
    }
}

impl Serialize for ObtainedMark {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ObtainedMark::Numeric(value) => serializer.serialize_f64(*value),
            ObtainedMark::Absent(marker) => serializer.serialize_str(marker),
        }
    }
}

impl<'de> Deserialize<'de> for ObtainedMark {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(value) => ObtainedMark::Numeric(value),
            Raw::Text(marker) => ObtainedMark::Absent(marker),
        })
    }
}

/// Result-shaped score row: one flattened row per student per CO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub student_id: String,
    pub student_name: String,
    pub course_id: String,
    pub session: String,
    pub teacher_id: String,
    #[serde(rename = "co_no")]
    pub co_no: String,
    pub assessment_type: String,
    pub pass_mark: f64,
    pub obtained_mark: ObtainedMark,
    #[serde(rename = "po_no")]
    pub po_no: String,
}

impl ScoreRecord {
    pub fn offering(&self) -> CourseOffering {
        CourseOffering {
            course_id: self.course_id.clone(),
            session: self.session.clone(),
            teacher_id: self.teacher_id.clone(),
        }
    }
}

/// Entry-shaped dashboard row: one assessment of a CO with its nested student scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub teacher_id: String,
    pub course_id: String,
    #[serde(rename = "co_no")]
    pub co_no: String,
    pub assessment_type: String,
    pub pass_mark: f64,
    pub scores: Vec<StudentScore>,
    #[serde(rename = "po_no")]
    pub po_no: String,
    pub session: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentScore {
    pub student_id: String,
    pub name: String,
    pub obtained_mark: ObtainedMark,
}

/// Key a course offering is tracked under. Two teachers of the same course in
/// the same session are distinct offerings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CourseOffering {
    pub course_id: String,
    pub session: String,
    pub teacher_id: String,
}

impl fmt::Display for CourseOffering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.course_id, self.session, self.teacher_id)
    }
}

/// The five independent competency taxonomies an objective can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Taxonomy {
    Blooms,
    Fundamental,
    Social,
    Thinking,
    Personal,
}

impl Taxonomy {
    pub const ALL: [Taxonomy; 5] = [
        Taxonomy::Blooms,
        Taxonomy::Fundamental,
        Taxonomy::Social,
        Taxonomy::Thinking,
        Taxonomy::Personal,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Taxonomy::Blooms => "Bloom's",
            Taxonomy::Fundamental => "Fundamental",
            Taxonomy::Social => "Social",
            Taxonomy::Thinking => "Thinking",
            Taxonomy::Personal => "Personal",
        }
    }

    /// Codes a teacher may tag an objective with in this category.
    pub fn known_codes(self) -> &'static [&'static str] {
        match self {
            Taxonomy::Blooms => &[
                "C1", "C2", "C3", "C4", "C5", "C6", "A1", "A2", "A3", "A4", "A5", "P1", "P2",
                "P3", "P4", "P5", "P6", "P7",
            ],
            Taxonomy::Fundamental => &["F1", "F2", "F3", "F4", "F5", "F6"],
            Taxonomy::Social => &["S1", "S2", "S3", "S4", "S5"],
            Taxonomy::Thinking => &["T1", "T2", "T3", "T4"],
            Taxonomy::Personal => &["P1", "P2", "P3", "P4", "P5"],
        }
    }
}

impl fmt::Display for Taxonomy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyCodes {
    #[serde(default, rename = "bloomsTaxonomy")]
    pub blooms: Vec<String>,
    #[serde(default, rename = "fundamentalProfile")]
    pub fundamental: Vec<String>,
    #[serde(default, rename = "socialProfile")]
    pub social: Vec<String>,
    #[serde(default, rename = "thinkingProfile")]
    pub thinking: Vec<String>,
    #[serde(default, rename = "personalProfile")]
    pub personal: Vec<String>,
}

impl TaxonomyCodes {
    pub fn codes(&self, taxonomy: Taxonomy) -> &[String] {
        match taxonomy {
            Taxonomy::Blooms => &self.blooms,
            Taxonomy::Fundamental => &self.fundamental,
            Taxonomy::Social => &self.social,
            Taxonomy::Thinking => &self.thinking,
            Taxonomy::Personal => &self.personal,
        }
    }

    pub fn codes_mut(&mut self, taxonomy: Taxonomy) -> &mut Vec<String> {
        match taxonomy {
            Taxonomy::Blooms => &mut self.blooms,
            Taxonomy::Fundamental => &mut self.fundamental,
            Taxonomy::Social => &mut self.social,
            Taxonomy::Thinking => &mut self.thinking,
            Taxonomy::Personal => &mut self.personal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseObjective {
    #[serde(rename = "co_no")]
    pub co_no: String,
    pub course_objective: String,
    pub mapped_program_outcome: String,
    #[serde(flatten)]
    pub taxonomies: TaxonomyCodes,
}

/// Parses `"CO<n>"` into the zero-based objective index `n - 1`.
///
/// `CO0`, non-numeric suffixes and anything without the `CO` prefix yield
/// `None`; the caller treats those as unmatched.
pub fn co_index(co_no: &str) -> Option<usize> {
    let digits = co_no.trim().strip_prefix("CO")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<usize>().ok()?.checked_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn co_index_is_one_based() {
        assert_eq!(co_index("CO1"), Some(0));
        assert_eq!(co_index("CO12"), Some(11));
        assert_eq!(co_index(" CO3 "), Some(2));
    }

    #[test]
    fn co_index_rejects_malformed_references() {
        assert_eq!(co_index("CO0"), None);
        assert_eq!(co_index("CO"), None);
        assert_eq!(co_index("CO-1"), None);
        assert_eq!(co_index("PO3"), None);
        assert_eq!(co_index("CO3a"), None);
    }

    #[test]
    fn obtained_mark_decodes_numbers_and_markers() {
        let numeric: ObtainedMark = serde_json::from_str("85").unwrap();
        assert_eq!(numeric, ObtainedMark::Numeric(85.0));

        let absent: ObtainedMark = serde_json::from_str("\"AB\"").unwrap();
        assert_eq!(absent, ObtainedMark::Absent("AB".to_string()));
        assert_eq!(absent.as_numeric(), None);
    }

    #[test]
    fn objective_reads_flattened_taxonomy_fields() {
        let objective: CourseObjective = serde_json::from_str(
            r#"{
                "co_no": "CO1",
                "courseObjective": "Apply graph search",
                "mappedProgramOutcome": "PO2",
                "bloomsTaxonomy": ["C3", "C4"],
                "socialProfile": ["S1"]
            }"#,
        )
        .unwrap();

        assert_eq!(objective.taxonomies.codes(Taxonomy::Blooms).len(), 2);
        assert_eq!(objective.taxonomies.codes(Taxonomy::Social), ["S1"]);
        assert!(objective.taxonomies.codes(Taxonomy::Personal).is_empty());
    }

    #[test]
    fn score_entry_is_not_a_score_record() {
        let entry = r#"{
            "teacherId": "T1", "courseId": "CSE101", "co_no": "CO1",
            "assessmentType": "Mid", "passMark": 40, "po_no": "PO1",
            "session": "2024", "scores": []
        }"#;
        assert!(serde_json::from_str::<ScoreEntry>(entry).is_ok());
        assert!(serde_json::from_str::<ScoreRecord>(entry).is_err());
    }
}
