use serde::Deserialize;

use crate::models::{program_outcome_name, CourseObjective, CourseOffering, Taxonomy, TaxonomyCodes};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing or invalid parameter: {0}")]
    MissingField(&'static str),
    #[error("no course objectives to save")]
    NoObjectives,
    #[error("{co_no}: objective text is required")]
    EmptyDescription { co_no: String },
    #[error("{co_no}: unknown program outcome {po_no:?}")]
    UnknownProgramOutcome { co_no: String, po_no: String },
    #[error("{co_no}: {code:?} is not a {taxonomy} code")]
    UnknownTaxonomyCode {
        co_no: String,
        taxonomy: &'static str,
        code: String,
    },
}

/// Body of a save request as it arrives; every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveObjectivesRequest {
    pub teacher_id: Option<String>,
    pub course_id: Option<String>,
    pub session: Option<String>,
    pub objectives: Option<Vec<ObjectiveInput>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveInput {
    #[serde(default)]
    pub course_objective: String,
    #[serde(default)]
    pub mapped_program_outcome: String,
    #[serde(flatten)]
    pub taxonomies: TaxonomyCodes,
}

/// A request that passed validation and is ready for the upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedObjectives {
    pub offering: CourseOffering,
    pub objectives: Vec<CourseObjective>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingField(field))
}

fn dedupe_codes(
    co_no: &str,
    mut codes: TaxonomyCodes,
) -> Result<TaxonomyCodes, ValidationError> {
    for taxonomy in Taxonomy::ALL {
        let slot = codes.codes_mut(taxonomy);
        let mut seen: Vec<String> = Vec::with_capacity(slot.len());
        for code in slot.drain(..) {
            let code = code.trim().to_string();
            if !taxonomy.known_codes().contains(&code.as_str()) {
                return Err(ValidationError::UnknownTaxonomyCode {
                    co_no: co_no.to_string(),
                    taxonomy: taxonomy.label(),
                    code,
                });
            }
            if !seen.contains(&code) {
                seen.push(code);
            }
        }
        *slot = seen;
    }
    Ok(codes)
}

impl SaveObjectivesRequest {
    /// Checks required fields and normalises objectives: numbered `CO1..COn`
    /// in submission order, taxonomy codes de-duplicated.
    pub fn validate(self) -> Result<ValidatedObjectives, ValidationError> {
        let offering = CourseOffering {
            teacher_id: required(self.teacher_id, "teacherId")?,
            course_id: required(self.course_id, "courseId")?,
            session: required(self.session, "session")?,
        };
        let inputs = self
            .objectives
            .ok_or(ValidationError::MissingField("objectives"))?;
        if inputs.is_empty() {
            return Err(ValidationError::NoObjectives);
        }

        let objectives = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| {
                let co_no = format!("CO{}", index + 1);
                let description = input.course_objective.trim().to_string();
                if description.is_empty() {
                    return Err(ValidationError::EmptyDescription { co_no });
                }
                let po_no = input.mapped_program_outcome.trim().to_string();
                if program_outcome_name(&po_no).is_none() {
                    return Err(ValidationError::UnknownProgramOutcome { co_no, po_no });
                }
                let taxonomies = dedupe_codes(&co_no, input.taxonomies)?;
                Ok(CourseObjective {
                    co_no,
                    course_objective: description,
                    mapped_program_outcome: po_no,
                    taxonomies,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ValidatedObjectives {
            offering,
            objectives,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> SaveObjectivesRequest {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn valid_request_is_renumbered_and_deduped() {
        let request = parse(
            r#"{
                "teacherId": "T17",
                "courseId": "CSE101",
                "session": "2024-25",
                "objectives": [
                    {"courseObjective": " Explain recursion ", "mappedProgramOutcome": "PO1",
                     "bloomsTaxonomy": ["C2", "C2", "C3"]},
                    {"courseObjective": "Design a parser", "mappedProgramOutcome": "PO3",
                     "thinkingProfile": ["T1"], "personalProfile": ["P5"]}
                ]
            }"#,
        );

        let validated = request.validate().unwrap();

        assert_eq!(validated.offering.teacher_id, "T17");
        assert_eq!(validated.objectives.len(), 2);
        assert_eq!(validated.objectives[0].co_no, "CO1");
        assert_eq!(validated.objectives[0].course_objective, "Explain recursion");
        assert_eq!(validated.objectives[0].taxonomies.blooms, vec!["C2", "C3"]);
        assert_eq!(validated.objectives[1].co_no, "CO2");
        assert_eq!(validated.objectives[1].taxonomies.thinking, vec!["T1"]);
    }

    #[test]
    fn missing_identity_fields_are_client_errors() {
        let request = parse(r#"{"courseId": "CSE101", "session": "2024-25", "objectives": []}"#);
        assert_eq!(
            request.validate(),
            Err(ValidationError::MissingField("teacherId"))
        );

        let request = parse(r#"{"teacherId": " ", "courseId": "CSE101", "session": "2024-25"}"#);
        assert_eq!(
            request.validate(),
            Err(ValidationError::MissingField("teacherId"))
        );

        let request = parse(r#"{"teacherId": "T1", "courseId": "CSE101", "session": "2024-25"}"#);
        assert_eq!(
            request.validate(),
            Err(ValidationError::MissingField("objectives"))
        );
    }

    #[test]
    fn empty_objective_list_is_rejected() {
        let request = parse(
            r#"{"teacherId": "T1", "courseId": "CSE101", "session": "2024-25", "objectives": []}"#,
        );
        assert_eq!(request.validate(), Err(ValidationError::NoObjectives));
    }

    #[test]
    fn objective_needs_text_and_known_outcome() {
        let request = parse(
            r#"{"teacherId": "T1", "courseId": "CSE101", "session": "2024-25",
                "objectives": [{"courseObjective": "", "mappedProgramOutcome": "PO1"}]}"#,
        );
        assert!(matches!(
            request.validate(),
            Err(ValidationError::EmptyDescription { .. })
        ));

        let request = parse(
            r#"{"teacherId": "T1", "courseId": "CSE101", "session": "2024-25",
                "objectives": [{"courseObjective": "Model circuits", "mappedProgramOutcome": "PO13"}]}"#,
        );
        assert!(matches!(
            request.validate(),
            Err(ValidationError::UnknownProgramOutcome { .. })
        ));
    }

    #[test]
    fn codes_from_another_category_are_rejected() {
        let request = parse(
            r#"{"teacherId": "T1", "courseId": "CSE101", "session": "2024-25",
                "objectives": [{"courseObjective": "Lead a team", "mappedProgramOutcome": "PO9",
                                "socialProfile": ["F2"]}]}"#,
        );
        assert_eq!(
            request.validate(),
            Err(ValidationError::UnknownTaxonomyCode {
                co_no: "CO1".to_string(),
                taxonomy: "Social",
                code: "F2".to_string(),
            })
        );
    }
}
