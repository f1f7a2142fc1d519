//! Rolls score records up into per-taxonomy achievement counters.
//!
//! Records are grouped by course offering, each group's objective list is
//! fetched once, and every record whose `co_no` resolves to an objective adds
//! that objective's taxonomy code counts to the tally. Group outcomes are
//! explicit `Result`s folded together; a failed group contributes nothing.

use futures::future::join_all;

use crate::models::{co_index, CourseObjective, CourseOffering, ObtainedMark, ScoreRecord, Taxonomy};
use crate::repository::ObjectiveRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    Absent,
}

impl Verdict {
    pub fn classify(mark: &ObtainedMark, pass_mark: f64) -> Self {
        match mark.as_numeric() {
            Some(value) if value >= pass_mark => Verdict::Pass,
            Some(_) => Verdict::Fail,
            None => Verdict::Absent,
        }
    }

    pub fn is_achieved(self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn label(self) -> &'static str {
        match self {
            Verdict::Pass => "Pass",
            Verdict::Fail => "Fail",
            Verdict::Absent => "Absent",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCount {
    pub achieved: u32,
    pub total: u32,
}

impl CategoryCount {
    pub fn percentage(self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.achieved) / f64::from(self.total) * 100.0
        }
    }

    pub fn combine(self, other: CategoryCount) -> CategoryCount {
        CategoryCount {
            achieved: self.achieved.saturating_add(other.achieved),
            total: self.total.saturating_add(other.total),
        }
    }

    pub fn summary(self) -> String {
        format!("{}/{} ({:.1}%)", self.achieved, self.total, self.percentage())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AchievementTally {
    pub blooms: CategoryCount,
    pub fundamental: CategoryCount,
    pub social: CategoryCount,
    pub thinking: CategoryCount,
    pub personal: CategoryCount,
}

impl AchievementTally {
    pub fn get(&self, taxonomy: Taxonomy) -> CategoryCount {
        match taxonomy {
            Taxonomy::Blooms => self.blooms,
            Taxonomy::Fundamental => self.fundamental,
            Taxonomy::Social => self.social,
            Taxonomy::Thinking => self.thinking,
            Taxonomy::Personal => self.personal,
        }
    }

    /// Returns a tally with `count` added to one category.
    pub fn with(self, taxonomy: Taxonomy, count: CategoryCount) -> Self {
        let mut next = self;
        let slot = match taxonomy {
            Taxonomy::Blooms => &mut next.blooms,
            Taxonomy::Fundamental => &mut next.fundamental,
            Taxonomy::Social => &mut next.social,
            Taxonomy::Thinking => &mut next.thinking,
            Taxonomy::Personal => &mut next.personal,
        };
        *slot = slot.combine(count);
        next
    }

    pub fn combine(self, other: AchievementTally) -> Self {
        Taxonomy::ALL
            .iter()
            .fold(self, |acc, taxonomy| acc.with(*taxonomy, other.get(*taxonomy)))
    }
}

/// Weight one matched record adds: `|codes|` per non-empty category, counted
/// as achieved only on a pass.
pub fn objective_contribution(objective: &CourseObjective, verdict: Verdict) -> AchievementTally {
    Taxonomy::ALL
        .iter()
        .fold(AchievementTally::default(), |acc, taxonomy| {
            let weight = u32::try_from(objective.taxonomies.codes(*taxonomy).len())
                .unwrap_or(u32::MAX);
            if weight == 0 {
                return acc;
            }
            let achieved = if verdict.is_achieved() { weight } else { 0 };
            acc.with(
                *taxonomy,
                CategoryCount {
                    achieved,
                    total: weight,
                },
            )
        })
}

/// Records of one offering, each paired with its position in the input.
#[derive(Debug, Clone)]
pub struct RecordGroup<'a> {
    pub offering: CourseOffering,
    pub records: Vec<(usize, &'a ScoreRecord)>,
}

/// Partitions records by `(courseId, session, teacherId)` in first-seen order.
pub fn group_by_offering(records: &[ScoreRecord]) -> Vec<RecordGroup<'_>> {
    let mut slots: std::collections::HashMap<CourseOffering, usize> =
        std::collections::HashMap::new();
    let mut groups: Vec<RecordGroup<'_>> = Vec::new();

    for (position, record) in records.iter().enumerate() {
        let offering = record.offering();
        let slot = *slots.entry(offering.clone()).or_insert_with(|| {
            groups.push(RecordGroup {
                offering,
                records: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].records.push((position, record));
    }

    groups
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub position: usize,
    pub offering: CourseOffering,
    pub co_no: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupTally {
    pub tally: AchievementTally,
    pub skipped: Vec<SkippedRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupFailure {
    pub offering: CourseOffering,
    pub reason: String,
}

pub type GroupOutcome = Result<GroupTally, GroupFailure>;

/// Matches every record of a group against its objectives. Records whose CO
/// index falls outside the list are skipped without touching the tally.
pub fn tally_group(group: &RecordGroup<'_>, objectives: &[CourseObjective]) -> GroupTally {
    group
        .records
        .iter()
        .fold(GroupTally::default(), |mut acc, (position, record)| {
            match co_index(&record.co_no).and_then(|index| objectives.get(index)) {
                Some(objective) => {
                    let verdict = Verdict::classify(&record.obtained_mark, record.pass_mark);
                    acc.tally = acc.tally.combine(objective_contribution(objective, verdict));
                }
                None => acc.skipped.push(SkippedRecord {
                    position: *position,
                    offering: group.offering.clone(),
                    co_no: record.co_no.clone(),
                }),
            }
            acc
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStrategy {
    /// Await one group's objectives at a time.
    #[default]
    Sequential,
    /// Fetch every group's objectives at once and fold the results.
    Concurrent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attainment {
    pub tally: AchievementTally,
    /// One verdict per input record, in input order.
    pub verdicts: Vec<Verdict>,
    pub skipped: Vec<SkippedRecord>,
    pub failed_groups: Vec<GroupFailure>,
}

impl Attainment {
    /// Folds group outcomes into the overall result. Failures add zero.
    pub fn from_outcomes<I>(records: &[ScoreRecord], outcomes: I) -> Self
    where
        I: IntoIterator<Item = GroupOutcome>,
    {
        let verdicts = records
            .iter()
            .map(|record| Verdict::classify(&record.obtained_mark, record.pass_mark))
            .collect();

        let seed = Attainment {
            tally: AchievementTally::default(),
            verdicts,
            skipped: Vec::new(),
            failed_groups: Vec::new(),
        };

        outcomes.into_iter().fold(seed, |mut acc, outcome| {
            match outcome {
                Ok(group) => {
                    acc.tally = acc.tally.combine(group.tally);
                    acc.skipped.extend(group.skipped);
                }
                Err(failure) => acc.failed_groups.push(failure),
            }
            acc
        })
    }
}

async fn resolve_group<R>(repo: &R, group: &RecordGroup<'_>) -> GroupOutcome
where
    R: ObjectiveRepository + ?Sized,
{
    match repo.objectives(&group.offering).await {
        Ok(objectives) => {
            let outcome = tally_group(group, &objectives);
            for skipped in &outcome.skipped {
                tracing::debug!(
                    target: "attainment",
                    offering = %skipped.offering,
                    co_no = %skipped.co_no,
                    objectives = objectives.len(),
                    "record has no matching objective"
                );
            }
            Ok(outcome)
        }
        Err(err) => {
            tracing::warn!(
                target: "attainment",
                offering = %group.offering,
                error = %err,
                "objective fetch failed, group contributes nothing"
            );
            Err(GroupFailure {
                offering: group.offering.clone(),
                reason: err.to_string(),
            })
        }
    }
}

/// Aggregates score records for one subject (a student, or a session and PO).
///
/// Never fails: repository errors are isolated per group and an input whose
/// groups all fail yields an all-zero tally.
pub async fn aggregate<R>(repo: &R, records: &[ScoreRecord], strategy: FetchStrategy) -> Attainment
where
    R: ObjectiveRepository + ?Sized,
{
    let groups = group_by_offering(records);

    let outcomes = match strategy {
        FetchStrategy::Sequential => {
            let mut outcomes = Vec::with_capacity(groups.len());
            for group in &groups {
                outcomes.push(resolve_group(repo, group).await);
            }
            outcomes
        }
        FetchStrategy::Concurrent => {
            join_all(groups.iter().map(|group| resolve_group(repo, group))).await
        }
    };

    let attainment = Attainment::from_outcomes(records, outcomes);
    tracing::info!(
        target: "attainment",
        records = records.len(),
        groups = groups.len(),
        skipped = attainment.skipped.len(),
        failed_groups = attainment.failed_groups.len(),
        "aggregation finished"
    );
    attainment
}
