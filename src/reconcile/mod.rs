//! Reconciliation: matching a freshly proposed plan against a goal's open tasks
//!
//! The engine is a pure function over in-memory snapshots. For every proposed
//! item (in the oracle's order) it either reuses the most similar unmatched
//! pending task or drafts a new one; whatever pending work is left unmatched
//! at the end is archived. Matching is greedy and single-pass, so an early
//! item can claim a task a later item would have matched better.

mod similarity;

use similarity::{is_match, title_similarity};

use crate::model::{Goal, Task, TaskDraft, TaskStatus};
use crate::oracle::ProposedPlanItem;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

/// An existing task moved onto the new plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Retarget {
    pub task_id: String,
    pub title: String,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diff {
    pub to_create: Vec<TaskDraft>,
    pub to_retarget: Vec<Retarget>,
    pub to_archive: Vec<String>,
}

#[cfg(test)]
impl Diff {
    /// Ids of existing tasks this diff touches
    pub fn touched_ids(&self) -> impl Iterator<Item = &str> {
        self.to_retarget
            .iter()
            .map(|r| r.task_id.as_str())
            .chain(self.to_archive.iter().map(String::as_str))
    }
}

/// `reference + (week-1)*7 + (day-1)` days; zero weeks or days count as the first
pub fn due_date_for(reference: DateTime<Utc>, week: u32, day: u32) -> DateTime<Utc> {
    let offset = i64::from(week.saturating_sub(1)) * 7 + i64::from(day.saturating_sub(1));
    reference + Duration::days(offset)
}

/// Compute the create/retarget/archive diff for one goal.
///
/// `completed` only informs the caller's prompt and is never matched.
/// Pending tasks that are archived, belong to another goal, or are not
/// pending/overdue are ignored, so they can never show up in the diff.
pub fn reconcile(
    goal: &Goal,
    completed: &[Task],
    pending: &[Task],
    plan: &[ProposedPlanItem],
    reference_start: DateTime<Utc>,
) -> Diff {
    let mut candidates: Vec<&Task> = pending
        .iter()
        .filter(|t| !t.is_archived)
        .filter(|t| t.status.is_reschedulable())
        .filter(|t| t.goal_id.as_deref() == Some(goal.id.as_str()))
        .collect();
    // Earliest-created first so ties resolve to the oldest task
    candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    debug!(
        "Reconciling goal {}: {} proposed items, {} pending, {} completed",
        goal.id,
        plan.len(),
        candidates.len(),
        completed.len()
    );

    let mut matched = vec![false; candidates.len()];
    let mut diff = Diff::default();
    let mut next_order: i64 = 0;

    for item in plan {
        let due_date = due_date_for(reference_start, item.week, item.day);

        let mut best: Option<(usize, f64)> = None;
        for (idx, task) in candidates.iter().enumerate() {
            if matched[idx] {
                continue;
            }
            let similarity = title_similarity(&task.title, &item.title);
            if !is_match(similarity) {
                continue;
            }
            if best.map_or(true, |(_, best_sim)| similarity > best_sim) {
                best = Some((idx, similarity));
            }
        }

        match best {
            Some((idx, similarity)) => {
                matched[idx] = true;
                let task = candidates[idx];
                debug!(
                    "'{}' matches task {} '{}' ({:.2})",
                    item.title, task.id, task.title, similarity
                );
                diff.to_retarget.push(Retarget {
                    task_id: task.id.clone(),
                    title: item.title.clone(),
                    due_date,
                });
            }
            None => {
                diff.to_create.push(TaskDraft {
                    user_id: goal.user_id.clone(),
                    goal_id: goal.id.clone(),
                    title: item.title.clone(),
                    description: item.description.clone(),
                    status: TaskStatus::Pending,
                    due_date,
                    order_index: next_order,
                });
                next_order += 1;
            }
        }
    }

    diff.to_archive = candidates
        .iter()
        .zip(&matched)
        .filter(|(_, was_matched)| !**was_matched)
        .map(|(task, _)| task.id.clone())
        .collect();

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GoalStatus, SkillLevel};
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
    }

    fn goal() -> Goal {
        Goal {
            id: "goal-1".to_string(),
            user_id: "user-1".to_string(),
            title: "Learn Guitar".to_string(),
            duration_days: 28,
            time_per_day_hours: 1.0,
            skill_level: SkillLevel::Beginner,
            target_date: None,
            status: GoalStatus::Active,
            created_at: start(),
            updated_at: start(),
        }
    }

    fn task(id: &str, title: &str, status: TaskStatus, created_minute: u32) -> Task {
        let created = Utc
            .with_ymd_and_hms(2026, 4, 1, 8, created_minute, 0)
            .unwrap();
        Task {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            goal_id: Some("goal-1".to_string()),
            title: title.to_string(),
            description: None,
            status,
            due_date: None,
            order_index: 0,
            is_archived: false,
            created_at: created,
            updated_at: created,
        }
    }

    fn pending(id: &str, title: &str, created_minute: u32) -> Task {
        task(id, title, TaskStatus::Pending, created_minute)
    }

    fn item(week: u32, day: u32, title: &str) -> ProposedPlanItem {
        ProposedPlanItem {
            week,
            milestone: "Basics".to_string(),
            day,
            title: title.to_string(),
            description: None,
        }
    }

    fn assert_coverage(diff: &Diff, plan_len: usize) {
        assert_eq!(diff.to_create.len() + diff.to_retarget.len(), plan_len);
        let retargeted: HashSet<_> = diff.to_retarget.iter().map(|r| &r.task_id).collect();
        let archived: HashSet<_> = diff.to_archive.iter().collect();
        assert!(retargeted.is_disjoint(&archived));
    }

    #[test]
    fn test_learn_guitar_below_threshold_creates_and_archives() {
        let pending = vec![
            pending("t1", "Practice chords", 0),
            pending("t2", "Learn scales", 1),
        ];
        let plan = vec![
            item(1, 1, "Practice basic chords"),
            item(1, 2, "Learn music theory"),
        ];

        let diff = reconcile(&goal(), &[], &pending, &plan, start());

        assert!(diff.to_retarget.is_empty());
        let titles: Vec<_> = diff.to_create.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Practice basic chords", "Learn music theory"]);
        assert_eq!(diff.to_archive, vec!["t1", "t2"]);
        assert_coverage(&diff, plan.len());
    }

    #[test]
    fn test_close_title_retargets_instead_of_creating() {
        let pending = vec![pending("t1", "Write chapter one draft", 0)];
        let plan = vec![item(2, 3, "Write chapter one draft outline")];

        let diff = reconcile(&goal(), &[], &pending, &plan, start());

        assert!(diff.to_create.is_empty());
        assert!(diff.to_archive.is_empty());
        assert_eq!(
            diff.to_retarget,
            vec![Retarget {
                task_id: "t1".to_string(),
                title: "Write chapter one draft outline".to_string(),
                due_date: start() + Duration::days(9),
            }]
        );
    }

    #[test]
    fn test_empty_plan_archives_all_pending() {
        let completed = vec![task("c1", "Tune guitar", TaskStatus::Completed, 0)];
        let pending = vec![
            pending("t1", "Practice chords", 1),
            task("t2", "Learn scales", TaskStatus::Overdue, 2),
        ];

        let diff = reconcile(&goal(), &completed, &pending, &[], start());

        assert!(diff.to_create.is_empty());
        assert!(diff.to_retarget.is_empty());
        assert_eq!(diff.to_archive, vec!["t1", "t2"]);
    }

    #[test]
    fn test_completed_tasks_never_enter_the_diff() {
        let completed = vec![task("c1", "Practice chords", TaskStatus::Completed, 0)];
        // A completed task smuggled into the pending list is still ignored
        let pending = vec![
            task("c2", "Learn scales", TaskStatus::Completed, 1),
            task("ip", "Learn scales daily", TaskStatus::InProgress, 2),
        ];
        let plan = vec![item(1, 1, "Practice chords"), item(1, 2, "Learn scales")];

        let diff = reconcile(&goal(), &completed, &pending, &plan, start());

        assert_eq!(diff.to_create.len(), 2);
        assert_eq!(diff.touched_ids().count(), 0);
    }

    #[test]
    fn test_archived_and_foreign_tasks_are_invisible() {
        let mut archived = pending("t1", "Practice chords", 0);
        archived.is_archived = true;
        let mut foreign = pending("t2", "Practice chords", 1);
        foreign.goal_id = Some("goal-2".to_string());
        let mut standalone = pending("t3", "Practice chords", 2);
        standalone.goal_id = None;

        let diff = reconcile(
            &goal(),
            &[],
            &[archived, foreign, standalone],
            &[item(1, 1, "Practice chords")],
            start(),
        );

        assert_eq!(diff.to_create.len(), 1);
        assert!(diff.to_retarget.is_empty());
        assert!(diff.to_archive.is_empty());
    }

    #[test]
    fn test_ties_prefer_earliest_created_task() {
        // Input order deliberately differs from creation order
        let pending = vec![
            pending("late", "Practice chords", 30),
            pending("early", "Practice chords", 5),
        ];
        let plan = vec![item(1, 1, "Practice chords"), item(1, 2, "Practice chords")];

        let diff = reconcile(&goal(), &[], &pending, &plan, start());

        let ids: Vec<_> = diff.to_retarget.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
        assert!(diff.to_create.is_empty());
        assert!(diff.to_archive.is_empty());
    }

    #[test]
    fn test_same_creation_time_falls_back_to_id() {
        let pending = vec![pending("b", "Learn scales", 0), pending("a", "Learn scales", 0)];
        let diff = reconcile(&goal(), &[], &pending, &[item(1, 1, "Learn scales")], start());

        assert_eq!(diff.to_retarget[0].task_id, "a");
        assert_eq!(diff.to_archive, vec!["b"]);
    }

    #[test]
    fn test_highest_similarity_wins_over_age() {
        let pending = vec![
            pending("old", "Learn major scales slowly", 0),
            pending("new", "Learn major scales", 10),
        ];
        let diff = reconcile(
            &goal(),
            &[],
            &pending,
            &[item(1, 1, "Learn major scales")],
            start(),
        );

        assert_eq!(diff.to_retarget[0].task_id, "new");
        assert_eq!(diff.to_archive, vec!["old"]);
    }

    #[test]
    fn test_matching_is_greedy_in_plan_order() {
        let pending = vec![pending("t1", "Learn major scales", 0)];
        // The first item (0.75) claims the task before the exact match (1.0)
        let plan = vec![
            item(1, 1, "Learn major scales fast"),
            item(1, 2, "Learn major scales"),
        ];

        let diff = reconcile(&goal(), &[], &pending, &plan, start());

        assert_eq!(diff.to_retarget.len(), 1);
        assert_eq!(diff.to_retarget[0].title, "Learn major scales fast");
        assert_eq!(diff.to_create.len(), 1);
        assert_eq!(diff.to_create[0].title, "Learn major scales");
        assert_coverage(&diff, plan.len());
    }

    #[test]
    fn test_duplicate_proposals_are_independent() {
        let pending = vec![pending("t1", "Review flashcards", 0)];
        let plan = vec![
            item(1, 1, "Review flashcards"),
            item(1, 3, "Review flashcards"),
            item(1, 5, "Review flashcards"),
        ];

        let diff = reconcile(&goal(), &[], &pending, &plan, start());

        assert_eq!(diff.to_retarget.len(), 1);
        assert_eq!(diff.to_retarget[0].due_date, start());
        assert_eq!(diff.to_create.len(), 2);
        assert_eq!(diff.to_create[0].due_date, start() + Duration::days(2));
        assert_eq!(diff.to_create[1].due_date, start() + Duration::days(4));
    }

    #[test]
    fn test_drafts_carry_goal_owner_and_increasing_order() {
        let plan = vec![
            item(1, 1, "Tune the guitar"),
            item(1, 2, "Practice chords"),
            item(2, 1, "Play a song"),
        ];
        let pending = vec![pending("t1", "Practice chords", 0)];

        let diff = reconcile(&goal(), &[], &pending, &plan, start());

        let orders: Vec<_> = diff.to_create.iter().map(|d| d.order_index).collect();
        assert_eq!(orders, vec![0, 1]);
        for draft in &diff.to_create {
            assert_eq!(draft.user_id, "user-1");
            assert_eq!(draft.goal_id, "goal-1");
            assert_eq!(draft.status, TaskStatus::Pending);
        }
        assert_eq!(diff.to_create[1].due_date, start() + Duration::days(7));
    }

    #[test]
    fn test_due_date_offsets() {
        assert_eq!(due_date_for(start(), 1, 1), start());
        assert_eq!(due_date_for(start(), 1, 7), start() + Duration::days(6));
        assert_eq!(due_date_for(start(), 3, 2), start() + Duration::days(15));
        assert_eq!(due_date_for(start(), 0, 0), start());
    }

    #[test]
    fn test_every_unmatched_pending_task_is_archived() {
        let pending = vec![
            pending("t1", "Practice chords", 0),
            pending("t2", "Learn scales", 1),
            pending("t3", "Record yourself playing", 2),
        ];
        let plan = vec![item(1, 1, "Learn scales")];

        let diff = reconcile(&goal(), &[], &pending, &plan, start());

        let mut touched: Vec<_> = diff.touched_ids().collect();
        touched.sort();
        assert_eq!(touched, vec!["t1", "t2", "t3"]);
        assert_eq!(diff.to_archive, vec!["t1", "t3"]);
    }
}
