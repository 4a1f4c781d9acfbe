use crate::jobs::AdaptationJob;
use crate::model::{Goal, Task, TaskSnapshot};
use chrono::{DateTime, Utc};

const RESPONSE_FORMAT: &str = r#"Respond with ONLY a JSON array, no prose, in exactly this shape:

[{"week": 1, "milestone": "string", "days": [{"day": 1, "task": "string"}]}]

"week" counts from 1. "day" is the day within that week, from 1 to 7.
Each entry in "days" is one task for that day."#;

fn bullet_list(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "- (none)".to_string();
    }
    tasks
        .iter()
        .map(|t| format!("- {}", t.title))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the oracle prompt for one job. Identical inputs give identical text.
pub fn build_prompt(
    goal: &Goal,
    snapshot: &TaskSnapshot,
    job: &AdaptationJob,
    now: DateTime<Utc>,
) -> String {
    let header = match job {
        AdaptationJob::Generate(payload) => format!(
            "Create a day-by-day study plan for the goal \"{}\".\n\n\
            Goal: {}\n\
            Skill level: {}\n\
            Duration: {} days\n\
            Days remaining: {}\n\
            Time available per day: {} hours",
            payload.goal_name,
            payload.goal_name,
            payload.skill_level,
            payload.duration_days,
            goal.remaining_days(now),
            payload.time_per_day_hours
        ),
        AdaptationJob::Adapt(payload) => format!(
            "Revise the remaining plan for the goal \"{}\" after a schedule change ({}).\n\n\
            Goal: {}\n\
            Skill level: {}\n\
            Days remaining: {}\n\
            Time available per day: {} hours",
            goal.title,
            payload.trigger.describe(),
            goal.title,
            goal.skill_level,
            goal.remaining_days(now),
            goal.time_per_day_hours
        ),
    };

    format!(
        "{}\n\n\
        Completed tasks (do not schedule these again):\n{}\n\n\
        Pending and overdue tasks (keep, reword or drop as needed):\n{}\n\n\
        {}",
        header,
        bullet_list(&snapshot.completed),
        bullet_list(&snapshot.pending),
        RESPONSE_FORMAT
    )
}
