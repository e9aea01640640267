//! Deterministic prioritization of ingested tracker tasks.
//!
//! Reads every tracker chunk back out of the vector store (a non-semantic
//! scan), collapses chunk-level records into one entry per task, scores each
//! task, and returns the list best first. Scoring favors overdue work, near
//! due dates, and tasks inside projects that end soon; the weights are fixed
//! so the same corpus always ranks the same way.
//!
//! Completed tasks are hidden unless asked for, and then only those finished
//! within a lookback window. When an assignee GID is given, only that
//! person's tasks are ranked.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::NaiveDate;

use crate::error::Result;
use crate::models::Chunk;
use crate::store::VectorStore;

#[derive(Debug, Clone)]
pub struct PrioritizeOptions {
    pub today: NaiveDate,
    pub include_completed: bool,
    /// Completed tasks older than this many days are dropped even when
    /// `include_completed` is set.
    pub completed_lookback_days: i64,
    /// Restrict to tasks assigned to this GID.
    pub assignee_gid: Option<String>,
}

/// One scored task, with the reasons behind its score.
#[derive(Debug, Clone)]
pub struct RankedTask {
    pub task_gid: String,
    pub title: String,
    pub permalink: String,
    pub completed: bool,
    pub completed_on: Option<NaiveDate>,
    pub due_on: Option<NaiveDate>,
    pub project_names: Vec<String>,
    pub score: f64,
    pub reasons: Vec<String>,
}

/// Rank every tracker task in the store, best first. Equal scores keep
/// ingestion order.
pub async fn prioritize(
    store: &dyn VectorStore,
    options: &PrioritizeOptions,
) -> Result<Vec<RankedTask>> {
    let filters = BTreeMap::from([("source_type".to_string(), "tracker".to_string())]);
    let chunks = store.scan(Some(&filters)).await?;

    let tasks = collapse_by_task(&chunks);
    let project_end = project_end_dates(&tasks);

    let mut ranked = Vec::new();
    for meta in &tasks {
        let row = rank_task(meta, options.today, &project_end);

        if let Some(wanted) = &options.assignee_gid {
            if meta.get("assignee_gid") != Some(wanted) {
                continue;
            }
        }
        if row.completed {
            if !options.include_completed {
                continue;
            }
            let Some(done) = row.completed_on else {
                continue;
            };
            if (options.today - done).num_days() > options.completed_lookback_days {
                continue;
            }
        }

        ranked.push(row);
    }

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(ranked)
}

/// Collapse chunk-level records into one metadata map per task, in first-seen
/// order. Later chunks only fill keys the first occurrence left empty.
fn collapse_by_task(chunks: &[Chunk]) -> Vec<BTreeMap<String, String>> {
    let mut order: Vec<BTreeMap<String, String>> = Vec::new();
    let mut index: BTreeMap<String, usize> = BTreeMap::new();

    for chunk in chunks {
        let gid = chunk
            .metadata
            .get("task_gid")
            .cloned()
            .unwrap_or_else(|| chunk.document_id.clone());

        match index.get(&gid) {
            Some(&i) => {
                let existing = &mut order[i];
                for (key, value) in &chunk.metadata {
                    if value.is_empty() {
                        continue;
                    }
                    let slot = existing.entry(key.clone()).or_default();
                    if slot.is_empty() {
                        *slot = value.clone();
                    }
                }
            }
            None => {
                index.insert(gid, order.len());
                order.push(chunk.metadata.clone());
            }
        }
    }

    order
}

/// Project end date = the latest due date seen across that project's tasks.
fn project_end_dates(tasks: &[BTreeMap<String, String>]) -> BTreeMap<String, NaiveDate> {
    let mut end: BTreeMap<String, NaiveDate> = BTreeMap::new();
    for meta in tasks {
        let Some(due) = meta.get("due_on").and_then(|s| parse_date(s)) else {
            continue;
        };
        for gid in split_list(meta.get("project_gids")) {
            let entry = end.entry(gid).or_insert(due);
            if due > *entry {
                *entry = due;
            }
        }
    }
    end
}

fn rank_task(
    meta: &BTreeMap<String, String>,
    today: NaiveDate,
    project_end: &BTreeMap<String, NaiveDate>,
) -> RankedTask {
    let task_gid = meta.get("task_gid").cloned().unwrap_or_default();
    let title = meta
        .get("title")
        .cloned()
        .unwrap_or_else(|| task_gid.clone());
    let permalink = meta.get("origin").cloned().unwrap_or_default();
    let completed = meta.get("completed").map(|v| v == "true").unwrap_or(false);
    let completed_on = meta.get("completed_on").and_then(|s| parse_date(s));
    let due_on = meta.get("due_on").and_then(|s| parse_date(s));

    let project_gids = split_list(meta.get("project_gids"));
    let project_names = split_list(meta.get("project_names"));

    // The soonest project end among this task's projects drives urgency.
    let project_end_in_days = project_gids
        .iter()
        .filter_map(|gid| project_end.get(gid))
        .min()
        .map(|end| (*end - today).num_days().max(0));

    let (score, reasons) = score_task(today, due_on, project_end_in_days, completed);

    RankedTask {
        task_gid,
        title,
        permalink,
        completed,
        completed_on,
        due_on,
        project_names,
        score,
        reasons,
    }
}

/// Fixed scoring: overdue open tasks get `1000 + 10/day`, any due date adds
/// `100 / |days to due|`, and a looming project end adds `200 / days left`.
fn score_task(
    today: NaiveDate,
    due_on: Option<NaiveDate>,
    project_end_in_days: Option<i64>,
    completed: bool,
) -> (f64, Vec<String>) {
    let mut score = 0.0;
    let mut reasons = Vec::new();

    if let Some(due) = due_on {
        let days_to_due = (due - today).num_days();
        if days_to_due < 0 && !completed {
            let days_overdue = -days_to_due;
            score += 1000.0 + 10.0 * days_overdue as f64;
            reasons.push(format!("overdue ({}d)", days_overdue));
        }
        score += 100.0 / days_to_due.abs().max(1) as f64;
        reasons.push(format!("due {:+}d", days_to_due));
    }

    if let Some(days) = project_end_in_days {
        score += 200.0 / days.max(1) as f64;
        reasons.push(format!("proj ends in {}d", days));
    }

    (score, reasons)
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.get(..10).unwrap_or(value), "%Y-%m-%d").ok()
}

fn split_list(value: Option<&String>) -> Vec<String> {
    value
        .map(|s| {
            s.split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// One display line per ranked task.
pub fn format_row(rank: usize, row: &RankedTask) -> String {
    let due = row
        .due_on
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());
    let project = row
        .project_names
        .first()
        .cloned()
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:>2}. {:>7.1} | due {:<10} | {:<24} | {} ({})",
        rank,
        row.score,
        due,
        project,
        row.title,
        row.reasons.join("; ")
    )
}

/// Render the full ranking as CSV.
pub fn to_csv(rows: &[RankedTask]) -> String {
    let mut out = String::from(
        "rank,score,task_gid,task_name,permalink_url,completed,completed_on,due_on,project_names,reasons\n",
    );
    for (i, row) in rows.iter().enumerate() {
        let _ = writeln!(
            out,
            "{},{:.2},{},{},{},{},{},{},{},{}",
            i + 1,
            row.score,
            csv_field(&row.task_gid),
            csv_field(&row.title),
            csv_field(&row.permalink),
            row.completed,
            row.completed_on.map(|d| d.to_string()).unwrap_or_default(),
            row.due_on.map(|d| d.to_string()).unwrap_or_default(),
            csv_field(&row.project_names.join(", ")),
            csv_field(&row.reasons.join("; ")),
        );
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
