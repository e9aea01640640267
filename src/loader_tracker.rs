//! Task-tracker loader: paginated API client yielding task documents.
//!
//! Fetches tasks from an Asana-style REST API — either a project's task
//! list or a workspace search scoped to an assignee — one page at a time,
//! following the offset cursor until the API runs out or the configured
//! limit is reached. [`TrackerLoader::next_document`] pulls lazily from the
//! current page buffer, so the loader is a finite, one-pass source with an
//! explicit exhausted state, never a preloaded collection.
//!
//! Each task renders to a text block (name, status, dates, assignee,
//! projects, permalink, notes) with the task GID as the document's stable
//! identity, so re-ingesting a task replaces its earlier chunks.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Deserialize;

use crate::config::TrackerLoaderConfig;
use crate::error::{Error, Result};
use crate::models::Document;

/// API page size cap.
const PAGE_SIZE: usize = 100;

const OPT_FIELDS: &str = "gid,name,notes,completed,completed_at,due_on,due_at,assignee.name,\
                          assignee.gid,projects.name,projects.gid,permalink_url";

enum Route {
    ProjectTasks { project_gid: String },
    AssigneeSearch { workspace_gid: String, user_gid: String },
}

pub struct TrackerLoader {
    client: reqwest::Client,
    base_url: String,
    token: String,
    route: Route,
    limit: usize,
    page: VecDeque<Document>,
    next_offset: Option<String>,
    fetched: usize,
    exhausted: bool,
}

impl TrackerLoader {
    pub fn new(config: &TrackerLoaderConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env).map_err(|_| {
            Error::Configuration(format!(
                "tracker token missing: set the {} environment variable",
                config.token_env
            ))
        })?;

        let route = match (&config.project_gid, &config.workspace_gid, &config.user_gid) {
            (Some(project_gid), _, _) => Route::ProjectTasks {
                project_gid: project_gid.clone(),
            },
            (None, Some(workspace_gid), Some(user_gid)) => Route::AssigneeSearch {
                workspace_gid: workspace_gid.clone(),
                user_gid: user_gid.clone(),
            },
            _ => {
                return Err(Error::Configuration(
                    "tracker loader needs project_gid, or workspace_gid with user_gid".into(),
                ))
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            route,
            limit: config.limit,
            page: VecDeque::new(),
            next_offset: None,
            fetched: 0,
            exhausted: false,
        })
    }

    /// The next task document, or `None` once the source is exhausted.
    pub async fn next_document(&mut self) -> Result<Option<Document>> {
        loop {
            if let Some(doc) = self.page.pop_front() {
                return Ok(Some(doc));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let remaining = self.limit.saturating_sub(self.fetched);
        if remaining == 0 {
            self.exhausted = true;
            return Ok(());
        }

        let url = match &self.route {
            Route::ProjectTasks { project_gid } => {
                format!("{}/projects/{}/tasks", self.base_url, project_gid)
            }
            Route::AssigneeSearch { workspace_gid, .. } => {
                format!("{}/workspaces/{}/tasks/search", self.base_url, workspace_gid)
            }
        };

        let mut request = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("opt_fields", OPT_FIELDS)])
            .query(&[("limit", remaining.min(PAGE_SIZE))]);

        if let Route::AssigneeSearch { user_gid, .. } = &self.route {
            request = request.query(&[("assignee.any", user_gid)]);
        }
        if let Some(offset) = &self.next_offset {
            request = request.query(&[("offset", offset)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Loader(format!(
                "tracker API error {}: {}",
                status, body
            )));
        }

        let payload: TaskPage = response.json().await?;
        self.fetched += payload.data.len();
        for task in payload.data {
            self.page.push_back(task_to_document(task));
        }

        self.next_offset = payload.next_page.and_then(|p| p.offset);
        if self.next_offset.is_none() || self.fetched >= self.limit {
            self.exhausted = true;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TaskPage {
    #[serde(default)]
    data: Vec<Task>,
    #[serde(default)]
    next_page: Option<NextPage>,
}

#[derive(Debug, Deserialize)]
struct NextPage {
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Task {
    gid: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    completed_at: Option<String>,
    #[serde(default)]
    due_on: Option<String>,
    #[serde(default)]
    due_at: Option<String>,
    #[serde(default)]
    permalink_url: Option<String>,
    #[serde(default)]
    assignee: Option<Assignee>,
    #[serde(default)]
    projects: Vec<ProjectRef>,
}

#[derive(Debug, Deserialize)]
struct Assignee {
    #[serde(default)]
    gid: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectRef {
    #[serde(default)]
    gid: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

fn task_to_document(task: Task) -> Document {
    let doc_id = format!("tracker:task:{}", task.gid);
    let name = task.name.clone().unwrap_or_else(|| "(untitled)".to_string());

    let assignee_label = match &task.assignee {
        Some(a) => {
            let name = a.name.clone().unwrap_or_else(|| "Unassigned".to_string());
            match &a.gid {
                Some(gid) => format!("{} ({})", name, gid),
                None => name,
            }
        }
        None => "Unassigned".to_string(),
    };

    let project_names: Vec<&str> = task
        .projects
        .iter()
        .filter_map(|p| p.name.as_deref())
        .collect();
    let project_gids: Vec<&str> = task
        .projects
        .iter()
        .filter_map(|p| p.gid.as_deref())
        .collect();

    let text = format!(
        "Task: {}\nCompleted: {}\nDue on: {}\nDue at: {}\nAssignee: {}\nProjects: {}\nPermalink: {}\n\nNotes:\n{}",
        name,
        task.completed,
        task.due_on.as_deref().unwrap_or("None"),
        task.due_at.as_deref().unwrap_or("None"),
        assignee_label,
        if project_names.is_empty() {
            "None".to_string()
        } else {
            project_names.join(", ")
        },
        task.permalink_url.as_deref().unwrap_or("None"),
        task.notes.as_deref().unwrap_or(""),
    );

    let mut doc = Document::new(doc_id.clone(), text)
        .with_metadata("source_type", "tracker")
        .with_metadata("origin", task.permalink_url.clone().unwrap_or(doc_id))
        .with_metadata("title", name)
        .with_metadata("task_gid", task.gid)
        .with_metadata("completed", task.completed.to_string());

    if let Some(due_on) = task.due_on {
        doc = doc.with_metadata("due_on", due_on);
    }
    // Timestamps come back as RFC 3339; the date prefix is all reporting needs.
    if let Some(completed_at) = task.completed_at {
        let date = completed_at.get(..10).unwrap_or(&completed_at).to_string();
        doc = doc.with_metadata("completed_on", date);
    }
    if let Some(assignee) = &task.assignee {
        if let Some(name) = &assignee.name {
            doc = doc.with_metadata("assignee", name.clone());
        }
        if let Some(gid) = &assignee.gid {
            doc = doc.with_metadata("assignee_gid", gid.clone());
        }
    }
    if !project_gids.is_empty() {
        doc = doc.with_metadata("project_gids", project_gids.join(", "));
    }
    if !project_names.is_empty() {
        doc = doc.with_metadata("project_names", project_names.join(", "));
    }

    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task(json: serde_json::Value) -> Task {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_task_renders_to_document() {
        let task = sample_task(serde_json::json!({
            "gid": "1234",
            "name": "Fix the gate latch",
            "notes": "Hinge is bent.",
            "completed": true,
            "completed_at": "2026-08-20T14:03:55.000Z",
            "due_on": "2026-09-01",
            "permalink_url": "https://tracker.example/t/1234",
            "assignee": { "gid": "77", "name": "Sam" },
            "projects": [ { "gid": "9", "name": "Homestead" } ],
        }));

        let doc = task_to_document(task);
        assert_eq!(doc.id, "tracker:task:1234");
        assert!(doc.text.contains("Task: Fix the gate latch"));
        assert!(doc.text.contains("Assignee: Sam (77)"));
        assert!(doc.text.contains("Notes:\nHinge is bent."));
        assert_eq!(doc.metadata.get("source_type").unwrap(), "tracker");
        assert_eq!(
            doc.metadata.get("origin").unwrap(),
            "https://tracker.example/t/1234"
        );
        assert_eq!(doc.metadata.get("project_names").unwrap(), "Homestead");
        assert_eq!(doc.metadata.get("assignee_gid").unwrap(), "77");
        assert_eq!(doc.metadata.get("completed_on").unwrap(), "2026-08-20");
    }

    #[test]
    fn test_sparse_task_gets_defaults() {
        let task = sample_task(serde_json::json!({ "gid": "9" }));
        let doc = task_to_document(task);
        assert_eq!(doc.id, "tracker:task:9");
        assert!(doc.text.contains("Task: (untitled)"));
        assert!(doc.text.contains("Assignee: Unassigned"));
        assert_eq!(doc.metadata.get("origin").unwrap(), "tracker:task:9");
        assert_eq!(doc.metadata.get("title").unwrap(), "(untitled)");
    }

    #[test]
    fn test_page_payload_parses() {
        let page: TaskPage = serde_json::from_value(serde_json::json!({
            "data": [ { "gid": "1" }, { "gid": "2" } ],
            "next_page": { "offset": "abc123" },
        }))
        .unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.next_page.unwrap().offset.as_deref(), Some("abc123"));

        let last: TaskPage = serde_json::from_value(serde_json::json!({ "data": [] })).unwrap();
        assert!(last.next_page.is_none());
    }
}
