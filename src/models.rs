// src/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user. Referenced by every other entity, owned by none.
/// Credentials live with the external identity service; this profile only
/// carries the unique email / username pair and display fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

/// Role granted by a membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Management,
    Member,
    Guest,
    Intern,
}

impl Default for Role {
    fn default() -> Self {
        Role::Member
    }
}

/// Join record granting a user a role within a project. At most one per
/// (project, user) pair, enforced by a unique index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub membership_id: String,
    pub project_id: String,
    pub user_id: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub creator_id: String,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

impl Default for Status {
    fn default() -> Self {
        Status::Pending
    }
}

/// A task. `assignee_ids` is a set (no duplicates); `project_id`, when set,
/// gates assignee additions on project membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub creator_id: String,
    pub title: String,
    pub description: Option<String>,
    pub assignee_ids: Vec<String>,
    pub project_id: Option<String>,
    pub priority: Priority,
    pub status: Status,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A subtask. A non-null `assigned_to` must be one of the parent task's
/// assignees or the task creator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub subtask_id: String,
    pub task_id: String,
    pub title: String,
    pub assigned_to: Option<String>,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A threaded note on a task. `parent_id` is immutable after creation, so
/// reply trees are acyclic by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: String,
    pub task_id: String,
    pub author_id: String,
    pub text: String,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What an asset hangs off. Exactly one of task / project, by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum AssetParent {
    Task(String),
    Project(String),
}

/// Uploaded file metadata. The bytes themselves live with the file store;
/// `locator` is the handle it hands back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: String,
    pub uploaded_by: String,
    pub parent: AssetParent,
    pub file_name: String,
    pub locator: String,
    pub size_bytes: i64,
    pub uploaded_at: DateTime<Utc>,
}

/// Session row for the external token cache; expired rows are reaped by a
/// TTL index on `expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub expires_at: mongodb::bson::DateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_with_space() {
        let s = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(s, "\"In Progress\"");
        let back: Status = serde_json::from_str("\"In Progress\"").unwrap();
        assert_eq!(back, Status::InProgress);
    }

    #[test]
    fn asset_parent_is_tagged() {
        let p = AssetParent::Task("t-1".to_string());
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v, serde_json::json!({ "kind": "task", "id": "t-1" }));
        let q: AssetParent =
            serde_json::from_value(serde_json::json!({ "kind": "project", "id": "p-9" })).unwrap();
        assert_eq!(q, AssetParent::Project("p-9".to_string()));
    }

    #[test]
    fn defaults_match_schema() {
        assert_eq!(Priority::default(), Priority::Medium);
        assert_eq!(Status::default(), Status::Pending);
        assert_eq!(Role::default(), Role::Member);
    }
}
