// src/task.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Duration, Utc};
use futures_util::TryStreamExt;
use log::{info, warn};
use mongodb::bson::{doc, to_bson, Bson, Document};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth;
use crate::comment::{build_comment_tree, CommentNode};
use crate::errors::ApiError;
use crate::models::{Asset, Comment, Priority, Project, Status, Subtask, Task, User};
use crate::project::{is_member, visible_project_ids};
use crate::users::find_active_user;

#[derive(Debug, Deserialize)]
pub struct SubtaskInput {
    pub title: String,
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub project: Option<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub subtasks: Vec<SubtaskInput>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: Status,
    pub due_date: Option<DateTime<Utc>>,
}

/// Update payload. A supplied `subtasks` list REPLACES the task's entire
/// subtask set: existing subtasks are deleted and the list is recreated,
/// so ids omitted from it are gone. Documented behavior, matching the
/// original API.
#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub due_date: Option<DateTime<Utc>>,
    pub assignees: Option<Vec<String>>,
    pub subtasks: Option<Vec<SubtaskInput>>,
}

#[derive(Debug, Deserialize)]
pub struct AddAssigneesRequest {
    pub assignees: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub priority: Option<String>,
    pub status: Option<String>,
    pub created_by_me: Option<bool>,
    pub assigned_to_me: Option<bool>,
    pub due_today: Option<bool>,
    pub overdue: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TaskWithSubtasks {
    #[serde(flatten)]
    pub task: Task,
    pub subtasks: Vec<Subtask>,
}

#[derive(Debug, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub assignees: Vec<User>,
    pub subtasks: Vec<Subtask>,
    pub comments: Vec<CommentNode>,
    pub assets: Vec<Asset>,
}

/// The three-way visibility rule: creator, assignee, or member of the
/// task's project. One boolean, no double counting.
pub fn is_visible(task: &Task, user_id: &str, is_project_member: bool) -> bool {
    task.creator_id == user_id
        || task.assignee_ids.iter().any(|a| a == user_id)
        || (task.project_id.is_some() && is_project_member)
}

/// Mongo form of the visibility rule, for list queries. A single `$or`
/// over one collection, so the result set is inherently distinct.
pub fn visibility_filter(user_id: &str, project_ids: &[String]) -> Document {
    doc! { "$or": [
        { "creator_id": user_id },
        { "assignee_ids": user_id },
        { "project_id": { "$in": project_ids.to_vec() } },
    ] }
}

/// Whether the actor may manage the assignee set: the task creator, or the
/// creator of the task's project.
pub fn may_manage_assignees(task: &Task, project_creator: Option<&str>, actor: &str) -> bool {
    task.creator_id == actor || (task.project_id.is_some() && project_creator == Some(actor))
}

/// The subtask delegation rule: a subtask assignee must sit in the parent
/// task's assignee set or be the task creator.
pub fn delegable(assigned_to: &str, assignee_ids: &[String], creator_id: &str) -> bool {
    assigned_to == creator_id || assignee_ids.iter().any(|a| a == assigned_to)
}

fn validate_due_date(due: &DateTime<Utc>) -> Result<(), ApiError> {
    if due.date_naive() < Utc::now().date_naive() {
        return Err(ApiError::validation("Due date cannot be in the past"));
    }
    Ok(())
}

fn dedupe(ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

/// Anchored case-insensitive match, for the priority/status query filters.
fn iexact(value: &str) -> Document {
    doc! { "$regex": format!("^{}$", regex_escape(value)), "$options": "i" }
}

fn regex_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if !c.is_ascii_alphanumeric() && c != ' ' && c != '-' && c != '_' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn list_filter(
    user_id: &str,
    project_ids: &[String],
    query: &TaskListQuery,
) -> Result<Document, ApiError> {
    let mut clauses = vec![visibility_filter(user_id, project_ids)];
    if let Some(priority) = &query.priority {
        clauses.push(doc! { "priority": iexact(priority) });
    }
    if let Some(status) = &query.status {
        clauses.push(doc! { "status": iexact(status) });
    }
    match query.created_by_me {
        Some(true) => clauses.push(doc! { "creator_id": user_id }),
        Some(false) => clauses.push(doc! { "creator_id": { "$ne": user_id } }),
        None => {}
    }
    if query.assigned_to_me == Some(true) {
        clauses.push(doc! { "assignee_ids": user_id });
    }
    if query.due_today == Some(true) {
        let start = Utc::now()
            .date_naive()
            .and_time(chrono::NaiveTime::MIN)
            .and_utc();
        let end = start + Duration::days(1);
        clauses.push(doc! { "due_date": { "$gte": to_bson(&start)?, "$lt": to_bson(&end)? } });
    }
    if query.overdue == Some(true) {
        clauses.push(doc! {
            "due_date": { "$ne": Bson::Null, "$lt": to_bson(&Utc::now())? },
            "status": { "$ne": "Completed" },
        });
    }
    Ok(doc! { "$and": clauses })
}

/// Loads a task the user can see, or NotFound. Missing and invisible are
/// the same answer on purpose.
pub async fn fetch_visible_task(
    db: &mongodb::Database,
    task_id: &str,
    user_id: &str,
) -> Result<Task, ApiError> {
    let tasks = db.collection::<Task>("tasks");
    let task = tasks
        .find_one(doc! { "task_id": task_id })
        .await?
        .ok_or(ApiError::NotFound("task"))?;

    let mut member = false;
    if let Some(project_id) = &task.project_id {
        let projects = db.collection::<Project>("projects");
        if let Some(project) = projects.find_one(doc! { "project_id": project_id }).await? {
            member = is_member(db, &project, user_id).await?;
        }
    }
    if !is_visible(&task, user_id, member) {
        return Err(ApiError::NotFound("task"));
    }
    Ok(task)
}

async fn load_task_project(
    db: &mongodb::Database,
    task: &Task,
) -> Result<Option<Project>, ApiError> {
    match &task.project_id {
        Some(project_id) => {
            let projects = db.collection::<Project>("projects");
            Ok(projects.find_one(doc! { "project_id": project_id }).await?)
        }
        None => Ok(None),
    }
}

/// Resolves and validates a prospective assignee list: every id must name
/// an active user, and a member of the project when the task is
/// project-scoped. Applied identically at create, update and add time.
async fn validate_assignees(
    db: &mongodb::Database,
    project: Option<&Project>,
    ids: &[String],
) -> Result<Vec<User>, ApiError> {
    let mut users = Vec::with_capacity(ids.len());
    for id in dedupe(ids) {
        let user = find_active_user(db, &id).await?;
        if let Some(project) = project {
            if !is_member(db, project, &user.user_id).await? {
                return Err(ApiError::validation(format!(
                    "User '{}' must be a member of the project to be assigned.",
                    user.username
                )));
            }
        }
        users.push(user);
    }
    Ok(users)
}

/// Builds subtask rows from the request, enforcing the delegation rule
/// against the task's effective assignee set and creator.
async fn build_subtasks(
    db: &mongodb::Database,
    task: &Task,
    inputs: &[SubtaskInput],
) -> Result<Vec<Subtask>, ApiError> {
    let mut rows = Vec::with_capacity(inputs.len());
    for input in inputs {
        if input.title.trim().is_empty() {
            return Err(ApiError::validation("Subtask title must not be empty"));
        }
        if let Some(assigned_to) = &input.assigned_to {
            let user = find_active_user(db, assigned_to).await?;
            if !delegable(assigned_to, &task.assignee_ids, &task.creator_id) {
                return Err(ApiError::validation(format!(
                    "User '{}' must be assigned to the main task before being assigned to a subtask.",
                    user.username
                )));
            }
        }
        let now = Utc::now();
        rows.push(Subtask {
            subtask_id: Uuid::new_v4().to_string(),
            task_id: task.task_id.clone(),
            title: input.title.trim().to_string(),
            assigned_to: input.assigned_to.clone(),
            is_completed: input.is_completed,
            created_at: now,
            updated_at: now,
        });
    }
    Ok(rows)
}

/// GET /tasks
pub async fn list_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<TaskListQuery>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;

    let project_ids = visible_project_ids(db, &current_user).await?;
    let filter = list_filter(&current_user, &project_ids, &query)?;
    let tasks: Vec<Task> = db
        .collection::<Task>("tasks")
        .find(filter)
        .sort(doc! { "due_date": -1, "priority": 1 })
        .await?
        .try_collect()
        .await?;
    Ok(HttpResponse::Ok().json(tasks))
}

/// POST /tasks
/// The creator is the calling user, never client-suppliable. A project
/// scope requires membership; assignees and subtask delegation are
/// validated up front so nothing partial is persisted.
pub async fn create_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateTaskRequest>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;

    if payload.title.trim().is_empty() {
        return Err(ApiError::validation("Task title must not be empty"));
    }
    if let Some(due) = &payload.due_date {
        validate_due_date(due)?;
    }

    let project = match &payload.project {
        Some(project_id) => {
            let projects = db.collection::<Project>("projects");
            let project = projects
                .find_one(doc! { "project_id": project_id })
                .await?
                .ok_or(ApiError::NotFound("project"))?;
            if !is_member(db, &project, &current_user).await? {
                return Err(ApiError::forbidden(
                    "You must be a project member to create tasks in this project",
                ));
            }
            Some(project)
        }
        None => None,
    };

    let assignees = validate_assignees(db, project.as_ref(), &payload.assignees).await?;

    let now = Utc::now();
    let new_task = Task {
        task_id: Uuid::new_v4().to_string(),
        creator_id: current_user,
        title: payload.title.trim().to_string(),
        description: payload.description.clone(),
        assignee_ids: assignees.iter().map(|u| u.user_id.clone()).collect(),
        project_id: payload.project.clone(),
        priority: payload.priority,
        status: payload.status,
        due_date: payload.due_date,
        created_at: now,
        updated_at: now,
    };
    let new_subtasks = build_subtasks(db, &new_task, &payload.subtasks).await?;

    let tasks = db.collection::<Task>("tasks");
    if new_subtasks.is_empty() {
        tasks.insert_one(&new_task).await?;
    } else {
        let mut session = data.mongodb.client.start_session().await?;
        session.start_transaction().await?;
        tasks.insert_one(&new_task).session(&mut session).await?;
        db.collection::<Subtask>("subtasks")
            .insert_many(&new_subtasks)
            .session(&mut session)
            .await?;
        session.commit_transaction().await?;
    }

    info!("Task created: {}", new_task.task_id);
    Ok(HttpResponse::Created().json(TaskWithSubtasks {
        task: new_task,
        subtasks: new_subtasks,
    }))
}

/// GET /tasks/{task_id}
pub async fn get_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let task = fetch_visible_task(db, &path.into_inner(), &current_user).await?;

    let assignees: Vec<User> = db
        .collection::<User>("users")
        .find(doc! { "user_id": { "$in": task.assignee_ids.clone() } })
        .await?
        .try_collect()
        .await?;
    let subtasks: Vec<Subtask> = db
        .collection::<Subtask>("subtasks")
        .find(doc! { "task_id": &task.task_id })
        .sort(doc! { "created_at": 1 })
        .await?
        .try_collect()
        .await?;
    let comments: Vec<Comment> = db
        .collection::<Comment>("comments")
        .find(doc! { "task_id": &task.task_id })
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;
    let assets: Vec<Asset> = db
        .collection::<Asset>("assets")
        .find(doc! { "parent.kind": "task", "parent.id": &task.task_id })
        .await?
        .try_collect()
        .await?;

    Ok(HttpResponse::Ok().json(TaskDetail {
        task,
        assignees,
        subtasks,
        comments: build_comment_tree(comments),
        assets,
    }))
}

/// PUT /tasks/{task_id}
/// Creator-only, stricter than the read rule. A supplied subtask list is a
/// destructive replace (see `UpdateTaskRequest`); delegation is
/// re-validated against the effective assignee set.
pub async fn update_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateTaskRequest>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let mut task = fetch_visible_task(db, &path.into_inner(), &current_user).await?;
    if task.creator_id != current_user {
        return Err(ApiError::forbidden("Only the task creator can update the task"));
    }

    if let Some(title) = &payload.title {
        if title.trim().is_empty() {
            return Err(ApiError::validation("Task title must not be empty"));
        }
        task.title = title.trim().to_string();
    }
    if let Some(description) = &payload.description {
        task.description = Some(description.clone());
    }
    if let Some(priority) = payload.priority {
        task.priority = priority;
    }
    if let Some(status) = payload.status {
        task.status = status;
    }
    if let Some(due) = payload.due_date {
        validate_due_date(&due)?;
        task.due_date = Some(due);
    }
    if let Some(assignee_ids) = &payload.assignees {
        let project = load_task_project(db, &task).await?;
        let users = validate_assignees(db, project.as_ref(), assignee_ids).await?;
        task.assignee_ids = users.into_iter().map(|u| u.user_id).collect();
    }
    task.updated_at = Utc::now();

    let replacement_subtasks = match &payload.subtasks {
        Some(inputs) => Some(build_subtasks(db, &task, inputs).await?),
        None => None,
    };

    let tasks = db.collection::<Task>("tasks");
    let subtasks_coll = db.collection::<Subtask>("subtasks");
    match &replacement_subtasks {
        Some(new_subtasks) => {
            let mut session = data.mongodb.client.start_session().await?;
            session.start_transaction().await?;
            tasks
                .replace_one(doc! { "task_id": &task.task_id }, &task)
                .session(&mut session)
                .await?;
            subtasks_coll
                .delete_many(doc! { "task_id": &task.task_id })
                .session(&mut session)
                .await?;
            if !new_subtasks.is_empty() {
                subtasks_coll
                    .insert_many(new_subtasks)
                    .session(&mut session)
                    .await?;
            }
            session.commit_transaction().await?;
        }
        None => {
            tasks
                .replace_one(doc! { "task_id": &task.task_id }, &task)
                .await?;
        }
    }

    let subtasks = match replacement_subtasks {
        Some(s) => s,
        None => {
            subtasks_coll
                .find(doc! { "task_id": &task.task_id })
                .sort(doc! { "created_at": 1 })
                .await?
                .try_collect()
                .await?
        }
    };
    Ok(HttpResponse::Ok().json(TaskWithSubtasks { task, subtasks }))
}

/// DELETE /tasks/{task_id}
/// Creator-only. Subtasks, comments and task assets go with it, in one
/// transaction; stored files are released after commit.
pub async fn delete_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let task = fetch_visible_task(db, &path.into_inner(), &current_user).await?;
    if task.creator_id != current_user {
        return Err(ApiError::forbidden("Only the task creator can delete the task"));
    }

    let mut session = data.mongodb.client.start_session().await?;
    session.start_transaction().await?;

    let assets = db.collection::<Asset>("assets");
    let asset_filter = doc! { "parent.kind": "task", "parent.id": &task.task_id };
    let mut asset_cursor = assets
        .find(asset_filter.clone())
        .session(&mut session)
        .await?;
    let doomed_assets: Vec<Asset> = asset_cursor.stream(&mut session).try_collect().await?;

    assets
        .delete_many(asset_filter)
        .session(&mut session)
        .await?;
    db.collection::<mongodb::bson::Document>("subtasks")
        .delete_many(doc! { "task_id": &task.task_id })
        .session(&mut session)
        .await?;
    db.collection::<mongodb::bson::Document>("comments")
        .delete_many(doc! { "task_id": &task.task_id })
        .session(&mut session)
        .await?;
    db.collection::<mongodb::bson::Document>("tasks")
        .delete_one(doc! { "task_id": &task.task_id })
        .session(&mut session)
        .await?;

    session.commit_transaction().await?;

    for asset in doomed_assets {
        if let Err(e) = data.files.release(&asset.locator).await {
            warn!("Failed to release file {} for deleted task {}: {}", asset.locator, task.task_id, e);
        }
    }

    info!("Task deleted: {}", task.task_id);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "detail": "Task deleted" })))
}

/// GET /tasks/{task_id}/assignees
pub async fn list_assignees(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let task = fetch_visible_task(db, &path.into_inner(), &current_user).await?;

    let assignees: Vec<User> = db
        .collection::<User>("users")
        .find(doc! { "user_id": { "$in": task.assignee_ids } })
        .await?
        .try_collect()
        .await?;
    Ok(HttpResponse::Ok().json(assignees))
}

/// POST /tasks/{task_id}/assignees
/// Task creator or project creator only. Every target must resolve, and
/// must be a project member when the task is project-scoped. Adding an
/// existing assignee is a no-op, not an error.
pub async fn add_assignees(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<AddAssigneesRequest>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let task = fetch_visible_task(db, &path.into_inner(), &current_user).await?;

    if payload.assignees.is_empty() {
        return Err(ApiError::validation("This field must be a list of user IDs."));
    }

    let project = load_task_project(db, &task).await?;
    if !may_manage_assignees(&task, project.as_ref().map(|p| p.creator_id.as_str()), &current_user) {
        return Err(ApiError::forbidden(
            "Only the task creator or project creator can add assignees.",
        ));
    }

    let users = validate_assignees(db, project.as_ref(), &payload.assignees).await?;
    let added: Vec<String> = users.iter().map(|u| u.username.clone()).collect();
    let added_ids: Vec<String> = users.into_iter().map(|u| u.user_id).collect();

    db.collection::<Task>("tasks")
        .update_one(
            doc! { "task_id": &task.task_id },
            doc! {
                "$addToSet": { "assignee_ids": { "$each": added_ids } },
                "$set": { "updated_at": to_bson(&Utc::now())? },
            },
        )
        .await?;

    info!("Added assignees to task {}: {}", task.task_id, added.join(", "));
    Ok(HttpResponse::Created().json(serde_json::json!({
        "detail": format!("Added assignees: {}", added.join(", ")),
        "added": added,
    })))
}

/// DELETE /tasks/{task_id}/assignees/{user_id}
/// Same actor rule as add. Removal cascades in the same transaction: the
/// user's subtasks on this task are unassigned and their completion flag
/// reset.
pub async fn remove_assignee(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (task_id, user_id) = path.into_inner();
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let task = fetch_visible_task(db, &task_id, &current_user).await?;

    let project = load_task_project(db, &task).await?;
    if !may_manage_assignees(&task, project.as_ref().map(|p| p.creator_id.as_str()), &current_user) {
        return Err(ApiError::forbidden(
            "Only the task creator or project creator can remove assignees.",
        ));
    }

    // Deactivated users must still be removable, so no is_active filter.
    let user = db
        .collection::<User>("users")
        .find_one(doc! { "user_id": &user_id })
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    if !task.assignee_ids.iter().any(|a| a == &user.user_id) {
        return Err(ApiError::NotFound("assignee"));
    }

    let mut session = data.mongodb.client.start_session().await?;
    session.start_transaction().await?;

    db.collection::<Task>("tasks")
        .update_one(
            doc! { "task_id": &task.task_id },
            doc! {
                "$pull": { "assignee_ids": &user.user_id },
                "$set": { "updated_at": to_bson(&Utc::now())? },
            },
        )
        .session(&mut session)
        .await?;
    let res = db
        .collection::<Subtask>("subtasks")
        .update_many(
            doc! { "task_id": &task.task_id, "assigned_to": &user.user_id },
            doc! { "$set": {
                "assigned_to": Bson::Null,
                "is_completed": false,
                "updated_at": to_bson(&Utc::now())?,
            } },
        )
        .session(&mut session)
        .await?;

    session.commit_transaction().await?;

    let unassigned = res.modified_count;
    let mut detail = format!("{} removed from assignees.", user.username);
    if unassigned > 0 {
        detail.push_str(&format!(" {} subtask(s) have been unassigned.", unassigned));
    }
    info!("Removed assignee {} from task {} ({} subtasks cleared)", user.user_id, task.task_id, unassigned);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "detail": detail,
        "subtasks_unassigned": unassigned,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(creator: &str, assignees: &[&str], project: Option<&str>) -> Task {
        let now = Utc::now();
        Task {
            task_id: "t-1".to_string(),
            creator_id: creator.to_string(),
            title: "Ship it".to_string(),
            description: None,
            assignee_ids: assignees.iter().map(|s| s.to_string()).collect(),
            project_id: project.map(|s| s.to_string()),
            priority: Priority::Medium,
            status: Status::Pending,
            due_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn visibility_is_a_three_way_or() {
        let t = task("alice", &["bob"], Some("p-1"));
        assert!(is_visible(&t, "alice", false));
        assert!(is_visible(&t, "bob", false));
        assert!(is_visible(&t, "carol", true));
        assert!(!is_visible(&t, "carol", false));
    }

    #[test]
    fn project_membership_grants_nothing_without_a_project() {
        let t = task("alice", &[], None);
        // is_project_member can never be true for a projectless task, but
        // the rule must not depend on the caller getting that right.
        assert!(!is_visible(&t, "carol", true));
    }

    #[test]
    fn visibility_filter_has_all_three_clauses() {
        let f = visibility_filter("u-1", &["p-1".to_string(), "p-2".to_string()]);
        let clauses = f.get_array("$or").unwrap();
        assert_eq!(clauses.len(), 3);
    }

    #[test]
    fn assignee_management_is_creator_or_project_creator() {
        let t = task("alice", &["bob"], Some("p-1"));
        assert!(may_manage_assignees(&t, Some("dora"), "alice"));
        assert!(may_manage_assignees(&t, Some("dora"), "dora"));
        assert!(!may_manage_assignees(&t, Some("dora"), "bob"));

        let solo = task("alice", &["bob"], None);
        assert!(may_manage_assignees(&solo, None, "alice"));
        assert!(!may_manage_assignees(&solo, Some("dora"), "dora"));
    }

    #[test]
    fn delegation_allows_assignees_and_creator_only() {
        let assignees = vec!["bob".to_string(), "carol".to_string()];
        assert!(delegable("bob", &assignees, "alice"));
        assert!(delegable("alice", &assignees, "alice"));
        assert!(!delegable("mallory", &assignees, "alice"));
    }

    #[test]
    fn due_date_must_not_be_past() {
        let yesterday = Utc::now() - Duration::days(1);
        assert!(validate_due_date(&yesterday).is_err());
        let tomorrow = Utc::now() + Duration::days(1);
        assert!(validate_due_date(&tomorrow).is_ok());
        // Earlier today still counts as today.
        assert!(validate_due_date(&Utc::now()).is_ok());
    }

    #[test]
    fn dedupe_preserves_first_occurrence_order() {
        let ids = vec![
            "b".to_string(),
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
        ];
        assert_eq!(dedupe(&ids), vec!["b", "a", "c"]);
    }

    #[test]
    fn iexact_escapes_regex_metacharacters() {
        let d = iexact("C++ (urgent)");
        let pattern = d.get_str("$regex").unwrap();
        assert_eq!(pattern, "^C\\+\\+ \\(urgent\\)$");
    }

    #[test]
    fn list_filter_layers_flags_on_visibility() {
        let q = TaskListQuery {
            priority: Some("high".to_string()),
            status: None,
            created_by_me: Some(false),
            assigned_to_me: Some(true),
            due_today: None,
            overdue: Some(true),
        };
        let f = list_filter("u-1", &[], &q).unwrap();
        let clauses = f.get_array("$and").unwrap();
        // visibility + priority + created_by_me + assigned_to_me + overdue
        assert_eq!(clauses.len(), 5);
    }
}
