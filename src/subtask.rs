// src/subtask.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use futures_util::TryStreamExt;
use log::info;
use mongodb::bson::{doc, to_bson, Bson};
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth;
use crate::errors::ApiError;
use crate::models::{Subtask, Task};
use crate::task::{delegable, fetch_visible_task};
use crate::users::find_active_user;

#[derive(Debug, Deserialize)]
pub struct CreateSubtaskRequest {
    pub title: String,
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
}

/// `assigned_to` distinguishes absent (leave alone) from null (clear) via
/// the double Option.
#[derive(Debug, Deserialize)]
pub struct UpdateSubtaskRequest {
    pub title: Option<String>,
    #[serde(default, with = "double_option")]
    pub assigned_to: Option<Option<String>>,
    pub is_completed: Option<bool>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(de).map(Some)
    }
}

async fn check_delegation(
    db: &mongodb::Database,
    task: &Task,
    assigned_to: &str,
) -> Result<(), ApiError> {
    let user = find_active_user(db, assigned_to).await?;
    if !delegable(assigned_to, &task.assignee_ids, &task.creator_id) {
        return Err(ApiError::validation(format!(
            "User '{}' is not assigned to the parent task and is not the task creator.",
            user.username
        )));
    }
    Ok(())
}

async fn fetch_subtask(
    db: &mongodb::Database,
    task_id: &str,
    subtask_id: &str,
) -> Result<Subtask, ApiError> {
    db.collection::<Subtask>("subtasks")
        .find_one(doc! { "subtask_id": subtask_id, "task_id": task_id })
        .await?
        .ok_or(ApiError::NotFound("subtask"))
}

/// GET /tasks/{task_id}/subtasks
pub async fn list_subtasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let task = fetch_visible_task(db, &path.into_inner(), &current_user).await?;

    let subtasks: Vec<Subtask> = db
        .collection::<Subtask>("subtasks")
        .find(doc! { "task_id": &task.task_id })
        .sort(doc! { "created_at": 1 })
        .await?
        .try_collect()
        .await?;
    Ok(HttpResponse::Ok().json(subtasks))
}

/// POST /tasks/{task_id}/subtasks
pub async fn create_subtask(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<CreateSubtaskRequest>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let task = fetch_visible_task(db, &path.into_inner(), &current_user).await?;

    if payload.title.trim().is_empty() {
        return Err(ApiError::validation("Subtask title must not be empty"));
    }
    if let Some(assigned_to) = &payload.assigned_to {
        check_delegation(db, &task, assigned_to).await?;
    }

    let now = Utc::now();
    let new_subtask = Subtask {
        subtask_id: Uuid::new_v4().to_string(),
        task_id: task.task_id.clone(),
        title: payload.title.trim().to_string(),
        assigned_to: payload.assigned_to.clone(),
        is_completed: payload.is_completed,
        created_at: now,
        updated_at: now,
    };
    db.collection::<Subtask>("subtasks")
        .insert_one(&new_subtask)
        .await?;

    info!("Subtask created: {} on task {}", new_subtask.subtask_id, task.task_id);
    Ok(HttpResponse::Created().json(&new_subtask))
}

/// GET /tasks/{task_id}/subtasks/{subtask_id}
pub async fn get_subtask(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (task_id, subtask_id) = path.into_inner();
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let task = fetch_visible_task(db, &task_id, &current_user).await?;
    let subtask = fetch_subtask(db, &task.task_id, &subtask_id).await?;
    Ok(HttpResponse::Ok().json(subtask))
}

/// PUT /tasks/{task_id}/subtasks/{subtask_id}
/// An assigned subtask may only be updated by its assignee or the task
/// creator; reassignment goes through the delegation rule.
pub async fn update_subtask(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    payload: web::Json<UpdateSubtaskRequest>,
) -> Result<HttpResponse, ApiError> {
    let (task_id, subtask_id) = path.into_inner();
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let task = fetch_visible_task(db, &task_id, &current_user).await?;
    let subtask = fetch_subtask(db, &task.task_id, &subtask_id).await?;

    if let Some(assigned) = &subtask.assigned_to {
        if assigned != &current_user && task.creator_id != current_user {
            return Err(ApiError::forbidden(
                "You can only update your own subtasks or if you're the task creator",
            ));
        }
    }

    let mut set_doc = doc! {};
    if let Some(title) = &payload.title {
        if title.trim().is_empty() {
            return Err(ApiError::validation("Subtask title must not be empty"));
        }
        set_doc.insert("title", title.trim());
    }
    match &payload.assigned_to {
        Some(Some(assigned_to)) => {
            check_delegation(db, &task, assigned_to).await?;
            set_doc.insert("assigned_to", assigned_to.clone());
        }
        Some(None) => {
            set_doc.insert("assigned_to", Bson::Null);
        }
        None => {}
    }
    if let Some(is_completed) = payload.is_completed {
        set_doc.insert("is_completed", is_completed);
    }
    if set_doc.is_empty() {
        return Err(ApiError::validation("No fields to update"));
    }
    set_doc.insert("updated_at", to_bson(&Utc::now())?);

    let subtasks = db.collection::<Subtask>("subtasks");
    subtasks
        .update_one(
            doc! { "subtask_id": &subtask.subtask_id },
            doc! { "$set": set_doc },
        )
        .await?;
    let updated = fetch_subtask(db, &task.task_id, &subtask.subtask_id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// DELETE /tasks/{task_id}/subtasks/{subtask_id}
pub async fn delete_subtask(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (task_id, subtask_id) = path.into_inner();
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let task = fetch_visible_task(db, &task_id, &current_user).await?;
    let subtask = fetch_subtask(db, &task.task_id, &subtask_id).await?;

    db.collection::<Subtask>("subtasks")
        .delete_one(doc! { "subtask_id": &subtask.subtask_id })
        .await?;
    info!("Subtask deleted: {}", subtask.subtask_id);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "detail": "Subtask deleted" })))
}
