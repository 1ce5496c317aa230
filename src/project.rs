// src/project.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use futures_util::TryStreamExt;
use log::{info, warn};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth;
use crate::errors::{is_duplicate_key, ApiError};
use crate::models::{Asset, Membership, Project, Role, Task, User};
use crate::users::find_active_user;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct MemberInfo {
    pub membership_id: String,
    pub user: User,
    pub role: Role,
    pub joined_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub members: Vec<MemberInfo>,
    pub tasks: Vec<Task>,
    pub assets: Vec<Asset>,
}

/// True when the user holds an explicit membership or created the project.
/// The creator never gets a membership row; their rights are derived.
pub async fn is_member(
    db: &mongodb::Database,
    project: &Project,
    user_id: &str,
) -> Result<bool, ApiError> {
    if project.creator_id == user_id {
        return Ok(true);
    }
    let memberships = db.collection::<Membership>("memberships");
    let found = memberships
        .find_one(doc! { "project_id": &project.project_id, "user_id": user_id })
        .await?;
    Ok(found.is_some())
}

/// Ids of every project the user can see: explicit memberships plus
/// projects they created.
pub async fn visible_project_ids(
    db: &mongodb::Database,
    user_id: &str,
) -> Result<Vec<String>, ApiError> {
    let memberships = db.collection::<Membership>("memberships");
    let mut ids: Vec<String> = memberships
        .find(doc! { "user_id": user_id })
        .await?
        .try_collect::<Vec<Membership>>()
        .await?
        .into_iter()
        .map(|m| m.project_id)
        .collect();

    let projects = db.collection::<Project>("projects");
    let created: Vec<Project> = projects
        .find(doc! { "creator_id": user_id })
        .await?
        .try_collect()
        .await?;
    for p in created {
        if !ids.contains(&p.project_id) {
            ids.push(p.project_id);
        }
    }
    Ok(ids)
}

/// Loads a project the user can see, or NotFound. Missing and invisible
/// are deliberately the same answer.
pub async fn fetch_visible_project(
    db: &mongodb::Database,
    project_id: &str,
    user_id: &str,
) -> Result<Project, ApiError> {
    let projects = db.collection::<Project>("projects");
    let project = projects
        .find_one(doc! { "project_id": project_id })
        .await?
        .ok_or(ApiError::NotFound("project"))?;
    if !is_member(db, &project, user_id).await? {
        return Err(ApiError::NotFound("project"));
    }
    Ok(project)
}

/// GET /projects
pub async fn list_projects(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;

    let ids = visible_project_ids(db, &current_user).await?;
    let projects = db.collection::<Project>("projects");
    let found: Vec<Project> = projects
        .find(doc! { "project_id": { "$in": ids } })
        .await?
        .try_collect()
        .await?;
    Ok(HttpResponse::Ok().json(found))
}

/// POST /projects
/// The creator gets implicit full rights; no membership row is written.
pub async fn create_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateProjectRequest>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    if payload.title.trim().is_empty() {
        return Err(ApiError::validation("Project title must not be empty"));
    }

    let now = Utc::now();
    let new_project = Project {
        project_id: Uuid::new_v4().to_string(),
        creator_id: current_user,
        title: payload.title.trim().to_string(),
        description: payload.description.clone(),
        created_at: now,
        updated_at: now,
    };
    let projects = data.mongodb.db.collection::<Project>("projects");
    projects.insert_one(&new_project).await?;

    info!("Project created: {}", new_project.project_id);
    Ok(HttpResponse::Created().json(&new_project))
}

/// GET /projects/{project_id}
pub async fn get_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let project = fetch_visible_project(db, &path.into_inner(), &current_user).await?;

    let memberships: Vec<Membership> = db
        .collection::<Membership>("memberships")
        .find(doc! { "project_id": &project.project_id })
        .await?
        .try_collect()
        .await?;
    let member_ids: Vec<&str> = memberships.iter().map(|m| m.user_id.as_str()).collect();
    let users: Vec<User> = db
        .collection::<User>("users")
        .find(doc! { "user_id": { "$in": member_ids } })
        .await?
        .try_collect()
        .await?;
    let members = memberships
        .into_iter()
        .filter_map(|m| {
            users
                .iter()
                .find(|u| u.user_id == m.user_id)
                .cloned()
                .map(|user| MemberInfo {
                    membership_id: m.membership_id,
                    user,
                    role: m.role,
                    joined_at: m.joined_at,
                })
        })
        .collect();

    let tasks: Vec<Task> = db
        .collection::<Task>("tasks")
        .find(doc! { "project_id": &project.project_id })
        .await?
        .try_collect()
        .await?;
    let assets: Vec<Asset> = db
        .collection::<Asset>("assets")
        .find(doc! { "parent.kind": "project", "parent.id": &project.project_id })
        .await?
        .try_collect()
        .await?;

    Ok(HttpResponse::Ok().json(ProjectDetail {
        project,
        members,
        tasks,
        assets,
    }))
}

/// PUT /projects/{project_id}
/// Only the creator may mutate the project record itself.
pub async fn update_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateProjectRequest>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let project = fetch_visible_project(db, &path.into_inner(), &current_user).await?;
    if project.creator_id != current_user {
        return Err(ApiError::forbidden("Only the project creator can update the project"));
    }

    let mut set_doc = doc! {};
    if let Some(title) = &payload.title {
        if title.trim().is_empty() {
            return Err(ApiError::validation("Project title must not be empty"));
        }
        set_doc.insert("title", title.trim());
    }
    if let Some(desc) = &payload.description {
        set_doc.insert("description", desc.clone());
    }
    if set_doc.is_empty() {
        return Err(ApiError::validation("No fields to update"));
    }
    set_doc.insert("updated_at", mongodb::bson::to_bson(&Utc::now())?);

    let projects = db.collection::<Project>("projects");
    projects
        .update_one(
            doc! { "project_id": &project.project_id },
            doc! { "$set": set_doc },
        )
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "detail": "Project updated" })))
}

/// DELETE /projects/{project_id}
/// Creator-only. Cascades to memberships, tasks (with their subtasks,
/// comments and assets) and project assets in one transaction; stored
/// files are released after commit.
pub async fn delete_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let project = fetch_visible_project(db, &path.into_inner(), &current_user).await?;
    if project.creator_id != current_user {
        return Err(ApiError::forbidden("Only the project creator can delete the project"));
    }
    let project_id = project.project_id.clone();

    let mut session = data.mongodb.client.start_session().await?;
    session.start_transaction().await?;

    let tasks = db.collection::<Task>("tasks");
    let mut task_cursor = tasks
        .find(doc! { "project_id": &project_id })
        .session(&mut session)
        .await?;
    let project_tasks: Vec<Task> = task_cursor.stream(&mut session).try_collect().await?;
    let task_ids: Vec<String> = project_tasks.into_iter().map(|t| t.task_id).collect();

    let asset_filter = doc! { "$or": [
        { "parent.kind": "project", "parent.id": &project_id },
        { "parent.kind": "task", "parent.id": { "$in": task_ids.clone() } },
    ] };
    let assets = db.collection::<Asset>("assets");
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
        .delete_many(doc! { "task_id": { "$in": task_ids.clone() } })
        .session(&mut session)
        .await?;
    db.collection::<mongodb::bson::Document>("comments")
        .delete_many(doc! { "task_id": { "$in": task_ids } })
        .session(&mut session)
        .await?;
    tasks
        .delete_many(doc! { "project_id": &project_id })
        .session(&mut session)
        .await?;
    db.collection::<mongodb::bson::Document>("memberships")
        .delete_many(doc! { "project_id": &project_id })
        .session(&mut session)
        .await?;
    db.collection::<mongodb::bson::Document>("projects")
        .delete_one(doc! { "project_id": &project_id })
        .session(&mut session)
        .await?;

    session.commit_transaction().await?;

    for asset in doomed_assets {
        if let Err(e) = data.files.release(&asset.locator).await {
            warn!("Failed to release file {} for deleted project {}: {}", asset.locator, project_id, e);
        }
    }

    info!("Project deleted: {}", project_id);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "detail": "Project deleted" })))
}

/// GET /projects/{project_id}/members
pub async fn list_members(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let project = fetch_visible_project(db, &path.into_inner(), &current_user).await?;

    let memberships: Vec<Membership> = db
        .collection::<Membership>("memberships")
        .find(doc! { "project_id": &project.project_id })
        .await?
        .try_collect()
        .await?;
    Ok(HttpResponse::Ok().json(memberships))
}

/// POST /projects/{project_id}/members
/// Creator-only. The unique (project_id, user_id) index is the final word
/// on duplicates; the pre-check just gives a clean message in the common
/// case.
pub async fn add_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<AddMemberRequest>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let project = fetch_visible_project(db, &path.into_inner(), &current_user).await?;
    if project.creator_id != current_user {
        return Err(ApiError::forbidden("Only the project creator can add members"));
    }

    let user = find_active_user(db, &payload.user_id).await?;
    if user.user_id == project.creator_id {
        return Err(ApiError::validation(
            "The project creator is already an implicit member",
        ));
    }

    let memberships = db.collection::<Membership>("memberships");
    if memberships
        .find_one(doc! { "project_id": &project.project_id, "user_id": &user.user_id })
        .await?
        .is_some()
    {
        return Err(ApiError::conflict("User is already a member of this project"));
    }

    let new_membership = Membership {
        membership_id: Uuid::new_v4().to_string(),
        project_id: project.project_id.clone(),
        user_id: user.user_id.clone(),
        role: payload.role,
        joined_at: Utc::now(),
    };
    match memberships.insert_one(&new_membership).await {
        Ok(_) => {}
        Err(e) if is_duplicate_key(&e) => {
            return Err(ApiError::conflict("User is already a member of this project"))
        }
        Err(e) => return Err(e.into()),
    }

    info!("Added {} to project {}", user.user_id, project.project_id);
    Ok(HttpResponse::Created().json(&new_membership))
}

/// DELETE /projects/{project_id}/members/{user_id}
/// Creator removes anyone; a member may remove themself. Existing task
/// assignments are left alone: the user only loses project visibility.
pub async fn remove_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (project_id, user_id) = path.into_inner();
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let project = fetch_visible_project(db, &project_id, &current_user).await?;
    if project.creator_id != current_user && current_user != user_id {
        return Err(ApiError::forbidden(
            "Only the project creator can remove other members",
        ));
    }

    let memberships = db.collection::<Membership>("memberships");
    let res = memberships
        .delete_one(doc! { "project_id": &project.project_id, "user_id": &user_id })
        .await?;
    if res.deleted_count == 0 {
        return Err(ApiError::NotFound("membership"));
    }

    info!("Removed {} from project {}", user_id, project.project_id);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "detail": "Member removed" })))
}
