// src/asset.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use futures_util::TryStreamExt;
use log::{info, warn};
use mongodb::bson::doc;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth;
use crate::errors::ApiError;
use crate::models::{Asset, AssetParent};
use crate::project::fetch_visible_project;
use crate::task::fetch_visible_task;

/// Extensions accepted when `enforce_asset_types` is on.
const ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "txt", "rtf", "odt",
    "jpg", "jpeg", "png", "gif", "bmp", "svg", "webp", "ico",
    "xls", "xlsx", "csv", "ods",
    "ppt", "pptx", "odp",
    "zip", "rar", "7z", "tar", "gz",
    "py", "js", "html", "css", "json", "xml", "yml", "yaml",
];

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub task: Option<String>,
    pub project: Option<String>,
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AssetListQuery {
    pub task: Option<String>,
    pub project: Option<String>,
}

/// Exactly one of task / project, collapsed into the tagged union so the
/// both/neither states never reach storage.
pub fn validate_parent(
    task: Option<String>,
    project: Option<String>,
) -> Result<AssetParent, ApiError> {
    match (task, project) {
        (Some(task_id), None) => Ok(AssetParent::Task(task_id)),
        (None, Some(project_id)) => Ok(AssetParent::Project(project_id)),
        (Some(_), Some(_)) => Err(ApiError::validation(
            "Asset cannot belong to both a task and a project.",
        )),
        (None, None) => Err(ApiError::validation(
            "Asset must belong to either a task or a project.",
        )),
    }
}

pub fn check_size(size: usize, max_bytes: i64) -> Result<(), ApiError> {
    if size as i64 > max_bytes {
        return Err(ApiError::validation(format!(
            "File size cannot exceed {}MB. Current size: {:.1}MB",
            max_bytes / 1024 / 1024,
            size as f64 / 1024.0 / 1024.0
        )));
    }
    Ok(())
}

pub fn check_extension(file_name: &str) -> Result<(), ApiError> {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ApiError::validation(format!(
            "File type \"{}\" is not allowed.",
            extension
        )));
    }
    Ok(())
}

/// The actor must be able to see the parent; missing and invisible parents
/// answer identically.
async fn authorize_parent(
    db: &mongodb::Database,
    parent: &AssetParent,
    user_id: &str,
) -> Result<(), ApiError> {
    match parent {
        AssetParent::Task(task_id) => {
            fetch_visible_task(db, task_id, user_id).await?;
        }
        AssetParent::Project(project_id) => {
            fetch_visible_project(db, project_id, user_id).await?;
        }
    }
    Ok(())
}

async fn parent_creator(
    db: &mongodb::Database,
    parent: &AssetParent,
    user_id: &str,
) -> Result<String, ApiError> {
    match parent {
        AssetParent::Task(task_id) => {
            Ok(fetch_visible_task(db, task_id, user_id).await?.creator_id)
        }
        AssetParent::Project(project_id) => Ok(fetch_visible_project(db, project_id, user_id)
            .await?
            .creator_id),
    }
}

fn parent_filter(parent: &AssetParent) -> mongodb::bson::Document {
    match parent {
        AssetParent::Task(id) => doc! { "parent.kind": "task", "parent.id": id },
        AssetParent::Project(id) => doc! { "parent.kind": "project", "parent.id": id },
    }
}

/// POST /assets?task=...|project=...&file_name=...
/// Raw file bytes in the body. Guards run before anything is persisted;
/// if the metadata insert fails after the bytes were stored, the stored
/// file is rolled back.
pub async fn upload_asset(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<UploadQuery>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let query = query.into_inner();

    let parent = validate_parent(query.task, query.project)?;
    authorize_parent(db, &parent, &current_user).await?;
    check_size(body.len(), data.config.max_asset_bytes)?;
    if data.config.enforce_asset_types {
        check_extension(&query.file_name)?;
    }

    let locator = data.files.store(&query.file_name, &body).await?;
    let new_asset = Asset {
        asset_id: Uuid::new_v4().to_string(),
        uploaded_by: current_user,
        parent,
        file_name: query.file_name,
        locator: locator.clone(),
        size_bytes: body.len() as i64,
        uploaded_at: Utc::now(),
    };
    if let Err(e) = db.collection::<Asset>("assets").insert_one(&new_asset).await {
        if let Err(cleanup) = data.files.release(&locator).await {
            warn!("Failed to roll back stored file {}: {}", locator, cleanup);
        }
        return Err(e.into());
    }

    info!("Asset uploaded: {} ({})", new_asset.asset_id, new_asset.file_name);
    Ok(HttpResponse::Created().json(&new_asset))
}

async fn list_for_parent(
    data: &AppState,
    parent: AssetParent,
    user_id: &str,
) -> Result<HttpResponse, ApiError> {
    let db = &data.mongodb.db;
    authorize_parent(db, &parent, user_id).await?;
    let assets: Vec<Asset> = db
        .collection::<Asset>("assets")
        .find(parent_filter(&parent))
        .await?
        .try_collect()
        .await?;
    Ok(HttpResponse::Ok().json(assets))
}

/// GET /assets?task=...|project=...
pub async fn list_assets(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<AssetListQuery>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let query = query.into_inner();
    let parent = validate_parent(query.task, query.project)?;
    list_for_parent(&data, parent, &current_user).await
}

/// GET /tasks/{task_id}/assets
pub async fn list_task_assets(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    list_for_parent(&data, AssetParent::Task(path.into_inner()), &current_user).await
}

/// GET /projects/{project_id}/assets
pub async fn list_project_assets(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    list_for_parent(&data, AssetParent::Project(path.into_inner()), &current_user).await
}

/// GET /assets/{asset_id}
pub async fn get_asset(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let asset = db
        .collection::<Asset>("assets")
        .find_one(doc! { "asset_id": &path.into_inner() })
        .await?
        .ok_or(ApiError::NotFound("asset"))?;
    authorize_parent(db, &asset.parent, &current_user).await?;
    Ok(HttpResponse::Ok().json(asset))
}

/// DELETE /assets/{asset_id}
/// Uploader or parent creator. The stored file is released first; a
/// release failure surfaces and leaves the metadata row in place, so the
/// asset never silently loses its bytes.
pub async fn delete_asset(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let assets = db.collection::<Asset>("assets");
    let asset = assets
        .find_one(doc! { "asset_id": &path.into_inner() })
        .await?
        .ok_or(ApiError::NotFound("asset"))?;

    let creator = parent_creator(db, &asset.parent, &current_user).await?;
    if asset.uploaded_by != current_user && creator != current_user {
        return Err(ApiError::forbidden(
            "Only the uploader or the owner of the parent can delete an asset",
        ));
    }

    data.files.release(&asset.locator).await?;
    assets
        .delete_one(doc! { "asset_id": &asset.asset_id })
        .await?;

    info!("Asset deleted: {}", asset.asset_id);
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_must_be_exactly_one_of_task_or_project() {
        assert_eq!(
            validate_parent(Some("t".into()), None).unwrap(),
            AssetParent::Task("t".into())
        );
        assert_eq!(
            validate_parent(None, Some("p".into())).unwrap(),
            AssetParent::Project("p".into())
        );
        assert!(validate_parent(Some("t".into()), Some("p".into())).is_err());
        assert!(validate_parent(None, None).is_err());
    }

    #[test]
    fn size_ceiling_is_inclusive() {
        assert!(check_size(50 * 1024 * 1024, 50 * 1024 * 1024).is_ok());
        assert!(check_size(50 * 1024 * 1024 + 1, 50 * 1024 * 1024).is_err());
    }

    #[test]
    fn oversize_message_reports_megabytes() {
        let err = check_size(60 * 1024 * 1024, 50 * 1024 * 1024).unwrap_err();
        assert_eq!(
            err.to_string(),
            "File size cannot exceed 50MB. Current size: 60.0MB"
        );
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(check_extension("report.PDF").is_ok());
        assert!(check_extension("archive.tar").is_ok());
        assert!(check_extension("malware.exe").is_err());
        assert!(check_extension("no_extension").is_err());
    }

    #[test]
    fn parent_filter_matches_tagged_encoding() {
        let f = parent_filter(&AssetParent::Task("t-1".into()));
        assert_eq!(f.get_str("parent.kind").unwrap(), "task");
        assert_eq!(f.get_str("parent.id").unwrap(), "t-1");
    }
}
