// src/users.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use futures_util::TryStreamExt;
use log::{info, warn};
use mongodb::bson::doc;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth;
use crate::errors::{is_duplicate_key, ApiError};
use crate::models::User;

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub email: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    pub query: String,
}

/// Builds a handle from the name parts plus a short random suffix, used
/// when registration omits an explicit username.
pub fn generate_username(first_name: Option<&str>, last_name: Option<&str>) -> String {
    let clean = |s: Option<&str>| -> String {
        s.unwrap_or("")
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_lowercase()
    };
    let mut base = format!("{}{}", clean(first_name), clean(last_name));
    if base.is_empty() {
        base = "user".to_string();
    }
    let suffix: String = Uuid::new_v4().simple().to_string()[..5].to_string();
    format!("{}_{}", base, suffix)
}

/// Resolves a user id to an active user, or NotFound.
pub async fn find_active_user(
    db: &mongodb::Database,
    user_id: &str,
) -> Result<User, ApiError> {
    let users = db.collection::<User>("users");
    users
        .find_one(doc! { "user_id": user_id, "is_active": true })
        .await?
        .ok_or(ApiError::NotFound("user"))
}

/// POST /users
/// Registers a profile. Email and username uniqueness is enforced by the
/// unique indexes; a duplicate insert surfaces as Conflict.
pub async fn register_user(
    data: web::Data<AppState>,
    payload: web::Json<RegisterUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::validation("A valid email address is required"));
    }

    let username = match &payload.username {
        Some(u) if !u.trim().is_empty() => u.trim().to_string(),
        _ => generate_username(payload.first_name.as_deref(), payload.last_name.as_deref()),
    };

    let new_user = User {
        user_id: Uuid::new_v4().to_string(),
        email,
        username,
        first_name: payload.first_name.clone(),
        last_name: payload.last_name.clone(),
        is_active: true,
        date_joined: Utc::now(),
    };

    let users = data.mongodb.db.collection::<User>("users");
    match users.insert_one(&new_user).await {
        Ok(_) => {
            info!("User registered: {}", new_user.user_id);
            Ok(HttpResponse::Created().json(&new_user))
        }
        Err(e) if is_duplicate_key(&e) => Err(ApiError::conflict(
            "A user with this email or username already exists",
        )),
        Err(e) => Err(e.into()),
    }
}

/// GET /users/{user_id}
pub async fn get_user_by_id(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = find_active_user(&data.mongodb.db, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// GET /users/search?query=...
/// Case-insensitive substring match over email and username.
pub async fn search_users(
    data: web::Data<AppState>,
    query: web::Query<UserSearchQuery>,
) -> Result<HttpResponse, ApiError> {
    let users = data.mongodb.db.collection::<User>("users");
    let filter = doc! {
        "is_active": true,
        "$or": [
            { "email": { "$regex": &query.query, "$options": "i" } },
            { "username": { "$regex": &query.query, "$options": "i" } },
        ],
    };
    let found: Vec<User> = users.find(filter).await?.try_collect().await?;
    Ok(HttpResponse::Ok().json(found))
}

/// DELETE /users/{user_id}
/// Deactivates the calling user's own account. Session invalidation is
/// best-effort: a failure is logged and the deactivation still succeeds.
pub async fn deactivate_user(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let user_id = path.into_inner();
    if current_user != user_id {
        return Err(ApiError::forbidden("You can only deactivate your own account"));
    }

    let users = data.mongodb.db.collection::<User>("users");
    let res = users
        .update_one(
            doc! { "user_id": &user_id, "is_active": true },
            doc! { "$set": { "is_active": false } },
        )
        .await?;
    if res.matched_count == 0 {
        return Err(ApiError::NotFound("user"));
    }

    let sessions = data.mongodb.db.collection::<crate::models::Session>("sessions");
    if let Err(e) = sessions.delete_many(doc! { "user_id": &user_id }).await {
        warn!("Failed to invalidate sessions for {}: {}", user_id, e);
    }

    info!("User deactivated: {}", user_id);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "detail": "Account deactivated" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_combines_cleaned_name_parts() {
        let u = generate_username(Some("Ada"), Some("O'Brien"));
        let (base, suffix) = u.split_once('_').unwrap();
        assert_eq!(base, "adaobrien");
        assert_eq!(suffix.len(), 5);
    }

    #[test]
    fn username_falls_back_when_names_empty() {
        let u = generate_username(None, Some("123"));
        assert!(u.starts_with("user_"));
    }

    #[test]
    fn username_suffixes_differ() {
        let a = generate_username(Some("Sam"), None);
        let b = generate_username(Some("Sam"), None);
        assert_ne!(a, b);
    }
}
