// src/comment.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use futures_util::TryStreamExt;
use log::info;
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth;
use crate::errors::ApiError;
use crate::models::Comment;
use crate::task::fetch_visible_task;

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub text: String,
    pub parent: Option<String>,
}

/// A comment with its replies materialized depth-first. Finite because a
/// parent always predates its replies and never changes.
#[derive(Debug, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

/// Assembles the reply forest for one task from its flat comment list.
/// Input order is kept at every level, so a newest-first fetch yields
/// newest-first siblings.
pub fn build_comment_tree(comments: Vec<Comment>) -> Vec<CommentNode> {
    fn children(all: &[Comment], parent_id: &str) -> Vec<CommentNode> {
        all.iter()
            .filter(|c| c.parent_id.as_deref() == Some(parent_id))
            .map(|c| CommentNode {
                comment: c.clone(),
                replies: children(all, &c.comment_id),
            })
            .collect()
    }

    comments
        .iter()
        .filter(|c| c.parent_id.is_none())
        .map(|c| CommentNode {
            comment: c.clone(),
            replies: children(&comments, &c.comment_id),
        })
        .collect()
}

/// Ids of a comment and every reply beneath it, for cascade deletion.
pub fn collect_reply_ids(all: &[Comment], root_id: &str) -> Vec<String> {
    let mut out = vec![root_id.to_string()];
    let mut i = 0;
    while i < out.len() {
        let parent = out[i].clone();
        for c in all {
            if c.parent_id.as_deref() == Some(parent.as_str()) {
                out.push(c.comment_id.clone());
            }
        }
        i += 1;
    }
    out
}

/// GET /tasks/{task_id}/comments
pub async fn list_comments(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let task = fetch_visible_task(db, &path.into_inner(), &current_user).await?;

    let comments: Vec<Comment> = db
        .collection::<Comment>("comments")
        .find(doc! { "task_id": &task.task_id })
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;
    Ok(HttpResponse::Ok().json(build_comment_tree(comments)))
}

/// POST /tasks/{task_id}/comments
/// The author is the calling user and the task comes from the path, never
/// the body. A parent, if named, must be an existing comment on the same
/// task; parents are immutable afterwards.
pub async fn create_comment(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;
    let task = fetch_visible_task(db, &path.into_inner(), &current_user).await?;

    if payload.text.trim().is_empty() {
        return Err(ApiError::validation("Comment text must not be empty"));
    }
    if let Some(parent_id) = &payload.parent {
        let comments = db.collection::<Comment>("comments");
        let parent = comments
            .find_one(doc! { "comment_id": parent_id })
            .await?
            .ok_or(ApiError::NotFound("comment"))?;
        if parent.task_id != task.task_id {
            return Err(ApiError::validation(
                "Parent comment does not belong to this task",
            ));
        }
    }

    let now = Utc::now();
    let new_comment = Comment {
        comment_id: Uuid::new_v4().to_string(),
        task_id: task.task_id.clone(),
        author_id: current_user,
        text: payload.text.trim().to_string(),
        parent_id: payload.parent.clone(),
        created_at: now,
        updated_at: now,
    };
    db.collection::<Comment>("comments")
        .insert_one(&new_comment)
        .await?;

    info!("Comment created: {} on task {}", new_comment.comment_id, task.task_id);
    Ok(HttpResponse::Created().json(&new_comment))
}

/// DELETE /comments/{comment_id}
/// Author or task creator. Takes the whole reply subtree with it in a
/// single delete.
pub async fn delete_comment(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let current_user = auth::current_user(&req)?;
    let db = &data.mongodb.db;

    let comments = db.collection::<Comment>("comments");
    let comment = comments
        .find_one(doc! { "comment_id": &path.into_inner() })
        .await?
        .ok_or(ApiError::NotFound("comment"))?;
    let task = fetch_visible_task(db, &comment.task_id, &current_user).await?;
    if comment.author_id != current_user && task.creator_id != current_user {
        return Err(ApiError::forbidden(
            "Only the comment author or task creator can delete a comment",
        ));
    }

    let all: Vec<Comment> = comments
        .find(doc! { "task_id": &task.task_id })
        .await?
        .try_collect()
        .await?;
    let doomed = collect_reply_ids(&all, &comment.comment_id);
    let count = doomed.len();
    comments
        .delete_many(doc! { "comment_id": { "$in": doomed } })
        .await?;

    info!("Comment {} deleted with {} replies", comment.comment_id, count - 1);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "detail": "Comment deleted",
        "deleted": count,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: &str, parent: Option<&str>) -> Comment {
        let now = Utc::now();
        Comment {
            comment_id: id.to_string(),
            task_id: "t-1".to_string(),
            author_id: "alice".to_string(),
            text: format!("comment {}", id),
            parent_id: parent.map(|p| p.to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn tree_nests_replies_under_parents() {
        let flat = vec![
            comment("c3", None),
            comment("c2", Some("c1")),
            comment("c1", None),
            comment("c4", Some("c2")),
        ];
        let tree = build_comment_tree(flat);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].comment.comment_id, "c3");
        assert_eq!(tree[1].comment.comment_id, "c1");
        assert_eq!(tree[1].replies.len(), 1);
        assert_eq!(tree[1].replies[0].comment.comment_id, "c2");
        assert_eq!(tree[1].replies[0].replies[0].comment.comment_id, "c4");
    }

    #[test]
    fn tree_of_no_comments_is_empty() {
        assert!(build_comment_tree(vec![]).is_empty());
    }

    #[test]
    fn reply_collection_spans_the_whole_subtree() {
        let all = vec![
            comment("c1", None),
            comment("c2", Some("c1")),
            comment("c3", Some("c2")),
            comment("c4", None),
            comment("c5", Some("c4")),
        ];
        let mut ids = collect_reply_ids(&all, "c1");
        ids.sort();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn reply_collection_of_leaf_is_just_itself() {
        let all = vec![comment("c1", None), comment("c2", Some("c1"))];
        assert_eq!(collect_reply_ids(&all, "c2"), vec!["c2"]);
    }
}
