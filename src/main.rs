// src/main.rs

mod app_state;
mod asset;
mod auth;
mod comment;
mod config;
mod db;
mod errors;
mod models;
mod project;
mod storage;
mod subtask;
mod task;
mod users;

use std::env;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_cors::Cors;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpResponse, HttpServer,
};
use env_logger::Env;
use futures::future::{ok, Ready};

use crate::app_state::AppState;
use crate::asset::{
    delete_asset, get_asset, list_assets, list_project_assets, list_task_assets, upload_asset,
};
use crate::comment::{create_comment, delete_comment, list_comments};
use crate::project::{
    add_member, create_project, delete_project, get_project, list_members, list_projects,
    remove_member, update_project,
};
use crate::subtask::{
    create_subtask, delete_subtask, get_subtask, list_subtasks, update_subtask,
};
use crate::task::{
    add_assignees, create_task, delete_task, get_task, list_assignees, list_tasks,
    remove_assignee, update_task,
};
use crate::users::{deactivate_user, get_user_by_id, register_user, search_users};

#[derive(Debug)]
pub struct Authentication;

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware { service })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Extract "Bearer <token>" from the Authorization header if present
        if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
            if let Ok(auth_str) = auth_header.to_str() {
                if auth_str.starts_with("Bearer ") {
                    let token = auth_str.trim_start_matches("Bearer ").trim().to_string();
                    let secret =
                        env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string());
                    match auth::verify_token(&token, &secret) {
                        Ok(user_id) => {
                            // Insert user_id as a string extension
                            req.extensions_mut().insert(user_id);
                        }
                        Err(e) => {
                            let (req_parts, _payload) = req.into_parts();
                            let resp = HttpResponse::Unauthorized()
                                .body(format!("Invalid token: {}", e))
                                .map_into_boxed_body();
                            let srv_resp = ServiceResponse::new(req_parts, resp);
                            return Box::pin(async move { Ok(srv_resp) });
                        }
                    }
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env();
    let mongodb = Arc::new(db::MongoDB::init(&config.mongo_uri, &config.database_name).await);
    mongodb
        .ensure_indexes()
        .await
        .expect("Failed to create indexes");
    let files = storage::FileStore::init(&config.asset_dir)
        .await
        .expect("Failed to initialize asset directory");

    let frontend_origin =
        env::var("FRONTEND_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

    println!("Server running at http://0.0.0.0:8080");
    println!("Allowed CORS Origin: {}", frontend_origin);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Authentication)
            .app_data(web::Data::new(AppState {
                mongodb: mongodb.clone(),
                config: config.clone(),
                files: files.clone(),
            }))
            // Raw upload bodies must clear the asset ceiling so the size
            // guard can answer with the documented message.
            .app_data(web::PayloadConfig::new(config.max_asset_bytes as usize * 2))
            // USERS
            .service(
                web::scope("/users")
                    .route("", web::post().to(register_user))
                    .route("/search", web::get().to(search_users))
                    .route("/{user_id}", web::get().to(get_user_by_id))
                    .route("/{user_id}", web::delete().to(deactivate_user)),
            )
            // PROJECTS
            .service(
                web::scope("/projects")
                    .route("", web::get().to(list_projects))
                    .route("", web::post().to(create_project))
                    .service(
                        web::scope("/{project_id}")
                            .route("", web::get().to(get_project))
                            .route("", web::put().to(update_project))
                            .route("", web::delete().to(delete_project))
                            .route("/assets", web::get().to(list_project_assets))
                            .service(
                                web::scope("/members")
                                    .route("", web::get().to(list_members))
                                    .route("", web::post().to(add_member))
                                    .route("/{user_id}", web::delete().to(remove_member)),
                            ),
                    ),
            )
            // TASKS
            .service(
                web::scope("/tasks")
                    .route("", web::get().to(list_tasks))
                    .route("", web::post().to(create_task))
                    .service(
                        web::scope("/{task_id}")
                            .route("", web::get().to(get_task))
                            .route("", web::put().to(update_task))
                            .route("", web::delete().to(delete_task))
                            .route("/assets", web::get().to(list_task_assets))
                            .service(
                                web::scope("/assignees")
                                    .route("", web::get().to(list_assignees))
                                    .route("", web::post().to(add_assignees))
                                    .route("/{user_id}", web::delete().to(remove_assignee)),
                            )
                            .service(
                                web::scope("/subtasks")
                                    .route("", web::get().to(list_subtasks))
                                    .route("", web::post().to(create_subtask))
                                    .route("/{subtask_id}", web::get().to(get_subtask))
                                    .route("/{subtask_id}", web::put().to(update_subtask))
                                    .route("/{subtask_id}", web::delete().to(delete_subtask)),
                            )
                            .service(
                                web::scope("/comments")
                                    .route("", web::get().to(list_comments))
                                    .route("", web::post().to(create_comment)),
                            ),
                    ),
            )
            // COMMENTS
            .service(
                web::scope("/comments")
                    .route("/{comment_id}", web::delete().to(delete_comment)),
            )
            // ASSETS
            .service(
                web::scope("/assets")
                    .route("", web::post().to(upload_asset))
                    .route("", web::get().to(list_assets))
                    .route("/{asset_id}", web::get().to(get_asset))
                    .route("/{asset_id}", web::delete().to(delete_asset)),
            )
    })
    .bind("0.0.0.0:8080")?
    .run()
    .await
}
