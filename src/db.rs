// src/db.rs

use std::time::Duration;

use mongodb::bson::doc;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Database, IndexModel};

pub struct MongoDB {
    pub client: Client,
    pub db: Database,
}

impl MongoDB {
    pub async fn init(uri: &str, db_name: &str) -> Self {
        let client_options = ClientOptions::parse(uri)
            .await
            .expect("Failed to parse MongoDB connection string");
        let client = Client::with_options(client_options).expect("Failed to initialize client");
        let db = client.database(db_name);
        MongoDB { client, db }
    }

    /// Creates the indexes the invariants lean on. Uniqueness lives here,
    /// not in application pre-checks: concurrent inserts race past an
    /// existence check but not past a unique index.
    pub async fn ensure_indexes(&self) -> mongodb::error::Result<()> {
        let unique = |keys: mongodb::bson::Document| {
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };

        let users = self.db.collection::<mongodb::bson::Document>("users");
        users.create_index(unique(doc! { "email": 1 })).await?;
        users.create_index(unique(doc! { "username": 1 })).await?;

        // One membership per (project, user) pair.
        let memberships = self.db.collection::<mongodb::bson::Document>("memberships");
        memberships
            .create_index(unique(doc! { "project_id": 1, "user_id": 1 }))
            .await?;

        let tasks = self.db.collection::<mongodb::bson::Document>("tasks");
        tasks
            .create_index(IndexModel::builder().keys(doc! { "due_date": -1 }).build())
            .await?;
        tasks
            .create_index(IndexModel::builder().keys(doc! { "priority": 1 }).build())
            .await?;
        tasks
            .create_index(IndexModel::builder().keys(doc! { "status": 1 }).build())
            .await?;

        let subtasks = self.db.collection::<mongodb::bson::Document>("subtasks");
        subtasks
            .create_index(IndexModel::builder().keys(doc! { "task_id": 1 }).build())
            .await?;

        let comments = self.db.collection::<mongodb::bson::Document>("comments");
        comments
            .create_index(IndexModel::builder().keys(doc! { "task_id": 1 }).build())
            .await?;

        // Expired sessions are reaped by Mongo itself.
        let sessions = self.db.collection::<mongodb::bson::Document>("sessions");
        sessions
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "expires_at": 1 })
                    .options(
                        IndexOptions::builder()
                            .expire_after(Duration::from_secs(0))
                            .build(),
                    )
                    .build(),
            )
            .await?;

        Ok(())
    }
}
