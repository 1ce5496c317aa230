// src/config.rs

use std::env;

#[derive(Clone)]
pub struct Config {
    pub mongo_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub asset_dir: String,
    pub max_asset_bytes: i64,
    pub enforce_asset_types: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let max_asset_bytes = env::var("MAX_ASSET_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(50 * 1024 * 1024);
        let enforce_asset_types = env::var("ENFORCE_ASSET_TYPES")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        Self {
            mongo_uri: env::var("MONGO_URI").expect("MONGO_URI must be set"),
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "taskwave".to_string()),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            asset_dir: env::var("ASSET_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            max_asset_bytes,
            enforce_asset_types,
        }
    }
}
