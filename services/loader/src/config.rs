//! Loader configuration.

use std::env;

use storage::ObjectStoreConfig;

/// Object-store connection settings from environment variables, falling
/// back to the local MinIO defaults.
pub fn object_store_from_env() -> ObjectStoreConfig {
    ObjectStoreConfig {
        endpoint: env::var("S3_ENDPOINT").unwrap_or_else(|_| "http://minio:9000".to_string()),
        access_key_id: env::var("S3_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".to_string()),
        secret_access_key: env::var("S3_SECRET_KEY").unwrap_or_else(|_| "minioadmin".to_string()),
        region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        allow_http: env::var("S3_ALLOW_HTTP")
            .map(|v| v == "true")
            .unwrap_or(true),
    }
}
