use std::env;
use std::path::Path;

// Default configuration constants
pub const DEFAULT_APP_URI: &str = "mongodb://localhost/util_aligner";
pub const DEFAULT_ADMIN_URI: &str = "mongodb://localhost/admin";
pub const APP_TARGET_NAME: &str = "app";
pub const ADMIN_TARGET_NAME: &str = "admin";

pub const APP_URI_VAR: &str = "INITDB_APP_URI";
pub const ADMIN_URI_VAR: &str = "INITDB_ADMIN_URI";

pub fn load_env_file(env_file: Option<&str>) {
    if let Some(path) = env_file {
        dotenvy::from_path(Path::new(path)).ok();
    } else {
        dotenvy::dotenv().ok();
    }
}

pub fn get_app_uri() -> String {
    uri_from_env(APP_URI_VAR, DEFAULT_APP_URI)
}

pub fn get_admin_uri() -> String {
    uri_from_env(ADMIN_URI_VAR, DEFAULT_ADMIN_URI)
}

fn uri_from_env(var: &str, default: &str) -> String {
    sanitize_uri(&env::var(var).unwrap_or_default(), default)
}

/// Trims whitespace and falls back to `default` when nothing is left.
pub fn sanitize_uri(raw: &str, default: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Extracts the database name from the path of a `mongodb://` connection string.
pub fn database_from_uri(uri: &str) -> Option<String> {
    let rest = uri
        .strip_prefix("mongodb+srv://")
        .or_else(|| uri.strip_prefix("mongodb://"))?;
    let (_, path) = rest.split_once('/')?;
    let db = path.split(['?', '#']).next().unwrap_or_default();
    if db.is_empty() {
        None
    } else {
        Some(db.to_string())
    }
}
