//! Error types for provisioning
use mongodb::error::{Error as DriverError, ErrorKind};
use thiserror::Error;

/// Server error code for `UserAlreadyExists`
pub const CODE_USER_ALREADY_EXISTS: i32 = 51003;
/// Server error code for `Unauthorized`
pub const CODE_UNAUTHORIZED: i32 = 13;
/// Server error code for `AuthenticationFailed`
pub const CODE_AUTHENTICATION_FAILED: i32 = 18;

/// Errors that can occur while provisioning users
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The engine could not be reached or the client could not be built
    #[error("Connection to {target} failed: {message}")]
    Connection { target: String, message: String },

    /// The username already exists in the target database
    #[error("User '{username}' already exists in database '{database}'")]
    DuplicateUser { username: String, database: String },

    /// The invoking principal may not create users on the target
    #[error("Not authorized on database '{database}': {message}")]
    Unauthorized { database: String, message: String },

    /// Any other failure reported by the engine
    #[error("Command failed on database '{database}' (code {code}): {message}")]
    Command {
        database: String,
        code: i32,
        message: String,
    },

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Connection string has no database path: {0}")]
    InvalidUri(String),

    #[error("Failed to load plan file {path}: {message}")]
    PlanFile { path: String, message: String },
}

impl ProvisionError {
    pub fn is_duplicate_user(&self) -> bool {
        matches!(self, ProvisionError::DuplicateUser { .. })
    }
}

/// Maps a driver error raised while running a command on `database` into the
/// provisioning taxonomy. `username` is the user the command was about, if any.
pub fn classify(err: DriverError, database: &str, username: Option<&str>) -> ProvisionError {
    match err.kind.as_ref() {
        ErrorKind::Command(cmd) => classify_code(cmd.code, &cmd.message, database, username),
        ErrorKind::Authentication { message, .. } => ProvisionError::Unauthorized {
            database: database.to_string(),
            message: message.clone(),
        },
        ErrorKind::ServerSelection { message, .. } => ProvisionError::Connection {
            target: database.to_string(),
            message: message.clone(),
        },
        ErrorKind::Io(_) | ErrorKind::DnsResolve { .. } | ErrorKind::ConnectionPoolCleared { .. } => {
            ProvisionError::Connection {
                target: database.to_string(),
                message: err.to_string(),
            }
        }
        _ => ProvisionError::Command {
            database: database.to_string(),
            code: -1,
            message: err.to_string(),
        },
    }
}

/// Maps a server error code, independent of the driver error wrapper.
pub fn classify_code(
    code: i32,
    message: &str,
    database: &str,
    username: Option<&str>,
) -> ProvisionError {
    match (code, username) {
        (CODE_USER_ALREADY_EXISTS, Some(user)) => ProvisionError::DuplicateUser {
            username: user.to_string(),
            database: database.to_string(),
        },
        (CODE_UNAUTHORIZED | CODE_AUTHENTICATION_FAILED, _) => ProvisionError::Unauthorized {
            database: database.to_string(),
            message: message.to_string(),
        },
        _ => ProvisionError::Command {
            database: database.to_string(),
            code,
            message: message.to_string(),
        },
    }
}
