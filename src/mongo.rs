//! Seams between the provisioner and the database engine, plus the
//! `mongodb`-driver implementation used by the binary.

use bson::Document;
use mongodb::{Client, Database};
use std::fmt;
use tracing::{debug, info};

use crate::command;
use crate::error::{classify, ProvisionError};
use crate::output;
use crate::plan::{ConnectionTarget, UserSpec};

/// A role together with the database it is granted on.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RoleGrant {
    pub role: String,
    pub db: String,
}

impl RoleGrant {
    pub fn new(role: &str, db: &str) -> Self {
        Self {
            role: role.to_string(),
            db: db.to_string(),
        }
    }
}

impl fmt::Display for RoleGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.role, self.db)
    }
}

/// A user as the engine reports it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionedUser {
    pub username: String,
    pub database: String,
    pub roles: Vec<RoleGrant>,
    /// One `clientSource` list per `authenticationRestrictions` document.
    /// Documents are AND-ed by the engine, entries within one list OR-ed.
    pub restrictions: Vec<Vec<String>>,
}

/// Opens a session on one target.
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Session: UserAdmin;

    async fn connect(&self, target: &ConnectionTarget) -> Result<Self::Session, ProvisionError>;
}

/// User administration on one connected database.
#[allow(async_fn_in_trait)]
pub trait UserAdmin {
    fn database(&self) -> &str;

    async fn create_user(&self, user: &UserSpec) -> Result<(), ProvisionError>;

    async fn user_info(&self, username: &str) -> Result<Option<ProvisionedUser>, ProvisionError>;
}

/// Talks to a real server through the `mongodb` driver.
#[derive(Clone, Debug, Default)]
pub struct MongoConnector;

pub struct MongoSession {
    // Kept so the connection pool lives as long as the session.
    _client: Client,
    db: Database,
    db_name: String,
}

impl Connector for MongoConnector {
    type Session = MongoSession;

    async fn connect(&self, target: &ConnectionTarget) -> Result<MongoSession, ProvisionError> {
        let db_name = target.database()?;
        info!(connection = %target.name, database = %db_name, "Connecting to MongoDB");

        let client = Client::with_uri_str(&target.uri)
            .await
            .map_err(|e| ProvisionError::Connection {
                target: target.name.clone(),
                message: e.to_string(),
            })?;
        let db = client.database(&db_name);

        // The driver connects lazily; ping so an unreachable server fails here.
        db.run_command(command::ping())
            .await
            .map_err(|e| connect_failure(target, classify(e, &db_name, None)))?;

        info!(database = %db_name, "Connected to MongoDB");
        Ok(MongoSession {
            _client: client,
            db,
            db_name,
        })
    }
}

/// Reports a failed connect step under the target's name.
pub fn connect_failure(target: &ConnectionTarget, err: ProvisionError) -> ProvisionError {
    match err {
        ProvisionError::Command { message, .. } | ProvisionError::Connection { message, .. } => {
            ProvisionError::Connection {
                target: target.name.clone(),
                message,
            }
        }
        other => other,
    }
}

impl MongoSession {
    async fn run(&self, cmd: Document, username: Option<&str>) -> Result<Document, ProvisionError> {
        let shown = command::redact(&cmd);
        debug!(database = %self.db_name, command = %shown, "Running command");
        output::echo_command(&self.db_name, &shown);

        let reply = self
            .db
            .run_command(cmd)
            .await
            .map_err(|e| classify(e, &self.db_name, username))?;
        output::echo_reply(&reply);
        Ok(reply)
    }
}

impl UserAdmin for MongoSession {
    fn database(&self) -> &str {
        &self.db_name
    }

    async fn create_user(&self, user: &UserSpec) -> Result<(), ProvisionError> {
        self.run(command::create_user(user), Some(&user.username)).await?;
        Ok(())
    }

    async fn user_info(&self, username: &str) -> Result<Option<ProvisionedUser>, ProvisionError> {
        let reply = self.run(command::users_info(username), None).await?;
        Ok(parse_users_info(&reply, username))
    }
}

/// Picks `username` out of a `usersInfo` reply.
pub fn parse_users_info(reply: &Document, username: &str) -> Option<ProvisionedUser> {
    let users = reply.get_array("users").ok()?;
    users
        .iter()
        .filter_map(|u| u.as_document())
        .find(|u| u.get_str("user").ok() == Some(username))
        .map(|u| {
            let roles: Vec<RoleGrant> = u
                .get_array("roles")
                .map(|arr| {
                    arr.iter()
                        .filter_map(|r| r.as_document())
                        .filter_map(|r| Some(RoleGrant::new(r.get_str("role").ok()?, r.get_str("db").ok()?)))
                        .collect()
                })
                .unwrap_or_default();
            let restrictions: Vec<Vec<String>> = u
                .get_array("authenticationRestrictions")
                .map(|arr| {
                    arr.iter()
                        .filter_map(|r| r.as_document())
                        .map(|r| {
                            r.get_array("clientSource")
                                .map(|sources| {
                                    sources
                                        .iter()
                                        .filter_map(|s| s.as_str().map(str::to_string))
                                        .collect::<Vec<String>>()
                                })
                                .unwrap_or_default()
                        })
                        .collect()
                })
                .unwrap_or_default();
            ProvisionedUser {
                username: username.to_string(),
                database: u.get_str("db").unwrap_or_default().to_string(),
                roles,
                restrictions,
            }
        })
}
