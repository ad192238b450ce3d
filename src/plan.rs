//! What gets provisioned: targets and the users to create on each.
//!
//! The built-in plan mirrors the deployment's fixed accounts. A JSON plan
//! file with the same shape can replace it (`--plan`).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;

use crate::config::{self, ADMIN_TARGET_NAME, APP_TARGET_NAME};
use crate::error::ProvisionError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSpec {
    pub username: String,
    /// Plaintext; the engine hashes it on creation.
    pub password: String,
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_source_restrictions: Option<Vec<String>>,
}

impl UserSpec {
    pub fn new(username: &str, password: &str, roles: &[&str]) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            client_source_restrictions: None,
        }
    }

    pub fn restricted_to(mut self, sources: &[&str]) -> Self {
        self.client_source_restrictions = Some(sources.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Roles in plan order with duplicates removed.
    pub fn role_set(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.roles
            .iter()
            .filter(|r| seen.insert(r.as_str()))
            .cloned()
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    pub name: String,
    pub uri: String,
}

impl ConnectionTarget {
    pub fn new(name: &str, uri: &str) -> Self {
        Self {
            name: name.to_string(),
            uri: uri.to_string(),
        }
    }

    pub fn database(&self) -> Result<String, ProvisionError> {
        config::database_from_uri(&self.uri).ok_or_else(|| ProvisionError::InvalidUri(self.uri.clone()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPlan {
    pub target: ConnectionTarget,
    pub users: Vec<UserSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub targets: Vec<TargetPlan>,
}

impl Plan {
    /// The deployment's fixed accounts against the given connection strings.
    pub fn builtin(app_uri: &str, admin_uri: &str) -> Self {
        Plan {
            targets: vec![
                TargetPlan {
                    target: ConnectionTarget::new(APP_TARGET_NAME, app_uri),
                    users: vec![
                        UserSpec::new("util-aligner-server", "util-aligner-server", &["readWrite"])
                            .restricted_to(&["172.20.0.2"]),
                        UserSpec::new("util-aligner-api", "util-aligner-api", &["read"]),
                    ],
                },
                TargetPlan {
                    target: ConnectionTarget::new(ADMIN_TARGET_NAME, admin_uri),
                    users: vec![UserSpec::new("root", "root", &["root"]).restricted_to(&["127.0.0.1"])],
                },
            ],
        }
    }

    /// Built-in plan with connection strings from the environment.
    pub fn from_env() -> Self {
        Self::builtin(&config::get_app_uri(), &config::get_admin_uri())
    }

    pub async fn from_file(path: &Path) -> Result<Self, ProvisionError> {
        let display = path.display().to_string();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProvisionError::PlanFile {
                path: display.clone(),
                message: e.to_string(),
            })?;
        serde_json::from_str(&text).map_err(|e| ProvisionError::PlanFile {
            path: display,
            message: e.to_string(),
        })
    }

    pub fn user_count(&self) -> usize {
        self.targets.iter().map(|t| t.users.len()).sum()
    }

    /// Checks everything that can be checked without a server.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        if self.targets.is_empty() {
            return Err(ProvisionError::InvalidPlan("plan has no targets".into()));
        }
        for tp in &self.targets {
            let db = tp.target.database()?;
            let mut names = HashSet::new();
            for user in &tp.users {
                if user.username.trim().is_empty() {
                    return Err(ProvisionError::InvalidPlan(format!("empty username on database '{}'", db)));
                }
                if !names.insert(user.username.as_str()) {
                    return Err(ProvisionError::InvalidPlan(format!(
                        "user '{}' listed twice for database '{}'",
                        user.username, db
                    )));
                }
                if user.roles.is_empty() {
                    return Err(ProvisionError::InvalidPlan(format!("user '{}' has no roles", user.username)));
                }
                if user.roles.iter().any(|r| r.trim().is_empty()) {
                    return Err(ProvisionError::InvalidPlan(format!("user '{}' has a blank role", user.username)));
                }
                for source in user.client_source_restrictions.iter().flatten() {
                    if !is_client_source(source) {
                        return Err(ProvisionError::InvalidPlan(format!(
                            "user '{}' has invalid client source '{}'",
                            user.username, source
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Accepts an IP address or an `address/prefix` CIDR block.
pub fn is_client_source(pattern: &str) -> bool {
    match pattern.split_once('/') {
        None => pattern.parse::<IpAddr>().is_ok(),
        Some((addr, prefix)) => {
            let Ok(ip) = addr.parse::<IpAddr>() else {
                return false;
            };
            let max = if ip.is_ipv4() { 32 } else { 128 };
            matches!(prefix.parse::<u8>(), Ok(p) if p <= max)
        }
    }
}
