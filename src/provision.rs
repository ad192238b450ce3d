//! The provisioning run and its read-only counterpart.
//!
//! A run walks the plan target by target: connect, create each user in
//! order, drop the connection, move on. The first error stops the run;
//! users created before it stay created. Nothing here retries or skips
//! existing users, so a second run against a provisioned database fails
//! with [`ProvisionError::DuplicateUser`].

use std::fmt;
use tracing::{error, info};

use crate::error::ProvisionError;
use crate::mongo::{Connector, RoleGrant, UserAdmin};
use crate::plan::{Plan, UserSpec};

/// Users created by a run, as `(database, username)` in creation order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub created: Vec<(String, String)>,
}

/// A failed run together with what it managed to create first.
#[derive(Debug)]
pub struct ProvisionFailure {
    pub error: ProvisionError,
    pub partial: ProvisionReport,
}

impl fmt::Display for ProvisionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

pub struct Provisioner<C> {
    connector: C,
}

impl<C: Connector> Provisioner<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    pub async fn run(&self, plan: &Plan) -> Result<ProvisionReport, ProvisionFailure> {
        let mut report = ProvisionReport::default();
        if let Err(error) = plan.validate() {
            return Err(ProvisionFailure { error, partial: report });
        }

        for tp in &plan.targets {
            let session = match self.connector.connect(&tp.target).await {
                Ok(s) => s,
                Err(error) => {
                    error!(connection = %tp.target.name, %error, "Connection failed");
                    return Err(ProvisionFailure { error, partial: report });
                }
            };
            for user in &tp.users {
                if let Err(error) = session.create_user(user).await {
                    error!(database = %session.database(), user = %user.username, %error, "createUser failed");
                    return Err(ProvisionFailure { error, partial: report });
                }
                info!(database = %session.database(), user = %user.username, "Created user");
                report
                    .created
                    .push((session.database().to_string(), user.username.clone()));
            }
        }

        info!(count = report.created.len(), "Provisioning complete");
        Ok(report)
    }

    /// Connects to every target, continuing past failures. Never writes.
    pub async fn check_targets(&self, plan: &Plan) -> Vec<(String, Result<(), ProvisionError>)> {
        let mut results = Vec::with_capacity(plan.targets.len());
        for tp in &plan.targets {
            let outcome = self.connector.connect(&tp.target).await.map(|_| ());
            results.push((tp.target.name.clone(), outcome));
        }
        results
    }

    /// Compares each planned user with what the engine reports. Never writes.
    pub async fn verify(&self, plan: &Plan) -> Result<Vec<UserCheck>, ProvisionError> {
        plan.validate()?;
        let mut checks = Vec::with_capacity(plan.user_count());

        for tp in &plan.targets {
            let session = self.connector.connect(&tp.target).await?;
            for user in &tp.users {
                let status = match session.user_info(&user.username).await? {
                    None => CheckStatus::Missing,
                    Some(found) => {
                        let db = session.database();
                        let mut want_roles: Vec<RoleGrant> =
                            user.role_set().iter().map(|r| RoleGrant::new(r, db)).collect();
                        let mut got_roles = found.roles.clone();
                        want_roles.sort();
                        got_roles.sort();

                        if want_roles != got_roles {
                            CheckStatus::RolesDiffer { found: found.roles }
                        } else if normalize(expected_restrictions(user)) != normalize(found.restrictions.clone()) {
                            CheckStatus::RestrictionsDiffer { found: found.restrictions }
                        } else {
                            CheckStatus::Ok
                        }
                    }
                };
                checks.push(UserCheck {
                    database: session.database().to_string(),
                    username: user.username.clone(),
                    status,
                });
            }
        }
        Ok(checks)
    }
}

/// A planned client-source list becomes a single restriction document.
fn expected_restrictions(user: &UserSpec) -> Vec<Vec<String>> {
    user.client_source_restrictions.clone().into_iter().collect()
}

/// Order does not matter within a list, nor between documents.
fn normalize(mut restrictions: Vec<Vec<String>>) -> Vec<Vec<String>> {
    for sources in restrictions.iter_mut() {
        sources.sort();
    }
    restrictions.sort();
    restrictions
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserCheck {
    pub database: String,
    pub username: String,
    pub status: CheckStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Missing,
    RolesDiffer { found: Vec<RoleGrant> },
    RestrictionsDiffer { found: Vec<Vec<String>> },
}

impl CheckStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, CheckStatus::Ok)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Ok => write!(f, "ok"),
            CheckStatus::Missing => write!(f, "missing"),
            CheckStatus::RolesDiffer { found } => {
                let roles: Vec<String> = found.iter().map(|r| r.to_string()).collect();
                write!(f, "roles differ (found: {})", roles.join(", "))
            }
            CheckStatus::RestrictionsDiffer { found } => {
                let docs: Vec<String> = found.iter().map(|s| format!("[{}]", s.join(", "))).collect();
                write!(f, "restrictions differ (found: {})", docs.join(" and "))
            }
        }
    }
}
