use initdb::config::{DEFAULT_ADMIN_URI, DEFAULT_APP_URI};
use initdb::error::ProvisionError;
use initdb::mongo::{Connector, ProvisionedUser, RoleGrant, UserAdmin};
use initdb::provision::CheckStatus;
use initdb::{ConnectionTarget, Plan, Provisioner, UserSpec};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

/// In-memory stand-in for the engine: keeps users per database and an event log.
#[derive(Default)]
struct Engine {
    users: BTreeMap<(String, String), UserSpec>,
    /// What `usersInfo` reports instead of the stored spec, when set.
    reported: BTreeMap<(String, String), ProvisionedUser>,
    events: Vec<String>,
    unreachable: HashSet<String>,
    read_only_caller: bool,
}

#[derive(Clone, Default)]
struct FakeConnector {
    engine: Arc<Mutex<Engine>>,
}

struct FakeSession {
    engine: Arc<Mutex<Engine>>,
    db: String,
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, target: &ConnectionTarget) -> Result<FakeSession, ProvisionError> {
        let db = target.database()?;
        let mut engine = self.engine.lock().unwrap();
        if engine.unreachable.contains(&db) {
            return Err(ProvisionError::Connection {
                target: target.name.clone(),
                message: "server selection timeout".into(),
            });
        }
        engine.events.push(format!("connect {}", db));
        Ok(FakeSession {
            engine: self.engine.clone(),
            db,
        })
    }
}

impl UserAdmin for FakeSession {
    fn database(&self) -> &str {
        &self.db
    }

    async fn create_user(&self, user: &UserSpec) -> Result<(), ProvisionError> {
        let mut engine = self.engine.lock().unwrap();
        if engine.read_only_caller {
            return Err(ProvisionError::Unauthorized {
                database: self.db.clone(),
                message: "not authorized to execute command createUser".into(),
            });
        }
        let key = (self.db.clone(), user.username.clone());
        if engine.users.contains_key(&key) {
            return Err(ProvisionError::DuplicateUser {
                username: user.username.clone(),
                database: self.db.clone(),
            });
        }
        engine.users.insert(key, user.clone());
        engine.events.push(format!("createUser {}.{}", self.db, user.username));
        Ok(())
    }

    async fn user_info(&self, username: &str) -> Result<Option<ProvisionedUser>, ProvisionError> {
        let engine = self.engine.lock().unwrap();
        let key = (self.db.clone(), username.to_string());
        if let Some(reported) = engine.reported.get(&key) {
            return Ok(Some(reported.clone()));
        }
        Ok(engine.users.get(&key).map(|u| ProvisionedUser {
            username: u.username.clone(),
            database: self.db.clone(),
            roles: u.role_set().iter().map(|r| RoleGrant::new(r, &self.db)).collect(),
            restrictions: u.client_source_restrictions.clone().into_iter().collect(),
        }))
    }
}

fn key(db: &str, user: &str) -> (String, String) {
    (db.to_string(), user.to_string())
}

fn builtin() -> Plan {
    Plan::builtin(DEFAULT_APP_URI, DEFAULT_ADMIN_URI)
}

#[tokio::test]
async fn fresh_database_gets_exactly_three_users_in_order() {
    let connector = FakeConnector::default();
    let provisioner = Provisioner::new(connector.clone());

    let report = provisioner.run(&builtin()).await.unwrap();

    assert_eq!(
        report.created,
        vec![
            ("util_aligner".to_string(), "util-aligner-server".to_string()),
            ("util_aligner".to_string(), "util-aligner-api".to_string()),
            ("admin".to_string(), "root".to_string()),
        ]
    );

    let engine = connector.engine.lock().unwrap();
    assert_eq!(
        engine.events,
        vec![
            "connect util_aligner",
            "createUser util_aligner.util-aligner-server",
            "createUser util_aligner.util-aligner-api",
            "connect admin",
            "createUser admin.root",
        ]
    );
    assert_eq!(engine.users.len(), 3);
    assert_eq!(engine.users.keys().filter(|(db, _)| db == "util_aligner").count(), 2);
    assert_eq!(engine.users.keys().filter(|(db, _)| db == "admin").count(), 1);
}

#[tokio::test]
async fn existing_principals_are_left_alone() {
    let connector = FakeConnector::default();
    let other = UserSpec::new("backup", "backup", &["backup"]);
    connector
        .engine
        .lock()
        .unwrap()
        .users
        .insert(("admin".into(), "backup".into()), other.clone());

    Provisioner::new(connector.clone()).run(&builtin()).await.unwrap();

    let engine = connector.engine.lock().unwrap();
    assert_eq!(engine.users.len(), 4);
    assert_eq!(engine.users.get(&key("admin", "backup")), Some(&other));
}

#[tokio::test]
async fn second_run_fails_with_duplicate_user() {
    let connector = FakeConnector::default();
    let provisioner = Provisioner::new(connector.clone());
    provisioner.run(&builtin()).await.unwrap();

    let failure = provisioner.run(&builtin()).await.unwrap_err();

    assert!(failure.error.is_duplicate_user());
    assert_eq!(
        failure.error.to_string(),
        "User 'util-aligner-server' already exists in database 'util_aligner'"
    );
    assert!(failure.partial.created.is_empty());
    assert_eq!(connector.engine.lock().unwrap().users.len(), 3);
}

#[tokio::test]
async fn failure_stops_the_run_and_reports_partial_progress() {
    let connector = FakeConnector::default();
    connector
        .engine
        .lock()
        .unwrap()
        .users
        .insert(("util_aligner".into(), "util-aligner-api".into()), UserSpec::new("util-aligner-api", "old", &["read"]));

    let failure = Provisioner::new(connector.clone()).run(&builtin()).await.unwrap_err();

    assert!(failure.error.is_duplicate_user());
    assert_eq!(
        failure.partial.created,
        vec![("util_aligner".to_string(), "util-aligner-server".to_string())]
    );
    let engine = connector.engine.lock().unwrap();
    assert!(!engine.events.iter().any(|e| e == "connect admin"));
    assert!(!engine.users.contains_key(&key("admin", "root")));
}

#[tokio::test]
async fn unreachable_admin_target_keeps_app_users() {
    let connector = FakeConnector::default();
    connector.engine.lock().unwrap().unreachable.insert("admin".into());

    let failure = Provisioner::new(connector.clone()).run(&builtin()).await.unwrap_err();

    assert!(matches!(failure.error, ProvisionError::Connection { ref target, .. } if target == "admin"));
    assert_eq!(failure.partial.created.len(), 2);
}

#[tokio::test]
async fn caller_without_privilege_fails_before_any_user_is_created() {
    let connector = FakeConnector::default();
    connector.engine.lock().unwrap().read_only_caller = true;

    let failure = Provisioner::new(connector.clone()).run(&builtin()).await.unwrap_err();

    assert!(matches!(failure.error, ProvisionError::Unauthorized { .. }));
    assert!(connector.engine.lock().unwrap().users.is_empty());
}

#[tokio::test]
async fn invalid_plan_never_connects() {
    let connector = FakeConnector::default();
    let mut plan = builtin();
    plan.targets[1].users.push(UserSpec::new("root", "again", &["root"]));

    let failure = Provisioner::new(connector.clone()).run(&plan).await.unwrap_err();

    assert!(matches!(failure.error, ProvisionError::InvalidPlan(_)));
    assert!(connector.engine.lock().unwrap().events.is_empty());
}

#[tokio::test]
async fn verify_after_run_reports_every_user_ok() {
    let connector = FakeConnector::default();
    let provisioner = Provisioner::new(connector.clone());
    provisioner.run(&builtin()).await.unwrap();

    let checks = provisioner.verify(&builtin()).await.unwrap();

    assert_eq!(checks.len(), 3);
    assert!(checks.iter().all(|c| c.status.is_ok()));
}

#[tokio::test]
async fn verify_flags_missing_users_and_role_drift() {
    let connector = FakeConnector::default();
    {
        let mut engine = connector.engine.lock().unwrap();
        engine.users.insert(
            ("util_aligner".into(), "util-aligner-api".into()),
            UserSpec::new("util-aligner-api", "util-aligner-api", &["readWrite"]),
        );
        engine.users.insert(
            ("admin".into(), "root".into()),
            UserSpec::new("root", "root", &["root"]),
        );
    }

    let checks = Provisioner::new(connector).verify(&builtin()).await.unwrap();

    assert_eq!(checks[0].status, CheckStatus::Missing);
    assert_eq!(
        checks[1].status,
        CheckStatus::RolesDiffer { found: vec![RoleGrant::new("readWrite", "util_aligner")] }
    );
    assert_eq!(checks[1].status.to_string(), "roles differ (found: readWrite@util_aligner)");
    assert_eq!(checks[2].status, CheckStatus::RestrictionsDiffer { found: vec![] });
    assert_eq!(checks[2].status.to_string(), "restrictions differ (found: )");
}

#[tokio::test]
async fn verify_flags_role_granted_on_another_database() {
    let connector = FakeConnector::default();
    let provisioner = Provisioner::new(connector.clone());
    provisioner.run(&builtin()).await.unwrap();
    connector.engine.lock().unwrap().reported.insert(
        key("util_aligner", "util-aligner-api"),
        ProvisionedUser {
            username: "util-aligner-api".into(),
            database: "util_aligner".into(),
            roles: vec![RoleGrant::new("read", "some_other_db")],
            restrictions: vec![],
        },
    );

    let checks = provisioner.verify(&builtin()).await.unwrap();

    assert!(checks[0].status.is_ok());
    assert_eq!(
        checks[1].status,
        CheckStatus::RolesDiffer { found: vec![RoleGrant::new("read", "some_other_db")] }
    );
    assert!(checks[2].status.is_ok());
}

#[tokio::test]
async fn verify_flags_an_extra_restriction_document() {
    let connector = FakeConnector::default();
    let provisioner = Provisioner::new(connector.clone());
    provisioner.run(&builtin()).await.unwrap();
    // The planned document plus a second, AND-ed one.
    let split = vec![vec!["172.20.0.2".to_string()], vec!["10.0.0.0/8".to_string()]];
    connector.engine.lock().unwrap().reported.insert(
        key("util_aligner", "util-aligner-server"),
        ProvisionedUser {
            username: "util-aligner-server".into(),
            database: "util_aligner".into(),
            roles: vec![RoleGrant::new("readWrite", "util_aligner")],
            restrictions: split.clone(),
        },
    );

    let checks = provisioner.verify(&builtin()).await.unwrap();

    assert_eq!(checks[0].status, CheckStatus::RestrictionsDiffer { found: split });
    assert_eq!(
        checks[0].status.to_string(),
        "restrictions differ (found: [172.20.0.2] and [10.0.0.0/8])"
    );
}

#[tokio::test]
async fn check_targets_reports_each_target() {
    let connector = FakeConnector::default();
    connector.engine.lock().unwrap().unreachable.insert("util_aligner".into());

    let results = Provisioner::new(connector).check_targets(&builtin()).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "app");
    assert!(results[0].1.is_err());
    assert_eq!(results[1].0, "admin");
    assert!(results[1].1.is_ok());
}
