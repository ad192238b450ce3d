use bson::{doc, Bson, Document};

use crate::plan::UserSpec;

pub const REDACTED: &str = "********";

/// `createUser` command for `user`. Restrictions are omitted when absent.
pub fn create_user(user: &UserSpec) -> Document {
    let mut cmd = doc! {
        "createUser": user.username.as_str(),
        "pwd": user.password.as_str(),
        "roles": user.role_set(),
    };
    if let Some(sources) = &user.client_source_restrictions {
        cmd.insert(
            "authenticationRestrictions",
            vec![doc! { "clientSource": sources.clone() }],
        );
    }
    cmd
}

pub fn users_info(username: &str) -> Document {
    doc! {
        "usersInfo": username,
        "showAuthenticationRestrictions": true,
    }
}

pub fn ping() -> Document {
    doc! { "ping": 1 }
}

/// Copy of `cmd` safe to print or log.
pub fn redact(cmd: &Document) -> Document {
    let mut out = cmd.clone();
    if out.contains_key("pwd") {
        out.insert("pwd", Bson::String(REDACTED.to_string()));
    }
    out
}
