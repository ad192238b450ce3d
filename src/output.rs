use bson::Document;
use comfy_table::{modifiers, presets, ContentArrangement, Table};
use std::sync::atomic::{AtomicBool, Ordering};
use terminal_size::{terminal_size, Width};
use yansi::Paint;

use crate::command::REDACTED;
use crate::plan::Plan;
use crate::provision::{ProvisionReport, UserCheck};

static SILENT: AtomicBool = AtomicBool::new(false);

pub fn set_silent(silent: bool) {
    SILENT.store(silent, Ordering::Relaxed);
}

fn log_output(msg: String) {
    if !SILENT.load(Ordering::Relaxed) {
        println!("{}", msg);
    }
}

/// Echoes a command in mongo-shell form. Callers pass it already redacted.
pub fn echo_command(database: &str, cmd: &Document) {
    let line = format!(
        "{}{}{}",
        Paint::new(database).fg(yansi::Color::Cyan).bold(),
        Paint::new(".runCommand").fg(yansi::Color::Green),
        Paint::new(format!("({})", cmd)).fg(yansi::Color::White)
    );
    log_output(format!("Command:\n{}", line));
}

pub fn echo_reply(reply: &Document) {
    log_output(format!("Reply:\n{}", Paint::new(reply.to_string()).rgb(100, 100, 100)));
}

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    if let Some((Width(w), _)) = terminal_size() {
        table.set_width(w.saturating_sub(4));
    }
    table
}

pub fn plan_table(plan: &Plan) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Target", "Database", "User", "Password", "Roles", "Client restriction"]);
    for tp in &plan.targets {
        let db = tp.target.database().unwrap_or_else(|_| "?".to_string());
        for user in &tp.users {
            let sources = match &user.client_source_restrictions {
                Some(s) => format!("{} only", s.join(", ")),
                None => "none".to_string(),
            };
            table.add_row(vec![
                tp.target.name.clone(),
                db.clone(),
                user.username.clone(),
                REDACTED.to_string(),
                user.role_set().join(", "),
                sources,
            ]);
        }
    }
    table
}

pub fn report_table(report: &ProvisionReport) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Database", "User"]);
    for (db, user) in &report.created {
        table.add_row(vec![db, user]);
    }
    table
}

pub fn checks_table(checks: &[UserCheck]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Database", "User", "Status"]);
    for check in checks {
        let status = check.status.to_string();
        let status = if check.status.is_ok() {
            Paint::new(status).green().to_string()
        } else {
            Paint::new(status).red().to_string()
        };
        table.add_row(vec![check.database.clone(), check.username.clone(), status]);
    }
    table
}
