use initdb::config;
use initdb::output;
use initdb::{MongoConnector, Plan, Provisioner};

use clap::{Parser, Subcommand};
use std::path::Path;
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use yansi::Paint;

#[derive(Parser)]
#[command(
    name = "initdb",
    author,
    version,
    about = "Provision util-aligner MongoDB users",
    long_about = r#"initdb creates the util-aligner database principals once, at database startup.

It connects to the application database and then to the admin database and
issues one createUser per user. Any failure stops the run; users created
before the failure are kept. Running it twice fails with a duplicate-user
error.

Examples:
  1) Provision against the defaults (mongodb://localhost/util_aligner, mongodb://localhost/admin):
      initdb
  2) Show what would be created:
      initdb plan
  3) Check an existing deployment:
      initdb verify
"#,
    after_help = "Use `initdb <subcommand> --help` to get subcommand specific options."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Path to .env file
    #[arg(long, global = true)]
    env_file: Option<String>,
    /// JSON plan file to use instead of the built-in users
    #[arg(long, global = true)]
    plan: Option<String>,
    /// Disable colorized output
    #[arg(long, global = true)]
    no_color: bool,
    /// Do not echo commands and replies
    #[arg(long, global = true)]
    silent: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the planned users
    #[command(about = "Create the planned users", long_about = "Connect to each target in order and create its users. Stops at the first error.")]
    Run,
    /// Print the plan without connecting
    Plan {
        /// Print the plan as JSON (passwords included)
        #[arg(long)]
        json: bool,
    },
    /// Check that the planned users exist with the planned roles and restrictions
    #[command(about = "Verify provisioned users", long_about = "Read-only: runs usersInfo for every planned user and compares roles and client-source restrictions.")]
    Verify,
    /// Validate the plan and ping each target
    CheckConfig,
}

async fn load_plan(path: Option<&str>) -> Plan {
    let plan = match path {
        Some(p) => match Plan::from_file(Path::new(p)).await {
            Ok(plan) => plan,
            Err(e) => fail(&e),
        },
        None => Plan::from_env(),
    };
    if let Err(e) = plan.validate() {
        fail(&e);
    }
    plan
}

fn fail(e: &dyn std::fmt::Display) -> ! {
    tracing::error!(error = %e, "initdb failed");
    eprintln!("{}: {}", Paint::new("Error").red().bold(), e);
    process::exit(1);
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.no_color {
        yansi::whenever(yansi::Condition::NEVER);
    }
    if cli.silent {
        output::set_silent(true);
    }

    config::load_env_file(cli.env_file.as_deref());
    let plan = load_plan(cli.plan.as_deref()).await;
    let provisioner = Provisioner::new(MongoConnector);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => match provisioner.run(&plan).await {
            Ok(report) => {
                println!("\n{}", output::report_table(&report));
                println!("{}", Paint::new(format!("Created {} users", report.created.len())).green());
            }
            Err(failure) => {
                if !failure.partial.created.is_empty() {
                    eprintln!("{}", Paint::new("Users created before the failure:").yellow());
                    eprintln!("{}", output::report_table(&failure.partial));
                }
                fail(&failure);
            }
        },
        Commands::Plan { json } => {
            if json {
                match serde_json::to_string_pretty(&plan) {
                    Ok(s) => println!("{}", s),
                    Err(e) => fail(&e),
                }
            } else {
                println!("\n{}\n", output::plan_table(&plan));
            }
        }
        Commands::Verify => match provisioner.verify(&plan).await {
            Ok(checks) => {
                println!("\n{}\n", output::checks_table(&checks));
                if checks.iter().any(|c| !c.status.is_ok()) {
                    process::exit(1);
                }
            }
            Err(e) => fail(&e),
        },
        Commands::CheckConfig => {
            let mut ok = true;
            for (name, outcome) in provisioner.check_targets(&plan).await {
                match outcome {
                    Ok(()) => println!("{} {}", Paint::new(name).cyan(), Paint::new("reachable").green()),
                    Err(e) => {
                        ok = false;
                        eprintln!("{} {}", Paint::new(name).cyan(), Paint::new(e.to_string()).red());
                    }
                }
            }
            if !ok {
                process::exit(1);
            }
            println!("{}", Paint::new("Configuration looks valid").green());
        }
    }
}
