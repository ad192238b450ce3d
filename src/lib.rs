pub mod command;
pub mod config;
pub mod error;
pub mod mongo;
pub mod output;
pub mod plan;
pub mod provision;

pub use error::ProvisionError;
pub use mongo::{Connector, MongoConnector, UserAdmin};
pub use plan::{ConnectionTarget, Plan, TargetPlan, UserSpec};
pub use provision::{ProvisionReport, Provisioner};
