//! CLI commands

mod build;
mod compile_db;
mod list;
mod plan;

pub use build::BuildCommand;
pub use compile_db::CompileDbCommand;
pub use list::ListCommand;
pub use plan::PlanCommand;
