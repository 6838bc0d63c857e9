//! CLI commands

mod init;
mod list;
mod run;
mod serve;

pub use init::InitCommand;
pub use list::ListCommand;
pub use run::RunCommand;
pub use serve::ServeCommand;
