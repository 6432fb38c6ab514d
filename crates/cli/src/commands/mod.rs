//! Command handlers for the VeloSight CLI.

pub mod analyse;
pub mod health;
pub mod types;

pub use analyse::AnalyseCommand;
pub use health::HealthCommand;
pub use types::TypesCommand;
