pub mod command;
pub mod manager;

pub use command::OperatorCommand;
pub use manager::FleetManager;
