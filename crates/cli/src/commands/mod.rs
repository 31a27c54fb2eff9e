pub mod agent;
pub mod clone;
pub mod config_cmd;
pub mod gateway;
