pub mod completions;
pub mod config;
pub mod geocode;
pub mod set_status;
pub mod sim;
