pub mod catalog;
pub mod config;
pub mod describe;
pub mod errors;
pub mod http;
pub mod logging;
pub mod planner;
pub mod search;
pub mod server;
pub mod state;
