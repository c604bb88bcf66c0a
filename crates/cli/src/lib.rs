pub mod cli;
pub mod gauges;
pub mod logging;
pub mod server;
