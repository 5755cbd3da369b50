pub mod cli;
pub mod config;
pub mod dispatch;
pub mod replay;
pub mod runtime;
pub mod transport;
