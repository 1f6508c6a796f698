pub mod banner;
pub mod config;
pub mod consts;
pub mod error;
pub mod runner;
pub mod server;
pub mod stager;
