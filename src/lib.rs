pub mod config;
pub mod db;
pub mod kt;
pub mod logging;
