pub mod backend;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod kafka;
pub mod models;
pub mod monitor;
pub mod processor;
pub mod realtime;
pub mod rules;
pub mod session;
