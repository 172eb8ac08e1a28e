pub mod api;
pub mod app;
pub mod artifact;
pub mod audio;
pub mod capture;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod global;
pub mod worker;
