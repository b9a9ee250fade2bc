pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod memory;
pub mod state;
pub mod transactions;
