pub mod app;
pub mod auth;
pub mod backup;
pub mod config;
pub mod crypto;
pub mod error;
pub mod notify;
pub mod repairs;
pub mod state;
pub mod storage;
