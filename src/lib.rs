// Sayahat client - Library root

pub mod config;
pub mod error;
pub mod http_client;
pub mod navigation;
pub mod session;
pub mod store;
