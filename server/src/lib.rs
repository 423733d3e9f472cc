pub mod config;
pub mod connection;
pub mod error;
pub mod registry;
pub mod router;
pub mod server;
pub mod server_types;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::ServerConfig;
pub use error::ChatError;
pub use server::Server;
