pub mod cli;
pub mod client;
pub mod error;

pub use cli::ClientArgs;
pub use client::Client;
pub use error::ClientError;
