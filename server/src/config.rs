use clap::builder::TypedValueParser;
use clap::Parser;

use chat_protocol::{DEFAULT_HOST, DEFAULT_PORT, LINES_MAX_LEN};

/// Multi-client TCP chat server.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "chat-server", version)]
pub struct ServerConfig {
    /// Interface to listen on.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on. Use 0 for an ephemeral port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Longest input line accepted from a client, in bytes.
    #[arg(long, default_value_t = LINES_MAX_LEN, value_parser = clap::value_parser!(u64).range(1..).map(|n| n as usize))]
    pub max_line_length: usize,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            max_line_length: LINES_MAX_LEN,
        }
    }
}
