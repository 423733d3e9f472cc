use clap::Parser;

use chat_protocol::{DEFAULT_HOST, DEFAULT_PORT};

/// Terminal client for the chat server.
#[derive(Parser, Debug, Clone)]
#[command(name = "chat-client", version)]
pub struct ClientArgs {
    /// Chat name to register with, must be unique on the server.
    pub name: String,

    /// Server host to connect to.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Server port to connect to.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl ClientArgs {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_required() {
        assert!(ClientArgs::try_parse_from(["chat-client"]).is_err());
    }

    #[test]
    fn parses_name_and_address() {
        let args = ClientArgs::parse_from(["chat-client", "Alice"]);
        assert_eq!(args.name, "Alice");
        assert_eq!(args.server_addr(), "localhost:8888");

        let args = ClientArgs::parse_from(["chat-client", "Bob", "--host", "10.0.0.2", "--port", "9999"]);
        assert_eq!(args.server_addr(), "10.0.0.2:9999");
    }
}
