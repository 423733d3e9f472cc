use chat_protocol::{ClientName, Command};

// server type definitions

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Registering,
    Active,
    Closing,
    Closed,
}

// A parsed client line tagged with who sent it, consumed once by the Router
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Broadcast { sender: ClientName, body: String },
    Direct { sender: ClientName, recipient: String, body: String },
    ListRequest { requester: ClientName },
    Help { requester: ClientName },
    Disconnect { who: ClientName },
}

impl Message {
    pub fn from_command(sender: &ClientName, command: Command) -> Self {
        let sender = sender.clone();

        match command {
            Command::Broadcast(body) => Message::Broadcast { sender, body },
            Command::Direct { recipient, body } => Message::Direct { sender, recipient, body },
            Command::List => Message::ListRequest { requester: sender },
            Command::Help => Message::Help { requester: sender },
            Command::Quit => Message::Disconnect { who: sender },
        }
    }
}

// What the session should do after a message has been routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}
