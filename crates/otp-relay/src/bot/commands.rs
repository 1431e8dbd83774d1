//! Parsing of bot commands.

/// A command sent to the bot. Arguments stay unvalidated so the handler can
/// answer malformed input with usage help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    MyId,
    Help,
    Status,
    Redeem { code: Option<String> },
    AddUser { identity: Option<String> },
    AddAccess { identity: Option<String>, days: Option<String> },
    RemoveUser { identity: Option<String> },
    ListUsers,
    NewCode { days: Option<String> },
    ListCodes,
    DelCode { code: Option<String> },
    Broadcast { text: String },
    Unknown(String),
}

impl Command {
    /// Parses a message. Returns `None` for text that is not a command.
    ///
    /// Accepts `/name@botname` and matches names case-insensitively.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let body = text.strip_prefix('/')?;

        let (head, rest) = match body.find(char::is_whitespace) {
            Some(pos) => (&body[..pos], body[pos..].trim()),
            None => (body, ""),
        };
        let name = head.split('@').next().unwrap_or_default().to_lowercase();
        if name.is_empty() {
            return None;
        }

        let mut args = rest.split_whitespace().map(str::to_string);
        let command = match name.as_str() {
            "start" => Command::Start,
            "myid" => Command::MyId,
            "help" => Command::Help,
            "status" => Command::Status,
            "redeem" => Command::Redeem { code: args.next() },
            "adduser" => Command::AddUser {
                identity: args.next(),
            },
            "addaccess" | "addakses" => Command::AddAccess {
                identity: args.next(),
                days: args.next(),
            },
            "removeuser" => Command::RemoveUser {
                identity: args.next(),
            },
            "listusers" => Command::ListUsers,
            "newcode" | "kodeunik" => Command::NewCode { days: args.next() },
            "listcodes" | "listkode" => Command::ListCodes,
            "delcode" => Command::DelCode { code: args.next() },
            "broadcast" => Command::Broadcast {
                text: rest.to_string(),
            },
            _ => Command::Unknown(name),
        };
        Some(command)
    }

    /// Commands only the owner may run.
    pub fn is_owner_only(&self) -> bool {
        matches!(
            self,
            Command::AddUser { .. }
                | Command::AddAccess { .. }
                | Command::RemoveUser { .. }
                | Command::ListUsers
                | Command::NewCode { .. }
                | Command::ListCodes
                | Command::DelCode { .. }
                | Command::Broadcast { .. }
        )
    }
}
