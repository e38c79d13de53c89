//! Chat command parsing

/// A parsed chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Profile,
    Bonus,
    Shop,
    Buy(i64),
    Check(i64),

    /// A video link to process
    Submit(String),

    /// A known command with a missing or invalid argument
    Usage(&'static str),

    Unknown,
}

impl Command {
    /// Parses a message text
    ///
    /// Commands may carry the `@botname` suffix group chats add. Any other
    /// text containing an `http://` or `https://` link is a submission of the
    /// first such link.
    pub fn parse(text: &str) -> Command {
        let text = text.trim();

        if let Some(rest) = text.strip_prefix('/') {
            let mut parts = rest.split_whitespace();
            let name = parts.next().unwrap_or_default();
            let name = name.split('@').next().unwrap_or_default().to_ascii_lowercase();
            let arg = parts.next().map(|a| a.parse::<i64>());

            return match (name.as_str(), arg) {
                ("start", _) => Command::Start,
                ("profile", _) => Command::Profile,
                ("bonus", _) => Command::Bonus,
                ("shop", _) => Command::Shop,
                ("buy", Some(Ok(id))) => Command::Buy(id),
                ("buy", _) => Command::Usage("/buy <package number>"),
                ("check", Some(Ok(id))) => Command::Check(id),
                ("check", _) => Command::Usage("/check <invoice number>"),
                _ => Command::Unknown,
            };
        }

        match extract_url(text) {
            Some(url) => Command::Submit(url.to_string()),
            None => Command::Unknown,
        }
    }
}

/// First `http(s)://` link in `text`
pub fn extract_url(text: &str) -> Option<&str> {
    text.split_whitespace()
        .find(|word| {
            let lower = word.to_ascii_lowercase();
            (lower.starts_with("https://") && word.len() > "https://".len())
                || (lower.starts_with("http://") && word.len() > "http://".len())
        })
}
