use std::fmt;

/// Category of calling assistant client, taken from the request route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientProfile {
    ChatGpt,
    Other(String),
}

impl ClientProfile {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.eq_ignore_ascii_case("chatgpt") {
            Some(Self::ChatGpt)
        } else {
            Some(Self::Other(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ChatGpt => "chatgpt",
            Self::Other(name) => name,
        }
    }

    /// Only ChatGPT speaks the `search`/`fetch` tool vocabulary.
    pub fn translates_tools(&self) -> bool {
        matches!(self, Self::ChatGpt)
    }
}

impl fmt::Display for ClientProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
