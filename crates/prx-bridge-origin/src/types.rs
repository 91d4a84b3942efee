/// Where a call goes and on whose behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginTarget {
    pub base_url: String,
    pub user_id: String,
    pub client_profile: String,
}

impl OriginTarget {
    pub fn new(
        base_url: impl Into<String>,
        user_id: impl Into<String>,
        client_profile: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            user_id: user_id.into(),
            client_profile: client_profile.into(),
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone)]
pub struct OriginRequest {
    pub url: String,
    pub body: String,
    pub user_id: String,
    pub client_profile: String,
}

#[derive(Debug, Clone)]
pub struct OriginReply {
    pub status: u16,
    pub body: String,
}

impl OriginReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let target = OriginTarget::new("https://origin.example/", "u", "chatgpt");
        assert_eq!(target.endpoint("/mcp"), "https://origin.example/mcp");
        assert_eq!(target.endpoint("mcp"), "https://origin.example/mcp");
    }

    #[test]
    fn reply_success_covers_2xx_only() {
        let ok = OriginReply { status: 204, body: String::new() };
        let redirect = OriginReply { status: 302, body: String::new() };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
    }
}
