//! User-Agent string sent with every transfer.
//!
//! Single source so the server identifies itself consistently on all requests.

/// Software name the server identifies as.
const SERVER_NAME: &str = "tick-transfer";

/// Default User-Agent for transfers (identifies the server software and version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{SERVER_NAME}/{version}")
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_identifies_server_and_version() {
        let ua = default_user_agent();
        assert_eq!(
            env!("CARGO_PKG_VERSION"),
            ua.strip_prefix("tick-transfer/")
                .expect("user agent has server prefix"),
            "user agent must carry the crate version"
        );
    }
}
