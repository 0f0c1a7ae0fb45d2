//! Explicit client context threaded through every component.

use parlor_protocol::SessionId;

/// Values resolved once at startup and shared by all components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    /// Session scoping every backend request.
    pub session_id: SessionId,
    /// Backend base URL without a trailing slash; may be empty.
    pub base_url: String,
    /// Whether a capture device was detected at startup.
    pub audio_supported: bool,
}

impl ClientContext {
    pub fn new(
        session_id: impl Into<SessionId>,
        base_url: impl Into<String>,
        audio_supported: bool,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            session_id: session_id.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            audio_supported,
        }
    }

    /// Resolve a server-provided resource path against the base URL.
    ///
    /// Absolute URLs and an empty base leave the input unchanged.
    pub fn resolve_url(&self, path: &str) -> String {
        if self.base_url.is_empty() || path.starts_with("http://") || path.starts_with("https://")
        {
            return path.to_string();
        }
        format!("{}{}", self.base_url, path)
    }

    /// First characters of the session id for compact display.
    pub fn short_session_id(&self, len: usize) -> &str {
        match self.session_id.char_indices().nth(len) {
            Some((idx, _)) => &self.session_id[..idx],
            None => &self.session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ClientContext;
    use pretty_assertions::assert_eq;

    #[test]
    fn resolves_relative_audio_url_against_base() {
        let ctx = ClientContext::new("s", "https://api.example/", true);
        assert_eq!(
            ctx.resolve_url("/chat/audio/1.mp3"),
            "https://api.example/chat/audio/1.mp3"
        );
    }

    #[test]
    fn empty_base_keeps_url() {
        let ctx = ClientContext::new("s", "", true);
        assert_eq!(ctx.resolve_url("/chat/audio/1.mp3"), "/chat/audio/1.mp3");
    }

    #[test]
    fn absolute_url_is_untouched() {
        let ctx = ClientContext::new("s", "https://api.example", true);
        assert_eq!(
            ctx.resolve_url("https://cdn.example/a.mp3"),
            "https://cdn.example/a.mp3"
        );
    }

    #[test]
    fn short_session_id_truncates() {
        let ctx = ClientContext::new("session_1700000000000_abc", "", false);
        assert_eq!(ctx.short_session_id(12), "session_1700");
        assert_eq!(ctx.short_session_id(100), "session_1700000000000_abc");
    }
}
