use std::fmt;

/// Environment variable the API key is read from.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const MIN_KEY_LEN: usize = 10;

/// An API key that passed the local sanity check. Validity is never
/// confirmed against the endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        let key = raw?.trim();
        if key.is_empty() || key == "undefined" || key.len() < MIN_KEY_LEN {
            return None;
        }
        Some(Self(key.to_string()))
    }

    pub fn from_env() -> Option<Self> {
        Self::parse(std::env::var(API_KEY_ENV).ok().as_deref())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tail: String = self.0.chars().skip(self.0.chars().count().saturating_sub(4)).collect();
        write!(f, "ApiKey(***{})", tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_missing_and_placeholder_keys() {
        assert!(ApiKey::parse(None).is_none());
        assert!(ApiKey::parse(Some("")).is_none());
        assert!(ApiKey::parse(Some("   ")).is_none());
        assert!(ApiKey::parse(Some("undefined")).is_none());
        assert!(ApiKey::parse(Some("short")).is_none());
    }

    #[test]
    fn test_accepts_trimmed_key() {
        let key = ApiKey::parse(Some("  AIzaSyExample123  ")).unwrap();
        assert_eq!(key.expose(), "AIzaSyExample123");
    }

    #[test]
    fn test_debug_hides_key() {
        let key = ApiKey::parse(Some("AIzaSyExample123")).unwrap();
        let shown = format!("{:?}", key);
        assert!(!shown.contains("AIzaSy"));
        assert!(shown.ends_with("e123)"));
    }
}
