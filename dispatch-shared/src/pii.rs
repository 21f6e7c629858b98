use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for sensitive values (phone numbers, device tokens) that keeps them
/// out of log lines. Only the last four characters survive `Display`.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct Masked<T>(pub T);

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self.0.to_string();
        let chars: Vec<char> = raw.chars().collect();
        if chars.len() <= 4 {
            return write!(f, "****");
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        write!(f, "****{}", tail)
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // API responses need the real value; masking only applies to formatting.
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }

    pub fn inner(&self) -> &T {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keeps_tail_only() {
        let phone = Masked("+33 6 12 34 56 78".to_string());
        assert_eq!(phone.to_string(), "****6 78");
        assert_eq!(format!("{:?}", phone), "********");
    }

    #[test]
    fn test_short_values_fully_hidden() {
        assert_eq!(Masked("abc").to_string(), "****");
    }

    #[test]
    fn test_serialize_passes_through() {
        let token = Masked("fcm-token-123".to_string());
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"fcm-token-123\"");
    }
}
