use serde::Serialize;
use std::fmt;

/// One complete unit of streamed text, without its trailing delimiter.
///
/// No structure is imposed on the contents; an SSE block such as
/// `"event: delta\ndata: {..}"` arrives verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Event(String);

impl Event {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Event {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl From<String> for Event {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl AsRef<str> for Event {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Event {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Event {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_as_plain_string() {
        let event = Event::from("data: {\"x\":1}");
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#""data: {\"x\":1}""#);
    }

    #[test]
    fn test_event_compares_with_str() {
        let event = Event::new("hello");
        assert_eq!(event, "hello");
        assert_eq!(event.len(), 5);
        assert!(!event.is_empty());
        assert_eq!(event.to_string(), "hello");
        assert_eq!(event.into_string(), "hello");
    }
}
