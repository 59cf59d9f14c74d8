//! Case-insensitive SIP header multimap.
//!
//! Headers accumulate by name preserving order; duplicate names concatenate
//! with `\n` between values (spec.md §4.4).

use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    // Order of first appearance is preserved; lookups are case-insensitive.
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, joining onto any existing value for the same name
    /// (case-insensitively) with a `\n` separator.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            entry.1.push('\n');
            entry.1.push_str(&value);
        } else {
            self.entries.push((name.to_string(), value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl fmt::Display for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            for line in value.split('\n') {
                write!(f, "{name}: {line}\r\n")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut h = HeaderMap::new();
        h.append("Call-ID", "abc123");
        assert_eq!(h.get("call-id"), Some("abc123"));
        assert_eq!(h.get("CALL-ID"), Some("abc123"));
    }

    #[test]
    fn duplicate_names_join_with_newline() {
        let mut h = HeaderMap::new();
        h.append("Via", "one");
        h.append("via", "two");
        assert_eq!(h.get("Via"), Some("one\ntwo"));
    }
}
