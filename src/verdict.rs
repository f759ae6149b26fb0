use lazy_static::lazy_static;
use regex::bytes::Regex;
use std::fmt;

lazy_static! {
    // Byte mode so an invalid UTF-8 byte in the value still matches.
    static ref ACTION_LINE: Regex = Regex::new(r"(?m-u)^Action: (.*)$").unwrap();
}

/// The rspamd action for one message, e.g. `reject` or `no action`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Verdict(String);

impl Verdict {
    pub fn new(label: impl Into<String>) -> Self {
        Verdict(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Finds the first `Action: <value>` line anywhere in rspamc output.
pub fn parse_verdict(output: &[u8]) -> Option<Verdict> {
    let caps = ACTION_LINE.captures(output)?;
    let value = String::from_utf8_lossy(&caps[1]);
    Some(Verdict::new(value.trim()))
}
