//! Wildcard datastore patterns.
//!
//! Providers describe which datastores are shared and which are host-local
//! with shell-style wildcards (`*` any run, `?` exactly one character).
//! Everything else in a pattern is matched literally.

use regex::Regex;

use crate::error::{ConfigError, ConfigResult};

/// Translate a wildcard into an anchored regular expression.
///
/// `None` or an empty string yields `^$`, which only matches the empty name.
pub fn wildcard_to_regex(wildcard: Option<&str>) -> String {
    let Some(wildcard) = wildcard else {
        return "^$".to_string();
    };

    let mut out = String::with_capacity(wildcard.len() + 4);
    out.push('^');
    let mut literal = String::new();
    for c in wildcard.chars() {
        match c {
            '*' | '?' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str(if c == '*' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    out.push_str(&regex::escape(&literal));
    out.push('$');
    out
}

fn compile(patterns: &[String]) -> ConfigResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&wildcard_to_regex(Some(p))).map_err(|e| ConfigError::InvalidPattern {
                pattern: p.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Compiled shared/local datastore patterns of a provider.
#[derive(Debug, Clone, Default)]
pub struct DatastorePatterns {
    shared: Vec<Regex>,
    local: Vec<Regex>,
}

impl DatastorePatterns {
    pub fn new(shared: &[String], local: &[String]) -> ConfigResult<Self> {
        Ok(Self {
            shared: compile(shared)?,
            local: compile(local)?,
        })
    }

    pub fn is_shared(&self, datastore: &str) -> bool {
        self.shared.iter().any(|re| re.is_match(datastore))
    }

    pub fn is_local(&self, datastore: &str) -> bool {
        self.local.iter().any(|re| re.is_match(datastore))
    }
}
