//! Per-engine compiled-regex cache, scoped to the engine instance rather
//! than shared process-wide, so two engines never leak compiled regex
//! objects across each other's failure modes.

use crate::error::RuntimeErrorKind;
use regex_lite::Regex;
use std::collections::HashMap;

#[derive(Default)]
pub struct RegexCache {
    compiled: HashMap<(String, String), Regex>,
}

impl RegexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, pattern: &str, flags: &str) -> Result<&Regex, RuntimeErrorKind> {
        let key = (pattern.to_string(), flags.to_string());
        if !self.compiled.contains_key(&key) {
            let wired = wire_flags(pattern, flags);
            let re = Regex::new(&wired)
                .map_err(|e| RuntimeErrorKind::TypeMismatch(format!("invalid regular expression: {e}")))?;
            self.compiled.insert(key.clone(), re);
        }
        Ok(self.compiled.get(&key).expect("just inserted"))
    }
}

/// `regex-lite` takes inline `(?flags)` groups rather than a side-channel
/// flag string, so fold the literal's trailing flags into that form.
fn wire_flags(pattern: &str, flags: &str) -> String {
    if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{flags}){pattern}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_compiled_pattern() {
        let mut cache = RegexCache::new();
        assert!(cache.get("a+", "").is_ok());
        assert!(cache.get("a+", "").is_ok());
        assert_eq!(cache.compiled.len(), 1);
    }

    #[test]
    fn case_insensitive_flag() {
        let mut cache = RegexCache::new();
        let re = cache.get("abc", "i").unwrap();
        assert!(re.is_match("ABC"));
    }
}
