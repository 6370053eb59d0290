//! Standalone predicate factory for hypervisor-identifier include/exclude
//! filtering (§4.4). Patterns are never escaped -- the author of the config
//! controls metacharacters, matching the legacy tool's behaviour.

use regex::RegexBuilder;

/// How patterns in `filter_hosts`/`exclude_hosts` are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    /// Shell-style wildcards (`*`, `?`, `[...]`), matched case-insensitively.
    Wildcards,
    /// Regular expressions, anchored `^...$`, matched case-insensitively.
    Regex,
    /// Try wildcard matching first; if no pattern matches that way, retry
    /// every pattern as a regex. This is the default when `filter_type` is
    /// unset in the configuration.
    #[default]
    Auto,
}

/// A compiled include/exclude filter over hypervisor (or ESX parent
/// container) identifiers.
pub struct Filter {
    include: Vec<String>,
    exclude: Vec<String>,
    filter_type: FilterType,
}

impl Filter {
    /// `include`/`exclude` being empty means "unset" for that list. An empty
    /// include list means "include everything" (§4.4).
    pub fn new(include: Vec<String>, exclude: Vec<String>, filter_type: FilterType) -> Self {
        Self {
            include,
            exclude,
            filter_type,
        }
    }

    pub fn everything() -> Self {
        Self::new(Vec::new(), Vec::new(), FilterType::Auto)
    }

    /// Exclude takes precedence over include (§4.4, §8 invariant).
    pub fn matches(&self, id: &str) -> bool {
        if matches_any(&self.exclude, id, self.filter_type) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        matches_any(&self.include, id, self.filter_type)
    }
}

fn matches_any(patterns: &[String], id: &str, filter_type: FilterType) -> bool {
    match filter_type {
        FilterType::Wildcards => patterns.iter().any(|p| wildcard_match(p, id)),
        FilterType::Regex => patterns.iter().any(|p| regex_match(p, id)),
        FilterType::Auto => {
            patterns.iter().any(|p| wildcard_match(p, id)) || patterns.iter().any(|p| regex_match(p, id))
        }
    }
}

/// Shell-glob match (`*`, `?`, `[set]`), case-insensitive, anchored to the
/// whole string.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let translated = glob_to_regex(pattern);
    regex_match(&translated, text)
}

/// Anchored, case-insensitive regex match. A pattern that isn't already
/// anchored is wrapped in `^(?:...)$`.
fn regex_match(pattern: &str, text: &str) -> bool {
    let anchored = anchor(pattern);
    match RegexBuilder::new(&anchored).case_insensitive(true).build() {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

fn anchor(pattern: &str) -> String {
    let has_start = pattern.starts_with('^');
    let has_end = pattern.ends_with('$') && !pattern.ends_with("\\$");
    match (has_start, has_end) {
        (true, true) => pattern.to_string(),
        (true, false) => format!("{pattern}$"),
        (false, true) => format!("^{pattern}"),
        (false, false) => format!("^(?:{pattern})$"),
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                if let Some(&next) = chars.peek() {
                    if next == '!' {
                        out.push('^');
                        chars.next();
                    }
                }
                for c2 in chars.by_ref() {
                    out.push(c2);
                    if c2 == ']' {
                        break;
                    }
                }
            }
            '.' | '+' | '(' | ')' | '|' | '^' | '$' | '\\' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_include_means_include_everything() {
        let filter = Filter::new(vec![], vec![], FilterType::Wildcards);
        assert!(filter.matches("anything"));
    }

    #[test]
    fn exclude_beats_include() {
        let filter = Filter::new(
            vec!["*".to_string()],
            vec!["00000".to_string()],
            FilterType::Wildcards,
        );
        assert!(!filter.matches("00000"));
        assert!(filter.matches("12345"));
    }

    #[test]
    fn wildcard_matching_is_case_insensitive() {
        let filter = Filter::new(vec!["ESX-*".to_string()], vec![], FilterType::Wildcards);
        assert!(filter.matches("esx-01"));
    }

    #[test]
    fn regex_patterns_are_anchored() {
        let filter = Filter::new(vec!["esx-[0-9]+".to_string()], vec![], FilterType::Regex);
        assert!(filter.matches("esx-42"));
        assert!(!filter.matches("not-esx-42-either"));
    }

    #[test]
    fn auto_mode_falls_back_to_regex_when_wildcard_does_not_match() {
        let filter = Filter::new(vec!["esx-[0-9]+".to_string()], vec![], FilterType::Auto);
        assert!(filter.matches("esx-42"));
    }
}
