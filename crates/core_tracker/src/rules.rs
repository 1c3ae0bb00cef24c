use crate::ProcessInfo;
use regex::{Regex, RegexBuilder};

/// Matches applications that should never be observed.
///
/// All given criteria must match. A rule with no criteria matches nothing.
/// Patterns are case-insensitive.
#[derive(Debug, Clone)]
pub struct AppRule {
    app_id: Option<Regex>,
    name: Option<Regex>,
}

impl AppRule {
    /// Compile a rule from optional regex patterns.
    pub fn new(match_app_id: Option<&str>, match_name: Option<&str>) -> Result<Self, regex::Error> {
        let compile = |pattern: &str| RegexBuilder::new(pattern).case_insensitive(true).build();
        Ok(Self {
            app_id: match_app_id.map(compile).transpose()?,
            name: match_name.map(compile).transpose()?,
        })
    }

    /// Check if the rule matches a process.
    pub fn matches(&self, process: &ProcessInfo) -> bool {
        if self.app_id.is_none() && self.name.is_none() {
            return false;
        }
        if let Some(re) = &self.app_id {
            if !re.is_match(&process.app_id) {
                return false;
            }
        }
        if let Some(re) = &self.name {
            if !re.is_match(&process.display_name) {
                return false;
            }
        }
        true
    }
}
