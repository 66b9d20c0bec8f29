//! Interception rules and the rule set held by the background context.

use serde::{Deserialize, Serialize};

/// Module name used when a rule is created without one.
pub const DEFAULT_MODULE: &str = "default";

/// How a rule pattern is compared against a request URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MatchMode {
    Exact,
    #[default]
    Contains,
    Regex,
}

impl MatchMode {
    /// Convert from string (lossy, defaults to Contains)
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "exact" => MatchMode::Exact,
            "regex" | "regexp" => MatchMode::Regex,
            _ => MatchMode::Contains,
        }
    }
}

/// What happens to a request once a rule matches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RuleAction {
    /// Send the request to `redirect_target` instead.
    Redirect,
    /// Answer locally from the rule's active mock record.
    #[default]
    SynthesizeResponse,
}

/// A single monitored endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    /// User-facing grouping only; never consulted while matching.
    #[serde(default = "default_module")]
    pub module: String,
    pub pattern: String,
    #[serde(default)]
    pub match_mode: MatchMode,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_target: Option<String>,
    #[serde(default)]
    pub delay_ms: u32,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_mock_record_id: Option<String>,
}

fn default_module() -> String {
    DEFAULT_MODULE.to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_status_code() -> u16 {
    200
}

impl Rule {
    /// Create an enabled rule with a fresh id.
    pub fn new(pattern: impl Into<String>, match_mode: MatchMode, action: RuleAction) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            module: default_module(),
            pattern: pattern.into(),
            match_mode,
            enabled: true,
            action,
            redirect_target: None,
            delay_ms: 0,
            status_code: default_status_code(),
            active_mock_record_id: None,
        }
    }

    pub fn redirect(pattern: impl Into<String>, match_mode: MatchMode, target: &str) -> Self {
        let mut rule = Self::new(pattern, match_mode, RuleAction::Redirect);
        rule.redirect_target = Some(target.to_string());
        rule
    }

    pub fn mock(pattern: impl Into<String>, match_mode: MatchMode, record_id: &str) -> Self {
        let mut rule = Self::new(pattern, match_mode, RuleAction::SynthesizeResponse);
        rule.active_mock_record_id = Some(record_id.to_string());
        rule
    }
}

/// The complete rule configuration: global switch plus rules in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub global_enabled: bool,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            global_enabled: true,
            rules: Vec::new(),
        }
    }
}

impl RuleSet {
    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    pub fn rule_mut(&mut self, id: &str) -> Option<&mut Rule> {
        self.rules.iter_mut().find(|rule| rule.id == id)
    }

    /// Replace the rule with the same id in place, or append it.
    ///
    /// Replacing keeps the original position so the insertion-order tie-break
    /// is not disturbed by edits.
    pub fn upsert(&mut self, rule: Rule) {
        match self.rule_mut(&rule.id) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|rule| rule.id != id);
        before != self.rules.len()
    }

    /// Distinct module names in first-seen order.
    pub fn modules(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for rule in &self.rules {
            if !names.iter().any(|name| name == &rule.module) {
                names.push(rule.module.clone());
            }
        }
        names
    }

    pub fn rules_in_module<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules.iter().filter(move |rule| rule.module == module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keeps_position_of_existing_rule() {
        let mut set = RuleSet::default();
        let first = Rule::new("/a", MatchMode::Contains, RuleAction::SynthesizeResponse);
        let second = Rule::new("/b", MatchMode::Contains, RuleAction::SynthesizeResponse);
        set.upsert(first.clone());
        set.upsert(second.clone());

        let mut edited = first.clone();
        edited.pattern = "/a/edited".into();
        set.upsert(edited);

        assert_eq!(set.rules.len(), 2);
        assert_eq!(set.rules[0].pattern, "/a/edited");
        assert_eq!(set.rules[1].id, second.id);
    }

    #[test]
    fn deserializes_sparse_rule_with_defaults() {
        let rule: Rule = serde_json::from_str(r#"{"id":"r1","pattern":"/api"}"#).unwrap();
        assert_eq!(rule.module, DEFAULT_MODULE);
        assert_eq!(rule.match_mode, MatchMode::Contains);
        assert_eq!(rule.action, RuleAction::SynthesizeResponse);
        assert!(rule.enabled);
        assert_eq!(rule.status_code, 200);
    }

    #[test]
    fn modules_are_listed_once_in_first_seen_order() {
        let mut set = RuleSet::default();
        for (module, pattern) in [("users", "/u"), ("orders", "/o"), ("users", "/u2")] {
            let mut rule = Rule::new(pattern, MatchMode::Contains, RuleAction::Redirect);
            rule.module = module.into();
            set.upsert(rule);
        }
        assert_eq!(set.modules(), vec!["users".to_string(), "orders".to_string()]);
        assert_eq!(set.rules_in_module("users").count(), 2);
    }

    #[test]
    fn match_mode_parses_loosely() {
        assert_eq!(MatchMode::from_str_lossy("EXACT"), MatchMode::Exact);
        assert_eq!(MatchMode::from_str_lossy("regexp"), MatchMode::Regex);
        assert_eq!(MatchMode::from_str_lossy("whatever"), MatchMode::Contains);
    }
}
