//! Rule matching.
//!
//! No I/O and no shared state. URL comparison is case-insensitive for every
//! match mode and regex patterns are unanchored.

use crate::models::{MatchMode, Rule, RuleSet};
use regex::{Regex, RegexBuilder};

/// Compiled regexes are capped so a pathological pattern cannot blow up memory.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Return the first enabled rule matching `url`, in insertion order.
///
/// The global switch short-circuits everything.
pub fn find_matching_rule<'a>(url: &str, rule_set: &'a RuleSet) -> Option<&'a Rule> {
    first_match(url, rule_set, |_, rule, candidate| {
        compile_regex(&rule.pattern).is_some_and(|re| re.is_match(candidate))
    })
}

fn first_match<'a, F>(url: &str, rule_set: &'a RuleSet, regex_matches: F) -> Option<&'a Rule>
where
    F: Fn(usize, &Rule, &str) -> bool,
{
    if !rule_set.global_enabled {
        return None;
    }
    let candidate = url.to_lowercase();
    rule_set
        .rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| rule.enabled)
        .find(|(index, rule)| match rule.match_mode {
            MatchMode::Exact => candidate == rule.pattern.to_lowercase(),
            MatchMode::Contains => candidate.contains(&rule.pattern.to_lowercase()),
            MatchMode::Regex => regex_matches(*index, *rule, &candidate),
        })
        .map(|(_, rule)| rule)
}

fn compile_regex(pattern: &str) -> Option<Regex> {
    match RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
    {
        Ok(re) => Some(re),
        Err(err) => {
            tracing::trace!("Skipping rule with invalid regex {:?}: {}", pattern, err);
            None
        }
    }
}

/// A rule set with its regex patterns compiled once, aligned by rule index.
#[derive(Debug, Clone, Default)]
pub struct CompiledRuleSet {
    rule_set: RuleSet,
    regexes: Vec<Option<Regex>>,
}

impl CompiledRuleSet {
    pub fn compile(rule_set: RuleSet) -> Self {
        let regexes = rule_set
            .rules
            .iter()
            .map(|rule| match rule.match_mode {
                MatchMode::Regex => compile_regex(&rule.pattern),
                MatchMode::Exact | MatchMode::Contains => None,
            })
            .collect();
        Self { rule_set, regexes }
    }

    pub fn rule_set(&self) -> &RuleSet {
        &self.rule_set
    }

    /// Same result as [`find_matching_rule`] without recompiling patterns.
    pub fn find(&self, url: &str) -> Option<&Rule> {
        first_match(url, &self.rule_set, |index, _, candidate| {
            self.regexes
                .get(index)
                .and_then(Option::as_ref)
                .is_some_and(|re| re.is_match(candidate))
        })
    }

    /// Number of regex rules that compiled.
    pub fn compiled_regexes(&self) -> usize {
        self.regexes.iter().flatten().count()
    }
}

/// Whether `pattern` would be usable with `MatchMode::Regex`.
pub fn is_valid_pattern(pattern: &str) -> bool {
    RegexBuilder::new(pattern)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .is_ok()
}
