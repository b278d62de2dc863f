//! Include/exclude rule evaluation.
//!
//! Rules come from the `[include]` and `[exclude]` config tables. Each key is
//! `<scope>.<value>` (or `<scope>.!<value>` to negate the equality test) and
//! each value is a regular expression searched for in the incident summary.
//!
//! An incident is kept when the include set is empty or one of its rules
//! matches, and no exclude rule matches.

use std::fmt;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::model::Incident;

/// Incident attribute a rule is tested against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Service display name
    Service,
    /// Any of the team display names
    Team,
    /// Anything else; such rules never match
    Unsupported(String),
}

impl Scope {
    fn parse(raw: &str) -> Self {
        match raw {
            "service" => Self::Service,
            "team" => Self::Team,
            other => Self::Unsupported(other.to_string()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service => f.write_str("service"),
            Self::Team => f.write_str("team"),
            Self::Unsupported(raw) => f.write_str(raw),
        }
    }
}

/// A single include or exclude predicate.
#[derive(Debug, Clone)]
pub struct FilterRule {
    pub scope: Scope,
    pub value: String,
    pub negate: bool,
    /// `None` when the configured expression failed to compile.
    pub pattern: Option<Regex>,
}

impl FilterRule {
    /// Build a rule from a config key and regex source.
    ///
    /// Compilation failures are logged and yield a rule that never matches.
    pub fn parse(set: &str, key: &str, expression: &str) -> Self {
        let (scope, value) = match key.split_once('.') {
            Some((scope, value)) => (Scope::parse(scope), value),
            None => {
                warn!(set, key, "Filter key has no '<scope>.<value>' form, rule ignored");
                (Scope::Unsupported(key.to_string()), "")
            }
        };

        let (negate, value) = match value.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, value),
        };

        let pattern = match Regex::new(expression) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(
                    set,
                    key,
                    expression,
                    error = %e,
                    "Error compiling filter expression, rule will never match"
                );
                None
            }
        };

        Self {
            scope,
            value: value.to_string(),
            negate,
            pattern,
        }
    }

    /// Equality test against one name, honouring `negate`.
    fn name_matches(&self, name: &str) -> bool {
        (name == self.value) != self.negate
    }

    /// Whether this rule matches the incident.
    pub fn matches(&self, incident: &Incident) -> bool {
        let Some(pattern) = &self.pattern else {
            return false;
        };

        let scope_matches = match &self.scope {
            Scope::Service => self.name_matches(&incident.service.name),
            Scope::Team => incident.teams.iter().any(|t| self.name_matches(&t.name)),
            Scope::Unsupported(raw) => {
                warn!(scope = %raw, "Filter scope not supported, rule ignored");
                return false;
            }
        };

        scope_matches && pattern.is_match(&incident.summary)
    }
}

/// Ordered collection of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    name: &'static str,
    rules: Vec<FilterRule>,
}

impl RuleSet {
    /// Build a rule set from `(key, expression)` pairs in configured order.
    pub fn from_entries<'a, I>(name: &'static str, entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let rules: Vec<_> = entries
            .into_iter()
            .map(|(key, expression)| FilterRule::parse(name, key, expression))
            .collect();

        info!(set = name, count = rules.len(), "Loaded filter rules");

        Self { name, rules }
    }

    /// Create an empty set.
    #[must_use]
    pub const fn empty(name: &'static str) -> Self {
        Self {
            name,
            rules: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> impl Iterator<Item = &FilterRule> {
        self.rules.iter()
    }

    /// First rule, in configured order, that matches the incident.
    pub fn first_match(&self, incident: &Incident) -> Option<&FilterRule> {
        self.rules.iter().find(|rule| rule.matches(incident))
    }
}

/// Include and exclude sets evaluated together.
#[derive(Debug, Clone)]
pub struct Filters {
    pub include: RuleSet,
    pub exclude: RuleSet,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            include: RuleSet::empty("include"),
            exclude: RuleSet::empty("exclude"),
        }
    }
}

impl Filters {
    #[must_use]
    pub const fn new(include: RuleSet, exclude: RuleSet) -> Self {
        Self { include, exclude }
    }

    /// Decide whether an incident should be notified.
    pub fn keep(&self, incident: &Incident) -> bool {
        keep(incident, &self.include, &self.exclude)
    }
}

/// `(include empty OR some include rule matches) AND no exclude rule matches`.
pub fn keep(incident: &Incident, include: &RuleSet, exclude: &RuleSet) -> bool {
    let included = if include.is_empty() {
        true
    } else if let Some(rule) = include.first_match(incident) {
        debug!(
            set = include.name,
            scope = %rule.scope,
            value = %rule.value,
            negate = rule.negate,
            summary = %incident.summary,
            "Included"
        );
        true
    } else {
        false
    };

    if !included {
        debug!(incident = %incident.id, summary = %incident.summary, "No include rule matched");
        return false;
    }

    if let Some(rule) = exclude.first_match(incident) {
        info!(
            set = exclude.name,
            scope = %rule.scope,
            value = %rule.value,
            negate = rule.negate,
            summary = %incident.summary,
            "Excluded"
        );
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Reference;
    use chrono::Utc;

    fn incident(service: &str, teams: &[&str], summary: &str) -> Incident {
        teams.iter().enumerate().fold(
            Incident::new("P1", summary, Utc::now(), Reference::new("S1", service)),
            |incident, (i, team)| incident.with_team(Reference::new(format!("T{i}"), *team)),
        )
    }

    fn set(name: &'static str, entries: &[(&str, &str)]) -> RuleSet {
        RuleSet::from_entries(name, entries.iter().copied())
    }

    #[test]
    fn test_parse_negated_key() {
        let rule = FilterRule::parse("include", "team.!OnCall", ".*");
        assert_eq!(rule.scope, Scope::Team);
        assert_eq!(rule.value, "OnCall");
        assert!(rule.negate);
    }

    #[test]
    fn test_parse_keeps_dots_in_value() {
        let rule = FilterRule::parse("include", "service.api.example.com", ".*");
        assert_eq!(rule.scope, Scope::Service);
        assert_eq!(rule.value, "api.example.com");
    }

    #[test]
    fn test_no_rules_keeps_everything() {
        let filters = Filters::default();
        assert!(filters.keep(&incident("Anything", &[], "whatever")));
        assert!(filters.keep(&incident("", &[], "")));
    }

    #[test]
    fn test_include_requires_value_and_pattern() {
        let include = set("include", &[("service.PaymentsAPI", "disk")]);
        let exclude = RuleSet::empty("exclude");

        assert!(keep(&incident("PaymentsAPI", &[], "disk full"), &include, &exclude));
        assert!(!keep(&incident("PaymentsAPI", &[], "cpu high"), &include, &exclude));
        assert!(!keep(&incident("Billing", &[], "disk full"), &include, &exclude));
    }

    #[test]
    fn test_negated_service_rule() {
        let include = set("include", &[("service.!Sandbox", ".*")]);
        let exclude = RuleSet::empty("exclude");

        assert!(keep(&incident("PaymentsAPI", &[], "x"), &include, &exclude));
        assert!(!keep(&incident("Sandbox", &[], "x"), &include, &exclude));
    }

    #[test]
    fn test_team_rule_matches_any_team() {
        let include = set("include", &[("team.Platform", ".*")]);
        let exclude = RuleSet::empty("exclude");

        assert!(keep(
            &incident("svc", &["Data", "Platform"], "x"),
            &include,
            &exclude
        ));
        assert!(!keep(&incident("svc", &["Data"], "x"), &include, &exclude));
        assert!(!keep(&incident("svc", &[], "x"), &include, &exclude));
    }

    #[test]
    fn test_negated_team_rule_needs_one_other_team() {
        let include = set("include", &[("team.!Platform", ".*")]);
        let exclude = RuleSet::empty("exclude");

        assert!(!keep(&incident("svc", &["Platform"], "x"), &include, &exclude));
        assert!(keep(
            &incident("svc", &["Platform", "Data"], "x"),
            &include,
            &exclude
        ));
    }

    #[test]
    fn test_empty_include_depends_only_on_excludes() {
        let include = RuleSet::empty("include");
        let exclude = set("exclude", &[("service.Noisy", ".*")]);

        assert!(keep(&incident("Quiet", &[], "x"), &include, &exclude));
        assert!(!keep(&incident("Noisy", &[], "x"), &include, &exclude));
    }

    #[test]
    fn test_exclude_wins_after_include_matched() {
        let include = set("include", &[("service.PaymentsAPI", ".*")]);
        let exclude = set("exclude", &[("team.OnCall", ".*timeout.*")]);

        let dropped = incident("PaymentsAPI", &["OnCall"], "[#42] timeout connecting to db");
        assert!(!keep(&dropped, &include, &exclude));

        let kept = incident("PaymentsAPI", &["OnCall"], "[#7] disk full");
        assert!(keep(&kept, &include, &exclude));
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let rule = FilterRule::parse("include", "service.PaymentsAPI", "([unclosed");
        assert!(rule.pattern.is_none());
        assert!(!rule.matches(&incident("PaymentsAPI", &[], "anything")));

        // A broken include rule still counts as a configured include.
        let include = set("include", &[("service.PaymentsAPI", "([unclosed")]);
        assert!(!keep(
            &incident("PaymentsAPI", &[], "anything"),
            &include,
            &RuleSet::empty("exclude")
        ));
    }

    #[test]
    fn test_unsupported_scope_never_matches() {
        let include = set("include", &[("priority.P1", ".*"), ("service.Billing", ".*")]);
        let exclude = set("exclude", &[("user.alice", ".*")]);

        assert!(!keep(&incident("Other", &[], "x"), &include, &exclude));
        assert!(keep(&incident("Billing", &[], "x"), &include, &exclude));
    }

    #[test]
    fn test_key_without_scope_is_unsupported() {
        let rule = FilterRule::parse("exclude", "PaymentsAPI", ".*");
        assert_eq!(rule.scope, Scope::Unsupported("PaymentsAPI".to_string()));
        assert!(!rule.matches(&incident("PaymentsAPI", &[], "x")));
    }

    #[test]
    fn test_rules_keep_configured_order() {
        let include = set(
            "include",
            &[("service.A", "one"), ("service.A", "o"), ("service.A", ".*")],
        );
        let hit = include.first_match(&incident("A", &[], "two")).unwrap();
        assert_eq!(hit.pattern.as_ref().unwrap().as_str(), "o");
    }
}
