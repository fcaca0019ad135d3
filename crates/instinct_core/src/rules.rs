//! Conflict rule definitions.
//!
//! A rule says that one kind of guidance wins over another when both would be
//! injected at once, e.g. "be brief" beats "explain thoroughly". Rules are data:
//! the defaults below can be extended from configuration.

use crate::types::{Domain, Instinct};
use serde::{Deserialize, Serialize};

/// Matches an instinct by domain (optional) and a case-insensitive action keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPattern {
    #[serde(default)]
    pub domain: Option<Domain>,
    pub keyword: String,
}

impl ActionPattern {
    pub fn new(domain: Option<Domain>, keyword: impl Into<String>) -> Self {
        Self {
            domain,
            keyword: keyword.into().to_lowercase(),
        }
    }

    pub fn in_domain(domain: Domain, keyword: impl Into<String>) -> Self {
        Self::new(Some(domain), keyword)
    }

    pub fn any_domain(keyword: impl Into<String>) -> Self {
        Self::new(None, keyword)
    }

    pub fn matches(&self, instinct: &Instinct) -> bool {
        if let Some(domain) = self.domain {
            if domain != instinct.domain {
                return false;
            }
        }
        !self.keyword.is_empty() && instinct.action.to_lowercase().contains(&self.keyword.to_lowercase())
    }

    /// Whether some action could satisfy both patterns at once.
    pub fn overlaps(&self, other: &ActionPattern) -> bool {
        let domains_compatible = match (self.domain, other.domain) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        let a = self.keyword.to_lowercase();
        let b = other.keyword.to_lowercase();
        domains_compatible && (a.contains(&b) || b.contains(&a))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRule {
    pub name: String,
    pub overrider: ActionPattern,
    pub overridden: Vec<ActionPattern>,
    pub min_overrider_confidence: f32,
}

impl ConflictRule {
    pub fn new(
        name: impl Into<String>,
        overrider: ActionPattern,
        overridden: Vec<ActionPattern>,
        min_overrider_confidence: f32,
    ) -> Self {
        Self {
            name: name.into(),
            overrider,
            overridden,
            min_overrider_confidence,
        }
    }

    pub fn is_overrider(&self, instinct: &Instinct, effective: f32) -> bool {
        effective >= self.min_overrider_confidence && self.overrider.matches(instinct)
    }

    pub fn is_overridden(&self, instinct: &Instinct) -> bool {
        self.overridden.iter().any(|p| p.matches(instinct))
    }
}

/// Priority rules carried over from the assistant's hand-tuned table.
pub fn default_rules() -> Vec<ConflictRule> {
    use Domain::*;
    vec![
        ConflictRule::new(
            "urgency_over_detail",
            ActionPattern::in_domain(Timing, "urgent"),
            vec![
                ActionPattern::in_domain(Communication, "detailed"),
                ActionPattern::in_domain(Communication, "thorough"),
                ActionPattern::in_domain(Communication, "explain"),
                ActionPattern::in_domain(LearningStyle, "explain"),
            ],
            0.6,
        ),
        ConflictRule::new(
            "concise_over_detail",
            ActionPattern::in_domain(Communication, "concise"),
            vec![
                ActionPattern::in_domain(Communication, "detailed"),
                ActionPattern::in_domain(Communication, "elaborate"),
                ActionPattern::in_domain(Communication, "thorough"),
            ],
            0.6,
        ),
        ConflictRule::new(
            "brief_over_detail",
            ActionPattern::in_domain(Communication, "brief"),
            vec![
                ActionPattern::in_domain(Communication, "detailed"),
                ActionPattern::in_domain(Communication, "elaborate"),
                ActionPattern::in_domain(Communication, "thorough"),
            ],
            0.6,
        ),
        ConflictRule::new(
            "frustration_over_routine",
            ActionPattern::in_domain(EmotionalState, "frustrated"),
            vec![
                ActionPattern::in_domain(Workflow, "standard"),
                ActionPattern::in_domain(Communication, "brief"),
            ],
            0.5,
        ),
        ConflictRule::new(
            "confusion_over_brevity",
            ActionPattern::in_domain(EmotionalState, "confused"),
            vec![
                ActionPattern::in_domain(Communication, "brief"),
                ActionPattern::in_domain(Communication, "concise"),
            ],
            0.5,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InstinctStatus, Source};
    use chrono::Utc;
    use uuid::Uuid;

    fn with_action(domain: Domain, action: &str) -> Instinct {
        let now = Utc::now();
        Instinct {
            id: Uuid::new_v4(),
            context_id: "ctx".into(),
            domain,
            trigger: "user prefers".into(),
            action: action.into(),
            source: Source::PreferenceExpressed,
            base_confidence: 0.7,
            occurrence_count: 1,
            success_rate: 0.5,
            last_triggered_at: now,
            created_at: now,
            updated_at: now,
            status: InstinctStatus::Active,
        }
    }

    #[test]
    fn test_pattern_matches_keyword_case_insensitively() {
        let p = ActionPattern::in_domain(Domain::Communication, "Brief");
        assert!(p.matches(&with_action(Domain::Communication, "Be BRIEF and direct")));
        assert!(!p.matches(&with_action(Domain::Format, "be brief")));
        assert!(ActionPattern::any_domain("brief").matches(&with_action(Domain::Format, "be brief")));
    }

    #[test]
    fn test_rule_threshold() {
        let rule = &default_rules()[2];
        let brief = with_action(Domain::Communication, "be brief");
        assert!(rule.is_overrider(&brief, 0.6));
        assert!(!rule.is_overrider(&brief, 0.59));
        assert!(rule.is_overridden(&with_action(Domain::Communication, "explain thoroughly")));
    }

    #[test]
    fn test_overlap_detection() {
        let a = ActionPattern::in_domain(Domain::Communication, "brief");
        let b = ActionPattern::any_domain("be brief");
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&ActionPattern::in_domain(Domain::Format, "brief")));
    }
}
