//! Built-in behavior presets.
//!
//! A profile seeds a fresh context with a handful of instincts so the
//! assistant does not start from zero.

use instinct_core::{Domain, NewInstinct, Source};

#[derive(Debug, Clone, Copy)]
pub struct ProfilePreset {
    pub domain: Domain,
    pub trigger: &'static str,
    pub action: &'static str,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub id: &'static str,
    pub description: &'static str,
    pub presets: &'static [ProfilePreset],
}

impl Profile {
    pub fn instincts(&self) -> Vec<NewInstinct> {
        self.presets
            .iter()
            .map(|p| NewInstinct::new(p.domain, p.trigger, p.action, Source::ProfilePreset, p.confidence))
            .collect()
    }
}

const fn preset(domain: Domain, trigger: &'static str, action: &'static str, confidence: f32) -> ProfilePreset {
    ProfilePreset { domain, trigger, action, confidence }
}

pub const PROFILES: &[Profile] = &[
    Profile {
        id: "analyst",
        description: "Data-heavy work: tables, sources and explicit assumptions",
        presets: &[
            preset(Domain::Format, "user works with data", "present numeric results in a table", 0.8),
            preset(Domain::Verification, "user relies on figures", "state data sources and assumptions", 0.75),
            preset(Domain::Communication, "user prefers precision", "be precise and quantify claims where possible", 0.7),
            preset(Domain::ToolSelection, "re:\\b(csv|sql|query|dataset)\\b", "prefer querying the data over estimating", 0.7),
        ],
    },
    Profile {
        id: "developer",
        description: "Software work: code first, minimal prose",
        presets: &[
            preset(Domain::Format, "user works with code", "show code in fenced blocks with the language tag", 0.85),
            preset(Domain::Communication, "user prefers concise responses", "be concise and lead with the code", 0.75),
            preset(Domain::Verification, "re:\\b(fix|bug|test|refactor)\\b", "suggest a test that covers the change", 0.7),
            preset(Domain::Expertise, "user is a developer", "assume developer-level knowledge; skip basics", 0.75),
        ],
    },
    Profile {
        id: "executive",
        description: "Decision support: bottom line first, brief",
        presets: &[
            preset(Domain::Communication, "user prefers brief responses", "be brief and lead with the bottom line", 0.85),
            preset(Domain::Format, "user skims", "use short bullet points", 0.75),
            preset(Domain::Timing, "user is time constrained", "flag anything urgent at the top", 0.7),
            preset(Domain::Workflow, "user delegates", "end with a clear recommended next action", 0.7),
        ],
    },
    Profile {
        id: "learner",
        description: "Teaching mode: step by step with examples",
        presets: &[
            preset(Domain::LearningStyle, "user is learning", "explain step by step and check understanding", 0.8),
            preset(Domain::LearningStyle, "user learns from examples", "explain with a concrete example first", 0.75),
            preset(Domain::Communication, "user prefers detailed responses", "provide thorough explanations with reasoning", 0.7),
            preset(Domain::Expertise, "user is new to the topic", "define jargon the first time it appears", 0.7),
        ],
    },
];

pub fn find(profile_id: &str) -> Option<&'static Profile> {
    let wanted = profile_id.trim().to_lowercase();
    PROFILES.iter().find(|p| p.id == wanted)
}

pub fn ids() -> Vec<&'static str> {
    PROFILES.iter().map(|p| p.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_validate() {
        for profile in PROFILES {
            assert!(!profile.presets.is_empty());
            for spec in profile.instincts() {
                spec.validate().unwrap();
                assert_eq!(spec.source, Source::ProfilePreset);
            }
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(find("Developer").unwrap().id, "developer");
        assert!(find("astronaut").is_none());
        assert_eq!(ids(), vec!["analyst", "developer", "executive", "learner"]);
    }
}
