//! Per-state instruction lines appended to the guidance digest.

use instinct_core::EmotionalState;

/// Short instruction for the assistant, or `None` when the state needs no steering.
pub fn guidance(state: EmotionalState) -> Option<&'static str> {
    match state {
        EmotionalState::Neutral => None,
        EmotionalState::Engaged => {
            Some("Keep momentum; build on the current thread and suggest a concrete next step.")
        }
        EmotionalState::Confused => {
            Some("Slow down and clarify; use simpler terms and one concrete example.")
        }
        EmotionalState::Frustrated => Some(
            "Be extra supportive and patient; acknowledge the difficulty and offer alternatives.",
        ),
        EmotionalState::Satisfied => Some("Keep the current approach; it is working."),
        EmotionalState::Overwhelmed => {
            Some("Reduce density; focus on one item at a time.")
        }
        EmotionalState::Curious => {
            Some("Offer depth; share related context and invite follow-up questions.")
        }
        EmotionalState::Urgent => Some("Be fast and direct; lead with the answer and skip preamble."),
    }
}

/// Digest line for `state`, prefixed so the prompt assembler can spot it.
pub fn guidance_line(state: EmotionalState) -> Option<String> {
    guidance(state).map(|g| format!("User seems {}: {}", state, g))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frustrated_guidance_is_supportive() {
        let g = guidance(EmotionalState::Frustrated).unwrap();
        assert!(g.contains("supportive"));
        assert!(g.contains("alternatives"));
    }

    #[test]
    fn test_neutral_has_no_line() {
        assert!(guidance(EmotionalState::Neutral).is_none());
        assert!(guidance_line(EmotionalState::Neutral).is_none());
    }

    #[test]
    fn test_every_other_state_has_a_line() {
        for s in EmotionalState::ALL {
            if s != EmotionalState::Neutral {
                let line = guidance_line(s).unwrap();
                assert!(line.starts_with("User seems "));
                assert!(line.len() < 160);
            }
        }
    }
}
