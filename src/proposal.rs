//! Structured action proposals — the closed set of UI actions the LLM may
//! request, parsed at the boundary.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// The enumerated action kinds. Anything outside this set is rejected at
/// parse time rather than passed deeper into the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Type,
    Scroll,
    Wait,
    Submit,
    Done,
}

/// One structured action suggestion, produced by the proposer and consumed
/// exactly once by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionProposal {
    #[serde(rename = "action")]
    pub kind: ActionKind,

    /// CSS selector or visible text identifying the element to act on.
    #[serde(rename = "selector", alias = "target", default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Text to type, pixels to scroll, or the literal "bottom".
    #[serde(default, deserialize_with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(rename = "reasoning", default, skip_serializing_if = "String::is_empty")]
    pub rationale: String,

    /// On `type`: suppress the automatic submit keypress afterwards.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub multi_step: bool,
}

impl ActionProposal {
    /// The degraded do-nothing proposal used after repeated parse failures.
    pub fn wait(rationale: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Wait,
            target: None,
            value: None,
            rationale: rationale.into(),
            multi_step: false,
        }
    }
}

/// LLMs emit scroll distances as bare numbers about as often as strings.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }
    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
    }))
}

/// Parse an LLM response body into a proposal. Strips markdown code fences
/// first; anything that does not deserialize into the closed action set is
/// a [`Error::ProposalParse`].
pub fn parse_proposal(raw: &str) -> Result<ActionProposal> {
    let mut content = raw.trim();
    if let Some(inner) = content.strip_prefix("```") {
        let inner = inner.strip_prefix("json").unwrap_or(inner).trim_start();
        content = match inner.rfind("```") {
            Some(end) => inner[..end].trim(),
            None => inner,
        };
    }
    serde_json::from_str(content).map_err(|e| {
        let excerpt: String = content.chars().take(120).collect();
        Error::ProposalParse(format!("{e} in response: {excerpt}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(proposal: &ActionProposal) -> ActionProposal {
        let wire = serde_json::to_string(proposal).unwrap();
        parse_proposal(&wire).unwrap()
    }

    #[test]
    fn test_parse_click() {
        let p = parse_proposal(
            r#"{"action": "click", "selector": "button#go", "reasoning": "start"}"#,
        )
        .unwrap();
        assert_eq!(p.kind, ActionKind::Click);
        assert_eq!(p.target.as_deref(), Some("button#go"));
        assert_eq!(p.rationale, "start");
    }

    #[test]
    fn test_parse_type_with_value() {
        let p = parse_proposal(
            r#"{"action": "type", "selector": "input[placeholder*='code']", "value": "4821"}"#,
        )
        .unwrap();
        assert_eq!(p.kind, ActionKind::Type);
        assert_eq!(p.value.as_deref(), Some("4821"));
        assert!(!p.multi_step);
    }

    #[test]
    fn test_parse_scroll_numeric_value() {
        let p = parse_proposal(r#"{"action": "scroll", "value": 500}"#).unwrap();
        assert_eq!(p.kind, ActionKind::Scroll);
        assert_eq!(p.value.as_deref(), Some("500"));
    }

    #[test]
    fn test_parse_target_alias() {
        let p = parse_proposal(r#"{"action": "click", "target": "Next"}"#).unwrap();
        assert_eq!(p.target.as_deref(), Some("Next"));
    }

    #[test]
    fn test_parse_markdown_fences() {
        let p = parse_proposal(
            "```json\n{\"action\": \"submit\", \"reasoning\": \"code entered\"}\n```",
        )
        .unwrap();
        assert_eq!(p.kind, ActionKind::Submit);
    }

    #[test]
    fn test_parse_bare_fences() {
        let p = parse_proposal("```\n{\"action\": \"wait\"}\n```").unwrap();
        assert_eq!(p.kind, ActionKind::Wait);
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = parse_proposal(r##"{"action": "teleport", "selector": "#x"}"##).unwrap_err();
        assert!(matches!(err, Error::ProposalParse(_)));
    }

    #[test]
    fn test_non_json_rejected() {
        assert!(parse_proposal("I think you should click the button").is_err());
    }

    #[test]
    fn test_roundtrip_all_kinds() {
        let fixtures = [
            ActionProposal {
                kind: ActionKind::Click,
                target: Some("button:has-text('Reveal')".into()),
                value: None,
                rationale: "reveal the code".into(),
                multi_step: false,
            },
            ActionProposal {
                kind: ActionKind::Type,
                target: Some("#code".into()),
                value: Some("4821".into()),
                rationale: String::new(),
                multi_step: true,
            },
            ActionProposal {
                kind: ActionKind::Scroll,
                target: None,
                value: Some("bottom".into()),
                rationale: "scroll reveal".into(),
                multi_step: false,
            },
            ActionProposal::wait("page still loading"),
            ActionProposal {
                kind: ActionKind::Submit,
                target: None,
                value: None,
                rationale: String::new(),
                multi_step: false,
            },
            ActionProposal {
                kind: ActionKind::Done,
                target: None,
                value: None,
                rationale: "challenge complete".into(),
                multi_step: false,
            },
        ];
        for fixture in &fixtures {
            assert_eq!(&roundtrip(fixture), fixture);
        }
    }
}
