//! Action proposer — asks the LLM for the next UI action, with a vision
//! fallback for challenges the textual snapshot cannot crack.

use crate::detect::ChallengeState;
use crate::llm::Completion;
use crate::proposal::{parse_proposal, ActionProposal};
use crate::snapshot::PageSnapshot;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = r#"You are a browser automation agent solving interactive challenges.

You will receive:
1. The visible text on the page
2. A list of interactive elements (buttons, inputs, etc.)
3. The current challenge number (if detected)

Your job: analyze the challenge and return the EXACT action to take.

Respond with a JSON object containing ONE action:
{
    "action": "click" | "type" | "scroll" | "wait" | "submit" | "done",
    "selector": "CSS selector or visible text to target",
    "value": "text to type, pixels to scroll, or 'bottom'",
    "reasoning": "brief explanation"
}

Action types:
- click: Click a button or link. Use a selector like "button#go" or the button's visible text
- type: Type into an input. Provide selector and value (the submit key is pressed automatically; set "multi_step": true to suppress that)
- scroll: Scroll down. Provide value in pixels (e.g. "500") or "bottom"
- wait: Wait for the page to update (use sparingly)
- submit: Submit the current form
- done: Challenge appears complete, move to the next one

IMPORTANT PATTERNS:
- If the text says "scroll to reveal", use scroll with the required pixels
- After clicking "Reveal Code" or similar, the next step is usually to enter that code
- Look for Next/Advance/Continue/Proceed buttons to move to the next challenge
- If the page says "correct" or "success", use done

Be precise and concise. Output valid JSON only."#;

const VISION_PROMPT: &str = r#"Look at this screenshot of a browser challenge.
The text-based approach has failed multiple times on this challenge.

Look for buttons to click, inputs to fill, visual puzzles, or anything the
text snapshot would miss. Respond with the same JSON action format as before."#;

/// What one proposal round produced and cost.
///
/// `proposal` is `None` when the LLM call itself failed; the controller
/// treats that exactly like a failed action.
#[derive(Debug, Default)]
pub struct ProposalOutcome {
    pub proposal: Option<ActionProposal>,
    pub llm_calls: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

fn challenge_info(state: &ChallengeState) -> String {
    match state.ordinal {
        Some(n) => format!("Challenge #{n}"),
        None => "Unknown challenge".into(),
    }
}

fn build_user_prompt(snapshot: &PageSnapshot, state: &ChallengeState) -> String {
    format!(
        "Current page state:\n\nVISIBLE TEXT:\n{}\n\nINTERACTIVE ELEMENTS:\n{}\n\nCHALLENGE INFO:\n{}\n\nWhat single action should I take next? Respond with JSON only.",
        snapshot.prompt_text(),
        snapshot.element_list(),
        challenge_info(state),
    )
}

async fn propose<C: Completion + ?Sized>(
    llm: &C,
    user: &str,
    image: Option<&[u8]>,
) -> ProposalOutcome {
    let mut outcome = ProposalOutcome::default();

    // A malformed response gets exactly one retry, then degrades to `wait`.
    for attempt in 1..=2u32 {
        let result = match image {
            Some(png) => llm.complete_with_image(SYSTEM_PROMPT, user, png).await,
            None => llm.complete(SYSTEM_PROMPT, user).await,
        };
        let response = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("llm call failed: {}", e);
                return outcome;
            }
        };
        outcome.llm_calls += 1;
        outcome.input_tokens += response.input_tokens;
        outcome.output_tokens += response.output_tokens;

        match parse_proposal(&response.text) {
            Ok(proposal) => {
                debug!("proposal: {:?}", proposal.kind);
                outcome.proposal = Some(proposal);
                return outcome;
            }
            Err(e) => warn!("proposal parse failed (attempt {}): {}", attempt, e),
        }
    }

    outcome.proposal = Some(ActionProposal::wait("unparseable proposal"));
    outcome
}

/// Ask the LLM for the next action from the textual snapshot.
pub async fn propose_action<C: Completion + ?Sized>(
    llm: &C,
    snapshot: &PageSnapshot,
    state: &ChallengeState,
) -> ProposalOutcome {
    let user = build_user_prompt(snapshot, state);
    propose(llm, &user, None).await
}

/// Vision fallback: same contract, but the LLM sees a screenshot alongside
/// the element summary. Engaged per-challenge after repeated textual
/// failures.
pub async fn propose_with_vision<C: Completion + ?Sized>(
    llm: &C,
    snapshot: &PageSnapshot,
    state: &ChallengeState,
    screenshot_png: &[u8],
) -> ProposalOutcome {
    let user = format!(
        "{}\n\nINTERACTIVE ELEMENTS:\n{}\n\nCHALLENGE INFO:\n{}",
        VISION_PROMPT,
        snapshot.element_list(),
        challenge_info(state),
    );
    propose(llm, &user, Some(screenshot_png)).await
}
