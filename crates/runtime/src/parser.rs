//! Agent response parsing.
//!
//! Responses are free text with optional `ORDERS:` / `RETREATS:` /
//! `BUILDS:` / `DIPLOMACY:` / `REASONING:` sections. Parsers tolerate case
//! and ordering; unknown sections are ignored; malformed lines are dropped
//! and reported, never transformed.

use std::str::FromStr;

use backchannel_game::{BuildOrder, Order, Power, RetreatOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStage {
    Opening,
    Counter,
    Final,
    Accept,
    Reject,
}

impl SendStage {
    fn parse(tag: &str) -> Option<SendStage> {
        match tag.to_ascii_uppercase().as_str() {
            "OPENING" => Some(SendStage::Opening),
            "COUNTER" => Some(SendStage::Counter),
            "FINAL" => Some(SendStage::Final),
            "ACCEPT" => Some(SendStage::Accept),
            "REJECT" => Some(SendStage::Reject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendDirective {
    pub to: Power,
    pub content: String,
    pub stage: Option<SendStage>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentResponse {
    pub orders: Vec<Order>,
    pub retreats: Vec<RetreatOrder>,
    pub builds: Vec<BuildOrder>,
    pub sends: Vec<SendDirective>,
    pub reasoning: Option<String>,
    /// Lines inside a known section that failed to parse.
    pub dropped_lines: Vec<String>,
}

impl AgentResponse {
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
            && self.retreats.is_empty()
            && self.builds.is_empty()
            && self.sends.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Orders,
    Retreats,
    Builds,
    Diplomacy,
    Reasoning,
    Unknown,
}

fn section_for(line: &str) -> Option<Section> {
    let upper = line.trim().to_ascii_uppercase();
    match upper.as_str() {
        "ORDERS:" => Some(Section::Orders),
        "RETREATS:" => Some(Section::Retreats),
        "BUILDS:" => Some(Section::Builds),
        "DIPLOMACY:" => Some(Section::Diplomacy),
        "REASONING:" => Some(Section::Reasoning),
        _ => {
            // Any other `WORD:` header opens an unknown (ignored) section.
            if upper.ends_with(':')
                && !upper.is_empty()
                && upper[..upper.len() - 1].chars().all(|c| c.is_ascii_alphabetic() || c == '_')
                && !upper.starts_with("SEND ")
            {
                Some(Section::Unknown)
            } else {
                None
            }
        }
    }
}

/// Parse a `SEND <POWER>: ["[STAGE]"] "<content>"` directive.
fn parse_send(line: &str) -> Option<SendDirective> {
    let trimmed = line.trim();
    if !trimmed.to_ascii_uppercase().starts_with("SEND ") {
        return None;
    }
    let rest = &trimmed[5..];
    let (target, body) = rest.split_once(':')?;
    let to = Power::from_str(target.trim()).ok()?;

    let mut body = body.trim();
    let mut stage = None;
    if let Some(tag_rest) = body.strip_prefix('[') {
        if let Some((tag, after)) = tag_rest.split_once(']') {
            if let Some(parsed) = SendStage::parse(tag) {
                stage = Some(parsed);
                body = after.trim();
            }
        }
    }

    let content = body.trim_matches('"').trim().to_string();
    if content.is_empty() {
        return None;
    }
    Some(SendDirective { to, content, stage })
}

/// Parse a full agent response into its typed blocks.
pub fn parse_agent_response(raw: &str) -> AgentResponse {
    let mut response = AgentResponse::default();
    let mut section = Section::None;
    let mut reasoning_lines: Vec<String> = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        // A recall invocation is handled by the turn loop, not the parser.
        if trimmed.to_ascii_uppercase().starts_with("RECALL:") {
            continue;
        }
        if let Some(next) = section_for(trimmed) {
            section = next;
            continue;
        }
        // SEND directives are honored wherever they appear.
        if let Some(send) = parse_send(trimmed) {
            response.sends.push(send);
            continue;
        }

        match section {
            Section::Orders => match Order::from_str(trimmed) {
                Ok(order) => response.orders.push(order),
                Err(_) => response.dropped_lines.push(trimmed.to_string()),
            },
            Section::Retreats => match RetreatOrder::from_str(trimmed) {
                Ok(retreat) => response.retreats.push(retreat),
                Err(_) => response.dropped_lines.push(trimmed.to_string()),
            },
            Section::Builds => match BuildOrder::from_str(trimmed) {
                Ok(build) => response.builds.push(build),
                Err(_) => response.dropped_lines.push(trimmed.to_string()),
            },
            Section::Diplomacy => {
                // Non-SEND chatter inside DIPLOMACY is dropped (reported).
                response.dropped_lines.push(trimmed.to_string());
            }
            Section::Reasoning => reasoning_lines.push(trimmed.to_string()),
            Section::None | Section::Unknown => {}
        }
    }

    if !reasoning_lines.is_empty() {
        response.reasoning = Some(reasoning_lines.join("\n"));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use backchannel_game::UnitType;

    #[test]
    fn parses_orders_block() {
        let response = parse_agent_response(
            "I think BUR is key.\n\nORDERS:\nA PAR -> BUR\nF BRE -> MAO\nA MAR HOLD\n",
        );
        assert_eq!(response.orders.len(), 3);
        assert!(response.dropped_lines.is_empty());
    }

    #[test]
    fn malformed_order_lines_are_dropped_not_transformed() {
        let response = parse_agent_response("ORDERS:\nA PAR -> BUR\nARMY TO THE NORTH!\n");
        assert_eq!(response.orders.len(), 1);
        assert_eq!(response.dropped_lines, vec!["ARMY TO THE NORTH!"]);
    }

    #[test]
    fn sections_are_case_insensitive_and_order_free() {
        let response = parse_agent_response(
            "reasoning:\nSplit the channel.\n\norders:\nf lon -> eng\n\nbuilds:\nbuild a lvp\n",
        );
        assert_eq!(response.orders.len(), 1);
        assert_eq!(response.builds.len(), 1);
        assert_eq!(response.reasoning.as_deref(), Some("Split the channel."));
    }

    #[test]
    fn parses_retreats_and_builds() {
        let response = parse_agent_response(
            "RETREATS:\nA BUR -> GAS\nA PIC DISBAND\nBUILDS:\nBUILD F BRE\nDISBAND A PAR\n",
        );
        assert_eq!(response.retreats.len(), 2);
        assert_eq!(response.builds.len(), 2);
        assert_eq!(
            response.builds[0],
            BuildOrder::Build { unit: UnitType::Fleet, at: "BRE".into() }
        );
    }

    #[test]
    fn parses_send_directives_with_stages() {
        let response = parse_agent_response(
            "DIPLOMACY:\nSEND FRANCE: [OPENING] \"Shall we split the channel?\"\nSEND GERMANY: \"Stay out of HOL\"\n",
        );
        assert_eq!(response.sends.len(), 2);
        assert_eq!(response.sends[0].to, Power::France);
        assert_eq!(response.sends[0].stage, Some(SendStage::Opening));
        assert_eq!(response.sends[0].content, "Shall we split the channel?");
        assert_eq!(response.sends[1].stage, None);
        assert_eq!(response.sends[1].content, "Stay out of HOL");
    }

    #[test]
    fn send_outside_diplomacy_section_still_counts() {
        let response = parse_agent_response("SEND ITALY: \"truce in the Tyrrhenian?\"");
        assert_eq!(response.sends.len(), 1);
        assert_eq!(response.sends[0].to, Power::Italy);
    }

    #[test]
    fn send_to_unknown_power_is_ignored() {
        let response = parse_agent_response("DIPLOMACY:\nSEND ATLANTIS: \"hello\"\n");
        assert!(response.sends.is_empty());
        // Reported as a dropped diplomacy line.
        assert_eq!(response.dropped_lines.len(), 1);
    }

    #[test]
    fn unknown_sections_are_ignored() {
        let response = parse_agent_response("MUSINGS:\nA PAR -> BUR\nORDERS:\nA PAR -> BUR\n");
        assert_eq!(response.orders.len(), 1);
        assert!(response.dropped_lines.is_empty());
    }

    #[test]
    fn recall_lines_are_left_to_the_turn_loop() {
        let response = parse_agent_response("RECALL: phase=S1901M type=orders\nORDERS:\nA PAR HOLD\n");
        assert_eq!(response.orders.len(), 1);
    }

    #[test]
    fn empty_response_is_empty() {
        assert!(parse_agent_response("").is_empty());
        assert!(parse_agent_response("I have nothing this turn.").is_empty());
    }
}
