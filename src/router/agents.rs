//! Agent profiles.

use super::state::AgentKind;
use crate::config::Prompts;
use crate::forecasts::SCHEMA_DESCRIPTION;
use std::collections::HashMap;

/// A routed agent: its name and the instruction used as its system prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    pub kind: AgentKind,
    pub name: String,
    pub instruction: String,
}

/// The fixed set of agent profiles, built once and shared by all sessions.
#[derive(Debug, Clone)]
pub struct AgentRoster {
    profiles: Vec<AgentProfile>,
}

impl AgentRoster {
    pub fn from_prompts(prompts: &Prompts) -> Self {
        let mut vars = HashMap::new();
        vars.insert("schema".to_string(), SCHEMA_DESCRIPTION.to_string());

        let profiles = AgentKind::ALL
            .into_iter()
            .map(|kind| {
                let template = match kind {
                    AgentKind::Main => &prompts.agents.main,
                    AgentKind::Query => &prompts.agents.query,
                    AgentKind::Bayes => &prompts.agents.bayes,
                    AgentKind::News => &prompts.agents.news,
                };
                AgentProfile {
                    kind,
                    name: kind.name().to_string(),
                    instruction: prompts.render_with_custom(template, &vars),
                }
            })
            .collect();

        Self { profiles }
    }

    pub fn get(&self, kind: AgentKind) -> &AgentProfile {
        // Built from AgentKind::ALL, so every kind is present.
        self.iter()
            .find(|p| p.kind == kind)
            .unwrap_or(&self.profiles[0])
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentProfile> {
        self.profiles.iter()
    }
}

impl Default for AgentRoster {
    fn default() -> Self {
        Self::from_prompts(&Prompts::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_instruction_embeds_schema() {
        let roster = AgentRoster::default();
        let query = roster.get(AgentKind::Query);

        assert_eq!(query.name, "Query agent");
        assert!(query.instruction.contains("Table: forecast_points"));
        assert!(!query.instruction.contains("{{schema}}"));
    }

    #[test]
    fn test_roster_has_every_agent() {
        let roster = AgentRoster::default();
        for kind in AgentKind::ALL {
            assert_eq!(roster.get(kind).kind, kind);
        }
        assert_eq!(roster.iter().count(), 4);
    }

    #[test]
    fn test_custom_variables_reach_instructions() {
        let mut prompts = Prompts::default();
        prompts.agents.main = "Route requests for {{user}}.".to_string();
        prompts
            .variables
            .insert("user".to_string(), "Max".to_string());

        let roster = AgentRoster::from_prompts(&prompts);
        assert_eq!(roster.get(AgentKind::Main).instruction, "Route requests for Max.");
    }
}
