//! Agent state machine.
//!
//! Which functions each agent may call, and which of them hand the
//! conversation to another agent, is fixed by [`TRANSITIONS`].

use crate::error::AssistantError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The routed agents. A session starts at `Main` and has no terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    #[default]
    Main,
    Query,
    Bayes,
    News,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Main,
        AgentKind::Query,
        AgentKind::Bayes,
        AgentKind::News,
    ];

    /// Display name, as shown to users and other agents.
    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::Main => "Main agent",
            AgentKind::Query => "Query agent",
            AgentKind::Bayes => "Bayes agent",
            AgentKind::News => "News agent",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Every function an agent can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouterFunction {
    TransferToMain,
    TransferToNews,
    TransferToBayes,
    TransferToQuery,
    ExecuteQuery,
    GetNews,
    CalcPosterior,
    CalculateBrierScores,
}

impl RouterFunction {
    pub const ALL: [RouterFunction; 8] = [
        RouterFunction::TransferToMain,
        RouterFunction::TransferToNews,
        RouterFunction::TransferToBayes,
        RouterFunction::TransferToQuery,
        RouterFunction::ExecuteQuery,
        RouterFunction::GetNews,
        RouterFunction::CalcPosterior,
        RouterFunction::CalculateBrierScores,
    ];

    /// Tool name exposed to the model.
    pub fn name(&self) -> &'static str {
        match self {
            RouterFunction::TransferToMain => "transfer_to_main",
            RouterFunction::TransferToNews => "transfer_to_news",
            RouterFunction::TransferToBayes => "transfer_to_bayes",
            RouterFunction::TransferToQuery => "transfer_to_query",
            RouterFunction::ExecuteQuery => "execute_query",
            RouterFunction::GetNews => "get_news",
            RouterFunction::CalcPosterior => "calc_posterior",
            RouterFunction::CalculateBrierScores => "calculate_brier_scores",
        }
    }
}

impl std::fmt::Display for RouterFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for RouterFunction {
    type Err = AssistantError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        RouterFunction::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| AssistantError::Router(format!("Unknown function: {}", s)))
    }
}

/// What calling a bound function does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Switch the active agent.
    HandOff(AgentKind),
    /// Run the function and return its result to the model.
    Invoke,
}

/// `(active agent, function, effect)` for every bound function.
pub const TRANSITIONS: &[(AgentKind, RouterFunction, Effect)] = &[
    (
        AgentKind::Main,
        RouterFunction::TransferToNews,
        Effect::HandOff(AgentKind::News),
    ),
    (
        AgentKind::Main,
        RouterFunction::TransferToBayes,
        Effect::HandOff(AgentKind::Bayes),
    ),
    (
        AgentKind::Main,
        RouterFunction::TransferToQuery,
        Effect::HandOff(AgentKind::Query),
    ),
    (AgentKind::Query, RouterFunction::ExecuteQuery, Effect::Invoke),
    (
        AgentKind::Query,
        RouterFunction::CalculateBrierScores,
        Effect::Invoke,
    ),
    (
        AgentKind::Query,
        RouterFunction::TransferToMain,
        Effect::HandOff(AgentKind::Main),
    ),
    (AgentKind::News, RouterFunction::GetNews, Effect::Invoke),
    (
        AgentKind::News,
        RouterFunction::TransferToMain,
        Effect::HandOff(AgentKind::Main),
    ),
    (AgentKind::Bayes, RouterFunction::CalcPosterior, Effect::Invoke),
    (
        AgentKind::Bayes,
        RouterFunction::TransferToMain,
        Effect::HandOff(AgentKind::Main),
    ),
];

/// Effect of `function` when called by `agent`, or `None` if it is not bound.
pub fn transition(agent: AgentKind, function: RouterFunction) -> Option<Effect> {
    TRANSITIONS
        .iter()
        .find(|(from, f, _)| *from == agent && *f == function)
        .map(|(_, _, effect)| *effect)
}

/// Functions bound to `agent`, in table order.
pub fn bound_functions(agent: AgentKind) -> Vec<RouterFunction> {
    TRANSITIONS
        .iter()
        .filter(|(from, _, _)| *from == agent)
        .map(|(_, f, _)| *f)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_only_routes() {
        assert_eq!(
            bound_functions(AgentKind::Main),
            vec![
                RouterFunction::TransferToNews,
                RouterFunction::TransferToBayes,
                RouterFunction::TransferToQuery
            ]
        );
        assert!(bound_functions(AgentKind::Main)
            .iter()
            .all(|f| matches!(transition(AgentKind::Main, *f), Some(Effect::HandOff(_)))));
    }

    #[test]
    fn test_sub_agents_can_return_to_main() {
        for agent in [AgentKind::Query, AgentKind::Bayes, AgentKind::News] {
            assert_eq!(
                transition(agent, RouterFunction::TransferToMain),
                Some(Effect::HandOff(AgentKind::Main))
            );
        }
    }

    #[test]
    fn test_functions_are_scoped_to_their_agent() {
        assert_eq!(
            transition(AgentKind::Query, RouterFunction::ExecuteQuery),
            Some(Effect::Invoke)
        );
        assert_eq!(transition(AgentKind::News, RouterFunction::ExecuteQuery), None);
        assert_eq!(transition(AgentKind::Main, RouterFunction::GetNews), None);
        assert_eq!(transition(AgentKind::Bayes, RouterFunction::TransferToNews), None);
        assert_eq!(transition(AgentKind::Main, RouterFunction::TransferToMain), None);
    }

    #[test]
    fn test_every_agent_is_reachable() {
        for agent in AgentKind::ALL {
            let reachable = agent == AgentKind::Main
                || TRANSITIONS
                    .iter()
                    .any(|(_, _, effect)| *effect == Effect::HandOff(agent));
            assert!(reachable, "{} is unreachable", agent);
        }
    }

    #[test]
    fn test_function_names_round_trip() {
        for function in RouterFunction::ALL {
            assert_eq!(function.name().parse::<RouterFunction>().unwrap(), function);
        }
        assert!("transfer_to_moon".parse::<RouterFunction>().is_err());
    }
}
