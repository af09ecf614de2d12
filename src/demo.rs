//! Built-in demonstration scenarios, run by the `heka demo` command.

use serde::Serialize;

use crate::agent::{Agent, AgentInfo};
use crate::config::AgentConfig;
use crate::decide::Decision;
use crate::error::HekaResult;
use crate::preference::PreferenceType;
use crate::production::{Action, Condition, Production, RhsValue, Test};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// `(S1 ^superstate nil)` elaborates `(S1 ^done yes)`; removing the
    /// superstate WME retracts it.
    Done,
    /// Two proposed operators and `O1 > O2`: O1 is selected.
    Prefer,
    /// Two proposed operators and nothing between them: a tie substate.
    Tie,
}

impl Scenario {
    pub fn name(self) -> &'static str {
        match self {
            Scenario::Done => "done",
            Scenario::Prefer => "prefer",
            Scenario::Tie => "tie",
        }
    }
}

/// Working memory snapshots and decisions from one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    pub scenario: Scenario,
    pub decisions: Vec<Decision>,
    pub wmes: Vec<String>,
    /// Working memory after the scenario's follow-up change, if it has one.
    pub after: Option<Vec<String>>,
    pub info: AgentInfo,
}

impl std::fmt::Display for DemoReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "scenario: {}", self.scenario.name())?;
        for decision in &self.decisions {
            writeln!(f, "decision: {decision:?}")?;
        }
        writeln!(f, "working memory:")?;
        for w in &self.wmes {
            writeln!(f, "  {w}")?;
        }
        if let Some(after) = &self.after {
            writeln!(f, "working memory after removal:")?;
            for w in after {
                writeln!(f, "  {w}")?;
            }
        }
        write!(f, "{}", self.info)
    }
}

/// Run a scenario on a fresh agent.
pub fn run(scenario: Scenario, config: AgentConfig) -> HekaResult<DemoReport> {
    let mut agent = Agent::new(config)?;
    tracing::info!(scenario = scenario.name(), "running demo");
    let mut decisions = Vec::new();

    match scenario {
        Scenario::Done => {
            let superstate_wme = load_done(&mut agent)?;
            agent.elaborate_to_quiescence()?;
            let wmes = agent.dump_wmes();
            agent.remove_wme(superstate_wme)?;
            agent.elaborate_to_quiescence()?;
            return Ok(DemoReport {
                scenario,
                decisions,
                wmes,
                after: Some(agent.dump_wmes()),
                info: agent.info(),
            });
        }
        Scenario::Prefer => load_proposals(&mut agent, true)?,
        Scenario::Tie => load_proposals(&mut agent, false)?,
    }
    decisions.push(agent.run_decision_cycle()?.decision);
    Ok(DemoReport {
        scenario,
        decisions,
        wmes: agent.dump_wmes(),
        after: None,
        info: agent.info(),
    })
}

/// `(<s> ^superstate nil) --> (<s> ^done yes)`. Returns the timetag of the
/// top goal's `^superstate` WME.
pub fn load_done(agent: &mut Agent) -> HekaResult<crate::memory::Timetag> {
    let superstate = agent.intern("superstate")?;
    let nil = agent.intern("nil")?;
    let done = agent.intern("done")?;
    let yes = agent.intern("yes")?;
    agent.add_production(
        Production::new("elaborate*done")
            .documented("Mark the top state done")
            .when(Condition::positive(
                Test::var("s"),
                Test::constant(superstate),
                Test::constant(nil),
            ))
            .then(Action::make(
                RhsValue::var("s"),
                RhsValue::Constant(done),
                RhsValue::Constant(yes),
            )),
    )?;
    let top = agent.top_goal();
    let record = agent
        .find_wme(top, superstate, nil)
        .ok_or(crate::error::InvariantViolation::SlotInconsistency {
            message: "top goal has no ^superstate".into(),
        })?;
    Ok(record.wme.timetag)
}

/// Propose operators `O1` (`^name a`) and `O2` (`^name b`) on the top state,
/// optionally with `O1 > O2`.
pub fn load_proposals(agent: &mut Agent, prefer_first: bool) -> HekaResult<()> {
    let superstate = agent.intern("superstate")?;
    let nil = agent.intern("nil")?;
    let operator = agent.intern("operator")?;
    let name = agent.intern("name")?;
    let a = agent.intern("a")?;
    let b = agent.intern("b")?;

    let mut proposal = Production::new("propose*a-and-b")
        .when(Condition::positive(
            Test::var("s"),
            Test::constant(superstate),
            Test::constant(nil),
        ))
        .then(Action::make(RhsValue::var("s"), RhsValue::Constant(operator), RhsValue::var("o1")))
        .then(Action::make(RhsValue::var("o1"), RhsValue::Constant(name), RhsValue::Constant(a)))
        .then(Action::make(RhsValue::var("s"), RhsValue::Constant(operator), RhsValue::var("o2")))
        .then(Action::make(RhsValue::var("o2"), RhsValue::Constant(name), RhsValue::Constant(b)));
    if prefer_first {
        proposal = proposal.then(Action::prefer(
            RhsValue::var("s"),
            RhsValue::Constant(operator),
            RhsValue::var("o1"),
            PreferenceType::Better,
            Some(RhsValue::var("o2")),
        ));
    }
    agent.add_production(proposal)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_is_retracted_with_its_support() {
        let report = run(Scenario::Done, AgentConfig::default()).unwrap();
        assert!(report.wmes.iter().any(|w| w.contains("^done yes")));
        let after = report.after.unwrap();
        assert!(!after.iter().any(|w| w.contains("^done")));
    }

    #[test]
    fn prefer_selects_o1() {
        let report = run(Scenario::Prefer, AgentConfig::default()).unwrap();
        assert!(matches!(report.decisions[0], Decision::OperatorSelected { .. }));
        assert!(report.wmes.iter().any(|w| w.ends_with("S1 ^operator O1)")));
    }

    #[test]
    fn tie_creates_substate() {
        let report = run(Scenario::Tie, AgentConfig::default()).unwrap();
        assert!(matches!(report.decisions[0], Decision::ImpasseCreated { .. }));
        assert!(report.wmes.iter().any(|w| w.contains("^impasse tie")));
        assert_eq!(report.info.goal_depth, 2);
    }

    #[test]
    fn report_serializes() {
        let report = run(Scenario::Tie, AgentConfig::default()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["scenario"], "tie");
    }
}
