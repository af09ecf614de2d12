//! Agent facade: top-level API for the heka engine.
//!
//! The `Agent` owns every subsystem (symbol table, working memory, match
//! network, preference memory, goal dependency sets and the decider) and is
//! the only place that coordinates them. Callers either drive the match set
//! by hand ([`Agent::drain_match_set`], [`Agent::fire`], [`Agent::retract`])
//! or let the agent do it ([`Agent::run_elaboration`],
//! [`Agent::elaborate_to_quiescence`], [`Agent::run_decision_cycle`]).

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::config::AgentConfig;
use crate::decide::{Decider, Decision, GoalInfo, SlotImpasse};
use crate::error::{AgentError, HekaResult, RhsError, SymbolError};
use crate::instantiation::{Bindings, Instantiation, InstantiationId};
use crate::kernel::Kernel;
use crate::memory::{SlotKey, Support, Timetag, Wme, WmeRecord, WorkingMemory};
use crate::preference::{Preference, PreferenceId, PreferenceMemory, PreferenceType};
use crate::production::{Action, FunctionCall, MakeAction, Production, ProductionId, RhsValue, SupportMode};
use crate::rete::{MatchSetEvent, Rete, ReteMatch, ReteStats};
use crate::rhs::{FunctionRegistry, RhsContext, RhsFunction};
use crate::symbol::{SymbolId, SymbolTable, TOP_GOAL_LEVEL};

/// Counters kept across the agent's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AgentStats {
    pub decision_cycles: u64,
    pub elaboration_waves: u64,
    pub firings: u64,
    pub retractions: u64,
    pub reclaimed: u64,
}

/// What one elaboration wave did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ElaborationOutcome {
    pub fired: usize,
    pub retracted: usize,
    /// Impasses found on non-context slots.
    pub impasses: Vec<SlotImpasse>,
}

/// What one decision cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    pub decision: Decision,
    /// Elaboration waves run before and after the decision.
    pub waves: usize,
    pub reclaimed: usize,
}

/// Summary information about the agent state.
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub name: String,
    pub wmes: usize,
    pub slots: usize,
    pub preferences: usize,
    pub instantiations: usize,
    pub productions: usize,
    pub goal_depth: usize,
    pub symbols: usize,
    pub rete: ReteStats,
    pub stats: AgentStats,
    pub halted: bool,
}

impl std::fmt::Display for AgentInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "heka agent \"{}\"", self.name)?;
        writeln!(f, "  wmes:            {}", self.wmes)?;
        writeln!(f, "  slots:           {}", self.slots)?;
        writeln!(f, "  preferences:     {}", self.preferences)?;
        writeln!(f, "  instantiations:  {}", self.instantiations)?;
        writeln!(f, "  productions:     {}", self.productions)?;
        writeln!(f, "  goal depth:      {}", self.goal_depth)?;
        writeln!(f, "  symbols:         {}", self.symbols)?;
        writeln!(f, "  beta nodes:      {}", self.rete.beta_nodes)?;
        writeln!(f, "  alpha memories:  {}", self.rete.alpha_memories)?;
        writeln!(f, "  tokens:          {}", self.rete.tokens)?;
        writeln!(f, "  decision cycles: {}", self.stats.decision_cycles)?;
        writeln!(f, "  firings:         {}", self.stats.firings)?;
        writeln!(f, "  halted:          {}", self.halted)?;
        Ok(())
    }
}

/// A production-system agent.
pub struct Agent {
    config: AgentConfig,
    kernel: Kernel,
    decider: Decider,
    productions: BTreeMap<ProductionId, Production>,
    production_names: HashMap<String, ProductionId>,
    next_production: u64,
    functions: FunctionRegistry,
    output: Vec<String>,
    halted: bool,
    stats: AgentStats,
}

impl Agent {
    /// Create an agent with its top goal in place.
    pub fn new(config: AgentConfig) -> HekaResult<Self> {
        config.validate()?;
        tracing::info!(
            name = %config.name,
            selection = ?config.selection,
            max_goal_depth = config.max_goal_depth,
            "initializing heka agent"
        );
        let mut kernel = Kernel::new();
        let decider = Decider::new(&mut kernel, &config)?;
        Ok(Self {
            config,
            kernel,
            decider,
            productions: BTreeMap::new(),
            production_names: HashMap::new(),
            next_production: 0,
            functions: FunctionRegistry::with_builtins(),
            output: Vec::new(),
            halted: false,
            stats: AgentStats::default(),
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.kernel.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.kernel.symbols
    }

    /// Intern a string constant.
    pub fn intern(&mut self, s: &str) -> HekaResult<SymbolId> {
        self.kernel.symbols.intern_str(s)
    }

    pub fn memory(&self) -> &WorkingMemory {
        &self.kernel.memory
    }

    pub fn rete(&self) -> &Rete {
        &self.kernel.rete
    }

    pub fn preferences(&self) -> &PreferenceMemory {
        &self.kernel.preferences
    }

    pub fn decider(&self) -> &Decider {
        &self.decider
    }

    pub fn goals(&self) -> &[GoalInfo] {
        self.decider.goals()
    }

    pub fn top_goal(&self) -> SymbolId {
        self.decider.top_goal()
    }

    pub fn bottom_goal(&self) -> SymbolId {
        self.decider.bottom_goal()
    }

    /// Operator installed for `goal`, if any.
    pub fn selected_operator(&self, goal: SymbolId) -> Option<SymbolId> {
        self.decider.installed_operator(&self.kernel, goal)
    }

    pub fn instantiation(&self, id: InstantiationId) -> Option<&Instantiation> {
        self.kernel.instantiations.get(&id)
    }

    pub fn instantiations(&self) -> impl Iterator<Item = &Instantiation> {
        self.kernel.instantiations.values()
    }

    /// Live preferences of one slot.
    pub fn slot_preferences(&self, id: SymbolId, attr: SymbolId) -> Vec<&Preference> {
        self.kernel.slot_preferences(SlotKey::new(id, attr))
    }

    /// The WME `(id ^attr value)`, if present.
    pub fn find_wme(&self, id: SymbolId, attr: SymbolId, value: SymbolId) -> Option<&WmeRecord> {
        self.kernel.memory.find(id, attr, value, false)
    }

    /// Lines written by the `write` RHS function.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Clear the halt flag so cycles run again.
    pub fn resume(&mut self) {
        self.halted = false;
    }

    pub fn stats(&self) -> AgentStats {
        self.stats
    }

    pub fn info(&self) -> AgentInfo {
        AgentInfo {
            name: self.config.name.clone(),
            wmes: self.kernel.memory.len(),
            slots: self.kernel.memory.slot_count(),
            preferences: self.kernel.preferences.len(),
            instantiations: self.kernel.instantiations.len(),
            productions: self.productions.len(),
            goal_depth: self.decider.depth(),
            symbols: self.kernel.symbols.len(),
            rete: self.kernel.rete.stats(),
            stats: self.stats,
            halted: self.halted,
        }
    }

    // -----------------------------------------------------------------------
    // Working memory
    // -----------------------------------------------------------------------

    /// Add an architecture-supported WME. Adding an existing triple returns
    /// the existing WME.
    pub fn add_wme(&mut self, id: SymbolId, attr: SymbolId, value: SymbolId, acceptable: bool) -> HekaResult<Wme> {
        if !self.kernel.symbols.is_identifier(id) {
            return Err(SymbolError::NotAnIdentifier {
                symbol: self.kernel.symbols.display(id),
            }
            .into());
        }
        self.kernel
            .add_wme(id, attr, value, acceptable, Support::Architecture, None)
    }

    /// Remove a WME. Returns `false` if it was not in working memory.
    pub fn remove_wme(&mut self, timetag: Timetag) -> HekaResult<bool> {
        Ok(self.kernel.remove_wme(timetag)?.is_some())
    }

    /// Create a fresh identifier at the top goal's level.
    pub fn new_identifier(&mut self, letter: char) -> HekaResult<SymbolId> {
        self.kernel.symbols.new_identifier(letter, TOP_GOAL_LEVEL)
    }

    // -----------------------------------------------------------------------
    // Productions
    // -----------------------------------------------------------------------

    /// Validate and compile a production. A production with the same name is
    /// replaced.
    pub fn add_production(&mut self, production: Production) -> HekaResult<ProductionId> {
        crate::production::validate(&production, |name| self.functions.contains(name))?;
        self.next_production += 1;
        let id = ProductionId(self.next_production);
        self.kernel
            .rete
            .add_production(id, &production, &self.kernel.symbols)?;

        if let Some(old) = self.production_names.get(&production.name).copied() {
            tracing::info!(production = %production.name, "replacing production");
            self.remove_production(old)?;
        }
        for symbol in production.constants() {
            self.kernel.symbols.add_link(symbol);
        }
        tracing::debug!(production = %production.name, %id, "production added");
        self.production_names.insert(production.name.clone(), id);
        self.productions.insert(id, production);
        Ok(id)
    }

    /// Remove a production. Its live instantiations are retracted at the next
    /// drain. Returns `false` for unknown ids.
    pub fn remove_production(&mut self, id: ProductionId) -> HekaResult<bool> {
        let Some(production) = self.productions.remove(&id) else {
            return Ok(false);
        };
        self.kernel.rete.remove_production(id, &self.kernel.symbols)?;
        if self.production_names.get(&production.name) == Some(&id) {
            self.production_names.remove(&production.name);
        }
        for symbol in production.constants() {
            self.kernel.symbols.remove_link(symbol);
        }
        tracing::debug!(production = %production.name, %id, "production removed");
        Ok(true)
    }

    /// Remove a production by name.
    pub fn excise(&mut self, name: &str) -> HekaResult<()> {
        let id = self.production_id(name).ok_or_else(|| AgentError::UnknownProduction {
            name: name.to_string(),
        })?;
        self.remove_production(id)?;
        Ok(())
    }

    pub fn production_id(&self, name: &str) -> Option<ProductionId> {
        self.production_names.get(name).copied()
    }

    pub fn production(&self, id: ProductionId) -> Option<&Production> {
        self.productions.get(&id)
    }

    pub fn productions(&self) -> impl Iterator<Item = (ProductionId, &Production)> {
        self.productions.iter().map(|(id, p)| (*id, p))
    }

    pub fn register_function(&mut self, function: impl RhsFunction + 'static) {
        self.functions.register(function);
    }

    // -----------------------------------------------------------------------
    // Match set
    // -----------------------------------------------------------------------

    /// Collect pending match-set changes, retractions first. Every assertion
    /// is recorded as an unfired instantiation.
    pub fn drain_match_set(&mut self) -> HekaResult<Vec<MatchSetEvent>> {
        let events = self.kernel.rete.drain()?;
        for event in &events {
            if let MatchSetEvent::Assert(m) = event {
                let inst = self.new_instantiation(m);
                tracing::debug!(
                    production = %inst.production_name,
                    instantiation = %inst.id,
                    "match asserted"
                );
                self.kernel.instantiations.insert(inst.id, inst);
            }
        }
        Ok(events)
    }

    fn new_instantiation(&self, m: &ReteMatch) -> Instantiation {
        let symbols = &self.kernel.symbols;
        // Deepest goal identifier among the matched WME ids.
        let match_goal = m
            .wmes
            .iter()
            .map(|w| w.id)
            .filter(|id| symbols.is_goal(*id))
            .max_by_key(|id| symbols.level(*id));
        let match_goal_level = match_goal.and_then(|goal| symbols.level(goal));
        Instantiation {
            id: m.instantiation,
            production: m.production,
            production_name: self
                .productions
                .get(&m.production)
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            matched: m.wmes.clone(),
            bindings: m.bindings.clone(),
            match_goal,
            match_goal_level,
            backtrace_number: 0,
            preferences: Vec::new(),
            fired: false,
            retracted: false,
        }
    }

    /// Execute an instantiation's actions and store the preferences it makes.
    ///
    /// Actions that fail (an RHS function error, a non-identifier in id
    /// position) are logged and skipped; the rest still run.
    pub fn fire(&mut self, id: InstantiationId) -> HekaResult<Vec<Preference>> {
        let stale = || AgentError::StaleInstantiation { id: id.0 };
        let inst = self.kernel.instantiations.get(&id).ok_or_else(stale)?;
        if inst.fired || inst.retracted {
            return Err(stale().into());
        }
        let production_id = inst.production;
        let production = self
            .productions
            .get(&production_id)
            .ok_or_else(|| AgentError::UnknownProduction {
                name: inst.production_name.clone(),
            })?;
        let level = inst.match_goal_level.unwrap_or(TOP_GOAL_LEVEL);
        let tests_operator = inst.tests_selected_operator(self.decider.arch().operator);
        let declared = match production.support {
            SupportMode::OSupport => Some(true),
            SupportMode::ISupport => Some(false),
            SupportMode::Undeclared => None,
        };

        let mut firing = Firing {
            symbols: &mut self.kernel.symbols,
            functions: &self.functions,
            output: &mut self.output,
            halted: &mut self.halted,
            bindings: inst.bindings.clone(),
            level,
        };
        let mut made = Vec::new();
        for action in &production.actions {
            let result = match action {
                Action::Make(make) => firing.make(make, id).map(|p| made.push(p)),
                Action::Call(call) => firing.call(call).map(drop),
            };
            if let Err(error) = result {
                tracing::warn!(production = %production.name, %error, "action skipped");
            }
        }

        let operator = self.decider.arch().operator;
        let mut stored = Vec::new();
        for mut pref in made {
            pref.o_supported = match declared {
                Some(declared) => declared,
                None => {
                    let proposal = pref.kind.is_acceptable_kind()
                        && pref.attr == operator
                        && self.kernel.symbols.is_goal(pref.ident);
                    !proposal && tests_operator
                }
            };
            pref.goal = self
                .kernel
                .symbols
                .level(pref.ident)
                .and_then(|l| self.decider.goal_at_level(l));
            if pref.kind == PreferenceType::Reject && pref.o_supported {
                self.o_reject(&pref);
                continue;
            }
            let pid = self.kernel.add_preference(pref);
            if let Some(p) = self.kernel.preferences.get(pid) {
                stored.push(p.clone());
            }
        }

        if let Some(inst) = self.kernel.instantiations.get_mut(&id) {
            inst.fired = true;
        }
        if let Some(p) = self.productions.get_mut(&production_id) {
            p.firing_count += 1;
            tracing::debug!(production = %p.name, instantiation = %id, preferences = stored.len(), "fired");
        }
        self.stats.firings += 1;
        Ok(stored)
    }

    /// An o-supported reject withdraws every preference in the slot for its
    /// value, whatever their support, and is not stored itself.
    fn o_reject(&mut self, reject: &Preference) {
        let key = SlotKey::new(reject.ident, reject.attr);
        let withdrawn: Vec<PreferenceId> = self
            .kernel
            .slot_preferences(key)
            .iter()
            .filter(|p| p.value == reject.value)
            .map(|p| p.id)
            .collect();
        for id in &withdrawn {
            self.kernel.remove_preference(*id);
        }
        // Mark the slot so the decider looks at it even if nothing was withdrawn.
        self.kernel.changed_slots.insert(key);
        tracing::debug!(
            id = %self.kernel.symbols.display(reject.ident),
            attr = %self.kernel.symbols.display(reject.attr),
            value = %self.kernel.symbols.display(reject.value),
            withdrawn = withdrawn.len(),
            "o-reject"
        );
    }

    /// Withdraw an instantiation: its i-supported preferences go, its
    /// o-supported ones stay.
    pub fn retract(&mut self, id: InstantiationId) -> HekaResult<()> {
        let inst = self
            .kernel
            .instantiations
            .get_mut(&id)
            .filter(|i| !i.retracted)
            .ok_or(AgentError::StaleInstantiation { id: id.0 })?;
        inst.retracted = true;
        let preferences = inst.preferences.clone();
        let name = inst.production_name.clone();

        let mut withdrawn = 0;
        for pid in preferences {
            let i_supported = self
                .kernel
                .preferences
                .get(pid)
                .is_some_and(|p| !p.o_supported);
            if i_supported {
                self.kernel.remove_preference(pid);
                withdrawn += 1;
            }
        }
        if self
            .kernel
            .instantiations
            .get(&id)
            .is_some_and(|i| i.preferences.is_empty())
        {
            self.kernel.instantiations.shift_remove(&id);
        }
        self.stats.retractions += 1;
        tracing::debug!(production = %name, instantiation = %id, withdrawn, "retracted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Driver
    // -----------------------------------------------------------------------

    /// Nothing left to fire, retract or re-decide.
    pub fn is_quiescent(&self) -> bool {
        !self.kernel.rete.has_pending()
            && self.kernel.changed_slots.is_empty()
            && self.kernel.doomed_goals.is_empty()
    }

    /// One elaboration wave: retract, fire, then bring slots up to date.
    pub fn run_elaboration(&mut self) -> HekaResult<ElaborationOutcome> {
        let mut outcome = ElaborationOutcome::default();
        for event in self.drain_match_set()? {
            match event {
                MatchSetEvent::Retract { instantiation, .. } => {
                    let live = self
                        .kernel
                        .instantiations
                        .get(&instantiation)
                        .is_some_and(|i| !i.retracted);
                    if live {
                        self.retract(instantiation)?;
                        outcome.retracted += 1;
                    }
                }
                MatchSetEvent::Assert(m) => {
                    let pending = self
                        .kernel
                        .instantiations
                        .get(&m.instantiation)
                        .is_some_and(|i| !i.fired && !i.retracted);
                    if pending {
                        self.fire(m.instantiation)?;
                        outcome.fired += 1;
                    }
                }
            }
        }
        outcome.impasses = self.decider.update_slots(&mut self.kernel)?;
        self.stats.elaboration_waves += 1;
        Ok(outcome)
    }

    /// Run waves until quiescence, at most `max_elaborations` of them.
    /// Returns the number of waves run.
    pub fn elaborate_to_quiescence(&mut self) -> HekaResult<usize> {
        let mut waves = 0;
        while !self.is_quiescent() && !self.halted {
            if waves >= self.config.max_elaborations {
                tracing::warn!(
                    max_elaborations = self.config.max_elaborations,
                    "elaboration limit reached before quiescence"
                );
                break;
            }
            self.run_elaboration()?;
            waves += 1;
        }
        Ok(waves)
    }

    /// Run the decision phase once.
    pub fn decide(&mut self) -> HekaResult<Decision> {
        let decision = self.decider.decide(&mut self.kernel)?;
        if let Decision::GoalDepthExceeded { goal } = decision {
            tracing::warn!(goal = %self.kernel.symbols.display(goal), "halting: goal stack too deep");
            self.halted = true;
        }
        Ok(decision)
    }

    /// Elaborate, decide, elaborate, reclaim unused identifiers.
    pub fn run_decision_cycle(&mut self) -> HekaResult<CycleOutcome> {
        if self.halted {
            return Ok(CycleOutcome {
                decision: Decision::Nothing,
                waves: 0,
                reclaimed: 0,
            });
        }
        let mut waves = self.elaborate_to_quiescence()?;
        let decision = if self.halted {
            Decision::Nothing
        } else {
            self.decide()?
        };
        waves += self.elaborate_to_quiescence()?;
        let reclaimed = self.kernel.symbols.reclaim().len();
        self.stats.decision_cycles += 1;
        self.stats.reclaimed += reclaimed as u64;
        Ok(CycleOutcome {
            decision,
            waves,
            reclaimed,
        })
    }

    /// Printable working memory, in timetag order.
    pub fn dump_wmes(&self) -> Vec<String> {
        self.kernel
            .memory
            .iter()
            .map(|r| r.wme.display(&self.kernel.symbols))
            .collect()
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.config)
            .field("wmes", &self.kernel.memory.len())
            .field("productions", &self.productions.len())
            .field("goal_depth", &self.decider.depth())
            .field("halted", &self.halted)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RHS evaluation
// ---------------------------------------------------------------------------

/// Action evaluation state for one firing.
struct Firing<'a> {
    symbols: &'a mut SymbolTable,
    functions: &'a FunctionRegistry,
    output: &'a mut Vec<String>,
    halted: &'a mut bool,
    bindings: Bindings,
    /// Level for identifiers the actions create.
    level: u32,
}

impl Firing<'_> {
    fn value(&mut self, value: &RhsValue) -> HekaResult<SymbolId> {
        match value {
            RhsValue::Constant(c) => Ok(*c),
            RhsValue::Variable(v) => {
                if let Some(bound) = self.bindings.get(v) {
                    return Ok(*bound);
                }
                let letter = v.name().chars().next().unwrap_or('I');
                let fresh = self.symbols.new_identifier(letter, self.level)?;
                self.bindings.insert(v.clone(), fresh);
                Ok(fresh)
            }
            RhsValue::Call(call) => self.call(call)?.ok_or_else(|| {
                RhsError::Failed {
                    function: call.name.clone(),
                    message: "returned no value".into(),
                }
                .into()
            }),
        }
    }

    fn call(&mut self, call: &FunctionCall) -> HekaResult<Option<SymbolId>> {
        let args = call
            .args
            .iter()
            .map(|a| self.value(a))
            .collect::<HekaResult<Vec<_>>>()?;
        let functions = self.functions;
        let function = functions.get(&call.name).ok_or_else(|| RhsError::Failed {
            function: call.name.clone(),
            message: "not registered".into(),
        })?;
        let mut ctx = RhsContext {
            symbols: &mut *self.symbols,
            output: &mut *self.output,
            halted: &mut *self.halted,
        };
        function.call(&mut ctx, &args)
    }

    /// Build the preference for a make action. Support and owning goal are
    /// filled in by the caller.
    fn make(&mut self, make: &MakeAction, instantiation: InstantiationId) -> HekaResult<Preference> {
        let ident = self.value(&make.id)?;
        if !self.symbols.is_identifier(ident) {
            return Err(SymbolError::NotAnIdentifier {
                symbol: self.symbols.display(ident),
            }
            .into());
        }
        let attr = self.value(&make.attr)?;
        let value = self.value(&make.value)?;
        let mut kind = make.preference;
        let mut referent = match &make.referent {
            Some(r) if kind.takes_referent() => Some(self.value(r)?),
            _ => None,
        };
        let mut numeric_value = None;
        if kind == PreferenceType::NumericIndifferent {
            numeric_value = referent.and_then(|r| self.symbols.as_f64(r));
            if numeric_value.is_none() {
                tracing::warn!(
                    value = %self.symbols.display(value),
                    "numeric indifferent preference without a number, treated as unary"
                );
                kind = PreferenceType::UnaryIndifferent;
                referent = None;
            }
        }
        Ok(Preference {
            id: PreferenceId(0),
            kind,
            ident,
            attr,
            value,
            referent,
            numeric_value,
            o_supported: false,
            instantiation,
            goal: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::production::{Condition, Test};

    fn agent() -> Agent {
        Agent::new(AgentConfig::with_name("test")).unwrap()
    }

    #[test]
    fn agent_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Agent>();
    }

    #[test]
    fn invalid_config_rejected() {
        let config = AgentConfig {
            max_elaborations: 0,
            ..AgentConfig::default()
        };
        assert!(Agent::new(config).is_err());
    }

    #[test]
    fn constants_cannot_be_wme_ids() {
        let mut a = agent();
        let red = a.intern("red").unwrap();
        let color = a.intern("color").unwrap();
        assert!(a.add_wme(red, color, red, false).is_err());
    }

    #[test]
    fn manual_fire_and_retract() {
        let mut a = agent();
        let s1 = a.top_goal();
        let (color, red, seen) = (
            a.intern("color").unwrap(),
            a.intern("red").unwrap(),
            a.intern("seen").unwrap(),
        );
        a.add_production(
            Production::new("see-red")
                .when(Condition::positive(Test::var("s"), Test::constant(color), Test::constant(red)))
                .then(Action::make(RhsValue::var("s"), RhsValue::Constant(seen), RhsValue::Constant(red))),
        )
        .unwrap();

        let w = a.add_wme(s1, color, red, false).unwrap();
        let events = a.drain_match_set().unwrap();
        let [MatchSetEvent::Assert(m)] = events.as_slice() else {
            panic!("expected one assertion");
        };
        let prefs = a.fire(m.instantiation).unwrap();
        assert_eq!(prefs.len(), 1);
        assert!(!prefs[0].o_supported);
        assert_eq!(prefs[0].goal, Some(s1));
        assert!(matches!(
            a.fire(m.instantiation),
            Err(crate::error::HekaError::Agent(AgentError::StaleInstantiation { .. }))
        ));

        a.remove_wme(w.timetag).unwrap();
        let events = a.drain_match_set().unwrap();
        assert!(matches!(events.as_slice(), [MatchSetEvent::Retract { .. }]));
        a.retract(m.instantiation).unwrap();
        assert!(a.preferences().is_empty());
        assert!(a.instantiation(m.instantiation).is_none());
    }

    #[test]
    fn failing_action_is_skipped() {
        let mut a = agent();
        let s1 = a.top_goal();
        let (go, done, yes, zero) = (
            a.intern("go").unwrap(),
            a.intern("done").unwrap(),
            a.intern("yes").unwrap(),
            a.symbols_mut().intern_int(0).unwrap(),
        );
        let quotient = RhsValue::Call(FunctionCall::new(
            "div",
            vec![RhsValue::Constant(zero), RhsValue::Constant(zero)],
        ));
        a.add_production(
            Production::new("divide")
                .when(Condition::positive(Test::var("s"), Test::constant(go), Test::constant(yes)))
                .then(Action::make(RhsValue::var("s"), RhsValue::Constant(done), quotient))
                .then(Action::make(RhsValue::var("s"), RhsValue::Constant(done), RhsValue::Constant(yes))),
        )
        .unwrap();
        a.add_wme(s1, go, yes, false).unwrap();
        a.elaborate_to_quiescence().unwrap();
        assert!(a.find_wme(s1, done, yes).is_some());
        assert_eq!(a.slot_preferences(s1, done).len(), 1);
    }

    #[test]
    fn unbound_rhs_variables_make_identifiers() {
        let mut a = agent();
        let s1 = a.top_goal();
        let (go, thing) = (a.intern("go").unwrap(), a.intern("thing").unwrap());
        a.add_production(
            Production::new("make-thing")
                .when(Condition::positive(Test::var("s"), Test::constant(go), Test::Blank))
                .then(Action::make(RhsValue::var("s"), RhsValue::Constant(thing), RhsValue::var("new"))),
        )
        .unwrap();
        a.add_wme(s1, go, go, false).unwrap();
        a.elaborate_to_quiescence().unwrap();

        let made = a.slot_preferences(s1, thing);
        assert_eq!(made.len(), 1);
        let value = made[0].value;
        assert_eq!(a.symbols().display(value), "N1");
        assert_eq!(a.symbols().level(value), Some(1));
    }

    #[test]
    fn match_goal_comes_from_goal_identifiers() {
        let mut a = agent();
        let s1 = a.top_goal();
        let (thing, color, red, seen) = (
            a.intern("thing").unwrap(),
            a.intern("color").unwrap(),
            a.intern("red").unwrap(),
            a.intern("seen").unwrap(),
        );
        let t1 = a.new_identifier('T').unwrap();
        a.add_production(
            Production::new("via-state")
                .when(Condition::positive(Test::var("s"), Test::constant(thing), Test::var("t")))
                .when(Condition::positive(Test::var("t"), Test::constant(color), Test::constant(red)))
                .then(Action::make(RhsValue::var("t"), RhsValue::Constant(seen), RhsValue::Constant(red))),
        )
        .unwrap();
        a.add_production(
            Production::new("object-only")
                .when(Condition::positive(Test::var("t"), Test::constant(color), Test::constant(red)))
                .then(Action::make(RhsValue::var("t"), RhsValue::Constant(seen), RhsValue::Constant(color))),
        )
        .unwrap();
        a.add_wme(s1, thing, t1, false).unwrap();
        a.add_wme(t1, color, red, false).unwrap();

        let events = a.drain_match_set().unwrap();
        let mut goals: Vec<(String, Option<SymbolId>)> = events
            .iter()
            .filter_map(|e| match e {
                MatchSetEvent::Assert(m) => a.instantiation(m.instantiation),
                MatchSetEvent::Retract { .. } => None,
            })
            .map(|i| (i.production_name.clone(), i.match_goal))
            .collect();
        goals.sort();
        assert_eq!(
            goals,
            vec![("object-only".to_string(), None), ("via-state".to_string(), Some(s1))]
        );
    }

    #[test]
    fn write_and_halt() {
        let mut a = agent();
        let s1 = a.top_goal();
        let (go, hello) = (a.intern("go").unwrap(), a.intern("hello").unwrap());
        a.add_production(
            Production::new("greet")
                .when(Condition::positive(Test::var("s"), Test::constant(go), Test::Blank))
                .then(Action::call("write", vec![RhsValue::Constant(hello)]))
                .then(Action::call("halt", vec![])),
        )
        .unwrap();
        a.add_wme(s1, go, go, false).unwrap();
        a.run_decision_cycle().unwrap();
        assert_eq!(a.output(), ["hello".to_string()]);
        assert!(a.is_halted());
        assert_eq!(a.run_decision_cycle().unwrap().decision, Decision::Nothing);
    }

    #[test]
    fn o_reject_withdraws_persistent_value() {
        let mut a = agent();
        let s1 = a.top_goal();
        let (go, yes, flag, on) = (
            a.intern("go").unwrap(),
            a.intern("yes").unwrap(),
            a.intern("flag").unwrap(),
            a.intern("on").unwrap(),
        );
        a.add_production(
            Production::new("set-flag")
                .with_support(SupportMode::OSupport)
                .when(Condition::positive(Test::var("s"), Test::constant(go), Test::constant(yes)))
                .then(Action::make(RhsValue::var("s"), RhsValue::Constant(flag), RhsValue::Constant(on))),
        )
        .unwrap();
        a.add_wme(s1, go, yes, false).unwrap();
        a.elaborate_to_quiescence().unwrap();
        assert_eq!(a.find_wme(s1, flag, on).map(|r| r.support), Some(Support::OSupported));

        a.add_production(
            Production::new("clear-flag")
                .with_support(SupportMode::OSupport)
                .when(Condition::positive(Test::var("s"), Test::constant(flag), Test::constant(on)))
                .then(Action::prefer(
                    RhsValue::var("s"),
                    RhsValue::Constant(flag),
                    RhsValue::Constant(on),
                    PreferenceType::Reject,
                    None,
                )),
        )
        .unwrap();
        a.elaborate_to_quiescence().unwrap();
        assert!(a.find_wme(s1, flag, on).is_none());
        assert!(a.slot_preferences(s1, flag).is_empty());
    }

    #[test]
    fn o_reject_withdraws_instantiated_value() {
        let mut a = agent();
        let s1 = a.top_goal();
        let (go, yes, flag, on) = (
            a.intern("go").unwrap(),
            a.intern("yes").unwrap(),
            a.intern("flag").unwrap(),
            a.intern("on").unwrap(),
        );
        a.add_production(
            Production::new("set-flag")
                .with_support(SupportMode::ISupport)
                .when(Condition::positive(Test::var("s"), Test::constant(go), Test::constant(yes)))
                .then(Action::make(RhsValue::var("s"), RhsValue::Constant(flag), RhsValue::Constant(on))),
        )
        .unwrap();
        a.add_wme(s1, go, yes, false).unwrap();
        a.elaborate_to_quiescence().unwrap();
        assert_eq!(a.find_wme(s1, flag, on).map(|r| r.support), Some(Support::ISupported));

        a.add_production(
            Production::new("clear-flag")
                .with_support(SupportMode::OSupport)
                .when(Condition::positive(Test::var("s"), Test::constant(flag), Test::constant(on)))
                .then(Action::prefer(
                    RhsValue::var("s"),
                    RhsValue::Constant(flag),
                    RhsValue::Constant(on),
                    PreferenceType::Reject,
                    None,
                )),
        )
        .unwrap();
        a.elaborate_to_quiescence().unwrap();
        assert!(a.find_wme(s1, flag, on).is_none());
        assert!(a.slot_preferences(s1, flag).is_empty());
        // The proposing match is still live and does not fire again.
        a.elaborate_to_quiescence().unwrap();
        assert!(a.find_wme(s1, flag, on).is_none());
    }

    #[test]
    fn replacing_a_production_by_name() {
        let mut a = agent();
        let go = a.intern("go").unwrap();
        let build = |name: &str| {
            Production::new(name).when(Condition::positive(Test::var("s"), Test::constant(go), Test::Blank))
        };
        let first = a.add_production(build("p")).unwrap();
        let second = a.add_production(build("p")).unwrap();
        assert_ne!(first, second);
        assert_eq!(a.production_id("p"), Some(second));
        assert!(a.production(first).is_none());
        assert_eq!(a.productions().count(), 1);
        a.excise("p").unwrap();
        assert!(a.excise("p").is_err());
    }
}
