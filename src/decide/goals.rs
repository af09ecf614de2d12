//! Goals and the architecture structures that describe them.

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{HekaResult, InvariantViolation};
use crate::kernel::Kernel;
use crate::memory::{SlotKey, Support, Timetag};
use crate::preference::PreferenceId;
use crate::symbol::{SymbolId, TOP_GOAL_LEVEL};

use super::{ArchSymbols, Decider, ImpasseType};

/// A goal on the stack.
#[derive(Debug, Clone, Serialize)]
pub struct GoalInfo {
    pub id: SymbolId,
    pub level: u32,
    pub superstate: Option<SymbolId>,
    /// Impasse the goal was created for. `None` for the top goal.
    pub impasse: ImpasseType,
    /// `operator` or `state`; absent for the top goal.
    pub attribute: Option<SymbolId>,
    pub items: Vec<SymbolId>,
    #[serde(skip)]
    arch_wmes: Vec<Timetag>,
    #[serde(skip)]
    item_wmes: IndexMap<SymbolId, Timetag>,
    #[serde(skip)]
    item_count: Option<Timetag>,
}

impl GoalInfo {
    fn new(id: SymbolId, level: u32) -> Self {
        Self {
            id,
            level,
            superstate: None,
            impasse: ImpasseType::None,
            attribute: None,
            items: Vec::new(),
            arch_wmes: Vec::new(),
            item_wmes: IndexMap::new(),
            item_count: None,
        }
    }
}

/// `(S1 ^type state)` and `(S1 ^superstate nil)`.
pub(super) fn create_top_goal(kernel: &mut Kernel, arch: &ArchSymbols) -> HekaResult<GoalInfo> {
    let id = kernel.symbols.new_identifier('S', TOP_GOAL_LEVEL)?;
    kernel.symbols.set_goal(id, true)?;
    kernel.memory.slot_or_create(SlotKey::new(id, arch.operator), true);
    let mut info = GoalInfo::new(id, TOP_GOAL_LEVEL);
    for (attr, value) in [(arch.type_attr, arch.state), (arch.superstate, arch.nil)] {
        let w = kernel.add_wme(id, attr, value, false, Support::Architecture, None)?;
        info.arch_wmes.push(w.timetag);
    }
    tracing::info!(goal = %kernel.symbols.display(id), "top goal created");
    Ok(info)
}

/// Make the `^item` WMEs match `items` and refresh `^item-count`.
fn sync_items(arch: &ArchSymbols, kernel: &mut Kernel, info: &mut GoalInfo, items: &[SymbolId]) -> HekaResult<()> {
    let stale: Vec<SymbolId> = info
        .item_wmes
        .keys()
        .filter(|v| !items.contains(v))
        .copied()
        .collect();
    for value in stale {
        if let Some(tt) = info.item_wmes.shift_remove(&value) {
            kernel.remove_wme(tt)?;
        }
    }
    for &value in items {
        if !info.item_wmes.contains_key(&value) {
            let w = kernel.add_wme(info.id, arch.item, value, false, Support::Architecture, None)?;
            info.item_wmes.insert(value, w.timetag);
        }
    }

    let count = kernel.symbols.intern_int(items.len() as i64)?;
    let current = info
        .item_count
        .and_then(|tt| kernel.memory.get(tt))
        .map(|r| r.wme.value);
    if current != Some(count) {
        if let Some(tt) = info.item_count.take() {
            kernel.remove_wme(tt)?;
        }
        let w = kernel.add_wme(info.id, arch.item_count, count, false, Support::Architecture, None)?;
        info.item_count = Some(w.timetag);
    }
    info.items = items.to_vec();
    Ok(())
}

impl Decider {
    /// Push a substate for an impasse on the goal at `parent`.
    pub(super) fn create_substate(
        &mut self,
        kernel: &mut Kernel,
        parent: usize,
        impasse: ImpasseType,
        attribute: SymbolId,
        items: &[SymbolId],
    ) -> HekaResult<SymbolId> {
        let arch = self.arch;
        let (superstate, level) = match self.goals.get(parent) {
            Some(g) => (g.id, g.level + 1),
            None => {
                return Err(InvariantViolation::UnknownGoal {
                    goal: format!("#{parent}"),
                }
                .into());
            }
        };
        let id = kernel.symbols.new_identifier('S', level)?;
        kernel.symbols.set_goal(id, true)?;
        kernel.memory.slot_or_create(SlotKey::new(id, arch.operator), true);

        let impasse_value = kernel.symbols.intern_str(impasse.name())?;
        let choices_value = kernel.symbols.intern_str(impasse.choices())?;
        let mut info = GoalInfo {
            superstate: Some(superstate),
            impasse,
            attribute: Some(attribute),
            ..GoalInfo::new(id, level)
        };
        for (attr, value) in [
            (arch.type_attr, arch.state),
            (arch.superstate, superstate),
            (arch.impasse, impasse_value),
            (arch.choices, choices_value),
            (arch.attribute, attribute),
        ] {
            let w = kernel.add_wme(id, attr, value, false, Support::Architecture, None)?;
            info.arch_wmes.push(w.timetag);
        }
        sync_items(&arch, kernel, &mut info, items)?;
        self.goals.push(info);

        tracing::info!(
            goal = %kernel.symbols.display(id),
            superstate = %kernel.symbols.display(superstate),
            %impasse,
            attribute = %kernel.symbols.display(attribute),
            items = items.len(),
            "impasse"
        );
        Ok(id)
    }

    pub(super) fn update_items(&mut self, kernel: &mut Kernel, idx: usize, items: &[SymbolId]) -> HekaResult<()> {
        let arch = self.arch;
        let info = self.goals.get_mut(idx).ok_or_else(|| InvariantViolation::UnknownGoal {
            goal: format!("#{idx}"),
        })?;
        if info.items == items {
            return Ok(());
        }
        sync_items(&arch, kernel, info, items)?;
        tracing::debug!(goal = %kernel.symbols.display(info.id), items = items.len(), "impasse items updated");
        Ok(())
    }

    /// Remove the goal at `idx` and every goal below it, deepest first. The
    /// top goal is never removed.
    pub(super) fn remove_goals_from(&mut self, kernel: &mut Kernel, idx: usize) -> HekaResult<()> {
        while self.goals.len() > idx.max(1) {
            let Some(info) = self.goals.pop() else {
                break;
            };
            self.remove_goal(kernel, info)?;
        }
        if self.highest_changed.is_some_and(|h| h >= self.goals.len()) {
            self.highest_changed = self.goals.len().checked_sub(1);
        }
        Ok(())
    }

    fn remove_goal(&mut self, kernel: &mut Kernel, info: GoalInfo) -> HekaResult<()> {
        let goal = info.id;
        kernel.gds.drop_goal(goal);
        kernel.doomed_goals.shift_remove(&goal);

        let owned: Vec<PreferenceId> = kernel
            .preferences
            .iter()
            .filter(|p| p.goal == Some(goal))
            .map(|p| p.id)
            .collect();
        for id in owned {
            kernel.remove_preference(id);
        }

        let key = SlotKey::new(goal, self.arch.operator);
        let slot_wmes: Vec<Timetag> = kernel
            .memory
            .slot(key)
            .map(|s| s.wmes.iter().chain(s.acceptable_wmes.iter()).copied().collect())
            .unwrap_or_default();
        for tt in slot_wmes {
            kernel.remove_wme(tt)?;
        }
        for tt in info
            .arch_wmes
            .iter()
            .chain(info.item_wmes.values())
            .chain(info.item_count.iter())
        {
            kernel.remove_wme(*tt)?;
        }
        kernel.memory.drop_slot(key);
        kernel.changed_slots.shift_remove(&key);
        kernel.symbols.set_goal(goal, false)?;

        tracing::info!(goal = %kernel.symbols.display(goal), level = info.level, "goal removed");
        Ok(())
    }
}
