//! Ordered extension registry and per-event call plan.
//!
//! Extensions are kept sorted by ascending priority (stable, so equal
//! priorities keep registration order). The call plan groups, for each
//! event kind, the extensions handling it into priority bands.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::{CommandSpec, DynExtension, ExtensionSlot};
use crate::config_err;
use crate::error::Result;
use crate::event::EventKind;

/// Number of priority levels; valid priorities are `0..PRIORITY_LEVELS`.
pub const PRIORITY_LEVELS: i32 = 64;

/// Extensions sharing one priority, bound for one event kind.
#[derive(Debug, Clone)]
pub struct Band {
    pub priority: i32,
    pub slots: Vec<Arc<ExtensionSlot>>,
}

impl Band {
    pub fn names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.name().to_string()).collect()
    }
}

/// Event kind -> non-empty priority bands in ascending priority order.
#[derive(Debug, Clone, Default)]
pub struct CallPlan {
    bands: BTreeMap<EventKind, Vec<Band>>,
}

impl CallPlan {
    /// Build from slots already sorted by priority.
    pub fn build(slots: &[Arc<ExtensionSlot>]) -> Self {
        let mut bands = BTreeMap::new();
        for kind in EventKind::ALL {
            let mut by_priority: Vec<Vec<Arc<ExtensionSlot>>> =
                vec![Vec::new(); PRIORITY_LEVELS as usize];
            for slot in slots.iter().filter(|s| s.handles(kind)) {
                by_priority[slot.priority() as usize].push(slot.clone());
            }

            let kind_bands: Vec<Band> = by_priority
                .into_iter()
                .enumerate()
                .filter(|(_, slots)| !slots.is_empty())
                .map(|(priority, slots)| Band {
                    priority: priority as i32,
                    slots,
                })
                .collect();
            if !kind_bands.is_empty() {
                bands.insert(kind, kind_bands);
            }
        }
        Self { bands }
    }

    /// All bands for `kind`, regardless of lifecycle state.
    pub fn bands(&self, kind: EventKind) -> &[Band] {
        self.bands.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Bands for `kind` restricted to enabled extensions, empty bands dropped.
    pub fn active_bands(&self, kind: EventKind) -> Vec<Band> {
        self.bands(kind)
            .iter()
            .filter_map(|band| {
                let slots: Vec<_> = band
                    .slots
                    .iter()
                    .filter(|s| s.is_enabled())
                    .cloned()
                    .collect();
                (!slots.is_empty()).then_some(Band {
                    priority: band.priority,
                    slots,
                })
            })
            .collect()
    }

    /// Plain description of the plan, comparable across rebuilds.
    pub fn layout(&self) -> BTreeMap<EventKind, Vec<(i32, Vec<String>)>> {
        self.bands
            .iter()
            .map(|(kind, bands)| {
                let bands = bands.iter().map(|b| (b.priority, b.names())).collect();
                (*kind, bands)
            })
            .collect()
    }
}

/// Registry of extensions in priority order.
#[derive(Default)]
pub struct ExtensionRegistry {
    slots: RwLock<Vec<Arc<ExtensionSlot>>>,
    plan: RwLock<Arc<CallPlan>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register with the extension's default priority.
    pub fn register(&self, extension: DynExtension) -> Result<Arc<ExtensionSlot>> {
        let priority = extension.metadata().priority;
        self.register_with_priority(extension, priority)
    }

    /// Register with an explicit priority.
    pub fn register_with_priority(
        &self,
        extension: DynExtension,
        priority: i32,
    ) -> Result<Arc<ExtensionSlot>> {
        let name = extension.metadata().name.clone();
        validate_declaration(&name, &extension, priority)?;

        let slot = Arc::new(ExtensionSlot::new(extension, priority));
        {
            let mut slots = self.slots.write();
            if slots.iter().any(|s| s.name() == name) {
                return Err(config_err!(
                    format!("extensions.{}", name),
                    "Extension `{}` is already registered",
                    name
                ));
            }
            slots.push(slot.clone());
            slots.sort_by_key(|s| s.priority());
        }
        self.rebuild();

        info!(extension = %name, priority, "Extension registered");
        Ok(slot)
    }

    /// Recompute the call plan from the current extension set.
    pub fn rebuild(&self) {
        let plan = CallPlan::build(&self.slots.read());
        *self.plan.write() = Arc::new(plan);
    }

    pub fn plan(&self) -> Arc<CallPlan> {
        self.plan.read().clone()
    }

    /// Slots in priority order.
    pub fn slots(&self) -> Vec<Arc<ExtensionSlot>> {
        self.slots.read().clone()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Look up by 1-based position or by name.
    pub fn resolve(&self, reference: &str) -> Option<Arc<ExtensionSlot>> {
        let slots = self.slots.read();
        if let Ok(index) = reference.parse::<usize>() {
            return index
                .checked_sub(1)
                .and_then(|i| slots.get(i))
                .cloned();
        }
        slots.iter().find(|s| s.name() == reference).cloned()
    }

    /// First extension in priority order implementing `command`.
    pub fn command_owner(&self, command: &str) -> Option<(Arc<ExtensionSlot>, CommandSpec)> {
        self.slots.read().iter().find_map(|slot| {
            slot.command(command)
                .cloned()
                .map(|spec| (slot.clone(), spec))
        })
    }
}

fn validate_declaration(name: &str, extension: &DynExtension, priority: i32) -> Result<()> {
    if !(0..PRIORITY_LEVELS).contains(&priority) {
        return Err(config_err!(
            format!("extensions.{}.priority", name),
            "Priority should be in [0, {}), got {}",
            PRIORITY_LEVELS,
            priority
        ));
    }

    let mut events = HashSet::new();
    for kind in extension.events() {
        if !events.insert(*kind) {
            return Err(config_err!(
                format!("extensions.{}", name),
                "Event {} is declared twice",
                kind
            ));
        }
    }

    let mut commands = HashSet::new();
    for command in extension.commands() {
        if !commands.insert(command.name.as_str()) {
            return Err(config_err!(
                format!("extensions.{}", name),
                "Command {} is declared twice",
                command.name
            ));
        }
    }
    Ok(())
}
