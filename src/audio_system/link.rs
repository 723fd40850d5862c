/// Owner links
///
/// Couples handles to the lifecycle of external owner objects. The registry
/// only stores the mapping and decides the reaction; the engine applies it.
use std::collections::HashMap;
use std::fmt;

use super::handle::HandleId;

/// Identity of an external object whose lifecycle drives linked handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// Lifecycle notifications from the owner's host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerEvent {
    Enabled,
    Disabled,
    Destroyed,
}

/// What a linked handle does when its owner changes state.
///
/// Every behaviour stops the handle when the owner is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkBehaviour {
    #[default]
    StopOnDestroy,
    StopOnDisable,
    PlayOnEnable,
    RestartOnEnable,
    PauseOnDisable,
    PauseOnDisableUnPauseOnEnable,
    PauseOnDisableRestartOnEnable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkAction {
    Play,
    Restart,
    UnPause,
    Pause,
    Stop,
}

impl LinkBehaviour {
    pub(crate) fn reaction(self, event: OwnerEvent) -> Option<LinkAction> {
        use LinkBehaviour::*;

        match event {
            OwnerEvent::Enabled => match self {
                PlayOnEnable => Some(LinkAction::Play),
                RestartOnEnable | PauseOnDisableRestartOnEnable => Some(LinkAction::Restart),
                PauseOnDisableUnPauseOnEnable => Some(LinkAction::UnPause),
                StopOnDestroy | StopOnDisable | PauseOnDisable => None,
            },
            OwnerEvent::Disabled => match self {
                StopOnDisable => Some(LinkAction::Stop),
                PauseOnDisable | PauseOnDisableUnPauseOnEnable | PauseOnDisableRestartOnEnable => {
                    Some(LinkAction::Pause)
                }
                StopOnDestroy | PlayOnEnable | RestartOnEnable => None,
            },
            OwnerEvent::Destroyed => Some(LinkAction::Stop),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LinkEntry {
    handle: HandleId,
    behaviour: LinkBehaviour,
}

#[derive(Debug, Default)]
pub(crate) struct LinkRegistry {
    owners: HashMap<OwnerId, Vec<LinkEntry>>,
}

impl LinkRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Link or re-link; returns true when the pair is new
    pub(crate) fn link(&mut self, owner: OwnerId, handle: HandleId, behaviour: LinkBehaviour) -> bool {
        let entries = self.owners.entry(owner).or_default();
        match entries.iter_mut().find(|entry| entry.handle == handle) {
            Some(entry) => {
                entry.behaviour = behaviour;
                false
            }
            None => {
                entries.push(LinkEntry { handle, behaviour });
                true
            }
        }
    }

    pub(crate) fn unlink(&mut self, owner: OwnerId, handle: HandleId) -> bool {
        let Some(entries) = self.owners.get_mut(&owner) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.handle != handle);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.owners.remove(&owner);
        }
        removed
    }

    /// Snapshot of an owner's links in link order
    pub(crate) fn entries(&self, owner: OwnerId) -> Vec<(HandleId, LinkBehaviour)> {
        self.owners
            .get(&owner)
            .map(|entries| entries.iter().map(|e| (e.handle, e.behaviour)).collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn behaviour(&self, owner: OwnerId, handle: HandleId) -> Option<LinkBehaviour> {
        self.owners
            .get(&owner)?
            .iter()
            .find(|entry| entry.handle == handle)
            .map(|entry| entry.behaviour)
    }

    pub(crate) fn remove_owner(&mut self, owner: OwnerId) {
        self.owners.remove(&owner);
    }

    /// Drop every link of a handle that has ended
    pub(crate) fn remove_handle(&mut self, handle: HandleId) {
        self.owners.retain(|_, entries| {
            entries.retain(|entry| entry.handle != handle);
            !entries.is_empty()
        });
    }

    pub(crate) fn link_count(&self) -> usize {
        self.owners.values().map(Vec::len).sum()
    }

    pub(crate) fn clear(&mut self) {
        self.owners.clear();
    }
}
