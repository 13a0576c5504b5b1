// system_scheduler.rs - Priority-ordered system lists
//
// Each list is kept sorted by priority; systems with equal priority keep
// their registration order. Entries carry a liveness flag shared with their
// `SystemOwner` and are pruned when the list is next modified or run.

use crate::ecs::{SystemDescriptor, SystemId, SystemOwner, SystemRegistrationError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) struct ScheduledSystem<S: ?Sized> {
    pub id: SystemId,
    pub descriptor: SystemDescriptor,
    alive: Arc<AtomicBool>,
    pub system: Box<S>,
}

impl<S: ?Sized> ScheduledSystem<S> {
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

pub(crate) struct SystemList<S: ?Sized> {
    kind: &'static str,
    entries: Vec<ScheduledSystem<S>>,
}

impl<S: ?Sized> SystemList<S> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Insert after every entry with a priority less than or equal to the new one.
    pub fn insert(
        &mut self,
        id: SystemId,
        descriptor: SystemDescriptor,
        system: Box<S>,
    ) -> Result<SystemOwner, SystemRegistrationError> {
        self.prune();

        if descriptor.target().is_some_and(|target| target.is_empty()) {
            return Err(SystemRegistrationError::EmptyTarget {
                name: descriptor.name().to_string(),
            });
        }
        if self.entries.iter().any(|e| e.descriptor.name() == descriptor.name()) {
            return Err(SystemRegistrationError::DuplicateName {
                name: descriptor.name().to_string(),
            });
        }

        let index = self
            .entries
            .partition_point(|e| e.descriptor.priority() <= descriptor.priority());
        tracing::debug!(
            kind = self.kind,
            system = descriptor.name(),
            priority = descriptor.priority(),
            target = ?descriptor.target(),
            position = index,
            "registered system"
        );

        let alive = Arc::new(AtomicBool::new(true));
        self.entries.insert(
            index,
            ScheduledSystem {
                id,
                descriptor,
                alive: alive.clone(),
                system,
            },
        );
        Ok(SystemOwner::new(id, alive))
    }

    /// Drop entries whose owner is gone, returning their names.
    pub fn prune(&mut self) -> Vec<String> {
        let mut removed = Vec::new();
        let kind = self.kind;
        self.entries.retain(|entry| {
            if entry.is_alive() {
                return true;
            }
            tracing::debug!(kind, system = entry.descriptor.name(), "pruned system");
            removed.push(entry.descriptor.name().to_string());
            false
        });
        removed
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut ScheduledSystem<S>> {
        self.entries.iter_mut()
    }

    /// Descriptors in execution order, including entries awaiting pruning.
    pub fn descriptors(&self) -> impl Iterator<Item = &SystemDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    /// Registered systems whose owner is still alive.
    pub fn live_len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_alive()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named {
        fn label(&self) -> &'static str;
    }

    struct Label(&'static str);

    impl Named for Label {
        fn label(&self) -> &'static str {
            self.0
        }
    }

    fn add(
        list: &mut SystemList<dyn Named>,
        id: u32,
        name: &'static str,
        priority: i32,
    ) -> SystemOwner {
        list.insert(
            SystemId::new(id),
            SystemDescriptor::new(name).with_priority(priority),
            Box::new(Label(name)),
        )
        .unwrap()
    }

    fn order(list: &mut SystemList<dyn Named>) -> Vec<&'static str> {
        list.entries_mut().map(|e| e.system.label()).collect()
    }

    #[test]
    fn equal_priorities_keep_insertion_order() {
        let mut list: SystemList<dyn Named> = SystemList::new("update");
        let _a = add(&mut list, 0, "a", 10);
        let _b = add(&mut list, 1, "b", 0);
        let _c = add(&mut list, 2, "c", 10);
        let _d = add(&mut list, 3, "d", 5);
        let _e = add(&mut list, 4, "e", 0);
        assert_eq!(order(&mut list), vec!["b", "e", "d", "a", "c"]);
    }

    #[test]
    fn dropped_owner_is_pruned() {
        let mut list: SystemList<dyn Named> = SystemList::new("update");
        let a = add(&mut list, 0, "a", 0);
        let _b = add(&mut list, 1, "b", 1);
        drop(a);
        assert_eq!(list.live_len(), 1);
        assert_eq!(list.prune(), vec!["a".to_string()]);
        assert_eq!(order(&mut list), vec!["b"]);
    }

    #[test]
    fn names_are_unique_among_live_systems() {
        let mut list: SystemList<dyn Named> = SystemList::new("draw");
        let first = add(&mut list, 0, "hud", 0);
        let duplicate = list.insert(
            SystemId::new(1),
            SystemDescriptor::new("hud"),
            Box::new(Label("hud")),
        );
        assert_eq!(
            duplicate.err(),
            Some(SystemRegistrationError::DuplicateName { name: "hud".into() })
        );

        drop(first);
        assert!(list
            .insert(SystemId::new(2), SystemDescriptor::new("hud"), Box::new(Label("hud")))
            .is_ok());
    }

    #[test]
    fn empty_target_is_rejected() {
        let mut list: SystemList<dyn Named> = SystemList::new("update");
        let result = list.insert(
            SystemId::new(0),
            SystemDescriptor::new("nothing").with_target(crate::ecs::ComponentGroup::new()),
            Box::new(Label("nothing")),
        );
        assert!(matches!(
            result,
            Err(SystemRegistrationError::EmptyTarget { .. })
        ));
    }
}
