// system.rs - System traits and the groups handed to them
//
// Update systems get the container mutably and may create, destroy or
// mutate entities. Draw systems only ever see `&EntityContainer`, so they
// cannot change entity state. Closures with the matching signature are
// systems too.

use crate::ecs::{ComponentGroup, EntityContainer, EntityGroup};

/// Entity groups matched for one system invocation.
///
/// Resolved right before the system runs, so it reflects groups created by
/// earlier systems in the same tick.
#[derive(Debug, Default, Clone)]
pub struct MatchedGroups {
    indices: Vec<usize>,
}

impl MatchedGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn resolve(&mut self, container: &EntityContainer, target: Option<&ComponentGroup>) {
        match target {
            Some(target) => container.matching_groups(target, &mut self.indices),
            None => self.indices.clear(),
        }
    }

    /// Container group indices, ascending.
    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Matched groups with their container index.
    pub fn groups<'c>(
        &'c self,
        container: &'c EntityContainer,
    ) -> impl Iterator<Item = (usize, &'c EntityGroup)> + 'c {
        self.indices
            .iter()
            .filter_map(move |&index| container.group(index).map(|group| (index, group)))
    }

    /// Run `f` on every matched group mutably.
    pub fn for_each_mut(
        &self,
        container: &mut EntityContainer,
        mut f: impl FnMut(usize, &mut EntityGroup),
    ) {
        for &index in &self.indices {
            if let Some(group) = container.group_mut(index) {
                f(index, group);
            }
        }
    }

    /// Total rows across every matched group.
    pub fn row_count(&self, container: &EntityContainer) -> usize {
        self.groups(container).map(|(_, group)| group.len()).sum()
    }
}

/// A mutating system, run by `EntityComponentSystem::run_update`.
pub trait UpdateSystem<C> {
    fn update(&mut self, context: &mut C, container: &mut EntityContainer, groups: &MatchedGroups);
}

/// A read-only system, run by `EntityComponentSystem::run_draw`.
pub trait DrawSystem<C> {
    fn draw(&mut self, context: &mut C, container: &EntityContainer, groups: &MatchedGroups);
}

impl<C, F> UpdateSystem<C> for F
where
    F: FnMut(&mut C, &mut EntityContainer, &MatchedGroups),
{
    fn update(&mut self, context: &mut C, container: &mut EntityContainer, groups: &MatchedGroups) {
        self(context, container, groups)
    }
}

impl<C, F> DrawSystem<C> for F
where
    F: FnMut(&mut C, &EntityContainer, &MatchedGroups),
{
    fn draw(&mut self, context: &mut C, container: &EntityContainer, groups: &MatchedGroups) {
        self(context, container, groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::ComponentRegistry;

    #[derive(Default)]
    struct Health(u32);

    #[derive(Default)]
    struct Armor(#[allow(dead_code)] u32);

    #[test]
    fn resolve_matches_supersets_only() {
        let registry = ComponentRegistry::new();
        let health = registry.register::<Health>();
        let armor = registry.register::<Armor>();
        let mut container = EntityContainer::new();
        container.create_entity(&ComponentGroup::of(&[armor])).unwrap();
        container.create_entity(&ComponentGroup::of(&[health, armor])).unwrap();
        container.create_entity(&ComponentGroup::of(&[health])).unwrap();

        let mut matched = MatchedGroups::new();
        matched.resolve(&container, Some(&ComponentGroup::of(&[health])));
        assert_eq!(matched.indices(), &[1, 2]);
        assert_eq!(matched.row_count(&container), 2);

        matched.resolve(&container, None);
        assert!(matched.is_empty());
    }

    #[test]
    fn closures_are_systems() {
        let registry = ComponentRegistry::new();
        let health = registry.register::<Health>();
        let mut container = EntityContainer::new();
        let entity = container.create_entity(&ComponentGroup::of(&[health])).unwrap();

        let mut matched = MatchedGroups::new();
        matched.resolve(&container, Some(&ComponentGroup::of(&[health])));

        let mut heal = |amount: &mut u32, container: &mut EntityContainer, groups: &MatchedGroups| {
            groups.for_each_mut(container, |_, group| {
                for hp in group.column_slice_mut::<Health>(health.id()).unwrap() {
                    hp.0 += *amount;
                }
            });
        };
        let mut amount = 5;
        UpdateSystem::update(&mut heal, &mut amount, &mut container, &matched);
        assert_eq!(container.get_value::<Health>(entity, health.id()).0, 5);

        let mut seen = 0;
        let mut count = |total: &mut usize, container: &EntityContainer, groups: &MatchedGroups| {
            *total += groups.row_count(container);
        };
        DrawSystem::draw(&mut count, &mut seen, &container, &matched);
        assert_eq!(seen, 1);
    }
}
