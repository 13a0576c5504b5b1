use crate::ecs::ComponentGroup;

/// Execution order key. Lower values run earlier.
pub type Priority = i32;

/// Metadata describing when a system runs and which entities it sees.
///
/// A system with a target group is invoked with every entity group whose
/// component set contains the target. A system without one is a general
/// system and runs once per tick with no matched groups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemDescriptor {
    name: String,
    priority: Priority,
    target: Option<ComponentGroup>,
}

impl SystemDescriptor {
    /// Create a general system descriptor with priority 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            target: None,
        }
    }

    /// Set the execution priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Restrict the system to entities that have every component of `target`.
    pub fn with_target(mut self, target: ComponentGroup) -> Self {
        self.target = Some(target);
        self
    }

    /// Unique system name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Component group the system iterates, `None` for general systems.
    pub fn target(&self) -> Option<&ComponentGroup> {
        self.target.as_ref()
    }

    pub fn is_general(&self) -> bool {
        self.target.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::ComponentRegistry;

    #[derive(Default)]
    struct Marker;

    #[test]
    fn builder_sets_fields() {
        let registry = ComponentRegistry::new();
        let marker = registry.register::<Marker>();
        let descriptor = SystemDescriptor::new("physics")
            .with_priority(-5)
            .with_target(ComponentGroup::of(&[marker]));
        assert_eq!(descriptor.name(), "physics");
        assert_eq!(descriptor.priority(), -5);
        assert!(!descriptor.is_general());
        assert!(SystemDescriptor::new("tick").is_general());
    }
}
