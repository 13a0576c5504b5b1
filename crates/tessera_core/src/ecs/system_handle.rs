use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Identifier assigned to each registered system.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SystemId(u32);

impl SystemId {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    /// Return the raw index backing this id.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owning handle of a registered system.
///
/// Dropping the owner unregisters the system. Removal takes effect the next
/// time the scheduler touches its list, never while it is iterating.
#[must_use = "dropping a SystemOwner unregisters the system immediately"]
pub struct SystemOwner {
    id: SystemId,
    alive: Option<Arc<AtomicBool>>,
}

impl SystemOwner {
    pub(crate) fn new(id: SystemId, alive: Arc<AtomicBool>) -> Self {
        Self {
            id,
            alive: Some(alive),
        }
    }

    #[inline]
    pub fn id(&self) -> SystemId {
        self.id
    }

    /// Whether the system is still registered.
    pub fn is_registered(&self) -> bool {
        self.alive
            .as_ref()
            .is_some_and(|alive| alive.load(Ordering::Acquire))
    }

    /// Give up ownership; the system stays registered for the life of the ECS.
    pub fn detach(mut self) -> SystemId {
        self.alive = None;
        self.id
    }
}

impl Drop for SystemOwner {
    fn drop(&mut self) {
        if let Some(alive) = self.alive.take() {
            alive.store(false, Ordering::Release);
        }
    }
}

impl fmt::Debug for SystemOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemOwner")
            .field("id", &self.id)
            .field("registered", &self.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_clears_liveness() {
        let alive = Arc::new(AtomicBool::new(true));
        let owner = SystemOwner::new(SystemId::new(1), alive.clone());
        assert!(owner.is_registered());
        drop(owner);
        assert!(!alive.load(Ordering::Acquire));
    }

    #[test]
    fn detach_keeps_system_alive() {
        let alive = Arc::new(AtomicBool::new(true));
        let owner = SystemOwner::new(SystemId::new(7), alive.clone());
        assert_eq!(owner.detach().index(), 7);
        assert!(alive.load(Ordering::Acquire));
    }
}
