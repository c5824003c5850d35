use std::{
    any::TypeId,
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use uuid::Uuid;

use super::{Behavior, BehaviorRef, Priority, WeakBehaviorRef};

/// How a manager entry holds its behavior.
#[derive(Clone)]
pub enum BehaviorSource {
    /// Keeps the behavior alive for as long as the entry exists.
    Strong(BehaviorRef),
    /// Watches a behavior owned elsewhere. Stops resolving once that owner
    /// drops it.
    Weak(WeakBehaviorRef),
}

impl BehaviorSource {
    /// Returns the behavior if it is still alive. Expiry is a normal outcome,
    /// not an error.
    pub fn resolve(&self) -> Option<BehaviorRef> {
        match self {
            Self::Strong(behavior) => Some(behavior.clone()),
            Self::Weak(behavior) => behavior.upgrade(),
        }
    }

    pub fn is_weak(&self) -> bool {
        matches!(self, Self::Weak(_))
    }
}

impl fmt::Debug for BehaviorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strong(_) => f.write_str("Strong"),
            Self::Weak(weak) if weak.strong_count() == 0 => f.write_str("Weak(expired)"),
            Self::Weak(_) => f.write_str("Weak"),
        }
    }
}

impl From<BehaviorRef> for BehaviorSource {
    fn from(value: BehaviorRef) -> Self {
        Self::Strong(value)
    }
}

impl<B: Behavior> From<Rc<RefCell<B>>> for BehaviorSource {
    fn from(value: Rc<RefCell<B>>) -> Self {
        Self::Strong(value)
    }
}

impl From<WeakBehaviorRef> for BehaviorSource {
    fn from(value: WeakBehaviorRef) -> Self {
        Self::Weak(value)
    }
}

impl<B: Behavior> From<Weak<RefCell<B>>> for BehaviorSource {
    fn from(value: Weak<RefCell<B>>) -> Self {
        Self::Weak(value)
    }
}

impl From<&WeakBehaviorRef> for BehaviorSource {
    fn from(value: &WeakBehaviorRef) -> Self {
        Self::Weak(value.clone())
    }
}

/// Identity of one registration, distinct from the behavior's own id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(Uuid);

impl EntryId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// A manager's binding of a registration name and captured priority to a
/// behavior.
pub(crate) struct BehaviorEntry {
    pub id: EntryId,
    pub name: String,
    pub priority: Priority,
    pub source: BehaviorSource,
    type_id: TypeId,
    type_name: &'static str,
}

impl BehaviorEntry {
    pub fn new(
        name: String,
        priority: Priority,
        source: BehaviorSource,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Self {
        Self {
            id: EntryId::new(),
            name,
            priority,
            source,
            type_id,
            type_name,
        }
    }

    pub fn resolve(&self) -> Option<BehaviorRef> {
        self.source.resolve()
    }

    /// Concrete type recorded at registration, checked without borrowing.
    pub fn holds_type(&self, type_id: TypeId) -> bool {
        self.type_id == type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Display for BehaviorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(behavior) = self.resolve() else {
            return write!(f, "[Expired Reference][{}]", self.priority);
        };
        let Ok(behavior) = behavior.try_borrow() else {
            return write!(f, "{}[{}/Busy]", self.name, self.priority);
        };
        let state = if behavior.is_content_loaded() {
            "Loaded"
        } else {
            "Unloaded"
        };
        write!(f, "{}[{}/{}]", behavior.name(), self.priority, state)
    }
}

impl fmt::Debug for BehaviorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("source", &self.source)
            .field("type_name", &self.type_name)
            .finish()
    }
}
