//! The behavior contract and the scheduler that drives it.
//!
//! | Module        | Contents                                                      |
//! |---------------|---------------------------------------------------------------|
//! | (this file)   | [`Behavior`] trait, [`BehaviorCore`], [`Lifecycle`], handles  |
//! | [`entry`]     | ownership-tagged [`BehaviorSource`] and the internal entry    |
//! | [`manager`]   | [`BehaviorManager`], the priority-bucketed dispatcher         |
//! | [`export`]    | write-only diagnostic view of a manager's membership          |
//!
//! Every schedulable unit implements [`Behavior`]. The manager implements it
//! too, so managers nest inside other managers as ordinary children and the
//! frame passes recurse through the tree without any special casing.
//!
//! Behaviors are shared through [`BehaviorRef`] (`Rc<RefCell<dyn Behavior>>`).
//! A manager entry either keeps one of those alive (strong) or only watches a
//! [`WeakBehaviorRef`] that may stop resolving between two frames (weak).
//! Everything here is single-threaded; a manager and its behaviors must stay
//! on the thread that drives the frame loop.

use std::{
    any::Any,
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{FrameTime, Result};

pub mod entry;
pub mod export;
pub mod manager;

pub use entry::{BehaviorSource, EntryId};
pub use export::PriorityGroup;
pub use manager::{BehaviorFilter, BehaviorHandle, BehaviorManager};

/// Dispatch rank. Higher values run earlier within a frame pass.
pub type Priority = i32;

/// Shared, single-threaded handle to any behavior.
pub type BehaviorRef = Rc<RefCell<dyn Behavior>>;

/// Non-owning handle to a behavior; resolves only while someone else keeps
/// the behavior alive.
pub type WeakBehaviorRef = Weak<RefCell<dyn Behavior>>;

/// Wraps a concrete behavior into a shared handle. The typed handle coerces
/// into a [`BehaviorRef`] wherever one is expected.
pub fn shared<B: Behavior>(behavior: B) -> Rc<RefCell<B>> {
    Rc::new(RefCell::new(behavior))
}

/// Compares two handles by the behavior they point at.
pub fn same_behavior(a: &BehaviorRef, b: &BehaviorRef) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

/// Process-unique behavior identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BehaviorId(Uuid);

impl BehaviorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BehaviorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BehaviorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The four independent flags that gate which hooks fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    /// Update and draw-family passes are skipped while false.
    pub active: bool,
    /// Only the update pass is skipped while true.
    pub stasis: bool,
    pub initialized: bool,
    pub content_loaded: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            active: true,
            stasis: false,
            initialized: false,
            content_loaded: false,
        }
    }
}

/// State every behavior carries: identity, display name, declared priority,
/// lifecycle flags, and the lazily created child manager.
pub struct BehaviorCore {
    id: BehaviorId,
    name: String,
    priority: Priority,
    pub lifecycle: Lifecycle,
    children: Option<Box<BehaviorManager>>,
}

impl BehaviorCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: BehaviorId::new(),
            name: name.into(),
            priority: 0,
            lifecycle: Lifecycle::default(),
            children: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn id(&self) -> BehaviorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Changes the declared priority. Managers that already registered the
    /// behavior keep the priority they captured.
    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// Child manager, created on first access.
    pub fn children(&mut self) -> &mut BehaviorManager {
        self.children.get_or_insert_with(Box::default)
    }

    pub fn has_children(&self) -> bool {
        self.children.as_ref().is_some_and(|c| !c.is_empty())
    }
}

impl fmt::Debug for BehaviorCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("lifecycle", &self.lifecycle)
            .field("children", &self.children.as_ref().map_or(0, |c| c.len()))
            .finish()
    }
}

/// Type-erasure helper so `tryFind`-style lookups can downcast trait
/// objects back to their concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Pluggable frame-loop component.
///
/// Only [`core`][Self::core] and [`core_mut`][Self::core_mut] are required.
/// Flag accessors, the idempotent `*_if_needed` wrappers and every hook have
/// defaults, so a behavior overrides just the hooks it cares about.
///
/// Hooks return [`Result`]. An `Err` (or a panic) raised while a manager is
/// dispatching is logged by that manager and never reaches the frame driver.
///
/// Overrides of [`load_content`][Self::load_content] and
/// [`unload_content`][Self::unload_content] do not need to touch the
/// `content_loaded` flag: the wrappers record the new state once the hook
/// succeeds.
///
/// # Example
///
/// ```rust
/// use tabviz_core::{Behavior, BehaviorCore, FrameTime, Result};
///
/// struct Metronome {
///     core: BehaviorCore,
///     beats: u32,
/// }
///
/// impl Behavior for Metronome {
///     fn core(&self) -> &BehaviorCore { &self.core }
///     fn core_mut(&mut self) -> &mut BehaviorCore { &mut self.core }
///
///     fn update(&mut self, _time: &FrameTime) -> Result<()> {
///         self.beats += 1;
///         Ok(())
///     }
/// }
/// ```
pub trait Behavior: AsAny {
    fn core(&self) -> &BehaviorCore;
    fn core_mut(&mut self) -> &mut BehaviorCore;

    fn id(&self) -> BehaviorId {
        self.core().id()
    }

    fn name(&self) -> &str {
        self.core().name()
    }

    fn priority(&self) -> Priority {
        self.core().priority()
    }

    fn is_active(&self) -> bool {
        self.core().lifecycle.active
    }

    fn set_active(&mut self, active: bool) {
        self.core_mut().lifecycle.active = active;
    }

    fn in_stasis(&self) -> bool {
        self.core().lifecycle.stasis
    }

    fn set_stasis(&mut self, stasis: bool) {
        self.core_mut().lifecycle.stasis = stasis;
    }

    fn is_initialized(&self) -> bool {
        self.core().lifecycle.initialized
    }

    fn is_content_loaded(&self) -> bool {
        self.core().lifecycle.content_loaded
    }

    /// Manager for child behaviors hosted by this one.
    fn behaviors(&mut self) -> &mut BehaviorManager {
        self.core_mut().children()
    }

    /// Called when first registered with a manager. Calling it again resets
    /// the behavior.
    fn initialize(&mut self) -> Result<()> {
        self.core_mut().lifecycle.initialized = true;
        Ok(())
    }

    fn initialize_if_needed(&mut self) -> Result<()> {
        if !self.is_initialized() {
            self.initialize()?;
            self.core_mut().lifecycle.initialized = true;
        }
        Ok(())
    }

    fn load_content(&mut self) -> Result<()> {
        self.core_mut().lifecycle.content_loaded = true;
        Ok(())
    }

    fn load_content_if_needed(&mut self) -> Result<()> {
        if !self.is_content_loaded() {
            self.load_content()?;
            self.core_mut().lifecycle.content_loaded = true;
        }
        Ok(())
    }

    fn unload_content(&mut self) -> Result<()> {
        self.core_mut().lifecycle.content_loaded = false;
        Ok(())
    }

    fn unload_content_if_needed(&mut self) -> Result<()> {
        if self.is_content_loaded() {
            self.unload_content()?;
            self.core_mut().lifecycle.content_loaded = false;
        }
        Ok(())
    }

    /// Once per logical frame. State and simulation only, no drawing.
    fn update(&mut self, _time: &FrameTime) -> Result<()> {
        Ok(())
    }

    /// Once per logical frame, after every behavior has run `update`.
    fn late_update(&mut self, _time: &FrameTime) -> Result<()> {
        Ok(())
    }

    /// Once per visual frame.
    fn draw(&mut self, _time: &FrameTime) -> Result<()> {
        Ok(())
    }

    /// Once per visual frame, after `draw`, for overlay output.
    fn draw_gui(&mut self, _time: &FrameTime) -> Result<()> {
        Ok(())
    }

    /// After the frame has been presented.
    fn end_draw(&mut self) -> Result<()> {
        Ok(())
    }
}
