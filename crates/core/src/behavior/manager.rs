//! Priority-bucketed behavior scheduler.
//!
//! Entries live in buckets keyed by their captured priority, highest first;
//! inside a bucket they keep registration order. A second index maps every
//! registration name to its bucket so lookups, removals and duplicate checks
//! never scan.
//!
//! # Fault isolation
//!
//! Every hook call is isolated on its own: an `Err` or a panic from one
//! entry is logged once and dispatch moves on to the next entry of the same
//! bucket. Nothing from a hook ever propagates to the caller of a pass.
//! Unloads triggered by removal (`remove_behavior`, `remove_except`,
//! `clear`) are isolated the same way, so a faulting unload never leaves
//! the indices half emptied.
//!
//! A caught panic still goes through the process panic hook first, so with
//! the default hook it also shows up on stderr. Install a quieter hook
//! (`std::panic::set_hook`) in hosts that want faults reported through
//! `tracing` only.
//!
//! # Re-entrancy
//!
//! Passes take `&mut self`, so a manager cannot be restructured while one of
//! its own passes is running. Reaching a manager through a shared
//! `Rc<RefCell<_>>` from inside one of its hooks is the caller's
//! responsibility; the `RefCell` rejects it and the offending hook is
//! reported as a fault.

use std::{
    any::{type_name, TypeId},
    cmp::Reverse,
    collections::{BTreeMap, HashMap},
    fmt,
    marker::PhantomData,
    panic::{self, AssertUnwindSafe},
};

use super::{
    entry::{BehaviorEntry, BehaviorSource, EntryId},
    same_behavior, Behavior, BehaviorCore, BehaviorRef, Priority, WeakBehaviorRef,
};
use crate::{FrameTime, Result, TabVizError};

/// Predicate deciding whether a behavior takes part in a pass. Returning
/// `false` skips the behavior for that pass without side effects.
pub type BehaviorFilter = Box<dyn Fn(&dyn Behavior) -> bool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    LoadContent,
    UnloadContent,
    Update,
    LateUpdate,
    Draw,
    DrawGui,
    EndDraw,
}

impl Pass {
    fn name(self) -> &'static str {
        match self {
            Self::LoadContent => "load_content",
            Self::UnloadContent => "unload_content",
            Self::Update => "update",
            Self::LateUpdate => "late_update",
            Self::Draw => "draw",
            Self::DrawGui => "draw_gui",
            Self::EndDraw => "end_draw",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    priority: Priority,
    id: EntryId,
}

/// Container that schedules behaviors and is itself a [`Behavior`].
pub struct BehaviorManager {
    core: BehaviorCore,
    buckets: BTreeMap<Reverse<Priority>, Vec<BehaviorEntry>>,
    names: HashMap<String, Slot>,
    update_filter: Option<BehaviorFilter>,
    draw_filter: Option<BehaviorFilter>,
}

impl Default for BehaviorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BehaviorManager {
    pub fn new() -> Self {
        Self {
            core: BehaviorCore::new("BehaviorManager"),
            buckets: BTreeMap::new(),
            names: HashMap::new(),
            update_filter: None,
            draw_filter: None,
        }
    }

    /// Number of registered entries, expired ones included.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Registration names in dispatch order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries().map(|entry| entry.name.as_str())
    }

    /// Resolvable behaviors in dispatch order. Expired weak entries are
    /// skipped.
    pub fn iter(&self) -> impl Iterator<Item = BehaviorRef> + '_ {
        self.entries().filter_map(BehaviorEntry::resolve)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &BehaviorEntry> + '_ {
        self.buckets.values().flatten()
    }

    pub(crate) fn buckets(&self) -> impl Iterator<Item = (Priority, &[BehaviorEntry])> + '_ {
        self.buckets
            .iter()
            .map(|(Reverse(priority), entries)| (*priority, entries.as_slice()))
    }

    pub fn set_update_filter(&mut self, filter: impl Fn(&dyn Behavior) -> bool + 'static) {
        self.update_filter = Some(Box::new(filter));
    }

    pub fn clear_update_filter(&mut self) {
        self.update_filter = None;
    }

    pub fn set_draw_filter(&mut self, filter: impl Fn(&dyn Behavior) -> bool + 'static) {
        self.draw_filter = Some(Box::new(filter));
    }

    pub fn clear_draw_filter(&mut self) {
        self.draw_filter = None;
    }

    /// Registers `source` under `name` at `priority` and initializes it if
    /// needed.
    ///
    /// A weak source that no longer resolves is skipped and the call
    /// succeeds: there is nothing to add. A name that is already taken fails
    /// with [`TabVizError::DuplicateName`] and leaves the manager untouched.
    pub fn add_behavior(
        &mut self,
        name: impl Into<String>,
        priority: Priority,
        source: impl Into<BehaviorSource>,
    ) -> Result<()> {
        let name = name.into();
        let source = source.into();
        let Some(behavior) = source.resolve() else {
            tracing::debug!(behavior = %name, "skipping registration of expired reference");
            return Ok(());
        };
        if self.names.contains_key(&name) {
            return Err(TabVizError::DuplicateName(name));
        }

        let (type_id, type_name) = {
            let mut target = behavior
                .try_borrow_mut()
                .map_err(|_| TabVizError::msg(format!("behavior `{name}` is busy")))?;
            target.initialize_if_needed()?;
            let target: &dyn Behavior = &*target;
            (target.as_any().type_id(), target.type_name())
        };

        let entry = BehaviorEntry::new(name.clone(), priority, source, type_id, type_name);
        tracing::debug!(
            behavior = %name,
            priority,
            weak = entry.source.is_weak(),
            "registered behavior"
        );
        self.names.insert(
            name,
            Slot {
                priority,
                id: entry.id,
            },
        );
        self.buckets
            .entry(Reverse(priority))
            .or_default()
            .push(entry);
        Ok(())
    }

    /// Registers under the behavior's own name and declared priority.
    pub fn add(&mut self, source: impl Into<BehaviorSource>) -> Result<()> {
        let source = source.into();
        match declared(&source)? {
            Some((name, priority)) => self.add_behavior(name, priority, source),
            None => Ok(()),
        }
    }

    /// Registers under the behavior's own name at an explicit priority.
    pub fn add_with_priority(
        &mut self,
        priority: Priority,
        source: impl Into<BehaviorSource>,
    ) -> Result<()> {
        let source = source.into();
        match declared(&source)? {
            Some((name, _)) => self.add_behavior(name, priority, source),
            None => Ok(()),
        }
    }

    /// Registers under an explicit name at the behavior's declared priority.
    pub fn add_named(
        &mut self,
        name: impl Into<String>,
        source: impl Into<BehaviorSource>,
    ) -> Result<()> {
        let source = source.into();
        match declared(&source)? {
            Some((_, priority)) => self.add_behavior(name, priority, source),
            None => Ok(()),
        }
    }

    /// Registers every source under its own name and priority, stopping at
    /// the first failure.
    pub fn add_behaviors<I>(&mut self, sources: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<BehaviorSource>,
    {
        for source in sources {
            self.add(source)?;
        }
        Ok(())
    }

    /// Removes the entry registered under `name`, unloading its behavior if
    /// it still resolves.
    ///
    /// Must not be called from inside a pass over this same manager.
    pub fn remove_behavior(&mut self, name: &str) -> Result<()> {
        let entry = self
            .detach(name)
            .ok_or_else(|| TabVizError::UnknownName(name.to_string()))?;
        tracing::debug!(behavior = %entry.name, "removed behavior");
        unload_removed(&entry);
        Ok(())
    }

    /// Removes the entry whose behavior is `behavior`. Returns whether one
    /// was found.
    pub fn remove(&mut self, behavior: &BehaviorRef) -> bool {
        let name = self
            .entries()
            .find(|entry| {
                entry
                    .resolve()
                    .is_some_and(|resolved| same_behavior(&resolved, behavior))
            })
            .map(|entry| entry.name.clone());

        match name {
            Some(name) => self.remove_behavior(&name).is_ok(),
            None => false,
        }
    }

    /// Removes the entry whose behavior `behavior` points at. A reference
    /// that already expired matches nothing.
    pub fn remove_weak(&mut self, behavior: &WeakBehaviorRef) -> bool {
        match behavior.upgrade() {
            Some(target) => self.remove(&target),
            None => false,
        }
    }

    /// Removes each behavior in turn, returning how many were found.
    pub fn remove_behaviors<'a, I>(&mut self, behaviors: I) -> usize
    where
        I: IntoIterator<Item = &'a BehaviorRef>,
    {
        behaviors
            .into_iter()
            .filter(|behavior| self.remove(behavior))
            .count()
    }

    /// Removes everything except `keep`. Expired entries go too. Passing
    /// `None` empties the manager.
    pub fn remove_except(&mut self, keep: Option<&BehaviorRef>) {
        let doomed: Vec<String> = self
            .entries()
            .filter(|entry| match (entry.resolve(), keep) {
                (Some(resolved), Some(keep)) => !same_behavior(&resolved, keep),
                _ => true,
            })
            .map(|entry| entry.name.clone())
            .collect();

        for name in doomed {
            if let Some(entry) = self.detach(&name) {
                unload_removed(&entry);
            }
        }
    }

    /// Unloads every resolvable behavior, then drops all entries.
    pub fn clear(&mut self) {
        for entry in self.entries() {
            unload_removed(entry);
        }
        self.buckets.clear();
        self.names.clear();
    }

    /// Drops entries whose weak reference expired. Live entries are not
    /// touched. Returns how many entries were dropped.
    pub fn cleanup_expired(&mut self) -> usize {
        let expired: Vec<String> = self
            .entries()
            .filter(|entry| entry.resolve().is_none())
            .map(|entry| entry.name.clone())
            .collect();

        for name in &expired {
            self.detach(name);
        }
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "pruned expired behaviors");
        }
        expired.len()
    }

    /// Every resolvable behavior of concrete type `T`, in dispatch order, or
    /// `None` when there is none.
    pub fn try_find_all<T: Behavior>(&self) -> Option<Vec<BehaviorHandle<T>>> {
        let found: Vec<_> = self
            .entries()
            .filter(|entry| entry.holds_type(TypeId::of::<T>()))
            .filter_map(BehaviorEntry::resolve)
            .map(BehaviorHandle::new)
            .collect();
        (!found.is_empty()).then_some(found)
    }

    /// The behavior registered under `name`, typed as `T`.
    pub fn try_find<T: Behavior>(&self, name: &str) -> Result<BehaviorHandle<T>> {
        let entry = self
            .entry(name)
            .ok_or_else(|| TabVizError::UnknownName(name.to_string()))?;
        let behavior = entry
            .resolve()
            .ok_or_else(|| TabVizError::Expired(name.to_string()))?;
        if !entry.holds_type(TypeId::of::<T>()) {
            tracing::debug!(
                behavior = %name,
                actual = entry.type_name(),
                "lookup type mismatch"
            );
            return Err(TabVizError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            });
        }
        Ok(BehaviorHandle::new(behavior))
    }

    /// Loads every resolvable behavior that is not loaded yet.
    pub fn load_content(&mut self) {
        self.dispatch(Pass::LoadContent, None);
    }

    /// Unloads every resolvable behavior that is loaded.
    pub fn unload_content(&mut self) {
        self.dispatch(Pass::UnloadContent, None);
    }

    /// Loads content lazily, then updates active behaviors not in stasis.
    pub fn update(&mut self, time: &FrameTime) {
        self.dispatch(Pass::Update, Some(time));
    }

    pub fn late_update(&mut self, time: &FrameTime) {
        self.dispatch(Pass::LateUpdate, Some(time));
    }

    pub fn draw(&mut self, time: &FrameTime) {
        self.dispatch(Pass::Draw, Some(time));
    }

    pub fn draw_gui(&mut self, time: &FrameTime) {
        self.dispatch(Pass::DrawGui, Some(time));
    }

    pub fn end_draw(&mut self) {
        self.dispatch(Pass::EndDraw, None);
    }

    fn entry(&self, name: &str) -> Option<&BehaviorEntry> {
        let slot = self.names.get(name)?;
        self.buckets
            .get(&Reverse(slot.priority))?
            .iter()
            .find(|entry| entry.id == slot.id)
    }

    /// Takes an entry out of both indices.
    fn detach(&mut self, name: &str) -> Option<BehaviorEntry> {
        let slot = self.names.remove(name)?;
        let key = Reverse(slot.priority);
        let bucket = self.buckets.get_mut(&key)?;
        let index = bucket.iter().position(|entry| entry.id == slot.id)?;
        let entry = bucket.remove(index);
        if bucket.is_empty() {
            self.buckets.remove(&key);
        }
        Some(entry)
    }

    fn filter_for(&self, pass: Pass) -> Option<&BehaviorFilter> {
        match pass {
            Pass::Update | Pass::LateUpdate => self.update_filter.as_ref(),
            Pass::Draw | Pass::DrawGui | Pass::EndDraw => self.draw_filter.as_ref(),
            Pass::LoadContent | Pass::UnloadContent => None,
        }
    }

    fn dispatch(&self, pass: Pass, time: Option<&FrameTime>) {
        let time = time.copied().unwrap_or_default();
        let filter = self.filter_for(pass);

        for (priority, entries) in self.buckets() {
            for entry in entries {
                let Some(behavior) = entry.resolve() else {
                    continue;
                };
                let Ok(mut target) = behavior.try_borrow_mut() else {
                    tracing::warn!(
                        behavior = %entry.name,
                        pass = pass.name(),
                        priority,
                        "behavior is already borrowed, skipping"
                    );
                    continue;
                };
                let target: &mut dyn Behavior = &mut *target;
                if let Some(filter) = filter {
                    if !filter(&*target) {
                        continue;
                    }
                }

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_hook(pass, target, &time)));
                let failure = match outcome {
                    Ok(Ok(())) => continue,
                    Ok(Err(err)) => err.to_string(),
                    Err(payload) => panic_message(&*payload),
                };
                tracing::error!(
                    behavior = %entry.name,
                    pass = pass.name(),
                    priority,
                    error = %failure,
                    "behavior hook failed"
                );
            }
        }
    }
}

fn run_hook(pass: Pass, behavior: &mut dyn Behavior, time: &FrameTime) -> Result<()> {
    match pass {
        // A nested manager reports itself loaded, so its lazy load is a no-op;
        // an explicit load pass still has to reach its members.
        Pass::LoadContent => match behavior.as_any_mut().downcast_mut::<BehaviorManager>() {
            Some(nested) => {
                nested.load_content();
                Ok(())
            }
            None => behavior.load_content_if_needed(),
        },
        Pass::UnloadContent => behavior.unload_content_if_needed(),
        Pass::Update => {
            behavior.load_content_if_needed()?;
            if behavior.is_active() && !behavior.in_stasis() {
                behavior.update(time)?;
            }
            Ok(())
        }
        Pass::LateUpdate | Pass::Draw | Pass::DrawGui | Pass::EndDraw => {
            if !behavior.is_content_loaded() || !behavior.is_active() {
                return Ok(());
            }
            match pass {
                Pass::LateUpdate => behavior.late_update(time),
                Pass::Draw => behavior.draw(time),
                Pass::DrawGui => behavior.draw_gui(time),
                _ => behavior.end_draw(),
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

/// Name and declared priority of a source, `None` when it already expired.
fn declared(source: &BehaviorSource) -> Result<Option<(String, Priority)>> {
    let Some(behavior) = source.resolve() else {
        return Ok(None);
    };
    let behavior = behavior
        .try_borrow()
        .map_err(|_| TabVizError::msg("behavior is busy and cannot be registered"))?;
    Ok(Some((behavior.name().to_string(), behavior.priority())))
}

fn unload_removed(entry: &BehaviorEntry) {
    let Some(behavior) = entry.resolve() else {
        return;
    };
    let Ok(mut target) = behavior.try_borrow_mut() else {
        tracing::error!(
            behavior = %entry.name,
            error = "behavior is already borrowed",
            "failed to unload removed behavior"
        );
        return;
    };
    let target: &mut dyn Behavior = &mut *target;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| target.unload_content_if_needed()));
    let failure = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err.to_string(),
        Err(payload) => panic_message(&*payload),
    };
    tracing::error!(behavior = %entry.name, error = %failure, "failed to unload removed behavior");
}

impl fmt::Debug for BehaviorManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorManager")
            .field("id", &self.core.id())
            .field("entries", &self.names.len())
            .field("buckets", &self.buckets.len())
            .field("update_filter", &self.update_filter.is_some())
            .field("draw_filter", &self.draw_filter.is_some())
            .finish()
    }
}

/// A manager's operability is a function of its members, so its own flags
/// are fixed: always active, never in stasis, always initialized and loaded.
impl Behavior for BehaviorManager {
    fn core(&self) -> &BehaviorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BehaviorCore {
        &mut self.core
    }

    fn is_active(&self) -> bool {
        true
    }

    fn set_active(&mut self, _active: bool) {}

    fn in_stasis(&self) -> bool {
        false
    }

    fn set_stasis(&mut self, _stasis: bool) {}

    fn is_initialized(&self) -> bool {
        true
    }

    fn is_content_loaded(&self) -> bool {
        true
    }

    fn behaviors(&mut self) -> &mut BehaviorManager {
        self
    }

    fn load_content(&mut self) -> Result<()> {
        BehaviorManager::load_content(self);
        Ok(())
    }

    /// No-op: a manager is always loaded. Its members load lazily in its own
    /// update pass, where its update filter applies.
    fn load_content_if_needed(&mut self) -> Result<()> {
        Ok(())
    }

    fn unload_content(&mut self) -> Result<()> {
        BehaviorManager::unload_content(self);
        Ok(())
    }

    fn unload_content_if_needed(&mut self) -> Result<()> {
        BehaviorManager::unload_content(self);
        Ok(())
    }

    fn update(&mut self, time: &FrameTime) -> Result<()> {
        BehaviorManager::update(self, time);
        Ok(())
    }

    fn late_update(&mut self, time: &FrameTime) -> Result<()> {
        BehaviorManager::late_update(self, time);
        Ok(())
    }

    fn draw(&mut self, time: &FrameTime) -> Result<()> {
        BehaviorManager::draw(self, time);
        Ok(())
    }

    fn draw_gui(&mut self, time: &FrameTime) -> Result<()> {
        BehaviorManager::draw_gui(self, time);
        Ok(())
    }

    fn end_draw(&mut self) -> Result<()> {
        BehaviorManager::end_draw(self);
        Ok(())
    }
}

/// Typed view of a behavior found through [`BehaviorManager::try_find`].
pub struct BehaviorHandle<T> {
    behavior: BehaviorRef,
    _type: PhantomData<fn() -> T>,
}

impl<T: Behavior> BehaviorHandle<T> {
    fn new(behavior: BehaviorRef) -> Self {
        Self {
            behavior,
            _type: PhantomData,
        }
    }

    /// Runs `f` against the behavior. `None` if it is mutably borrowed
    /// elsewhere right now.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.behavior.try_borrow().ok()?;
        let target: &dyn Behavior = &*guard;
        target.as_any().downcast_ref::<T>().map(f)
    }

    /// Runs `f` against the behavior mutably. `None` if it is borrowed
    /// elsewhere right now.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.behavior.try_borrow_mut().ok()?;
        let target: &mut dyn Behavior = &mut *guard;
        target.as_any_mut().downcast_mut::<T>().map(f)
    }

    pub fn behavior(&self) -> &BehaviorRef {
        &self.behavior
    }
}

impl<T> Clone for BehaviorHandle<T> {
    fn clone(&self) -> Self {
        Self {
            behavior: self.behavior.clone(),
            _type: PhantomData,
        }
    }
}

impl<T> fmt::Debug for BehaviorHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorHandle")
            .field("type", &type_name::<T>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::super::testing::{calls, capture_logs, new_log, CallLog, Fault, Recorder};
    use super::super::shared;
    use super::*;

    fn time() -> FrameTime {
        FrameTime::new(0.01, 0.01, 0)
    }

    fn recorder(name: &str, log: &CallLog) -> Rc<std::cell::RefCell<Recorder>> {
        shared(Recorder::new(name, log))
    }

    fn run_frame(manager: &mut BehaviorManager) {
        let time = time();
        manager.update(&time);
        manager.late_update(&time);
        manager.draw(&time);
        manager.draw_gui(&time);
        manager.end_draw();
    }

    #[test]
    fn dispatches_by_descending_priority_then_registration_order() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        manager.add_behavior("A", 10, recorder("A", &log)).unwrap();
        manager.add_behavior("B", 5, recorder("B", &log)).unwrap();
        manager.add_behavior("C", 10, recorder("C", &log)).unwrap();

        manager.update(&time());
        manager.draw(&time());

        assert_eq!(calls(&log, "update"), ["A", "C", "B"]);
        assert_eq!(calls(&log, "draw"), ["A", "C", "B"]);
        assert_eq!(manager.names().collect::<Vec<_>>(), ["A", "C", "B"]);
    }

    #[test]
    fn negative_priorities_run_last() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        manager.add_behavior("low", -1, recorder("low", &log)).unwrap();
        manager.add_behavior("zero", 0, recorder("zero", &log)).unwrap();

        manager.update(&time());
        assert_eq!(calls(&log, "update"), ["zero", "low"]);
    }

    #[test]
    fn duplicate_names_are_rejected_without_change() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        manager.add_behavior("A", 1, recorder("A", &log)).unwrap();
        let before = manager.export_view();

        let second = recorder("other", &log);
        let err = manager.add_behavior("A", 9, second.clone()).unwrap_err();

        assert!(matches!(err, TabVizError::DuplicateName(ref name) if name == "A"));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.export_view(), before);
        assert!(!second.borrow().is_initialized());
    }

    #[test]
    fn registration_initializes_behavior() {
        let log = new_log();
        let behavior = recorder("A", &log);
        let mut manager = BehaviorManager::new();

        manager.add(behavior.clone()).unwrap();
        assert!(behavior.borrow().is_initialized());
    }

    #[test]
    fn convenience_forms_default_name_and_priority() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let declared = shared(Recorder::new("declared", &log).with_priority(4));

        manager.add(declared.clone()).unwrap();
        manager
            .add_with_priority(8, recorder("explicit", &log))
            .unwrap();
        manager
            .add_named("alias", shared(Recorder::new("aliased", &log).with_priority(6)))
            .unwrap();

        let groups = manager.export_view();
        let priorities: Vec<_> = groups.iter().map(|g| g.priority).collect();
        assert_eq!(priorities, [8, 6, 4]);
        assert!(manager.contains("alias"));
        assert!(manager.contains("declared"));
        assert!(manager.contains("explicit"));
    }

    #[test]
    fn priority_is_captured_at_registration() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let a = shared(Recorder::new("A", &log).with_priority(1));
        manager.add(a.clone()).unwrap();
        manager.add_behavior("B", 5, recorder("B", &log)).unwrap();

        a.borrow_mut().core.set_priority(100);
        manager.update(&time());

        assert_eq!(calls(&log, "update"), ["B", "A"]);
    }

    #[test]
    fn add_behaviors_registers_all() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        manager
            .add_behaviors([recorder("A", &log), recorder("B", &log)])
            .unwrap();
        assert_eq!(manager.len(), 2);

        let err = manager.add_behaviors([recorder("C", &log), recorder("A", &log)]);
        assert!(err.is_err());
        assert!(manager.contains("C"));
    }

    #[test]
    fn expired_weak_entries_are_skipped_and_pruned() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let live = recorder("live", &log);
        let doomed: BehaviorRef = recorder("doomed", &log);

        manager.add(live.clone()).unwrap();
        manager.add(Rc::downgrade(&doomed)).unwrap();
        assert_eq!(manager.len(), 2);

        drop(doomed);
        run_frame(&mut manager);
        assert_eq!(calls(&log, "update"), ["live"]);
        assert_eq!(manager.iter().count(), 1);

        assert_eq!(manager.cleanup_expired(), 1);
        assert_eq!(manager.len(), 1);
        assert!(!manager.contains("doomed"));
        assert!(manager.contains("live"));
        assert!(live.borrow().is_content_loaded());
        assert_eq!(live.borrow().unloads, 0);
    }

    #[test]
    fn registering_dead_weak_reference_is_a_no_op() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let weak = {
            let behavior: BehaviorRef = recorder("gone", &log);
            Rc::downgrade(&behavior)
        };

        manager.add(&weak).unwrap();
        manager.add_behavior("gone", 3, &weak).unwrap();
        assert!(manager.is_empty());
    }

    #[test]
    fn weak_entries_do_not_keep_behaviors_alive() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let behavior: BehaviorRef = recorder("A", &log);
        let weak = Rc::downgrade(&behavior);

        manager.add(weak.clone()).unwrap();
        drop(behavior);

        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn inactive_behaviors_skip_frame_passes_but_not_content_passes() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let sleeper = recorder("sleeper", &log);
        sleeper.borrow_mut().set_active(false);
        manager.add(sleeper.clone()).unwrap();

        manager.load_content();
        assert_eq!(sleeper.borrow().loads, 1);

        run_frame(&mut manager);
        for hook in ["update", "late_update", "draw", "draw_gui", "end_draw"] {
            assert!(calls(&log, hook).is_empty(), "{hook} should not run");
        }

        manager.unload_content();
        assert_eq!(sleeper.borrow().unloads, 1);
        assert!(!sleeper.borrow().is_content_loaded());
    }

    #[test]
    fn stasis_suppresses_only_update() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let frozen = recorder("frozen", &log);
        frozen.borrow_mut().set_stasis(true);
        manager.add(frozen.clone()).unwrap();

        run_frame(&mut manager);

        assert!(calls(&log, "update").is_empty());
        assert_eq!(calls(&log, "late_update"), ["frozen"]);
        assert_eq!(calls(&log, "draw"), ["frozen"]);
        assert_eq!(calls(&log, "draw_gui"), ["frozen"]);
        assert_eq!(calls(&log, "end_draw"), ["frozen"]);
        assert_eq!(frozen.borrow().loads, 1);
    }

    #[test]
    fn update_loads_content_lazily_and_draw_does_not() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let behavior = recorder("A", &log);
        manager.add(behavior.clone()).unwrap();

        manager.draw(&time());
        manager.late_update(&time());
        assert!(calls(&log, "draw").is_empty());
        assert!(calls(&log, "late_update").is_empty());
        assert_eq!(behavior.borrow().loads, 0);

        manager.update(&time());
        manager.update(&time());
        assert_eq!(behavior.borrow().loads, 1);

        manager.draw(&time());
        assert_eq!(calls(&log, "draw"), ["A"]);
    }

    #[test]
    fn inactive_behaviors_still_load_lazily_on_update() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let behavior = recorder("A", &log);
        behavior.borrow_mut().set_active(false);
        manager.add(behavior.clone()).unwrap();

        manager.update(&time());
        assert_eq!(behavior.borrow().loads, 1);
        assert!(calls(&log, "update").is_empty());
    }

    #[test]
    fn update_filter_covers_update_and_late_update() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        manager.add_behavior("keep", 0, recorder("keep", &log)).unwrap();
        let skipped = recorder("skip", &log);
        manager.add_behavior("skip", 0, skipped.clone()).unwrap();
        manager.set_update_filter(|behavior| behavior.name() != "skip");

        run_frame(&mut manager);

        assert_eq!(calls(&log, "update"), ["keep"]);
        assert_eq!(calls(&log, "late_update"), ["keep"]);
        assert_eq!(skipped.borrow().loads, 0);
        assert_eq!(calls(&log, "draw"), ["keep"]);

        manager.clear_update_filter();
        manager.update(&time());
        assert_eq!(calls(&log, "update"), ["keep", "keep", "skip"]);
    }

    #[test]
    fn draw_filter_covers_draw_family() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        manager.add_behavior("keep", 0, recorder("keep", &log)).unwrap();
        manager.add_behavior("skip", 0, recorder("skip", &log)).unwrap();
        manager.set_draw_filter(|behavior| behavior.name() == "keep");

        run_frame(&mut manager);

        assert_eq!(calls(&log, "update"), ["keep", "skip"]);
        assert_eq!(calls(&log, "late_update"), ["keep", "skip"]);
        assert_eq!(calls(&log, "draw"), ["keep"]);
        assert_eq!(calls(&log, "draw_gui"), ["keep"]);
        assert_eq!(calls(&log, "end_draw"), ["keep"]);

        manager.clear_draw_filter();
        manager.draw(&time());
        assert_eq!(calls(&log, "draw"), ["keep", "keep", "skip"]);
    }

    #[test]
    fn faulting_hook_is_isolated_per_entry_and_logged_once() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        manager
            .add_behavior("bad", 10, shared(Recorder::new("bad", &log).failing(Fault::Error("update"))))
            .unwrap();
        manager.add_behavior("same-bucket", 10, recorder("same-bucket", &log)).unwrap();
        manager.add_behavior("lower", 1, recorder("lower", &log)).unwrap();

        let logs = capture_logs(|| run_frame(&mut manager));

        assert_eq!(calls(&log, "update"), ["bad", "same-bucket", "lower"]);
        assert_eq!(calls(&log, "late_update"), ["bad", "same-bucket", "lower"]);
        assert_eq!(calls(&log, "end_draw"), ["bad", "same-bucket", "lower"]);
        assert_eq!(logs.matches("bad boom in update").count(), 1);
        assert_eq!(logs.matches("behavior hook failed").count(), 1);
    }

    #[test]
    fn panicking_hook_is_caught() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        manager
            .add_behavior("wild", 3, shared(Recorder::new("wild", &log).failing(Fault::Panic("draw"))))
            .unwrap();
        manager.add_behavior("calm", 3, recorder("calm", &log)).unwrap();

        let logs = capture_logs(|| run_frame(&mut manager));

        assert_eq!(calls(&log, "draw"), ["wild", "calm"]);
        assert_eq!(calls(&log, "draw_gui"), ["wild", "calm"]);
        assert_eq!(logs.matches("wild panicked in draw").count(), 1);
    }

    #[test]
    fn failed_lazy_load_skips_update() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let broken = shared(Recorder::new("broken", &log).failing(Fault::Error("load")));
        manager.add(broken.clone()).unwrap();

        let logs = capture_logs(|| manager.update(&time()));

        assert!(calls(&log, "update").is_empty());
        assert!(!broken.borrow().is_content_loaded());
        assert_eq!(logs.matches("broken boom in load").count(), 1);
    }

    #[test]
    fn borrowed_behaviors_are_skipped_not_panicked() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let busy = recorder("busy", &log);
        manager.add(busy.clone()).unwrap();
        manager.add(recorder("free", &log)).unwrap();

        let guard = busy.borrow_mut();
        manager.update(&time());
        drop(guard);

        assert_eq!(calls(&log, "update"), ["free"]);
    }

    #[test]
    fn remove_by_name_unloads_and_unknown_name_fails() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let behavior = recorder("A", &log);
        manager.add(behavior.clone()).unwrap();
        manager.load_content();

        manager.remove_behavior("A").unwrap();
        assert!(manager.is_empty());
        assert!(manager.export_view().is_empty());
        assert_eq!(behavior.borrow().unloads, 1);

        let err = manager.remove_behavior("A").unwrap_err();
        assert!(matches!(err, TabVizError::UnknownName(_)));
    }

    #[test]
    fn remove_by_reference_matches_identity() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let a: BehaviorRef = recorder("A", &log);
        let b: BehaviorRef = recorder("B", &log);
        let stranger: BehaviorRef = recorder("A", &log);
        manager.add(a.clone()).unwrap();
        manager.add(b.clone()).unwrap();

        assert!(!manager.remove(&stranger));
        assert!(manager.remove(&a));
        assert!(manager.remove_weak(&Rc::downgrade(&b)));
        assert!(manager.is_empty());
    }

    #[test]
    fn remove_behaviors_counts_matches() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let a: BehaviorRef = recorder("A", &log);
        let b: BehaviorRef = recorder("B", &log);
        let c: BehaviorRef = recorder("C", &log);
        manager.add(a.clone()).unwrap();
        manager.add(b.clone()).unwrap();

        assert_eq!(manager.remove_behaviors([&a, &b, &c]), 2);
        assert!(manager.is_empty());
    }

    #[test]
    fn remove_except_keeps_only_target() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let keep = recorder("keep", &log);
        let other = recorder("other", &log);
        let another = recorder("another", &log);
        let expiring: BehaviorRef = recorder("expiring", &log);
        manager.add_behavior("keep", 1, keep.clone()).unwrap();
        manager.add_behavior("other", 1, other.clone()).unwrap();
        manager.add_behavior("another", 2, another.clone()).unwrap();
        manager.add(Rc::downgrade(&expiring)).unwrap();
        manager.load_content();
        drop(expiring);

        let keep_ref: BehaviorRef = keep.clone();
        manager.remove_except(Some(&keep_ref));

        assert_eq!(manager.names().collect::<Vec<_>>(), ["keep"]);
        assert_eq!(other.borrow().unloads, 1);
        assert_eq!(another.borrow().unloads, 1);
        assert_eq!(keep.borrow().unloads, 0);
    }

    #[test]
    fn remove_except_absent_target_empties_manager() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        manager.add(recorder("A", &log)).unwrap();
        manager.add(recorder("B", &log)).unwrap();
        let outsider: BehaviorRef = recorder("outsider", &log);

        manager.remove_except(Some(&outsider));
        assert!(manager.is_empty());

        manager.add(recorder("C", &log)).unwrap();
        manager.remove_except(None);
        assert!(manager.is_empty());
    }

    #[test]
    fn clear_unloads_everything_and_empties_indices() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let a = recorder("A", &log);
        let b = recorder("B", &log);
        let unloaded = recorder("C", &log);
        manager.add_behavior("A", 3, a.clone()).unwrap();
        manager.add_behavior("B", 1, b.clone()).unwrap();
        manager.load_content();
        manager.add_behavior("C", 1, unloaded.clone()).unwrap();

        manager.clear();

        assert!(manager.is_empty());
        assert!(manager.export_view().is_empty());
        assert_eq!(a.borrow().unloads, 1);
        assert_eq!(b.borrow().unloads, 1);
        assert_eq!(unloaded.borrow().unloads, 0);
        assert!(!manager.contains("A"));
        manager.add_behavior("A", 3, recorder("A", &log)).unwrap();
    }

    #[test]
    fn try_find_resolves_by_name_and_type() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        manager.add(recorder("A", &log)).unwrap();
        manager.add(shared(BehaviorManager::new())).unwrap();

        let found = manager.try_find::<Recorder>("A").unwrap();
        assert_eq!(found.with(|r| r.core.name().to_string()).as_deref(), Some("A"));
        found.with_mut(|r| r.set_active(false)).unwrap();
        assert_eq!(found.with(|r| r.is_active()), Some(false));

        let missing = manager.try_find::<Recorder>("nope").unwrap_err();
        assert!(matches!(missing, TabVizError::UnknownName(_)));

        let wrong = manager.try_find::<BehaviorManager>("A").unwrap_err();
        assert!(matches!(wrong, TabVizError::TypeMismatch { .. }));
    }

    #[test]
    fn try_find_reports_expired_entries() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let behavior: BehaviorRef = recorder("A", &log);
        manager.add(Rc::downgrade(&behavior)).unwrap();
        drop(behavior);

        let err = manager.try_find::<Recorder>("A").unwrap_err();
        assert!(matches!(err, TabVizError::Expired(_)));
    }

    #[test]
    fn try_find_all_collects_by_type() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        assert!(manager.try_find_all::<Recorder>().is_none());

        manager.add_behavior("A", 1, recorder("A", &log)).unwrap();
        manager.add_behavior("B", 2, recorder("B", &log)).unwrap();
        manager.add(shared(BehaviorManager::new())).unwrap();

        let found = manager.try_find_all::<Recorder>().unwrap();
        let names: Vec<_> = found
            .iter()
            .filter_map(|h| h.with(|r| r.core.name().to_string()))
            .collect();
        assert_eq!(names, ["B", "A"]);
        assert_eq!(manager.try_find_all::<BehaviorManager>().map(|v| v.len()), Some(1));
    }

    #[test]
    fn nested_managers_dispatch_recursively() {
        let log = new_log();
        let mut root = BehaviorManager::new();
        let child = shared(BehaviorManager::new());
        child
            .borrow_mut()
            .add_behavior("inner-high", 5, recorder("inner-high", &log))
            .unwrap();
        child
            .borrow_mut()
            .add_behavior("inner-low", 1, recorder("inner-low", &log))
            .unwrap();

        root.add_behavior("before", 10, recorder("before", &log)).unwrap();
        root.add_behavior("children", 5, child.clone()).unwrap();
        root.add_behavior("after", 0, recorder("after", &log)).unwrap();

        run_frame(&mut root);

        let expected = ["before", "inner-high", "inner-low", "after"];
        assert_eq!(calls(&log, "update"), expected);
        assert_eq!(calls(&log, "draw"), expected);
        assert_eq!(calls(&log, "end_draw"), expected);
    }

    #[test]
    fn nested_manager_content_passes_reach_members() {
        let log = new_log();
        let mut root = BehaviorManager::new();
        let child = shared(BehaviorManager::new());
        let member = recorder("member", &log);
        child.borrow_mut().add(member.clone()).unwrap();
        root.add(child.clone()).unwrap();

        root.load_content();
        assert_eq!(member.borrow().loads, 1);

        root.unload_content();
        assert_eq!(member.borrow().unloads, 1);

        root.update(&time());
        assert_eq!(member.borrow().loads, 2);

        root.clear();
        assert_eq!(member.borrow().unloads, 2);
    }

    #[test]
    fn nested_manager_applies_its_own_update_filter() {
        let log = new_log();
        let mut root = BehaviorManager::new();
        let child = shared(BehaviorManager::new());
        let kept = recorder("kept", &log);
        let filtered = recorder("filtered", &log);
        child.borrow_mut().add(kept.clone()).unwrap();
        child.borrow_mut().add(filtered.clone()).unwrap();
        child
            .borrow_mut()
            .set_update_filter(|behavior| behavior.name() != "filtered");
        root.add(child.clone()).unwrap();

        root.update(&time());
        root.update(&time());

        assert_eq!(kept.borrow().loads, 1);
        assert_eq!(filtered.borrow().loads, 0);
        assert_eq!(calls(&log, "update"), ["kept", "kept"]);

        // Explicit content passes are not filtered.
        root.load_content();
        assert_eq!(filtered.borrow().loads, 1);
        assert_eq!(kept.borrow().loads, 1);
    }

    #[test]
    fn nested_manager_draw_filter_applies_through_parent() {
        let log = new_log();
        let mut root = BehaviorManager::new();
        let child = shared(BehaviorManager::new());
        child.borrow_mut().add(recorder("shown", &log)).unwrap();
        child.borrow_mut().add(recorder("hidden", &log)).unwrap();
        child
            .borrow_mut()
            .set_draw_filter(|behavior| behavior.name() == "shown");
        root.add(child).unwrap();

        run_frame(&mut root);

        assert_eq!(calls(&log, "update"), ["shown", "hidden"]);
        assert_eq!(calls(&log, "draw"), ["shown"]);
        assert_eq!(calls(&log, "end_draw"), ["shown"]);
    }

    #[test]
    fn panicking_unload_does_not_stop_clear() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let bad = shared(Recorder::new("bad", &log).failing(Fault::Panic("unload")));
        let good = recorder("good", &log);
        manager.add_behavior("bad", 5, bad.clone()).unwrap();
        manager.add_behavior("good", 1, good.clone()).unwrap();
        manager.load_content();

        let logs = capture_logs(|| manager.clear());

        assert!(manager.is_empty());
        assert!(manager.export_view().is_empty());
        assert_eq!(good.borrow().unloads, 1);
        assert_eq!(bad.borrow().unloads, 1);
        assert_eq!(logs.matches("bad panicked in unload").count(), 1);
        assert_eq!(logs.matches("failed to unload removed behavior").count(), 1);
    }

    #[test]
    fn failing_unload_still_removes_by_name() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let bad = shared(Recorder::new("bad", &log).failing(Fault::Error("unload")));
        manager.add_behavior("bad", 2, bad.clone()).unwrap();
        manager.load_content();

        let logs = capture_logs(|| manager.remove_behavior("bad").unwrap());

        assert!(!manager.contains("bad"));
        assert!(manager.is_empty());
        assert_eq!(logs.matches("bad boom in unload").count(), 1);
        // The flag only flips once the hook succeeds.
        assert!(bad.borrow().is_content_loaded());
    }

    #[test]
    fn panicking_unload_does_not_stop_remove_except() {
        let log = new_log();
        let mut manager = BehaviorManager::new();
        let keep = recorder("keep", &log);
        let bad = shared(Recorder::new("bad", &log).failing(Fault::Panic("unload")));
        let other = recorder("other", &log);
        manager.add_behavior("bad", 9, bad).unwrap();
        manager.add_behavior("keep", 5, keep.clone()).unwrap();
        manager.add_behavior("other", 1, other.clone()).unwrap();
        manager.load_content();

        let keep_ref: BehaviorRef = keep.clone();
        let logs = capture_logs(|| manager.remove_except(Some(&keep_ref)));

        assert_eq!(manager.names().collect::<Vec<_>>(), ["keep"]);
        assert_eq!(other.borrow().unloads, 1);
        assert_eq!(keep.borrow().unloads, 0);
        assert_eq!(logs.matches("bad panicked in unload").count(), 1);
    }

    #[test]
    fn manager_flags_are_fixed() {
        let mut manager = BehaviorManager::new();
        manager.set_active(false);
        manager.set_stasis(true);
        Behavior::unload_content_if_needed(&mut manager).unwrap();

        assert!(manager.is_active());
        assert!(!manager.in_stasis());
        assert!(manager.is_initialized());
        assert!(manager.is_content_loaded());
        assert_eq!(Behavior::name(&manager), "BehaviorManager");
    }

    #[test]
    fn behavior_children_can_host_behaviors() {
        let log = new_log();
        let parent = shared(Recorder::new("parent", &log));
        parent
            .borrow_mut()
            .behaviors()
            .add(recorder("child", &log))
            .unwrap();

        let mut manager = BehaviorManager::new();
        manager.add(parent.clone()).unwrap();
        manager.update(&time());

        // Children only run when their parent drives them.
        assert_eq!(calls(&log, "update"), ["parent"]);
        parent.borrow_mut().behaviors().update(&time());
        assert_eq!(calls(&log, "update"), ["parent", "child"]);
    }
}
