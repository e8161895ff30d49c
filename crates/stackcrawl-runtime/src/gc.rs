//! Managed heap with a relocating collector
//!
//! Objects live in a compacted arena and move whenever the collector runs.
//! Native code never sees an arena position: it holds a [`Handle`], an index
//! into the handle table plus a generation, and the collector rewrites the
//! table entry on every relocation.
//!
//! ```text
//! handle     before collect     after collect
//! #0@1  ───▶ [0] "a"            [0] "a"
//! #1@1       [1] (released)     [1] trace   ◀─── #2@1
//! #2@1  ───▶ [2] trace
//! ```
//!
//! A thread inside a fast call holds a [`NoGcRegion`]. While any thread holds
//! one, collections are refused; the holding thread may not allocate.

use crate::capture::StackTrace;
use crate::error::{GcError, GcResult};
use stackcrawl_config::RuntimeConfig;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Opaque reference to a managed object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

/// Objects the boundary layer exchanges with managed code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedObject {
    String(String),
    StackTrace(StackTrace),
    Exception {
        message: String,
        stack_trace: Option<StackTrace>,
    },
}

impl ManagedObject {
    pub fn type_name(&self) -> &'static str {
        match self {
            ManagedObject::String(_) => "String",
            ManagedObject::StackTrace(_) => "StackTrace",
            ManagedObject::Exception { .. } => "Exception",
        }
    }
}

/// Outcome of one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub live: usize,
    pub reclaimed: usize,
    /// Live objects whose arena position changed
    pub relocated: usize,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u32,
    /// Arena position, `None` once released
    location: Option<usize>,
}

#[derive(Debug)]
struct ArenaEntry {
    slot: u32,
    object: Option<ManagedObject>,
}

#[derive(Debug, Default)]
struct HeapState {
    arena: Vec<ArenaEntry>,
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
    allocations_since_collect: usize,
    collections: usize,
}

impl HeapState {
    fn slot(&self, handle: Handle) -> GcResult<usize> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.location)
            .ok_or(GcError::InvalidHandle(handle))
    }

    fn compact(&mut self) -> CollectionStats {
        let before = self.arena.len();
        let mut stats = CollectionStats::default();
        let mut arena = Vec::with_capacity(before);

        for (old, entry) in std::mem::take(&mut self.arena).into_iter().enumerate() {
            if entry.object.is_none() {
                continue;
            }
            let new = arena.len();
            if new != old {
                stats.relocated += 1;
            }
            self.slots[entry.slot as usize].location = Some(new);
            arena.push(entry);
        }

        stats.live = arena.len();
        stats.reclaimed = before - arena.len();
        self.arena = arena;
        self.allocations_since_collect = 0;
        self.collections += 1;
        stats
    }
}

thread_local! {
    static THREAD_NO_GC_DEPTH: Cell<usize> = const { Cell::new(0) };
}

fn thread_in_no_gc_region() -> bool {
    THREAD_NO_GC_DEPTH.with(|depth| depth.get() > 0)
}

/// Process-wide managed heap
#[derive(Debug)]
pub struct ManagedHeap {
    state: Mutex<HeapState>,
    no_gc_depth: AtomicUsize,
    no_gc_entered: AtomicUsize,
    collect_after: usize,
}

impl ManagedHeap {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            state: Mutex::new(HeapState::default()),
            no_gc_depth: AtomicUsize::new(0),
            no_gc_entered: AtomicUsize::new(0),
            collect_after: config.collect_after_allocations(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HeapState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Allocate `object` and return a handle to it.
    ///
    /// Every `collect_after_allocations` allocations trigger a collection
    /// first, unless some thread holds a no-GC region.
    pub fn alloc(&self, object: ManagedObject) -> GcResult<Handle> {
        if thread_in_no_gc_region() {
            return Err(GcError::AllocationInNoGcRegion);
        }

        let mut state = self.lock();
        if state.allocations_since_collect >= self.collect_after
            && self.no_gc_depth.load(Ordering::SeqCst) == 0
        {
            let stats = state.compact();
            tracing::debug!(
                live = stats.live,
                reclaimed = stats.reclaimed,
                relocated = stats.relocated,
                "allocation-triggered collection"
            );
        }

        let location = state.arena.len();
        let index = match state.free_slots.pop() {
            Some(index) => {
                let slot = &mut state.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.location = Some(location);
                index
            }
            None => {
                let index = state.slots.len() as u32;
                state.slots.push(Slot {
                    generation: 1,
                    location: Some(location),
                });
                index
            }
        };
        let generation = state.slots[index as usize].generation;

        state.arena.push(ArenaEntry {
            slot: index,
            object: Some(object),
        });
        state.allocations_since_collect += 1;

        Ok(Handle { index, generation })
    }

    /// Run `f` against a snapshot of the object behind `handle`
    ///
    /// The heap lock is released before `f` runs, so `f` may allocate,
    /// release or collect on this heap.
    pub fn with_object<R>(
        &self,
        handle: Handle,
        f: impl FnOnce(&ManagedObject) -> R,
    ) -> GcResult<R> {
        let object = {
            let state = self.lock();
            let location = state.slot(handle)?;
            state.arena[location].object.clone()
        };
        object.as_ref().map(f).ok_or(GcError::InvalidHandle(handle))
    }

    /// Drop the object behind `handle`; its memory is reclaimed by the next
    /// collection and the handle goes stale immediately
    pub fn release(&self, handle: Handle) -> GcResult<()> {
        let mut state = self.lock();
        let location = state.slot(handle)?;
        state.arena[location].object = None;
        state.slots[handle.index as usize].location = None;
        state.free_slots.push(handle.index);
        Ok(())
    }

    /// Compact the arena, relocating every live object
    pub fn collect(&self) -> GcResult<CollectionStats> {
        let depth = self.no_gc_depth.load(Ordering::SeqCst);
        if depth > 0 {
            tracing::warn!(depth, "collection refused inside no-GC region");
            return Err(GcError::CollectionInNoGcRegion { depth });
        }

        let stats = self.lock().compact();
        tracing::debug!(
            live = stats.live,
            reclaimed = stats.reclaimed,
            relocated = stats.relocated,
            "collection finished"
        );
        Ok(stats)
    }

    /// Current arena position of the object behind `handle`
    pub fn location(&self, handle: Handle) -> GcResult<usize> {
        self.lock().slot(handle)
    }

    /// Enter a region in which the calling thread may not allocate and no
    /// thread may collect
    pub fn enter_no_gc(&self) -> NoGcRegion<'_> {
        self.no_gc_depth.fetch_add(1, Ordering::SeqCst);
        self.no_gc_entered.fetch_add(1, Ordering::Relaxed);
        THREAD_NO_GC_DEPTH.with(|depth| depth.set(depth.get() + 1));
        NoGcRegion {
            heap: self,
            _not_send: PhantomData,
        }
    }

    /// No-GC regions entered over the heap's lifetime
    pub fn no_gc_regions_entered(&self) -> usize {
        self.no_gc_entered.load(Ordering::Relaxed)
    }

    pub fn collections(&self) -> usize {
        self.lock().collections
    }

    pub fn live_objects(&self) -> usize {
        self.lock()
            .arena
            .iter()
            .filter(|entry| entry.object.is_some())
            .count()
    }
}

impl Default for ManagedHeap {
    fn default() -> Self {
        Self::new(&RuntimeConfig::default())
    }
}

/// Guard returned by [`ManagedHeap::enter_no_gc`]
#[must_use = "the region ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct NoGcRegion<'a> {
    heap: &'a ManagedHeap,
    _not_send: PhantomData<*const ()>,
}

impl Drop for NoGcRegion<'_> {
    fn drop(&mut self) {
        THREAD_NO_GC_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
        self.heap.no_gc_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use stackcrawl_config::GcConfig;

    fn string(s: &str) -> ManagedObject {
        ManagedObject::String(s.to_string())
    }

    #[test]
    fn test_collect_relocates_and_rewrites_handles() {
        let heap = ManagedHeap::default();
        let a = heap.alloc(string("a")).unwrap();
        let b = heap.alloc(string("b")).unwrap();
        let c = heap.alloc(string("c")).unwrap();

        heap.release(b).unwrap();
        assert_eq!(heap.location(c), Ok(2));

        let stats = heap.collect().unwrap();
        assert_eq!(
            stats,
            CollectionStats {
                live: 2,
                reclaimed: 1,
                relocated: 1
            }
        );
        assert_eq!(heap.location(a), Ok(0));
        assert_eq!(heap.location(c), Ok(1));
        assert_eq!(heap.with_object(c, |o| o.clone()), Ok(string("c")));
    }

    #[test]
    fn test_released_handle_goes_stale_after_reuse() {
        let heap = ManagedHeap::default();
        let old = heap.alloc(string("old")).unwrap();
        heap.release(old).unwrap();
        let new = heap.alloc(string("new")).unwrap();

        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());
        assert_eq!(
            heap.with_object(old, |_| ()),
            Err(GcError::InvalidHandle(old))
        );
    }

    #[test]
    fn test_no_gc_region_blocks_collect_and_alloc() {
        let heap = ManagedHeap::default();
        {
            let _region = heap.enter_no_gc();
            assert_eq!(
                heap.collect(),
                Err(GcError::CollectionInNoGcRegion { depth: 1 })
            );
            assert_eq!(
                heap.alloc(string("x")),
                Err(GcError::AllocationInNoGcRegion)
            );
        }
        assert!(heap.collect().is_ok());
        assert!(heap.alloc(string("x")).is_ok());
    }

    #[test]
    fn test_allocation_threshold_triggers_collection() {
        let config = RuntimeConfig {
            gc: Some(GcConfig {
                server: None,
                collect_after_allocations: Some(2),
            }),
            ..RuntimeConfig::default()
        };
        let heap = ManagedHeap::new(&config);

        for i in 0..5 {
            heap.alloc(string(&i.to_string())).unwrap();
        }
        assert_eq!(heap.collections(), 2);
        assert_eq!(heap.live_objects(), 5);
    }

    #[test]
    fn test_with_object_may_reenter_heap() {
        let heap = ManagedHeap::default();
        let original = heap.alloc(string("a")).unwrap();

        let copy = heap
            .with_object(original, |o| heap.alloc(o.clone()))
            .unwrap()
            .unwrap();
        heap.release(original).unwrap();
        heap.collect().unwrap();

        assert_eq!(heap.with_object(copy, |o| o.clone()), Ok(string("a")));
    }
}
