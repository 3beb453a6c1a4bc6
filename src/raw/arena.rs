use super::handle::Handle;

/// A slot is either a live node or a link in the free list.
#[derive(Clone)]
enum Slot<T> {
    Occupied(T),
    Vacant { next_free: Option<Handle> },
}

/// Node storage for one tree.
///
/// Vacated slots form a singly linked free list threaded through the slots
/// themselves, so the most recently freed slot is the next one reused.
#[derive(Clone)]
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<Handle>,
    live: usize,
}

impl<T> Arena<T> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            live: 0,
        }
    }

    /// Number of occupied slots.
    pub(crate) const fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn alloc(&mut self, node: T) -> Handle {
        self.live += 1;
        if let Some(handle) = self.free_head {
            let slot = &mut self.slots[handle.to_index()];
            let Slot::Vacant { next_free } = *slot else {
                unreachable!("free list points at an occupied slot");
            };
            self.free_head = next_free;
            *slot = Slot::Occupied(node);
            return handle;
        }

        let handle = Handle::from_index(self.slots.len());
        self.slots.push(Slot::Occupied(node));
        handle
    }

    #[inline]
    pub(crate) fn get(&self, handle: Handle) -> &T {
        match &self.slots[handle.to_index()] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => panic!("arena: {handle:?} is vacant"),
        }
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, handle: Handle) -> &mut T {
        match &mut self.slots[handle.to_index()] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => panic!("arena: {handle:?} is vacant"),
        }
    }

    /// Moves the node out and pushes its slot onto the free list.
    pub(crate) fn take(&mut self, handle: Handle) -> T {
        let vacant = Slot::Vacant {
            next_free: self.free_head,
        };
        match std::mem::replace(&mut self.slots[handle.to_index()], vacant) {
            Slot::Occupied(node) => {
                self.free_head = Some(handle);
                self.live -= 1;
                node
            }
            Slot::Vacant { .. } => panic!("arena: {handle:?} freed twice"),
        }
    }

    pub(crate) fn free(&mut self, handle: Handle) {
        drop(self.take(handle));
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free_head = None;
        self.live = 0;
    }
}
