//! Idle-connection timers.
//!
//! Timers live in an arena and are chained into a doubly linked list sorted
//! by expiry. Links are arena indices, and every handle carries a generation
//! so a handle to a removed timer is simply ignored.

use std::time::Instant;

/// Handle to a timer in a [`TimerList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    index: usize,
    generation: u64,
}

struct Slot<T> {
    generation: u64,
    expires: Instant,
    prev: Option<usize>,
    next: Option<usize>,
    data: Option<T>,
}

/// Expiry-ordered timer list.
///
/// Insertion scans from the head; rescheduling only moves a timer later and
/// scans from its old successor. Both are linear in the number of timers
/// passed over, which stays small because rescheduled timers move to the
/// back of the list.
pub struct TimerList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> Default for TimerList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerList<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Adds a timer expiring at `expires`, after any timer with the same
    /// deadline.
    pub fn insert(&mut self, expires: Instant, data: T) -> TimerId {
        let index = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.expires = expires;
                slot.data = Some(data);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    expires,
                    prev: None,
                    next: None,
                    data: Some(data),
                });
                self.slots.len() - 1
            }
        };

        let at = self.first_after(self.head, expires);
        self.link_before(index, at);
        self.len += 1;

        TimerId {
            index,
            generation: self.slots[index].generation,
        }
    }

    /// Moves a timer's deadline later.
    ///
    /// A deadline earlier than the current one is ignored; timers never move
    /// backward. Returns `false` if the timer no longer exists.
    pub fn reschedule_forward(&mut self, id: TimerId, expires: Instant) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };

        let slot = &mut self.slots[index];
        if expires <= slot.expires {
            return true;
        }
        slot.expires = expires;

        let next = slot.next;
        match next {
            None => return true,
            Some(n) if expires < self.slots[n].expires => return true,
            Some(_) => {}
        }

        self.unlink(index);
        let at = self.first_after(next, expires);
        self.link_before(index, at);
        true
    }

    /// Unlinks a timer and returns its data.
    pub fn remove(&mut self, id: TimerId) -> Option<T> {
        let index = self.index_of(id)?;
        self.unlink(index);
        self.len -= 1;

        let slot = &mut self.slots[index];
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        slot.data.take()
    }

    pub fn expires(&self, id: TimerId) -> Option<Instant> {
        self.index_of(id).map(|index| self.slots[index].expires)
    }

    /// Deadline of the earliest timer.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.head.map(|index| self.slots[index].expires)
    }

    /// Removes and returns the earliest timer if it has expired by `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<(TimerId, T)> {
        let index = self.head?;
        if self.slots[index].expires > now {
            return None;
        }

        let id = TimerId {
            index,
            generation: self.slots[index].generation,
        };
        self.remove(id).map(|data| (id, data))
    }

    /// Fires every timer whose deadline is at or before `now`, earliest
    /// first. Each expired timer is removed before its callback runs.
    pub fn sweep<F>(&mut self, now: Instant, mut on_expire: F) -> usize
    where
        F: FnMut(TimerId, T),
    {
        let mut fired = 0;
        while let Some((id, data)) = self.pop_expired(now) {
            on_expire(id, data);
            fired += 1;
        }
        fired
    }

    /// Deadlines in list order.
    pub fn deadlines(&self) -> Vec<Instant> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(index) = cursor {
            out.push(self.slots[index].expires);
            cursor = self.slots[index].next;
        }
        out
    }

    fn index_of(&self, id: TimerId) -> Option<usize> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation && slot.data.is_some())
            .map(|_| id.index)
    }

    /// First timer at or after `start` expiring strictly later than `expires`.
    fn first_after(&self, start: Option<usize>, expires: Instant) -> Option<usize> {
        let mut cursor = start;
        while let Some(index) = cursor {
            if self.slots[index].expires > expires {
                return Some(index);
            }
            cursor = self.slots[index].next;
        }
        None
    }

    /// Links `index` before `at`, or at the tail when `at` is `None`.
    fn link_before(&mut self, index: usize, at: Option<usize>) {
        let prev = match at {
            Some(at) => self.slots[at].prev,
            None => self.tail,
        };

        self.slots[index].prev = prev;
        self.slots[index].next = at;

        match prev {
            Some(p) => self.slots[p].next = Some(index),
            None => self.head = Some(index),
        }
        match at {
            Some(a) => self.slots[a].prev = Some(index),
            None => self.tail = Some(index),
        }
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = (self.slots[index].prev, self.slots[index].next);

        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }

        self.slots[index].prev = None;
        self.slots[index].next = None;
    }
}
