// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver event tracing.
//!
//! A fixed-size ring of typed events, cheap enough to leave on. Entries are
//! read out with a debugger; nothing in the driver consumes them. Repeated
//! identical events are collapsed into a count so a polling loop cannot
//! flush the interesting history.

use drv_mpc5200_bestcomm_api::TaskError;

/// Traced driver events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Event {
    None,
    ImageLoaded { tasks: u8 },
    TaskSetup { task: u8 },
    TaskSetupFailed { task: u8, err: TaskError },
    TaskStart { task: u8 },
    TaskStop { task: u8 },
    BdAssign { task: u8, bd: u16 },
    BdRelease { task: u8, bd: u16 },
    BdError { task: u8, err: TaskError },
    Irq { pending: u32 },
    IrqInstalled { source: u8 },
}

struct Entry {
    event: Event,
    count: u16,
}

/// The event ring. `N` is the retained history depth.
pub struct TraceBuf<const N: usize> {
    entries: [Entry; N],
    next: usize,
}

impl<const N: usize> TraceBuf<N> {
    pub const fn new() -> Self {
        const EMPTY: Entry = Entry {
            event: Event::None,
            count: 0,
        };
        Self {
            entries: [EMPTY; N],
            next: 0,
        }
    }

    pub fn record(&mut self, event: Event) {
        let last = self.entries[self.next.checked_sub(1).unwrap_or(N - 1)].count > 0;
        if last {
            let prev = &mut self.entries[self.next.checked_sub(1).unwrap_or(N - 1)];
            if prev.event == event && prev.count < u16::MAX {
                prev.count += 1;
                return;
            }
        }
        self.entries[self.next] = Entry { event, count: 1 };
        self.next = (self.next + 1) % N;
    }

    /// Most recent event, if anything has been recorded.
    pub fn last(&self) -> Option<Event> {
        let prev = &self.entries[self.next.checked_sub(1).unwrap_or(N - 1)];
        (prev.count > 0).then_some(prev.event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_collapse() {
        let mut t: TraceBuf<4> = TraceBuf::new();
        t.record(Event::TaskStart { task: 2 });
        t.record(Event::TaskStart { task: 2 });
        t.record(Event::TaskStart { task: 2 });
        assert_eq!(t.last(), Some(Event::TaskStart { task: 2 }));
        // Only one slot consumed; three more distinct events fit without
        // evicting it.
        t.record(Event::TaskStop { task: 2 });
        t.record(Event::Irq { pending: 4 });
        t.record(Event::BdAssign { task: 2, bd: 0 });
        assert_eq!(t.entries[0].count, 3);
    }

    #[test]
    fn wraps_at_capacity() {
        let mut t: TraceBuf<2> = TraceBuf::new();
        t.record(Event::TaskStart { task: 0 });
        t.record(Event::TaskStart { task: 1 });
        t.record(Event::TaskStart { task: 2 });
        assert_eq!(t.last(), Some(Event::TaskStart { task: 2 }));
    }
}
