// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Transient buffer between the RFID reader and the kiosk poller.
//!
//! The reader pushes raw `(uid, timestamp)` events; the kiosk drains them
//! by timestamp cursor. Draining removes what it returns, so an event is
//! observed by at most one poller. Events older than the newest 50 are
//! evicted without ever being delivered, trading completeness for bounded
//! memory. Nothing here survives a process restart.

use crate::base::CardUid;
use crate::error::LedgerError;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Queue capacity; older events are evicted first.
pub const MAX_RECENT_SCANS: usize = 50;

/// One physical card tap, pending consumption by a kiosk poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub uid: CardUid,
    /// Milliseconds since the Unix epoch; ordering key and drain cursor.
    pub timestamp: i64,
}

/// Bounded FIFO of recent scan events with destructive reads.
///
/// Explicitly owned (constructed once, shared behind `Arc`) rather than a
/// process global, so tests build independent instances and a future
/// multi-terminal setup can hold one queue per terminal.
#[derive(Debug, Default)]
pub struct ScanQueue {
    events: Mutex<VecDeque<ScanEvent>>,
}

impl ScanQueue {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Validates and enqueues a raw reader payload, stamping it with the
    /// current time.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::EmptyUid`] when the payload is empty after
    /// trimming. The uid is not checked against the member registry; that
    /// happens at settlement.
    pub fn push(&self, raw_uid: &str) -> Result<ScanEvent, LedgerError> {
        let uid = CardUid::parse(raw_uid).ok_or(LedgerError::EmptyUid)?;
        Ok(self.push_at(uid, Utc::now().timestamp_millis()))
    }

    /// Enqueues an already-validated event with an explicit timestamp.
    pub fn push_at(&self, uid: CardUid, timestamp: i64) -> ScanEvent {
        let event = ScanEvent { uid, timestamp };
        let mut events = self.events.lock();
        events.push_back(event.clone());
        while events.len() > MAX_RECENT_SCANS {
            events.pop_front();
        }
        event
    }

    /// Removes and returns every queued event newer than `since`, in
    /// ascending timestamp order.
    ///
    /// Removal and return are one critical section, so two concurrent
    /// pollers never both receive the same event. Events at or before the
    /// cursor stay queued for a poller with an older cursor.
    pub fn drain_since(&self, since: i64) -> Vec<ScanEvent> {
        let mut drained = Vec::new();
        {
            let mut events = self.events.lock();
            events.retain(|event| {
                if event.timestamp > since {
                    drained.push(event.clone());
                    false
                } else {
                    true
                }
            });
        }
        drained.sort_by_key(|event| event.timestamp);
        drained
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_trims_uid() {
        let queue = ScanQueue::new();
        let event = queue.push("  A1  ").unwrap();
        assert_eq!(event.uid.as_str(), "A1");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn push_rejects_blank_uid() {
        let queue = ScanQueue::new();
        assert_eq!(queue.push("   "), Err(LedgerError::EmptyUid));
        assert!(queue.is_empty());
    }

    #[test]
    fn eviction_keeps_newest_fifty() {
        let queue = ScanQueue::new();
        for ts in 1..=60 {
            queue.push_at(CardUid::parse(&format!("C{ts}")).unwrap(), ts);
        }

        assert_eq!(queue.len(), MAX_RECENT_SCANS);
        let drained = queue.drain_since(0);
        assert_eq!(drained.len(), MAX_RECENT_SCANS);
        assert_eq!(drained.first().unwrap().timestamp, 11);
        assert_eq!(drained.last().unwrap().timestamp, 60);
    }

    #[test]
    fn drain_respects_cursor_and_is_destructive() {
        let queue = ScanQueue::new();
        for ts in 1..=10 {
            queue.push_at(CardUid::parse("A1").unwrap(), ts);
        }

        let newer = queue.drain_since(5);
        assert_eq!(
            newer.iter().map(|e| e.timestamp).collect::<Vec<_>>(),
            vec![6, 7, 8, 9, 10]
        );
        // Events at or before the cursor are still queued.
        assert_eq!(queue.len(), 5);
        // A second drain with the same cursor sees nothing.
        assert!(queue.drain_since(5).is_empty());

        let older = queue.drain_since(0);
        assert_eq!(
            older.iter().map(|e| e.timestamp).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_empty_queue_returns_empty() {
        let queue = ScanQueue::new();
        assert!(queue.drain_since(0).is_empty());
    }
}
