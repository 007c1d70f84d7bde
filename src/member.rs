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

//! Member records.
//!
//! A member binds one RFID card to a credit balance and its history. All
//! mutation happens under the member's own mutex, so a settlement's three
//! writes (credit, last scan, scan history) are observed together or not
//! at all, and concurrent settle/top-up attempts on one card serialize.
//!
//! # Example
//!
//! ```
//! use gym_kiosk_rs::Ledger;
//!
//! let ledger = Ledger::new();
//! let member = ledger.register("Alice", "A1", Some(10)).unwrap();
//! assert_eq!(member.credit, 10);
//! ```

use crate::base::{CardUid, MemberId};
use crate::settlement::{DenialReason, EntryKind, EntryPolicy, GrantReceipt, SettlementOutcome};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A credit addition applied by staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopUp {
    pub amount: u32,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
struct MemberData {
    id: MemberId,
    name: String,
    card_uid: CardUid,
    credit: u32,
    /// Most recent accepted entry; registration counts as the first one.
    last_scan: DateTime<Utc>,
    scan_history: Vec<DateTime<Utc>>,
    topup_history: Vec<TopUp>,
    created_at: DateTime<Utc>,
}

impl MemberData {
    fn new(name: String, card_uid: CardUid, credit: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: MemberId::random(),
            name,
            card_uid,
            credit,
            last_scan: now,
            scan_history: Vec::new(),
            topup_history: Vec::new(),
            created_at: now,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.scan_history.last().is_none_or(|entry| *entry <= self.last_scan),
            "Invariant violated: scan history newer than last_scan"
        );
        debug_assert!(
            self.last_scan >= self.created_at,
            "Invariant violated: last_scan precedes creation"
        );
    }

    /// Deducts one entry fee and records the visit.
    ///
    /// A balance below `cost` refuses without touching any field.
    fn charge(&mut self, cost: u32, now: DateTime<Utc>) -> Option<u32> {
        if self.credit < cost {
            return None;
        }
        let previous = self.credit;
        self.credit -= cost;
        self.last_scan = now;
        self.scan_history.push(now);
        self.assert_invariants();
        Some(previous)
    }

    /// Adds credit and appends the top-up record.
    fn top_up(&mut self, amount: u32, now: DateTime<Utc>) -> u32 {
        let previous = self.credit;
        self.credit = self.credit.saturating_add(amount);
        self.topup_history.push(TopUp { amount, at: now });
        self.assert_invariants();
        previous
    }

    fn snapshot(&self) -> MemberSnapshot {
        MemberSnapshot {
            id: self.id,
            name: self.name.clone(),
            card_uid: self.card_uid.clone(),
            credit: self.credit,
            last_scan: self.last_scan,
            scan_history: self.scan_history.clone(),
            topup_history: self.topup_history.clone(),
            created_at: self.created_at,
        }
    }
}

/// A registered gym account bound to one RFID card.
#[derive(Debug)]
pub struct Member {
    inner: Mutex<MemberData>,
}

impl Member {
    pub(crate) fn new(name: String, card_uid: CardUid, credit: u32, now: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(MemberData::new(name, card_uid, credit, now)),
        }
    }

    pub fn credit(&self) -> u32 {
        self.inner.lock().credit
    }

    pub fn last_scan(&self) -> DateTime<Utc> {
        self.inner.lock().last_scan
    }

    /// Point-in-time copy of the member's public fields, taken under the
    /// member lock so it is internally consistent.
    pub fn snapshot(&self) -> MemberSnapshot {
        self.inner.lock().snapshot()
    }

    /// Unconditional-deduction settlement primitive.
    ///
    /// Grants and applies the entry fee when the balance covers it,
    /// otherwise denies and leaves every field unchanged. The deduction,
    /// `last_scan` update, and history append happen under a single lock
    /// acquisition.
    pub(crate) fn settle_entry(&self, cost: u32, now: DateTime<Utc>) -> SettlementOutcome {
        let mut data = self.inner.lock();
        Self::charge_locked(&mut data, cost, now)
    }

    /// Cool-down-aware settlement wrapper.
    ///
    /// A scan inside the policy's free re-entry window is granted with
    /// zero deduction and no mutation; everything else goes through the
    /// charged path. The window check and the charge share one lock
    /// acquisition so a concurrent top-up cannot slip between them.
    pub(crate) fn settle_entry_with_policy(
        &self,
        policy: &EntryPolicy,
        now: DateTime<Utc>,
    ) -> SettlementOutcome {
        let mut data = self.inner.lock();
        if policy.grants_free_reentry(data.last_scan, now) {
            return SettlementOutcome::Granted(GrantReceipt {
                previous_credit: data.credit,
                deducted: 0,
                kind: EntryKind::FreeReentry,
                member: data.snapshot(),
            });
        }
        Self::charge_locked(&mut data, policy.entry_cost, now)
    }

    /// Read-only preview of what a settlement under `policy` would do.
    pub(crate) fn preview_entry(&self, policy: &EntryPolicy, now: DateTime<Utc>) -> SettlementOutcome {
        let data = self.inner.lock();
        let kind = if policy.grants_free_reentry(data.last_scan, now) {
            EntryKind::FreeReentry
        } else if data.credit < policy.entry_cost {
            return SettlementOutcome::Denied(DenialReason::InsufficientCredit {
                member: data.snapshot(),
            });
        } else {
            EntryKind::Charged
        };
        SettlementOutcome::Granted(GrantReceipt {
            previous_credit: data.credit,
            deducted: 0,
            kind,
            member: data.snapshot(),
        })
    }

    /// Adds `amount` credits; the caller has already validated `amount > 0`.
    pub(crate) fn apply_top_up(&self, amount: u32, now: DateTime<Utc>) -> TopUpReceipt {
        let mut data = self.inner.lock();
        let previous_credit = data.top_up(amount, now);
        TopUpReceipt {
            previous_credit,
            member: data.snapshot(),
        }
    }

    fn charge_locked(data: &mut MemberData, cost: u32, now: DateTime<Utc>) -> SettlementOutcome {
        match data.charge(cost, now) {
            Some(previous_credit) => SettlementOutcome::Granted(GrantReceipt {
                previous_credit,
                deducted: cost,
                kind: EntryKind::Charged,
                member: data.snapshot(),
            }),
            None => SettlementOutcome::Denied(DenialReason::InsufficientCredit {
                member: data.snapshot(),
            }),
        }
    }
}

/// Serializable copy of a member at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub id: MemberId,
    pub name: String,
    pub card_uid: CardUid,
    pub credit: u32,
    pub last_scan: DateTime<Utc>,
    pub scan_history: Vec<DateTime<Utc>>,
    pub topup_history: Vec<TopUp>,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful top-up.
#[derive(Debug, Clone, PartialEq)]
pub struct TopUpReceipt {
    pub previous_credit: u32,
    /// Member state after the credit was added.
    pub member: MemberSnapshot,
}
