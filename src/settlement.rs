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

//! Settlement policy and outcomes.
//!
//! Every scan attempt resolves to exactly one of:
//! - `Granted` (charged) — entry fee deducted, visit recorded
//! - `Granted` (free re-entry) — inside the policy window, nothing mutated
//! - `Denied` — unknown card or insufficient credit, nothing mutated

use crate::member::MemberSnapshot;
use chrono::{DateTime, Duration, Utc};

/// Credits charged per granted entry unless overridden.
pub const DEFAULT_ENTRY_COST: u32 = 5;

/// Policy applied when settling a scan.
///
/// The free re-entry window is opt-in: when set, a member whose last
/// accepted entry is more recent than the window is let back in without
/// charge. The default policy always charges, which matches the kiosk
/// variant wired to the settle endpoint in production.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPolicy {
    /// Credits deducted for a charged entry.
    pub entry_cost: u32,
    /// No-charge re-entry window measured against `last_scan`.
    pub free_reentry_window: Option<Duration>,
}

impl Default for EntryPolicy {
    fn default() -> Self {
        Self {
            entry_cost: DEFAULT_ENTRY_COST,
            free_reentry_window: None,
        }
    }
}

impl EntryPolicy {
    pub fn with_cost(self, entry_cost: u32) -> Self {
        Self { entry_cost, ..self }
    }

    pub fn with_free_reentry(self, window: Duration) -> Self {
        Self {
            free_reentry_window: Some(window),
            ..self
        }
    }

    /// True when a prior accepted entry at `last_scan` is still inside the
    /// no-charge window at `now`.
    pub fn grants_free_reentry(&self, last_scan: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.free_reentry_window
            .is_some_and(|window| now - last_scan < window)
    }
}

/// Result of one settlement attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    Granted(GrantReceipt),
    Denied(DenialReason),
}

impl SettlementOutcome {
    pub fn granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// Evidence of a granted entry, captured under the member lock so the
/// snapshot and the before/after balances describe the same instant.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantReceipt {
    /// Member state after the settlement was applied.
    pub member: MemberSnapshot,
    /// Balance immediately before the deduction.
    pub previous_credit: u32,
    /// Credits actually deducted; zero for free re-entries and previews.
    pub deducted: u32,
    pub kind: EntryKind,
}

/// Distinguishes the first (charged) entry of a window from a repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Charged,
    FreeReentry,
}

/// Why a scan was refused. Neither variant mutates any member state.
#[derive(Debug, Clone, PartialEq)]
pub enum DenialReason {
    /// Card UID has no registered member.
    NotRegistered,
    /// Member exists but cannot afford the entry cost; carries the
    /// untouched record so the kiosk can show the current balance.
    InsufficientCredit { member: MemberSnapshot },
}
