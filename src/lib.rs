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

//! # Gym Kiosk
//!
//! This library provides the backend of a gym-access kiosk: RFID card
//! scans are settled against a per-member credit ledger, and a bounded
//! transient queue hands raw reader events to the polling kiosk client.
//!
//! ## Core Components
//!
//! - [`Ledger`]: Member registry and sole settlement authority
//! - [`ScanQueue`]: Bounded buffer of raw reader events with destructive reads
//! - [`EntryPolicy`]: Entry cost and optional free re-entry window
//! - [`SettlementOutcome`]: Grant/deny result of one scan attempt
//! - [`server`]: axum HTTP boundary for the kiosk and the admin dashboard
//!
//! ## Example
//!
//! ```
//! use gym_kiosk_rs::Ledger;
//!
//! let ledger = Ledger::new();
//! ledger.register("Alice", "A1", Some(10)).unwrap();
//!
//! // Settle a scan: charges the entry fee and records the visit.
//! let outcome = ledger.settle("A1", 5).unwrap();
//! assert!(outcome.granted());
//!
//! let member = ledger.find_by_uid("A1").unwrap();
//! assert_eq!(member.credit, 5);
//! ```
//!
//! ## Thread Safety
//!
//! The ledger handles concurrent access per member: settlements and
//! top-ups on the same card serialize, while different cards are
//! processed in parallel. Queue drains are atomic, so an event is
//! delivered to at most one poller.

mod base;
pub mod error;
mod ledger;
pub mod member;
mod scan_queue;
pub mod server;
mod settlement;

pub use base::{CardUid, MemberId};
pub use error::LedgerError;
pub use ledger::Ledger;
pub use member::{Member, MemberSnapshot, TopUp, TopUpReceipt};
pub use scan_queue::{MAX_RECENT_SCANS, ScanEvent, ScanQueue};
pub use settlement::{
    DEFAULT_ENTRY_COST, DenialReason, EntryKind, EntryPolicy, GrantReceipt, SettlementOutcome,
};
