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

//! Member registry and settlement authority.
//!
//! The [`Ledger`] owns every member record and is the only component
//! allowed to mutate one. It decides grant/deny for scans, applies
//! top-ups, and enforces card and name uniqueness at registration.
//!
//! # Operations
//!
//! | Operation | Behavior |
//! |-----------|----------|
//! | Register | Creates a member; card and name must be unused |
//! | Verify | Grant/deny preview, never mutates |
//! | Settle | Deducts the entry fee and records the visit |
//! | Top-up | Adds credit, appends the top-up record |
//! | Remove | Hard delete, frees the card and the name |
//!
//! # Thread Safety
//!
//! Members live in a [`DashMap`] keyed by card UID, so operations on
//! different cards run in parallel. Per-member linearizability comes from
//! each member's internal mutex: a settlement's balance check and
//! deduction cannot interleave with a concurrent top-up on the same card.
//! No code path holds two member locks at once.
//!
//! Every time-dependent operation has an `*_at` variant taking an
//! explicit instant; the plain forms stamp `Utc::now()`.

use crate::base::CardUid;
use crate::error::LedgerError;
use crate::member::{Member, MemberSnapshot, TopUpReceipt};
use crate::settlement::{DenialReason, EntryPolicy, SettlementOutcome};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

/// Credit ledger: member records indexed by card, with a unique-name
/// side index.
pub struct Ledger {
    /// Member records keyed by their card UID.
    members: DashMap<CardUid, Member>,
    /// Unique display names, mapping back to the owning card.
    names: DashMap<String, CardUid>,
}

impl Ledger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Ledger {
            members: DashMap::new(),
            names: DashMap::new(),
        }
    }

    /// Registers a new member.
    ///
    /// Negative initial credit is clamped to zero rather than rejected,
    /// matching the lenient admin-form contract.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::EmptyName`] / [`LedgerError::EmptyUid`] - blank input.
    /// - [`LedgerError::DuplicateCard`] - card UID already bound.
    /// - [`LedgerError::DuplicateName`] - display name already taken.
    pub fn register(
        &self,
        name: &str,
        card_uid: &str,
        initial_credit: Option<i64>,
    ) -> Result<MemberSnapshot, LedgerError> {
        self.register_at(name, card_uid, initial_credit, Utc::now())
    }

    pub fn register_at(
        &self,
        name: &str,
        card_uid: &str,
        initial_credit: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<MemberSnapshot, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::EmptyName);
        }
        let uid = CardUid::parse(card_uid).ok_or(LedgerError::EmptyUid)?;

        // Explicit clamp, not coercion: the admin form sends whatever the
        // operator typed.
        let credit = initial_credit.unwrap_or(0).clamp(0, u32::MAX as i64) as u32;

        // The card entry is claimed first; the name index is only written
        // once the card slot is known to be free. The reverse order would
        // leave a name reservation to roll back on a duplicate card.
        match self.members.entry(uid.clone()) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateCard),
            Entry::Vacant(slot) => match self.names.entry(name.to_string()) {
                Entry::Occupied(_) => Err(LedgerError::DuplicateName),
                Entry::Vacant(name_slot) => {
                    let member = Member::new(name.to_string(), uid.clone(), credit, now);
                    let snapshot = member.snapshot();
                    name_slot.insert(uid);
                    slot.insert(member);
                    debug!(name, card_uid = %snapshot.card_uid, credit, "member registered");
                    Ok(snapshot)
                }
            },
        }
    }

    /// Grant/deny preview for a scanned card; never mutates.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::EmptyUid`] before any registry access when
    /// the uid is blank. An unknown card is a business outcome
    /// ([`DenialReason::NotRegistered`]), not an error.
    pub fn verify(&self, raw_uid: &str, policy: &EntryPolicy) -> Result<SettlementOutcome, LedgerError> {
        self.verify_at(raw_uid, policy, Utc::now())
    }

    pub fn verify_at(
        &self,
        raw_uid: &str,
        policy: &EntryPolicy,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome, LedgerError> {
        let uid = CardUid::parse(raw_uid).ok_or(LedgerError::EmptyUid)?;
        let Some(member) = self.members.get(&uid) else {
            return Ok(SettlementOutcome::Denied(DenialReason::NotRegistered));
        };
        Ok(member.preview_entry(policy, now))
    }

    /// Unconditional-deduction settlement: charges `cost` regardless of
    /// any re-entry window.
    ///
    /// The balance check, deduction, `last_scan` update, and history
    /// append are one atomic step; a denial leaves the member untouched.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::EmptyUid`] for blank input.
    pub fn settle(&self, raw_uid: &str, cost: u32) -> Result<SettlementOutcome, LedgerError> {
        self.settle_at(raw_uid, cost, Utc::now())
    }

    pub fn settle_at(
        &self,
        raw_uid: &str,
        cost: u32,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome, LedgerError> {
        let uid = CardUid::parse(raw_uid).ok_or(LedgerError::EmptyUid)?;
        let Some(member) = self.members.get(&uid) else {
            return Ok(SettlementOutcome::Denied(DenialReason::NotRegistered));
        };
        let outcome = member.settle_entry(cost, now);
        debug!(card_uid = %uid, cost, granted = outcome.granted(), "scan settled");
        Ok(outcome)
    }

    /// Cool-down-aware settlement: free re-entry inside the policy
    /// window, charged entry otherwise. This is the variant bound to the
    /// HTTP settle endpoint; with no window configured it behaves exactly
    /// like [`Ledger::settle`].
    pub fn settle_with_policy(
        &self,
        raw_uid: &str,
        policy: &EntryPolicy,
    ) -> Result<SettlementOutcome, LedgerError> {
        self.settle_with_policy_at(raw_uid, policy, Utc::now())
    }

    pub fn settle_with_policy_at(
        &self,
        raw_uid: &str,
        policy: &EntryPolicy,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome, LedgerError> {
        let uid = CardUid::parse(raw_uid).ok_or(LedgerError::EmptyUid)?;
        let Some(member) = self.members.get(&uid) else {
            return Ok(SettlementOutcome::Denied(DenialReason::NotRegistered));
        };
        let outcome = member.settle_entry_with_policy(policy, now);
        debug!(card_uid = %uid, granted = outcome.granted(), "scan settled");
        Ok(outcome)
    }

    /// Adds credit to a member's balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::EmptyUid`] - blank card uid.
    /// - [`LedgerError::InvalidAmount`] - `amount` is zero or negative.
    /// - [`LedgerError::MemberNotFound`] - no member owns the card.
    pub fn top_up(&self, raw_uid: &str, amount: i64) -> Result<TopUpReceipt, LedgerError> {
        self.top_up_at(raw_uid, amount, Utc::now())
    }

    pub fn top_up_at(
        &self,
        raw_uid: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<TopUpReceipt, LedgerError> {
        let uid = CardUid::parse(raw_uid).ok_or(LedgerError::EmptyUid)?;
        let amount = u32::try_from(amount).map_err(|_| LedgerError::InvalidAmount)?;
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let member = self.members.get(&uid).ok_or(LedgerError::MemberNotFound)?;
        let receipt = member.apply_top_up(amount, now);
        debug!(card_uid = %uid, amount, credit = receipt.member.credit, "credit topped up");
        Ok(receipt)
    }

    /// Looks up a member by card UID.
    pub fn find_by_uid(&self, raw_uid: &str) -> Option<MemberSnapshot> {
        let uid = CardUid::parse(raw_uid)?;
        self.members.get(&uid).map(|member| member.snapshot())
    }

    /// Looks up a member by display name.
    pub fn find_by_name(&self, name: &str) -> Option<MemberSnapshot> {
        // Clone the uid out so no guard on the name index is held while
        // the member map is read.
        let uid = self.names.get(name.trim()).map(|entry| entry.value().clone())?;
        self.members.get(&uid).map(|member| member.snapshot())
    }

    /// Snapshots of every member, newest registration first.
    pub fn members(&self) -> Vec<MemberSnapshot> {
        let mut all: Vec<MemberSnapshot> = self
            .members
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Permanently removes a member, freeing both the card UID and the
    /// display name for future registrations.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::EmptyUid`] - blank card uid.
    /// - [`LedgerError::MemberNotFound`] - no member owns the card.
    pub fn remove(&self, raw_uid: &str) -> Result<MemberSnapshot, LedgerError> {
        let uid = CardUid::parse(raw_uid).ok_or(LedgerError::EmptyUid)?;
        let (_, member) = self
            .members
            .remove(&uid)
            .ok_or(LedgerError::MemberNotFound)?;
        let snapshot = member.snapshot();
        // Only drop the index entry if it still points at this card; the
        // name may already have been re-registered by the time we get here.
        self.names
            .remove_if(&snapshot.name, |_, owner| *owner == snapshot.card_uid);
        debug!(name = %snapshot.name, card_uid = %snapshot.card_uid, "member removed");
        Ok(snapshot)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
