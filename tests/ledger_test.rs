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

//! Ledger public API integration tests.

use chrono::{Duration, Utc};
use gym_kiosk_rs::{
    DenialReason, EntryKind, EntryPolicy, Ledger, LedgerError, SettlementOutcome,
};
use std::sync::Arc;
use std::thread;

fn grant(outcome: SettlementOutcome) -> gym_kiosk_rs::GrantReceipt {
    match outcome {
        SettlementOutcome::Granted(receipt) => receipt,
        SettlementOutcome::Denied(reason) => panic!("expected grant, got denial: {:?}", reason),
    }
}

// === Registration ===

#[test]
fn register_creates_member() {
    let ledger = Ledger::new();
    let member = ledger.register("Alice", "A1", Some(10)).unwrap();

    assert_eq!(member.name, "Alice");
    assert_eq!(member.card_uid.as_str(), "A1");
    assert_eq!(member.credit, 10);
    assert!(member.scan_history.is_empty());
    assert!(member.topup_history.is_empty());
    assert_eq!(member.last_scan, member.created_at);
}

#[test]
fn register_trims_name_and_uid() {
    let ledger = Ledger::new();
    let member = ledger.register("  Alice  ", "  A1  ", None).unwrap();

    assert_eq!(member.name, "Alice");
    assert_eq!(member.card_uid.as_str(), "A1");
    assert!(ledger.find_by_uid("A1").is_some());
    assert!(ledger.find_by_name("Alice").is_some());
}

#[test]
fn register_defaults_credit_to_zero() {
    let ledger = Ledger::new();
    let member = ledger.register("Alice", "A1", None).unwrap();
    assert_eq!(member.credit, 0);
}

#[test]
fn register_clamps_negative_credit_to_zero() {
    let ledger = Ledger::new();
    let member = ledger.register("Alice", "A1", Some(-25)).unwrap();
    assert_eq!(member.credit, 0);
}

#[test]
fn register_rejects_blank_input() {
    let ledger = Ledger::new();
    assert_eq!(
        ledger.register("   ", "A1", None),
        Err(LedgerError::EmptyName)
    );
    assert_eq!(
        ledger.register("Alice", "  ", None),
        Err(LedgerError::EmptyUid)
    );
    assert_eq!(ledger.member_count(), 0);
}

#[test]
fn register_duplicate_card_rejected() {
    let ledger = Ledger::new();
    ledger.register("Alice", "A1", Some(10)).unwrap();

    let result = ledger.register("Bob", "A1", Some(99));
    assert_eq!(result, Err(LedgerError::DuplicateCard));

    // Original member unchanged, and Bob's name was never reserved.
    let alice = ledger.find_by_uid("A1").unwrap();
    assert_eq!(alice.name, "Alice");
    assert_eq!(alice.credit, 10);
    assert!(ledger.register("Bob", "B1", None).is_ok());
}

#[test]
fn register_duplicate_name_rejected() {
    let ledger = Ledger::new();
    ledger.register("Alice", "A1", Some(10)).unwrap();

    let result = ledger.register("Alice", "B1", None);
    assert_eq!(result, Err(LedgerError::DuplicateName));
    assert!(ledger.find_by_uid("B1").is_none());

    let alice = ledger.find_by_uid("A1").unwrap();
    assert_eq!(alice.credit, 10);
}

// === Settlement ===

#[test]
fn settle_charges_until_credit_exhausted() {
    let ledger = Ledger::new();
    ledger.register("Alice", "A1", Some(10)).unwrap();

    let first = grant(ledger.settle("A1", 5).unwrap());
    assert_eq!(first.previous_credit, 10);
    assert_eq!(first.member.credit, 5);
    assert_eq!(first.deducted, 5);

    let second = grant(ledger.settle("A1", 5).unwrap());
    assert_eq!(second.previous_credit, 5);
    assert_eq!(second.member.credit, 0);

    let third = ledger.settle("A1", 5).unwrap();
    match third {
        SettlementOutcome::Denied(DenialReason::InsufficientCredit { member }) => {
            assert_eq!(member.credit, 0);
        }
        other => panic!("expected insufficient-credit denial, got {:?}", other),
    }
    assert_eq!(ledger.find_by_uid("A1").unwrap().credit, 0);
}

#[test]
fn settle_unknown_uid_is_not_registered() {
    let ledger = Ledger::new();
    let outcome = ledger.settle("Z9", 5).unwrap();
    assert_eq!(
        outcome,
        SettlementOutcome::Denied(DenialReason::NotRegistered)
    );
}

#[test]
fn settle_blank_uid_is_invalid_input() {
    let ledger = Ledger::new();
    assert_eq!(ledger.settle("   ", 5), Err(LedgerError::EmptyUid));
}

#[test]
fn denied_settlement_mutates_nothing() {
    let ledger = Ledger::new();
    ledger.register("Alice", "A1", Some(3)).unwrap();
    let before = ledger.find_by_uid("A1").unwrap();

    let outcome = ledger.settle("A1", 5).unwrap();
    assert!(!outcome.granted());

    let after = ledger.find_by_uid("A1").unwrap();
    assert_eq!(after.credit, before.credit);
    assert_eq!(after.last_scan, before.last_scan);
    assert_eq!(after.scan_history, before.scan_history);
}

#[test]
fn settle_appends_scan_history() {
    let ledger = Ledger::new();
    ledger.register("Alice", "A1", Some(20)).unwrap();

    ledger.settle("A1", 5).unwrap();
    ledger.settle("A1", 5).unwrap();

    let alice = ledger.find_by_uid("A1").unwrap();
    assert_eq!(alice.scan_history.len(), 2);
    assert_eq!(alice.last_scan, *alice.scan_history.last().unwrap());
}

// === Re-entry Policy ===

#[test]
fn free_reentry_within_window() {
    let ledger = Ledger::new();
    let policy = EntryPolicy::default().with_free_reentry(Duration::hours(12));
    let registered = Utc::now() - Duration::hours(24);
    ledger
        .register_at("Alice", "A1", Some(10), registered)
        .unwrap();

    // First entry after the window expired: charged.
    let first = grant(
        ledger
            .settle_with_policy_at("A1", &policy, registered + Duration::hours(13))
            .unwrap(),
    );
    assert_eq!(first.kind, EntryKind::Charged);
    assert_eq!(first.member.credit, 5);

    // Back within 12 hours: free, nothing recorded.
    let repeat = grant(
        ledger
            .settle_with_policy_at("A1", &policy, registered + Duration::hours(14))
            .unwrap(),
    );
    assert_eq!(repeat.kind, EntryKind::FreeReentry);
    assert_eq!(repeat.deducted, 0);

    let alice = ledger.find_by_uid("A1").unwrap();
    assert_eq!(alice.credit, 5);
    assert_eq!(alice.scan_history.len(), 1);
}

#[test]
fn reentry_after_window_charges_again() {
    let ledger = Ledger::new();
    let policy = EntryPolicy::default().with_free_reentry(Duration::hours(12));
    let registered = Utc::now() - Duration::days(2);
    ledger
        .register_at("Alice", "A1", Some(10), registered)
        .unwrap();

    let first = grant(
        ledger
            .settle_with_policy_at("A1", &policy, registered + Duration::hours(13))
            .unwrap(),
    );
    assert_eq!(first.kind, EntryKind::Charged);

    let second = grant(
        ledger
            .settle_with_policy_at("A1", &policy, registered + Duration::hours(26))
            .unwrap(),
    );
    assert_eq!(second.kind, EntryKind::Charged);
    assert_eq!(ledger.find_by_uid("A1").unwrap().credit, 0);
}

#[test]
fn policy_without_window_always_charges() {
    let ledger = Ledger::new();
    let policy = EntryPolicy::default();
    let now = Utc::now();
    ledger.register_at("Alice", "A1", Some(10), now).unwrap();

    let first = grant(
        ledger
            .settle_with_policy_at("A1", &policy, now + Duration::minutes(1))
            .unwrap(),
    );
    let second = grant(
        ledger
            .settle_with_policy_at("A1", &policy, now + Duration::minutes(2))
            .unwrap(),
    );
    assert_eq!(first.kind, EntryKind::Charged);
    assert_eq!(second.kind, EntryKind::Charged);
    assert_eq!(second.member.credit, 0);
}

// === Verify ===

#[test]
fn verify_never_mutates() {
    let ledger = Ledger::new();
    ledger.register("Alice", "A1", Some(10)).unwrap();

    let outcome = ledger.verify("A1", &EntryPolicy::default()).unwrap();
    assert!(outcome.granted());

    let alice = ledger.find_by_uid("A1").unwrap();
    assert_eq!(alice.credit, 10);
    assert!(alice.scan_history.is_empty());
}

#[test]
fn verify_reports_unknown_and_poor_cards() {
    let ledger = Ledger::new();
    ledger.register("Alice", "A1", Some(3)).unwrap();
    let policy = EntryPolicy::default();

    assert_eq!(
        ledger.verify("Z9", &policy).unwrap(),
        SettlementOutcome::Denied(DenialReason::NotRegistered)
    );
    assert!(!ledger.verify("A1", &policy).unwrap().granted());
}

// === Top-up ===

#[test]
fn top_up_adds_credit_and_history() {
    let ledger = Ledger::new();
    ledger.register("Alice", "A1", None).unwrap();

    let receipt = ledger.top_up("A1", 20).unwrap();
    assert_eq!(receipt.previous_credit, 0);
    assert_eq!(receipt.member.credit, 20);
    assert_eq!(receipt.member.topup_history.len(), 1);
    assert_eq!(receipt.member.topup_history[0].amount, 20);
}

#[test]
fn top_up_rejects_bad_amounts() {
    let ledger = Ledger::new();
    ledger.register("Alice", "A1", Some(5)).unwrap();

    assert_eq!(ledger.top_up("A1", 0), Err(LedgerError::InvalidAmount));
    assert_eq!(ledger.top_up("A1", -10), Err(LedgerError::InvalidAmount));
    assert_eq!(ledger.find_by_uid("A1").unwrap().credit, 5);
    assert!(ledger.find_by_uid("A1").unwrap().topup_history.is_empty());
}

#[test]
fn top_up_unknown_member() {
    let ledger = Ledger::new();
    assert_eq!(ledger.top_up("Z9", 20), Err(LedgerError::MemberNotFound));
}

#[test]
fn top_up_then_settle() {
    let ledger = Ledger::new();
    ledger.register("Alice", "A1", Some(2)).unwrap();

    assert!(!ledger.settle("A1", 5).unwrap().granted());
    ledger.top_up("A1", 10).unwrap();
    let receipt = grant(ledger.settle("A1", 5).unwrap());
    assert_eq!(receipt.previous_credit, 12);
    assert_eq!(receipt.member.credit, 7);
}

// === Lookup and Listing ===

#[test]
fn find_by_name_trims_input() {
    let ledger = Ledger::new();
    ledger.register("Alice", "A1", Some(1)).unwrap();
    assert!(ledger.find_by_name("  Alice ").is_some());
    assert!(ledger.find_by_name("Bob").is_none());
}

#[test]
fn members_listed_newest_first() {
    let ledger = Ledger::new();
    let base = Utc::now();
    ledger.register_at("Alice", "A1", None, base).unwrap();
    ledger
        .register_at("Bob", "B1", None, base + Duration::minutes(1))
        .unwrap();
    ledger
        .register_at("Cara", "C1", None, base + Duration::minutes(2))
        .unwrap();

    let names: Vec<String> = ledger.members().into_iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["Cara", "Bob", "Alice"]);
}

// === Deletion ===

#[test]
fn remove_frees_card_and_name() {
    let ledger = Ledger::new();
    ledger.register("Alice", "A1", Some(10)).unwrap();

    let removed = ledger.remove("A1").unwrap();
    assert_eq!(removed.name, "Alice");
    assert_eq!(ledger.member_count(), 0);
    assert!(ledger.find_by_uid("A1").is_none());
    assert!(ledger.find_by_name("Alice").is_none());

    // Both keys are reusable after a hard delete.
    assert!(ledger.register("Alice", "A1", None).is_ok());
}

#[test]
fn remove_unknown_member() {
    let ledger = Ledger::new();
    assert_eq!(ledger.remove("Z9"), Err(LedgerError::MemberNotFound));
}

// === Concurrency ===

/// Concurrent settlements against one member must serialize: with credit
/// for exactly ten entries, exactly ten of twenty attempts succeed.
#[test]
fn concurrent_settlements_never_overdraw() {
    let ledger = Arc::new(Ledger::new());
    ledger.register("Alice", "A1", Some(50)).unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || ledger.settle("A1", 5).unwrap().granted())
        })
        .collect();

    let granted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|&granted| granted)
        .count();

    assert_eq!(granted, 10);
    assert_eq!(ledger.find_by_uid("A1").unwrap().credit, 0);
    assert_eq!(ledger.find_by_uid("A1").unwrap().scan_history.len(), 10);
}

/// A settlement racing a top-up must not lose either update.
#[test]
fn concurrent_settle_and_top_up_serialize() {
    let ledger = Arc::new(Ledger::new());
    ledger.register("Alice", "A1", Some(100)).unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let ledger = Arc::clone(&ledger);
        handles.push(thread::spawn(move || {
            if i % 2 == 0 {
                ledger.settle("A1", 5).unwrap().granted()
            } else {
                ledger.top_up("A1", 5).unwrap();
                true
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // 100 - 10 settlements * 5 + 10 top-ups * 5
    let alice = ledger.find_by_uid("A1").unwrap();
    assert_eq!(alice.credit, 100);
    assert_eq!(alice.scan_history.len(), 10);
    assert_eq!(alice.topup_history.len(), 10);
}
