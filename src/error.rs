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

//! Error types for ledger and scan-queue operations.
//!
//! Insufficient credit is deliberately absent here: a scan that cannot be
//! afforded is an expected business outcome reported through
//! [`SettlementOutcome`](crate::SettlementOutcome), not an error.

use thiserror::Error;

/// Ledger operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Card UID is empty after trimming whitespace
    #[error("card uid must not be empty")]
    EmptyUid,

    /// Member name is empty after trimming whitespace
    #[error("member name must not be empty")]
    EmptyName,

    /// Top-up or deduction amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Referenced card or name has no registered member
    #[error("member not found")]
    MemberNotFound,

    /// Card UID is already bound to another member
    #[error("card already registered")]
    DuplicateCard,

    /// Display name is already taken by another member
    #[error("name already registered")]
    DuplicateName,
}
