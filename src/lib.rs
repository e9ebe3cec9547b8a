// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Ledger - Custodial Token Ledger & Settlement Service
//!
//! This crate keeps the off-chain accounting ledger for custodial rEUR
//! balances and settles approved withdrawal requests as real ERC-20
//! transfers on Avalanche.
//!
//! ## Modules
//!
//! - `storage` - Embedded ledger database (redb): wallets, balances,
//!   entries, withdrawal requests
//! - `blockchain` - Avalanche C-Chain integration (alloy)
//! - `settlement` - Worker that drains approved withdrawals on-chain
//! - `admin` - Administrative shared-secret gate
//! - `config` - Environment-driven runtime configuration

pub mod admin;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod settlement;
pub mod state;
pub mod storage;
