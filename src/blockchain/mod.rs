// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain integration module for Avalanche C-Chain.
//!
//! This module provides functionality for:
//! - Network and token configuration (Fuji and mainnet)
//! - The ERC-20 interface used for the settlement token
//! - A signing client that broadcasts settlement transfers and polls for
//!   confirmations

pub mod client;
pub mod erc20;
pub mod types;

pub use client::{ChainError, SettlementClient, TxReceipt};
pub use types::*;
