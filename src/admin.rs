// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Administrative shared-secret gate.
//!
//! Status and fee mutations arriving through the administrative surface are
//! authorized here before any business logic runs. The gate is distinct from
//! end-user authentication: it checks presence and exact match of a single
//! shared secret, held and compared as a SHA-256 digest.

use sha2::{Digest, Sha256};

use crate::error::{LedgerError, LedgerResult};

pub struct AdminGate {
    expected_digest: Option<[u8; 32]>,
}

impl AdminGate {
    /// Build the gate from the configured secret. `None` (or an empty
    /// string) disables the administrative surface entirely.
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            expected_digest: secret.filter(|s| !s.is_empty()).map(digest),
        }
    }

    /// Require presence and exact match of the shared secret.
    pub fn authorize(&self, presented: Option<&str>) -> LedgerResult<()> {
        let expected = self.expected_digest.ok_or(LedgerError::Unauthorized)?;
        let presented = presented.ok_or(LedgerError::Unauthorized)?;
        if digest(presented) == expected {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized)
        }
    }
}

fn digest(secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}
