//! # session
//!
//! The Session Table (C3): process-wide remote-endpoint → IMEI binding for
//! the connection-oriented protocols (GT06, BSJ). A `DashMap` gives us
//! per-shard locking instead of one `RwLock` guarding the whole table
//! (§5: "readers never block writers beyond a map-level lock") — an
//! upgrade from a single coarse lock, not a different design.

use dashmap::DashMap;

/// `endpoint -> IMEI`. Entries persist until the process exits or a new
/// login frame rebinds the endpoint (re-login is idempotent, per §5).
#[derive(Debug, Default)]
pub struct SessionTable {
    bindings: DashMap<String, String>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self { bindings: DashMap::new() }
    }

    /// Binds `endpoint` to `imei`, overwriting any prior binding.
    pub fn bind(&self, endpoint: &str, imei: &str) {
        self.bindings.insert(endpoint.to_string(), imei.to_string());
    }

    /// Looks up the IMEI bound to `endpoint`, if any session has been
    /// established there.
    pub fn imei_for(&self, endpoint: &str) -> Option<String> {
        self.bindings.get(endpoint).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
