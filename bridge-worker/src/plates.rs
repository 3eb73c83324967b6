//! # plates
//!
//! §2 supplemented feature: the IMEI-spoof/plates lookup the original
//! annotates its binding record with (`common/utils/plates.go`,
//! `imei_spoof.go`). The HTTP/SQL client itself is an external
//! collaborator (§1, §6 `PLATES_URL`/`SPOOF_IMEI_URL`) — this module only
//! defines the seam the worker calls through, plus a no-op default so a
//! deployment with no lookup service configured still runs.

use async_trait::async_trait;

/// One binding-record annotation (§6's `{imei, protocol, remoteaddr}`
/// shape, extended with whatever the lookup resolves).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlateInfo {
    pub plate: Option<String>,
    pub spoofed_imei: Option<String>,
}

#[async_trait]
pub trait PlateLookup: Send + Sync {
    async fn lookup(&self, imei: &str) -> PlateInfo;
}

/// No external lookup configured: every IMEI resolves to an empty
/// annotation. This is the default when `PLATES_URL`/`SPOOF_IMEI_URL`
/// are unset (§6).
#[derive(Debug, Default)]
pub struct NoopPlateLookup;

#[async_trait]
impl PlateLookup for NoopPlateLookup {
    async fn lookup(&self, _imei: &str) -> PlateInfo {
        PlateInfo::default()
    }
}
