use serde::Serialize;

use crate::domain::VersionStamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDecision {
    Skip,
    SyncNew,
    SyncUpdate,
}

impl SyncDecision {
    pub fn needs_sync(&self) -> bool {
        !matches!(self, SyncDecision::Skip)
    }
}

/// Compares the catalog's last committed version with the one observed
/// upstream.
///
/// No recorded version always means a first sync, whatever `observed` holds.
pub fn decide(recorded: Option<&VersionStamp>, observed: &VersionStamp) -> SyncDecision {
    match recorded {
        None => SyncDecision::SyncNew,
        Some(recorded) if recorded == observed => SyncDecision::Skip,
        Some(_) => SyncDecision::SyncUpdate,
    }
}
