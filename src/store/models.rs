//! Row types persisted by the Store (C4).
//!
//! Grounded on `original_source/mcp_guardian/app/models.py`'s SQLAlchemy
//! models (`MCPService`, `MCPSnapshot`, `AuditLog`, `ApprovalStatus`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Drawn from `{USER_APPROVED, SYSTEM_APPROVED, UNAPPROVED}` (spec.md §3).
/// Stored as `TEXT` — sqlite has no native enum type — via the `Display`/
/// `FromStr` pair below, the same approach `sqlx`'s own sqlite examples use
/// for small closed vocabularies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalStatus {
    UserApproved,
    SystemApproved,
    Unapproved,
}

impl ApprovalStatus {
    pub fn is_approved(self) -> bool {
        matches!(self, ApprovalStatus::UserApproved | ApprovalStatus::SystemApproved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::UserApproved => "user_approved",
            ApprovalStatus::SystemApproved => "system_approved",
            ApprovalStatus::Unapproved => "unapproved",
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_approved" => Ok(ApprovalStatus::UserApproved),
            "system_approved" => Ok(ApprovalStatus::SystemApproved),
            "unapproved" => Ok(ApprovalStatus::Unapproved),
            other => Err(format!("unknown approval status: {other}")),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub upstream_url: String,
    pub enabled: bool,
    pub check_frequency_minutes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub id: i64,
    pub service_id: i64,
    pub snapshot_json: String,
    pub snapshot_hash: String,
    pub approved_status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
}

/// Raw row shape as it comes back from `sqlx`, before `approved_status` is
/// parsed out of its `TEXT` column.
#[derive(Debug, FromRow)]
pub(super) struct SnapshotRowRaw {
    pub id: i64,
    pub service_id: i64,
    pub snapshot_json: String,
    pub snapshot_hash: String,
    pub approved_status: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<SnapshotRowRaw> for SnapshotRow {
    type Error = crate::core::error::GuardianError;

    fn try_from(raw: SnapshotRowRaw) -> Result<Self, Self::Error> {
        let approved_status = raw
            .approved_status
            .parse()
            .map_err(crate::core::error::GuardianError::internal)?;
        Ok(Self {
            id: raw.id,
            service_id: raw.service_id,
            snapshot_json: raw.snapshot_json,
            snapshot_hash: raw.snapshot_hash,
            approved_status,
            created_at: raw.created_at,
        })
    }
}

/// Patch payload for `update_service` (spec.md §4.4): only `Some` fields
/// mutate.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServicePatch {
    pub upstream_url: Option<String>,
    pub enabled: Option<bool>,
    pub check_frequency_minutes: Option<i64>,
}

/// The check-frequency floor invariant (spec.md §3): `0` (checks disabled)
/// or `>= min_check_frequency`. Shared by the admin create/update handlers
/// and config-seeded service startup so neither path can bypass it.
pub fn validate_check_frequency(
    minutes: i64,
    min_check_frequency: i64,
) -> Result<(), crate::core::error::GuardianError> {
    if minutes > 0 && minutes < min_check_frequency {
        return Err(crate::core::error::GuardianError::config(format!(
            "check frequency must be 0 or >= {min_check_frequency} minutes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_status_round_trips_through_its_string_form() {
        for status in [
            ApprovalStatus::UserApproved,
            ApprovalStatus::SystemApproved,
            ApprovalStatus::Unapproved,
        ] {
            let parsed: ApprovalStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed.as_str(), status.as_str());
        }
    }

    #[test]
    fn only_approved_and_user_approved_count_as_approved() {
        assert!(ApprovalStatus::UserApproved.is_approved());
        assert!(ApprovalStatus::SystemApproved.is_approved());
        assert!(!ApprovalStatus::Unapproved.is_approved());
    }
}
