//! Structured diff between two snapshots, used by the admin `GET
//! .../diff` endpoint (C8).
//!
//! Grounded on `original_source/mcp_guardian/app/services/diff.py`
//! (`compare_list_section`'s added/removed/common-by-key-field shape).
//! `flatten_keys`/`create_human_readable_diff` are dropped: nothing in
//! spec.md's admin surface consumes a flattened key list or a prose summary,
//! only the per-family added/removed/common sets the UI renders directly.

use serde::Serialize;
use serde_json::Value;

use crate::core::error::{GuardianError, GuardianResult};
use crate::store::models::SnapshotRow;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SectionDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub common: Vec<String>,
    pub count_old: usize,
    pub count_new: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotDiff {
    pub changed: bool,
    pub tools: SectionDiff,
    pub resources: SectionDiff,
    pub resource_templates: SectionDiff,
    pub prompts: SectionDiff,
}

/// Diff `old` against `new`. Returns `Ok(None)` when they're the same row
/// (spec.md: comparing a snapshot to itself yields a null diff) rather than
/// an all-empty `SnapshotDiff`.
pub fn diff_snapshots(old: &SnapshotRow, new: &SnapshotRow) -> GuardianResult<Option<SnapshotDiff>> {
    if old.id == new.id {
        return Ok(None);
    }

    let old_value: Value = serde_json::from_str(&old.snapshot_json)?;
    let new_value: Value = serde_json::from_str(&new.snapshot_json)?;

    let tools = compare_section(&old_value, &new_value, "tools", "name");
    let resources = compare_section(&old_value, &new_value, "resources", "uri");
    let resource_templates =
        compare_section(&old_value, &new_value, "resource_templates", "uriTemplate");
    let prompts = compare_section(&old_value, &new_value, "prompts", "name");

    Ok(Some(SnapshotDiff {
        changed: old.snapshot_hash != new.snapshot_hash,
        tools,
        resources,
        resource_templates,
        prompts,
    }))
}

fn compare_section(old: &Value, new: &Value, section: &str, key_field: &str) -> SectionDiff {
    let old_list = section_items(old, section);
    let new_list = section_items(new, section);

    let old_keys = section_keys(&old_list, key_field);
    let new_keys = section_keys(&new_list, key_field);

    let added: Vec<String> = new_keys.difference(&old_keys).cloned().collect();
    let removed: Vec<String> = old_keys.difference(&new_keys).cloned().collect();
    let common: Vec<String> = old_keys.intersection(&new_keys).cloned().collect();

    SectionDiff {
        added,
        removed,
        common,
        count_old: old_list.len(),
        count_new: new_list.len(),
    }
}

fn section_items<'a>(value: &'a Value, section: &str) -> Vec<&'a Value> {
    value
        .get(section)
        .and_then(Value::as_array)
        .map(|items| items.iter().collect())
        .unwrap_or_default()
}

fn section_keys(items: &[&Value], key_field: &str) -> std::collections::BTreeSet<String> {
    items
        .iter()
        .filter_map(|item| item.get(key_field).and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// Parse error helper kept distinct from `diff_snapshots`'s own `?` so a
/// malformed stored snapshot surfaces as `Internal`, not a generic
/// serialization error — stored snapshots are always canonicalizer output,
/// so this should be unreachable.
#[allow(dead_code)]
fn malformed_snapshot(err: serde_json::Error) -> GuardianError {
    GuardianError::internal(format!("stored snapshot is not valid JSON: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn row(id: i64, hash: &str, value: Value) -> SnapshotRow {
        SnapshotRow {
            id,
            service_id: 1,
            snapshot_json: value.to_string(),
            snapshot_hash: hash.to_string(),
            approved_status: crate::store::models::ApprovalStatus::Unapproved,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn comparing_a_row_to_itself_is_null() {
        let snapshot = row(1, "h0", json!({"tools": []}));
        assert!(diff_snapshots(&snapshot, &snapshot).unwrap().is_none());
    }

    #[test]
    fn added_and_removed_tools_are_reported() {
        let old = row(
            1,
            "h0",
            json!({"tools": [{"name": "read"}], "resources": [], "resource_templates": [], "prompts": []}),
        );
        let new = row(
            2,
            "h1",
            json!({"tools": [{"name": "read"}, {"name": "write"}], "resources": [], "resource_templates": [], "prompts": []}),
        );

        let diff = diff_snapshots(&old, &new).unwrap().unwrap();
        assert!(diff.changed);
        assert_eq!(diff.tools.added, vec!["write".to_string()]);
        assert!(diff.tools.removed.is_empty());
        assert_eq!(diff.tools.common, vec!["read".to_string()]);
    }

    #[test]
    fn identical_content_under_different_ids_reports_unchanged() {
        let content = json!({"tools": [{"name": "read"}], "resources": [], "resource_templates": [], "prompts": []});
        let old = row(1, "h0", content.clone());
        let new = row(2, "h0", content);

        let diff = diff_snapshots(&old, &new).unwrap().unwrap();
        assert!(!diff.changed);
        assert!(diff.tools.added.is_empty());
        assert!(diff.tools.removed.is_empty());
    }
}
