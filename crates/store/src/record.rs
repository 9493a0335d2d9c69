//! Identity, versioning and bundle layout shared by the store backends.

use chrono::Utc;
use clinicdesk_core::record::{Resource, ResourceKind};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

/// `<prefix>-<base36 millis>-<6 random hex>`, e.g. `pat-lx2k9c1q-3f9a0b`.
pub fn new_record_id(kind: ResourceKind) -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", kind.id_prefix(), to_base36(millis), &random[..6])
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn meta(version: u64) -> Value {
    json!({
        "versionId": version.to_string(),
        "lastUpdated": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    })
}

pub fn record_id(resource: &Resource) -> Option<&str> {
    resource.get("id").and_then(Value::as_str)
}

pub fn version_of(resource: &Resource) -> u64 {
    resource
        .get("meta")
        .and_then(|m| m.get("versionId"))
        .and_then(Value::as_str)
        .and_then(|v| v.parse().ok())
        .unwrap_or(1)
}

/// Prepare a new record: force `resourceType`, keep a caller-supplied id,
/// otherwise mint one, and stamp version 1.
pub fn stamp_new(kind: ResourceKind, mut partial: Resource) -> Resource {
    partial.insert("resourceType".into(), json!(kind.resource_type()));
    let has_id = record_id(&partial).is_some_and(|id| !id.is_empty());
    if !has_id {
        partial.insert("id".into(), json!(new_record_id(kind)));
    }
    partial.insert("meta".into(), meta(1));
    partial
}

/// Shallow-merge `partial` over `existing`. `id` and `resourceType` never
/// change; the version is bumped by one.
pub fn apply_update(existing: &Resource, partial: Resource) -> Resource {
    let mut merged = existing.clone();
    for (key, value) in partial {
        if matches!(key.as_str(), "id" | "resourceType" | "meta") {
            continue;
        }
        merged.insert(key, value);
    }
    merged.insert("meta".into(), meta(version_of(existing) + 1));
    merged
}

/// On-disk collection bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub resource_type: String,
    #[serde(rename = "type")]
    pub bundle_type: String,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub entry: Vec<BundleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    #[serde(default)]
    pub full_url: String,
    pub resource: Resource,
}

impl Bundle {
    pub fn from_resources(resources: Vec<Resource>) -> Self {
        let entry: Vec<BundleEntry> = resources
            .into_iter()
            .map(|resource| BundleEntry {
                full_url: format!("urn:uuid:{}", record_id(&resource).unwrap_or_default()),
                resource,
            })
            .collect();
        Self {
            resource_type: "Bundle".into(),
            bundle_type: "collection".into(),
            total: entry.len(),
            entry,
        }
    }

    pub fn into_resources(self) -> Vec<Resource> {
        self.entry.into_iter().map(|e| e.resource).collect()
    }
}
