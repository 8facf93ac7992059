//! Repair passes against the member node
//!
//! `rectify` fills ledger entries from the node's object list by matching
//! checksums. `fix_access` rewrites the access policy of recent objects.

use crate::error::Result;
use crate::ledger::Ledger;
use crate::member_node::endpoints::resolve_url;
use crate::member_node::{AccessPolicy, AccessSettings, MemberNode, ObjectInfo};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Objects requested per `listObjects` page
pub const PAGE_SIZE: u32 = 1000;

/// Every object on the node, optionally only those modified since `from_date`
pub async fn list_all<N: MemberNode>(node: &N, from_date: Option<DateTime<Utc>>) -> Result<Vec<ObjectInfo>> {
    let mut objects = Vec::new();
    let mut start = 0u32;
    loop {
        let page = node.list_objects(start, PAGE_SIZE, from_date).await?;
        let received = page.objects.len() as u32;
        debug!(start, received, total = page.total, "Listed objects");
        objects.extend(page.objects);
        start += received;
        if received == 0 || start >= page.total {
            break;
        }
    }
    info!(objects = objects.len(), "Listed member node objects");
    Ok(objects)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RectifySummary {
    pub listed: usize,
    pub updated: usize,
    pub unmatched: usize,
    /// Checksums carried by more than one object on the node
    pub ambiguous: usize,
}

/// Fill ledger identifiers, format ids and URLs from the node's object list
///
/// Entries that already have an identifier are left alone unless
/// `overwrite` is set.
pub async fn rectify<N: MemberNode>(
    node: &N,
    ledger: &mut Ledger,
    cn_url: &str,
    overwrite: bool,
) -> Result<RectifySummary> {
    let objects = list_all(node, None).await?;
    let mut summary = RectifySummary {
        listed: objects.len(),
        ..Default::default()
    };

    let mut by_checksum: HashMap<String, &ObjectInfo> = HashMap::new();
    for object in &objects {
        let key = object.checksum.value.to_ascii_lowercase();
        if by_checksum.contains_key(&key) {
            warn!(checksum = %key, identifier = %object.identifier, "Checksum shared by several objects, keeping the first");
            summary.ambiguous += 1;
            continue;
        }
        by_checksum.insert(key, object);
    }

    for record in ledger.records_mut() {
        let Some(object) = by_checksum.get(&record.checksum.to_ascii_lowercase()) else {
            summary.unmatched += 1;
            continue;
        };
        let replace_identifier = overwrite || record.identifier.is_empty();
        let mut changed = false;
        if replace_identifier && record.identifier != object.identifier {
            record.identifier = object.identifier.clone();
            changed = true;
        }
        if (replace_identifier || record.format_id.is_empty()) && record.format_id != object.format_id {
            record.format_id = object.format_id.clone();
            changed = true;
        }
        let url = resolve_url(cn_url, &record.identifier);
        if (replace_identifier || record.url.is_empty()) && record.url != url {
            record.url = url;
            changed = true;
        }
        if changed {
            debug!(file = %record.filename, identifier = %record.identifier, "Rectified ledger entry");
            summary.updated += 1;
        }
    }

    info!(
        updated = summary.updated,
        unmatched = summary.unmatched,
        ambiguous = summary.ambiguous,
        "Rectified ledger"
    );
    Ok(summary)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessSummary {
    pub listed: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: Vec<(String, String)>,
}

/// Replace the access policy of every object modified in the last `days` days
pub async fn fix_access<N: MemberNode>(node: &N, days: u32, access: &AccessSettings) -> Result<AccessSummary> {
    let from = Utc::now() - Duration::days(i64::from(days));
    let objects = list_all(node, Some(from)).await?;
    let policy = AccessPolicy::from_settings(access);
    let mut summary = AccessSummary {
        listed: objects.len(),
        ..Default::default()
    };

    for object in &objects {
        let pid = object.identifier.as_str();
        let mut meta = match node.get_system_metadata(pid).await {
            Ok(meta) => meta,
            Err(e) => {
                error!(pid, error = %e, "Could not read system metadata");
                summary.failed.push((pid.to_string(), e.to_string()));
                continue;
            },
        };
        if meta.access_policy.as_ref() == Some(&policy) {
            summary.unchanged += 1;
            continue;
        }
        meta.access_policy = Some(policy.clone());
        match node.update_system_metadata(pid, &meta).await {
            Ok(()) => {
                info!(pid, "Updated access policy");
                summary.updated += 1;
            },
            Err(e) => {
                error!(pid, error = %e, "Could not update access policy");
                summary.failed.push((pid.to_string(), e.to_string()));
            },
        }
    }
    Ok(summary)
}
