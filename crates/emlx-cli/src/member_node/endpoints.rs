//! DataONE v2 endpoint URL builders

use chrono::{DateTime, SecondsFormat, Utc};

fn base(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

/// `MNStorage.create`
pub fn object_url(base_url: &str) -> String {
    format!("{}/v2/object", base(base_url))
}

/// `MNRead.getSystemMetadata`
pub fn meta_url(base_url: &str, pid: &str) -> String {
    format!("{}/v2/meta/{}", base(base_url), urlencoding::encode(pid))
}

/// `MNStorage.updateSystemMetadata`
pub fn meta_update_url(base_url: &str) -> String {
    format!("{}/v2/meta", base(base_url))
}

/// `MNRead.listObjects`
pub fn list_objects_url(base_url: &str, start: u32, count: u32, from_date: Option<DateTime<Utc>>) -> String {
    let mut url = format!("{}/v2/object?start={}&count={}", base(base_url), start, count);
    if let Some(from) = from_date {
        let stamp = from.to_rfc3339_opts(SecondsFormat::Secs, true);
        url.push_str(&format!("&fromDate={}", urlencoding::encode(&stamp)));
    }
    url
}

/// Coordinating-node resolve URL recorded in the ledger
pub fn resolve_url(cn_url: &str, pid: &str) -> String {
    format!("{}/v2/resolve/{}", base(cn_url), urlencoding::encode(pid))
}
