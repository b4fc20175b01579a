//! Upload records.

use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One stored upload.
///
/// Items are never mutated after the index builder creates them; a later
/// generation either reuses the same value or drops it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Store ID, also the primary file name
    pub id: String,
    /// Display name read from the sidecar
    pub name: String,
    /// Size of the primary file in bytes
    pub size: u64,
    /// Modification time of the primary file
    pub modified: SystemTime,
    /// Public download URL
    pub url: String,
}

const SI_UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

impl Item {
    /// Size in SI units, e.g. `512 B`, `1.5 kB`, `83 MB`
    pub fn size_string(&self) -> String {
        human_bytes(self.size)
    }

    /// Local modification time as `YYYY-MM-DD HH:MM:SS`
    pub fn date_string(&self) -> String {
        let local: DateTime<Local> = self.modified.into();
        local.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

fn human_bytes(size: u64) -> String {
    if size < 10 {
        return format!("{size} B");
    }

    let mut exp = 0;
    let mut scale = 1u64;
    while exp + 1 < SI_UNITS.len() && size / scale >= 1000 {
        scale *= 1000;
        exp += 1;
    }

    let val = (size as f64 / scale as f64 * 10.0).round() / 10.0;
    if val < 10.0 {
        format!("{val:.1} {}", SI_UNITS[exp])
    } else {
        format!("{val:.0} {}", SI_UNITS[exp])
    }
}

/// Public URL template with `{id}` and `{name}` placeholders.
///
/// Substitution is a single pass, so placeholder-like text inside an ID or
/// name is copied verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn render(&self, id: &str, name: &str) -> String {
        let mut out = String::with_capacity(self.0.len() + id.len() + name.len());
        let mut rest = self.0.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix("{id}") {
                out.push_str(id);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{name}") {
                out.push_str(name);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}
