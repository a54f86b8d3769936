//! Utility functions for minifs

use std::time::{SystemTime, UNIX_EPOCH};

/// Longest file_id accepted, matching common filesystem name limits
const MAX_FILE_ID_LEN: usize = 255;

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

/// Parse duration string (e.g., "500ms", "30s", "5m", "1h")
pub fn parse_duration(s: &str) -> crate::Result<std::time::Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }
    // zero needs no unit; "0" is how timeouts are switched off
    if s == "0" {
        return Ok(std::time::Duration::ZERO);
    }

    let (num_str, unit) = match s.strip_suffix("ms") {
        Some(num) => (num, "ms"),
        None => {
            let split = s.len() - s.chars().last().map(char::len_utf8).unwrap_or(0);
            (&s[..split], &s[split..])
        }
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let duration = match unit {
        "ms" => std::time::Duration::from_millis(num),
        "s" => std::time::Duration::from_secs(num),
        "m" => std::time::Duration::from_secs(num * 60),
        "h" => std::time::Duration::from_secs(num * 3600),
        _ => {
            return Err(crate::Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };

    Ok(duration)
}

/// Get current Unix timestamp (milliseconds)
pub fn timestamp_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Short node id used when a storage node is not given one
pub fn generate_node_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Validate a file_id. It names a file inside a node's storage directory,
/// so it must be exactly one plain path component.
pub fn validate_file_id(file_id: &str) -> crate::Result<()> {
    if file_id.is_empty() {
        return Err(crate::Error::Protocol("file_id cannot be empty".into()));
    }

    if file_id.len() > MAX_FILE_ID_LEN {
        return Err(crate::Error::Protocol(format!(
            "file_id too long (max {} bytes)",
            MAX_FILE_ID_LEN
        )));
    }

    if file_id.starts_with('.') {
        return Err(crate::Error::Protocol(
            "file_id cannot start with '.'".into(),
        ));
    }

    if file_id
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(crate::Error::Protocol(
            "file_id contains invalid characters".into(),
        ));
    }

    Ok(())
}
