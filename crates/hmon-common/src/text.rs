//! Sanitization and message assembly shared by trigger-generated alerts and
//! externally ingested ones, so both end up stored the same way.

use std::collections::HashMap;

/// Cap for label-like values (alert name, severity, hostnames).
pub const LABEL_MAX_LEN: usize = 200;

/// Cap for free-text values (summary, description).
pub const ANNOTATION_MAX_LEN: usize = 500;

/// Collapses control characters to spaces, normalizes runs of whitespace to a
/// single space, trims, and caps the result at `max_len` characters.
///
/// # Examples
///
/// ```
/// use hmon_common::text::sanitize;
///
/// assert_eq!(sanitize("disk\tfull\r\n  on /data", 100), "disk full on /data");
/// assert_eq!(sanitize("abcdef", 3), "abc");
/// ```
pub fn sanitize(value: &str, max_len: usize) -> String {
    let replaced: String = value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_len)
        .collect()
}

/// Sanitizes every value of a label/annotation map, dropping empty keys.
pub fn sanitize_map(data: &HashMap<String, String>, max_len: usize) -> HashMap<String, String> {
    data.iter()
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.clone(), sanitize(value, max_len)))
        .collect()
}

/// Raw inputs for an alert message. Every field is optional; absent or
/// blank fields are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageParts<'a> {
    pub summary: Option<&'a str>,
    pub description: Option<&'a str>,
    pub alert_name: Option<&'a str>,
    pub severity: Option<&'a str>,
}

/// Builds a stored alert message: summary, then description (when it
/// differs from the summary), falling back to `fallback` when neither is
/// present, followed by `Alert: <name>` and `Severity: <level>` lines.
///
/// # Examples
///
/// ```
/// use hmon_common::text::{build_message, MessageParts};
///
/// let msg = build_message(
///     &MessageParts {
///         summary: Some("CPU\nhigh"),
///         alert_name: Some("HighCPU"),
///         ..Default::default()
///     },
///     "Alert received.",
/// );
/// assert_eq!(msg, "CPU high\nAlert: HighCPU");
/// ```
pub fn build_message(parts: &MessageParts<'_>, fallback: &str) -> String {
    let clean = |value: Option<&str>, max_len: usize| {
        value
            .map(|v| sanitize(v, max_len))
            .filter(|v| !v.is_empty())
    };

    let summary = clean(parts.summary, ANNOTATION_MAX_LEN);
    let description = clean(parts.description, ANNOTATION_MAX_LEN);
    let alert_name = clean(parts.alert_name, LABEL_MAX_LEN);
    let severity = clean(parts.severity, LABEL_MAX_LEN);

    let mut lines = Vec::with_capacity(4);
    if let Some(summary) = &summary {
        lines.push(summary.clone());
    }
    if let Some(description) = description {
        if summary.as_deref() != Some(description.as_str()) {
            lines.push(description);
        }
    }
    if lines.is_empty() {
        lines.push(sanitize(fallback, ANNOTATION_MAX_LEN));
    }
    if let Some(name) = alert_name {
        lines.push(format!("Alert: {name}"));
    }
    if let Some(severity) = severity {
        lines.push(format!("Severity: {severity}"));
    }
    lines.join("\n")
}
