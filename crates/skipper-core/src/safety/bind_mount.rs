//! Bind-mount allowlist.
//!
//! A candidate host path is admitted iff, after POSIX normalization, it
//! equals or is a strict descendant of at least one allowlisted prefix.
//! Rejections carry a remediation payload the agent loop can turn into a
//! one-click allowlist update plus retry.

use serde_json::{json, Value};

/// Normalize a POSIX path: collapse `//` and `.`, resolve `..` without
/// escaping the root, strip any trailing slash.
pub fn normalize_posix_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() && !absolute {
                    // Relative escapes are kept literal so they never
                    // compare equal to an allowlisted prefix.
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Allowlist admission check.
pub fn is_path_allowed(allow_prefixes: &[String], candidate: &str) -> bool {
    let normalized = normalize_posix_path(candidate);
    if !normalized.starts_with('/') {
        return false;
    }

    allow_prefixes.iter().any(|prefix| {
        let prefix = normalize_posix_path(prefix);
        if prefix.is_empty() || !prefix.starts_with('/') {
            return false;
        }
        if normalized == prefix {
            return true;
        }
        let with_sep = if prefix == "/" {
            "/".to_string()
        } else {
            format!("{}/", prefix)
        };
        normalized.starts_with(&with_sep)
    })
}

/// `suggested_next_steps` payload for a rejected bind mount: update the
/// allowlist, then retry the original call with identical arguments.
pub fn remediation_steps(host_path: &str, original_tool: &str, original_params: &Value) -> Value {
    json!([
        {
            "tool": "org_bind_mount_allowlist_update",
            "params": {
                "add_prefixes": [normalize_posix_path(host_path)],
                "confirm": "CONFIRM_ALLOWLIST_CHANGE",
            },
        },
        {
            "tool": original_tool,
            "params": original_params,
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalization_collapses_segments() {
        assert_eq!(normalize_posix_path("/var//lib/./skipper/"), "/var/lib/skipper");
        assert_eq!(normalize_posix_path("/var/lib/../lib/skipper"), "/var/lib/skipper");
        assert_eq!(normalize_posix_path("/../etc"), "/etc");
    }

    #[test]
    fn descendant_and_exact_are_admitted() {
        let allow = prefixes(&["/var/lib/skipper"]);
        assert!(is_path_allowed(&allow, "/var/lib/skipper"));
        assert!(is_path_allowed(&allow, "/var/lib/skipper/app/data"));
        assert!(is_path_allowed(&allow, "/var/lib/skipper/../skipper/data"));
    }

    #[test]
    fn sibling_and_prefix_tricks_are_rejected() {
        let allow = prefixes(&["/var/lib/skipper"]);
        assert!(!is_path_allowed(&allow, "/var/lib/skipper-evil"));
        assert!(!is_path_allowed(&allow, "/srv/foo"));
        assert!(!is_path_allowed(&allow, "/var/lib/skipper/../other"));
        assert!(!is_path_allowed(&allow, "relative/path"));
    }

    #[test]
    fn empty_allowlist_admits_nothing() {
        assert!(!is_path_allowed(&[], "/var/lib/skipper"));
    }

    #[test]
    fn admission_is_monotone_in_the_prefix_set() {
        let small = prefixes(&["/var/lib/skipper"]);
        let large = prefixes(&["/var/lib/skipper", "/srv"]);
        for candidate in ["/var/lib/skipper/data", "/srv/foo", "/etc/passwd"] {
            if is_path_allowed(&small, candidate) {
                assert!(is_path_allowed(&large, candidate));
            }
        }
        assert!(is_path_allowed(&large, "/srv/foo"));
    }

    #[test]
    fn remediation_carries_update_then_retry() {
        let params = serde_json::json!({"host_path": "/srv/foo", "mount_path": "/data"});
        let steps = remediation_steps("/srv/foo", "mount_create", &params);
        assert_eq!(steps[0]["tool"], "org_bind_mount_allowlist_update");
        assert_eq!(steps[0]["params"]["add_prefixes"][0], "/srv/foo");
        assert_eq!(steps[1]["tool"], "mount_create");
        assert_eq!(steps[1]["params"], params);
    }
}
