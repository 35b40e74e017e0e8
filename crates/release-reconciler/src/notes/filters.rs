//! Rules that exclude a commit from the OS release notes.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::mirror::FileChange;

/// Paths that never affect the OS images on their own.
static EXCLUDE_CHANGES_FILTERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"sns",
        r"ckbtc",
        r"cketh",
        r"rs/nns.+",
        r"test",
        r"^bazel",
        r"boundary",
        r"rosetta",
        r"pocket[_-]ic",
        r"^Cargo.lock$",
        r"registry/admin",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Paths that are relevant even though a filter matches them.
pub const INCLUDE_CHANGES: &[&str] = &["bazel/external_crates.bzl"];

/// Commit scopes unrelated to the OS images.
pub const EXCLUDED_SCOPES: &[&str] = &["ic-admin", "nns", "sns", "PocketIC", "registry"];

/// Canister code is excluded, except for the replica's own canister subsystems.
const CANISTER_ALLOWED_SUFFIXES: &[&str] = &["_state", "_manager", "_snapshot", "_sandbox"];

fn mentions_canister_code(path: &str) -> bool {
    path.match_indices("canister").any(|(idx, m)| {
        let rest = &path[idx + m.len()..];
        !CANISTER_ALLOWED_SUFFIXES.iter().any(|s| rest.starts_with(s))
    })
}

/// Whether a single path is filtered out.
pub fn is_excluded_path(path: &str) -> bool {
    if INCLUDE_CHANGES.contains(&path) {
        return false;
    }
    EXCLUDE_CHANGES_FILTERS.iter().any(|re| re.is_match(path)) || mentions_canister_code(path)
}

/// True when every changed file is filtered out.
pub fn all_paths_excluded(changes: &[FileChange]) -> bool {
    changes.iter().all(|c| is_excluded_path(&c.path))
}

pub fn is_excluded_scope(scope: &str) -> bool {
    EXCLUDED_SCOPES.contains(&scope)
}

/// Directory prefix of a build label: `//rs/execution:lib` becomes `rs/execution/`.
pub fn package_prefix(label: &str) -> Option<String> {
    let rest = label.strip_prefix("//")?;
    let package = rest.split(':').next().unwrap_or(rest);
    if package.is_empty() {
        Some(String::new())
    } else {
        Some(format!("{}/", package))
    }
}

/// Whether any changed file lives in one of the given packages.
///
/// The root package only covers files at the repository root.
pub fn touches_packages(changes: &[FileChange], packages: &BTreeSet<String>) -> bool {
    let prefixes: BTreeSet<String> = packages.iter().filter_map(|l| package_prefix(l)).collect();
    changes.iter().any(|change| {
        prefixes.iter().any(|prefix| {
            if prefix.is_empty() {
                !change.path.contains('/')
            } else {
                change.path.starts_with(prefix.as_str())
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes(paths: &[&str]) -> Vec<FileChange> {
        paths
            .iter()
            .map(|p| FileChange {
                path: p.to_string(),
                lines: 1,
            })
            .collect()
    }

    #[test]
    fn test_path_filters() {
        assert!(is_excluded_path("Cargo.lock"));
        assert!(is_excluded_path("rs/nns/governance/src/lib.rs"));
        assert!(is_excluded_path("bazel/defs.bzl"));
        assert!(!is_excluded_path("bazel/external_crates.bzl"));
        assert!(is_excluded_path("rs/tests/driver/src/lib.rs"));
        assert!(!is_excluded_path("rs/execution_environment/src/lib.rs"));
    }

    #[test]
    fn test_canister_paths() {
        assert!(is_excluded_path("rs/ledger_canister/src/main.rs"));
        assert!(!is_excluded_path("rs/canister_sandbox/src/lib.rs"));
        assert!(!is_excluded_path("rs/replicated_state/src/canister_state.rs"));
        assert!(is_excluded_path("rs/canister_state/src/canister/x.rs"));
    }

    #[test]
    fn test_all_paths_excluded_needs_every_file() {
        assert!(all_paths_excluded(&changes(&["Cargo.lock", "rs/sns/x.rs"])));
        assert!(!all_paths_excluded(&changes(&["Cargo.lock", "rs/execution/x.rs"])));
    }

    #[test]
    fn test_package_matching() {
        let packages: BTreeSet<String> = ["//rs/execution:lib", "//ic-os/guestos:img"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(touches_packages(&changes(&["rs/execution/src/lib.rs"]), &packages));
        assert!(!touches_packages(&changes(&["rs/execution_environment/src/lib.rs"]), &packages));
        assert_eq!(package_prefix("//:BUILD").as_deref(), Some(""));
        assert_eq!(package_prefix("@x//:y"), None);
    }

    #[test]
    fn test_scopes() {
        assert!(is_excluded_scope("nns"));
        assert!(!is_excluded_scope("execution"));
    }
}
