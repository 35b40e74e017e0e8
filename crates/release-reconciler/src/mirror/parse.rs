//! Git output parsing helpers.

use std::process::Output;

use super::types::FileChange;

/// Formats a git error with both stdout and stderr for better debugging.
pub fn format_git_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => format!(
            "Command failed with exit code {}",
            output.status.code().unwrap_or(-1)
        ),
        (true, false) => stdout,
        (false, true) => stderr,
        (false, false) => format!("{}\n{}", stderr, stdout),
    }
}

/// Parses `--numstat` output. Binary files (`-`) count as zero changed lines.
pub fn parse_numstat(output: &str) -> Vec<FileChange> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            let added = parts.next()?;
            let deleted = parts.next()?;
            let path = parts.next()?.trim();
            if path.is_empty() {
                return None;
            }
            let count = |s: &str| s.trim().parse::<u64>().unwrap_or(0);
            Some(FileChange {
                path: path.to_string(),
                lines: count(added) + count(deleted),
            })
        })
        .collect()
}

/// Extracts the object id a ref points to from `git ls-remote` output.
pub fn parse_ls_remote(output: &str, reference: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let sha = parts.next()?;
        let name = parts.next()?;
        (name == reference).then(|| sha.to_string())
    })
}

/// Parses `git branch -r` output into branch names without the remote prefix.
pub fn parse_remote_branches(output: &str, remote: &str) -> Vec<String> {
    let prefix = format!("{}/", remote);
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains(" -> "))
        .map(|line| line.strip_prefix(&prefix).unwrap_or(line).to_string())
        .collect()
}

/// Splits newline-separated output into non-empty trimmed lines.
pub fn non_empty_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_format_git_error_uses_exit_code_when_silent() {
        use std::os::unix::process::ExitStatusExt;
        let output = Output {
            status: std::process::ExitStatus::from_raw(128 << 8),
            stdout: Vec::new(),
            stderr: Vec::new(),
        };
        assert_eq!(format_git_error(&output), "Command failed with exit code 128");
    }

    #[test]
    fn test_parse_numstat_handles_binary_files() {
        let out = "3\t1\trs/execution/src/lib.rs\n-\t-\tassets/logo.png\n10\t0\tCargo.lock\n";
        let changes = parse_numstat(out);
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].path, "rs/execution/src/lib.rs");
        assert_eq!(changes[0].lines, 4);
        assert_eq!(changes[1].lines, 0);
        assert_eq!(changes[2].lines, 10);
    }

    #[test]
    fn test_parse_ls_remote() {
        let out = "0123abc\trefs/tags/release-2025-10-02_03-13-base\n";
        assert_eq!(
            parse_ls_remote(out, "refs/tags/release-2025-10-02_03-13-base").as_deref(),
            Some("0123abc")
        );
        assert_eq!(parse_ls_remote(out, "refs/tags/other"), None);
        assert_eq!(parse_ls_remote("", "refs/tags/other"), None);
    }

    #[test]
    fn test_parse_remote_branches_skips_symbolic_head() {
        let out = "  origin/HEAD -> origin/master\n  origin/master\n  origin/rc--2025-10-02_03-13\n";
        assert_eq!(
            parse_remote_branches(out, "origin"),
            vec!["master".to_string(), "rc--2025-10-02_03-13".to_string()]
        );
    }
}
