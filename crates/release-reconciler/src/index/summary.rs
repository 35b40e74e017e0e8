//! Proposal summary text derived from a published changelog.

use crate::types::OsKind;

const EXCLUDED_CHANGES_MARKER: &str = "\n## Excluded Changes";

/// Builds the summary submitted with an election proposal.
///
/// The excluded-changes section is replaced by a link to the full published
/// changelog and the IC-OS verification instructions are appended.
pub fn proposal_summary(
    changelog: &str,
    version: &str,
    os_kind: OsKind,
    security_fix: bool,
    full_list_url: &str,
) -> String {
    let relevant = match changelog.find(EXCLUDED_CHANGES_MARKER) {
        Some(idx) => &changelog[..idx],
        None => changelog.trim_end_matches('\n'),
    };

    format!(
        "{}\nFull list of changes (including the ones that are not relevant to {}) can be found on [GitHub]({}).\n{}",
        relevant,
        os_kind,
        full_list_url,
        verification_instructions(version, os_kind, security_fix)
    )
}

fn verification_instructions(version: &str, os_kind: OsKind, security_fix: bool) -> String {
    let caveat = if security_fix {
        "\n_You will be able to follow the instructions below as soon as the source code has been released._\n"
    } else {
        ""
    };
    let other = match os_kind {
        OsKind::GuestOs => OsKind::HostOs,
        OsKind::HostOs => OsKind::GuestOs,
    };

    format!(
        r#"
# IC-OS Verification
{caveat}
To build and verify the IC-OS disk image, run:

```
# From https://github.com/dfinity/ic#verifying-releases
sudo apt-get install -y curl && curl --proto '=https' --tlsv1.2 -sSLO https://raw.githubusercontent.com/dfinity/ic/{version}/ci/tools/repro-check.sh && chmod +x repro-check.sh && ./repro-check.sh -c {version} {flag}
```

The two SHA256 sums printed above from a) the downloaded CDN image and b) the locally built image, must be identical, and must match the SHA256 from the payload of the NNS proposal.

While not required for this NNS proposal, as we are only electing a new {os} version here, you have the option to verify the build reproducibility of the {other} by passing `{other_flag}` to the script above instead of `{flag}`, or the SetupOS by passing `--setupos`.
"#,
        caveat = caveat,
        version = version,
        flag = os_kind.repro_check_flag(),
        os = os_kind,
        other = other,
        other_flag = other.repro_check_flag(),
    )
}
