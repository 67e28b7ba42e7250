//! CLI version compatibility against `minCliVersion`

use super::resolved::ResolvedConfig;
use semver::Version;

/// Key a project uses to declare the oldest CLI it supports
pub const MIN_VERSION_KEY: &str = "minCliVersion";

/// Compare the running CLI version against the project's minimum.
/// Returns a warning if the CLI is older; unparsable versions are ignored.
pub fn check_compatibility(cli_version: &str, required: &str) -> Option<String> {
    let cli_ver = parse_version(cli_version)?;
    let required_ver = parse_version(required)?;

    if cli_ver < required_ver {
        Some(format!(
            "This project expects stackup {} or newer, you are running {}",
            required, cli_version
        ))
    } else {
        None
    }
}

/// Check the resolved config's `minCliVersion`, logging a warning if the CLI is too old
pub fn check_config(config: &ResolvedConfig, cli_version: &str) -> Option<String> {
    let required = config.get_str(MIN_VERSION_KEY)?;
    let warning = check_compatibility(cli_version, required)?;
    tracing::warn!(required, cli_version, "CLI older than project requires");
    Some(warning)
}

/// Parse a version string, tolerating a leading 'v'
fn parse_version(version_str: &str) -> Option<Version> {
    let cleaned = version_str.trim();
    let cleaned = cleaned.strip_prefix('v').unwrap_or(cleaned);
    Version::parse(cleaned).ok()
}
