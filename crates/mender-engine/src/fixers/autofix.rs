//! The linter's own fixer, tried before any oracle call on lint issues.

use super::FixResult;
use mender_core::{FixError, Issue, ToolKind, Toolchain};
use std::path::Path;

pub const AUTOFIX_MODEL: &str = "linter";

/// Run the linter's fixer on the issue's file and hand the result back as a
/// candidate. The file on disk is put back to `original` so the caller can
/// apply and validate candidates the same way for every strategy.
pub fn run_autofix(
    toolchain: &dyn Toolchain,
    repo_root: &Path,
    issue: &Issue,
    original: &str,
) -> FixResult {
    let path = repo_root.join(&issue.file);
    // The fixer writes in place even when it fails or times out, so the
    // file goes back to `original` before any outcome is looked at.
    let ran = toolchain.run(ToolKind::LinterFix, Some(&issue.file));
    let rewritten = std::fs::read_to_string(&path);
    if let Err(err) = std::fs::write(&path, original) {
        return FixResult::failed(err.into(), 0.0, AUTOFIX_MODEL);
    }

    if let Err(err) = ran {
        return FixResult::failed(FixError::Io(format!("{:#}", err)), 0.0, AUTOFIX_MODEL);
    }
    let fixed = match rewritten {
        Ok(fixed) => fixed,
        Err(err) => return FixResult::failed(err.into(), 0.0, AUTOFIX_MODEL),
    };
    if fixed == original {
        return FixResult::failed(
            FixError::ValidationFailed("linter autofix made no change".to_string()),
            0.0,
            AUTOFIX_MODEL,
        );
    }
    FixResult::fixed(
        fixed,
        0.0,
        AUTOFIX_MODEL,
        "applied the linter's automatic fix".to_string(),
    )
}
