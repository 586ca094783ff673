//! Validator: re-run the tool that reported an issue and decide whether a
//! candidate on disk really resolved it.
//!
//! A pass needs two things against the last accepted state of the file: the
//! issue's fingerprint is reported fewer times, and the source reports fewer
//! findings for that file overall. The second check catches a fix that
//! trades one finding for another.

use crate::scan::Scanner;
use mender_core::{FixError, Issue};
use std::collections::HashMap;
use std::path::PathBuf;

type FileKey = (String, PathBuf);

pub struct Validator<'a> {
    scanner: &'a Scanner<'a>,
    per_file: HashMap<FileKey, usize>,
    per_fingerprint: HashMap<(FileKey, String), usize>,
}

impl<'a> Validator<'a> {
    /// `baseline` is the full scan the run started from.
    pub fn new(scanner: &'a Scanner<'a>, baseline: &[Issue]) -> Self {
        let mut validator = Self {
            scanner,
            per_file: HashMap::new(),
            per_fingerprint: HashMap::new(),
        };
        for issue in baseline {
            *validator.per_file.entry(key(issue)).or_default() += 1;
            *validator
                .per_fingerprint
                .entry((key(issue), issue.fingerprint.clone()))
                .or_default() += 1;
        }
        validator
    }

    pub fn validate(&mut self, issue: &Issue) -> bool {
        self.check(issue).is_ok()
    }

    /// On a pass the file's new findings become its baseline, so a second
    /// fix in the same file is measured against the first.
    pub fn check(&mut self, issue: &Issue) -> Result<(), FixError> {
        let after = self.scanner.rescan(issue).map_err(|err| {
            FixError::ValidationFailed(format!("{} rescan failed: {}", issue.source, err))
        })?;

        let file_key = key(issue);
        let before_total = self.per_file.get(&file_key).copied().unwrap_or(1);
        let before_same = self
            .per_fingerprint
            .get(&(file_key.clone(), issue.fingerprint.clone()))
            .copied()
            .unwrap_or(1);
        let after_same = after
            .iter()
            .filter(|found| found.fingerprint == issue.fingerprint)
            .count();

        if after_same >= before_same {
            return Err(FixError::ValidationFailed(format!(
                "{} still reports the issue",
                issue.source
            )));
        }
        if after.len() >= before_total {
            return Err(FixError::ValidationFailed(format!(
                "{} reports {} finding(s) in {} (was {})",
                issue.source,
                after.len(),
                issue.file.display(),
                before_total
            )));
        }

        self.per_file.insert(file_key.clone(), after.len());
        self.per_fingerprint.retain(|(k, _), _| *k != file_key);
        for found in &after {
            *self
                .per_fingerprint
                .entry((file_key.clone(), found.fingerprint.clone()))
                .or_default() += 1;
        }
        Ok(())
    }
}

fn key(issue: &Issue) -> FileKey {
    (issue.source.clone(), issue.file.clone())
}
