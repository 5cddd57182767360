//! Ownership scopes and per-file coverage.
//!
//! An ownership scope is a directory that declares an approver set; the
//! scope covers its whole subtree until a nested directory declares its own
//! set. A changed file is covered once the accumulated approver set
//! intersects the approver set of the file's nearest declaring directory.

use std::collections::{BTreeMap, BTreeSet};

/// A declaring directory together with its approver set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipScope {
    /// Declaring directory, `""` for the repository root.
    pub directory: String,
    /// Lowercased approver logins.
    pub approvers: BTreeSet<String>,
}

/// Resolution capability for one (org, repo, branch) snapshot.
///
/// Implementations are expected to be cheap per-path lookups over data that
/// was fetched once at the start of the evaluation.
pub trait OwnershipScopes {
    /// The nearest enclosing directory that declares an approver set,
    /// walking from the file's directory upward to the repository root.
    /// `None` means no directory on the path declares approvers: the file
    /// can never be covered and the gap is surfaced, not silently approved.
    fn approvers_scope(&self, path: &str) -> Option<OwnershipScope>;

    /// Reviewer identities for the file, used only for suggestions in the
    /// status notification, never for coverage.
    fn reviewers_for(&self, path: &str) -> BTreeSet<String>;
}

/// In-memory ownership tree keyed by directory.
///
/// Built by the ownership-service client from one branch snapshot, and
/// directly by tests.
#[derive(Debug, Clone, Default)]
pub struct OwnersTree {
    approvers: BTreeMap<String, BTreeSet<String>>,
    reviewers: BTreeMap<String, BTreeSet<String>>,
}

impl OwnersTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare approvers for a directory (`""` for the repository root).
    pub fn add_approvers<I, S>(&mut self, directory: &str, logins: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self
            .approvers
            .entry(normalize_directory(directory))
            .or_default();
        entry.extend(logins.into_iter().map(|l| l.as_ref().to_lowercase()));
    }

    pub fn add_reviewers<I, S>(&mut self, directory: &str, logins: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self
            .reviewers
            .entry(normalize_directory(directory))
            .or_default();
        entry.extend(logins.into_iter().map(|l| l.as_ref().to_lowercase()));
    }
}

fn normalize_directory(directory: &str) -> String {
    directory.trim_matches('/').to_string()
}

/// Directories enclosing `path`, nearest first, ending with the root (`""`).
fn enclosing_directories(path: &str) -> Vec<&str> {
    let mut directories = Vec::new();
    let mut current = match path.trim_matches('/').rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    };
    loop {
        directories.push(current);
        match current.rsplit_once('/') {
            Some((parent, _)) => current = parent,
            None => {
                if !current.is_empty() {
                    directories.push("");
                }
                break;
            }
        }
    }
    directories
}

impl OwnershipScopes for OwnersTree {
    fn approvers_scope(&self, path: &str) -> Option<OwnershipScope> {
        for directory in enclosing_directories(path) {
            if let Some(approvers) = self.approvers.get(directory) {
                return Some(OwnershipScope {
                    directory: directory.to_string(),
                    approvers: approvers.clone(),
                });
            }
        }
        None
    }

    fn reviewers_for(&self, path: &str) -> BTreeSet<String> {
        for directory in enclosing_directories(path) {
            if let Some(reviewers) = self.reviewers.get(directory) {
                return reviewers.clone();
            }
        }
        BTreeSet::new()
    }
}

/// Coverage of one changed file.
#[derive(Debug, Clone)]
pub struct FileCoverage {
    pub path: String,
    /// Nearest declaring scope, `None` when no directory up to the root
    /// declares an approver set.
    pub scope: Option<OwnershipScope>,
    /// Reviewer suggestions for the file (not part of coverage).
    pub reviewers: BTreeSet<String>,
    /// Whether some accumulated approver sits in the scope's approver set.
    pub covered: bool,
}

/// Per-file coverage for the whole changed-file set.
#[derive(Debug, Clone)]
pub struct Coverage {
    pub files: Vec<FileCoverage>,
}

impl Coverage {
    /// Resolve every changed file against the ownership scopes and the
    /// accumulated approver set (lowercased logins).
    pub fn compute(
        files: &[String],
        scopes: &dyn OwnershipScopes,
        approver_set: &BTreeSet<String>,
    ) -> Self {
        let files = files
            .iter()
            .map(|path| {
                let scope = scopes.approvers_scope(path);
                let covered = scope
                    .as_ref()
                    .is_some_and(|s| !s.approvers.is_disjoint(approver_set));
                FileCoverage {
                    path: path.clone(),
                    reviewers: scopes.reviewers_for(path),
                    scope,
                    covered,
                }
            })
            .collect();
        Self { files }
    }

    /// True iff every changed file is covered. A PR with zero changed files
    /// is vacuously covered.
    pub fn is_fully_covered(&self) -> bool {
        self.files.iter().all(|f| f.covered)
    }

    /// Uncovered declaring directories and the identities that could cover
    /// them, deduplicated and sorted for stable rendering.
    pub fn uncovered_scopes(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut scopes = BTreeMap::new();
        for file in &self.files {
            if file.covered {
                continue;
            }
            if let Some(scope) = &file.scope {
                scopes
                    .entry(scope.directory.clone())
                    .or_insert_with(BTreeSet::new)
                    .extend(scope.approvers.iter().cloned());
            }
        }
        scopes
    }

    /// Files that no directory on their path claims ownership of.
    pub fn unowned_files(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|f| f.scope.is_none())
            .map(|f| f.path.as_str())
            .collect()
    }

    /// Reviewer suggestions for the files that still need approval.
    pub fn suggested_reviewers(&self) -> BTreeSet<String> {
        let mut reviewers = BTreeSet::new();
        for file in &self.files {
            if !file.covered {
                reviewers.extend(file.reviewers.iter().cloned());
            }
        }
        reviewers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(logins: &[&str]) -> BTreeSet<String> {
        logins.iter().map(|l| l.to_string()).collect()
    }

    fn tree() -> OwnersTree {
        let mut tree = OwnersTree::new();
        tree.add_approvers("", ["root"]);
        tree.add_approvers("pkg/a", ["bob"]);
        tree.add_approvers("pkg/a/deep", ["carol"]);
        tree.add_reviewers("pkg/a", ["erin"]);
        tree
    }

    #[test]
    fn test_enclosing_directories_walk_up_to_root() {
        assert_eq!(
            enclosing_directories("pkg/a/deep/x.go"),
            vec!["pkg/a/deep", "pkg/a", "pkg", ""]
        );
        assert_eq!(enclosing_directories("pkg/a/x.go"), vec!["pkg/a", "pkg", ""]);
        assert_eq!(enclosing_directories("top.go"), vec![""]);
    }

    #[test]
    fn test_nearest_declaring_directory_wins() {
        let tree = tree();
        let scope = tree.approvers_scope("pkg/a/deep/x.go").unwrap();
        assert_eq!(scope.directory, "pkg/a/deep");
        assert_eq!(scope.approvers, set(&["carol"]));

        let scope = tree.approvers_scope("pkg/a/x.go").unwrap();
        assert_eq!(scope.directory, "pkg/a");

        // pkg itself declares nothing: falls through to the root.
        let scope = tree.approvers_scope("pkg/other/y.go").unwrap();
        assert_eq!(scope.directory, "");
        assert_eq!(scope.approvers, set(&["root"]));
    }

    #[test]
    fn test_file_without_any_scope_is_never_covered() {
        let mut tree = OwnersTree::new();
        tree.add_approvers("pkg/a", ["bob"]);

        let coverage = Coverage::compute(
            &["orphan.txt".to_string()],
            &tree,
            &set(&["bob", "root"]),
        );
        assert!(!coverage.is_fully_covered());
        assert_eq!(coverage.unowned_files(), vec!["orphan.txt"]);
        assert!(coverage.uncovered_scopes().is_empty());
    }

    #[test]
    fn test_coverage_requires_intersection() {
        let tree = tree();
        let files = vec!["pkg/a/x.go".to_string()];

        let coverage = Coverage::compute(&files, &tree, &set(&["alice"]));
        assert!(!coverage.is_fully_covered());
        assert_eq!(
            coverage.uncovered_scopes().get("pkg/a"),
            Some(&set(&["bob"]))
        );

        // Adding an approver for the scope flips the file to covered.
        let coverage = Coverage::compute(&files, &tree, &set(&["alice", "bob"]));
        assert!(coverage.is_fully_covered());
        assert!(coverage.uncovered_scopes().is_empty());
    }

    #[test]
    fn test_zero_changed_files_is_vacuously_covered() {
        let coverage = Coverage::compute(&[], &tree(), &BTreeSet::new());
        assert!(coverage.is_fully_covered());
    }

    #[test]
    fn test_approver_matching_is_case_normalized() {
        let mut tree = OwnersTree::new();
        tree.add_approvers("pkg", ["Bob"]);
        let coverage = Coverage::compute(
            &["pkg/x.go".to_string()],
            &tree,
            &set(&["bob"]),
        );
        assert!(coverage.is_fully_covered());
    }

    #[test]
    fn test_suggested_reviewers_only_for_uncovered_files() {
        let tree = tree();
        let files = vec!["pkg/a/x.go".to_string(), "pkg/other/y.go".to_string()];

        let coverage = Coverage::compute(&files, &tree, &set(&["root"]));
        // pkg/other/y.go is covered by root; pkg/a/x.go is not.
        assert_eq!(coverage.suggested_reviewers(), set(&["erin"]));
    }
}
