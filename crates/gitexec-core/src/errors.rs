//! Known git failures and the ordered pattern catalog that recognises them.
//!
//! Classification walks [`git_error_patterns`] in order and returns the
//! category of the first pattern found anywhere in the diagnostic text.
//! Several patterns overlap (`fatal: Authentication failed for 'https://`
//! vs. `fatal: Authentication failed`), so the table order is the precedence.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The git errors which can be parsed from failed git commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GitError {
    SSHKeyAuditUnverified,
    SSHAuthenticationFailed,
    SSHPermissionDenied,
    HTTPSAuthenticationFailed,
    RemoteDisconnection,
    HostDown,
    RebaseConflicts,
    MergeConflicts,
    HTTPSRepositoryNotFound,
    SSHRepositoryNotFound,
    PushNotFastForward,
    BranchDeletionFailed,
    DefaultBranchDeletionFailed,
    RevertConflicts,
    EmptyRebasePatch,
    NoMatchingRemoteBranch,
    NothingToCommit,
    NoSubmoduleMapping,
    SubmoduleRepositoryDoesNotExist,
    InvalidSubmoduleSHA,
    LocalPermissionDenied,
    InvalidMerge,
    InvalidRebase,
    NonFastForwardMergeIntoEmptyHead,
    PatchDoesNotApply,
    BranchAlreadyExists,
    BadRevision,
    NotAGitRepository,
    CannotMergeUnrelatedHistories,
    PushWithFileSizeExceedingLimit,
    HexBranchNameRejected,
    ForcePushRejected,
    InvalidRefLength,
    ProtectedBranchRequiresReview,
    ProtectedBranchForcePush,
    PushWithPrivateEmail,
}

impl GitError {
    /// Every category, in declaration order.
    pub const ALL: [GitError; 36] = [
        GitError::SSHKeyAuditUnverified,
        GitError::SSHAuthenticationFailed,
        GitError::SSHPermissionDenied,
        GitError::HTTPSAuthenticationFailed,
        GitError::RemoteDisconnection,
        GitError::HostDown,
        GitError::RebaseConflicts,
        GitError::MergeConflicts,
        GitError::HTTPSRepositoryNotFound,
        GitError::SSHRepositoryNotFound,
        GitError::PushNotFastForward,
        GitError::BranchDeletionFailed,
        GitError::DefaultBranchDeletionFailed,
        GitError::RevertConflicts,
        GitError::EmptyRebasePatch,
        GitError::NoMatchingRemoteBranch,
        GitError::NothingToCommit,
        GitError::NoSubmoduleMapping,
        GitError::SubmoduleRepositoryDoesNotExist,
        GitError::InvalidSubmoduleSHA,
        GitError::LocalPermissionDenied,
        GitError::InvalidMerge,
        GitError::InvalidRebase,
        GitError::NonFastForwardMergeIntoEmptyHead,
        GitError::PatchDoesNotApply,
        GitError::BranchAlreadyExists,
        GitError::BadRevision,
        GitError::NotAGitRepository,
        GitError::CannotMergeUnrelatedHistories,
        GitError::PushWithFileSizeExceedingLimit,
        GitError::HexBranchNameRejected,
        GitError::ForcePushRejected,
        GitError::InvalidRefLength,
        GitError::ProtectedBranchRequiresReview,
        GitError::ProtectedBranchForcePush,
        GitError::PushWithPrivateEmail,
    ];

    /// Stable symbolic name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            GitError::SSHKeyAuditUnverified => "SSHKeyAuditUnverified",
            GitError::SSHAuthenticationFailed => "SSHAuthenticationFailed",
            GitError::SSHPermissionDenied => "SSHPermissionDenied",
            GitError::HTTPSAuthenticationFailed => "HTTPSAuthenticationFailed",
            GitError::RemoteDisconnection => "RemoteDisconnection",
            GitError::HostDown => "HostDown",
            GitError::RebaseConflicts => "RebaseConflicts",
            GitError::MergeConflicts => "MergeConflicts",
            GitError::HTTPSRepositoryNotFound => "HTTPSRepositoryNotFound",
            GitError::SSHRepositoryNotFound => "SSHRepositoryNotFound",
            GitError::PushNotFastForward => "PushNotFastForward",
            GitError::BranchDeletionFailed => "BranchDeletionFailed",
            GitError::DefaultBranchDeletionFailed => "DefaultBranchDeletionFailed",
            GitError::RevertConflicts => "RevertConflicts",
            GitError::EmptyRebasePatch => "EmptyRebasePatch",
            GitError::NoMatchingRemoteBranch => "NoMatchingRemoteBranch",
            GitError::NothingToCommit => "NothingToCommit",
            GitError::NoSubmoduleMapping => "NoSubmoduleMapping",
            GitError::SubmoduleRepositoryDoesNotExist => "SubmoduleRepositoryDoesNotExist",
            GitError::InvalidSubmoduleSHA => "InvalidSubmoduleSHA",
            GitError::LocalPermissionDenied => "LocalPermissionDenied",
            GitError::InvalidMerge => "InvalidMerge",
            GitError::InvalidRebase => "InvalidRebase",
            GitError::NonFastForwardMergeIntoEmptyHead => "NonFastForwardMergeIntoEmptyHead",
            GitError::PatchDoesNotApply => "PatchDoesNotApply",
            GitError::BranchAlreadyExists => "BranchAlreadyExists",
            GitError::BadRevision => "BadRevision",
            GitError::NotAGitRepository => "NotAGitRepository",
            GitError::CannotMergeUnrelatedHistories => "CannotMergeUnrelatedHistories",
            GitError::PushWithFileSizeExceedingLimit => "PushWithFileSizeExceedingLimit",
            GitError::HexBranchNameRejected => "HexBranchNameRejected",
            GitError::ForcePushRejected => "ForcePushRejected",
            GitError::InvalidRefLength => "InvalidRefLength",
            GitError::ProtectedBranchRequiresReview => "ProtectedBranchRequiresReview",
            GitError::ProtectedBranchForcePush => "ProtectedBranchForcePush",
            GitError::PushWithPrivateEmail => "PushWithPrivateEmail",
        }
    }

    /// Short human-readable explanation, suitable for surfacing to a user.
    pub fn description(&self) -> &'static str {
        match self {
            GitError::SSHKeyAuditUnverified => {
                "The SSH key has not been verified recently and must be re-approved."
            }
            GitError::SSHAuthenticationFailed => "Authentication with the remote failed.",
            GitError::SSHPermissionDenied => "Could not read from the remote repository over SSH.",
            GitError::HTTPSAuthenticationFailed => "Authentication over HTTPS failed.",
            GitError::RemoteDisconnection => "The remote end hung up unexpectedly.",
            GitError::HostDown => "The remote host is down.",
            GitError::RebaseConflicts => "The rebase stopped because of conflicts.",
            GitError::MergeConflicts => "The merge stopped because of conflicts.",
            GitError::HTTPSRepositoryNotFound => "The repository was not found over HTTPS.",
            GitError::SSHRepositoryNotFound => "The repository was not found over SSH.",
            GitError::PushNotFastForward => {
                "The push was rejected because the remote has commits that are not present locally."
            }
            GitError::BranchDeletionFailed => "The remote branch to delete does not exist.",
            GitError::DefaultBranchDeletionFailed => {
                "The remote refused to delete its current branch."
            }
            GitError::RevertConflicts => "The revert stopped because of conflicts.",
            GitError::EmptyRebasePatch => "A patch applied during the rebase had no changes.",
            GitError::NoMatchingRemoteBranch => "No matching branch was found on the remote.",
            GitError::NothingToCommit => "There is nothing to commit.",
            GitError::NoSubmoduleMapping => "A submodule path has no mapping in .gitmodules.",
            GitError::SubmoduleRepositoryDoesNotExist => {
                "The repository for a submodule does not exist."
            }
            GitError::InvalidSubmoduleSHA => {
                "A submodule does not contain the commit it is pinned to."
            }
            GitError::LocalPermissionDenied => "The work tree directory could not be created.",
            GitError::InvalidMerge => "The given ref cannot be merged.",
            GitError::InvalidRebase => "The given upstream is not valid for a rebase.",
            GitError::NonFastForwardMergeIntoEmptyHead => {
                "A non-fast-forward commit cannot be merged into an empty head."
            }
            GitError::PatchDoesNotApply => "The patch does not apply to the working directory.",
            GitError::BranchAlreadyExists => "A branch with that name already exists.",
            GitError::BadRevision => "The revision could not be resolved.",
            GitError::NotAGitRepository => "The path is not inside a git repository.",
            GitError::CannotMergeUnrelatedHistories => {
                "Git refused to merge histories that share no common ancestor."
            }
            GitError::PushWithFileSizeExceedingLimit => {
                "The push contains a file larger than the remote allows."
            }
            GitError::HexBranchNameRejected => {
                "Branch or tag names made of 40 hex characters are not allowed by the remote."
            }
            GitError::ForcePushRejected => "Force-pushing to this branch is not allowed.",
            GitError::InvalidRefLength => "The ref name is longer than the remote allows.",
            GitError::ProtectedBranchRequiresReview => {
                "The protected branch requires an approved review before updates."
            }
            GitError::ProtectedBranchForcePush => {
                "Force-pushing to a protected branch is not allowed."
            }
            GitError::PushWithPrivateEmail => "The push would publish a private email address.",
        }
    }
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pattern source and category, in precedence order.
///
/// Patterns are searched anywhere in the text; `.` does not cross lines but
/// literal `\n` does, so multi-line diagnostics are matched as written.
const GIT_ERROR_PATTERNS: [(&str, GitError); 37] = [
    (
        r"ERROR: ([\s\S]+?)\n+\[EPOLICYKEYAGE\]\n+fatal: Could not read from remote repository.",
        GitError::SSHKeyAuditUnverified,
    ),
    (
        r"fatal: Authentication failed for 'https://",
        GitError::HTTPSAuthenticationFailed,
    ),
    (r"fatal: Authentication failed", GitError::SSHAuthenticationFailed),
    (
        r"fatal: Could not read from remote repository.",
        GitError::SSHPermissionDenied,
    ),
    (
        r"The requested URL returned error: 403",
        GitError::HTTPSAuthenticationFailed,
    ),
    (
        r"fatal: The remote end hung up unexpectedly",
        GitError::RemoteDisconnection,
    ),
    (
        r"fatal: unable to access '(.+)': Failed to connect to (.+): Host is down",
        GitError::HostDown,
    ),
    (r"Failed to merge in the changes.", GitError::RebaseConflicts),
    (
        r"(Merge conflict|Automatic merge failed; fix conflicts and then commit the result)",
        GitError::MergeConflicts,
    ),
    (
        r"fatal: repository '(.+)' not found",
        GitError::HTTPSRepositoryNotFound,
    ),
    (r"ERROR: Repository not found", GitError::SSHRepositoryNotFound),
    (
        r"\((non-fast-forward|fetch first)\)\nerror: failed to push some refs to '.*'",
        GitError::PushNotFastForward,
    ),
    (
        r"error: unable to delete '(.+)': remote ref does not exist",
        GitError::BranchDeletionFailed,
    ),
    (
        r"\[remote rejected\] (.+) \(deletion of the current branch prohibited\)",
        GitError::DefaultBranchDeletionFailed,
    ),
    (
        r"error: could not revert .*\nhint: after resolving the conflicts, mark the corrected paths\nhint: with 'git add <paths>' or 'git rm <paths>'\nhint: and commit the result with 'git commit'",
        GitError::RevertConflicts,
    ),
    (
        r"Applying: .*\nNo changes - did you forget to use 'git add'\?\nIf there is nothing left to stage, chances are that something else\n.*",
        GitError::EmptyRebasePatch,
    ),
    (
        r"There are no candidates for (rebasing|merging) among the refs that you just fetched.\nGenerally this means that you provided a wildcard refspec which had no\nmatches on the remote end.",
        GitError::NoMatchingRemoteBranch,
    ),
    (r"nothing to commit", GitError::NothingToCommit),
    (
        r"No submodule mapping found in .gitmodules for path '(.+)'",
        GitError::NoSubmoduleMapping,
    ),
    (
        r"fatal: repository '(.+)' does not exist\nfatal: clone of '.+' into submodule path '(.+)' failed",
        GitError::SubmoduleRepositoryDoesNotExist,
    ),
    (
        r"Fetched in submodule path '(.+)', but it did not contain (.+). Direct fetching of that commit failed.",
        GitError::InvalidSubmoduleSHA,
    ),
    (
        r"fatal: could not create work tree dir '(.+)'.*: Permission denied",
        GitError::LocalPermissionDenied,
    ),
    (
        r"merge: (.+) - not something we can merge",
        GitError::InvalidMerge,
    ),
    (r"invalid upstream (.+)", GitError::InvalidRebase),
    (
        r"fatal: Non-fast-forward commit does not make sense into an empty head",
        GitError::NonFastForwardMergeIntoEmptyHead,
    ),
    (
        r"error: (.+): (patch does not apply|already exists in working directory)",
        GitError::PatchDoesNotApply,
    ),
    (
        r"fatal: A branch named '(.+)' already exists.",
        GitError::BranchAlreadyExists,
    ),
    (r"fatal: bad revision '(.*)'", GitError::BadRevision),
    (
        r"fatal: Not a git repository \(or any of the parent directories\): (.*)",
        GitError::NotAGitRepository,
    ),
    (
        r"fatal: refusing to merge unrelated histories",
        GitError::CannotMergeUnrelatedHistories,
    ),
    (r"error: GH001: ", GitError::PushWithFileSizeExceedingLimit),
    (r"error: GH002: ", GitError::HexBranchNameRejected),
    (
        r"error: GH003: Sorry, force-pushing to (.+) is not allowed.",
        GitError::ForcePushRejected,
    ),
    (
        r"error: GH005: Sorry, refs longer than (.+) bytes are not allowed",
        GitError::InvalidRefLength,
    ),
    (
        r"error: GH006: Protected branch update failed for (.+)\nremote: error: At least one approved review is required",
        GitError::ProtectedBranchRequiresReview,
    ),
    (
        r"error: GH006: Protected branch update failed for (.+)\nremote: error: Cannot force-push to a protected branch",
        GitError::ProtectedBranchForcePush,
    ),
    (
        r"error: GH007: Your push would publish a private email address.",
        GitError::PushWithPrivateEmail,
    ),
];

/// A compiled catalog entry.
#[derive(Debug)]
pub struct GitErrorPattern {
    regex: Regex,
    error: GitError,
}

impl GitErrorPattern {
    /// The pattern source.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// The category this pattern identifies.
    pub fn error(&self) -> GitError {
        self.error
    }

    /// Returns `true` if the pattern occurs anywhere in `stderr`.
    pub fn is_match(&self, stderr: &str) -> bool {
        self.regex.is_match(stderr)
    }
}

static GIT_ERROR_REGEXES: LazyLock<Vec<GitErrorPattern>> = LazyLock::new(|| {
    GIT_ERROR_PATTERNS
        .iter()
        .map(|(pattern, error)| GitErrorPattern {
            // The table is a compile-time constant covered by unit tests.
            regex: Regex::new(pattern).expect("git error pattern must compile"),
            error: *error,
        })
        .collect()
});

/// The ordered catalog, compiled on first use and shared read-only.
pub fn git_error_patterns() -> &'static [GitErrorPattern] {
    &GIT_ERROR_REGEXES
}

/// Try to parse an error category from git's diagnostic output.
///
/// Returns the category of the first catalog entry that matches, or `None`
/// when the text is not recognised (including empty text).
pub fn parse_error(stderr: &str) -> Option<GitError> {
    let error = git_error_patterns()
        .iter()
        .find(|entry| entry.is_match(stderr))
        .map(GitErrorPattern::error);

    if let Some(error) = error {
        debug!(error = %error, "classified git diagnostic");
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(git_error_patterns().len(), GIT_ERROR_PATTERNS.len());
    }

    #[test]
    fn test_every_category_has_a_pattern() {
        let covered: HashSet<GitError> = git_error_patterns().iter().map(|p| p.error()).collect();
        for error in GitError::ALL {
            assert!(covered.contains(&error), "{error} has no pattern");
        }
    }

    #[test]
    fn test_catalog_order_is_preserved() {
        let patterns = git_error_patterns();
        assert_eq!(patterns[0].error(), GitError::SSHKeyAuditUnverified);
        assert_eq!(patterns[1].pattern(), "fatal: Authentication failed for 'https://");
        assert_eq!(patterns[2].pattern(), "fatal: Authentication failed");
        assert_eq!(patterns[36].error(), GitError::PushWithPrivateEmail);
    }

    #[test]
    fn test_empty_input_is_unrecognised() {
        assert_eq!(parse_error(""), None);
    }

    #[test]
    fn test_unrecognised_input() {
        assert_eq!(parse_error("warning: LF will be replaced by CRLF"), None);
    }

    #[test]
    fn test_generic_authentication_failure() {
        assert_eq!(
            parse_error("fatal: Authentication failed"),
            Some(GitError::SSHAuthenticationFailed)
        );
    }

    #[test]
    fn test_https_authentication_failure_takes_precedence() {
        let stderr = "remote: Invalid username or password.\nfatal: Authentication failed for 'https://github.com/shiftkey/repository-private.git/'";
        assert_eq!(parse_error(stderr), Some(GitError::HTTPSAuthenticationFailed));
    }

    #[test]
    fn test_key_audit_beats_permission_denied() {
        let stderr = "ERROR: Your SSH key has expired.\n\n[EPOLICYKEYAGE]\n\nfatal: Could not read from remote repository.";
        assert_eq!(parse_error(stderr), Some(GitError::SSHKeyAuditUnverified));
        assert_eq!(
            parse_error("fatal: Could not read from remote repository."),
            Some(GitError::SSHPermissionDenied)
        );
    }

    #[test]
    fn test_push_not_fast_forward_spans_lines() {
        let stderr = " ! [rejected]        master -> master (fetch first)\nerror: failed to push some refs to 'https://github.com/owner/repo.git'";
        assert_eq!(parse_error(stderr), Some(GitError::PushNotFastForward));
    }

    #[test]
    fn test_dot_does_not_cross_lines() {
        // `(.+)` must stay on the first line, so the split message is unrecognised.
        let stderr = "fatal: A branch named 'feature\nbroken' already exists.";
        assert_eq!(parse_error(stderr), None);
    }

    #[test]
    fn test_display_uses_symbolic_name() {
        assert_eq!(GitError::BadRevision.to_string(), "BadRevision");
        assert!(!GitError::BadRevision.description().is_empty());
    }

    #[test]
    fn test_serde_uses_symbolic_name() {
        let json = serde_json::to_string(&GitError::HexBranchNameRejected).unwrap();
        assert_eq!(json, "\"HexBranchNameRejected\"");
    }
}
