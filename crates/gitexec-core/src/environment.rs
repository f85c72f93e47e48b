//! Locate the embedded git distribution and assemble the environment git runs
//! with.
//!
//! The git root is `LOCAL_GIT_DIRECTORY` when set, otherwise the `git`
//! directory next to the running executable. Binary, exec-path and extra
//! variables depend on the [`Platform`] layout. Caller overrides are applied
//! last and win every collision.

use std::collections::{BTreeMap, HashMap};
use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};

use crate::error::EnvironmentError;

/// Overrides the root directory of the embedded git distribution.
pub const LOCAL_GIT_DIRECTORY: &str = "LOCAL_GIT_DIRECTORY";

/// Overrides the directory holding git's helper programs.
pub const GIT_EXEC_PATH: &str = "GIT_EXEC_PATH";

const PATH: &str = "PATH";
const GIT_TEMPLATE_DIR: &str = "GIT_TEMPLATE_DIR";
const PREFIX: &str = "PREFIX";
const GIT_SSL_CAINFO: &str = "GIT_SSL_CAINFO";

const ARCHIVE_SEGMENT: &str = "app.asar";
const UNPACKED_ARCHIVE_SEGMENT: &str = "app.asar.unpacked";

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
compile_error!("gitexec bundles git for Linux, macOS and Windows only");

/// Host platform families with a known git distribution layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

/// Per-platform layout of a git distribution, relative to its root.
struct Layout {
    binary: &'static [&'static str],
    exec_path: &'static [&'static str],
    search_path_prefix: Option<&'static [&'static str]>,
    path_separator: &'static str,
    template_dir: Option<&'static [&'static str]>,
    set_prefix: bool,
    ca_bundle: Option<&'static [&'static str]>,
}

const UNIX_TEMPLATES: &[&str] = &["share", "git-core", "templates"];

const LINUX: Layout = Layout {
    binary: &["bin", "git"],
    exec_path: &["libexec", "git-core"],
    search_path_prefix: None,
    path_separator: ":",
    template_dir: Some(UNIX_TEMPLATES),
    set_prefix: true,
    ca_bundle: Some(&["ssl", "cacert.pem"]),
};

const MACOS: Layout = Layout {
    binary: &["bin", "git"],
    exec_path: &["libexec", "git-core"],
    search_path_prefix: None,
    path_separator: ":",
    template_dir: Some(UNIX_TEMPLATES),
    set_prefix: false,
    ca_bundle: None,
};

const WINDOWS: Layout = Layout {
    binary: &["cmd", "git.exe"],
    exec_path: &["mingw64", "libexec", "git-core"],
    search_path_prefix: Some(&["mingw64", "bin"]),
    path_separator: ";",
    template_dir: None,
    set_prefix: false,
    ca_bundle: None,
};

fn join_all(root: &Path, segments: &[&str]) -> PathBuf {
    segments.iter().fold(root.to_path_buf(), |path, s| path.join(s))
}

impl Platform {
    /// The platform this binary was built for.
    #[cfg(target_os = "linux")]
    pub const fn current() -> Self {
        Platform::Linux
    }

    /// The platform this binary was built for.
    #[cfg(target_os = "macos")]
    pub const fn current() -> Self {
        Platform::MacOs
    }

    /// The platform this binary was built for.
    #[cfg(windows)]
    pub const fn current() -> Self {
        Platform::Windows
    }

    fn layout(self) -> &'static Layout {
        match self {
            Platform::Linux => &LINUX,
            Platform::MacOs => &MACOS,
            Platform::Windows => &WINDOWS,
        }
    }

    /// Path of the git executable inside `git_dir`.
    pub fn git_binary(self, git_dir: &Path) -> PathBuf {
        join_all(git_dir, self.layout().binary)
    }

    /// Default exec path (helper programs) inside `git_dir`.
    pub fn git_exec_path(self, git_dir: &Path) -> PathBuf {
        join_all(git_dir, self.layout().exec_path)
    }

    /// Whether environment variable names compare case-insensitively.
    fn case_insensitive_env(self) -> bool {
        matches!(self, Platform::Windows)
    }
}

/// Everything needed to spawn git.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEnvironment {
    /// Absolute path of the git executable.
    pub git_location: PathBuf,
    /// Directory of git's helper programs. Always equal to the `GIT_EXEC_PATH`
    /// entry of `env`, including when the caller overrode it.
    pub exec_path: PathBuf,
    /// Complete environment for the child process.
    pub env: BTreeMap<OsString, OsString>,
}

impl ResolvedEnvironment {
    /// Look up a variable of the assembled environment.
    pub fn var(&self, key: &str) -> Option<&OsStr> {
        self.env.get(OsStr::new(key)).map(OsString::as_os_str)
    }
}

/// Resolves git's location and environment from a snapshot of the host.
#[derive(Debug, Clone)]
pub struct EnvironmentResolver {
    platform: Platform,
    base_env: BTreeMap<OsString, OsString>,
    default_git_dir: PathBuf,
}

impl EnvironmentResolver {
    /// Build a resolver from an explicit snapshot.
    ///
    /// `default_git_dir` is used when `base_env` has no `LOCAL_GIT_DIRECTORY`.
    pub fn new<I, K, V>(
        platform: Platform,
        base_env: I,
        default_git_dir: impl Into<PathBuf>,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        Self {
            platform,
            base_env: base_env
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            default_git_dir: default_git_dir.into(),
        }
    }

    /// Snapshot the current process: its environment and the `git` directory
    /// that ships next to the running executable.
    pub fn from_process() -> Result<Self, EnvironmentError> {
        let exe = std::env::current_exe().map_err(EnvironmentError::CurrentExe)?;
        let install_dir = exe.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self::new(
            Platform::current(),
            std::env::vars_os(),
            unpacked_archive_path(&install_dir.join("git")),
        ))
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Non-empty value of a base variable, honouring platform case rules.
    fn var(&self, key: &str) -> Option<&OsStr> {
        let value = self.base_env.get(OsStr::new(key)).or_else(|| {
            if self.platform.case_insensitive_env() {
                self.base_env
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            } else {
                None
            }
        })?;
        (!value.is_empty()).then_some(value.as_os_str())
    }

    fn absolute_override(
        &self,
        variable: &'static str,
    ) -> Result<Option<PathBuf>, EnvironmentError> {
        self.var(variable)
            .map(|value| {
                std::path::absolute(value)
                    .map_err(|source| EnvironmentError::InvalidOverride { variable, source })
            })
            .transpose()
    }

    /// Root directory of the git distribution.
    pub fn git_dir(&self) -> Result<PathBuf, EnvironmentError> {
        Ok(self
            .absolute_override(LOCAL_GIT_DIRECTORY)?
            .unwrap_or_else(|| self.default_git_dir.clone()))
    }

    /// Path of the git executable.
    pub fn git_binary(&self) -> Result<PathBuf, EnvironmentError> {
        Ok(self.platform.git_binary(&self.git_dir()?))
    }

    /// Directory of git's helper programs; `GIT_EXEC_PATH` wins when set.
    pub fn git_exec_path(&self) -> Result<PathBuf, EnvironmentError> {
        match self.absolute_override(GIT_EXEC_PATH)? {
            Some(path) => Ok(path),
            None => Ok(self.platform.git_exec_path(&self.git_dir()?)),
        }
    }

    /// Assemble the environment for one invocation.
    ///
    /// Layers, lowest first: inherited variables, `GIT_EXEC_PATH` and `PATH`,
    /// platform additions, then `overrides`. On Windows only the upper-case
    /// `PATH` key survives.
    pub fn resolve(
        &self,
        overrides: &HashMap<String, String>,
    ) -> Result<ResolvedEnvironment, EnvironmentError> {
        let git_dir = self.git_dir()?;
        let git_location = self.platform.git_binary(&git_dir);
        let exec_path = self.git_exec_path()?;
        let layout = self.platform.layout();

        let inherited_path = self.var(PATH).map(OsStr::to_os_string).unwrap_or_default();
        let search_path = match layout.search_path_prefix {
            Some(prefix) => {
                let mut path = join_all(&git_dir, prefix).into_os_string();
                path.push(layout.path_separator);
                path.push(&inherited_path);
                path
            }
            None => inherited_path,
        };

        let mut env = self.base_env.clone();
        env.insert(GIT_EXEC_PATH.into(), exec_path.clone().into_os_string());
        env.insert(PATH.into(), search_path);

        if let Some(templates) = layout.template_dir {
            env.insert(
                GIT_TEMPLATE_DIR.into(),
                join_all(&git_dir, templates).into_os_string(),
            );
        }
        if layout.set_prefix {
            env.insert(PREFIX.into(), git_dir.clone().into_os_string());
        }
        if let Some(bundle) = layout.ca_bundle {
            env.insert(
                GIT_SSL_CAINFO.into(),
                join_all(&git_dir, bundle).into_os_string(),
            );
        }

        for (key, value) in overrides {
            env.insert(key.into(), value.into());
        }

        if self.platform.case_insensitive_env() {
            env.retain(|key, _| key == PATH || !key.eq_ignore_ascii_case(PATH));
        }

        let exec_path = env
            .get(OsStr::new(GIT_EXEC_PATH))
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or(exec_path);

        Ok(ResolvedEnvironment {
            git_location,
            exec_path,
            env,
        })
    }
}

/// Rewrite an `app.asar` segment to `app.asar.unpacked`: executables cannot
/// be launched from inside the packed archive.
pub fn unpacked_archive_path(path: &Path) -> PathBuf {
    path.components()
        .map(|component| match component {
            Component::Normal(segment) if segment == ARCHIVE_SEGMENT => {
                Component::Normal(OsStr::new(UNPACKED_ARCHIVE_SEGMENT))
            }
            other => other,
        })
        .collect()
}

/// Resolve git from the current process environment.
pub fn setup_environment(
    overrides: &HashMap<String, String>,
) -> Result<ResolvedEnvironment, EnvironmentError> {
    EnvironmentResolver::from_process()?.resolve(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(platform: Platform, vars: &[(&str, &str)]) -> EnvironmentResolver {
        EnvironmentResolver::new(
            platform,
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())),
            "/opt/app/git",
        )
    }

    fn get<'a>(env: &'a ResolvedEnvironment, key: &str) -> Option<&'a str> {
        env.var(key).and_then(OsStr::to_str)
    }

    #[test]
    fn test_unix_layout() {
        let dir = Path::new("/opt/app/git");
        assert_eq!(Platform::Linux.git_binary(dir), dir.join("bin").join("git"));
        assert_eq!(Platform::MacOs.git_exec_path(dir), dir.join("libexec").join("git-core"));
    }

    #[test]
    fn test_windows_layout() {
        let dir = Path::new("/opt/app/git");
        assert_eq!(Platform::Windows.git_binary(dir), dir.join("cmd").join("git.exe"));
        assert_eq!(
            Platform::Windows.git_exec_path(dir),
            dir.join("mingw64").join("libexec").join("git-core")
        );
    }

    #[test]
    fn test_default_git_dir_used_without_override() {
        let r = resolver(Platform::Linux, &[]);
        assert_eq!(r.git_dir().unwrap(), PathBuf::from("/opt/app/git"));
    }

    #[test]
    fn test_local_git_directory_override() {
        let r = resolver(Platform::Linux, &[(LOCAL_GIT_DIRECTORY, "/usr/local")]);
        assert_eq!(r.git_binary().unwrap(), PathBuf::from("/usr/local/bin/git"));
    }

    #[test]
    fn test_relative_override_is_made_absolute() {
        let r = resolver(Platform::Linux, &[(LOCAL_GIT_DIRECTORY, "vendor/git")]);
        let dir = r.git_dir().unwrap();
        assert!(dir.is_absolute());
        assert!(dir.ends_with("vendor/git"));
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let r = resolver(Platform::Linux, &[(LOCAL_GIT_DIRECTORY, "")]);
        assert_eq!(r.git_dir().unwrap(), PathBuf::from("/opt/app/git"));
    }

    #[test]
    fn test_exec_path_override() {
        let r = resolver(Platform::Linux, &[(GIT_EXEC_PATH, "/usr/lib/git-core")]);
        let env = r.resolve(&HashMap::new()).unwrap();
        assert_eq!(env.exec_path, PathBuf::from("/usr/lib/git-core"));
        assert_eq!(get(&env, GIT_EXEC_PATH), Some("/usr/lib/git-core"));
    }

    #[test]
    fn test_linux_environment() {
        let r = resolver(Platform::Linux, &[("PATH", "/usr/bin"), ("HOME", "/home/me")]);
        let env = r.resolve(&HashMap::new()).unwrap();

        assert_eq!(env.git_location, PathBuf::from("/opt/app/git/bin/git"));
        assert_eq!(get(&env, "HOME"), Some("/home/me"));
        assert_eq!(get(&env, "PATH"), Some("/usr/bin"));
        assert_eq!(get(&env, GIT_EXEC_PATH), Some("/opt/app/git/libexec/git-core"));
        assert_eq!(get(&env, "GIT_TEMPLATE_DIR"), Some("/opt/app/git/share/git-core/templates"));
        assert_eq!(get(&env, "PREFIX"), Some("/opt/app/git"));
        assert_eq!(get(&env, "GIT_SSL_CAINFO"), Some("/opt/app/git/ssl/cacert.pem"));
    }

    #[test]
    fn test_macos_environment_has_no_prefix_or_bundle() {
        let r = resolver(Platform::MacOs, &[("PATH", "/usr/bin")]);
        let env = r.resolve(&HashMap::new()).unwrap();

        assert!(env.var("GIT_TEMPLATE_DIR").is_some());
        assert!(env.var("PREFIX").is_none());
        assert!(env.var("GIT_SSL_CAINFO").is_none());
    }

    #[test]
    fn test_missing_path_becomes_empty() {
        let r = resolver(Platform::Linux, &[]);
        let env = r.resolve(&HashMap::new()).unwrap();
        assert_eq!(get(&env, "PATH"), Some(""));
    }

    #[test]
    fn test_windows_path_is_prefixed_and_deduplicated() {
        let r = resolver(Platform::Windows, &[("Path", "C:\\Windows")]);
        let env = r.resolve(&HashMap::new()).unwrap();

        let mingw = Path::new("/opt/app/git").join("mingw64").join("bin");
        let expected = format!("{};C:\\Windows", mingw.display());
        assert_eq!(get(&env, "PATH"), Some(expected.as_str()));
        assert!(env.var("Path").is_none());
        assert_eq!(
            env.env
                .keys()
                .filter(|k| k.eq_ignore_ascii_case("PATH"))
                .count(),
            1
        );
        assert!(env.var("GIT_TEMPLATE_DIR").is_none());
    }

    #[test]
    fn test_windows_override_lookup_is_case_insensitive() {
        let r = resolver(Platform::Windows, &[("local_git_directory", "/custom")]);
        assert_eq!(r.git_dir().unwrap(), PathBuf::from("/custom"));
    }

    #[test]
    fn test_caller_overrides_win() {
        let r = resolver(Platform::Linux, &[("PATH", "/usr/bin"), ("LANG", "C")]);
        let overrides = HashMap::from([
            ("PREFIX".to_string(), "/elsewhere".to_string()),
            ("LANG".to_string(), "en_US.UTF-8".to_string()),
            ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
        ]);
        let env = r.resolve(&overrides).unwrap();

        assert_eq!(get(&env, "PREFIX"), Some("/elsewhere"));
        assert_eq!(get(&env, "LANG"), Some("en_US.UTF-8"));
        assert_eq!(get(&env, "GIT_TERMINAL_PROMPT"), Some("0"));
    }

    #[test]
    fn test_exec_path_follows_caller_override() {
        let r = resolver(Platform::Linux, &[]);
        let overrides = HashMap::from([(
            "GIT_EXEC_PATH".to_string(),
            "/caller/libexec/git-core".to_string(),
        )]);
        let env = r.resolve(&overrides).unwrap();

        assert_eq!(env.exec_path, PathBuf::from("/caller/libexec/git-core"));
        assert_eq!(get(&env, "GIT_EXEC_PATH"), Some("/caller/libexec/git-core"));

        let plain = r.resolve(&HashMap::new()).unwrap();
        assert_eq!(plain.exec_path, PathBuf::from("/opt/app/git/libexec/git-core"));
    }

    #[test]
    fn test_unpacked_archive_path() {
        let packed = Path::new("/Applications/App/Resources/app.asar/git");
        assert_eq!(
            unpacked_archive_path(packed),
            PathBuf::from("/Applications/App/Resources/app.asar.unpacked/git")
        );

        let plain = Path::new("/opt/app/git");
        assert_eq!(unpacked_archive_path(plain), plain.to_path_buf());
    }

    #[test]
    fn test_from_process_uses_current_platform() {
        let r = EnvironmentResolver::from_process().unwrap();
        assert_eq!(r.platform(), Platform::current());
    }
}
