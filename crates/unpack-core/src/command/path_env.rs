//! `PATH` construction for child processes.

use std::env;
use std::ffi::OsString;
use std::path::Path;
use std::path::PathBuf;

/// An ordered executable search path.
///
/// Starts from the ambient `PATH` and lets callers move tool directories to
/// the front, so a declared tool shadows any same-named system copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// Captures the current process's `PATH`.
    pub fn ambient() -> Self {
        Self::from_os(env::var_os("PATH"))
    }

    /// Parses a `PATH`-style value.
    pub fn from_os(value: Option<OsString>) -> Self {
        let dirs = value
            .map(|val| env::split_paths(&val).collect())
            .unwrap_or_default();
        Self { dirs }
    }

    /// Moves `dir` to the front, removing any later duplicate.
    #[must_use]
    pub fn prepend(mut self, dir: PathBuf) -> Self {
        self.dirs.retain(|existing| !same_dir(existing, &dir));
        self.dirs.insert(0, dir);
        self
    }

    /// Prepends each of `dirs`, preserving their relative order.
    #[must_use]
    pub fn prepend_all<'a, I>(self, dirs: I) -> Self
    where
        I: IntoIterator<Item = &'a PathBuf>,
        I::IntoIter: DoubleEndedIterator,
    {
        dirs.into_iter()
            .rev()
            .fold(self, |path, dir| path.prepend(dir.clone()))
    }

    /// Returns `true` if `dir` is on the search path.
    pub fn contains(&self, dir: &Path) -> bool {
        self.dirs.iter().any(|existing| same_dir(existing, dir))
    }

    /// Returns the directories in search order.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Joins the directories into a `PATH` value.
    ///
    /// Directories containing the platform separator are dropped rather than
    /// failing the whole invocation.
    pub fn to_os_string(&self) -> OsString {
        let joinable = self.dirs.iter().filter(|dir| env::join_paths([dir]).is_ok());
        env::join_paths(joinable).unwrap_or_default()
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    let trim = |p: &Path| {
        let s = p.to_string_lossy().into_owned();
        let trimmed = s.trim_end_matches(['/', '\\']);
        if trimmed.is_empty() { s } else { trimmed.to_string() }
    };
    trim(a) == trim(b)
}
