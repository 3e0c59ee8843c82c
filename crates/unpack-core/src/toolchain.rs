//! Resolution of external tool dependencies.
//!
//! Strategies declare the tools they need as [`Dependency`] values. Making
//! sure those tools are installed is the caller's job; this module only
//! answers "which directory should be searched first for this tool", so the
//! child process picks up the declared copy rather than an unrelated
//! same-named binary earlier on `PATH`.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::debug;

/// An external tool required by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dependency {
    /// Executable name.
    pub tool: &'static str,
    /// Package that provides it, for diagnostics.
    pub package: &'static str,
}

impl Dependency {
    /// Declares a tool shipped by `package`.
    pub const fn new(tool: &'static str, package: &'static str) -> Self {
        Self { tool, package }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tool == self.package {
            f.write_str(self.tool)
        } else {
            write!(f, "{} (from {})", self.tool, self.package)
        }
    }
}

/// Finds the installation directory of a declared tool.
pub trait ToolLocator: Send + Sync + fmt::Debug {
    /// Returns the directory containing `dependency.tool`, if known.
    fn locate(&self, dependency: &Dependency) -> Option<PathBuf>;
}

/// Looks for tools in an ordered list of prefix directories.
#[derive(Debug, Clone)]
pub struct SearchPathLocator {
    prefixes: Vec<PathBuf>,
}

impl Default for SearchPathLocator {
    /// Searches `/opt/homebrew/bin`, `/usr/local/bin` and
    /// `/home/linuxbrew/.linuxbrew/bin`.
    fn default() -> Self {
        Self::new([
            "/opt/homebrew/bin",
            "/usr/local/bin",
            "/home/linuxbrew/.linuxbrew/bin",
        ])
    }
}

impl SearchPathLocator {
    /// Creates a locator over `prefixes`, searched in order.
    pub fn new<I, P>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Adds a prefix ahead of the existing ones.
    #[must_use]
    pub fn with_prefix_first(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.prefixes.insert(0, prefix.into());
        self
    }

    /// Returns the configured prefixes.
    pub fn prefixes(&self) -> &[PathBuf] {
        &self.prefixes
    }
}

impl ToolLocator for SearchPathLocator {
    fn locate(&self, dependency: &Dependency) -> Option<PathBuf> {
        self.prefixes
            .iter()
            .find(|dir| is_executable(&dir.join(dependency.tool)))
            .cloned()
    }
}

/// Maps tool names to directories explicitly.
#[derive(Debug, Clone, Default)]
pub struct StaticLocator {
    dirs: HashMap<String, PathBuf>,
}

impl StaticLocator {
    /// Creates an empty locator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `dir` as the home of `tool`.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.dirs.insert(tool.into(), dir.into());
        self
    }
}

impl ToolLocator for StaticLocator {
    fn locate(&self, dependency: &Dependency) -> Option<PathBuf> {
        self.dirs.get(dependency.tool).cloned()
    }
}

/// Caches locator answers for the lifetime of an unpacker.
#[derive(Debug)]
pub struct Toolchain {
    locator: Box<dyn ToolLocator>,
    cache: Mutex<HashMap<&'static str, Option<PathBuf>>>,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::new(SearchPathLocator::default())
    }
}

impl Toolchain {
    /// Creates a toolchain backed by `locator`.
    pub fn new(locator: impl ToolLocator + 'static) -> Self {
        Self {
            locator: Box::new(locator),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the directory of `dependency`, asking the locator only once.
    pub fn dir_of(&self, dependency: &Dependency) -> Option<PathBuf> {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache
            .entry(dependency.tool)
            .or_insert_with(|| {
                let dir = self.locator.locate(dependency);
                debug!(tool = dependency.tool, dir = ?dir, "located tool");
                dir
            })
            .clone()
    }

    /// Returns the search directories for a set of dependencies, in
    /// declaration order and without duplicates.
    pub fn search_dirs(&self, dependencies: &[Dependency]) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for dir in dependencies.iter().filter_map(|dep| self.dir_of(dep)) {
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
