//! Configuration for artifact extraction.

use std::time::Duration;

/// Bounded retry policy for known-flaky local operations.
///
/// Used when ejecting disk-image volumes and when enumerating a freshly
/// mounted volume. The defaults are three attempts one second apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Never less than 1.
    pub attempts: u32,

    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries `attempts` times without sleeping.
    ///
    /// Intended for tests that script transient failures.
    #[must_use]
    pub const fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            delay: Duration::ZERO,
        }
    }

    /// Returns the number of attempts, clamped to at least one.
    #[must_use]
    pub fn effective_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    /// Sleeps for the configured delay, if any.
    pub fn pause(&self) {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }
}

/// Extraction settings shared by every strategy invocation.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use unpack_core::UnpackConfig;
///
/// let config = UnpackConfig::default()
///     .with_verbose(true)
///     .with_command_timeout(Some(Duration::from_secs(600)));
/// assert_eq!(config.max_nesting_depth, 5);
/// ```
#[derive(Debug, Clone)]
pub struct UnpackConfig {
    /// Pass verbosity to external tools and capture license text from disk
    /// images.
    pub verbose: bool,

    /// Prefer the extension-hinted strategy at each nesting level.
    pub prioritize_extension: bool,

    /// Maximum number of layers `extract_nested` will unwrap.
    pub max_nesting_depth: usize,

    /// Retry policy for eject and manifest enumeration.
    pub retry: RetryPolicy,

    /// Timeout applied to each subprocess. `None` waits indefinitely.
    pub command_timeout: Option<Duration>,
}

impl Default for UnpackConfig {
    /// Default values:
    /// - `verbose`: false
    /// - `prioritize_extension`: false
    /// - `max_nesting_depth`: 5
    /// - `retry`: 3 attempts, 1 second apart
    /// - `command_timeout`: none
    fn default() -> Self {
        Self {
            verbose: false,
            prioritize_extension: false,
            max_nesting_depth: 5,
            retry: RetryPolicy::default(),
            command_timeout: None,
        }
    }
}

impl UnpackConfig {
    /// Sets verbose mode.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sets the default extension prioritization for nested extraction.
    #[must_use]
    pub fn with_prioritize_extension(mut self, prioritize: bool) -> Self {
        self.prioritize_extension = prioritize;
        self
    }

    /// Sets the nesting bound.
    #[must_use]
    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the per-subprocess timeout.
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }
}
