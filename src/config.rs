//! Environment-driven configuration.
//!
//! Environment variables are read exactly once, through a lookup function,
//! so tests can supply their own values instead of mutating the process
//! environment.

use std::time::Duration;

/// Identity variable on Linux and macOS.
pub const USER_VAR: &str = "USER";
/// Identity variable on Windows.
pub const USERNAME_VAR: &str = "USERNAME";
/// Any value skips the test stage.
pub const SKIP_TESTS_VAR: &str = "DART_SKIP_RUNNING_TESTS";
/// Any value forces SDK/runtime installation for the editor-only role.
pub const FORCE_INSTALL_VAR: &str = "FORCE_RUN_INSTALL";
/// Whitespace-separated arguments appended to every build tool invocation.
pub const EXTRA_ARGS_VAR: &str = "ANT_EXTRA_ARGS";

/// Values taken from the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    /// Current user, `USER` first then `USERNAME`
    pub username: Option<String>,
    /// Skip the test stage
    pub skip_tests: bool,
    /// Install SDK and runtime regardless of role
    pub force_install: bool,
    /// Extra build tool arguments
    pub extra_build_args: Vec<String>,
}

impl EnvConfig {
    /// Read from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = lookup(USER_VAR)
            .or_else(|| lookup(USERNAME_VAR))
            .filter(|name| !name.is_empty());
        let extra_build_args = lookup(EXTRA_ARGS_VAR)
            .map(|args| args.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Self {
            username,
            skip_tests: lookup(SKIP_TESTS_VAR).is_some(),
            force_install: lookup(FORCE_INSTALL_VAR).is_some(),
            extra_build_args,
        }
    }
}

/// Time budgets for child processes.
///
/// Stages are never retried; a child that exceeds its budget is killed and
/// the run fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Build tool stages (packaging, tests, update site)
    pub stage: Duration,
    /// SDK build script targets
    pub sdk: Duration,
    /// Object store client calls
    pub store: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stage: Duration::from_secs(7200),
            sdk: Duration::from_secs(7200),
            store: Duration::from_secs(1800),
        }
    }
}

impl TimeoutConfig {
    /// Upper bound for any configured timeout (one day).
    pub const MAX_SECS: u64 = 86_400;

    /// Parse a timeout in seconds, clamped to `[1, max]`.
    fn parse_secs<F>(lookup: &F, var_name: &str, default: u64, max: u64) -> Duration
    where
        F: Fn(&str) -> Option<String>,
    {
        let secs = lookup(var_name)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(|v| v.clamp(1, max))
            .unwrap_or(default);
        Duration::from_secs(secs)
    }

    /// Create config from environment variables with fallback to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            stage: Self::parse_secs(
                &lookup,
                "EDITOR_RELEASE_STAGE_TIMEOUT_SECS",
                defaults.stage.as_secs(),
                Self::MAX_SECS,
            ),
            sdk: Self::parse_secs(
                &lookup,
                "EDITOR_RELEASE_SDK_TIMEOUT_SECS",
                defaults.sdk.as_secs(),
                Self::MAX_SECS,
            ),
            store: Self::parse_secs(
                &lookup,
                "EDITOR_RELEASE_STORE_TIMEOUT_SECS",
                defaults.store.as_secs(),
                Self::MAX_SECS,
            ),
        }
    }
}
