//! Runtime environment detection.
//!
//! The `CAMPUS_ENV` variable selects between production, development and
//! test behaviour:
//!
//! - `test` - config and session files live under the system temp dir,
//!   desktop alert permission is never requested
//! - `development` or `dev` - verbose default log filter
//! - (anything else or unset) - production

/// Runtime environment for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment (default).
    Production,
    /// Development environment.
    Development,
    /// Test environment.
    Test,
}

impl Environment {
    /// Detect the current environment from `CAMPUS_ENV`.
    #[must_use]
    pub fn current() -> Self {
        Self::from_value(std::env::var("CAMPUS_ENV").ok().as_deref())
    }

    /// Map a raw `CAMPUS_ENV` value to an environment.
    #[must_use]
    pub fn from_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("test") => Self::Test,
            Some("development" | "dev") => Self::Development,
            _ => Self::Production,
        }
    }

    /// Returns `true` for the test environment.
    #[must_use]
    pub fn is_test(self) -> bool {
        self == Self::Test
    }

    /// Default `env_logger` filter when `RUST_LOG` is unset.
    #[must_use]
    pub fn default_log_filter(self) -> &'static str {
        match self {
            Self::Development => "debug",
            Self::Production | Self::Test => "info",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Convenience check for `CAMPUS_ENV=test`.
#[must_use]
pub fn is_test_mode() -> bool {
    Environment::current().is_test()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_value() {
        assert_eq!(Environment::from_value(Some("test")), Environment::Test);
        assert_eq!(Environment::from_value(Some("dev")), Environment::Development);
        assert_eq!(
            Environment::from_value(Some(" development ")),
            Environment::Development
        );
        assert_eq!(Environment::from_value(Some("staging")), Environment::Production);
        assert_eq!(Environment::from_value(None), Environment::Production);
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Production.to_string(), "production");
        assert_eq!(Environment::Development.to_string(), "development");
        assert_eq!(Environment::Test.to_string(), "test");
    }

    #[test]
    fn test_default_log_filter() {
        assert_eq!(Environment::Development.default_log_filter(), "debug");
        assert_eq!(Environment::Production.default_log_filter(), "info");
        assert!(Environment::Test.is_test());
        assert!(!Environment::Production.is_test());
    }
}
