//! Advisory operator identity check.
//!
//! Publishing is expected to run as a particular account on a particular
//! machine. The check is advisory: it reads `LOGNAME` (or `USER`) and
//! `HOSTNAME` and reports every mismatch so the caller can refuse to start.

use std::fmt;

use crate::config::OperatorConfig;

/// A reason the current invocation context may not publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreflightError {
    /// The login name differs from the configured operator.
    WrongUser {
        /// The configured login name.
        expected: String,
        /// The observed login name, if any.
        actual: Option<String>,
    },
    /// The host name does not contain the configured host.
    WrongHost {
        /// The configured host name fragment.
        expected: String,
        /// The observed host name, if any.
        actual: Option<String>,
    },
}

impl fmt::Display for PreflightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (what, expected, actual) = match self {
            Self::WrongUser { expected, actual } => ("user", expected, actual),
            Self::WrongHost { expected, actual } => ("host", expected, actual),
        };
        let actual = actual.as_deref().unwrap_or("<unknown>");
        write!(f, "must be run as {what} {expected}; current {what} is {actual}")
    }
}

impl std::error::Error for PreflightError {}

/// Compare the environment against `operator` using `lookup` to read
/// variables.
///
/// ```
/// use caldb_mirror::config::OperatorConfig;
/// use caldb_mirror::preflight::check_operator_with;
///
/// let operator = OperatorConfig {
///     user: Some("caldbmgr".to_owned()),
///     host: Some("heasarcdev".to_owned()),
/// };
/// let errors = check_operator_with(&operator, |name| match name {
///     "LOGNAME" => Some("caldbmgr".to_owned()),
///     "HOSTNAME" => Some("heasarcdev-1.example".to_owned()),
///     _ => None,
/// });
/// assert!(errors.is_empty());
/// ```
pub fn check_operator_with(
    operator: &OperatorConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<PreflightError> {
    let mut errors = Vec::new();

    if let Some(expected) = &operator.user {
        let actual = lookup("LOGNAME").or_else(|| lookup("USER"));
        if actual.as_deref() != Some(expected.as_str()) {
            errors.push(PreflightError::WrongUser {
                expected: expected.clone(),
                actual,
            });
        }
    }

    if let Some(expected) = &operator.host {
        let actual = lookup("HOSTNAME");
        if !actual.as_deref().is_some_and(|host| host.contains(expected.as_str())) {
            errors.push(PreflightError::WrongHost {
                expected: expected.clone(),
                actual,
            });
        }
    }

    errors
}

/// [`check_operator_with`] over the process environment.
#[must_use]
pub fn check_operator(operator: &OperatorConfig) -> Vec<PreflightError> {
    check_operator_with(operator, |name| std::env::var(name).ok())
}
