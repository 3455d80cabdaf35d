//! External account-validator collaborator
//!
//! Accounts are validated by an operator-supplied command invoked with the
//! account name as its sole extra argument. The exit code is the protocol:
//! 0 means active, 1 means inactive, 2 through 4 are distinct failure modes
//! of the validator itself. Whether a validator failure blocks the account is
//! the `deny_on_failure` policy.

use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::config::AccountFilterConfig;

/// Validator outcome for one account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    /// Exit 0: the account exists and is active
    Active,
    /// Exit 1: the account is known but inactive
    Inactive,
    /// Exit 2-4: the validator itself failed; code preserved
    Failure(i32),
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "active"),
            AccountStatus::Inactive => write!(f, "inactive"),
            AccountStatus::Failure(code) => write!(f, "validator failure (exit {})", code),
        }
    }
}

/// Errors invoking the validator command
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account validator command is empty")]
    EmptyCommand,

    #[error("failed to spawn account validator {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("account validator terminated by signal")]
    Terminated,

    #[error("account validator returned undefined exit code {0}")]
    UndefinedExit(i32),
}

/// Invokes the configured validator command per account
pub struct AccountValidator {
    command: Vec<String>,
    deny_on_failure: bool,
}

impl AccountValidator {
    pub fn new(config: &AccountFilterConfig) -> Self {
        Self {
            command: config.command.clone(),
            deny_on_failure: config.deny_on_failure,
        }
    }

    /// Run the validator for one account name
    pub fn status(&self, account: &str) -> Result<AccountStatus, AccountError> {
        let program = self.command.first().ok_or(AccountError::EmptyCommand)?;
        let output = Command::new(program)
            .args(&self.command[1..])
            .arg(account)
            .output()
            .map_err(|source| AccountError::Spawn {
                command: program.clone(),
                source,
            })?;

        let status = match output.status.code() {
            Some(0) => AccountStatus::Active,
            Some(1) => AccountStatus::Inactive,
            Some(code @ 2..=4) => AccountStatus::Failure(code),
            Some(code) => return Err(AccountError::UndefinedExit(code)),
            None => return Err(AccountError::Terminated),
        };
        debug!(account, %status, "account validator decision");
        Ok(status)
    }

    /// Whether the account may be acted on under the configured policy
    pub fn is_allowed(&self, account: &str) -> Result<bool, AccountError> {
        Ok(match self.status(account)? {
            AccountStatus::Active => true,
            AccountStatus::Inactive => false,
            AccountStatus::Failure(_) => !self.deny_on_failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(command: &[&str], deny_on_failure: bool) -> AccountValidator {
        AccountValidator::new(&AccountFilterConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            deny_on_failure,
        })
    }

    fn exit_with(code: i32) -> AccountValidator {
        validator(&["sh", "-c", &format!("exit {}", code), "sh"], true)
    }

    #[test]
    fn test_exit_codes_map_to_statuses() {
        assert_eq!(exit_with(0).status("alice").unwrap(), AccountStatus::Active);
        assert_eq!(
            exit_with(1).status("alice").unwrap(),
            AccountStatus::Inactive
        );
        assert_eq!(
            exit_with(3).status("alice").unwrap(),
            AccountStatus::Failure(3)
        );
        assert!(matches!(
            exit_with(7).status("alice"),
            Err(AccountError::UndefinedExit(7))
        ));
    }

    #[test]
    fn test_deny_on_failure_policy() {
        let deny = validator(&["sh", "-c", "exit 2", "sh"], true);
        assert!(!deny.is_allowed("alice").unwrap());

        let allow = validator(&["sh", "-c", "exit 2", "sh"], false);
        assert!(allow.is_allowed("alice").unwrap());

        // Inactive is denied regardless of policy
        let inactive = validator(&["sh", "-c", "exit 1", "sh"], false);
        assert!(!inactive.is_allowed("alice").unwrap());
    }

    #[test]
    fn test_account_name_is_passed_as_argument() {
        // Succeeds only when the last argument equals the account name
        let v = validator(&["sh", "-c", r#"test "$1" = alice"#, "sh"], true);
        assert_eq!(v.status("alice").unwrap(), AccountStatus::Active);
        assert_eq!(v.status("bob").unwrap(), AccountStatus::Inactive);
    }

    #[test]
    fn test_spawn_failure() {
        let v = validator(&["/nonexistent/validator"], true);
        assert!(matches!(
            v.status("alice"),
            Err(AccountError::Spawn { .. })
        ));
    }
}
