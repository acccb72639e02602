//! Allow-list security policy gating outbound MCP attachments.
//!
//! A `SecurityPolicy` is an explicit shared handle: clone it into every
//! connection registry or server that must consult it. There is no
//! process-global instance, so independent engines in one process cannot
//! cross-talk.

use std::sync::{Arc, Mutex};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("cannot modify MCP settings: servers are locked")]
    Locked,

    #[error("MCP command not allowed: {0}. Add it to the command allow-list to enable.")]
    CommandNotAllowed(String),

    #[error("MCP URL not allowed: {0}. Add it to the URL allow-list to enable.")]
    UrlNotAllowed(String),

    #[error("MCP argument contains potentially unsafe characters: {0}")]
    UnsafeArgument(String),

    #[error("MCP serving is disabled")]
    ServingDisabled,
}

#[derive(Debug, Default)]
struct SecurityState {
    allowed_commands: Vec<String>,
    allowed_urls: Vec<String>,
    servers_locked: bool,
    serving_disabled: bool,
}

/// Command/URL allow-lists plus the lock and serving flags, all guarded by
/// one lock. Empty allow-lists are permissive: a usability default for
/// development, not a production posture — production configs set explicit
/// lists and then lock.
#[derive(Debug, Clone, Default)]
pub struct SecurityPolicy {
    state: Arc<Mutex<SecurityState>>,
}

impl SecurityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split a delimited setting string ("cmd-a:cmd-b") into entries,
    /// trimming whitespace and dropping empties.
    pub fn parse_delimited(input: &str, delimiter: char) -> Vec<String> {
        input
            .split(delimiter)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn set_allowed_commands(&self, commands: Vec<String>) -> Result<(), SecurityError> {
        let mut state = self.lock_state();
        if state.servers_locked {
            return Err(SecurityError::Locked);
        }
        state.allowed_commands = commands;
        Ok(())
    }

    pub fn set_allowed_urls(&self, urls: Vec<String>) -> Result<(), SecurityError> {
        let mut state = self.lock_state();
        if state.servers_locked {
            return Err(SecurityError::Locked);
        }
        state.allowed_urls = urls;
        Ok(())
    }

    pub fn set_serving_disabled(&self, disabled: bool) -> Result<(), SecurityError> {
        let mut state = self.lock_state();
        if state.servers_locked {
            return Err(SecurityError::Locked);
        }
        state.serving_disabled = disabled;
        Ok(())
    }

    /// One-directional: once locked, the guarded settings stay frozen for
    /// the lifetime of the process.
    pub fn lock_servers(&self) {
        self.lock_state().servers_locked = true;
        tracing::info!("MCP security settings locked");
    }

    pub fn is_locked(&self) -> bool {
        self.lock_state().servers_locked
    }

    pub fn serving_disabled(&self) -> bool {
        self.lock_state().serving_disabled
    }

    /// Empty allow-list permits everything.
    pub fn is_command_allowed(&self, command: &str) -> bool {
        let state = self.lock_state();
        state.allowed_commands.is_empty()
            || state.allowed_commands.iter().any(|c| c == command)
    }

    /// Prefix match against the URL allow-list; empty list permits everything.
    pub fn is_url_allowed(&self, url: &str) -> bool {
        let state = self.lock_state();
        state.allowed_urls.is_empty()
            || state.allowed_urls.iter().any(|prefix| url.starts_with(prefix.as_str()))
    }

    /// Gate a subprocess launch: locked policies refuse new attachments,
    /// the command must pass the allow-list, and arguments must not carry
    /// shell metacharacters.
    pub fn validate_attach(&self, command: &str, args: &[String]) -> Result<(), SecurityError> {
        {
            let state = self.lock_state();
            if state.servers_locked {
                return Err(SecurityError::Locked);
            }
            if !state.allowed_commands.is_empty()
                && !state.allowed_commands.iter().any(|c| c == command)
            {
                return Err(SecurityError::CommandNotAllowed(command.to_string()));
            }
        }
        for arg in args {
            if arg.contains("..")
                || arg.contains('|')
                || arg.contains(';')
                || arg.contains('&')
                || arg.contains('`')
                || arg.contains('$')
            {
                return Err(SecurityError::UnsafeArgument(arg.clone()));
            }
        }
        Ok(())
    }

    /// Gate an outbound HTTP attachment.
    pub fn validate_url(&self, url: &str) -> Result<(), SecurityError> {
        let state = self.lock_state();
        if state.servers_locked {
            return Err(SecurityError::Locked);
        }
        if !state.allowed_urls.is_empty()
            && !state.allowed_urls.iter().any(|prefix| url.starts_with(prefix.as_str()))
        {
            return Err(SecurityError::UrlNotAllowed(url.to_string()));
        }
        Ok(())
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SecurityState> {
        // A panic while holding this lock is unrecoverable state anyway.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_allowlist_is_permissive() {
        let policy = SecurityPolicy::new();
        assert!(policy.is_command_allowed("/usr/bin/anything"));
        assert!(policy.is_url_allowed("http://anywhere.example"));
        assert!(policy.validate_attach("server-bin", &[]).is_ok());
    }

    #[test]
    fn test_command_allowlist_enforced() {
        let policy = SecurityPolicy::new();
        policy
            .set_allowed_commands(vec!["mcp-server".to_string()])
            .unwrap();
        assert!(policy.is_command_allowed("mcp-server"));
        assert!(!policy.is_command_allowed("rm"));
        let err = policy.validate_attach("rm", &[]).unwrap_err();
        assert!(matches!(err, SecurityError::CommandNotAllowed(_)));
    }

    #[test]
    fn test_url_prefix_match() {
        let policy = SecurityPolicy::new();
        policy
            .set_allowed_urls(vec!["https://internal.example/".to_string()])
            .unwrap();
        assert!(policy.is_url_allowed("https://internal.example/mcp"));
        assert!(!policy.is_url_allowed("https://evil.example/mcp"));
        assert!(policy.validate_url("https://evil.example/mcp").is_err());
    }

    #[test]
    fn test_unsafe_arguments_rejected() {
        let policy = SecurityPolicy::new();
        for bad in ["../etc/passwd", "a|b", "x;y", "p&q", "`id`", "$HOME"] {
            let err = policy
                .validate_attach("mcp-server", &[bad.to_string()])
                .unwrap_err();
            assert!(matches!(err, SecurityError::UnsafeArgument(_)), "{bad}");
        }
        assert!(policy
            .validate_attach("mcp-server", &["--stdio".to_string()])
            .is_ok());
    }

    #[test]
    fn test_lock_is_one_directional() {
        let policy = SecurityPolicy::new();
        policy
            .set_allowed_commands(vec!["mcp-server".to_string()])
            .unwrap();
        policy.lock_servers();
        assert!(policy.is_locked());

        assert!(matches!(
            policy.set_allowed_commands(vec![]),
            Err(SecurityError::Locked)
        ));
        assert!(matches!(
            policy.set_allowed_urls(vec![]),
            Err(SecurityError::Locked)
        ));
        assert!(matches!(
            policy.set_serving_disabled(true),
            Err(SecurityError::Locked)
        ));
        // Locked also refuses new attachments.
        assert!(matches!(
            policy.validate_attach("mcp-server", &[]),
            Err(SecurityError::Locked)
        ));
    }

    #[test]
    fn test_parse_delimited() {
        let entries = SecurityPolicy::parse_delimited("a: b ::c ", ':');
        assert_eq!(entries, vec!["a", "b", "c"]);
        assert!(SecurityPolicy::parse_delimited("", ':').is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let policy = SecurityPolicy::new();
        let clone = policy.clone();
        clone
            .set_allowed_commands(vec!["mcp-server".to_string()])
            .unwrap();
        assert!(!policy.is_command_allowed("other"));
    }
}
