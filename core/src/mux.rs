//! Thin wrapper over the external terminal multiplexer binary (`tmux` or
//! compatible). Pure pass-through plus the three hardenings the spec calls
//! out: name sanitization, a two-phase bootstrap write, and treating a
//! missing binary as a warning rather than a fatal error.

use std::time::Duration;
use tokio::process::Command;
use tracing::warn;

/// Delay between the bootstrap text line and the trailing newline. Some
/// client runners race on a single combined write; splitting the write and
/// waiting avoids that race.
const BOOTSTRAP_NEWLINE_DELAY: Duration = Duration::from_millis(600);

#[derive(Debug, Clone)]
pub struct Multiplexer {
    binary: String,
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self {
            binary: "tmux".to_string(),
        }
    }
}

impl Multiplexer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Legal multiplexer session-name alphabet: letters, digits, dash,
    /// underscore. Anything else becomes an underscore.
    pub fn sanitize_name(raw: &str) -> String {
        let sanitized: String = raw
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if sanitized.is_empty() {
            "session".to_string()
        } else {
            sanitized
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, MuxError> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| MuxError::Unavailable(e.to_string()))?;
        if !output.status.success() {
            return Err(MuxError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    pub async fn create(&self, session: &str, cwd: &str) -> Result<(), MuxError> {
        let session = Self::sanitize_name(session);
        self.run(&["new-session", "-d", "-s", &session, "-c", cwd])
            .await?;
        Ok(())
    }

    pub async fn send_keys(&self, session: &str, text: &str) -> Result<(), MuxError> {
        let session = Self::sanitize_name(session);
        self.run(&["send-keys", "-t", &session, "-l", text])
            .await?;
        Ok(())
    }

    async fn send_enter(&self, session: &str) -> Result<(), MuxError> {
        let session = Self::sanitize_name(session);
        self.run(&["send-keys", "-t", &session, "Enter"]).await?;
        Ok(())
    }

    /// Delivers the bootstrap prompt as a two-phase write: the literal text,
    /// then — after a delay — the newline that submits it. The caller is
    /// responsible for assembling `prompt` through the single shared
    /// template function ([`crate::agents::build_bootstrap_prompt`]); this
    /// function only knows how to deliver text, never how to compose it.
    pub async fn deliver_bootstrap(&self, session: &str, prompt: &str) -> Result<(), MuxError> {
        self.send_keys(session, prompt).await?;
        tokio::time::sleep(BOOTSTRAP_NEWLINE_DELAY).await;
        self.send_enter(session).await
    }

    pub async fn capture(&self, session: &str) -> Result<String, MuxError> {
        let session = Self::sanitize_name(session);
        self.run(&["capture-pane", "-t", &session, "-p"]).await
    }

    pub async fn kill(&self, session: &str) -> Result<(), MuxError> {
        let session = Self::sanitize_name(session);
        self.run(&["kill-session", "-t", &session]).await?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<String>, MuxError> {
        match self.run(&["list-sessions", "-F", "#{session_name}"]).await {
            Ok(out) => Ok(out.lines().map(|l| l.trim().to_string()).collect()),
            Err(MuxError::CommandFailed(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// A missing multiplexer binary is a warning: agents can still be
    /// created for external attachment without a locally managed session.
    pub async fn probe(&self) -> bool {
        match Command::new(&self.binary).arg("-V").output().await {
            Ok(o) if o.status.success() => true,
            Ok(_) => {
                warn!(binary = %self.binary, "multiplexer binary present but returned a non-zero status");
                false
            }
            Err(e) => {
                warn!(binary = %self.binary, error = %e, "multiplexer binary not found; continuing without local sessions");
                false
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("multiplexer unavailable: {0}")]
    Unavailable(String),
    #[error("multiplexer command failed: {0}")]
    CommandFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_name_strips_illegal_characters() {
        assert_eq!(Multiplexer::sanitize_name("agent one/two"), "agent_one_two");
        assert_eq!(Multiplexer::sanitize_name("ok-name_1"), "ok-name_1");
        assert_eq!(Multiplexer::sanitize_name(""), "session");
    }

    #[tokio::test]
    async fn probe_false_when_binary_missing() {
        let mux = Multiplexer::new("definitely-not-a-real-binary-xyz");
        assert!(!mux.probe().await);
    }
}
