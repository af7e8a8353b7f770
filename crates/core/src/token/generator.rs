//! External token generator invoked as a subprocess.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::traits::TokenGenerator;
use super::types::{MintedToken, TokenError};

/// Token generator that shells out to a configured helper command.
///
/// The command receives the caller tag as its last argument and must print
/// a JSON object `{"proof_token": "...", "visitor_id": "..."}` on stdout.
pub struct CommandTokenGenerator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandTokenGenerator {
    /// `command` is the program followed by its fixed arguments.
    pub fn new(command: &[String], timeout: Duration) -> Self {
        let (program, args) = match command.split_first() {
            Some((p, rest)) => (p.clone(), rest.to_vec()),
            None => (String::new(), Vec::new()),
        };
        Self {
            program,
            args,
            timeout,
        }
    }
}

#[async_trait]
impl TokenGenerator for CommandTokenGenerator {
    async fn generate(&self, caller_tag: &str) -> Result<MintedToken, TokenError> {
        if self.program.is_empty() {
            return Err(TokenError::GeneratorFailed(
                "no generator command configured".to_string(),
            ));
        }

        debug!(program = %self.program, caller = caller_tag, "Invoking token generator");

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.program)
                .args(&self.args)
                .arg(caller_tag)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| TokenError::GeneratorTimeout(self.timeout.as_secs()))?
        .map_err(|e| TokenError::GeneratorFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TokenError::GeneratorFailed(format!(
                "exit status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        // The helper may log lines before the payload; take the last line
        // that parses as the token object.
        stdout
            .lines()
            .rev()
            .find_map(|line| serde_json::from_str::<MintedToken>(line.trim()).ok())
            .ok_or_else(|| TokenError::InvalidGeneratorOutput(stdout.trim().to_string()))
    }
}
