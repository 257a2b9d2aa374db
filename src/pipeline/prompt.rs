//! Operator interaction points.
//!
//! The pipeline blocks on a human in exactly two places: confirming a
//! listing correction and acknowledging a staged upload. Both go through
//! this trait so tests can script the answers.

use crate::error::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Asks the operator questions on the terminal.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask a yes/no question. Returns `true` for yes.
    async fn confirm(&self, question: &str) -> Result<bool>;

    /// Show a message and wait for the operator to press enter.
    async fn acknowledge(&self, message: &str) -> Result<()>;
}

/// Prompter reading answers from standard input.
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl StdinPrompter {
    async fn read_line(&self) -> Result<String> {
        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await?;
        Ok(line)
    }
}

#[async_trait]
impl Prompter for StdinPrompter {
    async fn confirm(&self, question: &str) -> Result<bool> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{} [y/N] ", question).as_bytes())
            .await?;
        stdout.flush().await?;
        let answer = self.read_line().await?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }

    async fn acknowledge(&self, message: &str) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{}\nPress enter to continue... ", message).as_bytes())
            .await?;
        stdout.flush().await?;
        self.read_line().await?;
        Ok(())
    }
}
