//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Interactive restart prompt
//!
//! Console lines are read on a plain thread and handed over a channel, so
//! a pending answer never holds up shutdown of the runtime.

use async_trait::async_trait;
use linerelay_service::{RelayError, RestartDecision, RestartPolicy};
use std::io::BufRead;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::mpsc;

const RESTART_QUESTION: &str = "Do you want to try to start the server again? [Y/N] ";
const INVALID_ANSWER: &str = "Invalid answer, please enter your answer again: ";

/// Asks the operator whether a failed server should be started again
pub struct ConsolePrompt<W> {
    lines: mpsc::UnboundedReceiver<String>,
    output: W,
}

impl ConsolePrompt<Stdout> {
    /// Prompt on the process console
    pub fn stdio() -> Self {
        Self::new(
            spawn_line_reader(std::io::BufReader::new(std::io::stdin())),
            tokio::io::stdout(),
        )
    }
}

impl<W> ConsolePrompt<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Prompt answered by `lines`; a closed channel counts as end of input
    pub fn new(lines: mpsc::UnboundedReceiver<String>, output: W) -> Self {
        Self { lines, output }
    }

    async fn write(&mut self, text: &str) -> std::io::Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await
    }

    async fn ask(&mut self, error: &RelayError) -> std::io::Result<RestartDecision> {
        self.write(&format!("{}\n{}", error, RESTART_QUESTION)).await?;
        loop {
            let Some(line) = self.lines.recv().await else {
                return Ok(RestartDecision::Stop);
            };
            match line.trim() {
                "Y" | "y" => return Ok(RestartDecision::Restart),
                "N" | "n" => return Ok(RestartDecision::Stop),
                _ => self.write(INVALID_ANSWER).await?,
            }
        }
    }
}

#[async_trait]
impl<W> RestartPolicy for ConsolePrompt<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn decide(&mut self, error: &RelayError) -> RestartDecision {
        match self.ask(error).await {
            Ok(decision) => decision,
            Err(err) => {
                tracing::error!(error = %err, "Console unavailable, not restarting");
                RestartDecision::Stop
            }
        }
    }
}

/// Forward lines from `input` on a detached thread until end of input
///
/// The thread exits on EOF, on a read error, or once the receiver is gone.
pub fn spawn_line_reader<R>(input: R) -> mpsc::UnboundedReceiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            for line in input.lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Unable to read console input");
    }
    rx
}
