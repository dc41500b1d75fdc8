use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use advocado_agent::runtime::{assemble_agent, AgentRuntime, TracingAuditSink};
use advocado_core::domain::pipe::AgentConfiguration;
use advocado_langbase::LangbaseServices;
use advocado_memory::Manifest;

use crate::commands::{block_on, config_failure, CommandResult, GlobalOptions, EXIT_CONFIG};

const COMMAND: &str = "chat";
const QUIT_WORDS: [&str; 3] = ["exit", "quit", "/quit"];

pub fn run(global: &GlobalOptions) -> CommandResult {
    let config = match global.load_config() {
        Ok(config) => config,
        Err(error) => return config_failure(COMMAND, &error),
    };

    let outcome = block_on(COMMAND, async {
        let session = async {
            let services = LangbaseServices::connect(&config)?;
            let manifest = Manifest::from_config(&config.memory).await?;
            let assembly = assemble_agent(
                &config,
                &manifest.sources(),
                services.memory,
                services.language_model,
                services.email_sender,
                Arc::new(TracingAuditSink),
            )
            .context("assembling the agent")?;
            let mut stdout = tokio::io::stdout();
            let input = BufReader::new(tokio::io::stdin());
            let turns = converse(&assembly.runtime, assembly.configuration, input, &mut stdout).await?;
            Ok::<usize, anyhow::Error>(turns)
        };
        match session.await {
            Ok(turns) => CommandResult::success(COMMAND, format!("conversation ended after {turns} turn(s)")),
            Err(error) => CommandResult::failure(COMMAND, "chat_failed", format!("{error:#}"), EXIT_CONFIG),
        }
    });
    match outcome {
        Ok(result) | Err(result) => result,
    }
}

/// Reads one visitor message per line until EOF or a quit word. Returns the number of turns.
pub async fn converse<R, W>(
    runtime: &AgentRuntime,
    configuration: Arc<AgentConfiguration>,
    input: R,
    output: &mut W,
) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut session = runtime.start_session(configuration);
    let mut lines = input.lines();
    let mut turns = 0;

    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;
        let Some(line) = lines.next_line().await.context("reading visitor input")? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if QUIT_WORDS.contains(&text.to_ascii_lowercase().as_str()) {
            break;
        }

        let reply = match runtime.handle_turn(&mut session, text).await {
            Ok(reply) => reply.message,
            Err(error) => {
                let interface = error.into_interface(session.id());
                format!("{} (ref {})", interface.user_message(), interface.correlation_id())
            }
        };
        turns += 1;
        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
    }

    output.flush().await?;
    Ok(turns)
}
