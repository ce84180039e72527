//! Scripted sessions with a stdio boundary.
//!
//! Invocation events go to stdout as JSON lines. Result messages are read
//! from stdin, one JSON object per line.

use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use toolrelay_runtime::testing::ScriptedEngine;
use toolrelay_runtime::{RuntimeConfig, SessionCoordinator, ToolGenerationRequest};
use toolrelay_tool::{
    BrokerConfig, ChannelSink, TOOL_INVOCATION_EVENT, ToolInvocationEvent, ToolSpec,
};
use tracing::{debug, info, warn};

/// Everything a run needs, loaded from disk
pub struct RunOptions {
    tools: Vec<ToolSpec>,
    engine: ScriptedEngine,
    config: RuntimeConfig,
}

impl RunOptions {
    /// Load tools, script and optional config
    pub fn load(tools: &Path, script: &Path, config: Option<&Path>) -> Result<Self> {
        let tools_text = std::fs::read_to_string(tools)
            .wrap_err_with(|| format!("reading {}", tools.display()))?;
        let tools: Vec<ToolSpec> = serde_json::from_str(&tools_text).wrap_err("parsing tools")?;

        let script_text = std::fs::read_to_string(script)
            .wrap_err_with(|| format!("reading {}", script.display()))?;
        let engine = ScriptedEngine::from_json_str(&script_text).wrap_err("parsing script")?;

        let config = match config {
            Some(path) => RuntimeConfig::from_json_file(path)?,
            None => RuntimeConfig::default(),
        };

        Ok(Self {
            tools,
            engine,
            config,
        })
    }
}

/// Wire form of an outbound event
fn event_line(event: &ToolInvocationEvent) -> Result<String> {
    Ok(serde_json::to_string(&serde_json::json!({
        "event": TOOL_INVOCATION_EVENT,
        "body": event,
    }))?)
}

async fn write_events<W>(
    mut events: mpsc::UnboundedReceiver<ToolInvocationEvent>,
    mut output: W,
) -> Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = events.recv().await {
        debug!(tool = %event.name, id = %event.id, "forwarding invocation");
        let mut line = event_line(&event)?;
        line.push('\n');
        output.write_all(line.as_bytes()).await?;
        output.flush().await?;
    }
    Ok(output)
}

async fn read_results(
    coordinator: Arc<SessionCoordinator>,
    mut results: mpsc::UnboundedReceiver<String>,
) {
    while let Some(line) = results.recv().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match coordinator.deliver_json(line) {
            Ok(true) => {}
            Ok(false) => debug!("result for unknown or finished invocation dropped"),
            Err(err) => warn!(code = err.code(), error = %err, "rejected tool result"),
        }
    }
}

/// Lines of stdin, read on a plain thread.
///
/// The thread is never joined; a blocking stdin read cannot be cancelled.
pub fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Configure a session and generate with tools.
///
/// Invocation events are written to `output`; result lines arrive on
/// `results`.
pub async fn run_session<W>(
    options: RunOptions,
    prompt: &str,
    results: mpsc::UnboundedReceiver<String>,
    output: W,
) -> Result<String>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (sink, events) = ChannelSink::channel();
    let broker_config = BrokerConfig {
        timeout: options.config.tool_timeout_duration(),
    };
    let coordinator = Arc::new(SessionCoordinator::with_config(
        Arc::new(options.engine),
        Arc::new(sink),
        broker_config,
    ));

    for spec in options.tools {
        coordinator
            .register_tool(spec)
            .map_err(|err| eyre!("{}: {}", err.code(), err))?;
    }
    let session = coordinator
        .configure(options.config.session.clone())
        .map_err(|err| eyre!("{}: {}", err.code(), err))?;
    info!(session = %session, "running scripted session");

    let writer = tokio::spawn(write_events(events, output));
    let reader = tokio::spawn(read_results(Arc::clone(&coordinator), results));

    let request =
        ToolGenerationRequest::new(prompt).with_tool_timeout(options.config.tool_timeout);
    let result = coordinator.generate_with_tools(request).await;

    reader.abort();
    let _ = reader.await;
    coordinator.reset();
    drop(coordinator);
    writer.await??;

    result.map_err(|err| eyre!("{}: {}", err.code(), err))
}
