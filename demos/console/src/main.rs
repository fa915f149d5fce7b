//! Line-oriented chat console.
//!
//! Run with: cargo run -p agentdeck-console
//!
//! Reads `AGENTDECK_API_BASE_URL`, `AGENTDECK_LANG` and `AGENTDECK_TOKEN`
//! from the environment. Type a question and press enter; lines starting
//! with `/` are commands (`/help` lists them).

use std::{path::Path, sync::Arc};

use agentdeck_core::{
    AgentSelector, ClientConfig, CredentialProvider, MemoryCredentials, Role, TranscriptEvent,
};
use agentdeck_flow::{CompileOptions, DeployError, GraphDocument, SchemaPolicy, deploy};
use agentdeck_session::{EngineOptions, SendOutcome, SessionEngine, SessionError};
use agentdeck_transport::{HttpGateway, WsConnector};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Engine = SessionEngine<HttpGateway, WsConnector>;

const HELP: &str = "\
Commands:
  /reset                    start a new conversation
  /token <value>            set the bearer credential
  /assistants <a,b,...>     route asks to these assistants (no argument clears)
  /agent <id>               route asks to one saved agent
  /deploy [--partial] <file> compile a graph document and save it
  /quit                     exit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they do not interleave with the conversation.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let config = Arc::new(ClientConfig::from_env()?);
    let credentials = Arc::new(MemoryCredentials::new());
    if let Ok(token) = std::env::var("AGENTDECK_TOKEN") {
        credentials.set(token);
    }

    let gateway = HttpGateway::new(Arc::clone(&config), credentials.clone())?;
    let connector = WsConnector::new(Arc::clone(&config));
    let engine: Engine = SessionEngine::new(
        gateway.clone(),
        connector,
        credentials.clone(),
        EngineOptions::from_config(&config),
    );

    println!("agentdeck console, talking to {}", config.api_base_url);
    if credentials.get().is_none() {
        println!("No credential set; use /token <value> before asking.");
    }
    println!("{HELP}\n");

    let printer = tokio::spawn(print_transcript(engine.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match command {
            "/quit" | "/exit" => break,
            "/help" => println!("{HELP}"),
            "/reset" => {
                engine.reset().await;
                println!("(new conversation)");
            }
            "/token" if !rest.is_empty() => {
                credentials.set(rest);
                println!("(credential set)");
            }
            "/assistants" => {
                let names: Vec<String> = rest
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                let selector = (!names.is_empty()).then_some(AgentSelector::Assistants(names));
                engine.set_selector(selector).await;
            }
            "/agent" if !rest.is_empty() => {
                engine
                    .set_selector(Some(AgentSelector::Agent(rest.to_string())))
                    .await;
            }
            "/deploy" => run_deploy(&gateway, rest).await,
            _ if line.starts_with('/') => println!("Unknown command; /help lists them."),
            _ => ask(&engine, line, credentials.as_ref()).await,
        }
    }

    engine.close().await;
    printer.abort();
    Ok(())
}

async fn ask(engine: &Engine, line: &str, credentials: &dyn CredentialProvider) {
    match engine.send(line).await {
        Ok(SendOutcome::Upgraded { session_id }) => {
            println!("(interactive session {session_id})");
        }
        Ok(SendOutcome::Failed(e)) => {
            tracing::debug!("Turn failed: {e}");
            if credentials.get().is_none() {
                println!("(signed out; use /token <value>)");
            }
        }
        Ok(_) => {}
        Err(SessionError::Busy) => println!("(still waiting for the previous answer)"),
        Err(SessionError::Closed) => println!("(session closed; /reset to start over)"),
    }
}

async fn print_transcript(engine: Engine) {
    let mut rx = engine.transcript().subscribe();
    loop {
        match rx.recv().await {
            Ok(TranscriptEvent::Appended(msg)) if msg.role == Role::Assistant => {
                match msg.text() {
                    Some(text) => println!("assistant> {text}"),
                    None => println!("assistant> {}", msg.content),
                }
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Display fell behind by {n} messages");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn run_deploy(gateway: &HttpGateway, args: &str) {
    let (policy, path) = match args.strip_prefix("--partial") {
        Some(path) => (SchemaPolicy::PersistPartial, path.trim()),
        None => (SchemaPolicy::Block, args),
    };
    if path.is_empty() {
        println!("Usage: /deploy [--partial] <graph.json>");
        return;
    }

    let doc = match load_graph(Path::new(path)).await {
        Ok(doc) => doc,
        Err(e) => {
            println!("Could not read {path}: {e}");
            return;
        }
    };

    match deploy(gateway, &doc, &CompileOptions::default(), policy).await {
        Ok(deployment) => {
            println!(
                "Flow saved: {} assistant(s).",
                deployment.config.assistants.assistants.len()
            );
            for issue in &deployment.skipped {
                println!("  skipped: {issue}");
            }
        }
        Err(DeployError::InvalidSchemas(issues)) => {
            println!("Not saved; fix these tools or use --partial:");
            for issue in &issues {
                println!("  {issue}");
            }
        }
        Err(e) => println!("Save failed: {e}"),
    }
}

async fn load_graph(path: &Path) -> anyhow::Result<GraphDocument> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(GraphDocument::from_json(&text)?)
}
