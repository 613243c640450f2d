use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{ClientEvent, ClientHandle, FocusClient, FocusOwner, PanelHost};
use shared::domain::Command;
use std::future::Future;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(about = "Drive and watch the panel focus relay")]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8787")]
    server_url: String,
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Subscribe to panel events and apply them to a local panel model.
    Watch {
        #[arg(long, default_value = "desktop")]
        subscriber: String,
        /// Where input focus sits before the first notification arrives.
        #[arg(long, value_enum, default_value_t = StartFocus::Editor)]
        focus: StartFocus,
    },
    /// Reveal the panel, optionally on behalf of a named command.
    Dispatch {
        command: Option<String>,
        #[arg(long, conflicts_with = "steal_focus")]
        preserve_focus: bool,
        #[arg(long)]
        steal_focus: bool,
    },
    Hide,
    Status,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StartFocus {
    Editor,
    Terminal,
}

impl From<StartFocus> for FocusOwner {
    fn from(value: StartFocus) -> Self {
        match value {
            StartFocus::Editor => FocusOwner::Editor,
            StartFocus::Terminal => FocusOwner::External("terminal".into()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let client = FocusClient::new(&args.server_url)?;

    match args.action {
        Action::Watch { subscriber, focus } => watch(&client, &subscriber, focus.into()).await,
        Action::Dispatch {
            command,
            preserve_focus,
            steal_focus,
        } => {
            let flag = explicit_flag(preserve_focus, steal_focus);
            let request = match command {
                Some(name) => {
                    let command = name.parse::<Command>()?;
                    client.dispatch_command(command, flag).await?
                }
                None => client.dispatch(flag).await?,
            };
            println!("{}", serde_json::to_string_pretty(&request)?);
            Ok(())
        }
        Action::Hide => {
            client.hide_panel().await?;
            println!("panel hidden");
            Ok(())
        }
        Action::Status => {
            let status = client.panel_status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    }
}

fn explicit_flag(preserve_focus: bool, steal_focus: bool) -> Option<bool> {
    match (preserve_focus, steal_focus) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

async fn watch(
    client: &std::sync::Arc<FocusClient>,
    subscriber: &str,
    initial_focus: FocusOwner,
) -> Result<()> {
    let events = client.subscribe_events();
    client
        .connect(subscriber)
        .await
        .context("failed to open panel event stream")?;

    let panel = PanelHost::with_focus(initial_focus);
    info!(focus = ?panel.focus(), "watching panel events; ctrl-c to stop");
    follow_events(events, panel, tokio::signal::ctrl_c()).await;

    client.disconnect().await;
    Ok(())
}

/// Applies panel notifications until the stream ends or `shutdown` resolves.
/// Events already queued are applied before shutdown is honoured.
async fn follow_events<F: Future>(
    mut events: broadcast::Receiver<ClientEvent>,
    mut panel: PanelHost,
    shutdown: F,
) -> PanelHost {
    tokio::pin!(shutdown);

    loop {
        let event = tokio::select! {
            biased;
            event = events.recv() => event,
            _ = &mut shutdown => break,
        };
        match event {
            Ok(ClientEvent::Disconnected) => {
                warn!("event stream closed by server");
                break;
            }
            Ok(ClientEvent::Server(error)) => {
                warn!(code = ?error.code, message = %error.message, "server error");
            }
            Ok(ClientEvent::Error(message)) => warn!(%message, "event stream error"),
            Ok(event) => {
                let Some(notification) = event.panel_notification() else {
                    continue;
                };
                let transition = panel.apply(&notification);
                println!(
                    "visible={} focus={:?} (visibility_changed={}, focus_changed={})",
                    panel.visible(),
                    panel.focus(),
                    transition.visibility_changed,
                    transition.focus_changed
                );
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "dropped panel events"),
            Err(RecvError::Closed) => break,
        }
    }

    panel
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
