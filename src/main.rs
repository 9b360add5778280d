//! Achalugo - terminal chat client
//!
//! Type a question and it shows up in the transcript straight away, followed by
//! a processing placeholder that is replaced once the answer service replies.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod conversation;
mod core;
mod providers;
mod transcript;

use crate::config::Config;
use crate::core::{ConversationStore, SubmitOutcome};
use crate::providers::HttpAnswerService;
use crate::transcript::{TerminalTranscript, TranscriptRenderer};

const QUIT_COMMANDS: &[&str] = &["/quit", "/exit"];

const PULSE_INTERVAL: Duration = Duration::from_millis(400);

/// Notice shown when a line was not admitted
fn outcome_notice(outcome: SubmitOutcome) -> Option<&'static str> {
    match outcome {
        SubmitOutcome::Busy => Some("Still waiting for the previous answer"),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so they never interleave with the transcript
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "achalugo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = Config::from_env()?;

    let service = HttpAnswerService::new(&config.service.base_url, config.timeout())?;
    tracing::info!(
        endpoint = %service.endpoint(),
        single_pending = config.conversation.single_pending,
        on_failure = %config.conversation.on_failure,
        "Answer service configured"
    );

    let store = Arc::new(ConversationStore::new(
        Arc::new(service),
        config.store_options(),
    ));

    let mut terminal = TerminalTranscript::new(io::stdout(), config.display.width);
    if config.display.banner {
        terminal.banner(
            &config.display.name,
            &config.display.intro,
            &config.display.call_to_action,
        )?;
    }
    terminal.notice(&config.display.input_hint)?;

    let mut renderer = TranscriptRenderer::new(terminal);
    let mut log_rx = store.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pulse = tokio::time::interval(PULSE_INTERVAL);
    pulse.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut accepting = store.can_submit();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };

                if QUIT_COMMANDS.contains(&line.trim()) {
                    break;
                }

                // Admitted here, in input order; only the answer call is spawned
                let slot = match store.begin(&line) {
                    Ok(slot) => slot,
                    Err(outcome) => {
                        if let Some(notice) = outcome_notice(outcome) {
                            renderer.target_mut().notice(notice)?;
                        }
                        continue;
                    }
                };

                // In-flight answers are dropped if the session ends first
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let outcome = store.complete(slot, &line).await;
                    tracing::debug!(?outcome, "Exchange finished");
                });
            }
            _ = pulse.tick() => {
                renderer.target_mut().pulse()?;
            }
            changed = log_rx.changed() => {
                if changed.is_err() {
                    break;
                }

                let log = log_rx.borrow_and_update().clone();
                let views = renderer.render(&log);
                renderer.target_mut().paint(&views)?;

                let open = store.can_submit();
                if open && !accepting {
                    renderer.target_mut().notice(&config.display.input_hint)?;
                }
                accepting = open;
            }
        }
    }

    let log = store.snapshot();
    tracing::debug!(
        entries = log.len(),
        unanswered = log.pending_count(),
        revision = log.revision(),
        "Session ended"
    );

    Ok(())
}
