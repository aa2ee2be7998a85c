//! Interactive chat on the terminal.
//!
//! Reads one user message per line from stdin, streams the reply to stdout
//! and prints the detected emotion after it. Ctrl-C cancels the reply in
//! progress; end of input quits.

use std::error::Error;
use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use emotive_chat::application::ReplyService;
use emotive_chat::config::{AppConfig, LoggingConfig};
use emotive_chat::domain::reply::ConversationMessage;
use emotive_chat::ports::{ReplyError, ReplySink, SinkError};

/// Writes reply tokens straight to stdout.
struct StdoutSink {
    out: std::io::Stdout,
}

impl ReplySink for StdoutSink {
    fn on_token(&mut self, delta: &str) -> Result<(), SinkError> {
        let mut out = self.out.lock();
        out.write_all(delta.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|e| SinkError::new(e.to_string()))
    }

    fn on_emotion(&mut self, emotion: &str) -> Result<(), SinkError> {
        tracing::debug!(emotion, "Emotion detected");
        Ok(())
    }
}

fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.trim().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging);
    config.validate()?;

    let service = ReplyService::from_config(&config.ai)?;
    tracing::info!(model = %config.ai.model, base_url = %config.ai.base_url, "Chat ready");

    let mut history: Vec<ConversationMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        history.push(ConversationMessage::user(message));

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        let mut sink = StdoutSink {
            out: std::io::stdout(),
        };
        let result = service
            .stream_reply_with_cancel(&history, &mut sink, &cancel)
            .await;
        interrupt.abort();
        println!();

        match result {
            Ok(reply) => {
                println!("[{}]", reply.emotion);
                history.push(ConversationMessage::assistant(reply.text));
            }
            Err(ReplyError::Cancelled) => {
                eprintln!("(cancelled)");
                history.pop();
            }
            Err(e) => {
                tracing::error!("Reply failed: {}", e);
                history.pop();
            }
        }
    }

    Ok(())
}
