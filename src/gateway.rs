//! Update gateway: supervised long-poll listener, bounded dispatch workers,
//! and command routing.

use crate::commands::{parse_command, Command};
use crate::compile;
use crate::error::{CompileError, IngestError};
use crate::ingest::{self, MediaKind};
use crate::pdf::Renderer;
use crate::session::SessionStore;
use crate::storage::StagingArea;
use crate::telegram::{Incoming, IncomingKind, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const USAGE_TEXT: &str = "Hi! I'm a bot that turns your photos into a PDF file. \
Upload photos, then send /create. If you want to discard the uploaded photos, send /reset.";
const NAME_PROMPT_TEXT: &str = "What should we call your file?";
const NO_PHOTOS_TEXT: &str = "You haven't uploaded a single photo!";
const EMPTY_NAME_TEXT: &str = "The file name cannot be empty!";
const RESET_DONE_TEXT: &str = "All uploaded photos have been discarded!";
const RESET_EMPTY_TEXT: &str = "You have no uploaded photos to discard.";
const UNSUPPORTED_TEXT: &str = "Only JPEG and PNG images are accepted.";
const STAGING_FAILED_TEXT: &str = "Could not store that photo, please try sending it again.";
const RENDER_FAILED_TEXT: &str =
    "Could not build the PDF from your photos. The upload session has been cleared, please try again.";

const DISPATCH_QUEUE_DEPTH: usize = 64;
const MAX_IN_FLIGHT_UPDATES: usize = 8;
const LISTENER_INITIAL_BACKOFF_SECS: u64 = 2;
const LISTENER_MAX_BACKOFF_SECS: u64 = 60;

/// Shared collaborators handed to every update worker.
pub struct BotContext {
    pub transport: Arc<dyn Transport>,
    pub renderer: Arc<dyn Renderer>,
    pub sessions: Arc<SessionStore>,
    pub staging: Arc<StagingArea>,
    /// Fixed identity that receives a copy of every compiled document.
    pub operator_id: i64,
}

/// Runs the gateway until the dispatch queue closes.
pub async fn run(ctx: Arc<BotContext>) {
    let (tx, rx) = mpsc::channel(DISPATCH_QUEUE_DEPTH);
    let listener = spawn_supervised_listener(
        Arc::clone(&ctx.transport),
        tx,
        LISTENER_INITIAL_BACKOFF_SECS,
        LISTENER_MAX_BACKOFF_SECS,
    );
    run_dispatch_loop(rx, ctx, MAX_IN_FLIGHT_UPDATES).await;
    listener.abort();
}

fn spawn_supervised_listener(
    transport: Arc<dyn Transport>,
    tx: mpsc::Sender<Incoming>,
    initial_backoff_secs: u64,
    max_backoff_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = initial_backoff_secs.max(1);
        let max_backoff = max_backoff_secs.max(backoff);

        loop {
            let result = transport.listen(tx.clone()).await;

            if tx.is_closed() {
                break;
            }

            match result {
                Ok(()) => {
                    tracing::warn!("Update listener exited unexpectedly; restarting");
                    // Clean exit resets backoff since the listener ran successfully.
                    backoff = initial_backoff_secs.max(1);
                }
                Err(e) => {
                    tracing::error!("Update listener error: {e}; restarting");
                }
            }

            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = backoff.saturating_mul(2).min(max_backoff);
        }
    })
}

async fn run_dispatch_loop(
    mut rx: mpsc::Receiver<Incoming>,
    ctx: Arc<BotContext>,
    max_in_flight: usize,
) {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(max_in_flight));
    let mut workers = tokio::task::JoinSet::new();

    while let Some(incoming) = rx.recv().await {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let worker_ctx = Arc::clone(&ctx);
        workers.spawn(async move {
            let _permit = permit;
            handle_incoming(&worker_ctx, incoming).await;
        });

        while let Some(result) = workers.try_join_next() {
            log_worker_join_result(result);
        }
    }

    while let Some(result) = workers.join_next().await {
        log_worker_join_result(result);
    }
}

fn log_worker_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(error) = result {
        tracing::error!("Update worker crashed: {error}");
    }
}

/// Routes one incoming item: uploads go through the ingestion pipeline,
/// commands and the awaiting-name continuation are handled here.
pub async fn handle_incoming(ctx: &BotContext, incoming: Incoming) {
    match incoming.kind {
        IncomingKind::Text(ref text) => handle_text(ctx, &incoming, text).await,
        IncomingKind::Photo { ref file_id } => {
            handle_upload(ctx, &incoming, MediaKind::Photo, file_id).await;
        }
        IncomingKind::Document {
            ref file_id,
            ref file_name,
            ref mime_type,
        } => {
            let kind = MediaKind::Document {
                file_name: file_name.as_deref(),
                mime_type: mime_type.as_deref(),
            };
            handle_upload(ctx, &incoming, kind, file_id).await;
        }
    }
}

async fn handle_upload(ctx: &BotContext, incoming: &Incoming, kind: MediaKind<'_>, file_id: &str) {
    match ingest::ingest(
        ctx,
        incoming.user_id,
        incoming.chat_id,
        incoming.media_group_id.as_deref(),
        kind,
        file_id,
    )
    .await
    {
        Ok(()) => {}
        Err(IngestError::UnsupportedMediaKind) => {
            send_reply(ctx, incoming.chat_id, UNSUPPORTED_TEXT).await;
        }
        Err(IngestError::Staging(e)) => {
            tracing::error!(user_id = incoming.user_id, "Failed to stage upload: {e:#}");
            send_reply(ctx, incoming.chat_id, STAGING_FAILED_TEXT).await;
        }
    }
}

async fn handle_text(ctx: &BotContext, incoming: &Incoming, text: &str) {
    if let Some(command) = parse_command(text) {
        match command {
            Command::Start => send_reply(ctx, incoming.chat_id, USAGE_TEXT).await,
            Command::Reset => {
                if ctx.sessions.delete(incoming.user_id).is_some() {
                    ctx.staging.remove_user_dir(incoming.user_id);
                    send_reply(ctx, incoming.chat_id, RESET_DONE_TEXT).await;
                } else {
                    send_reply(ctx, incoming.chat_id, RESET_EMPTY_TEXT).await;
                }
            }
            Command::Create => {
                if ctx.sessions.begin_naming(incoming.user_id) {
                    send_reply(ctx, incoming.chat_id, NAME_PROMPT_TEXT).await;
                } else {
                    send_reply(ctx, incoming.chat_id, NO_PHOTOS_TEXT).await;
                }
            }
        }
        return;
    }

    if ctx.sessions.end_naming(incoming.user_id) {
        match compile::compile(
            ctx,
            incoming.user_id,
            incoming.chat_id,
            incoming.username.as_deref(),
            text,
        )
        .await
        {
            Ok(()) => {}
            Err(CompileError::EmptyName) => {
                send_reply(ctx, incoming.chat_id, EMPTY_NAME_TEXT).await;
            }
            Err(CompileError::NoPhotos) => {
                send_reply(ctx, incoming.chat_id, NO_PHOTOS_TEXT).await;
            }
            Err(CompileError::Render(e)) => {
                tracing::error!(user_id = incoming.user_id, "PDF render failed: {e:#}");
                send_reply(ctx, incoming.chat_id, RENDER_FAILED_TEXT).await;
            }
            Err(CompileError::Delivery(e)) => {
                tracing::error!(user_id = incoming.user_id, "PDF delivery failed: {e:#}");
            }
        }
        return;
    }

    tracing::debug!(
        user_id = incoming.user_id,
        "Ignoring free-form text outside the naming flow"
    );
}

async fn send_reply(ctx: &BotContext, chat_id: i64, text: &str) {
    if let Err(e) = ctx.transport.send_text(chat_id, text).await {
        tracing::error!("Failed to send reply: {e}");
    }
}
