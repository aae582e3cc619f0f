//! Ingestion pipeline: media-kind policy, album aggregation, staging.

use crate::error::IngestError;
use crate::gateway::BotContext;
use anyhow::Context;

const ACK_TEXT: &str = "Your photos were received! Send /create to build the PDF file.";
const DEFAULT_EXTENSION: &str = "jpg";

/// Media kind of an incoming item, as declared by the transport.
#[derive(Debug, Clone, Copy)]
pub enum MediaKind<'a> {
    /// Raw photo attachment. Always accepted.
    Photo,
    /// Generic file attachment; accepted only when its declared MIME type is
    /// an accepted image type.
    Document {
        file_name: Option<&'a str>,
        mime_type: Option<&'a str>,
    },
}

/// Staged file extension for an accepted item, `None` when the item is
/// rejected. Derived from the declared file name when possible, else from
/// the MIME type, else the default.
fn staged_extension(kind: &MediaKind<'_>) -> Option<String> {
    match kind {
        MediaKind::Photo => Some(DEFAULT_EXTENSION.to_string()),
        MediaKind::Document {
            file_name,
            mime_type,
        } => {
            let by_mime = match mime_type.map(str::to_ascii_lowercase).as_deref() {
                Some("image/jpeg") => "jpg",
                Some("image/png") => "png",
                _ => return None,
            };
            let by_name = file_name
                .and_then(|name| std::path::Path::new(name).extension())
                .and_then(|ext| ext.to_str())
                .map(str::to_ascii_lowercase)
                .filter(|ext| matches!(ext.as_str(), "jpg" | "jpeg" | "png"));
            Some(by_name.unwrap_or_else(|| by_mime.to_string()))
        }
    }
}

/// Ingests one incoming item: validates its kind, admits it into the user's
/// session (album aggregation plus position assignment, atomically), stages
/// its bytes, records it, and sends the one-per-batch acknowledgment.
pub async fn ingest(
    ctx: &BotContext,
    user_id: i64,
    chat_id: i64,
    album: Option<&str>,
    kind: MediaKind<'_>,
    file_id: &str,
) -> Result<(), IngestError> {
    let Some(extension) = staged_extension(&kind) else {
        return Err(IngestError::UnsupportedMediaKind);
    };

    let admission = ctx.sessions.admit(user_id, album);

    let bytes = ctx
        .transport
        .download_file(file_id)
        .await
        .context("Failed to download incoming file")
        .map_err(IngestError::Staging)?;

    let file_name = format!("{}.{extension}", admission.position);
    let path = ctx
        .staging
        .write(user_id, &file_name, &bytes)
        .map_err(IngestError::Staging)?;

    if !ctx.sessions.record(user_id, admission.position, path.clone()) {
        // A /reset won the race; drop the file it could not have observed.
        ctx.staging.remove_file(&path);
        return Ok(());
    }

    if admission.acknowledge {
        if let Err(e) = ctx.transport.send_text(chat_id, ACK_TEXT).await {
            tracing::warn!("Failed to send upload acknowledgment: {e}");
        }
    }
    Ok(())
}
