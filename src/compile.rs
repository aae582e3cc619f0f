//! Compilation workflow: order the staged photos, render the document, route
//! it by size, and tear the session down on every exit path.

use crate::error::CompileError;
use crate::gateway::BotContext;
use std::path::PathBuf;

/// Byte threshold above which the artifact goes to the operator only.
const MAX_DIRECT_DELIVERY_BYTES: u64 = 50 * 1024 * 1024;

/// On-disk name of the artifact inside the user's staging directory. The
/// user-chosen name is applied at delivery time only, so it never touches
/// the filesystem.
const ARTIFACT_FILE_NAME: &str = "output.pdf";

/// Display handle for operator captions: `@username` when known, the numeric
/// id otherwise.
fn display_handle(user_id: i64, username: Option<&str>) -> String {
    match username {
        Some(name) if !name.is_empty() => format!("@{name}"),
        _ => format!("id:{user_id}"),
    }
}

/// Compiles the user's staged photos into one PDF and delivers it.
///
/// Precondition failures (`NoPhotos`, `EmptyName`) leave the session intact.
/// Once rendering starts, the session and its staging directory are destroyed
/// whether the attempt succeeds or fails.
pub async fn compile(
    ctx: &BotContext,
    user_id: i64,
    chat_id: i64,
    username: Option<&str>,
    requested_name: &str,
) -> Result<(), CompileError> {
    let name = requested_name.trim();
    if name.is_empty() {
        return Err(CompileError::EmptyName);
    }

    let photos = ctx.sessions.ordered_photos(user_id);
    if photos.is_empty() {
        return Err(CompileError::NoPhotos);
    }

    let result = render_and_deliver(ctx, user_id, chat_id, username, name, &photos).await;

    ctx.sessions.delete(user_id);
    ctx.staging.remove_user_dir(user_id);

    result
}

async fn render_and_deliver(
    ctx: &BotContext,
    user_id: i64,
    chat_id: i64,
    username: Option<&str>,
    name: &str,
    photos: &[PathBuf],
) -> Result<(), CompileError> {
    let artifact = ctx.staging.user_dir(user_id).join(ARTIFACT_FILE_NAME);
    let size = ctx
        .renderer
        .assemble(photos, &artifact)
        .map_err(CompileError::Render)?;

    let handle = display_handle(user_id, username);
    let delivery_name = format!("{name}.pdf");

    if size > MAX_DIRECT_DELIVERY_BYTES {
        ctx.transport
            .send_document(
                ctx.operator_id,
                &artifact,
                &delivery_name,
                &format!("Oversized file from {handle}. Delivering to the operator only."),
            )
            .await
            .map_err(CompileError::Delivery)?;
        ctx.transport
            .send_text(
                chat_id,
                "The PDF file exceeded 50 MB. It was delivered to the operator only.",
            )
            .await
            .map_err(CompileError::Delivery)?;
    } else {
        ctx.transport
            .send_document(
                chat_id,
                &artifact,
                &delivery_name,
                &format!("Your PDF file '{name}' is ready!"),
            )
            .await
            .map_err(CompileError::Delivery)?;

        let stamp = chrono::Local::now().format("%H:%M");
        ctx.transport
            .send_document(
                ctx.operator_id,
                &artifact,
                &delivery_name,
                &format!("user: {handle}\ntime: {stamp}"),
            )
            .await
            .map_err(CompileError::Delivery)?;
    }

    Ok(())
}
