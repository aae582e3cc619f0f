//! End-to-end exercise of the upload session and compilation flow against
//! in-memory transport and renderer fakes, plus one pass through the real
//! PDF renderer.

use async_trait::async_trait;
use parking_lot::Mutex;
use photobind::gateway::{self, BotContext};
use photobind::pdf::{PdfRenderer, Renderer};
use photobind::session::SessionStore;
use photobind::storage::StagingArea;
use photobind::telegram::{Incoming, IncomingKind, Transport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

const USER: i64 = 1;
const OPERATOR: i64 = 9000;

#[derive(Debug, Clone)]
struct SentDocument {
    chat_id: i64,
    file_name: String,
    caption: String,
    magic_ok: bool,
}

struct FakeTransport {
    texts: Mutex<Vec<(i64, String)>>,
    documents: Mutex<Vec<SentDocument>>,
    payload: Vec<u8>,
}

impl FakeTransport {
    fn new(payload: Vec<u8>) -> Self {
        Self {
            texts: Mutex::new(Vec::new()),
            documents: Mutex::new(Vec::new()),
            payload,
        }
    }

    fn sent_texts(&self) -> Vec<(i64, String)> {
        self.texts.lock().clone()
    }

    fn sent_documents(&self) -> Vec<SentDocument> {
        self.documents.lock().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.texts.lock().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        caption: &str,
    ) -> anyhow::Result<()> {
        let bytes = std::fs::read(path)?;
        self.documents.lock().push(SentDocument {
            chat_id,
            file_name: file_name.to_string(),
            caption: caption.to_string(),
            magic_ok: bytes.starts_with(b"%PDF"),
        });
        Ok(())
    }

    async fn download_file(&self, _file_id: &str) -> anyhow::Result<Vec<u8>> {
        Ok(self.payload.clone())
    }

    async fn listen(&self, _tx: mpsc::Sender<Incoming>) -> anyhow::Result<()> {
        Ok(())
    }
}

struct FakeRenderer {
    size: u64,
    calls: Mutex<Vec<Vec<PathBuf>>>,
}

impl FakeRenderer {
    fn with_size(size: u64) -> Self {
        Self {
            size,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl Renderer for FakeRenderer {
    fn assemble(&self, photos: &[PathBuf], output: &Path) -> anyhow::Result<u64> {
        self.calls.lock().push(photos.to_vec());
        std::fs::write(output, b"%PDF-1.5 fake")?;
        Ok(self.size)
    }
}

fn jpeg_payload() -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    image::RgbImage::from_pixel(24, 16, image::Rgb([10, 120, 200]))
        .write_to(&mut buf, image::ImageFormat::Jpeg)
        .expect("jpeg encode");
    buf.into_inner()
}

fn context(
    root: &Path,
    transport: Arc<FakeTransport>,
    renderer: Arc<dyn Renderer>,
) -> Arc<BotContext> {
    Arc::new(BotContext {
        transport,
        renderer,
        sessions: Arc::new(SessionStore::new()),
        staging: Arc::new(StagingArea::new(root)),
        operator_id: OPERATOR,
    })
}

fn photo(user_id: i64, file_id: &str, album: Option<&str>) -> Incoming {
    Incoming {
        user_id,
        chat_id: user_id,
        username: Some("alice".to_string()),
        media_group_id: album.map(str::to_string),
        kind: IncomingKind::Photo {
            file_id: file_id.to_string(),
        },
    }
}

fn text(user_id: i64, body: &str) -> Incoming {
    Incoming {
        user_id,
        chat_id: user_id,
        username: Some("alice".to_string()),
        media_group_id: None,
        kind: IncomingKind::Text(body.to_string()),
    }
}

#[tokio::test]
async fn album_upload_compiles_into_a_real_pdf_for_user_and_operator() {
    let dir = tempfile::tempdir().expect("tempdir");
    let transport = Arc::new(FakeTransport::new(jpeg_payload()));
    let ctx = context(dir.path(), transport.clone(), Arc::new(PdfRenderer));

    for file_id in ["a", "b"] {
        gateway::handle_incoming(&ctx, photo(USER, file_id, Some("g1"))).await;
    }
    gateway::handle_incoming(&ctx, photo(USER, "c", None)).await;

    // Exactly one acknowledgment for the album; the standalone follow-up is
    // part of the same already-acknowledged run.
    assert_eq!(transport.sent_texts().len(), 1);

    gateway::handle_incoming(&ctx, text(USER, "/create")).await;
    gateway::handle_incoming(&ctx, text(USER, "Trip")).await;

    let documents = transport.sent_documents();
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].chat_id, USER);
    assert_eq!(documents[0].file_name, "Trip.pdf");
    assert!(documents[0].caption.contains("'Trip'"));
    assert!(documents[0].magic_ok);
    assert_eq!(documents[1].chat_id, OPERATOR);
    assert!(documents[1].caption.contains("@alice"));

    assert!(!ctx.sessions.exists_with_items(USER));
    assert!(!ctx.staging.user_dir(USER).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_burst_keeps_positions_unique_and_ordered() {
    const PHOTOS: u32 = 50;

    let dir = tempfile::tempdir().expect("tempdir");
    let transport = Arc::new(FakeTransport::new(b"jpeg".to_vec()));
    let renderer = Arc::new(FakeRenderer::with_size(1024));
    let ctx = context(dir.path(), transport.clone(), renderer.clone());

    let mut workers = tokio::task::JoinSet::new();
    for n in 0..PHOTOS {
        let ctx = Arc::clone(&ctx);
        workers.spawn(async move {
            gateway::handle_incoming(&ctx, photo(USER, &format!("f{n}"), Some("burst"))).await;
        });
    }
    while let Some(result) = workers.join_next().await {
        result.expect("ingest worker panicked");
    }

    // One acknowledgment for the whole burst.
    assert_eq!(transport.sent_texts().len(), 1);

    let staged = ctx.sessions.ordered_photos(USER);
    assert_eq!(staged.len(), PHOTOS as usize);
    let positions: Vec<u32> = staged
        .iter()
        .map(|path| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse().ok())
                .expect("staged file named by position")
        })
        .collect();
    assert_eq!(positions, (1..=PHOTOS).collect::<Vec<_>>());

    gateway::handle_incoming(&ctx, text(USER, "/create")).await;
    gateway::handle_incoming(&ctx, text(USER, "Burst")).await;

    // The renderer saw the same ascending-position sequence.
    let calls = renderer.calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], staged);
}

#[tokio::test]
async fn oversized_artifact_is_routed_to_the_operator_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let transport = Arc::new(FakeTransport::new(b"jpeg".to_vec()));
    let renderer = Arc::new(FakeRenderer::with_size(60 * 1024 * 1024));
    let ctx = context(dir.path(), transport.clone(), renderer);

    gateway::handle_incoming(&ctx, photo(USER, "a", None)).await;
    gateway::handle_incoming(&ctx, text(USER, "/create")).await;
    gateway::handle_incoming(&ctx, text(USER, "Huge")).await;

    let documents = transport.sent_documents();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].chat_id, OPERATOR);
    assert!(documents[0].caption.contains("@alice"));

    let texts = transport.sent_texts();
    let notice = &texts.last().expect("notice").1;
    assert!(notice.contains("operator"));
    assert!(!texts.iter().any(|(_, t)| t.contains("ready")));

    assert!(!ctx.sessions.exists_with_items(USER));
}

#[tokio::test]
async fn create_without_photos_never_touches_the_renderer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let transport = Arc::new(FakeTransport::new(Vec::new()));
    let renderer = Arc::new(FakeRenderer::with_size(1024));
    let ctx = context(dir.path(), transport.clone(), renderer.clone());

    gateway::handle_incoming(&ctx, text(USER, "/create")).await;

    assert!(renderer.calls.lock().is_empty());
    let texts = transport.sent_texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].1.contains("haven't uploaded"));
}

#[tokio::test]
async fn reset_discards_the_session_and_reports_when_there_is_none() {
    let dir = tempfile::tempdir().expect("tempdir");
    let transport = Arc::new(FakeTransport::new(b"jpeg".to_vec()));
    let ctx = context(
        dir.path(),
        transport.clone(),
        Arc::new(FakeRenderer::with_size(1024)),
    );

    gateway::handle_incoming(&ctx, photo(USER, "a", None)).await;
    assert!(ctx.sessions.exists_with_items(USER));

    gateway::handle_incoming(&ctx, text(USER, "/reset")).await;
    assert!(!ctx.sessions.exists_with_items(USER));
    assert!(!ctx.staging.user_dir(USER).exists());

    gateway::handle_incoming(&ctx, text(USER, "/reset")).await;
    let texts = transport.sent_texts();
    assert!(texts.last().expect("reply").1.contains("no uploaded photos"));
}
