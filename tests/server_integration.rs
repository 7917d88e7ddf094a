//! End-to-end tests for the HTTP and WebSocket surface.
//!
//! Each test starts the real router on a free port, backed by an in-memory
//! index, the hashing embedder, and a scripted generator, then drives it
//! with reqwest or tokio-tungstenite.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use futures::{SinkExt, Stream};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_tungstenite::tungstenite::{self, Message};

use rag_chat::config::Config;
use rag_chat::core::embedding::HashEmbedder;
use rag_chat::core::generation::{Generator, TokenStream};
use rag_chat::core::query::QueryEngine;
use rag_chat::core::store::memory::InMemoryIndex;
use rag_chat::core::store::VectorIndex;
use rag_chat::server::{router, AppState};
use rag_chat::services;

/// Answers every prompt with a fixed reply, or fails if `fail` is set.
struct ScriptedGenerator {
    reply: String,
    fail: bool,
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted-model"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        if self.fail {
            bail!("provider unavailable");
        }
        Ok(self.reply.clone())
    }

    async fn stream(&self, _prompt: &str) -> Result<TokenStream> {
        if self.fail {
            bail!("provider unavailable");
        }
        let tokens: Vec<Result<String>> = self
            .reply
            .split_inclusive(' ')
            .map(|t| Ok(t.to_string()))
            .collect();
        Ok(stream::iter(tokens).boxed())
    }
}

/// Streams `t0 `, `t1 `, ... forever, one token every 50ms, and flags when
/// the stream is dropped.
struct DrippingGenerator {
    dropped: Arc<AtomicBool>,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Generator for DrippingGenerator {
    fn model_name(&self) -> &str {
        "dripping-model"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok("t0 t1 ".to_string())
    }

    async fn stream(&self, _prompt: &str) -> Result<TokenStream> {
        let flag = DropFlag(self.dropped.clone());
        Ok(stream::unfold((0usize, flag), |(i, flag)| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Some((Ok(format!("t{} ", i)), (i + 1, flag)))
        })
        .boxed())
    }
}

struct TestServer {
    _tmp: TempDir,
    port: u16,
    base: String,
    client: reqwest::Client,
    state: AppState,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn count(&self) -> u64 {
        let body: Value = self
            .client
            .get(self.url("/documents/count"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        body["count"].as_u64().unwrap()
    }

    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> reqwest::Response {
        let form = Form::new().part("file", Part::bytes(bytes).file_name(filename.to_string()));
        self.client
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

async fn start(generator: impl Generator + 'static) -> TestServer {
    let tmp = TempDir::new().unwrap();
    let mut cfg = Config::default();
    cfg.upload.directory = tmp.path().join("uploads");
    cfg.chunking.chunk_size = 200;
    cfg.chunking.chunk_overlap = 40;

    let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new(Arc::new(HashEmbedder::new(128))));
    let engine = Arc::new(QueryEngine::new(
        index.clone(),
        Arc::new(generator),
        cfg.retrieval.top_k,
    ));
    let state = AppState::new(cfg.upload.clone(), services::ingestor(&cfg, index), engine);

    let port = find_free_port();
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    wait_for_server(port).await;

    TestServer {
        _tmp: tmp,
        port,
        base: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        state,
    }
}

/// Next JSON text frame from the server.
async fn next_event<S>(ws: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no frame within 5 seconds")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Poll `check` every 50ms for up to 5 seconds.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

fn replying(reply: &str) -> ScriptedGenerator {
    ScriptedGenerator {
        reply: reply.to_string(),
        fail: false,
    }
}

/// Minimal valid PDF whose page reads "spec test phrase".
/// Builds body then xref with correct byte offsets so pdf-extract can parse it.
fn minimal_pdf_with_phrase() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 44 >> stream\nBT /F1 12 Tf 100 700 Td (spec test phrase) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn minimal_docx_with_text(phrase: &str) -> Vec<u8> {
    use std::io::Write;
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
            phrase
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn long_text() -> Vec<u8> {
    (0..40)
        .map(|i| format!("Paragraph {} explains the kubernetes deployment runbook.", i))
        .collect::<Vec<_>>()
        .join("\n\n")
        .into_bytes()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn root_and_health_report_service_state() {
    let server = start(replying("ok")).await;

    let root: Value = server.client.get(server.url("/")).send().await.unwrap().json().await.unwrap();
    assert_eq!(root["message"], "Real-Time RAG Assistant API");
    assert_eq!(root["status"], "running");
    assert_eq!(root["version"], env!("CARGO_PKG_VERSION"));

    let health: Value = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["documents_indexed"], 0);
    assert_eq!(health["model"], "scripted-model");
}

#[tokio::test]
async fn supported_uploads_grow_the_index_by_chunks_created() {
    let server = start(replying("ok")).await;

    let uploads = vec![
        ("notes.txt", long_text()),
        ("spec.pdf", minimal_pdf_with_phrase()),
        ("report.docx", minimal_docx_with_text("office test phrase")),
    ];

    for (name, bytes) in uploads {
        let before = server.count().await;
        let resp = server.upload(name, bytes).await;
        assert_eq!(resp.status(), 200, "upload of {} failed", name);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["filename"], name);
        assert_eq!(body["status"], "success");
        let created = body["chunks_created"].as_u64().unwrap();
        assert!(created >= 1, "{} produced no chunks", name);
        assert_eq!(
            body["message"],
            format!("Document processed successfully. Created {} chunks.", created)
        );
        assert_eq!(server.count().await, before + created);
    }
}

#[tokio::test]
async fn unsupported_upload_is_rejected_without_indexing() {
    let server = start(replying("ok")).await;
    server.upload("notes.txt", long_text()).await;
    let before = server.count().await;

    let resp = server.upload("installer.exe", b"MZ\x90\x00".to_vec()).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(
        body["error"]["message"],
        "File type not supported. Allowed: .pdf, .txt, .docx, .doc"
    );
    assert_eq!(server.count().await, before);
}

#[tokio::test]
async fn corrupt_document_is_a_server_error() {
    let server = start(replying("ok")).await;
    let resp = server.upload("broken.pdf", b"not a pdf".to_vec()).await;
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "internal");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Error processing document"));
    assert_eq!(server.count().await, 0);
}

#[tokio::test]
async fn upload_reports_stored_name_used_as_source() {
    let server = start(replying("ok")).await;
    let resp = server.upload("reports/q3/notes.txt", long_text()).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["filename"], "notes.txt");

    let chat: Value = server
        .client
        .post(server.url("/chat"))
        .json(&json!({"message": "deployment runbook"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(chat["sources"], json!([body["filename"].clone()]));
}

#[tokio::test]
async fn clearing_documents_resets_count() {
    let server = start(replying("ok")).await;
    server.upload("notes.txt", long_text()).await;
    assert!(server.count().await > 0);

    let resp = server.client.delete(server.url("/documents")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "All documents cleared");
    assert_eq!(server.count().await, 0);
}

#[tokio::test]
async fn chat_answers_with_sources_and_conversation_id() {
    let server = start(replying("Roll out one zone at a time.")).await;
    server.upload("notes.txt", long_text()).await;

    let resp = server
        .client
        .post(server.url("/chat"))
        .json(&serde_json::json!({"message": "How do I deploy to kubernetes?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["response"], "Roll out one zone at a time.");
    assert_eq!(body["sources"], serde_json::json!(["notes.txt"]));
    let generated = body["conversation_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());

    let body: Value = server
        .client
        .post(server.url("/chat"))
        .json(&serde_json::json!({"message": "And rollback?", "conversation_id": "conv-42"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["conversation_id"], "conv-42");
}

#[tokio::test]
async fn chat_rejects_empty_message() {
    let server = start(replying("ok")).await;
    let resp = server
        .client
        .post(server.url("/chat"))
        .json(&serde_json::json!({"message": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "No message provided");
}

#[tokio::test]
async fn chat_generation_failure_is_a_server_error() {
    let server = start(ScriptedGenerator {
        reply: String::new(),
        fail: true,
    })
    .await;
    server.upload("notes.txt", long_text()).await;

    let resp = server
        .client
        .post(server.url("/chat"))
        .json(&serde_json::json!({"message": "anything"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "internal");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("generation failed"));
}

#[tokio::test]
async fn websocket_session_over_real_socket() {
    let dropped = Arc::new(AtomicBool::new(false));
    let server = start(DrippingGenerator {
        dropped: dropped.clone(),
    })
    .await;
    server.upload("notes.txt", long_text()).await;

    let url = format!("ws://127.0.0.1:{}/ws/chat", server.port);
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    ws.send(Message::text(r#"{"type":"ping"}"#.to_string()))
        .await
        .unwrap();
    assert_eq!(next_event(&mut ws).await, json!({"type": "pong"}));

    // Binary frames are read as text.
    ws.send(Message::binary(br#"{"type":"ping"}"#.to_vec()))
        .await
        .unwrap();
    assert_eq!(next_event(&mut ws).await, json!({"type": "pong"}));

    // Protocol-level pings are answered by the socket layer and never reach the session.
    ws.send(Message::Ping(Vec::new().into())).await.unwrap();
    ws.send(Message::text("not json".to_string())).await.unwrap();
    assert_eq!(
        next_event(&mut ws).await,
        json!({"type": "error", "content": "Invalid message format"})
    );
    assert_eq!(server.state.connections(), 1);

    ws.send(Message::text(
        json!({"message": "How do I deploy?"}).to_string(),
    ))
    .await
    .unwrap();
    assert_eq!(
        next_event(&mut ws).await,
        json!({"type": "token", "content": "t0 "})
    );

    // Vanish mid-answer without a close handshake.
    drop(ws);

    assert!(
        eventually(|| dropped.load(Ordering::SeqCst) && server.state.connections() == 0).await,
        "abandoned answer was not released (dropped={}, connections={})",
        dropped.load(Ordering::SeqCst),
        server.state.connections()
    );
}

#[tokio::test]
async fn websocket_close_frame_ends_session() {
    let server = start(replying("ok")).await;

    let url = format!("ws://127.0.0.1:{}/ws/chat", server.port);
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws.send(Message::text(r#"{"type":"ping"}"#.to_string()))
        .await
        .unwrap();
    assert_eq!(next_event(&mut ws).await, json!({"type": "pong"}));

    // An empty index answers with an advisory instead of running a query.
    ws.send(Message::text(json!({"message": "anyone?"}).to_string()))
        .await
        .unwrap();
    assert_eq!(next_event(&mut ws).await["type"], "info");
    assert_eq!(server.state.connections(), 1);

    ws.close(None).await.unwrap();
    assert!(eventually(|| server.state.connections() == 0).await);
}

