//! Shared test harness for integration tests.
//!
//! Boots the real router on a random port with scripted adapter doubles in
//! place of yt-dlp/ffmpeg/QR generation, and drives it over HTTP with
//! reqwest.

use async_trait::async_trait;
use mediafetch::config::Config;
use mediafetch::error::{ExtractError, TranscodeError};
use mediafetch::fetch::{Extractor, SourceInfo, StreamSelection};
use mediafetch::jobs::dispatcher::Dispatcher;
use mediafetch::jobs::worker::{JobPipeline, WorkerPool};
use mediafetch::qr::QrGenerator;
use mediafetch::server::{create_router, AppContext};
use mediafetch::store::JobStore;
use mediafetch::transcode::Transcoder;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Extraction double: writes a fixed set of files into the job directory, or
/// fails the way a broken URL would.
pub struct StubExtractor {
    pub title: &'static str,
    pub files: Vec<(&'static str, Vec<u8>)>,
    pub playlist: bool,
    pub fail: bool,
}

impl StubExtractor {
    pub fn producing(title: &'static str, files: Vec<(&'static str, Vec<u8>)>) -> Self {
        Self {
            title,
            files,
            playlist: false,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            title: "",
            files: Vec::new(),
            playlist: false,
            fail: true,
        }
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            title: Some(self.title.to_string()),
            duration: Some(212.0),
            thumbnail: Some("https://example.test/thumb.jpg".to_string()),
            is_playlist: self.playlist,
        }
    }
}

#[async_trait]
impl Extractor for StubExtractor {
    async fn probe(&self, _url: &str) -> Result<SourceInfo, ExtractError> {
        if self.fail {
            return Err(ExtractError::Failed("ERROR: unsupported URL".to_string()));
        }
        Ok(self.info())
    }

    async fn fetch(
        &self,
        _url: &str,
        dest: &Path,
        _selection: StreamSelection,
        _embed_metadata: bool,
    ) -> Result<SourceInfo, ExtractError> {
        if self.fail {
            return Err(ExtractError::Failed("ERROR: unsupported URL".to_string()));
        }
        for (name, bytes) in &self.files {
            std::fs::write(dest.join(name), bytes).expect("stub extractor write failed");
        }
        Ok(self.info())
    }
}

/// Transcoding double: writes a recognizable output, or fails determinately.
pub struct StubTranscoder {
    pub fail: bool,
}

#[async_trait]
impl Transcoder for StubTranscoder {
    async fn to_audio(
        &self,
        _input: &Path,
        output: &Path,
        _bitrate_kbps: u32,
        _normalize: bool,
    ) -> Result<(), TranscodeError> {
        if self.fail {
            return Err(TranscodeError::Failed("conversion failed".to_string()));
        }
        std::fs::write(output, b"transcoded audio").expect("stub transcoder write failed");
        Ok(())
    }

    async fn to_video(&self, _input: &Path, output: &Path) -> Result<(), TranscodeError> {
        if self.fail {
            return Err(TranscodeError::Failed("conversion failed".to_string()));
        }
        std::fs::write(output, b"transcoded video").expect("stub transcoder write failed");
        Ok(())
    }
}

pub struct StubQr {
    pub fail: bool,
}

impl QrGenerator for StubQr {
    fn generate(&self, _data: &str, output: &Path) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("qr encoder exploded");
        }
        std::fs::write(output, b"\x89PNG stub")?;
        Ok(())
    }
}

/// A running server plus handles into its on-disk state.
pub struct TestApp {
    pub store: JobStore,
    pub base: String,
    _downloads: tempfile::TempDir,
}

/// Start the full stack (store, dispatcher, worker pool, router) on a random
/// port with the given adapter doubles.
pub async fn spawn_app(
    extractor: Arc<dyn Extractor>,
    transcoder: Arc<dyn Transcoder>,
    qr: Arc<dyn QrGenerator>,
) -> TestApp {
    let downloads = tempfile::tempdir().expect("failed to create downloads dir");
    let store = JobStore::open(downloads.path()).expect("failed to open store");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind random port");
    let addr = listener.local_addr().expect("failed to get local addr");
    let base = format!("http://{addr}");

    let (queue_tx, queue_rx) = async_channel::bounded(16);
    let pipeline = Arc::new(JobPipeline::new(
        store.clone(),
        extractor.clone(),
        transcoder,
        qr,
        base.clone(),
    ));
    // Handles detach on drop; the workers live for the whole test.
    let _pool = WorkerPool::spawn(2, queue_rx, pipeline);
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), queue_tx));

    let ctx = AppContext {
        config: Arc::new(Config::default()),
        store: store.clone(),
        dispatcher,
        extractor,
        public_url: base.clone(),
    };
    let app = create_router(ctx, None);

    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    TestApp {
        store,
        base,
        _downloads: downloads,
    }
}

/// Convenience: server whose jobs succeed end to end.
pub async fn spawn_default_app(
    title: &'static str,
    files: Vec<(&'static str, Vec<u8>)>,
) -> TestApp {
    spawn_app(
        Arc::new(StubExtractor::producing(title, files)),
        Arc::new(StubTranscoder { fail: false }),
        Arc::new(StubQr { fail: false }),
    )
    .await
}

/// Submit a download request and return the raw response.
pub async fn submit(base: &str, body: serde_json::Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base}/download"))
        .json(&body)
        .send()
        .await
        .expect("submit request failed")
}

/// Poll `/share/{job_id}` until the job reaches a terminal state.
pub async fn wait_for_terminal(base: &str, job_id: &str) -> serde_json::Value {
    let client = reqwest::Client::new();
    for _ in 0..250 {
        let resp = client
            .get(format!("{base}/share/{job_id}"))
            .send()
            .await
            .expect("share request failed");
        let json: serde_json::Value = resp.json().await.expect("share body was not json");
        match json["status"].as_str() {
            Some("done") | Some("error") => return json,
            _ => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    panic!("job {job_id} never reached a terminal state");
}
