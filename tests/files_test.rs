//! File serving over HTTP: range requests, conditional requests and the
//! download-latest alias.

mod common;

use common::{spawn_default_app, TestApp};
use mediafetch::jobs::{new_job_id, Job, JobOutcome, JobParams};
use reqwest::header;

const FILE_LEN: usize = 500;

fn pattern() -> Vec<u8> {
    (0..FILE_LEN).map(|i| (i % 251) as u8).collect()
}

/// Seed a completed job straight through the store, bypassing the pipeline.
fn seed_done_job(app: &TestApp, filename: &str) -> String {
    let job_id = new_job_id();
    let params: JobParams =
        serde_json::from_str(r#"{"url": "https://example.test/seeded"}"#).unwrap();
    let mut job = Job::new(job_id.clone(), params);
    app.store.create(&job).unwrap();

    std::fs::write(app.store.job_dir(&job_id).join(filename), pattern()).unwrap();

    job.begin();
    job.complete(JobOutcome {
        title: "Seeded".to_string(),
        filename: filename.to_string(),
        is_playlist: false,
        download_url: format!("{}/file/{}/{}", app.base, job_id, filename),
        dl_url: format!("{}/dl/{}", app.base, job_id),
        qr_url: None,
    });
    app.store.update(&job).unwrap();
    job_id
}

#[tokio::test]
async fn full_download_carries_metadata_headers() {
    let app = spawn_default_app("x", vec![]).await;
    let job_id = seed_done_job(&app, "song.mp3");

    let resp = reqwest::get(format!("{}/file/{}/song.mp3", app.base, job_id))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let headers = resp.headers().clone();
    assert_eq!(headers[header::CONTENT_LENGTH], FILE_LEN.to_string());
    assert_eq!(headers[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"song.mp3\""
    );
    let etag = headers[header::ETAG].to_str().unwrap();
    assert!(etag.starts_with('"') && etag.ends_with('"'));
    assert!(headers.contains_key(header::LAST_MODIFIED));

    assert_eq!(resp.bytes().await.unwrap().as_ref(), pattern().as_slice());
}

#[tokio::test]
async fn range_request_returns_exact_slice() {
    let app = spawn_default_app("x", vec![]).await;
    let job_id = seed_done_job(&app, "song.mp3");
    let client = reqwest::Client::new();
    let url = format!("{}/file/{}/song.mp3", app.base, job_id);

    let resp = client
        .get(&url)
        .header(header::RANGE, "bytes=100-199")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 206);
    assert_eq!(resp.headers()[header::CONTENT_RANGE], "bytes 100-199/500");
    assert_eq!(resp.headers()[header::CONTENT_LENGTH], "100");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &pattern()[100..200]);
}

#[tokio::test]
async fn open_ended_and_suffix_ranges() {
    let app = spawn_default_app("x", vec![]).await;
    let job_id = seed_done_job(&app, "song.mp3");
    let client = reqwest::Client::new();
    let url = format!("{}/file/{}/song.mp3", app.base, job_id);

    // From an offset to the end.
    let resp = client
        .get(&url)
        .header(header::RANGE, "bytes=450-")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 206);
    assert_eq!(resp.headers()[header::CONTENT_RANGE], "bytes 450-499/500");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &pattern()[450..]);

    // Last N bytes.
    let resp = client
        .get(&url)
        .header(header::RANGE, "bytes=-50")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 206);
    assert_eq!(resp.headers()[header::CONTENT_RANGE], "bytes 450-499/500");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &pattern()[450..]);
}

#[tokio::test]
async fn out_of_bounds_range_is_416() {
    let app = spawn_default_app("x", vec![]).await;
    let job_id = seed_done_job(&app, "song.mp3");

    let resp = reqwest::Client::new()
        .get(format!("{}/file/{}/song.mp3", app.base, job_id))
        .header(header::RANGE, "bytes=1000-")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 416);
    assert_eq!(resp.headers()[header::CONTENT_RANGE], "bytes */500");
}

#[tokio::test]
async fn malformed_range_falls_back_to_full_body() {
    let app = spawn_default_app("x", vec![]).await;
    let job_id = seed_done_job(&app, "song.mp3");

    let resp = reqwest::Client::new()
        .get(format!("{}/file/{}/song.mp3", app.base, job_id))
        .header(header::RANGE, "bytes=banana")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().len(), FILE_LEN);
}

#[tokio::test]
async fn if_none_match_revalidation_is_304() {
    let app = spawn_default_app("x", vec![]).await;
    let job_id = seed_done_job(&app, "song.mp3");
    let client = reqwest::Client::new();
    let url = format!("{}/file/{}/song.mp3", app.base, job_id);

    let first = client.get(&url).send().await.unwrap();
    let etag = first.headers()[header::ETAG].to_str().unwrap().to_string();

    let resp = client
        .get(&url)
        .header(header::IF_NONE_MATCH, &etag)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 304);
    assert!(resp.bytes().await.unwrap().is_empty());

    // A stale validator gets the full body again.
    let resp = client
        .get(&url)
        .header(header::IF_NONE_MATCH, "\"0-0\"")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn dl_alias_serves_latest_artifact_of_done_job() {
    let app = spawn_default_app("x", vec![]).await;
    let job_id = seed_done_job(&app, "video.mp4");

    let resp = reqwest::get(format!("{}/dl/{}", app.base, job_id))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), pattern().as_slice());
}

#[tokio::test]
async fn dl_alias_rejects_unfinished_and_unknown_jobs() {
    let app = spawn_default_app("x", vec![]).await;

    // Unknown id.
    let resp = reqwest::get(format!("{}/dl/deadbeef0000", app.base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Known but still queued.
    let params: JobParams =
        serde_json::from_str(r#"{"url": "https://example.test/pending"}"#).unwrap();
    let job = Job::new(new_job_id(), params);
    app.store.create(&job).unwrap();
    let resp = reqwest::get(format!("{}/dl/{}", app.base, job.job_id))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn missing_and_unsafe_filenames_are_404() {
    let app = spawn_default_app("x", vec![]).await;
    let job_id = seed_done_job(&app, "song.mp3");

    let resp = reqwest::get(format!("{}/file/{}/nope.mp3", app.base, job_id))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Traversal attempts never reach the filesystem.
    let resp = reqwest::get(format!("{}/file/{}/..%2Fmeta.json", app.base, job_id))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = reqwest::get(format!("{}/file/not..valid../song.mp3", app.base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
