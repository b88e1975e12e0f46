#![cfg(unix)]

use std::os::unix::process::ExitStatusExt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use moodstream_core::upload::{TransportRequest, TransportResponse};
use moodstream_core::{
    CancellationFlag, ClipRef, CommandExecutor, Credentials, MoodstreamConfig, Pipeline, PipelineError,
    PlaylistBuilder, PlaylistError, SceneFetcher, StreamEncoder, StreamUploader, UploadResult,
    UploadTransport,
};
use reqwest::Method;
use tokio::process::Command;

/// Pretends to be ffmpeg by writing a fixed payload to the output argument.
struct FakeFfmpeg {
    payload: Vec<u8>,
    args: Mutex<Vec<String>>,
    interrupt: Option<CancellationFlag>,
}

#[async_trait]
impl CommandExecutor for FakeFfmpeg {
    async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output> {
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        if let Some(output) = args.last() {
            std::fs::write(output, &self.payload)?;
        }
        *self.args.lock().unwrap() = args;
        if let Some(flag) = &self.interrupt {
            flag.cancel();
        }
        Ok(std::process::Output {
            status: std::process::ExitStatus::from_raw(0),
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }
}

#[derive(Default)]
struct AcceptingHost {
    requests: Mutex<Vec<TransportRequest>>,
}

#[async_trait]
impl UploadTransport for AcceptingHost {
    async fn send(&self, request: TransportRequest) -> UploadResult<TransportResponse> {
        let method = request.method.clone();
        self.requests.lock().unwrap().push(request);
        Ok(if method == Method::POST {
            TransportResponse::new(201)
                .with_header("Location", "https://upload.test/tus/calm")
                .with_header("stream-media-id", "calm-stream")
        } else {
            TransportResponse::new(204)
        })
    }
}

fn config(root: &std::path::Path, base_url: String) -> MoodstreamConfig {
    let mut config = MoodstreamConfig::default();
    config.paths.moods_dir = root.join("moods");
    config.paths.output_dir = root.join("output");
    config.fetch.base_url = base_url;
    config.playlist.per_clip_seconds = 10.0;
    config.playlist.target_seconds = 60.0;
    config.upload.api_base = "https://api.test/client/v4".into();
    config.upload.chunk_size_bytes = 4;
    config
}

#[tokio::test]
async fn publishes_a_mood_end_to_end() {
    let mut server = mockito::Server::new_async().await;
    for index in 1..=2 {
        server
            .mock("GET", format!("/calm/scenes/scene_{index}.mp4").as_str())
            .with_status(200)
            .with_body(format!("scene-{index}"))
            .create_async()
            .await;
    }
    server
        .mock("GET", "/calm/scenes/scene_3.mp4")
        .with_status(404)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), server.url());
    let ffmpeg = Arc::new(FakeFfmpeg {
        payload: b"encoded-stream".to_vec(),
        args: Mutex::new(Vec::new()),
        interrupt: None,
    });
    let host = Arc::new(AcceptingHost::default());

    let fetcher = SceneFetcher::new(
        reqwest::Client::new(),
        config.fetch.base_url.clone(),
        config.paths.moods_dir.clone(),
    );
    let encoder = StreamEncoder::new("ffmpeg", Some(ffmpeg.clone() as Arc<dyn CommandExecutor>));
    let uploader = StreamUploader::with_transport(
        host.clone(),
        &config.upload,
        Credentials::new("acct", "secret"),
    );
    let mut pipeline = Pipeline::new(config.clone(), fetcher, encoder, uploader)
        .with_builder(PlaylistBuilder::with_seed(42));

    let report = pipeline.run("calm", 3).await.unwrap();

    assert_eq!(report.scenes, 2);
    // 2 clips x 10s per pass, 60s target
    assert_eq!(report.playlist_entries, 6);
    assert_eq!(report.estimated_seconds, 60.0);
    assert_eq!(report.upload.content_id, "calm-stream");
    assert_eq!(report.upload.bytes_sent, 14);
    assert_eq!(report.upload.chunks_sent, 4);
    assert_eq!(report.output_path, dir.path().join("output").join("calm_1min.mp4"));

    let concat = std::fs::read_to_string(&report.concat_path).unwrap();
    assert_eq!(concat.lines().count(), 6);
    assert!(concat.lines().all(|line| line.starts_with("file '")));

    let args = ffmpeg.args.lock().unwrap().clone();
    let concat_arg = report.concat_path.to_string_lossy().into_owned();
    assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == concat_arg));
    assert!(args.windows(2).any(|w| w[0] == "-t" && w[1] == "60"));

    let requests = host.requests.lock().unwrap();
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].header_value("Upload-Length"), Some("14"));
    assert_eq!(requests.len(), 5);
}

#[tokio::test]
async fn interrupt_during_encode_skips_the_upload() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/calm/scenes/scene_1.mp4")
        .with_status(200)
        .with_body("scene-1")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), server.url());
    let host = Arc::new(AcceptingHost::default());
    let uploader = StreamUploader::with_transport(
        host.clone(),
        &config.upload,
        Credentials::new("acct", "secret"),
    );
    let ffmpeg: Arc<dyn CommandExecutor> = Arc::new(FakeFfmpeg {
        payload: b"encoded".to_vec(),
        args: Mutex::new(Vec::new()),
        interrupt: Some(uploader.cancellation().clone()),
    });
    let fetcher = SceneFetcher::new(
        reqwest::Client::new(),
        config.fetch.base_url.clone(),
        config.paths.moods_dir.clone(),
    );
    let mut pipeline = Pipeline::new(
        config,
        fetcher,
        StreamEncoder::new("ffmpeg", Some(ffmpeg)),
        uploader,
    );

    let result = pipeline.run("calm", 1).await;
    assert!(matches!(
        result,
        Err(PipelineError::Cancelled { stage: "upload" })
    ));
    assert!(host.requests.lock().unwrap().is_empty());
}

#[test]
fn assembling_without_clips_fails_before_any_io() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), "http://127.0.0.1:9".into());
    let fetcher = SceneFetcher::new(
        reqwest::Client::new(),
        config.fetch.base_url.clone(),
        config.paths.moods_dir.clone(),
    );
    let encoder = StreamEncoder::new("ffmpeg", None);
    let uploader = StreamUploader::with_transport(
        Arc::new(AcceptingHost::default()),
        &config.upload,
        Credentials::new("acct", "secret"),
    );
    let mut pipeline = Pipeline::new(config, fetcher, encoder, uploader);

    let clips: Vec<ClipRef> = Vec::new();
    assert!(matches!(
        pipeline.assemble("calm", &clips),
        Err(PipelineError::Playlist(PlaylistError::EmptyInput))
    ));
    assert!(!dir.path().join("moods").exists());
}
