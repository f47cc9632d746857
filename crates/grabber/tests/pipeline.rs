#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use grabber::{
    replies, workspace, ChatUpdate, DeliveryError, Downloader, GrabError, GrabberConfig, JobOutcome,
    MessageHandler, MessagingClient, SweepPolicy,
};
use tempfile::TempDir;

/// Messages captured by the fake chat transport
#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Text(i64, String),
    Video { chat_id: i64, name: String, bytes: u64 },
}

#[derive(Default)]
struct RecordingClient {
    sent: Mutex<Vec<Sent>>,
    fail_video: bool,
}

impl RecordingClient {
    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(_, t) => Some(t),
                Sent::Video { .. } => None,
            })
            .collect()
    }

    fn videos(&self) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| matches!(s, Sent::Video { .. }))
            .collect()
    }
}

#[async_trait]
impl MessagingClient for RecordingClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(Sent::Text(chat_id, text.to_string()));
        Ok(())
    }

    async fn send_video(&self, chat_id: i64, video: &Path) -> Result<(), DeliveryError> {
        if self.fail_video {
            return Err(DeliveryError::Video {
                chat_id,
                reason: "upload rejected".to_string(),
            });
        }
        let bytes = std::fs::metadata(video).unwrap().len();
        let name = video.file_name().unwrap().to_string_lossy().into_owned();
        self.sent.lock().unwrap().push(Sent::Video { chat_id, name, bytes });
        Ok(())
    }
}

struct Fixture {
    _bin: TempDir,
    work: TempDir,
    cfg: GrabberConfig,
}

impl Fixture {
    /// `download_body` runs with `$dir` set to the output directory,
    /// `ffmpeg_body` with `$out` set to the output path.
    fn new(download_body: &str, ffmpeg_body: &str) -> Self {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();

        let downloader = write_script(
            bin.path(),
            "fake-yt-dlp",
            &format!(
                "while [ $# -gt 0 ]; do\n\
                 case \"$1\" in\n\
                 -o) tmpl=\"$2\"; shift 2 ;;\n\
                 *) url=\"$1\"; shift ;;\n\
                 esac\n\
                 done\n\
                 dir=$(dirname \"$tmpl\")\n\
                 {}",
                download_body
            ),
        );
        let ffmpeg = write_script(
            bin.path(),
            "fake-ffmpeg",
            &format!("for a; do out=\"$a\"; done\n{}", ffmpeg_body),
        );

        let cfg = GrabberConfig {
            work_dir: work.path().join("temp"),
            downloader_bin: downloader,
            ffmpeg_bin: ffmpeg,
            timeout_secs: 5,
            max_upload_bytes: 5_000,
            ..Default::default()
        };

        Self { _bin: bin, work, cfg }
    }

    fn handler(&self, client: RecordingClient) -> MessageHandler<RecordingClient> {
        MessageHandler::new(Downloader::from_config(&self.cfg), client, self.cfg.max_upload_bytes)
    }

    /// Every file left anywhere under the work directory
    fn leftover_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        collect_files(self.work.path(), &mut files);
        files
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else {
            out.push(path);
        }
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

const DOWNLOAD_OK: &str = "echo '[download] 100%'; head -c 8000 /dev/zero > \"$dir/Song-[abc123].mp4\"";

#[tokio::test]
async fn delivers_compressed_video_and_deletes_it() {
    let fx = Fixture::new(DOWNLOAD_OK, "head -c 4000 /dev/zero > \"$out\"");
    let handler = fx.handler(RecordingClient::default());

    let outcome = handler.handle(&ChatUpdate::text(42, "https://youtu.be/abc123")).await;

    assert_eq!(outcome, JobOutcome::Delivered { bytes: 4000 });
    assert_eq!(
        handler.client().videos(),
        vec![Sent::Video {
            chat_id: 42,
            name: "compressed_Song-[abc123].mp4".to_string(),
            bytes: 4000,
        }]
    );
    let texts = handler.client().texts();
    assert_eq!(texts.len(), 1);
    assert!(replies::is_downloading_quote(&texts[0]));
    assert!(fx.leftover_files().is_empty(), "leftovers: {:?}", fx.leftover_files());
}

#[tokio::test]
async fn oversized_video_is_not_delivered() {
    let fx = Fixture::new(DOWNLOAD_OK, "head -c 5500 /dev/zero > \"$out\"");
    let handler = fx.handler(RecordingClient::default());

    let outcome = handler.handle(&ChatUpdate::text(7, "https://youtu.be/abc123")).await;

    assert_eq!(outcome, JobOutcome::TooLarge { bytes: 5500 });
    assert!(handler.client().videos().is_empty());
    assert_eq!(handler.client().texts().last().map(String::as_str), Some(replies::TOO_LARGE));
    assert!(fx.leftover_files().is_empty());
}

#[tokio::test]
async fn download_timeout_never_reaches_compressor() {
    let mut fx = Fixture::new(
        "head -c 100 /dev/zero > \"$dir/Song-[abc123].mp4.part\"; exec sleep 30",
        "touch \"$out.ffmpeg-ran\"",
    );
    fx.cfg.timeout_secs = 1;
    let handler = fx.handler(RecordingClient::default());

    let started = Instant::now();
    let outcome = handler.handle(&ChatUpdate::text(1, "https://youtu.be/abc123")).await;

    assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
    assert!(matches!(outcome, JobOutcome::Failed { .. }));
    let texts = handler.client().texts();
    assert!(replies::is_error_quote(texts.last().unwrap()));

    // Only the killed download's partial file may remain
    let leftovers = fx.leftover_files();
    assert!(leftovers.iter().all(|p| p.to_string_lossy().ends_with(".part")), "{:?}", leftovers);
}

#[tokio::test]
async fn fetch_reports_timeout_error() {
    let mut fx = Fixture::new("exec sleep 30", "exit 0");
    fx.cfg.timeout_secs = 1;

    let err = Downloader::from_config(&fx.cfg).fetch("https://youtu.be/abc123").await.unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {err:?}");
}

#[tokio::test]
async fn fetch_without_output_is_artifact_not_found() {
    let fx = Fixture::new("echo 'nothing written'", "exit 0");

    let err = Downloader::from_config(&fx.cfg).fetch("https://youtu.be/abc123").await.unwrap_err();

    assert!(err.is_artifact_not_found(), "unexpected error: {err:?}");
    // The empty job directory is released as well
    assert!(fx.leftover_files().is_empty());
    let job_dirs: Vec<_> = std::fs::read_dir(&fx.cfg.work_dir).unwrap().collect();
    assert!(job_dirs.is_empty());
}

#[tokio::test]
async fn downloader_failure_keeps_diagnostics_out_of_chat() {
    let fx = Fixture::new("echo 'ERROR: [youtube] abc123: Video unavailable' >&2; exit 1", "exit 0");
    let handler = fx.handler(RecordingClient::default());

    let outcome = handler.handle(&ChatUpdate::text(3, "https://youtu.be/abc123")).await;

    match outcome {
        JobOutcome::Failed { reason } => assert!(reason.contains("exited with code 1")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    let texts = handler.client().texts();
    assert!(texts.iter().all(|t| !t.contains("Video unavailable")));
    assert!(replies::is_error_quote(texts.last().unwrap()));

    let err = Downloader::from_config(&fx.cfg).fetch("https://youtu.be/abc123").await.unwrap_err();
    match err {
        GrabError::ProcessFailure { exit_code, output, .. } => {
            assert_eq!(exit_code, 1);
            assert!(output.contains("Video unavailable"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn compression_failure_removes_intermediate_files() {
    let fx = Fixture::new(DOWNLOAD_OK, "head -c 10 /dev/zero > \"$out\"; echo 'Conversion failed!' >&2; exit 1");

    let err = Downloader::from_config(&fx.cfg).fetch("https://youtu.be/abc123").await.unwrap_err();

    assert!(matches!(err, GrabError::ProcessFailure { exit_code: 1, .. }));
    assert!(fx.leftover_files().is_empty(), "leftovers: {:?}", fx.leftover_files());
}

#[tokio::test]
async fn successful_fetch_leaves_only_compressed_file() {
    let fx = Fixture::new(DOWNLOAD_OK, "head -c 4000 /dev/zero > \"$out\"");

    let artifact = Downloader::from_config(&fx.cfg).fetch("https://youtu.be/abc123").await.unwrap();

    assert_eq!(artifact.file_name(), "compressed_Song-[abc123].mp4");
    assert_eq!(fx.leftover_files(), vec![artifact.path.clone()]);

    grabber::cleanup(artifact).await;
    let remaining: Vec<_> = std::fs::read_dir(&fx.cfg.work_dir).unwrap().flatten().map(|e| e.path()).collect();
    assert!(remaining.is_empty(), "remaining: {:?}", remaining);
}

#[tokio::test]
async fn sweep_during_fetch_spares_running_job() {
    let fx = Fixture::new(&format!("sleep 1
{}", DOWNLOAD_OK), "head -c 4000 /dev/zero > \"$out\"");
    let downloader = Downloader::from_config(&fx.cfg);
    let policy = SweepPolicy::from_config(&fx.cfg);
    let work_dir = fx.cfg.work_dir.clone();

    let sweeper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        workspace::sweep_orphans(&work_dir, policy).await
    });
    let fetched = downloader.fetch("https://youtu.be/abc123").await;

    assert_eq!(sweeper.await.unwrap().unwrap(), 0);
    let artifact = fetched.unwrap();
    assert_eq!(artifact.file_name(), "compressed_Song-[abc123].mp4");
    grabber::cleanup(artifact).await;
}

#[tokio::test]
async fn shared_directory_ignores_previous_transcodes() {
    let mut fx = Fixture::new(DOWNLOAD_OK, "head -c 4000 /dev/zero > \"$out\"");
    fx.cfg.isolate_jobs = false;
    std::fs::create_dir_all(&fx.cfg.work_dir).unwrap();
    std::fs::write(fx.cfg.work_dir.join("compressed_Old-[zzz].mp4"), b"old").unwrap();

    let artifact = Downloader::from_config(&fx.cfg).fetch("https://youtu.be/abc123").await.unwrap();

    assert_eq!(artifact.path, fx.cfg.work_dir.join("compressed_Song-[abc123].mp4"));
    assert!(!fx.cfg.work_dir.join("Song-[abc123].mp4").exists());
}

#[tokio::test]
async fn failed_delivery_still_cleans_up() {
    let fx = Fixture::new(DOWNLOAD_OK, "head -c 4000 /dev/zero > \"$out\"");
    let handler = fx.handler(RecordingClient {
        fail_video: true,
        ..Default::default()
    });

    let outcome = handler.handle(&ChatUpdate::text(9, "https://youtu.be/abc123")).await;

    assert!(matches!(outcome, JobOutcome::Failed { .. }));
    assert!(replies::is_error_quote(handler.client().texts().last().unwrap()));
    assert!(fx.leftover_files().is_empty());
}

#[tokio::test]
async fn non_download_messages() {
    let fx = Fixture::new("exit 1", "exit 1");
    let handler = fx.handler(RecordingClient::default());

    assert_eq!(handler.handle(&ChatUpdate::text(5, "/start")).await, JobOutcome::Greeted);
    assert_eq!(handler.handle(&ChatUpdate::text(5, "hello")).await, JobOutcome::Unrecognized);
    assert_eq!(handler.handle(&ChatUpdate::text(5, "/start ")).await, JobOutcome::Unrecognized);
    assert_eq!(
        handler.handle(&ChatUpdate::text(5, " https://youtu.be/abc123")).await,
        JobOutcome::Unrecognized
    );
    assert_eq!(
        handler.handle(&ChatUpdate { chat_id: 5, text: None }).await,
        JobOutcome::Ignored
    );

    assert_eq!(
        handler.client().sent(),
        vec![
            Sent::Text(5, replies::GREETING.to_string()),
            Sent::Text(5, replies::UNRECOGNIZED.to_string()),
            Sent::Text(5, replies::UNRECOGNIZED.to_string()),
            Sent::Text(5, replies::UNRECOGNIZED.to_string()),
        ]
    );
    assert!(!fx.cfg.work_dir.exists());
}
