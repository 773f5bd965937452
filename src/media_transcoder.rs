//! # Media Transcoding Module
//!
//! Questo modulo pilota l'encoder esterno (ffmpeg) per convertire audio e video.
//!
//! ## Responsabilità:
//! - Sceglie la regola di conversione in ordine di priorità (`MediaRule::select`)
//! - Costruisce la lista di argomenti (mai una stringa interpretata da una shell)
//! - Avvia il processo nella directory dell'eseguibile, con stdout/stderr in pipe
//! - Svuota entrambi gli stream in task dedicati mentre il processo gira
//! - Attende la terminazione e traduce exit code / errori di avvio in `ConversionError`
//!
//! ## Regole (la prima che corrisponde vince):
//! 1. input video o audio, output `.mp3` -> estrazione audio
//!    (`-vn -acodec libmp3lame -q:a 2`, il preset viene ignorato)
//! 2. video -> video -> transcodifica completa (`-c:v <codec> -preset <p> -crf <n>`)
//! 3. audio -> audio -> remux/ricodifica senza flag aggiuntivi
//! 4. altrimenti `UnsupportedMediaConversion`
//!
//! Tutte le destinazioni vengono sovrascritte (`-y`).
//!
//! ## Ciclo di vita del processo:
//! ```text
//! Idle -> ArgsBuilt -> Started -> Draining -> Exited -> Succeeded | Failed
//! ```
//! Lo svuotamento delle pipe parte subito dopo lo spawn: se uno dei due stream
//! non viene letto, l'encoder si blocca appena il buffer del sistema operativo
//! si riempie.

use crate::catalog::{FormatCatalog, QualityPreset};
use crate::config::TranscoderConfig;
use crate::error::{ConversionError, ExitStatusText};
use crate::os_args;
use crate::request::ConversionRequest;
use crate::tool_resolver::{ToolPathResolver, TRANSCODER_NAME};
use crate::utils::display_args;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, trace, warn};

/// MP3 encoder used for audio extraction
pub const MP3_ENCODER: &str = "libmp3lame";

/// Fixed VBR quality for audio extraction (0-9, lower = better)
pub const MP3_QUALITY: u8 = 2;

/// Longest partial line buffered before it is flushed anyway
const MAX_LINE_BYTES: usize = 4096;

/// How long the readers may keep going after a timed-out encoder is killed
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// How the external transcoder is launched
#[derive(Debug, Clone)]
pub struct TranscoderSettings {
    /// Encoder binary
    pub program: PathBuf,
    /// Working directory of the spawned process
    pub working_dir: PathBuf,
    /// Codec for video -> video transcodes
    pub video_codec: String,
    /// Kill the encoder after this long (None = wait forever)
    pub timeout: Option<Duration>,
    /// Leave a partially written destination after a failure
    pub keep_partial_output: bool,
    /// Trailing stderr lines kept for error messages
    pub diagnostic_lines: usize,
}

impl TranscoderSettings {
    /// Settings with default codec and policies
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        let defaults = TranscoderConfig::default();
        Self {
            program: program.into(),
            working_dir: working_dir.into(),
            video_codec: defaults.video_codec,
            timeout: None,
            keep_partial_output: defaults.keep_partial_output,
            diagnostic_lines: defaults.diagnostic_lines,
        }
    }

    /// Resolve the encoder next to the running executable and apply configured policies
    pub fn from_config(config: &TranscoderConfig, resolver: &ToolPathResolver) -> Self {
        Self {
            program: resolver.resolve_tool(TRANSCODER_NAME, config.program.as_deref()),
            working_dir: resolver.app_dir().to_path_buf(),
            video_codec: config.video_codec.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
            keep_partial_output: config.keep_partial_output,
            diagnostic_lines: config.diagnostic_lines,
        }
    }

    fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| TRANSCODER_NAME.to_string())
    }
}

/// Which argument layout a media request uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaRule {
    /// Drop video, encode MP3 at a fixed quality
    AudioExtraction,
    /// Re-encode video with the resolved quality preset
    VideoTranscode,
    /// Audio container/codec change with no extra flags
    AudioRemux,
}

impl MediaRule {
    /// Pick the first matching rule; order matters when extension sets overlap
    pub fn select(catalog: &FormatCatalog, input_ext: &str, output_ext: &str) -> Result<Self, ConversionError> {
        if catalog.is_media(input_ext) && output_ext == ".mp3" {
            Ok(Self::AudioExtraction)
        } else if catalog.is_video(input_ext) && catalog.is_video(output_ext) {
            Ok(Self::VideoTranscode)
        } else if catalog.is_audio(input_ext) && catalog.is_audio(output_ext) {
            Ok(Self::AudioRemux)
        } else {
            Err(ConversionError::UnsupportedMediaConversion {
                input: input_ext.to_string(),
                output: output_ext.to_string(),
            })
        }
    }
}

/// Arguments built for one request
#[derive(Debug, Clone)]
pub struct TranscodePlan {
    pub rule: MediaRule,
    /// Only set for `VideoTranscode`
    pub preset: Option<QualityPreset>,
    pub args: Vec<OsString>,
}

/// Result of a finished encoder run
#[derive(Debug, Clone)]
pub struct TranscodeSummary {
    pub rule: MediaRule,
    pub elapsed: Duration,
    /// Bytes read from stdout and stderr together
    pub diagnostic_bytes: u64,
}

/// Drives the external encoder for audio/video requests
#[derive(Debug, Clone)]
pub struct MediaTranscoder {
    catalog: Arc<FormatCatalog>,
    settings: TranscoderSettings,
}

impl MediaTranscoder {
    pub fn new(catalog: Arc<FormatCatalog>, settings: TranscoderSettings) -> Self {
        Self { catalog, settings }
    }

    pub fn settings(&self) -> &TranscoderSettings {
        &self.settings
    }

    /// Build the argument list for a request without launching anything
    pub fn plan(&self, request: &ConversionRequest) -> Result<TranscodePlan, ConversionError> {
        let rule = MediaRule::select(&self.catalog, request.input_format(), request.output_format())?;

        let mut args = os_args!["-y", "-i", request.input_path()];
        let mut preset = None;

        match rule {
            MediaRule::AudioExtraction => {
                let quality = MP3_QUALITY.to_string();
                args.extend(os_args!["-vn", "-acodec", MP3_ENCODER, "-q:a", &quality]);
            }
            MediaRule::VideoTranscode => {
                let resolved = self.catalog.resolve_preset(request.quality_preset());
                if request.quality_preset().is_some_and(|name| name != resolved.name) {
                    debug!(
                        "Unknown quality preset {:?}, using {:?}",
                        request.quality_preset(),
                        resolved.name
                    );
                }
                let crf = resolved.crf.to_string();
                args.extend(os_args![
                    "-c:v",
                    &self.settings.video_codec,
                    "-preset",
                    resolved.speed.as_str(),
                    "-crf",
                    &crf,
                ]);
                preset = Some(resolved.clone());
            }
            MediaRule::AudioRemux => {}
        }

        args.push(request.output_path().as_os_str().to_os_string());

        Ok(TranscodePlan { rule, preset, args })
    }

    /// Convert one audio/video file, returning once the encoder has exited and both pipes are drained
    pub async fn transcode(&self, request: &ConversionRequest) -> Result<TranscodeSummary, ConversionError> {
        let plan = self.plan(request)?;
        debug!(
            "🎬 {:?}: {} {}",
            plan.rule,
            self.settings.program.display(),
            display_args(&plan.args)
        );

        if let Some(parent) = request.output_path().parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let existing = OutputSnapshot::take(request.output_path()).await;

        let start_time = Instant::now();
        match self.run(&plan.args).await {
            Ok(diagnostic_bytes) => {
                let elapsed = start_time.elapsed();
                info!(
                    "✅ Transcode completed in {:.1}s: {}",
                    elapsed.as_secs_f64(),
                    request.output_path().display()
                );
                Ok(TranscodeSummary {
                    rule: plan.rule,
                    elapsed,
                    diagnostic_bytes,
                })
            }
            Err(e) => {
                let launched = !matches!(
                    e,
                    ConversionError::ExternalToolFailure {
                        status: ExitStatusText::NotStarted,
                        ..
                    }
                );
                if launched && !self.settings.keep_partial_output {
                    let current = OutputSnapshot::take(request.output_path()).await;
                    if existing.is_some() && current == existing {
                        debug!(
                            "Leaving {} in place, the encoder did not write to it",
                            request.output_path().display()
                        );
                    } else {
                        Self::discard_partial_output(request.output_path()).await;
                    }
                }
                Err(e)
            }
        }
    }

    /// Spawn, drain and reap the encoder
    async fn run(&self, args: &[OsString]) -> Result<u64, ConversionError> {
        let tool = self.settings.tool_name();

        let mut child = Command::new(&self.settings.program)
            .args(args)
            .current_dir(&self.settings.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConversionError::ExternalToolFailure {
                tool: tool.clone(),
                status: ExitStatusText::NotStarted,
                diagnostics: format!("failed to launch {}: {}", self.settings.program.display(), e),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConversionError::Unknown("encoder stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ConversionError::Unknown("encoder stderr was not captured".to_string()))?;

        // Readers run as their own tasks so they keep draining even if this future is dropped
        let mut stdout_task = tokio::spawn(drain_stream(stdout, "stdout", 0));
        let mut stderr_task = tokio::spawn(drain_stream(stderr, "stderr", self.settings.diagnostic_lines));

        let status = match self.settings.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => Some(status?),
                Err(_) => {
                    warn!("⏱️ {} exceeded {:.0}s, killing it", tool, limit.as_secs_f64());
                    child.start_kill()?;
                    child.wait().await?;
                    None
                }
            },
            None => Some(child.wait().await?),
        };

        let (stdout_tail, stderr_tail) = if status.is_some() {
            tokio::join!(&mut stdout_task, &mut stderr_task)
        } else {
            // A killed encoder may leave descendants holding the pipes open
            let joined = tokio::time::timeout(DRAIN_GRACE, async {
                tokio::join!(&mut stdout_task, &mut stderr_task)
            })
            .await;
            match joined {
                Ok(tails) => tails,
                Err(_) => {
                    warn!("Encoder pipes still open {:.0}s after kill, giving up on them", DRAIN_GRACE.as_secs_f64());
                    stdout_task.abort();
                    stderr_task.abort();
                    return Err(ConversionError::ExternalToolFailure {
                        tool,
                        status: ExitStatusText::TimedOut,
                        diagnostics: "output pipes were still open after the encoder was killed".to_string(),
                    });
                }
            }
        };
        let stdout_tail = stdout_tail.map_err(|e| ConversionError::Unknown(format!("stdout reader failed: {}", e)))?;
        let stderr_tail = stderr_tail.map_err(|e| ConversionError::Unknown(format!("stderr reader failed: {}", e)))?;
        let diagnostic_bytes = stdout_tail.bytes + stderr_tail.bytes;

        match status {
            Some(status) if status.success() => Ok(diagnostic_bytes),
            Some(status) => Err(ConversionError::ExternalToolFailure {
                tool,
                status: exit_status_text(status),
                diagnostics: stderr_tail.text(),
            }),
            None => Err(ConversionError::ExternalToolFailure {
                tool,
                status: ExitStatusText::TimedOut,
                diagnostics: stderr_tail.text(),
            }),
        }
    }

    async fn discard_partial_output(path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Removed partial output {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
        }
    }
}

/// Size and modification time of a destination that exists before launch
#[derive(Debug, PartialEq, Eq)]
struct OutputSnapshot {
    len: u64,
    modified: Option<SystemTime>,
}

impl OutputSnapshot {
    async fn take(path: &Path) -> Option<Self> {
        let metadata = tokio::fs::metadata(path).await.ok()?;
        Some(Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

fn exit_status_text(status: ExitStatus) -> ExitStatusText {
    match status.code() {
        Some(code) => ExitStatusText::Code(code),
        None => ExitStatusText::Signal,
    }
}

/// Lines seen on one stream, keeping only the last few
#[derive(Debug)]
struct StreamTail {
    keep: usize,
    lines: VecDeque<String>,
    partial: Vec<u8>,
    bytes: u64,
}

impl StreamTail {
    fn new(keep: usize) -> Self {
        Self {
            keep,
            lines: VecDeque::with_capacity(keep),
            partial: Vec::new(),
            bytes: 0,
        }
    }

    fn push(&mut self, chunk: &[u8], label: &str) {
        self.bytes += chunk.len() as u64;
        for &byte in chunk {
            // ffmpeg rewrites its progress line with '\r'
            if byte == b'\n' || byte == b'\r' {
                self.flush_line(label);
            } else {
                self.partial.push(byte);
                if self.partial.len() >= MAX_LINE_BYTES {
                    self.flush_line(label);
                }
            }
        }
    }

    fn flush_line(&mut self, label: &str) {
        if self.partial.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.partial).trim_end().to_string();
        self.partial.clear();
        if line.is_empty() {
            return;
        }
        trace!(stream = label, "{}", line);
        if self.keep == 0 {
            return;
        }
        if self.lines.len() == self.keep {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn text(&self) -> String {
        if self.lines.is_empty() {
            "no diagnostic output".to_string()
        } else {
            self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
        }
    }
}

/// Read a pipe to EOF so the child never blocks on a full buffer
async fn drain_stream<R>(mut reader: R, label: &'static str, keep: usize) -> StreamTail
where
    R: AsyncRead + Unpin,
{
    let mut tail = StreamTail::new(keep);
    let mut buf = vec![0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => tail.push(&buf[..n], label),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Failed reading encoder {}: {}", label, e);
                break;
            }
        }
    }
    tail.flush_line(label);
    tail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EncoderSpeed;
    use crate::config::Config;

    fn transcoder() -> MediaTranscoder {
        MediaTranscoder::new(
            Arc::new(FormatCatalog::default()),
            TranscoderSettings::new("ffmpeg", "."),
        )
    }

    fn args_of(plan: &TranscodePlan) -> Vec<String> {
        plan.args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_video_transcode_uses_requested_preset() {
        let request = ConversionRequest::new("clip.mp4", "clip.mkv", ".mkv", Some("High".into())).unwrap();
        let plan = transcoder().plan(&request).unwrap();

        assert_eq!(plan.rule, MediaRule::VideoTranscode);
        assert_eq!(
            args_of(&plan),
            vec!["-y", "-i", "clip.mp4", "-c:v", "libx264", "-preset", "slow", "-crf", "18", "clip.mkv"]
        );
    }

    #[test]
    fn test_unknown_or_missing_preset_falls_back_to_medium() {
        for preset in [None, Some("Cinematic".to_string())] {
            let request = ConversionRequest::new("a.mkv", "b.mp4", ".mp4", preset).unwrap();
            let plan = transcoder().plan(&request).unwrap();
            let resolved = plan.preset.clone().unwrap();
            assert_eq!((resolved.speed, resolved.crf), (EncoderSpeed::Medium, 23));
            let args = args_of(&plan);
            assert!(args.windows(2).any(|w| w == ["-crf", "23"]));
            assert!(args.windows(2).any(|w| w == ["-preset", "medium"]));
        }
    }

    #[test]
    fn test_mp3_target_extracts_audio_and_ignores_preset() {
        for (input, preset) in [("song.wav", None), ("clip.mp4", Some("Very High")), ("clip.mkv", Some("Low"))] {
            let request = ConversionRequest::with_format(input, ".mp3", preset.map(String::from)).unwrap();
            let plan = transcoder().plan(&request).unwrap();
            assert_eq!(plan.rule, MediaRule::AudioExtraction);
            assert!(plan.preset.is_none());

            let args = args_of(&plan);
            assert_eq!(&args[..3], ["-y", "-i", input]);
            assert!(args.contains(&"-vn".to_string()));
            assert!(args.windows(2).any(|w| w == ["-acodec", "libmp3lame"]));
            assert!(args.windows(2).any(|w| w == ["-q:a", "2"]));
            assert!(!args.contains(&"-crf".to_string()));
        }
    }

    #[test]
    fn test_audio_remux_has_no_extra_flags() {
        let request = ConversionRequest::new("song.mp3", "song.wav", ".wav", Some("High".into())).unwrap();
        let plan = transcoder().plan(&request).unwrap();
        assert_eq!(plan.rule, MediaRule::AudioRemux);
        assert_eq!(args_of(&plan), vec!["-y", "-i", "song.mp3", "song.wav"]);
    }

    #[test]
    fn test_audio_to_video_is_unsupported() {
        let request = ConversionRequest::new("song.wav", "song.mp4", ".mp4", None).unwrap();
        let err = transcoder().plan(&request).unwrap_err();
        assert!(matches!(err, ConversionError::UnsupportedMediaConversion { .. }));
    }

    #[test]
    fn test_extraction_outranks_audio_remux_on_overlap() {
        // .mp3 registered as video too: the mp3 rule must still win
        let mut config = Config::default();
        config.audio_extensions = vec![".wav".to_string()];
        config.video_extensions.push(".mp3".to_string());
        let catalog = FormatCatalog::from_config(&config).unwrap();

        assert_eq!(MediaRule::select(&catalog, ".mp4", ".mp3").unwrap(), MediaRule::AudioExtraction);
        assert_eq!(MediaRule::select(&catalog, ".wav", ".mp3").unwrap(), MediaRule::AudioExtraction);
    }

    #[test]
    fn test_paths_with_spaces_stay_single_arguments() {
        let request = ConversionRequest::new("/my videos/clip one.mp4", "/out dir/clip one.mkv", ".mkv", None).unwrap();
        let plan = transcoder().plan(&request).unwrap();
        let args = args_of(&plan);
        assert_eq!(args[2], "/my videos/clip one.mp4");
        assert_eq!(args.last().unwrap(), "/out dir/clip one.mkv");
    }

    #[test]
    fn test_stream_tail_keeps_last_lines() {
        let mut tail = StreamTail::new(2);
        tail.push(b"frame=1\rframe=2\rframe=3\nError opening output\n", "stderr");
        tail.push(b"partial", "stderr");
        tail.flush_line("stderr");
        assert_eq!(tail.text(), "Error opening output\npartial");
        assert_eq!(tail.bytes, 52);
        assert_eq!(StreamTail::new(4).text(), "no diagnostic output");
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn fake_encoder(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-ffmpeg");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn transcoder_with(program: PathBuf, working_dir: &Path) -> MediaTranscoder {
            MediaTranscoder::new(
                Arc::new(FormatCatalog::default()),
                TranscoderSettings::new(program, working_dir),
            )
        }

        const TOUCH_OUTPUT: &str = r#"for last; do :; done; : > "$last""#;

        #[tokio::test]
        async fn test_success_records_args_and_working_dir() {
            let dir = TempDir::new().unwrap();
            let record = dir.path().join("args.txt");
            let cwd = dir.path().join("cwd.txt");
            let body = format!(
                "printf '%s\\n' \"$@\" > '{}'\npwd -P > '{}'\n{}\nexit 0",
                record.display(),
                cwd.display(),
                TOUCH_OUTPUT
            );
            let program = fake_encoder(dir.path(), &body);
            let work_dir = TempDir::new().unwrap();

            let input = dir.path().join("clip.mp4");
            let output = dir.path().join("clip.mkv");
            let request = ConversionRequest::new(&input, &output, ".mkv", Some("High".into())).unwrap();

            let summary = transcoder_with(program, work_dir.path()).transcode(&request).await.unwrap();
            assert_eq!(summary.rule, MediaRule::VideoTranscode);
            assert!(output.exists());

            let recorded = std::fs::read_to_string(&record).unwrap();
            let recorded: Vec<&str> = recorded.lines().collect();
            assert_eq!(recorded[5..9], ["-preset", "slow", "-crf", "18"]);
            assert_eq!(recorded[4], "libx264");

            let cwd = std::fs::read_to_string(&cwd).unwrap();
            assert_eq!(
                PathBuf::from(cwd.trim()),
                std::fs::canonicalize(work_dir.path()).unwrap()
            );
        }

        #[tokio::test]
        async fn test_large_output_on_both_streams_does_not_deadlock() {
            let dir = TempDir::new().unwrap();
            let body = format!(
                r#"i=0
while [ $i -lt 3000 ]; do
  echo "frame=$i fps=25.0 q=28.0 size=1024kB time=00:00:01.00 bitrate=8388.6kbits/s speed=1.0x" >&2
  echo "progress=continue out_time_ms=$i total_size=1048576 dup_frames=0 drop_frames=0"
  i=$((i+1))
done
{}
exit 0"#,
                TOUCH_OUTPUT
            );
            let program = fake_encoder(dir.path(), &body);
            let request = ConversionRequest::new(
                dir.path().join("song.wav"),
                dir.path().join("song.mp3"),
                ".mp3",
                None,
            )
            .unwrap();

            let transcoder = transcoder_with(program, dir.path());
            let summary = tokio::time::timeout(Duration::from_secs(60), transcoder.transcode(&request))
                .await
                .expect("encoder run hung")
                .unwrap();
            assert!(summary.diagnostic_bytes > 128 * 1024);
        }

        #[tokio::test]
        async fn test_non_zero_exit_maps_to_tool_failure_and_removes_partial_output() {
            let dir = TempDir::new().unwrap();
            let body = format!(
                "{}\necho 'clip.mp4: Invalid data found when processing input' >&2\nexit 1",
                TOUCH_OUTPUT
            );
            let program = fake_encoder(dir.path(), &body);
            let output = dir.path().join("clip.mkv");
            let request = ConversionRequest::new(dir.path().join("clip.mp4"), &output, ".mkv", None).unwrap();

            let err = transcoder_with(program, dir.path()).transcode(&request).await.unwrap_err();
            match err {
                ConversionError::ExternalToolFailure { status, diagnostics, .. } => {
                    assert_eq!(status, ExitStatusText::Code(1));
                    assert!(diagnostics.contains("Invalid data found"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert!(!output.exists());
        }

        #[tokio::test]
        async fn test_keep_partial_output_policy() {
            let dir = TempDir::new().unwrap();
            let program = fake_encoder(dir.path(), &format!("{}\nexit 3", TOUCH_OUTPUT));
            let output = dir.path().join("song.wav");
            let request = ConversionRequest::new(dir.path().join("song.mp3"), &output, ".wav", None).unwrap();

            let mut settings = TranscoderSettings::new(program, dir.path());
            settings.keep_partial_output = true;
            let transcoder = MediaTranscoder::new(Arc::new(FormatCatalog::default()), settings);

            tokio_test::assert_err!(transcoder.transcode(&request).await);
            assert!(output.exists());
        }

        #[tokio::test]
        async fn test_failure_leaves_untouched_existing_output() {
            let dir = TempDir::new().unwrap();
            let program = fake_encoder(
                dir.path(),
                "echo 'Output #0 same as Input #0 - exiting' >&2\nexit 1",
            );
            let output = dir.path().join("song.wav");
            std::fs::write(&output, b"previous result").unwrap();
            let request = ConversionRequest::new(dir.path().join("song.mp3"), &output, ".wav", None).unwrap();

            let err = transcoder_with(program, dir.path()).transcode(&request).await.unwrap_err();
            assert_eq!(err.kind(), crate::error::FailureKind::ExternalToolFailure);
            assert_eq!(std::fs::read(&output).unwrap(), b"previous result");
        }

        #[tokio::test]
        async fn test_failure_removes_existing_output_it_rewrote() {
            let dir = TempDir::new().unwrap();
            let program = fake_encoder(dir.path(), "for last; do :; done\nprintf 'half' > \"$last\"\nexit 1");
            let output = dir.path().join("song.wav");
            std::fs::write(&output, b"previous result").unwrap();
            let request = ConversionRequest::new(dir.path().join("song.mp3"), &output, ".wav", None).unwrap();

            tokio_test::assert_err!(transcoder_with(program, dir.path()).transcode(&request).await);
            assert!(!output.exists());
        }

        #[tokio::test]
        async fn test_missing_binary_is_a_launch_failure() {
            let dir = TempDir::new().unwrap();
            let existing = dir.path().join("clip.mkv");
            std::fs::write(&existing, b"previous result").unwrap();
            let request = ConversionRequest::new(dir.path().join("clip.mp4"), &existing, ".mkv", None).unwrap();

            let transcoder = transcoder_with(dir.path().join("no-such-ffmpeg"), dir.path());
            let err = transcoder.transcode(&request).await.unwrap_err();
            assert!(matches!(
                err,
                ConversionError::ExternalToolFailure {
                    status: ExitStatusText::NotStarted,
                    ..
                }
            ));
            // Nothing was launched, so an existing file is left alone
            assert!(existing.exists());
        }

        #[tokio::test]
        async fn test_timeout_kills_the_encoder() {
            let dir = TempDir::new().unwrap();
            let program = fake_encoder(dir.path(), "echo starting >&2\nexec sleep 30");
            let request = ConversionRequest::new(
                dir.path().join("clip.mkv"),
                dir.path().join("clip.mp4"),
                ".mp4",
                None,
            )
            .unwrap();

            let mut settings = TranscoderSettings::new(program, dir.path());
            settings.timeout = Some(Duration::from_millis(300));
            let transcoder = MediaTranscoder::new(Arc::new(FormatCatalog::default()), settings);

            let started = Instant::now();
            let err = transcoder.transcode(&request).await.unwrap_err();
            assert!(started.elapsed() < Duration::from_secs(20));
            assert!(matches!(
                err,
                ConversionError::ExternalToolFailure {
                    status: ExitStatusText::TimedOut,
                    ..
                }
            ));
        }

        #[tokio::test]
        async fn test_timeout_is_bounded_when_descendants_hold_the_pipes() {
            let dir = TempDir::new().unwrap();
            let program = fake_encoder(dir.path(), "sleep 30 &\nexec sleep 30");
            let request = ConversionRequest::new(
                dir.path().join("clip.mkv"),
                dir.path().join("clip.mp4"),
                ".mp4",
                None,
            )
            .unwrap();

            let mut settings = TranscoderSettings::new(program, dir.path());
            settings.timeout = Some(Duration::from_millis(300));
            let transcoder = MediaTranscoder::new(Arc::new(FormatCatalog::default()), settings);

            let started = Instant::now();
            let err = tokio::time::timeout(Duration::from_secs(20), transcoder.transcode(&request))
                .await
                .expect("timed-out encoder kept the run alive")
                .unwrap_err();
            assert!(started.elapsed() < Duration::from_secs(15));
            assert!(matches!(
                err,
                ConversionError::ExternalToolFailure {
                    status: ExitStatusText::TimedOut,
                    ..
                }
            ));
        }
    }
}
