//! Transcode engine and torrent packaging.
//!
//! The engine is a trait so the pipeline can be driven in tests without
//! any of the external tools installed. The real implementation shells
//! out to `flac`, `lame`, `sox`, `metaflac` and `mktorrent`, encoding the
//! files of a release concurrently under a semaphore sized to the
//! configured worker count. All bit-depth and sample-rate decisions come
//! from probing the actual files, never from the tracker's listing.

use crate::error::{Error, Result, TranscodeError};
use crate::formats::Format;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Companion files copied into the transcoded release unchanged.
const COMPANION_EXTENSIONS: [&str; 11] = [
    "cue", "gif", "jpeg", "jpg", "log", "md5", "nfo", "pdf", "png", "sfv", "txt",
];

/// Stream properties of a release's source files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceProbe {
    /// Bits per sample of the first FLAC file
    pub bits_per_sample: u32,
    /// Channel count of the first FLAC file
    pub channels: u32,
    /// Sample rate of the first FLAC file
    pub sample_rate: u32,
}

impl SourceProbe {
    /// Whether the files are higher than 16-bit.
    pub fn is_24bit(&self) -> bool {
        self.bits_per_sample > 16
    }

    /// Whether the files carry more than two channels.
    pub fn is_multichannel(&self) -> bool {
        self.channels > 2
    }
}

/// One release-level transcode request.
#[derive(Debug)]
pub struct TranscodeJob<'a> {
    /// Directory holding the source FLAC files
    pub source_dir: &'a Path,
    /// Directory the transcoded release is written to
    pub dest_dir: &'a Path,
    /// Target format
    pub format: Format,
    /// Whether 24-bit source files are expected. When false, finding one
    /// aborts with [`TranscodeOutcome::BitDepthMismatch`] instead of
    /// silently downconverting a mislabelled source.
    pub allow_24bit_sources: bool,
}

/// How a transcode attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeOutcome {
    /// The release directory is complete at the given path
    Ready(PathBuf),
    /// A source file probed above 16-bit when the listing said otherwise;
    /// nothing was written
    BitDepthMismatch,
}

/// Encodes releases and packages them into torrents.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Probe the first FLAC file of a release.
    async fn probe(&self, source_dir: &Path) -> Result<SourceProbe>;

    /// Transcode a whole release into `dest_dir`.
    async fn transcode_release(&self, job: &TranscodeJob<'_>) -> Result<TranscodeOutcome>;

    /// Build a .torrent for a finished release directory and return its path.
    async fn make_torrent(
        &self,
        release_dir: &Path,
        torrent_dir: &Path,
        announce: &str,
        piece_length: u32,
    ) -> Result<PathBuf>;
}

/// The target rate for sources that need resampling, or `None` when the
/// stream is already at a redbook-compatible rate.
pub fn resample_target(sample_rate: u32) -> Option<u32> {
    match sample_rate {
        44100 | 48000 => None,
        r if r % 44100 == 0 => Some(44100),
        r if r % 48000 == 0 => Some(48000),
        // oddball rates get the closest standard family
        r if r < 48000 => Some(44100),
        _ => Some(48000),
    }
}

/// lame quality arguments per MP3 target.
pub fn lame_quality_args(format: Format) -> &'static [&'static str] {
    match format {
        Format::V0 => &["-V", "0", "--vbr-new"],
        Format::V2 => &["-V", "2", "--vbr-new"],
        Format::Mp3320 => &["-h", "-b", "320"],
        Format::Flac => &[],
    }
}

/// Whether a companion (non-audio) file should be carried over.
pub fn is_companion_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| COMPANION_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Map a source file path to its destination, preserving subdirectories
/// (multi-disc layouts) and swapping the extension for audio files.
pub fn destination_path(
    source_dir: &Path,
    dest_dir: &Path,
    file: &Path,
    format: Format,
) -> Result<PathBuf> {
    let relative = file
        .strip_prefix(source_dir)
        .map_err(|_| Error::Other(format!("{} is outside the source directory", file.display())))?;
    let mut dest = dest_dir.join(relative);
    if file.extension().and_then(|e| e.to_str()) == Some("flac") {
        dest.set_extension(format.extension());
    }
    Ok(dest)
}

fn flac_files_under(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("flac"))
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(TranscodeError::NoSourceFiles(dir.to_path_buf()).into());
    }
    Ok(files)
}

/// Paths of the external encoder binaries, cloned into per-file tasks.
#[derive(Debug, Clone)]
struct ToolChain {
    flac: PathBuf,
    lame: PathBuf,
    sox: PathBuf,
    metaflac: PathBuf,
}

impl ToolChain {
    async fn probe_file(&self, file: &Path) -> Result<SourceProbe> {
        let output = Command::new(&self.metaflac)
            .args(["--show-bps", "--show-channels", "--show-sample-rate"])
            .arg(file)
            .output()
            .await
            .map_err(TranscodeError::Io)?;
        if !output.status.success() {
            return Err(TranscodeError::ToolFailed {
                tool: "metaflac".to_string(),
                path: file.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let values: Vec<u32> = stdout
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect();
        if values.len() != 3 {
            return Err(Error::Other(format!(
                "unexpected metaflac output for {}",
                file.display()
            )));
        }
        Ok(SourceProbe {
            bits_per_sample: values[0],
            channels: values[1],
            sample_rate: values[2],
        })
    }

    /// Read the file's tags for lame's id3 flags.
    async fn export_tags(&self, file: &Path) -> Result<Vec<(String, String)>> {
        let output = Command::new(&self.metaflac)
            .arg("--export-tags-to=-")
            .arg(file)
            .output()
            .await
            .map_err(TranscodeError::Io)?;
        let exported = String::from_utf8_lossy(&output.stdout).into_owned();
        Ok(exported
            .lines()
            .filter_map(|line| {
                let (name, value) = line.split_once('=')?;
                Some((name.trim().to_uppercase(), value.to_string()))
            })
            .collect())
    }

    async fn transcode_file(&self, file: &Path, dest: &Path, format: Format) -> Result<()> {
        let probe = self.probe_file(file).await?;
        let resample = if probe.bits_per_sample > 16 {
            // 24-bit sources always go through sox for the depth reduction
            Some(resample_target(probe.sample_rate).unwrap_or(probe.sample_rate))
        } else {
            resample_target(probe.sample_rate)
        };
        match format {
            Format::Flac => self.encode_flac(file, dest, &probe, resample).await,
            _ => self.encode_mp3(file, dest, format, resample).await,
        }
    }

    /// 16-bit FLAC output. Sources already at 16-bit redbook are copied.
    async fn encode_flac(
        &self,
        file: &Path,
        dest: &Path,
        probe: &SourceProbe,
        resample: Option<u32>,
    ) -> Result<()> {
        if probe.bits_per_sample <= 16 && resample.is_none() {
            tokio::fs::copy(file, dest)
                .await
                .map_err(TranscodeError::Io)?;
            return Ok(());
        }
        let rate = resample.unwrap_or(probe.sample_rate);
        let output = Command::new(&self.sox)
            .arg(file)
            .args(["-qG", "-b", "16"])
            .arg(dest)
            .args(["rate", "-v", "-L", &rate.to_string(), "dither"])
            .output()
            .await
            .map_err(TranscodeError::Io)?;
        if !output.status.success() {
            return Err(TranscodeError::ToolFailed {
                tool: "sox".to_string(),
                path: file.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Decode to a wav stream and pipe it straight into lame.
    async fn encode_mp3(
        &self,
        file: &Path,
        dest: &Path,
        format: Format,
        resample: Option<u32>,
    ) -> Result<()> {
        let mut decoder = if let Some(rate) = resample {
            let mut cmd = Command::new(&self.sox);
            cmd.arg(file)
                .args(["-qG", "-b", "16", "-t", "wav", "-"])
                .args(["rate", "-v", "-L", &rate.to_string(), "dither"]);
            cmd
        } else {
            let mut cmd = Command::new(&self.flac);
            cmd.args(["-dcs", "--"]).arg(file);
            cmd
        };
        let mut decode_child = decoder
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(TranscodeError::Io)?;
        let decoded = decode_child
            .stdout
            .take()
            .ok_or_else(|| Error::Other("decoder stdout unavailable".to_string()))?;

        let mut encoder = Command::new(&self.lame);
        encoder.args(["--quiet", "--ignore-tag-errors", "--add-id3v2"]);
        encoder.args(lame_quality_args(format));
        for (name, value) in self.export_tags(file).await? {
            let flag = match name.as_str() {
                "TITLE" => "--tt",
                "ARTIST" => "--ta",
                "ALBUM" => "--tl",
                "TRACKNUMBER" => "--tn",
                "DATE" => "--ty",
                "GENRE" => "--tg",
                _ => continue,
            };
            encoder.arg(flag).arg(value);
        }
        let stdin: Stdio = decoded.into_owned_fd().map_err(TranscodeError::Io)?.into();
        let encode_output = encoder
            .arg("-")
            .arg(dest)
            .stdin(stdin)
            .output()
            .await
            .map_err(TranscodeError::Io)?;

        let decode_output = decode_child
            .wait_with_output()
            .await
            .map_err(TranscodeError::Io)?;
        if !decode_output.status.success() {
            return Err(TranscodeError::ToolFailed {
                tool: if resample.is_some() { "sox" } else { "flac" }.to_string(),
                path: file.to_path_buf(),
                stderr: String::from_utf8_lossy(&decode_output.stderr)
                    .trim()
                    .to_string(),
            }
            .into());
        }
        if !encode_output.status.success() {
            return Err(TranscodeError::ToolFailed {
                tool: "lame".to_string(),
                path: file.to_path_buf(),
                stderr: String::from_utf8_lossy(&encode_output.stderr)
                    .trim()
                    .to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Transcode engine backed by the command-line encoder chain.
#[derive(Debug)]
pub struct CliTranscodeEngine {
    tools: ToolChain,
    mktorrent: PathBuf,
    jobs: Arc<Semaphore>,
}

impl CliTranscodeEngine {
    /// Locate the required binaries on PATH and size the worker pool.
    pub fn discover(workers: usize) -> Result<Self> {
        let locate = |name: &str| -> Result<PathBuf> {
            which::which(name).map_err(|_| {
                TranscodeError::BinaryNotFound {
                    name: name.to_string(),
                }
                .into()
            })
        };
        Ok(Self {
            tools: ToolChain {
                flac: locate("flac")?,
                lame: locate("lame")?,
                sox: locate("sox")?,
                metaflac: locate("metaflac")?,
            },
            mktorrent: locate("mktorrent")?,
            jobs: Arc::new(Semaphore::new(workers.max(1))),
        })
    }
}

#[async_trait]
impl TranscodeEngine for CliTranscodeEngine {
    async fn probe(&self, source_dir: &Path) -> Result<SourceProbe> {
        let files = flac_files_under(source_dir)?;
        self.tools.probe_file(&files[0]).await
    }

    async fn transcode_release(&self, job: &TranscodeJob<'_>) -> Result<TranscodeOutcome> {
        let files = flac_files_under(job.source_dir)?;

        // Probe everything before encoding anything, so a mixed-depth
        // release is caught before a partial transcode hits the disk.
        if !job.allow_24bit_sources {
            for file in &files {
                if self.tools.probe_file(file).await?.bits_per_sample > 16 {
                    tracing::warn!(
                        file = %file.display(),
                        "24-bit file in a 16-bit-labelled release"
                    );
                    return Ok(TranscodeOutcome::BitDepthMismatch);
                }
            }
        }

        tokio::fs::create_dir_all(job.dest_dir)
            .await
            .map_err(TranscodeError::Io)?;

        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        for file in &files {
            let dest = destination_path(job.source_dir, job.dest_dir, file, job.format)?;
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(TranscodeError::Io)?;
            }
            let tools = self.tools.clone();
            let jobs = self.jobs.clone();
            let file = file.clone();
            let format = job.format;
            tasks.spawn(async move {
                let _permit = jobs
                    .acquire()
                    .await
                    .map_err(|_| Error::Other("worker pool closed".to_string()))?;
                tools.transcode_file(&file, &dest, format).await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| Error::Other(format!("transcode task panicked: {}", e)))??;
        }

        // Companion artwork and logs ride along unchanged.
        for entry in walkdir::WalkDir::new(job.source_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if is_companion_file(entry.path()) {
                let dest =
                    destination_path(job.source_dir, job.dest_dir, entry.path(), job.format)?;
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(TranscodeError::Io)?;
                }
                tokio::fs::copy(entry.path(), &dest)
                    .await
                    .map_err(TranscodeError::Io)?;
            }
        }

        tracing::info!(
            format = %job.format,
            dest = %job.dest_dir.display(),
            files = files.len(),
            "release transcoded"
        );
        Ok(TranscodeOutcome::Ready(job.dest_dir.to_path_buf()))
    }

    async fn make_torrent(
        &self,
        release_dir: &Path,
        torrent_dir: &Path,
        announce: &str,
        piece_length: u32,
    ) -> Result<PathBuf> {
        let name = release_dir.file_name().ok_or_else(|| {
            Error::Other(format!("{} has no directory name", release_dir.display()))
        })?;
        tokio::fs::create_dir_all(torrent_dir)
            .await
            .map_err(TranscodeError::Io)?;
        let torrent_path = torrent_dir.join(name).with_extension("torrent");
        if tokio::fs::try_exists(&torrent_path).await.unwrap_or(false) {
            tokio::fs::remove_file(&torrent_path)
                .await
                .map_err(TranscodeError::Io)?;
        }

        let output = Command::new(&self.mktorrent)
            .args([
                "-l",
                &piece_length.to_string(),
                "-p",
                "-s",
                "RED",
                "-a",
                announce,
                "-o",
            ])
            .arg(&torrent_path)
            .arg(release_dir)
            .output()
            .await
            .map_err(TranscodeError::Io)?;
        if !output.status.success() {
            return Err(TranscodeError::ToolFailed {
                tool: "mktorrent".to_string(),
                path: release_dir.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(torrent_path)
    }
}
