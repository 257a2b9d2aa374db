//! The publish pipeline.
//!
//! Candidates are processed strictly in order, one at a time; the only
//! concurrency in the system is per-file encoding inside the transcode
//! engine. Each candidate runs through the cache short-circuit, the
//! metadata gates, the file probes, the format-gap resolver and finally
//! transcode-and-publish, and every terminal decision is persisted to the
//! outcome cache before the next candidate starts.

pub mod candidates;
pub mod prompt;
pub mod publish;

use crate::api::{TrackerApi, UploadOutcome, UploadRequest};
use crate::cache::{Outcome, OutcomeCache};
use crate::config::{DirectoriesConfig, MislabelPolicy};
use crate::error::{Error, Result};
use crate::formats::{self, Format};
use crate::gates::{self, GateDecision};
use crate::tagging::TagValidator;
use crate::transcode::{TranscodeEngine, TranscodeJob, TranscodeOutcome};
use crate::utils::{border_msg, html_unescape, split_filelist};
use candidates::Candidate;
use prompt::Prompter;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Knobs that vary per run rather than per install.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Formats the operator wants available for every release
    pub wanted: Vec<Format>,
    /// Formats to produce unconditionally, bypassing the gap resolver.
    /// Only honored for explicitly supplied candidates.
    pub forced: Vec<Format>,
    /// Cached outcomes that should be reprocessed instead of skipped
    pub retry: HashSet<Outcome>,
    /// Publish at most one format per release: the format loop breaks on
    /// its first accepted upload, then the run moves to the next candidate
    pub single: bool,
    /// Upload finished torrents; false stages them for manual upload
    pub upload: bool,
    /// Policy for sources that probe 24-bit against a 16-bit listing
    pub mislabel_policy: MislabelPolicy,
    /// Torrent piece length exponent
    pub piece_length: u32,
}

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Candidates that went through the full pipeline
    pub processed: usize,
    /// Candidates that finished as `done`
    pub published: usize,
    /// Candidates skipped on a cached outcome
    pub skipped_cached: usize,
    /// Candidates skipped without recording an outcome
    pub skipped: usize,
    /// Candidates abandoned on a recoverable error
    pub failed: usize,
}

/// Ties the collaborators together and owns the outcome cache.
pub struct Pipeline {
    api: Arc<dyn TrackerApi>,
    engine: Arc<dyn TranscodeEngine>,
    tags: Arc<dyn TagValidator>,
    prompter: Arc<dyn Prompter>,
    cache: OutcomeCache,
    dirs: DirectoriesConfig,
    options: PipelineOptions,
}

impl Pipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        api: Arc<dyn TrackerApi>,
        engine: Arc<dyn TranscodeEngine>,
        tags: Arc<dyn TagValidator>,
        prompter: Arc<dyn Prompter>,
        cache: OutcomeCache,
        dirs: DirectoriesConfig,
        options: PipelineOptions,
    ) -> Self {
        Self {
            api,
            engine,
            tags,
            prompter,
            cache,
            dirs,
            options,
        }
    }

    /// Process candidates in order. Recoverable errors abandon the current
    /// candidate; a malformed API response stops the whole run.
    pub async fn run(&mut self, queue: &[Candidate]) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for candidate in queue {
            if let Some(previous) = self.cache.get(candidate.torrent_id) {
                let retrying = self.options.retry.contains(&previous);
                let forcing = candidate.explicit && !self.options.forced.is_empty();
                if !retrying && !forcing {
                    tracing::debug!(
                        torrent_id = candidate.torrent_id,
                        outcome = %previous,
                        "skipping cached candidate"
                    );
                    summary.skipped_cached += 1;
                    continue;
                }
            }
            summary.processed += 1;
            match self.process(candidate).await {
                Ok(Some(outcome)) => {
                    self.cache.add(candidate.torrent_id, outcome)?;
                    tracing::info!(
                        torrent_id = candidate.torrent_id,
                        outcome = %outcome,
                        "outcome recorded"
                    );
                    if outcome == Outcome::Done {
                        summary.published += 1;
                    }
                }
                Ok(None) => summary.skipped += 1,
                Err(err @ Error::MalformedResponse { .. }) => return Err(err),
                Err(err) => {
                    tracing::error!(
                        torrent_id = candidate.torrent_id,
                        error = %err,
                        "candidate abandoned"
                    );
                    summary.failed += 1;
                }
            }
        }
        tracing::info!(
            processed = summary.processed,
            published = summary.published,
            cached = summary.skipped_cached,
            skipped = summary.skipped,
            failed = summary.failed,
            "run finished"
        );
        Ok(summary)
    }

    /// Run one candidate to a decision.
    ///
    /// `Ok(Some(outcome))` is recorded in the cache; `Ok(None)` means the
    /// candidate was passed over for a reason that may not hold next run
    /// (missing files, failed tag check, multichannel source).
    async fn process(&self, candidate: &Candidate) -> Result<Option<Outcome>> {
        let Some(group) = self.api.release_group(candidate.group_id).await? else {
            tracing::warn!(group_id = candidate.group_id, "tracker refused the release group");
            return Ok(None);
        };
        let Some(edition) = group
            .torrents
            .iter()
            .find(|t| t.id == candidate.torrent_id)
        else {
            tracing::warn!(
                torrent_id = candidate.torrent_id,
                "torrent not in its release group; listing may have changed"
            );
            return Ok(None);
        };

        if let GateDecision::Reject(outcome) = gates::screen(edition, candidate.explicit) {
            return Ok(Some(outcome));
        }

        let Some(source_dir) = self.locate_source(&group.group, edition)? else {
            tracing::warn!(
                torrent_id = candidate.torrent_id,
                folder = %html_unescape(&edition.file_path),
                "source files not found in any data directory"
            );
            return Ok(None);
        };

        let probe = self.engine.probe(&source_dir).await?;

        // the mislabel check comes first: a multichannel source can still
        // carry a wrong bit-depth listing worth correcting
        let allow_24bit = gates::labelled_24bit(edition);
        if probe.is_24bit() && !allow_24bit {
            return self.resolve_mislabel(candidate, edition).await;
        }

        if let GateDecision::Skip = gates::screen_probe(&probe) {
            tracing::warn!(
                torrent_id = candidate.torrent_id,
                channels = probe.channels,
                "multichannel release; not transcoding"
            );
            return Ok(None);
        }

        let needed = if candidate.explicit && !self.options.forced.is_empty() {
            // forced formats bypass the gap resolver but never the
            // pre-emphasis restriction
            let allowed = formats::allowed_transcodes(edition);
            self.options
                .forced
                .iter()
                .copied()
                .filter(|f| allowed.contains(f))
                .collect()
        } else {
            formats::formats_needed(&group, edition, &self.options.wanted)
        };
        if needed.is_empty() {
            tracing::info!(torrent_id = candidate.torrent_id, "no formats needed");
            return Ok(Some(Outcome::Done));
        }

        if !self.validate_tags(&source_dir).await? {
            return Ok(None);
        }

        println!(
            "{}",
            border_msg(&publish::release_summary(
                &group.group,
                edition,
                &needed,
                &self.api.release_url(candidate.group_id, candidate.torrent_id),
            ))
        );

        let mut outcome = Outcome::Done;
        let announce = self.api.announce_url();
        for format in needed {
            let dir_name = publish::release_dir_name(&group.group, edition, format);
            let dest_dir = self.dirs.output_dir.join(&dir_name);
            if dest_dir.is_dir() {
                tracing::warn!(dest = %dest_dir.display(), "output directory exists; skipping format");
                continue;
            }

            let job = TranscodeJob {
                source_dir: &source_dir,
                dest_dir: &dest_dir,
                format,
                allow_24bit_sources: allow_24bit,
            };
            match self.engine.transcode_release(&job).await? {
                TranscodeOutcome::BitDepthMismatch => {
                    // remaining formats are abandoned; the source is not
                    // what the listing claims
                    return Ok(Some(Outcome::TwentyFourBit));
                }
                TranscodeOutcome::Ready(_) => {}
            }

            let torrent_path = self
                .engine
                .make_torrent(
                    &dest_dir,
                    &self.dirs.torrent_dir,
                    &announce,
                    self.options.piece_length,
                )
                .await?;

            let permalink = self.api.permalink(candidate.torrent_id);
            let description = publish::transcode_description(&permalink, format);
            if self.options.upload {
                let upload = self
                    .api
                    .upload(UploadRequest {
                        group: &group.group,
                        edition,
                        format,
                        description,
                        torrent_path: &torrent_path,
                    })
                    .await?;
                match &upload {
                    UploadOutcome::Uploaded {
                        torrent_id,
                        group_id,
                    } => {
                        println!(
                            "Uploaded {}: {}",
                            format,
                            self.api.release_url(*group_id, *torrent_id)
                        );
                    }
                    UploadOutcome::Rejected { message } => {
                        tracing::warn!(%format, %message, "upload rejected");
                    }
                    UploadOutcome::Unrecognized { body } => {
                        tracing::error!(%format, %body, "unrecognized upload response");
                    }
                }
                let uploaded = matches!(upload, UploadOutcome::Uploaded { .. });
                outcome = publish::worst_outcome(outcome, publish::upload_cache_outcome(&upload));
                if uploaded && self.options.single {
                    break;
                }
            } else {
                println!(
                    "{}",
                    border_msg(&publish::staged_upload_notice(
                        edition,
                        format,
                        &permalink,
                        &torrent_path,
                        &description,
                    ))
                );
                self.prompter
                    .acknowledge("Press enter once the torrent has been uploaded")
                    .await?;
                if self.options.single {
                    break;
                }
            }
        }

        Ok(Some(outcome))
    }

    /// Decide what to do about a source probing 24-bit against a 16-bit
    /// listing.
    ///
    /// The candidate never transcodes this run either way. Correcting the
    /// listing records `24bit`; skipping or a declined prompt leaves the
    /// id uncached so a policy change can pick it up again.
    async fn resolve_mislabel(
        &self,
        candidate: &Candidate,
        edition: &crate::api::types::Encoding,
    ) -> Result<Option<Outcome>> {
        let correct = match self.options.mislabel_policy {
            MislabelPolicy::Skip => false,
            MislabelPolicy::Correct => true,
            MislabelPolicy::Prompt => {
                self.prompter
                    .confirm(&format!(
                        "{} is 24-bit but listed as 16-bit. Correct the listing?",
                        self.api.permalink(candidate.torrent_id)
                    ))
                    .await?
            }
        };
        if !correct {
            tracing::warn!(
                torrent_id = candidate.torrent_id,
                "mislabelled 24-bit source left alone"
            );
            return Ok(None);
        }
        if self.api.mark_24bit(edition).await? {
            Ok(Some(Outcome::TwentyFourBit))
        } else {
            // the listing is still wrong; leave the id uncached
            Ok(None)
        }
    }

    /// Find the release's folder under the data directories and verify it
    /// actually holds the first file of the torrent's manifest.
    ///
    /// A torrent with no folder is a bare single-file release; its file is
    /// copied into a fresh `Name (Year) [FLAC]` folder so downstream steps
    /// always see a release directory.
    fn locate_source(
        &self,
        group: &crate::api::types::Release,
        edition: &crate::api::types::Encoding,
    ) -> Result<Option<PathBuf>> {
        let manifest = split_filelist(&edition.file_list);
        let folder = html_unescape(&edition.file_path);
        if folder.is_empty() {
            let Some(head) = manifest.first() else {
                return Ok(None);
            };
            for dir in &self.dirs.data_dirs {
                let bare = dir.join(&head.name);
                if !bare.is_file() {
                    continue;
                }
                let wrapper = dir.join(publish::sanitize_component(&format!(
                    "{} ({}) [FLAC]",
                    html_unescape(&group.name),
                    group.year
                )));
                std::fs::create_dir_all(&wrapper)?;
                let dest = wrapper.join(&head.name);
                if !dest.is_file() {
                    std::fs::copy(&bare, &dest)?;
                }
                tracing::info!(
                    file = %bare.display(),
                    folder = %wrapper.display(),
                    "wrapped bare single-file release"
                );
                return Ok(Some(wrapper));
            }
            return Ok(None);
        }
        Ok(self
            .dirs
            .data_dirs
            .iter()
            .map(|dir| dir.join(&folder))
            .filter(|path| path.is_dir())
            .find(|path| match manifest.first() {
                Some(head) => path.join(&head.name).is_file(),
                None => true,
            }))
    }

    /// Check every source file's tags; one bad file fails the release.
    async fn validate_tags(&self, source_dir: &std::path::Path) -> Result<bool> {
        for entry in walkdir::WalkDir::new(source_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("flac") {
                continue;
            }
            let check = self.tags.check(entry.path()).await?;
            if !check.ok {
                let reason = check
                    .message
                    .unwrap_or_else(|| "tag check failed".to_string());
                tracing::warn!(%reason, "release skipped on tag validation");
                println!("Skipping release: {}", reason);
                return Ok(false);
            }
        }
        Ok(true)
    }
}
