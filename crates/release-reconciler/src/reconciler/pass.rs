//! One reconciliation pass over the release index.

use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use tracing::Instrument;

use super::active::{active_releases, find_base_release, versions_to_unelect, MIN_ACTIVE_RELEASES};
use crate::annotation::CommitChangeDeterminator;
use crate::clock::Clock;
use crate::docs::ChangelogDocuments;
use crate::error::{ErrorClass, ReconcilerError, Result};
use crate::forum::{ForumClient, ReleaseTopic, Reply, ReplyContent};
use crate::governance::{GovernanceObserver, PackageSource, ProposalRequest, ProposalSubmitter};
use crate::index::{proposal_summary, Release, ReleaseIndex, ReleaseIndexSource, Version};
use crate::mirror::{SourceMirror, TagOutcome};
use crate::notes::{ReleaseNotesComposer, ReleaseNotesRequest};
use crate::publish::{publish_if_ready, ChangelogPublisher, Publication};
use crate::state::{ProposalState, ReconcilerState};
use crate::types::OsKind;

/// Voting summary for a proposal placed without release notes.
const NO_CHANGELOG_SUMMARY: &str =
    "Release notes were not prepared for this version; see the proposal for its details.";

/// Everything the loop talks to.
pub struct Collaborators {
    pub index: Arc<dyn ReleaseIndexSource>,
    /// Mirror of the source repository the versions live in.
    pub mirror: Arc<SourceMirror>,
    pub determinator: Arc<dyn CommitChangeDeterminator>,
    pub forum: ForumClient,
    pub documents: Arc<dyn ChangelogDocuments>,
    pub publisher: Arc<dyn ChangelogPublisher>,
    pub observer: Arc<dyn GovernanceObserver>,
    pub submitter: Arc<dyn ProposalSubmitter>,
    pub packages: Arc<dyn PackageSource>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Release candidates left alone entirely.
    pub ignore_releases: Vec<String>,
    pub min_active_releases: usize,
    /// Record proposals the governance observer already knows about.
    pub seed_from_governance: bool,
    /// Push release tags to the source repository.
    pub push_tags: bool,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            ignore_releases: Vec::new(),
            min_active_releases: MIN_ACTIVE_RELEASES,
            seed_from_governance: true,
            push_tags: true,
        }
    }
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub active_releases: usize,
    /// (version, OS kind) pairs looked at.
    pub pairs: usize,
    pub submitted: usize,
    pub not_ready: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairOutcome {
    /// Nothing to do this pass.
    Waiting,
    /// Notes are out for review.
    Draft,
    Submitted(u64),
    /// An earlier pass placed the proposal.
    Voting(u64),
}

struct Pair<'a> {
    index: &'a ReleaseIndex,
    release_idx: usize,
    release: &'a Release,
    version: &'a Version,
    os_kind: OsKind,
    /// Reply slot of this pair within the release topic.
    position: usize,
    active: &'a [Release],
}

/// Drives every active (version, OS kind) pair towards an open proposal.
pub struct Reconciler {
    collaborators: Collaborators,
    composer: ReleaseNotesComposer,
    state: Mutex<ReconcilerState>,
    settings: ReconcilerSettings,
    /// Prevents overlapping passes.
    pass_lock: tokio::sync::Mutex<()>,
}

impl Reconciler {
    pub fn new(
        collaborators: Collaborators,
        state: ReconcilerState,
        settings: ReconcilerSettings,
    ) -> Self {
        let composer = ReleaseNotesComposer::new(
            Arc::clone(&collaborators.mirror),
            Arc::clone(&collaborators.determinator),
        );
        Self {
            collaborators,
            composer,
            state: Mutex::new(state),
            settings,
            pass_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Recorded proposal state of a pair.
    pub fn proposal_state(&self, version: &str, os_kind: OsKind) -> ProposalState {
        self.with_state(|state| state.get(version, os_kind))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ReconcilerState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut state)
    }

    /// Records every proposal the governance observer reports. Returns how
    /// many entries changed.
    pub async fn preload_state(&self) -> Result<usize> {
        if !self.settings.seed_from_governance {
            debug!("Not preloading state from governance");
            return Ok(0);
        }
        let known = self.collaborators.observer.known_proposals().await?;
        let now = self.collaborators.clock.now();
        let changed = self.with_state(|state| state.seed(&known, now))?;
        if changed > 0 {
            info!("Recorded {} proposals found on governance", changed);
        }
        Ok(changed)
    }

    /// Runs one pass. Only fatal errors escape; everything else is logged
    /// and confined to the pair it happened in.
    pub async fn reconcile(&self) -> Result<PassReport> {
        let _guard = match self.pass_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("Pass skipped: another pass is already running");
                return Ok(PassReport::default());
            }
        };
        self.run_pass().instrument(tracing::info_span!("pass")).await
    }

    async fn run_pass(&self) -> Result<PassReport> {
        let c = &self.collaborators;

        let loaded = c.index.load_lenient().await?;
        for rejected in &loaded.rejected {
            warn!("Ignoring release {}: {}", rejected.rc_name, rejected.error);
        }
        c.mirror.fetch().await?;
        self.preload_state().await?;

        let running = c
            .observer
            .running_versions(OsKind::GuestOs)
            .await?
            .unwrap_or_default();
        info!("GuestOS versions running on the network: {}", running.join(", "));

        let index = &loaded.index;
        let active = active_releases(index, &running, self.settings.min_active_releases);
        if active.is_empty() {
            info!("No releases to deal with");
        }
        for (idx, release) in active.iter().enumerate() {
            let names: Vec<&str> = release.versions.iter().map(|v| v.name.as_str()).collect();
            info!("{}. {} ({})", idx + 1, release.rc_name, names.join(", "));
        }

        let mut report = PassReport {
            active_releases: active.len(),
            ..PassReport::default()
        };
        for (release_idx, release) in active.iter().enumerate() {
            if self.settings.ignore_releases.contains(&release.rc_name) {
                debug!("{} is on the ignore list", release.rc_name);
                continue;
            }
            self.reconcile_release(index, release_idx, release, active, &mut report)
                .instrument(tracing::info_span!("release", rc = %release.rc_name))
                .await?;
        }

        info!(
            "Pass completed: {} pairs, {} submitted, {} not ready, {} failed",
            report.pairs, report.submitted, report.not_ready, report.failed
        );
        Ok(report)
    }

    async fn reconcile_release(
        &self,
        index: &ReleaseIndex,
        release_idx: usize,
        release: &Release,
        active: &[Release],
        report: &mut PassReport,
    ) -> Result<()> {
        let pairs: Vec<(&Version, OsKind)> = release
            .versions
            .iter()
            .flat_map(|v| OsKind::ALL.into_iter().map(move |os_kind| (v, os_kind)))
            .collect();
        let mut replies: Vec<Reply> = pairs
            .iter()
            .map(|(version, os_kind)| Reply {
                version: version.version.clone(),
                os_kind: *os_kind,
                tag: release.tag_for(version),
                content: None,
            })
            .collect();
        let mut topic = None;

        for (position, (version, os_kind)) in pairs.into_iter().enumerate() {
            let pair = Pair {
                index,
                release_idx,
                release,
                version,
                os_kind,
                position,
                active,
            };
            let span = tracing::info_span!(
                "pair",
                release = %release.rc_name,
                version = %version.version,
                os = %os_kind
            );
            report.pairs += 1;
            match self.reconcile_pair(&pair, &mut replies, &mut topic).instrument(span).await {
                Ok(PairOutcome::Submitted(_)) => report.submitted += 1,
                Ok(_) => {}
                Err(e) => {
                    let class = e.class();
                    if class == ErrorClass::Fatal {
                        return Err(e);
                    }
                    if class == ErrorClass::NotReady {
                        report.not_ready += 1;
                    } else {
                        report.failed += 1;
                    }
                    log_pair_error(&pair, class, &e);
                }
            }
        }
        Ok(())
    }

    async fn reconcile_pair(
        &self,
        pair: &Pair<'_>,
        replies: &mut [Reply],
        topic: &mut Option<ReleaseTopic>,
    ) -> Result<PairOutcome> {
        let c = &self.collaborators;
        let Pair {
            release,
            version,
            os_kind,
            position,
            ..
        } = *pair;
        let tag = release.tag_for(version);

        match self.proposal_state(&version.version, os_kind) {
            ProposalState::Submitted { proposal_id, .. } => {
                debug!("Proposal {} already submitted", proposal_id);
                let summary = self.voting_summary(version, os_kind).await?;
                replies[position].content = Some(ReplyContent::Voting {
                    proposal_id,
                    summary,
                });
                self.post_replies(release, replies, topic).await?;
                self.push_tag(&tag, &version.version).await?;
                return Ok(PairOutcome::Voting(proposal_id));
            }
            state if !state.ready_to_retry(c.clock.now()) => {
                debug!("{}, not retrying yet", state);
                return Ok(PairOutcome::Waiting);
            }
            state => debug!("{}, working towards a proposal", state),
        }

        c.determinator.classify(&version.version, os_kind).await?;

        let markdown = match c.documents.fetch_markdown(&version.version, os_kind).await? {
            Some(markdown) => markdown,
            None => {
                let request = self.notes_request(pair)?;
                info!("Composing release notes for {}", tag);
                let composed = self.composer.compose(&request).await?;
                let handle = c
                    .documents
                    .ensure(&tag, &version.version, os_kind, &composed)
                    .await?;
                info!("Release notes for {} are at {}", tag, handle.url);
                c.documents
                    .fetch_markdown(&version.version, os_kind)
                    .await?
                    .unwrap_or(composed)
            }
        };

        let publication = publish_if_ready(
            c.publisher.as_ref(),
            Some(&markdown),
            &version.version,
            os_kind,
        )
        .await?;
        let Some(publication) = publication else {
            replies[position].content = Some(ReplyContent::Draft { changelog: markdown });
            self.post_replies(release, replies, topic).await?;
            return Ok(PairOutcome::Draft);
        };

        replies[position].content = Some(ReplyContent::Ready {
            changelog: publication.changelog.clone(),
        });
        self.post_replies(release, replies, topic).await?;
        let forum_post_url = match topic.as_ref() {
            Some(topic) => topic.post_url(position).await?,
            None => None,
        };
        let Some(forum_post_url) = forum_post_url else {
            info!("Forum reply for {} not posted yet, submitting later", tag);
            return Ok(PairOutcome::Waiting);
        };

        let unelect_versions = if version.is_base() {
            self.unelection(pair.active, os_kind).await?
        } else {
            Vec::new()
        };
        let package = c.packages.package(&version.version, os_kind).await?;
        let request = ProposalRequest {
            version: version.version.clone(),
            os_kind,
            changelog: summary_for(&publication, version, os_kind),
            forum_post_url,
            unelect_versions,
            package,
        };

        info!(
            "Submitting proposal to elect {} ({} versions to unelect)",
            tag,
            request.unelect_versions.len()
        );
        let proposal_id = match c.submitter.submit(&request).await {
            Ok(id) => id,
            Err(e) => {
                let now = c.clock.now();
                self.with_state(|state| state.record_malfunction(&version.version, os_kind, now))?;
                return Err(e.into());
            }
        };
        let now = c.clock.now();
        self.with_state(|state| {
            state.record_submission(&version.version, os_kind, proposal_id, now)
        })?;
        info!("Proposal {} submitted for {}", proposal_id, tag);

        replies[position].content = Some(ReplyContent::Voting {
            proposal_id,
            summary: request.changelog,
        });
        if let Err(e) = self.post_replies(release, replies, topic).await {
            warn!("Failed to announce proposal {}: {}", proposal_id, e);
        }
        if let Err(e) = self.push_tag(&tag, &version.version).await {
            warn!("Failed to tag {}: {}", tag, e);
        }
        Ok(PairOutcome::Submitted(proposal_id))
    }

    fn notes_request(&self, pair: &Pair<'_>) -> Result<ReleaseNotesRequest> {
        let version = pair.version;
        let release_tag = pair.release.tag_for(version);
        if version.security_fix {
            return Ok(ReleaseNotesRequest::Security {
                release_tag,
                release_commit: version.version.clone(),
                os_kind: pair.os_kind,
            });
        }

        let base = find_base_release(
            &self.collaborators.mirror,
            pair.index,
            pair.release_idx,
            version,
        )?
        .ok_or_else(|| ReconcilerError::NoBaseRelease {
            version: release_tag.clone(),
        })?;
        debug!("Comparing {} against {}", release_tag, base.tag);
        Ok(ReleaseNotesRequest::Ordinary {
            release_tag,
            release_commit: version.version.clone(),
            base_tag: base.tag,
            base_commit: base.commit,
            os_kind: pair.os_kind,
        })
    }

    /// Summary shown in the voting reply of an already submitted pair.
    ///
    /// Every submitted pair gets a reply so later pairs in the topic keep
    /// their slots, even when the proposal was placed without reviewed notes.
    async fn voting_summary(&self, version: &Version, os_kind: OsKind) -> Result<String> {
        let c = &self.collaborators;
        let markdown = c.documents.fetch_markdown(&version.version, os_kind).await?;
        let publication = publish_if_ready(
            c.publisher.as_ref(),
            markdown.as_deref(),
            &version.version,
            os_kind,
        )
        .await?;
        Ok(match (publication, markdown) {
            (Some(publication), _) => summary_for(&publication, version, os_kind),
            (None, Some(markdown)) => markdown,
            (None, None) => NO_CHANGELOG_SUMMARY.to_string(),
        })
    }

    async fn unelection(&self, active: &[Release], os_kind: OsKind) -> Result<Vec<String>> {
        let c = &self.collaborators;
        let Some(running) = c.observer.running_versions(os_kind).await? else {
            debug!("Running {} versions unknown, not unelecting", os_kind);
            return Ok(Vec::new());
        };
        let blessed = c.submitter.blessed_versions(os_kind).await?;
        Ok(versions_to_unelect(active, &running, &blessed))
    }

    /// Opens the release topic on first use and brings its replies in line.
    async fn post_replies(
        &self,
        release: &Release,
        replies: &[Reply],
        topic: &mut Option<ReleaseTopic>,
    ) -> Result<()> {
        if topic.is_none() {
            *topic = Some(self.collaborators.forum.get_or_create(release).await?);
        }
        if let Some(topic) = topic.as_ref() {
            topic.update(replies).await?;
        }
        Ok(())
    }

    async fn push_tag(&self, tag: &str, commit: &str) -> Result<()> {
        if !self.settings.push_tags {
            debug!("Not pushing tag {}", tag);
            return Ok(());
        }
        match self.collaborators.mirror.tag_and_push(tag, commit).await? {
            TagOutcome::Pushed => info!("Pushed tag {}", tag),
            TagOutcome::AlreadyPresent => debug!("Tag {} already present", tag),
            TagOutcome::Conflict { existing } => {
                warn!("Tag {} already points at {}, leaving it", tag, existing)
            }
        }
        Ok(())
    }
}

fn summary_for(publication: &Publication, version: &Version, os_kind: OsKind) -> String {
    proposal_summary(
        &publication.changelog,
        &version.version,
        os_kind,
        version.security_fix,
        &publication.url,
    )
}

fn log_pair_error(pair: &Pair<'_>, class: ErrorClass, e: &ReconcilerError) {
    let what = format!(
        "{} {} {}",
        pair.release.rc_name, pair.version.name, pair.os_kind
    );
    match class {
        ErrorClass::NotReady => info!("{} not ready: {}", what, e),
        ErrorClass::Transient => warn!("{} failed, retrying next pass: {}", what, e),
        ErrorClass::Invalid => warn!("{} skipped: {}", what, e),
        ErrorClass::Malfunction | ErrorClass::Fatal => error!("{} failed: {}", what, e),
    }
}
