use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use release_reconciler::annotation::{
    Annotator, AnnotatorSettings, CommitChangeDeterminator, LocalNotesDeterminator,
    MemoizingDeterminator, RecomputingDeterminator, RemoteDeterminator,
};
use release_reconciler::clock::SystemClock;
use release_reconciler::config::{AnnotatorSource, ReconcilerConfig};
use release_reconciler::docs::{ChangelogDocuments, DriveDocuments, DryRunDocuments};
use release_reconciler::forum::{
    CachedDiscourse, DiscourseApi, DryRunDiscourse, ForumClient, HttpDiscourse,
};
use release_reconciler::governance::{
    CdnPackages, DashboardObserver, DreCli, DryRunGovernance, ProposalSubmitter,
};
use release_reconciler::index::{FileIndexSource, GitIndexSource, ReleaseIndexSource};
use release_reconciler::logging::init_logging;
use release_reconciler::mirror::{MirrorSettings, SourceMirror};
use release_reconciler::publish::{ChangelogPublisher, DryRunPublisher, GitHubPublisher};
use release_reconciler::reconciler::{Collaborators, Reconciler, ReconcilerSettings, Runner};
use release_reconciler::state::ReconcilerState;
use release_reconciler::watchdog::Watchdog;
use release_reconciler::{ReconcilerError, Result};

const IC_MAIN_BRANCH: &str = "master";
const INDEX_MAIN_BRANCH: &str = "main";

fn missing(what: &str) -> ReconcilerError {
    ReconcilerError::Fatal(format!("{} is not configured", what))
}

fn duplicate(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}

fn index_source(config: &ReconcilerConfig) -> Arc<dyn ReleaseIndexSource> {
    match &config.index_path {
        Some(path) => Arc::new(FileIndexSource::new(path.clone())),
        None => {
            let settings = MirrorSettings::new(&config.index_repo_url, INDEX_MAIN_BRANCH);
            let mirror = SourceMirror::in_cache(&config.cache_dir, settings);
            Arc::new(GitIndexSource::new(Arc::new(mirror)))
        }
    }
}

fn determinator(
    config: &ReconcilerConfig,
    mirror: &Arc<SourceMirror>,
) -> Result<Arc<dyn CommitChangeDeterminator>> {
    let inner: Arc<dyn CommitChangeDeterminator> = match &config.annotator {
        AnnotatorSource::Remote(url) => Arc::new(RemoteDeterminator::new(url.as_str())?),
        AnnotatorSource::LocalNotes => Arc::new(LocalNotesDeterminator::new(Arc::clone(mirror))),
        AnnotatorSource::Recompute => {
            let mut settings = AnnotatorSettings::default();
            if let Some(bazel) = &config.bazel_path {
                settings.bazel = bazel.clone();
            }
            if let Some(td) = &config.target_determinator_path {
                settings.target_determinator = td.clone();
            }
            let annotator = Annotator::new(Arc::clone(mirror), settings);
            Arc::new(RecomputingDeterminator::new(annotator))
        }
    };
    Ok(Arc::new(MemoizingDeterminator::new(inner)))
}

fn forum_api(config: &ReconcilerConfig, storage: &Path) -> Result<Arc<dyn DiscourseApi>> {
    if config.dry_run {
        return Ok(Arc::new(DryRunDiscourse::open(storage)?));
    }
    let forum = &config.forum;
    let url = forum.url.as_deref().ok_or_else(|| missing("DISCOURSE_URL"))?;
    let user = forum.user.as_deref().ok_or_else(|| missing("DISCOURSE_USER"))?;
    let key = forum.api_key.as_ref().ok_or_else(|| missing("DISCOURSE_KEY"))?;
    Ok(Arc::new(HttpDiscourse::new(url, user, duplicate(key))?))
}

fn documents(config: &ReconcilerConfig, storage: &Path) -> Result<Arc<dyn ChangelogDocuments>> {
    if config.dry_run {
        return Ok(Arc::new(DryRunDocuments::new(storage.join("documents"))?));
    }
    let folder = config
        .gdocs_folder_id
        .as_deref()
        .ok_or_else(|| missing("GDOCS_FOLDER_ID"))?;
    let token = config.gdocs_token.as_ref().ok_or_else(|| missing("GDOCS_TOKEN"))?;
    Ok(Arc::new(DriveDocuments::new(folder, duplicate(token))?))
}

fn publisher(config: &ReconcilerConfig, storage: &Path) -> Result<Arc<dyn ChangelogPublisher>> {
    if config.dry_run {
        return Ok(Arc::new(DryRunPublisher::open(storage)?));
    }
    let token = config.github_token.as_ref().ok_or_else(|| missing("GITHUB_TOKEN"))?;
    Ok(Arc::new(GitHubPublisher::new(&config.publish_repo, duplicate(token))?))
}

fn submitter(config: &ReconcilerConfig, storage: &Path) -> Result<Arc<dyn ProposalSubmitter>> {
    if config.dry_run {
        return Ok(Arc::new(DryRunGovernance::open(storage)?));
    }
    Ok(Arc::new(DreCli::new(&config.dre_path, config.proposer.clone())))
}

fn build(config: &ReconcilerConfig) -> Result<Reconciler> {
    let storage = config.dry_run_storage.as_path();
    if config.dry_run {
        log::info!("Dry run: simulated side effects go to {}", storage.display());
    }

    let token = config.github_token.as_ref().map(duplicate);
    let mirror = Arc::new(SourceMirror::in_cache(
        &config.cache_dir,
        MirrorSettings::new(&config.ic_repo_url, IC_MAIN_BRANCH).with_token(token),
    ));

    let api = CachedDiscourse::new(forum_api(config, storage)?, config.forum.topic_ttl);
    let collaborators = Collaborators {
        index: index_source(config),
        determinator: determinator(config, &mirror)?,
        mirror,
        forum: ForumClient::new(Arc::new(api), config.forum.category_id),
        documents: documents(config, storage)?,
        publisher: publisher(config, storage)?,
        observer: Arc::new(DashboardObserver::new()?),
        submitter: submitter(config, storage)?,
        packages: Arc::new(CdnPackages::new()?),
        clock: Arc::new(SystemClock),
    };

    let state = ReconcilerState::load(&config.state_path)?;
    log::info!(
        "Loaded {} state entries from {}",
        state.entries().len(),
        config.state_path.display()
    );
    let settings = ReconcilerSettings {
        ignore_releases: config.ignore_releases.clone(),
        seed_from_governance: !config.skip_preloading_state,
        push_tags: !config.dry_run,
        ..ReconcilerSettings::default()
    };
    Ok(Reconciler::new(collaborators, state, settings))
}

async fn run(config: ReconcilerConfig) -> Result<()> {
    let reconciler = Arc::new(build(&config)?);
    reconciler.preload_state().await?;

    let runner = Runner::new(Arc::clone(&reconciler), config.loop_every);
    let stop = runner.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("Stop requested, finishing the current pass");
        stop.stop();
    })
    .map_err(|e| ReconcilerError::Fatal(format!("Failed to install signal handler: {}", e)))?;

    let watchdog = match config.loop_every {
        Some(_) => Some(Watchdog::start(config.watchdog_timeout).map_err(|e| {
            ReconcilerError::Fatal(format!("Failed to start watchdog: {}", e))
        })?),
        None => None,
    };
    runner.run(watchdog.as_ref()).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let verbose = std::env::args().any(|a| a == "--verbose" || a == "--debug");
    let json = std::env::var("RECONCILER_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if let Err(e) = init_logging(verbose, json) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let config = match ReconcilerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
