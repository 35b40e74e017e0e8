//! Parallel collection of commit facts from the mirror.

use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::debug;

use super::change::CommitFacts;
use super::codeowners::{CodeOwners, CODEOWNERS_PATH};
use crate::mirror::{Result, SourceMirror};

/// Number of collector threads for `commit_count` commits.
pub fn worker_count(commit_count: usize) -> usize {
    num_cpus::get().min(commit_count).max(1)
}

/// Gathers facts for every commit, preserving input order.
///
/// Each commit costs a handful of `git` invocations, so the work is spread
/// over a bounded pool of scoped threads.
pub fn gather_facts(
    mirror: &SourceMirror,
    commits: &[String],
    release_commit: &str,
) -> Result<Vec<CommitFacts>> {
    if commits.is_empty() {
        return Ok(Vec::new());
    }

    let workers = worker_count(commits.len());
    let (job_tx, job_rx) = bounded::<(usize, &str)>(workers * 2);
    let (result_tx, result_rx) = bounded::<(usize, Result<CommitFacts>)>(workers * 2);

    let mut slots: Vec<Option<Result<CommitFacts>>> = Vec::with_capacity(commits.len());
    slots.resize_with(commits.len(), || None);

    thread::scope(|scope| {
        for worker_id in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || run_worker(worker_id, mirror, release_commit, job_rx, result_tx));
        }
        drop(job_rx);
        drop(result_tx);

        scope.spawn(move || feed(job_tx, commits));

        for (idx, result) in result_rx.iter() {
            slots[idx] = Some(result);
        }
    });

    slots
        .into_iter()
        .zip(commits)
        .map(|(slot, commit)| {
            slot.unwrap_or_else(|| {
                Err(crate::mirror::MirrorError::UnexpectedOutput {
                    command: "gather commit facts".to_string(),
                    output: format!("no result for {}", commit),
                })
            })
        })
        .collect()
}

fn feed<'a>(job_tx: Sender<(usize, &'a str)>, commits: &'a [String]) {
    for (idx, commit) in commits.iter().enumerate() {
        if job_tx.send((idx, commit.as_str())).is_err() {
            break;
        }
    }
}

fn run_worker(
    worker_id: usize,
    mirror: &SourceMirror,
    release_commit: &str,
    job_rx: Receiver<(usize, &str)>,
    result_tx: Sender<(usize, Result<CommitFacts>)>,
) {
    for (idx, commit) in job_rx.iter() {
        debug!("Worker {} collecting facts for {}", worker_id, commit);
        let result = collect(mirror, commit, release_commit);
        if result_tx.send((idx, result)).is_err() {
            break;
        }
    }
}

fn collect(mirror: &SourceMirror, commit: &str, release_commit: &str) -> Result<CommitFacts> {
    let codeowners = mirror
        .file_contents(commit, CODEOWNERS_PATH)?
        .map(|text| CodeOwners::parse(&text))
        .unwrap_or_default();
    Ok(CommitFacts {
        commit: commit.to_string(),
        merge_commit: mirror.merge_commit_for(commit, release_commit)?,
        subject: mirror.commit_subject(commit)?,
        author: mirror.commit_author(commit)?,
        file_changes: mirror.file_changes(commit)?,
        codeowners,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count_bounds() {
        assert_eq!(worker_count(0), 1);
        assert_eq!(worker_count(1), 1);
        assert!(worker_count(10_000) <= num_cpus::get());
    }
}
