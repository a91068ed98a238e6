//! Collision-free sequential naming of rendered artifacts.

use std::{
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};

use tracing::{info, warn};

use crate::infra::{discovery, error::InfraError};

/// Hands out monotonically increasing artifact identifiers.
///
/// The counter is the only mutable state shared across all concurrently
/// launched renders in a run. Naive read-increment-write on a shared integer
/// would hand out duplicate or skipped identifiers once renders interleave,
/// so the counter is an [`AtomicU64`] and [`next`](Self::next) increments it
/// in a single atomic step: every caller observes a strictly increasing,
/// gap-free sequence regardless of interleaving.
#[derive(Debug)]
pub struct ArtifactNamer {
    counter: AtomicU64,
}

impl ArtifactNamer {
    /// Scan `artifact_root` for previously rendered artifacts and continue
    /// numbering after the highest numeric file stem found, so repeated runs
    /// never collide with or overwrite prior output. Starts at zero when no
    /// artifacts exist.
    pub fn initialize(artifact_root: &Path, extension: &str) -> Result<Self, InfraError> {
        let existing = discovery::artifacts(artifact_root, extension)?;
        let mut start = 0u64;
        for path in &existing {
            match path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::parse::<u64>)
            {
                Some(Ok(number)) => start = start.max(number + 1),
                _ => warn!(
                    target = "application::namer",
                    artifact = %path.display(),
                    "Skipping artifact without a numeric stem"
                ),
            }
        }
        if !existing.is_empty() {
            info!(
                target = "application::namer",
                existing = existing.len(),
                start,
                "Found existing artifacts; continuing numbering"
            );
        }
        Ok(Self::starting_at(start))
    }

    pub fn starting_at(value: u64) -> Self {
        Self {
            counter: AtomicU64::new(value),
        }
    }

    /// Return the counter incremented by one.
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc, thread};

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn starts_at_zero_without_existing_artifacts() {
        let dir = TempDir::new().expect("temp dir");
        let namer = ArtifactNamer::initialize(dir.path(), "png").expect("namer");
        assert_eq!(namer.next(), 1);
        assert_eq!(namer.next(), 2);
    }

    #[test]
    fn continues_after_highest_existing_identifier() {
        let dir = TempDir::new().expect("temp dir");
        let doc_dir = dir.path().join("intro.md");
        fs::create_dir_all(&doc_dir).expect("mkdir");
        for number in [3, 7, 2] {
            fs::write(doc_dir.join(format!("{number}.png")), "x").expect("write");
        }

        let namer = ArtifactNamer::initialize(dir.path(), "png").expect("namer");
        assert_eq!(namer.next(), 9);
    }

    #[test]
    fn ignores_non_numeric_stems() {
        let dir = TempDir::new().expect("temp dir");
        let doc_dir = dir.path().join("intro.md");
        fs::create_dir_all(&doc_dir).expect("mkdir");
        fs::write(doc_dir.join("4.png"), "x").expect("write");
        fs::write(doc_dir.join("cover.png"), "x").expect("write");

        let namer = ArtifactNamer::initialize(dir.path(), "png").expect("namer");
        assert_eq!(namer.next(), 6);
    }

    #[test]
    fn concurrent_next_is_dense_and_duplicate_free() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 100;

        let namer = Arc::new(ArtifactNamer::starting_at(10));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let namer = Arc::clone(&namer);
                thread::spawn(move || (0..PER_THREAD).map(|_| namer.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen: Vec<u64> = handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("thread"))
            .collect();
        seen.sort_unstable();

        let expected: Vec<u64> = (11..=10 + (THREADS * PER_THREAD) as u64).collect();
        assert_eq!(seen, expected);
    }
}
