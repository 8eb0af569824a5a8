use crate::errors::{HeatmapError, Result};
use crate::extract::extract_games;
use crate::frequency_tree::{FrequencyTree, DEFAULT_MAX_FULL_MOVES};
use crate::game_stream::{find_chunk_boundaries, GameStream};
use crate::{codec, config_error, resource_exhausted};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Progress callback: `(games_processed, target_hint)`. The target is the
/// configured game limit, or 0 when ingestion runs to the end of the file.
pub type ProgressSink<'a> = &'a (dyn Fn(usize, usize) + Sync);

/// Games per micro-batch tree in the parallel strategy; small batches keep
/// every in-flight tree tiny.
const BATCH_SIZE: usize = 50;

/// Sequential ingestion reports once per this many games
const SEQUENTIAL_PROGRESS_STRIDE: usize = 1000;

/// Parallel workers fold their counts into the shared progress counter in
/// strides this large to bound lock contention.
const SHARED_PROGRESS_STRIDE: usize = 5000;

/// Workers poll the stop flag once per this many games
const STOP_CHECK_STRIDE: usize = 100;

/// Merge-phase progress is reported once per this many folded batches
const MERGE_PROGRESS_STRIDE: usize = 10;

/// Games per physical chunk file in the disk-chunked strategy
const DEFAULT_CHUNK_GAMES: usize = 50_000;

/// Ingestion front-end: drives games from a PGN file into frequency trees.
///
/// Three strategies are offered. [`ingest`](PgnIngestor::ingest) streams the
/// whole file into one tree; [`ingest_parallel`](PgnIngestor::ingest_parallel)
/// splits the file into per-worker byte ranges and merges micro-batched local
/// trees; [`ingest_chunked`](PgnIngestor::ingest_chunked) stages physical
/// chunk files through disk for datasets that must not hold many trees in
/// memory at once. All three produce identical trees for the same input and
/// depth, regardless of worker or chunk counts.
pub struct PgnIngestor {
    /// Depth bound in full moves (doubled into plies by the tree)
    max_full_moves: u32,
    /// Optional overall game limit
    max_games: Option<usize>,
    /// Worker threads for the parallel and chunked strategies
    num_threads: usize,
    /// Games per chunk file for the chunked strategy
    chunk_size: usize,
}

impl PgnIngestor {
    /// Create an ingestor with default settings
    pub fn new() -> Self {
        Self {
            max_full_moves: DEFAULT_MAX_FULL_MOVES,
            max_games: None,
            num_threads: num_cpus::get().min(16), // Use available cores (max 16)
            chunk_size: DEFAULT_CHUNK_GAMES,
        }
    }

    /// Set the depth bound, in full moves
    pub fn with_max_depth(mut self, max_full_moves: u32) -> Self {
        self.max_full_moves = max_full_moves;
        self
    }

    /// Stop after roughly this many games (workers stop within one
    /// stop-check stride of the limit)
    pub fn with_max_games(mut self, max_games: usize) -> Self {
        self.max_games = Some(max_games);
        self
    }

    /// Set worker thread count
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Set games per chunk file for the disk-chunked strategy
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_full_moves == 0 {
            return Err(config_error!("max depth must be at least one full move"));
        }
        if self.num_threads == 0 {
            return Err(config_error!("worker thread count must be nonzero"));
        }
        if self.chunk_size == 0 {
            return Err(config_error!("chunk size must be nonzero"));
        }
        if let Some(0) = self.max_games {
            return Err(config_error!("game limit must be nonzero when supplied"));
        }
        Ok(())
    }

    fn target_hint(&self) -> usize {
        self.max_games.unwrap_or(0)
    }

    /// Stream every game of the file into a single tree.
    ///
    /// Progress is reported every 1000 games. Individual games that fail to
    /// parse are skipped; only opening/reading the file itself is fatal.
    pub fn ingest<P: AsRef<Path>>(
        &self,
        path: P,
        progress: Option<ProgressSink<'_>>,
    ) -> Result<FrequencyTree> {
        self.validate()?;
        let path = path.as_ref();
        let target = self.target_hint();

        let mut tree = FrequencyTree::new(self.max_full_moves);
        'games: for game_text in GameStream::from_path(path)? {
            let game_text = game_text?;
            for game in extract_games(&game_text) {
                tree.insert_game(&game.moves);

                let processed = tree.total_games() as usize;
                if processed % SEQUENTIAL_PROGRESS_STRIDE == 0 {
                    if let Some(report) = progress {
                        report(processed, target);
                    }
                }
                if let Some(limit) = self.max_games {
                    if processed >= limit {
                        break 'games;
                    }
                }
            }
        }

        self.finish(path, tree, progress)
    }

    /// Partition the file into one byte range per worker and ingest the
    /// ranges concurrently.
    ///
    /// Workers insert into small local trees and hand each one off to a
    /// shared batch list every [`BATCH_SIZE`] games, so no tree is ever
    /// touched by two threads and none grows large. Batches are merged
    /// sequentially afterwards in a deterministic order; a second progress
    /// phase covers the merge.
    pub fn ingest_parallel<P: AsRef<Path>>(
        &self,
        path: P,
        progress: Option<ProgressSink<'_>>,
    ) -> Result<FrequencyTree> {
        self.validate()?;
        let path = path.as_ref();
        let target = self.target_hint();

        let boundaries = find_chunk_boundaries(path, self.num_threads)?;

        // Shared state: batch list and progress counter under mutexes, stop
        // flag relaxed-atomic (staleness only delays the stop).
        let batches: Mutex<Vec<RangeBatch>> = Mutex::new(Vec::new());
        let processed: Mutex<usize> = Mutex::new(0);
        let stop = AtomicBool::new(false);

        crossbeam::thread::scope(|scope| -> Result<()> {
            let mut workers = Vec::new();
            for (range_index, window) in boundaries.windows(2).enumerate() {
                let (start, end) = (window[0], window[1]);
                let batches = &batches;
                let processed = &processed;
                let stop = &stop;
                workers.push(scope.spawn(move |_| {
                    self.run_range_worker(
                        path,
                        range_index,
                        start,
                        end,
                        batches,
                        processed,
                        stop,
                        progress,
                    )
                }));
            }
            for worker in workers {
                worker
                    .join()
                    .map_err(|_| resource_exhausted!("ingestion worker panicked"))??;
            }
            Ok(())
        })
        .map_err(|_| resource_exhausted!("ingestion worker panicked"))??;

        // Merge phase: fold batches one at a time, in discovery order made
        // deterministic by (range, sequence) sorting.
        let mut collected = batches.into_inner().unwrap();
        collected.sort_by_key(|batch| (batch.range_index, batch.sequence));
        let total_batches = collected.len();

        #[cfg(feature = "verbose")]
        eprintln!(
            "[ingest] worker phase complete: {} batches from {} ranges",
            total_batches,
            boundaries.len().saturating_sub(1)
        );

        let mut tree = FrequencyTree::new(self.max_full_moves);
        for (index, batch) in collected.into_iter().enumerate() {
            tree.merge(batch.tree);
            if (index + 1) % MERGE_PROGRESS_STRIDE == 0 || index + 1 == total_batches {
                if let Some(report) = progress {
                    report(tree.total_games() as usize, target);
                }
            }
        }

        self.finish(path, tree, progress)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_range_worker(
        &self,
        path: &Path,
        range_index: usize,
        start: u64,
        end: u64,
        batches: &Mutex<Vec<RangeBatch>>,
        processed: &Mutex<usize>,
        stop: &AtomicBool,
        progress: Option<ProgressSink<'_>>,
    ) -> Result<()> {
        let target = self.target_hint();
        // Fold into the shared counter coarsely, but never less often than
        // the game limit requires — the stop flag is driven off that counter.
        let counter_stride = match target {
            0 => SHARED_PROGRESS_STRIDE,
            limit => SHARED_PROGRESS_STRIDE.min(limit),
        };
        let mut local = FrequencyTree::new(self.max_full_moves);
        let mut sequence = 0usize;
        let mut unreported = 0usize;
        let mut since_stop_check = 0usize;

        'games: for game_text in GameStream::over_range(path, start, end)? {
            let game_text = game_text?;
            for game in extract_games(&game_text) {
                // Poll the stop flag coarsely; only meaningful when a game
                // limit is set.
                since_stop_check += 1;
                if since_stop_check >= STOP_CHECK_STRIDE {
                    since_stop_check = 0;
                    if stop.load(Ordering::Relaxed) {
                        break 'games;
                    }
                }

                local.insert_game(&game.moves);
                unreported += 1;

                if unreported >= counter_stride {
                    let total = {
                        let mut guard = processed.lock().unwrap();
                        *guard += unreported;
                        *guard
                    };
                    unreported = 0;
                    if let Some(report) = progress {
                        report(total, target);
                    }
                    if target > 0 && total >= target {
                        stop.store(true, Ordering::Relaxed);
                    }
                }

                if local.total_games() as usize >= BATCH_SIZE {
                    let full = std::mem::replace(
                        &mut local,
                        FrequencyTree::new(self.max_full_moves),
                    );
                    batches.lock().unwrap().push(RangeBatch {
                        range_index,
                        sequence,
                        tree: full,
                    });
                    sequence += 1;
                }
            }
        }

        // Remainder batch and progress residue
        if local.total_games() > 0 {
            batches.lock().unwrap().push(RangeBatch {
                range_index,
                sequence,
                tree: local,
            });
        }
        if unreported > 0 {
            let total = {
                let mut guard = processed.lock().unwrap();
                *guard += unreported;
                *guard
            };
            if let Some(report) = progress {
                report(total, target);
            }
            if target > 0 && total >= target {
                stop.store(true, Ordering::Relaxed);
            }
        }

        #[cfg(feature = "verbose")]
        eprintln!(
            "[ingest] range {} ({}..{}) produced {} batches",
            range_index, start, end, sequence + 1
        );

        Ok(())
    }

    /// Stage the file through physical chunk files for datasets too large to
    /// hold many in-flight trees in memory.
    ///
    /// The source is split into chunk files of at most `chunk_size` games
    /// (every line verbatim, each chunk a valid PGN fragment). A bounded
    /// worker pool turns each chunk into a tree, serializes it to a
    /// temporary tree file and deletes the chunk to reclaim disk. The tree
    /// files are then folded into the result one at a time. Every temporary
    /// artifact lives in a per-run directory that is removed on all exit
    /// paths, success or failure.
    pub fn ingest_chunked<P: AsRef<Path>>(
        &self,
        path: P,
        progress: Option<ProgressSink<'_>>,
    ) -> Result<FrequencyTree> {
        self.validate()?;
        let path = path.as_ref();
        let target = self.target_hint();

        let temp_dir = tempfile::tempdir()
            .map_err(|e| resource_exhausted!("failed to create temp directory: {}", e))?;

        let chunks = self.split_into_chunk_files(path, temp_dir.path())?;

        #[cfg(feature = "verbose")]
        eprintln!("[ingest] split {} into {} chunk files", path.display(), chunks.len());

        // Fixed-width pool caps peak memory and CPU no matter how many
        // chunks the split produced.
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .map_err(|e| resource_exhausted!("failed to build worker pool: {}", e))?;

        let processed: Mutex<usize> = Mutex::new(0);
        let mut tree_files: Vec<(usize, PathBuf)> = pool.install(|| {
            use rayon::prelude::*;
            chunks
                .par_iter()
                .enumerate()
                .map(|(index, chunk_path)| -> Result<(usize, PathBuf)> {
                    let mut tree = FrequencyTree::new(self.max_full_moves);
                    for game_text in GameStream::from_path(chunk_path)? {
                        let game_text = game_text?;
                        for game in extract_games(&game_text) {
                            tree.insert_game(&game.moves);
                        }
                    }

                    let tree_path = chunk_path.with_extension("tree");
                    codec::save_tree(&tree, &tree_path)?;
                    let games = tree.total_games() as usize;
                    drop(tree);
                    // Chunk file is no longer needed; reclaim disk now
                    std::fs::remove_file(chunk_path)?;

                    let total = {
                        let mut guard = processed.lock().unwrap();
                        *guard += games;
                        *guard
                    };
                    if let Some(report) = progress {
                        report(total, target);
                    }
                    Ok((index, tree_path))
                })
                .collect::<Result<Vec<_>>>()
        })?;
        tree_files.sort_by_key(|entry| entry.0);

        // Merge phase: one temp tree resident at a time
        let mut tree = FrequencyTree::new(self.max_full_moves);
        for (_, tree_path) in &tree_files {
            let chunk_tree = codec::load_tree(tree_path)?;
            tree.merge(chunk_tree);
            std::fs::remove_file(tree_path)?;
            if let Some(report) = progress {
                report(tree.total_games() as usize, target);
            }
        }

        drop(temp_dir); // removes any stragglers
        self.finish(path, tree, progress)
    }

    /// Split the source into chunk files of at most `chunk_size` games each,
    /// honoring the game limit at game granularity. Lines are copied
    /// verbatim; content before the first `[Event ` line is dropped.
    fn split_into_chunk_files(&self, source: &Path, temp_dir: &Path) -> Result<Vec<PathBuf>> {
        let file = File::open(source)?;
        let mut reader = BufReader::with_capacity(1024 * 1024, file); // 1MB buffer

        let mut chunks = Vec::new();
        let mut writer: Option<BufWriter<File>> = None;
        let mut games_in_chunk = 0usize;
        let mut total_games = 0usize;
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }

            if line.starts_with("[Event ") {
                total_games += 1;
                if let Some(limit) = self.max_games {
                    if total_games > limit {
                        break;
                    }
                }
                if writer.is_none() || games_in_chunk >= self.chunk_size {
                    if let Some(mut done) = writer.take() {
                        done.flush()?;
                    }
                    let chunk_path = temp_dir.join(format!("chunk_{:05}.pgn", chunks.len()));
                    writer = Some(BufWriter::new(File::create(&chunk_path)?));
                    chunks.push(chunk_path);
                    games_in_chunk = 0;
                }
                games_in_chunk += 1;
            }

            if let Some(out) = writer.as_mut() {
                out.write_all(line.as_bytes())?;
            }
        }

        if let Some(mut done) = writer.take() {
            done.flush()?;
        }
        Ok(chunks)
    }

    /// Common tail: reject empty runs, emit the final progress report
    fn finish(
        &self,
        path: &Path,
        tree: FrequencyTree,
        progress: Option<ProgressSink<'_>>,
    ) -> Result<FrequencyTree> {
        if tree.total_games() == 0 {
            return Err(HeatmapError::NoGamesIngested(format!(
                "{} yielded no parsable games",
                path.display()
            )));
        }
        if let Some(report) = progress {
            report(tree.total_games() as usize, self.target_hint());
        }
        Ok(tree)
    }
}

impl Default for PgnIngestor {
    fn default() -> Self {
        Self::new()
    }
}

/// A worker's handed-off micro-batch; the tags make merge order
/// deterministic without constraining the workers.
struct RangeBatch {
    range_index: usize,
    sequence: usize,
    tree: FrequencyTree,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn write_pgn(games: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for (i, movetext) in games.iter().enumerate() {
            writeln!(file, "[Event \"Game {i}\"]").unwrap();
            writeln!(file, "[Result \"*\"]").unwrap();
            writeln!(file).unwrap();
            writeln!(file, "{movetext}").unwrap();
            writeln!(file).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_sequential_three_game_scenario() {
        let file = write_pgn(&["1. e4 e5 2. Nf3 *", "1. e4 e5 2. Nc3 *", "1. d4 d5 *"]);
        let tree = PgnIngestor::new()
            .with_max_depth(5)
            .ingest(file.path(), None)
            .unwrap();

        assert_eq!(tree.total_games(), 3);
        assert_eq!(tree.root().frequency, 3);
        assert_eq!(tree.node_at(&["e4"]).unwrap().frequency, 2);
        assert_eq!(tree.node_at(&["d4"]).unwrap().frequency, 1);
        assert_eq!(tree.node_at(&["e4", "e5"]).unwrap().frequency, 2);
        assert_eq!(tree.node_at(&["e4", "e5", "Nf3"]).unwrap().frequency, 1);
        assert_eq!(tree.node_at(&["e4", "e5", "Nc3"]).unwrap().frequency, 1);
    }

    #[test]
    fn test_malformed_game_is_skipped() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "[Event \"Good\"]\n\n1. e4 e5 *\n\n[Event \"Bad\"\n\n%%% not a game\n\n[Event \"Also good\"]\n\n1. d4 *\n\n"
        )
        .unwrap();
        file.flush().unwrap();

        let tree = PgnIngestor::new().ingest(file.path(), None).unwrap();

        // The surrounding games survive the malformed one
        assert!(tree.node_at(&["e4"]).is_some());
        assert!(tree.node_at(&["d4"]).is_some());
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let result = PgnIngestor::new().ingest("/nonexistent/games.pgn", None);
        assert!(matches!(result, Err(HeatmapError::IoError(_))));
    }

    #[test]
    fn test_empty_file_reports_no_games() {
        let file = NamedTempFile::new().unwrap();
        let result = PgnIngestor::new().ingest(file.path(), None);
        assert!(matches!(result, Err(HeatmapError::NoGamesIngested(_))));
    }

    #[test]
    fn test_invalid_configuration_is_rejected() {
        let file = write_pgn(&["1. e4 *"]);

        assert!(matches!(
            PgnIngestor::new()
                .with_max_depth(0)
                .ingest(file.path(), None),
            Err(HeatmapError::ConfigurationError(_))
        ));
        assert!(matches!(
            PgnIngestor::new()
                .with_num_threads(0)
                .ingest_parallel(file.path(), None),
            Err(HeatmapError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_sequential_max_games() {
        let movetexts: Vec<String> = (0..40).map(|_| "1. e4 e5 *".to_string()).collect();
        let refs: Vec<&str> = movetexts.iter().map(|s| s.as_str()).collect();
        let file = write_pgn(&refs);

        let tree = PgnIngestor::new()
            .with_max_games(10)
            .ingest(file.path(), None)
            .unwrap();

        assert_eq!(tree.total_games(), 10);
        assert_eq!(tree.root().frequency, 10);
    }

    #[test]
    fn test_strategies_agree() {
        let movetexts: Vec<String> = (0..300)
            .map(|i| match i % 4 {
                0 => "1. e4 e5 2. Nf3 Nc6 3. Bb5 *".to_string(),
                1 => "1. e4 c5 2. Nf3 d6 *".to_string(),
                2 => "1. d4 Nf6 2. c4 e6 *".to_string(),
                _ => "1. c4 e5 *".to_string(),
            })
            .collect();
        let refs: Vec<&str> = movetexts.iter().map(|s| s.as_str()).collect();
        let file = write_pgn(&refs);

        let ingestor = PgnIngestor::new().with_max_depth(10).with_num_threads(3);

        let sequential = ingestor.ingest(file.path(), None).unwrap();
        let parallel = ingestor.ingest_parallel(file.path(), None).unwrap();
        let chunked = ingestor
            .with_chunk_size(37)
            .ingest_chunked(file.path(), None)
            .unwrap();

        assert_eq!(parallel, sequential);
        assert_eq!(chunked, sequential);
    }

    #[test]
    fn test_parallel_progress_reports_final_total() {
        let movetexts: Vec<String> = (0..120).map(|_| "1. g3 g6 *".to_string()).collect();
        let refs: Vec<&str> = movetexts.iter().map(|s| s.as_str()).collect();
        let file = write_pgn(&refs);

        let seen = Mutex::new(Vec::new());
        let sink = |processed: usize, _target: usize| {
            seen.lock().unwrap().push(processed);
        };

        let tree = PgnIngestor::new()
            .with_num_threads(2)
            .ingest_parallel(file.path(), Some(&sink))
            .unwrap();

        assert_eq!(tree.total_games(), 120);
        let reports = seen.lock().unwrap();
        assert_eq!(*reports.last().unwrap(), 120);
    }
}
