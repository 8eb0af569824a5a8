//! # Chess Heatmap Engine
//!
//! A **streaming move-frequency aggregator** for massive PGN databases. It
//! digests millions of games into a compact trie describing, for every
//! position reachable via mainline moves, how many games passed through it —
//! "after this sequence, what did players play next, and how often?" —
//! without retaining any per-game data.
//!
//! ## Features
//!
//! - **📊 Frequency Trie**: One node per mainline position with a visit
//!   counter and ply metadata; queries for max frequency, depth slices and
//!   sorted continuations
//! - **⚡ Streaming Extraction**: Games are cut out of multi-gigabyte files
//!   by boundary scanning, never by loading the file
//! - **🚀 Three Ingestion Strategies**: Sequential, parallel in-memory with
//!   micro-batched merging, and disk-chunked for datasets too large to hold
//!   many trees in memory at once
//! - **🔒 Deterministic Aggregates**: Identical trees for any worker count,
//!   chunk count or merge order
//! - **💾 Binary Cache Format**: Compact save/load with incremental progress
//!   and cooperative cancellation that still yields a valid partial tree
//!
//! ## Quick Start
//!
//! ```rust
//! use chess_heatmap_engine::FrequencyTree;
//!
//! // Aggregate a few mainlines (up to 50 full moves deep)
//! let mut tree = FrequencyTree::new(50);
//! tree.insert_game(&["e4", "e5", "Nf3"]);
//! tree.insert_game(&["e4", "c5"]);
//! tree.insert_game(&["d4", "d5"]);
//!
//! assert_eq!(tree.total_games(), 3);
//!
//! // Most popular first move and how often it was played
//! let openings = tree.continuations::<&str>(&[]);
//! assert_eq!(openings[0].move_text, "e4");
//! assert_eq!(openings[0].frequency, 2);
//! ```
//!
//! Whole files are driven through [`PgnIngestor`], which picks up the same
//! tree type:
//!
//! ```rust,no_run
//! use chess_heatmap_engine::PgnIngestor;
//!
//! let tree = PgnIngestor::new()
//!     .with_max_depth(30)
//!     .with_num_threads(8)
//!     .ingest_parallel("games.pgn", None)?;
//! tree.save_to_file("games.heat")?;
//! # Ok::<(), chess_heatmap_engine::HeatmapError>(())
//! ```

// Core modules
pub mod errors;

// Re-export commonly used types
pub use errors::HeatmapError;

pub mod codec;
pub mod extract;
pub mod frequency_tree;
pub mod game_stream;
pub mod ingest;

pub use codec::{load_tree, load_tree_with, save_tree, LoadOutcome};
pub use extract::{extract_games, ExtractedGame, MainlineVisitor};
pub use frequency_tree::{FrequencyNode, FrequencyTree, TreeSummary, DEFAULT_MAX_FULL_MOVES};
pub use game_stream::{find_chunk_boundaries, GameStream};
pub use ingest::{PgnIngestor, ProgressSink};
