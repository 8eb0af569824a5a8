use chess_heatmap_engine::PgnIngestor;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Strategy {
    /// One thread, one tree — simplest, lowest memory
    Sequential,
    /// Byte-range workers with micro-batched in-memory merging
    Parallel,
    /// Physical chunk files staged through disk, for the largest databases
    Chunked,
    /// Parallel when a game limit is set, chunked otherwise
    Auto,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the PGN database file
    input: String,

    /// Output cache file
    #[arg(short, long, default_value = "heatmap.heat")]
    output: String,

    /// Maximum depth in full moves
    #[arg(short, long, default_value = "50")]
    depth: u32,

    /// Maximum number of games to ingest (0 = whole file)
    #[arg(short, long, default_value = "0")]
    max_games: usize,

    /// Worker threads (0 = auto-detect)
    #[arg(short, long, default_value = "0")]
    threads: usize,

    /// Games per chunk file for the chunked strategy
    #[arg(long, default_value = "50000")]
    chunk_size: usize,

    /// Ingestion strategy
    #[arg(long, value_enum, default_value_t = Strategy::Auto)]
    strategy: Strategy,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("🔥 Chess Heatmap Engine - Database Builder");
    println!("==========================================");
    println!();
    println!("Configuration:");
    println!("  • Input file: {}", args.input);
    println!("  • Output cache: {}", args.output);
    println!("  • Depth: {} full moves", args.depth);
    if args.max_games > 0 {
        println!("  • Game limit: {}", args.max_games);
    }
    println!();

    let mut ingestor = PgnIngestor::new()
        .with_max_depth(args.depth)
        .with_chunk_size(args.chunk_size);
    if args.max_games > 0 {
        ingestor = ingestor.with_max_games(args.max_games);
    }
    if args.threads > 0 {
        ingestor = ingestor.with_num_threads(args.threads);
    }

    let strategy = match args.strategy {
        Strategy::Auto if args.max_games > 0 => Strategy::Parallel,
        Strategy::Auto => Strategy::Chunked,
        other => other,
    };

    let pb = if args.max_games > 0 {
        let pb = ProgressBar::new(args.max_games as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("⚡ Ingesting [{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} games {msg}")?
                .progress_chars("██░"),
        );
        pb
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("⚡ Ingesting [{elapsed_precise}] {pos} games {msg}")?);
        pb
    };

    let sink = |processed: usize, _target: usize| {
        pb.set_position(processed as u64);
    };

    let start = Instant::now();
    let tree = match strategy {
        Strategy::Sequential => ingestor.ingest(&args.input, Some(&sink))?,
        Strategy::Parallel | Strategy::Auto => ingestor.ingest_parallel(&args.input, Some(&sink))?,
        Strategy::Chunked => ingestor.ingest_chunked(&args.input, Some(&sink))?,
    };
    pb.finish_and_clear();

    let elapsed = start.elapsed();
    let summary = tree.summary();
    println!("🎉 Ingestion complete!");
    println!("⏱️  Time: {:.2}s", elapsed.as_secs_f64());
    println!("📊 {} games into {} nodes", summary.total_games, summary.node_count);
    println!(
        "🚀 Speed: {:.0} games/second",
        summary.total_games as f64 / elapsed.as_secs_f64()
    );

    tree.save_to_file(&args.output)?;
    println!("💾 Cache saved to {}", args.output);

    Ok(())
}
