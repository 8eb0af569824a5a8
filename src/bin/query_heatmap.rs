use chess_heatmap_engine::{load_tree_with, FrequencyNode};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cache file produced by build_heatmap
    cache: String,

    /// Move sequence to descend before listing continuations, e.g. "e4 e5"
    #[arg(short, long, default_value = "")]
    line: String,

    /// Maximum continuations to list
    #[arg(short, long, default_value = "10")]
    top: usize,

    /// Emit JSON instead of a table
    #[arg(long)]
    json: bool,
}

/// One continuation row of the listing
#[derive(Serialize)]
struct ContinuationRow {
    san: String,
    move_number: u32,
    white_to_move: bool,
    games: u32,
    share: f64,
}

impl ContinuationRow {
    fn new(node: &FrequencyNode, line_games: u32) -> Self {
        Self {
            san: node.move_text.clone(),
            move_number: node.move_number,
            white_to_move: node.is_white_move,
            games: node.frequency,
            share: f64::from(node.frequency) / f64::from(line_games.max(1)),
        }
    }
}

#[derive(Serialize)]
struct QueryReport {
    line: Vec<String>,
    games_through_line: u32,
    total_games: u32,
    continuations: Vec<ContinuationRow>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("📖 Loading [{elapsed_precise}] [{bar:40.blue/green}] {bytes}/{total_bytes}")?
            .progress_chars("██░"),
    );
    let progress = |read: u64, total: u64| {
        pb.set_length(total);
        pb.set_position(read);
    };

    let outcome = load_tree_with(&args.cache, Some(&progress), None)?;
    pb.finish_and_clear();
    let tree = outcome.tree;

    let line: Vec<String> = args
        .line
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();

    let Some(node) = tree.node_at(&line) else {
        eprintln!("Line \"{}\" does not occur in the database", args.line);
        std::process::exit(1);
    };

    let continuations: Vec<ContinuationRow> = tree
        .continuations(&line)
        .into_iter()
        .take(args.top)
        .map(|child| ContinuationRow::new(child, node.frequency))
        .collect();

    if args.json {
        let report = QueryReport {
            line,
            games_through_line: node.frequency,
            total_games: tree.total_games(),
            continuations,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("📊 Chess Heatmap Engine - Query");
    println!("===============================");
    println!();
    println!(
        "Database: {} games, {} nodes",
        tree.total_games(),
        tree.node_count()
    );
    if line.is_empty() {
        println!("Position: start");
    } else {
        println!("Position: after {}", args.line);
    }
    println!("Games through this line: {}", node.frequency);
    println!();

    if continuations.is_empty() {
        println!("No recorded continuations.");
        return Ok(());
    }

    println!("{:<10} {:>10} {:>8}", "Move", "Games", "Share");
    for row in &continuations {
        let label = if row.white_to_move {
            format!("{}. {}", row.move_number, row.san)
        } else {
            format!("{}... {}", row.move_number, row.san)
        };
        println!("{:<10} {:>10} {:>7.1}%", label, row.games, row.share * 100.0);
    }

    Ok(())
}
