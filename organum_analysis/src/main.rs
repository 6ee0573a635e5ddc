// Organum — CLI entry point.
//
// Analyzes one or more piece JSON files for contrapuntal patterns and
// prints interval and n-gram frequency tables. Pieces are analyzed in
// parallel and their statistics merged into one store, which can be saved
// to JSON and merged with a previously saved store on a later run.
//
// Usage:
//   cargo run -p organum_analysis -- piece.json [more.json ...]
//     [--sample-interval F] [--n LIST] [--heed-quality] [--simple]
//     [--threshold N] [--top N] [--sort name|frequency] [--descending]
//     [--per-piece] [--merge store.json] [--output store.json]
//     [--annotations out.json]
//
// Logging goes through tracing; set RUST_LOG=organum_analysis=debug for
// the machinery's own view of a run.

use std::path::Path;

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use organum_analysis::input::load_piece;
use organum_analysis::pipeline::{AnalysisSettings, CorpusAnalysis, analyze_pieces};
use organum_analysis::statistics::{
    IntervalQuery, NGramQuery, SortBy, SortOrder, StatisticsStore,
};
use organum_model::event::Event;
use organum_model::interval::Granularity;

const VALUE_FLAGS: [&str; 8] = [
    "--sample-interval",
    "--n",
    "--threshold",
    "--top",
    "--sort",
    "--merge",
    "--output",
    "--annotations",
];

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();

    // Parse arguments
    let inputs = positional_args(&args);
    if inputs.is_empty() {
        eprintln!("No piece files given. Pass one or more piece JSON paths.");
        std::process::exit(2);
    }
    let settings = AnalysisSettings {
        sample_interval: parse_flag(&args, "--sample-interval").unwrap_or(0.5),
        n_values: parse_flag::<String>(&args, "--n")
            .map(|list| parse_n_list(&list))
            .unwrap_or_else(|| vec![2]),
        heed_quality: has_flag(&args, "--heed-quality"),
    };
    let granularity = if has_flag(&args, "--simple") {
        Granularity::Simple
    } else {
        Granularity::Compound
    };
    let threshold: Option<u64> = parse_flag(&args, "--threshold");
    let top_x: Option<usize> = parse_flag(&args, "--top");
    let sort_by = match parse_flag::<String>(&args, "--sort").as_deref() {
        Some("frequency") => SortBy::Frequency,
        Some("name") | None => SortBy::Name,
        Some(other) => {
            eprintln!("Unknown sort '{}'. Using name order.", other);
            SortBy::Name
        }
    };
    let order = if has_flag(&args, "--descending") {
        SortOrder::Descending
    } else {
        SortOrder::Ascending
    };
    let per_piece = has_flag(&args, "--per-piece");
    let merge_path: Option<String> = parse_flag(&args, "--merge");
    let output_path: Option<String> = parse_flag(&args, "--output");
    let annotations_path: Option<String> = parse_flag(&args, "--annotations");

    println!("=== Organum Contrapuntal Analysis ===");
    println!("Sample interval: {} beats", settings.sample_interval);
    println!("N values: {:?}", settings.n_values);
    println!("Quality: {}", if settings.heed_quality { "heeded" } else { "ignored" });
    println!("Granularity: {:?}", granularity);
    println!();

    // Load pieces
    println!("[1/3] Loading {} piece file(s)...", inputs.len());
    let mut pieces: Vec<(String, Vec<Vec<Event>>)> = Vec::new();
    for path in &inputs {
        match load_piece(Path::new(path)) {
            Ok((title, voices)) => {
                println!("  {}: '{}', {} voices", path, title, voices.len());
                pieces.push((title, voices));
            }
            Err(e) => eprintln!("  Skipping {}: {}", path, e),
        }
    }
    if pieces.is_empty() {
        eprintln!("No loadable pieces.");
        std::process::exit(1);
    }

    // Analyze
    println!("[2/3] Analyzing {} piece(s)...", pieces.len());
    let mut corpus: CorpusAnalysis = match analyze_pieces(&pieces, &settings) {
        Ok(corpus) => corpus,
        Err(e) => {
            eprintln!("Analysis failed: {}", e);
            std::process::exit(1);
        }
    };
    let total_ngrams: usize = corpus.annotations.iter().map(|a| a.len()).sum();
    println!("  {} n-gram(s) found.", total_ngrams);

    if let Some(path) = merge_path {
        match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| StatisticsStore::from_json(&text).map_err(|e| e.to_string()))
        {
            Ok(mut loaded) => {
                println!("  Merging saved store '{}' ({} pieces).", path, loaded.pieces().len());
                loaded.shift_pieces(corpus.store.pieces().len());
                corpus.store.merge_from(loaded);
            }
            Err(e) => eprintln!("  Ignoring store '{}': {}", path, e),
        }
    }

    // Report
    println!("[3/3] Results");
    println!();
    print_intervals(&corpus, &settings, granularity, threshold, top_x, sort_by, order, per_piece);
    print_ngrams(&corpus, &settings, granularity, threshold, top_x, sort_by, order, per_piece);

    if let Some(path) = output_path {
        match corpus.store.to_json().map(|text| std::fs::write(&path, text)) {
            Ok(Ok(())) => println!("Store written to {}", path),
            Ok(Err(e)) => eprintln!("Error writing {}: {}", path, e),
            Err(e) => eprintln!("Error serializing store: {}", e),
        }
    }
    if let Some(path) = annotations_path {
        match write_annotations(&corpus, &pieces, Path::new(&path)) {
            Ok(count) => println!("{} annotation(s) written to {}", count, path),
            Err(e) => eprintln!("Error writing {}: {}", path, e),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn print_intervals(
    corpus: &CorpusAnalysis,
    settings: &AnalysisSettings,
    granularity: Granularity,
    threshold: Option<u64>,
    top_x: Option<usize>,
    sort_by: SortBy,
    order: SortOrder,
    per_piece: bool,
) {
    let rows = corpus.store.query_intervals(&IntervalQuery {
        heed_quality: settings.heed_quality,
        granularity,
        threshold,
        top_x,
        sort_by,
        order,
        per_piece,
    });
    println!("Intervals ({} distinct):", rows.len());
    for row in &rows {
        match &row.by_piece {
            Some(list) => println!("  {:>6}  {:<8} {:?}", row.total, row.token, list),
            None => println!("  {:>6}  {}", row.total, row.token),
        }
    }
    println!();
}

#[allow(clippy::too_many_arguments)]
fn print_ngrams(
    corpus: &CorpusAnalysis,
    settings: &AnalysisSettings,
    granularity: Granularity,
    threshold: Option<u64>,
    top_x: Option<usize>,
    sort_by: SortBy,
    order: SortOrder,
    per_piece: bool,
) {
    let query = NGramQuery {
        n_values: settings.n_values.clone(),
        heed_quality: settings.heed_quality,
        granularity,
        threshold,
        top_x,
        sort_by,
        order,
        per_piece,
    };
    match corpus.store.query_ngrams(&query) {
        Ok(rows) => {
            println!("N-grams ({} distinct):", rows.len());
            for row in &rows {
                match &row.by_piece {
                    Some(list) => {
                        println!("  {:>6}  {:<24} {:?}", row.total, row.token, list)
                    }
                    None => println!("  {:>6}  {}", row.total, row.token),
                }
            }
        }
        Err(e) => eprintln!("No n-gram listing: {}", e),
    }
    println!();
}

#[derive(Serialize)]
struct AnnotationRecord<'a> {
    piece: &'a str,
    offset: f64,
    upper_voice: usize,
    lower_voice: usize,
    ngram: &'a str,
    occurrences: u64,
}

/// Write the (offset, n-gram, occurrence-count) annotations as JSON, for a
/// notation exporter to place on a rendered score.
fn write_annotations(
    corpus: &CorpusAnalysis,
    pieces: &[(String, Vec<Vec<Event>>)],
    path: &Path,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut records = Vec::new();
    for (piece, annotations) in pieces.iter().zip(&corpus.annotations) {
        for annotation in annotations {
            records.push(AnnotationRecord {
                piece: &piece.0,
                offset: annotation.offset,
                upper_voice: annotation.upper_voice,
                lower_voice: annotation.lower_voice,
                ngram: annotation.ngram.as_str(),
                occurrences: annotation.occurrences,
            });
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(&records)?)?;
    Ok(records.len())
}

/// Non-flag arguments, skipping the value that follows each value-taking
/// flag.
fn positional_args(args: &[String]) -> Vec<String> {
    let mut inputs = Vec::new();
    let mut i = 1;
    while i < args.len() {
        let arg = &args[i];
        if VALUE_FLAGS.contains(&arg.as_str()) {
            i += 2;
        } else if arg.starts_with("--") {
            i += 1;
        } else {
            inputs.push(arg.clone());
            i += 1;
        }
    }
    inputs
}

fn parse_n_list(list: &str) -> Vec<usize> {
    let values: Vec<usize> = list
        .split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect();
    if values.is_empty() {
        eprintln!("Could not parse n list '{}'. Using n = 2.", list);
        vec![2]
    } else {
        values
    }
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
