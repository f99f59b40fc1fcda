//! Command line tool around the tecken library: builds character→font index
//! tables, produces embeddable WOFF2 subsets, and reports the coverage of
//! fonts or already-embedded data URIs.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rayon::prelude::*;

use tecken::{
    css::FontFaceRule,
    data_uri,
    index::{CharacterIndex, FontRecord},
    input, parse_coverage,
    subset::{subset, SubsetInput},
    Error,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Print progress and parser warnings.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a character→font index table from an ordered font list.
    Index {
        /// Font files in priority order; the first font covering a
        /// character wins. Defaults to the fonts in the output directory.
        fonts: Vec<PathBuf>,

        /// Grouping key naming the table file (default: fontindex).
        #[arg(long)]
        style: Option<String>,

        /// Directory the table file is written into.
        #[arg(long, default_value = "fonts")]
        output_dir: PathBuf,
    },
    /// Produce an embeddable subset of one font.
    Subset {
        /// The input font file.
        font: PathBuf,

        /// Unicode codepoints or ranges to retain, e.g. 41-5A,3042.
        #[arg(short, long)]
        unicodes: Option<String>,

        /// Literal text whose characters are retained.
        #[arg(short, long)]
        text: Option<String>,

        /// Variation sequences to retain, as base:selector hex pairs.
        #[arg(long)]
        sequences: Option<String>,

        /// Replacement family name for the subset.
        #[arg(long)]
        family_name: Option<String>,

        /// Write the WOFF2 binary here instead of printing a stylesheet rule.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Report the coverage of font files or embedded stylesheet fonts.
    Report {
        /// Font files, or stylesheets containing data:font/woff2 URIs.
        inputs: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let result = match args.command {
        Command::Index {
            fonts,
            style,
            output_dir,
        } => run_index(fonts, style, &output_dir),
        Command::Subset {
            font,
            unicodes,
            text,
            sequences,
            family_name,
            output,
        } => run_subset(&font, unicodes, text, sequences, family_name, output),
        Command::Report { inputs } => run_report(&inputs),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Parse every font (fan-out), then merge in caller order and write the
/// table once. Returns `Ok(false)` if any font failed but the run finished.
fn run_index(
    fonts: Vec<PathBuf>,
    style: Option<String>,
    output_dir: &Path,
) -> Result<bool, Error> {
    let paths = if fonts.is_empty() {
        scan_fonts_dir(output_dir)?
    } else {
        fonts
    };

    let results: Vec<_> = paths
        .par_iter()
        .map(|path| {
            let result = fs::read(path)
                .map_err(Error::from)
                .and_then(|bytes| FontRecord::read(font_id(path), &bytes));
            (path.clone(), result)
        })
        .collect();

    let mut records = Vec::with_capacity(results.len());
    let mut all_ok = true;
    for (path, result) in results {
        match result {
            Ok((record, warnings)) => {
                for warning in &warnings {
                    log::warn!("{}: {warning}", path.display());
                }
                log::info!(
                    "{}: {} codepoints, {} sequences",
                    path.display(),
                    record.codepoints.len(),
                    record.sequences.len()
                );
                records.push(record);
            }
            Err(e) => {
                all_ok = false;
                log::error!("{}: {e}", path.display());
            }
        }
    }

    let index = CharacterIndex::build(&records);
    let table = style.as_deref().unwrap_or("fontindex");
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("{table}.csv"));
    index.write_to_file(&path)?;
    println!("{} entries written to {}", index.len(), path.display());
    Ok(all_ok)
}

fn run_subset(
    font: &Path,
    unicodes: Option<String>,
    text: Option<String>,
    sequences: Option<String>,
    family_name: Option<String>,
    output: Option<PathBuf>,
) -> Result<bool, Error> {
    let bytes = fs::read(font)?;

    let mut input = match &text {
        Some(text) => SubsetInput::from_text(text),
        None => SubsetInput::new(),
    };
    if let Some(unicodes) = &unicodes {
        input.codepoints.union(&input::parse_unicodes(unicodes)?);
    }
    if let Some(sequences) = &sequences {
        input.sequences.extend(input::parse_sequences(sequences)?);
    }
    if input.is_empty() {
        input = SubsetInput::all();
    }

    let out = subset(&bytes, &input, family_name.as_deref())?;
    log::info!(
        "{}: retained {} codepoints, {} sequences",
        font.display(),
        out.codepoints.len(),
        out.sequences.len()
    );
    match output {
        Some(path) => {
            fs::write(&path, &out.data)?;
            println!("{} bytes written to {}", out.data.len(), path.display());
        }
        None => {
            let uri = data_uri::encode(&out.data, data_uri::WOFF2_MIME);
            println!("{}", FontFaceRule::new(out.family_name, uri));
        }
    }
    Ok(true)
}

/// Coverage report over font files and stylesheets; processing continues
/// past per-input failures and the exit status aggregates them.
fn run_report(inputs: &[PathBuf]) -> Result<bool, Error> {
    let mut all_ok = true;
    for path in inputs {
        match report_one(path) {
            Ok(()) => {}
            Err(e) => {
                all_ok = false;
                log::error!("{}: {e}", path.display());
            }
        }
    }
    Ok(all_ok)
}

fn report_one(path: &Path) -> Result<(), Error> {
    let bytes = fs::read(path)?;
    if let Ok(text) = std::str::from_utf8(&bytes) {
        let uris = extract_data_uris(text);
        if !uris.is_empty() {
            for (i, uri) in uris.iter().enumerate() {
                let font = data_uri::decode(uri)?;
                println!("{} #{}", path.display(), i + 1);
                print_coverage(&font)?;
            }
            return Ok(());
        }
    }
    println!("{}", path.display());
    print_coverage(&bytes)
}

fn print_coverage(font: &[u8]) -> Result<(), Error> {
    let coverage = parse_coverage(font)?;
    for warning in &coverage.warnings {
        log::warn!("{warning}");
    }
    for codepoint in coverage.codepoints.iter() {
        match char::from_u32(codepoint) {
            Some(c) if !c.is_control() => println!("U+{codepoint:04X} ({c})"),
            _ => println!("U+{codepoint:04X}"),
        }
    }
    for sequence in &coverage.sequences {
        println!("  variation sequence {sequence}");
    }
    Ok(())
}

/// Every data:font/woff2 URI embedded in a stylesheet.
fn extract_data_uris(text: &str) -> Vec<String> {
    const PREFIX: &str = "data:font/woff2;base64,";
    let mut uris = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(PREFIX) {
        let payload = &rest[start + PREFIX.len()..];
        let end = payload
            .find(|c: char| !c.is_ascii_alphanumeric() && !matches!(c, '+' | '/' | '='))
            .unwrap_or(payload.len());
        uris.push(format!("{PREFIX}{}", &payload[..end]));
        rest = &payload[end..];
    }
    uris
}

/// The identifier a font is indexed under: its file name.
fn font_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Default font list: every .ttf/.otf under the output directory, sorted.
fn scan_fonts_dir(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("ttf") | Some("otf")
            )
        })
        .collect();
    paths.sort();
    Ok(paths)
}
