// ============================================================================
// tilecanvas CLI: headless flood fill over image files
// ============================================================================
//
// Usage examples:
//   tilecanvas --input sketch.png --fill 10,10 --color ff0000 --output out.png
//   tilecanvas -i "scans/*.png" --fill 0,0 --color 00000000 --output-dir filled/
//   tilecanvas -i big.png --fill 5,5 --fill 900,40 --color 2a7fff --undo -v
//
// Each input loads as one layer. Every --fill runs as its own gesture and is
// committed to history; --undo then reverts them all and checks the pixels
// came back byte-for-byte.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::canvas::{Position, Rgba};
use crate::io::{load_image, save_image};
use crate::ops::fill::FillReport;
use crate::project::Project;
use crate::settings::EngineSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Tile-accelerated flood fill with exact undo, without a GUI.
#[derive(Parser, Debug)]
#[command(
    name = "tilecanvas",
    about = "Headless tile-tracked flood fill",
    long_about = "Flood-fill image files through the tilecanvas editing engine.\n\
                  Every fill is recorded in history so --undo can verify that the\n\
                  edit reverses exactly.\n\n\
                  Example:\n  \
                  tilecanvas --input sketch.png --fill 10,10 --color ff0000 --output out.png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.png").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Seed position "x,y". Repeat for several fills, applied in order.
    #[arg(long, value_name = "X,Y", value_parser = parse_position)]
    pub fill: Vec<Position>,

    /// Fill color as RRGGBB or RRGGBBAA.
    #[arg(short, long, default_value = "000000", value_parser = parse_color)]
    pub color: Rgba,

    /// Tile edge length in pixels (overrides the settings file).
    #[arg(long, value_name = "PIXELS")]
    pub tile_size: Option<u32>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing. Files keep their stem and become PNG.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Undo every fill after applying it and check the result matches the input.
    #[arg(long)]
    pub undo: bool,

    /// Settings file to use instead of the per-user default.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print per-file fill reports and timing.
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_position(s: &str) -> Result<Position, String> {
    let (x, y) = s.split_once(',').ok_or_else(|| format!("expected X,Y, got '{}'", s))?;
    let x = x.trim().parse::<i32>().map_err(|e| format!("bad x in '{}': {}", s, e))?;
    let y = y.trim().parse::<i32>().map_err(|e| format!("bad y in '{}': {}", s, e))?;
    Ok(Position::new(x, y))
}

fn parse_color(s: &str) -> Result<Rgba, String> {
    Rgba::from_hex(s).ok_or_else(|| format!("expected RRGGBB or RRGGBBAA, got '{}'", s))
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let mut settings = match &args.config {
        Some(path) => EngineSettings::load_from(path),
        None => EngineSettings::load(),
    };
    if let Some(tile_size) = args.tile_size {
        settings.tile_size = tile_size.max(1);
    }

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();

        let Some(output_path) = build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref())
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(input_path, &output_path, &args, &settings) {
            Ok(report) => {
                if args.verbose {
                    println!(
                        "  {} tiles, {} pixels filled, {} pixels visited",
                        report.tiles_filled, report.pixels_filled, report.pixels_visited
                    );
                }
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                log::error!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(input: &Path, output: &Path, args: &CliArgs, settings: &EngineSettings) -> Result<FillReport, String> {
    // -- Step 1: Load ----------------------------------------------------
    let buffer = load_image(input).map_err(|e| format!("load failed: {}", e))?;
    let name = input.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let mut project = Project::from_buffer(name, buffer, settings).map_err(|e| e.to_string())?;
    let layer = project.active_layer().ok_or("no layer loaded")?;
    let original = project.export_layer_raw(layer).unwrap_or_default();

    // -- Step 2: Fill, one gesture per seed --------------------------------
    let mut total = FillReport::default();
    for &seed in &args.fill {
        let report = project.flood_fill(layer, seed, args.color);
        project.register_to_history(layer);
        total.tiles_filled += report.tiles_filled;
        total.pixels_filled += report.pixels_filled;
        total.pixels_visited += report.pixels_visited;
    }

    // -- Step 3: Optional undo check -------------------------------------
    if args.undo {
        while project.can_undo() {
            project.undo().map_err(|e| format!("undo failed: {}", e))?;
        }
        if project.export_layer_raw(layer).unwrap_or_default() != original {
            return Err("undo did not restore the original pixels".to_string());
        }
    }

    // -- Step 4: Save ----------------------------------------------------
    let agent = project.canvas_state.layer(layer).ok_or("layer vanished")?;
    save_image(agent.buffer(), output).map_err(|e| format!("save failed: {}", e))?;
    Ok(total)
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: next to the input as `<stem>_filled.png`
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.png", stem)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}_filled.png", stem)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positions_and_colors() {
        assert_eq!(parse_position("3, 4"), Ok(Position::new(3, 4)));
        assert!(parse_position("3").is_err());
        assert_eq!(parse_color("ff000080"), Ok(Rgba::new(255, 0, 0, 128)));
        assert!(parse_color("red").is_err());
    }

    #[test]
    fn output_path_priority() {
        let input = Path::new("dir/a.png");
        assert_eq!(
            build_output_path(input, Some(Path::new("x.png")), Some(Path::new("out"))),
            Some(PathBuf::from("x.png"))
        );
        assert_eq!(build_output_path(input, None, Some(Path::new("out"))), Some(PathBuf::from("out/a.png")));
        assert_eq!(build_output_path(input, None, None), Some(PathBuf::from("dir/a_filled.png")));
    }

    #[test]
    fn fill_and_undo_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        save_image(&crate::canvas::PixelBuffer::filled(40, 40, Rgba::WHITE), &input).unwrap();

        let out = dir.path().join("out.png");
        let args = CliArgs::parse_from([
            "tilecanvas",
            "--input",
            input.to_str().unwrap(),
            "--fill",
            "1,1",
            "--color",
            "ff0000",
            "--output",
            out.to_str().unwrap(),
        ]);
        let report = run_one(&input, &out, &args, &EngineSettings::default()).unwrap();
        assert_eq!(report.tiles_filled, 4);
        assert_eq!(load_image(&out).unwrap().get_pixel(Position::new(39, 39)), Rgba::new(255, 0, 0, 255));

        let args = CliArgs::parse_from(["tilecanvas", "-i", "x", "--fill", "1,1", "--undo"]);
        run_one(&input, &out, &args, &EngineSettings::default()).unwrap();
        assert_eq!(load_image(&out).unwrap().get_pixel(Position::new(39, 39)), Rgba::WHITE);
    }
}
