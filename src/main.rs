/*
 Copyright (c) 2025 the wav4x authors

 This file is part of wav4x

 wav4x is free software: you can redistribute it and/or modify it
 under the terms of the GNU General Public License as published by the
 Free Software Foundation, either version 3 of the License, or
 (at your option) any later version.

 wav4x is distributed in the hope that it will be useful, but
 WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 GNU General Public License for more details.
 You should have received a copy of the GNU General Public License
 along with wav4x. If not, see <https://www.gnu.org/licenses/>.
*/

use clap::Parser;
use colored::Colorize;
use common_path::common_path_all;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use log::{info, trace, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::thread::available_parallelism;
use std::{error::Error, io, sync::mpsc, time::Instant};
use wav4x::upscaler::{ONE_HUNDRED_PERCENT, ProgressUpdate, Upscaler};
use wav4x::wav::find_wav_files;
use wav4x::{ColorLogger, TermResult};

#[derive(Parser)]
#[command(name = "wav4x", version)]
struct Cli {
    /// Output directory path for upsampled files. Directory must already
    /// exist but any subdirectories will be created as needed.
    /// [default: same as input file]
    #[arg(short = 'p', long = "path", default_value = None)]
    path: Option<PathBuf>,

    /// Output file name. Only valid with a single input file.
    /// [default: <input stem> with the output rate appended, e.g.
    /// track_176_4K.wav]
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Interpolation method: C (cubic spline), A (Akima),
    /// P (PCHIP, monotone), H (sample hold)
    #[arg(short = 'm', long = "method", default_value = "C")]
    method: char,

    /// Print diagnostic messages
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Quiet mode: suppress all log output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Recurse into directories when the supplied input paths include folders
    #[arg(short = 'R', long = "recurse")]
    recurse: bool,

    /// Input WAV files/folders (16-bit stereo)
    #[arg(name = "FILES")]
    files: Vec<PathBuf>,
}

fn main() -> TermResult {
    match run() {
        Ok(()) => TermResult(Ok(())),
        Err(e) => TermResult(Err(e.into())),
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let logger = ColorLogger::new(cli.quiet, cli.verbose);
    let max_level = logger.max_level();
    let multi = MultiProgress::new();
    LogWrapper::new(multi.clone(), logger).try_init()?;
    log::set_max_level(max_level);

    let avail_par = available_parallelism().map(|n| n.get()).unwrap_or(1);
    let thread_count = (avail_par / 2).max(1);

    // Configure Rayon pool size to our computed thread_count.
    // build_global can only be called once; ignore error if already set.
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build_global()
    {
        warn!(
            "Rayon pool initialization error ({} threads). Details: {:?}",
            thread_count, e
        );
    } else {
        trace!("Configured Rayon pool with {} threads", thread_count);
    }

    if cli.files.is_empty() {
        return Err("No input files given".into());
    }

    let mut inputs = cli.files.clone();
    inputs.sort();
    inputs.dedup();

    // Filter to remove any glob patterns, yielding all inputted paths, canonicalized
    let paths = inputs
        .iter()
        .filter_map(|input| {
            if input.to_string_lossy().contains('*') {
                warn!(
                    "Unexpanded glob pattern detected in input: \"{}\". Skipping.",
                    input.display()
                );
                None
            } else {
                Some(input)
            }
        })
        .map(|p| {
            let full_path = p.canonicalize()?;
            Ok(full_path)
        })
        .collect::<Result<Vec<_>, std::io::Error>>()?;

    // Determine base directory against which output paths should be constructed.
    // Should only come into play when an output folder path is specified.
    let base_dir = if paths.len() == 1 {
        // Just one file/folder; use its parent directory.
        paths[0].parent().unwrap_or(Path::new("/")).to_path_buf()
    } else {
        // For multiple files, find lowest common ancestor directory.
        let common = common_path_all(paths.iter().map(|p| p.as_path()))
            .unwrap_or(PathBuf::from("/"));
        common.parent().unwrap_or(Path::new("/")).to_path_buf()
    };

    let expanded_paths = find_wav_files(&paths, cli.recurse)?;
    if expanded_paths.is_empty() {
        return Err("No WAV files found among the inputs".into());
    }
    if cli.output.is_some() && expanded_paths.len() > 1 {
        return Err("--output is only valid with a single input file".into());
    }

    let num_paths = expanded_paths.len();
    let wall_start = Instant::now();

    // Parallelize per input using Rayon; short-circuit on first error.
    expanded_paths
        .into_par_iter()
        .try_for_each(|path| convert_file(path, &cli, &base_dir, &multi))
        .map_err(|e| -> Box<dyn Error> {
            Box::new(io::Error::new(io::ErrorKind::Other, e))
        })?;

    let total_secs = wall_start.elapsed().as_secs();
    let h = total_secs / 3600;
    let m = (total_secs % 3600) / 60;
    let s = total_secs % 60;
    info!(
        "Processed {} inputs in {:02}:{:02}:{:02}",
        num_paths, h, m, s
    );

    Ok(())
}

/// Run conversion for a single input, reporting progress to a bar under
/// the shared MultiProgress.
fn convert_file(
    path: PathBuf,
    cli: &Cli,
    base_dir: &Path,
    multi: &MultiProgress,
) -> Result<(), String> {
    let mut upscaler = Upscaler::new(
        path,
        cli.path.clone(),
        cli.output.clone(),
        base_dir,
        cli.method,
    )
    .map_err(|e| e.to_string())?;

    let (sender, receiver) = mpsc::channel::<ProgressUpdate>();
    let file_name = upscaler.file_name();
    let style = ProgressStyle::with_template(
        "{prefix} {bar:20.cyan/blue} {percent}% {elapsed_precise} ETA {eta_precise}",
    )
    .map_err(|e| e.to_string())?;

    let pg = multi
        .add(ProgressBar::new(100))
        .with_style(style)
        .with_prefix(format!(
            "{} {}",
            "[Upsampling]".bold(),
            file_name.bold()
        ));

    // Run conversion on this Rayon worker; drive progress on a lightweight OS thread.
    let progress_handle = std::thread::spawn(move || {
        while let Ok(progress) = receiver.recv() {
            pg.set_position(progress.percent.floor() as u64);
            if progress.percent == ONE_HUNDRED_PERCENT {
                break;
            }
        }
    });

    let conv_res = upscaler.do_conversion(Some(sender));

    if let Err(e) = progress_handle.join() {
        return Err(format!("Progress thread panicked: {:?}", e));
    }

    conv_res.map_err(|e| format!("Conversion error: {}", e))
}
