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

use crate::interpolator::{CHANNELS, Interpolator, UPSAMPLE_RATIO};
use crate::wav::{INPUT_BIT_DEPTH, OUTPUT_BIT_DEPTH, WavFile, WavReader};
use log::{info, warn};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

pub const ONE_HUNDRED_PERCENT: f64 = 100.0;

/// Conversion progress message, sent once per processed chunk
pub struct ProgressUpdate {
    pub percent: f64,
}

/// Frames read from the input per chunk
const CHUNK_FRAMES: usize = 1024;

/// Per-file conversion context: owns the reader, the interpolation engine,
/// and the accumulating writer, and drives the chunk loop between them.
#[derive(Debug)]
pub struct Upscaler {
    reader: WavReader,
    interpolator: Interpolator,
    out_file: WavFile,
    input_path: PathBuf,
    out_path: PathBuf,
    clipped: u64,
}

impl Upscaler {
    /// Open the input, construct the engine (surfacing an invalid method
    /// selector immediately), and resolve the output path. `out_dir` must
    /// already exist; subdirectories mirroring the input layout relative
    /// to `base_dir` are created as needed at save time.
    pub fn new(
        input_path: PathBuf,
        out_dir: Option<PathBuf>,
        out_file: Option<PathBuf>,
        base_dir: &Path,
        method_selector: char,
    ) -> Result<Self, Box<dyn Error>> {
        if let Some(dir) = &out_dir
            && !dir.exists()
        {
            return Err(format!(
                "Specified output path does not exist: {}",
                dir.display()
            )
            .into());
        }

        let reader = WavReader::open(&input_path)?;
        let interpolator = Interpolator::new(method_selector)?;
        let out_rate = reader.sample_rate() * UPSAMPLE_RATIO as u32;
        let out_path = match out_file {
            Some(path) => path,
            None => derived_out_path(&input_path, out_dir.as_deref(), base_dir, out_rate),
        };

        Ok(Self {
            reader,
            interpolator,
            out_file: WavFile::new(out_rate),
            input_path,
            out_path,
            clipped: 0,
        })
    }

    /// Input file name, for progress display
    pub fn file_name(&self) -> String {
        self.input_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn out_path(&self) -> &Path {
        &self.out_path
    }

    /// Run the conversion to completion: read chunks, upsample, clip into
    /// the writer, then save. Progress percentages are sent after every
    /// chunk; ONE_HUNDRED_PERCENT is sent last so the listener can stop.
    pub fn do_conversion(
        &mut self,
        progress: Option<Sender<ProgressUpdate>>,
    ) -> Result<(), Box<dyn Error>> {
        let total_frames = self.reader.total_frames();
        let mut processed: u64 = 0;

        self.interpolator.reset();

        // Promote 16-bit input into the 24-bit output domain
        let in_scale = f64::from(1u32 << (OUTPUT_BIT_DEPTH - INPUT_BIT_DEPTH));
        let mut float_chunk: Vec<f64> = Vec::with_capacity(CHUNK_FRAMES * CHANNELS);

        loop {
            let pcm = self.reader.read_chunk(CHUNK_FRAMES)?;
            if pcm.is_empty() {
                break;
            }

            float_chunk.clear();
            float_chunk.extend(pcm.iter().map(|&s| f64::from(s) * in_scale));
            let upsampled = self.interpolator.process_chunk(&float_chunk);

            for frame in upsampled.chunks_exact(CHANNELS) {
                for (ch, &sample) in frame.iter().enumerate() {
                    if self.out_file.push_clipped(ch, sample) {
                        self.clipped += 1;
                    }
                }
            }

            processed += (pcm.len() / CHANNELS) as u64;
            if let Some(sender) = &progress {
                let percent =
                    processed as f64 / total_frames as f64 * ONE_HUNDRED_PERCENT;
                let _ = sender.send(ProgressUpdate { percent });
            }
        }

        if let Some(parent) = self.out_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        self.out_file.save(&self.out_path)?;

        if self.clipped > 0 {
            warn!(
                "{} samples clipped writing {}",
                self.clipped,
                self.out_path.display()
            );
        }
        info!(
            "Wrote {} ({} frames at {} Hz)",
            self.out_path.display(),
            self.out_file.frames(),
            self.out_file.sample_rate()
        );

        if let Some(sender) = &progress {
            let _ = sender.send(ProgressUpdate {
                percent: ONE_HUNDRED_PERCENT,
            });
        }
        Ok(())
    }
}

/// Output path beside the input (or mirrored under `out_dir`), with the
/// abbreviated output rate appended to the stem, e.g. `track_176_4K.wav`
fn derived_out_path(
    input_path: &Path,
    out_dir: Option<&Path>,
    base_dir: &Path,
    out_rate: u32,
) -> PathBuf {
    let stem = input_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!("{}{}.wav", stem, rate_suffix(out_rate));

    let in_parent = input_path.parent().unwrap_or(Path::new(""));
    match out_dir {
        Some(dir) => {
            let rel = in_parent.strip_prefix(base_dir).unwrap_or(Path::new(""));
            dir.join(rel).join(name)
        }
        None => in_parent.join(name),
    }
}

fn rate_suffix(rate: u32) -> String {
    let khz = rate / 1000;
    let frac = (rate % 1000) / 100;
    if frac == 0 {
        format!("_{}K", khz)
    } else {
        format!("_{}_{}K", khz, frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("wav4x_up_{}_{}.wav", name, std::process::id()))
    }

    // 16-bit stereo input fixture (see wav module tests for the layout)
    fn write_input_wav(path: &Path, sample_rate: u32, samples: &[i16]) {
        let data_size = (samples.len() * 2) as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(data_size + 36).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * 4).to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_size.to_le_bytes());
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn rate_suffixes_are_abbreviated() {
        assert_eq!(rate_suffix(176_400), "_176_4K");
        assert_eq!(rate_suffix(192_000), "_192K");
        assert_eq!(rate_suffix(352_800), "_352_8K");
        assert_eq!(rate_suffix(96_000), "_96K");
    }

    #[test]
    fn derived_path_lands_beside_the_input() {
        let out = derived_out_path(
            Path::new("/music/album/track.wav"),
            None,
            Path::new("/music"),
            176_400,
        );
        assert_eq!(out, PathBuf::from("/music/album/track_176_4K.wav"));
    }

    #[test]
    fn derived_path_mirrors_layout_under_out_dir() {
        let out = derived_out_path(
            Path::new("/music/album/track.wav"),
            Some(Path::new("/converted")),
            Path::new("/music"),
            192_000,
        );
        assert_eq!(out, PathBuf::from("/converted/album/track_192K.wav"));
    }

    #[test]
    fn invalid_method_selector_fails_at_construction() {
        let input = temp_path("bad_method");
        write_input_wav(&input, 44100, &[0, 0, 0, 0]);

        let err = Upscaler::new(input.clone(), None, None, Path::new("/"), 'q')
            .unwrap_err()
            .to_string();
        assert!(err.contains("Invalid configuration"), "unexpected error: {}", err);

        std::fs::remove_file(&input).ok();
    }

    #[test]
    fn converts_a_file_end_to_end() {
        let input = temp_path("e2e_in");
        let output = temp_path("e2e_out");
        // 6 frames; right channel is the negated left
        let samples: Vec<i16> = (0..6i16).flat_map(|i| [i * 100, -i * 100]).collect();
        write_input_wav(&input, 44100, &samples);

        let mut upscaler = Upscaler::new(
            input.clone(),
            None,
            Some(output.clone()),
            Path::new("/"),
            'c',
        )
        .unwrap();
        upscaler.do_conversion(None).unwrap();

        let bytes = std::fs::read(&output).unwrap();
        // 4x the frame count at 4x the rate
        assert_eq!(
            u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]),
            176_400
        );
        let data_size = u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]);
        assert_eq!(data_size, 6 * 4 * 2 * 3);

        // Block k (k >= 1) carries input frame k-1, promoted by 8 bits, as
        // its 4th output frame
        let sample = |frame: usize, ch: usize| -> i32 {
            let i = 44 + (frame * 2 + ch) * 3;
            (i32::from(bytes[i]) | i32::from(bytes[i + 1]) << 8 | i32::from(bytes[i + 2]) << 16)
                << 8
                >> 8
        };
        for k in 1..6 {
            let expected = i32::from(samples[(k - 1) * 2]) * 256;
            assert_eq!(sample(k * 4 + 3, 0), expected);
            assert_eq!(sample(k * 4 + 3, 1), -expected);
        }

        std::fs::remove_file(&input).ok();
        std::fs::remove_file(&output).ok();
    }
}
