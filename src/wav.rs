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

use crate::interpolator::CHANNELS;
use log::debug;
use std::error::Error;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const WAV_EXTENSIONS: [&str; 2] = ["wav", "wave"];

pub const INPUT_BIT_DEPTH: u32 = 16;
pub const OUTPUT_BIT_DEPTH: u32 = 24;

/// Largest magnitude representable at the output bit depth
pub const PEAK_LEVEL: i32 = (1 << (OUTPUT_BIT_DEPTH - 1)) - 1;

const INPUT_FRAME_BYTES: usize = CHANNELS * (INPUT_BIT_DEPTH as usize / 8);
const OUTPUT_SAMPLE_BYTES: usize = OUTPUT_BIT_DEPTH as usize / 8;

/// Chunked reader for 16-bit stereo PCM WAV input. Header fields are
/// parsed and validated once at open; audio data is then handed out as
/// interleaved i16 frames in caller-sized chunks.
#[derive(Debug)]
pub struct WavReader {
    reader: BufReader<File>,
    sample_rate: u32,
    total_frames: u64,
    frames_read: u64,
}

impl WavReader {
    pub fn open(path: &Path) -> Result<Self, Box<dyn Error>> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
        let mut reader = BufReader::new(file);

        let mut four = [0u8; 4];
        reader.read_exact(&mut four)?;
        if &four != b"RIFF" {
            return Err(format!("{}: not a RIFF file", path.display()).into());
        }
        reader.read_exact(&mut four)?; // overall size, unused
        reader.read_exact(&mut four)?;
        if &four != b"WAVE" {
            return Err(format!("{}: not a WAVE file", path.display()).into());
        }

        let mut fmt: Option<FmtChunk> = None;
        loop {
            let mut id = [0u8; 4];
            if reader.read_exact(&mut id).is_err() {
                return Err(
                    format!("{}: no data chunk found", path.display()).into()
                );
            }
            reader.read_exact(&mut four)?;
            let size = u32::from_le_bytes(four);

            match &id {
                b"fmt " => {
                    if size < 16 {
                        return Err(
                            format!("{}: malformed fmt chunk", path.display()).into()
                        );
                    }
                    let mut body = [0u8; 16];
                    reader.read_exact(&mut body)?;
                    fmt = Some(FmtChunk::parse(&body));
                    skip_bytes(&mut reader, padded(size) - 16)?;
                }
                b"data" => {
                    let Some(fmt) = fmt else {
                        return Err(format!(
                            "{}: data chunk before fmt chunk",
                            path.display()
                        )
                        .into());
                    };
                    fmt.validate(path)?;
                    let total_frames = u64::from(size) / INPUT_FRAME_BYTES as u64;
                    debug!(
                        "{}: {} Hz, {} frames",
                        path.display(),
                        fmt.sample_rate,
                        total_frames
                    );
                    return Ok(Self {
                        reader,
                        sample_rate: fmt.sample_rate,
                        total_frames,
                        frames_read: 0,
                    });
                }
                _ => skip_bytes(&mut reader, padded(size))?,
            }
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Read up to `max_frames` interleaved stereo frames. Returns an empty
    /// vector once all audio data has been consumed.
    pub fn read_chunk(&mut self, max_frames: usize) -> io::Result<Vec<i16>> {
        let remaining = (self.total_frames - self.frames_read) as usize;
        let frames = max_frames.min(remaining);
        if frames == 0 {
            return Ok(Vec::new());
        }

        let mut bytes = vec![0u8; frames * INPUT_FRAME_BYTES];
        self.reader.read_exact(&mut bytes)?;
        self.frames_read += frames as u64;

        Ok(bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect())
    }
}

// Chunks are word aligned; odd sizes carry one pad byte
fn padded(size: u32) -> u32 {
    size + (size & 1)
}

fn skip_bytes(reader: &mut BufReader<File>, count: u32) -> io::Result<()> {
    reader.seek_relative(i64::from(count))
}

struct FmtChunk {
    audio_format: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

impl FmtChunk {
    fn parse(body: &[u8; 16]) -> Self {
        Self {
            audio_format: u16::from_le_bytes([body[0], body[1]]),
            channels: u16::from_le_bytes([body[2], body[3]]),
            sample_rate: u32::from_le_bytes([body[4], body[5], body[6], body[7]]),
            bits_per_sample: u16::from_le_bytes([body[14], body[15]]),
        }
    }

    fn validate(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        if self.audio_format != 1 {
            return Err(
                format!("{}: only PCM WAV input is supported", path.display()).into()
            );
        }
        if self.channels as usize != CHANNELS {
            return Err(
                format!("{}: input must be stereo (2 channels)", path.display()).into()
            );
        }
        if u32::from(self.bits_per_sample) != INPUT_BIT_DEPTH {
            return Err(format!(
                "{}: input must be {}bit",
                path.display(),
                INPUT_BIT_DEPTH
            )
            .into());
        }
        Ok(())
    }
}

/// Accumulating 24-bit PCM WAV writer. Samples are collected per channel
/// and written out in one buffered pass on save.
#[derive(Debug)]
pub struct WavFile {
    samples: [Vec<i32>; CHANNELS],
    sample_rate: u32,
}

impl WavFile {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: [Vec::new(), Vec::new()],
            sample_rate,
        }
    }

    pub fn frames(&self) -> usize {
        self.samples[0].len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Round to the nearest integer (half away from zero), clip to the
    /// 24-bit range, and append. Returns true if the sample clipped.
    pub fn push_clipped(&mut self, channel: usize, sample: f64) -> bool {
        let value = my_round(sample);
        let clipped = value < -i64::from(PEAK_LEVEL) - 1 || value > i64::from(PEAK_LEVEL);
        let value = value.clamp(-i64::from(PEAK_LEVEL) - 1, i64::from(PEAK_LEVEL));
        self.samples[channel].push(value as i32);
        clipped
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::with_capacity(1 << 20, file);

        let frames = self.frames();
        let block_align = (CHANNELS * OUTPUT_SAMPLE_BYTES) as u16;
        let data_size = (frames * CHANNELS * OUTPUT_SAMPLE_BYTES) as u32;

        // RIFF header
        w.write_all(b"RIFF")?;
        w.write_all(&(data_size + 36).to_le_bytes())?;
        w.write_all(b"WAVE")?;

        // fmt chunk
        w.write_all(b"fmt ")?;
        w.write_all(&16u32.to_le_bytes())?;
        w.write_all(&1u16.to_le_bytes())?; // PCM
        w.write_all(&(CHANNELS as u16).to_le_bytes())?;
        w.write_all(&self.sample_rate.to_le_bytes())?;
        let byte_rate = self.sample_rate * u32::from(block_align);
        w.write_all(&byte_rate.to_le_bytes())?;
        w.write_all(&block_align.to_le_bytes())?;
        w.write_all(&(OUTPUT_BIT_DEPTH as u16).to_le_bytes())?;

        // data chunk
        w.write_all(b"data")?;
        w.write_all(&data_size.to_le_bytes())?;

        // Stream frames in blocks to keep the temporary buffer small
        const FRAME_BLOCK: usize = 16_384;
        let mut buf: Vec<u8> = Vec::with_capacity(FRAME_BLOCK * block_align as usize);
        for base in (0..frames).step_by(FRAME_BLOCK) {
            buf.clear();
            let end = (base + FRAME_BLOCK).min(frames);
            for i in base..end {
                for ch in 0..CHANNELS {
                    let v = self.samples[ch][i];
                    buf.extend_from_slice(&[
                        (v & 0xFF) as u8,
                        ((v >> 8) & 0xFF) as u8,
                        ((v >> 16) & 0xFF) as u8,
                    ]);
                }
            }
            w.write_all(&buf)?;
        }

        w.flush()
    }
}

fn my_round(x: f64) -> i64 {
    if x < 0.0 { (x - 0.5) as i64 } else { (x + 0.5) as i64 }
}

/// Find all WAV files in the provided paths, optionally recursing into
/// directories
pub fn find_wav_files(
    paths: &[PathBuf],
    recurse: bool,
) -> io::Result<Vec<PathBuf>> {
    let mut file_paths = Vec::new();
    for path in paths {
        if path.is_dir() {
            if recurse {
                let entries: Vec<PathBuf> = fs::read_dir(path)?
                    .filter_map(|e| e.ok().map(|d| d.path()))
                    .collect();
                file_paths.extend(find_wav_files(&entries, recurse)?);
            } else {
                // Non-recursive: include only top-level files that are WAV
                for entry in fs::read_dir(path)? {
                    let entry_path = entry?.path();
                    if entry_path.is_file() && is_wav_file(&entry_path) {
                        file_paths.push(entry_path.canonicalize()?);
                    }
                }
            }
        } else if path.is_file() && is_wav_file(path) {
            file_paths.push(path.canonicalize()?);
        }
    }
    file_paths.sort();
    file_paths.dedup();
    Ok(file_paths)
}

/// Check if the provided path is a WAV file based on its extension
pub fn is_wav_file(path: &Path) -> bool {
    if path.is_file()
        && let Some(ext) = path.extension()
        && let ext_lower = ext.to_ascii_lowercase().to_string_lossy().to_string()
        && WAV_EXTENSIONS.contains(&ext_lower.as_str())
    {
        return true;
    }
    false
}
