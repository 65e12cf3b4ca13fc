//! Streaming 4x interpolation engine.
//!
//! Consumes interleaved stereo chunks at the base rate and produces the
//! 4x-rate stream: between every pair of consecutive input samples, three
//! new samples are synthesized from a per-channel window of the 9 most
//! recently emitted output samples plus the pair itself, and the earlier
//! input sample of the pair is passed through unchanged as the fourth
//! output sample. The last input frame of every chunk is carried into the
//! next call, so chunk boundaries are invisible: any partition of a stream
//! produces identical output.
//!
//! The first output block of a fresh stream is computed against an
//! all-zero window and a zero carry frame, which produces a short startup
//! transient. This is accepted and never corrected mid-stream.

use crate::spline;
use core::fmt;

pub const CHANNELS: usize = 2;
pub const UPSAMPLE_RATIO: usize = 4;
pub const HISTORY_LEN: usize = 9;

/// Interpolation policy, fixed for the lifetime of an engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Cubic,
    Akima,
    Pchip,
    Hold,
}

impl Method {
    /// Map a one-character CLI selector to a method. Unknown selectors are
    /// a fatal configuration error, never a silent fallback.
    pub fn from_selector(selector: char) -> Result<Self, InterpolatorError> {
        match selector.to_ascii_lowercase() {
            'c' => Ok(Method::Cubic),
            'a' => Ok(Method::Akima),
            'p' => Ok(Method::Pchip),
            'h' => Ok(Method::Hold),
            other => Err(InterpolatorError::InvalidConfiguration(format!(
                "unknown interpolation method '{}'; must be C, A, P, or H",
                other
            ))),
        }
    }
}

#[derive(Debug)]
pub enum InterpolatorError {
    InvalidConfiguration(String),
}

impl fmt::Display for InterpolatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpolatorError::InvalidConfiguration(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for InterpolatorError {}

/// Per-channel rolling window of the 9 most recently emitted output
/// samples, occupying positions 1-9 of the interpolation node axis.
#[derive(Debug, Clone)]
struct HistoryWindow {
    samples: [[f64; HISTORY_LEN]; CHANNELS],
}

impl HistoryWindow {
    fn new() -> Self {
        Self {
            samples: [[0.0; HISTORY_LEN]; CHANNELS],
        }
    }

    fn reset(&mut self) {
        self.samples = [[0.0; HISTORY_LEN]; CHANNELS];
    }

    /// Drop the oldest 4 samples and append the 4 just emitted, per channel.
    fn advance(&mut self, channel: usize, block: &[f64; UPSAMPLE_RATIO]) {
        let chan = &mut self.samples[channel];
        chan.copy_within(UPSAMPLE_RATIO.., 0);
        chan[HISTORY_LEN - UPSAMPLE_RATIO..].copy_from_slice(block);
    }
}

/// Stateful chunk-at-a-time upsampler. One instance per stream; not safe
/// for concurrent submissions, since the window and carry frame mutate
/// with every pair.
#[derive(Debug)]
pub struct Interpolator {
    method: Method,
    history: HistoryWindow,
    carry: [f64; CHANNELS],
}

impl Interpolator {
    pub fn new(selector: char) -> Result<Self, InterpolatorError> {
        Ok(Self::with_method(Method::from_selector(selector)?))
    }

    pub fn with_method(method: Method) -> Self {
        Self {
            method,
            history: HistoryWindow::new(),
            carry: [0.0; CHANNELS],
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Return to the stream-start state: zero window, zero carry frame.
    pub fn reset(&mut self) {
        self.history.reset();
        self.carry = [0.0; CHANNELS];
    }

    /// Upsample one interleaved stereo chunk by 4x. Output length is
    /// exactly 4x the input length; an empty chunk yields an empty chunk
    /// and leaves all state untouched.
    pub fn process_chunk(&mut self, chunk: &[f64]) -> Vec<f64> {
        debug_assert_eq!(chunk.len() % CHANNELS, 0);
        if chunk.is_empty() {
            return Vec::new();
        }

        let frame_count = chunk.len() / CHANNELS;
        let mut output = vec![0.0; chunk.len() * UPSAMPLE_RATIO];

        // Working sequence: the carried frame followed by this chunk's
        // frames. Each consecutive pair yields one 4-sample output block
        // per channel, and the window advances immediately so the next
        // pair sees it.
        let mut current = self.carry;
        for i in 0..frame_count {
            let next = [chunk[i * CHANNELS], chunk[i * CHANNELS + 1]];
            let base = i * UPSAMPLE_RATIO * CHANNELS;
            for ch in 0..CHANNELS {
                let block = self.interpolate_pair(ch, current[ch], next[ch]);
                for (j, &value) in block.iter().enumerate() {
                    output[base + j * CHANNELS + ch] = value;
                }
                self.history.advance(ch, &block);
            }
            current = next;
        }
        self.carry = current;

        output
    }

    /// One output block for one channel: the three interpolated samples at
    /// node positions 10-12 followed by the pair's earlier sample, passed
    /// through bit-exact.
    fn interpolate_pair(&self, channel: usize, earlier: f64, later: f64) -> [f64; UPSAMPLE_RATIO] {
        if self.method == Method::Hold {
            // Zero-order hold: no node set, no spline
            return [earlier; UPSAMPLE_RATIO];
        }

        let mut nodes = [0.0; spline::NODE_COUNT];
        nodes[..HISTORY_LEN].copy_from_slice(&self.history.samples[channel]);
        nodes[HISTORY_LEN] = earlier;
        nodes[HISTORY_LEN + 1] = later;

        let interp = match self.method {
            Method::Cubic => spline::natural_cubic(&nodes),
            Method::Akima => spline::akima(&nodes),
            Method::Pchip => spline::pchip(&nodes),
            Method::Hold => unreachable!(),
        };
        [interp[0], interp[1], interp[2], earlier]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METHODS: [Method; 4] =
        [Method::Cubic, Method::Akima, Method::Pchip, Method::Hold];

    // Interleave two per-channel sample slices into a stereo chunk
    fn interleave(left: &[f64], right: &[f64]) -> Vec<f64> {
        left.iter()
            .zip(right.iter())
            .flat_map(|(&l, &r)| [l, r])
            .collect()
    }

    fn test_signal(frames: usize) -> Vec<f64> {
        let left: Vec<f64> = (0..frames).map(|i| (i as f64 * 0.7).sin() * 1000.0).collect();
        let right: Vec<f64> = (0..frames).map(|i| (i as f64 * 1.3).cos() * 500.0).collect();
        interleave(&left, &right)
    }

    #[test]
    fn output_is_four_times_the_input_length() {
        for method in ALL_METHODS {
            let mut engine = Interpolator::with_method(method);
            let out = engine.process_chunk(&test_signal(17));
            assert_eq!(out.len(), 17 * CHANNELS * UPSAMPLE_RATIO);
        }
    }

    #[test]
    fn empty_chunk_is_a_no_op() {
        let mut engine = Interpolator::with_method(Method::Cubic);
        let first = engine.process_chunk(&test_signal(4));
        assert_eq!(engine.process_chunk(&[]), Vec::<f64>::new());

        // State must be untouched: continuing afterwards matches a stream
        // that never saw the empty call.
        let continued = engine.process_chunk(&test_signal(4));

        let mut reference = Interpolator::with_method(Method::Cubic);
        let mut expected = reference.process_chunk(&test_signal(4));
        expected.extend(reference.process_chunk(&test_signal(4)));

        let mut got = first;
        got.extend(continued);
        assert_eq!(got, expected);
    }

    #[test]
    fn originals_pass_through_unchanged() {
        let input = test_signal(12);
        for method in ALL_METHODS {
            let mut engine = Interpolator::with_method(method);
            let out = engine.process_chunk(&input);
            for ch in 0..CHANNELS {
                // Block 0 passes through the zero carry frame; block k
                // passes through input frame k-1.
                assert_eq!(out[3 * CHANNELS + ch], 0.0);
                for k in 1..12 {
                    let passthrough = out[(k * UPSAMPLE_RATIO + 3) * CHANNELS + ch];
                    let original = input[(k - 1) * CHANNELS + ch];
                    assert_eq!(passthrough, original, "method {:?} block {}", method, k);
                }
            }
        }
    }

    #[test]
    fn hold_repeats_each_sample_exactly() {
        let input = test_signal(8);
        let mut engine = Interpolator::with_method(Method::Hold);
        let out = engine.process_chunk(&input);
        for ch in 0..CHANNELS {
            for k in 0..8 {
                // Block k replicates the earlier frame of its pair
                let expected = if k == 0 { 0.0 } else { input[(k - 1) * CHANNELS + ch] };
                for j in 0..UPSAMPLE_RATIO {
                    assert_eq!(out[(k * UPSAMPLE_RATIO + j) * CHANNELS + ch], expected);
                }
            }
        }
    }

    #[test]
    fn chunk_boundaries_are_invisible() {
        let input = test_signal(6);
        for method in ALL_METHODS {
            let mut whole = Interpolator::with_method(method);
            let expected = whole.process_chunk(&input);

            // One frame at a time
            let mut split = Interpolator::with_method(method);
            let mut got = Vec::new();
            for frame in input.chunks_exact(CHANNELS) {
                got.extend(split.process_chunk(frame));
            }
            assert_eq!(got, expected, "method {:?}, 6x1 split", method);

            // Uneven partition
            let mut split = Interpolator::with_method(method);
            let mut got = split.process_chunk(&input[..2 * CHANNELS]);
            got.extend(split.process_chunk(&input[2 * CHANNELS..3 * CHANNELS]));
            got.extend(split.process_chunk(&input[3 * CHANNELS..]));
            assert_eq!(got, expected, "method {:?}, 2+1+3 split", method);
        }
    }

    #[test]
    fn identical_input_produces_identical_output() {
        let input = test_signal(20);
        for method in ALL_METHODS {
            let mut a = Interpolator::with_method(method);
            let mut b = Interpolator::with_method(method);
            assert_eq!(a.process_chunk(&input), b.process_chunk(&input));
        }
    }

    #[test]
    fn reset_matches_a_fresh_instance() {
        let input = test_signal(10);
        for method in ALL_METHODS {
            let mut fresh = Interpolator::with_method(method);
            let expected = fresh.process_chunk(&input);

            let mut reused = Interpolator::with_method(method);
            reused.process_chunk(&test_signal(23));
            reused.reset();
            assert_eq!(reused.process_chunk(&input), expected, "method {:?}", method);
        }
    }

    #[test]
    fn collinear_stream_continues_the_line_exactly() {
        // Seed the window and carry on per-channel lines (one output slot
        // apart in the window, four apart between input samples), then feed
        // inputs continuing those lines. Every interpolating method must
        // reproduce the lines exactly; values are binary fractions so the
        // arithmetic is exact in f64.
        for method in [Method::Cubic, Method::Akima, Method::Pchip] {
            let mut engine = Interpolator::with_method(method);
            for slot in 0..HISTORY_LEN {
                let x = (slot + 1) as f64;
                engine.history.samples[0][slot] = x;
                engine.history.samples[1][slot] = 0.5 * x + 2.0;
            }
            engine.carry = [13.0, 0.5 * 13.0 + 2.0];

            let frames = 5;
            let chunk: Vec<f64> = (0..frames)
                .flat_map(|i| {
                    let x = (17 + 4 * i) as f64;
                    [x, 0.5 * x + 2.0]
                })
                .collect();
            let out = engine.process_chunk(&chunk);

            for j in 0..frames * UPSAMPLE_RATIO {
                let x = (10 + j) as f64;
                assert_eq!(out[j * CHANNELS], x, "method {:?} left sample {}", method, j);
                assert_eq!(
                    out[j * CHANNELS + 1],
                    0.5 * x + 2.0,
                    "method {:?} right sample {}",
                    method,
                    j
                );
            }
        }
    }

    #[test]
    fn unknown_selector_is_rejected_at_construction() {
        assert!(matches!(
            Interpolator::new('z'),
            Err(InterpolatorError::InvalidConfiguration(_))
        ));
        // Selectors are case-insensitive like the rest of the CLI
        assert!(Interpolator::new('C').is_ok());
        assert!(Interpolator::new('h').is_ok());
    }
}
