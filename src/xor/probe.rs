//! Timing race that locates the start of a cache line inside a buffer.
//!
//! A writer thread hammers byte `o` while the calling thread reads byte `o + 8` for a fixed
//! window. The score of offset `o` is the number of reads the reader completes in that window;
//! the values it reads are not scored. When both bytes share a cache line the reader keeps
//! losing the line to the writer and completes fewer reads. Exactly 8 of the 64 candidate
//! offsets straddle a line boundary, so the read count peaks on a cyclic run of 8 offsets that
//! ends right before the line start.
//!
//! The signal depends on the hardware and on the scheduler. Without a second core, or on a noisy
//! machine, no clean run shows up and the probe gives up.

use log::trace;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Assumed size of a hardware cache line in bytes.
pub const CACHE_LINE_SIZE: usize = 64;

/// Distance between the written and the read byte.
const PARTNER_DISTANCE: usize = 8;
const READS_PER_CLOCK_CHECK: usize = 256;

/// Tuning of [`detect_cache_line_offset`].
///
/// # Examples
///
/// ```
/// use amq_filters::xor::ProbeConfig;
/// use std::time::Duration;
///
/// let config = ProbeConfig {
///     window: Duration::from_micros(100),
///     ..ProbeConfig::default()
/// };
/// assert_eq!(config.rounds, 4);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct ProbeConfig {
    /// How long the reader runs against each candidate offset.
    pub window: Duration,
    /// Races per offset whose read counts are summed before a verdict is attempted.
    pub trials_per_round: usize,
    /// Verdicts attempted before giving up.
    pub rounds: usize,
    /// Minimum ratio between the slowest offset of the fast run and the fastest offset outside it.
    pub min_separation: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            window: Duration::from_micros(200),
            trials_per_round: 3,
            rounds: 4,
            min_separation: 1.15,
        }
    }
}

/// Races one writer against one reader and returns the number of reads completed in `window`.
fn race(buffer: &[AtomicU8], offset: usize, window: Duration) -> u64 {
    let stop = AtomicBool::new(false);
    thread::scope(|scope| {
        scope.spawn(|| {
            let mut counter = 0u8;
            while !stop.load(Ordering::Relaxed) {
                counter = counter.wrapping_add(1);
                buffer[offset].store(counter, Ordering::Relaxed);
            }
        });

        let partner = &buffer[offset + PARTNER_DISTANCE];
        let mut reads = 0u64;
        let mut seen = 0u8;
        let start = Instant::now();
        while start.elapsed() < window {
            for _ in 0..READS_PER_CLOCK_CHECK {
                seen ^= partner.load(Ordering::Relaxed);
            }
            reads += READS_PER_CLOCK_CHECK as u64;
        }
        stop.store(true, Ordering::Relaxed);
        trace!("offset {}: {} reads (last {})", offset, reads, seen);
        reads
    })
}

/// Finds the line start from per-offset read counts.
///
/// Succeeds only if the 8 highest counts form one cyclic run and the slowest of them beats the
/// fastest remaining offset by `min_separation`.
pub(crate) fn find_line_start(
    scores: &[u64; CACHE_LINE_SIZE],
    min_separation: f64,
) -> Option<usize> {
    let mut ranked: Vec<usize> = (0..CACHE_LINE_SIZE).collect();
    ranked.sort_by(|a, b| scores[*b].cmp(&scores[*a]));

    let slowest_fast = scores[ranked[PARTNER_DISTANCE - 1]];
    let fastest_slow = scores[ranked[PARTNER_DISTANCE]];
    if (slowest_fast as f64) < (fastest_slow as f64) * min_separation {
        return None;
    }

    let mut fast = [false; CACHE_LINE_SIZE];
    for offset in &ranked[..PARTNER_DISTANCE] {
        fast[*offset] = true;
    }
    // The run starts at the only fast offset whose predecessor is slow.
    let mut starts = (0..CACHE_LINE_SIZE).filter(|offset| {
        fast[*offset] && !fast[(offset + CACHE_LINE_SIZE - 1) % CACHE_LINE_SIZE]
    });
    let run_start = starts.next()?;
    if starts.next().is_some() {
        return None;
    }
    Some((run_start + PARTNER_DISTANCE) % CACHE_LINE_SIZE)
}

/// Returns the offset into `buffer` at which a cache line starts, or `None` if the timing signal
/// was too weak.
///
/// Runs `64 * trials_per_round` races per round for at most `rounds` rounds.
///
/// # Panics
///
/// Panics if `buffer` is shorter than `CACHE_LINE_SIZE + 8` bytes.
pub fn detect_cache_line_offset(buffer: &[AtomicU8], config: &ProbeConfig) -> Option<usize> {
    assert!(
        buffer.len() >= CACHE_LINE_SIZE + PARTNER_DISTANCE,
        "probe buffer needs at least {} bytes",
        CACHE_LINE_SIZE + PARTNER_DISTANCE
    );
    let mut scores = [0u64; CACHE_LINE_SIZE];
    for round in 0..config.rounds {
        for _ in 0..config.trials_per_round {
            for (offset, score) in scores.iter_mut().enumerate() {
                *score += race(buffer, offset, config.window);
            }
        }
        if let Some(start) = find_line_start(&scores, config.min_separation) {
            trace!("cache line starts at offset {} after {} rounds", start, round + 1);
            return Some(start);
        }
        trace!("no clean cache line signal in round {}", round + 1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{
        detect_cache_line_offset, find_line_start, race, ProbeConfig, CACHE_LINE_SIZE,
        PARTNER_DISTANCE, READS_PER_CLOCK_CHECK,
    };
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::time::Duration;

    fn scores_with_fast_run(start: usize, len: usize) -> [u64; CACHE_LINE_SIZE] {
        let mut scores = [1_000; CACHE_LINE_SIZE];
        for i in 0..len {
            scores[(start + i) % CACHE_LINE_SIZE] = 2_000 + i as u64;
        }
        scores
    }

    #[test]
    fn test_find_line_start() {
        assert_eq!(find_line_start(&scores_with_fast_run(10, 8), 1.2), Some(18));
        assert_eq!(find_line_start(&scores_with_fast_run(56, 8), 1.2), Some(0));
        assert_eq!(find_line_start(&scores_with_fast_run(60, 8), 1.2), Some(4));
    }

    #[test]
    fn test_find_line_start_weak_signal() {
        let scores = scores_with_fast_run(10, 8);
        assert_eq!(find_line_start(&scores, 2.5), None);
        assert_eq!(find_line_start(&[1_000; CACHE_LINE_SIZE], 1.0001), None);
    }

    #[test]
    fn test_find_line_start_wrong_run_length() {
        assert_eq!(find_line_start(&scores_with_fast_run(10, 7), 1.2), None);
        assert_eq!(find_line_start(&scores_with_fast_run(10, 9), 1.2), None);
    }

    #[test]
    fn test_find_line_start_split_run() {
        let mut scores = scores_with_fast_run(10, 4);
        for offset in 30..34 {
            scores[offset] = 2_000;
        }
        assert_eq!(find_line_start(&scores, 1.2), None);
    }

    #[test]
    fn test_race_counts_reads() {
        let buffer: Vec<AtomicU8> = (0..CACHE_LINE_SIZE).map(|_| AtomicU8::new(0)).collect();
        let reads = race(&buffer, 3, Duration::from_millis(2));
        assert!(reads >= READS_PER_CLOCK_CHECK as u64);
        assert_eq!(reads % READS_PER_CLOCK_CHECK as u64, 0);
        // The reader only loads its byte.
        assert_eq!(buffer[3 + PARTNER_DISTANCE].load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_detect_terminates() {
        let buffer: Vec<AtomicU8> = (0..CACHE_LINE_SIZE * 2).map(|_| AtomicU8::new(0)).collect();
        let config = ProbeConfig {
            window: Duration::from_micros(20),
            trials_per_round: 1,
            rounds: 2,
            ..ProbeConfig::default()
        };
        if let Some(offset) = detect_cache_line_offset(&buffer, &config) {
            assert!(offset < CACHE_LINE_SIZE);
        }
    }

    #[test]
    #[should_panic(expected = "probe buffer needs")]
    fn test_detect_short_buffer() {
        let buffer: Vec<AtomicU8> = (0..10).map(|_| AtomicU8::new(0)).collect();
        detect_cache_line_offset(&buffer, &ProbeConfig::default());
    }
}
