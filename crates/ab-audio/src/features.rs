use std::collections::VecDeque;

use ab_core::config::BeatTuning;

/// Mean power of a frame: mean of squared samples.
///
/// Non-finite samples count as silence. An empty frame has zero energy.
///
/// # Example
/// ```
/// use ab_audio::features::mean_power;
/// assert_eq!(mean_power(&[]), 0.0);
/// assert!((mean_power(&[0.5; 64]) - 0.25).abs() < 1e-12);
/// ```
#[must_use]
pub fn mean_power(frame: &[f64]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = frame
        .iter()
        .map(|&s| if s.is_finite() { s * s } else { 0.0 })
        .sum();
    let energy = sum_sq / frame.len() as f64;
    if energy.is_finite() { energy } else { 0.0 }
}

/// Bounded FIFO of the most recent frame energies.
///
/// # Example
/// ```
/// use ab_audio::features::EnergyHistory;
/// let mut history = EnergyHistory::new(2);
/// history.push(1.0);
/// history.push(2.0);
/// history.push(3.0);
/// assert_eq!(history.len(), 2);
/// assert!((history.mean() - 2.5).abs() < 1e-12);
/// ```
#[derive(Clone, Debug)]
pub struct EnergyHistory {
    values: VecDeque<f64>,
    capacity: usize,
}

impl EnergyHistory {
    /// History of at most `capacity` values (at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a value, evicting the oldest beyond capacity.
    pub fn push(&mut self, energy: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(energy);
    }

    /// Arithmetic mean of the held values, 0 when empty.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Number of values held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` before the first push.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Maximum number of values held.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget every value.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Per-frame output of [`FeatureExtractor::update`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameFeatures {
    /// Mean power of the frame.
    pub energy: f64,
    /// Sudden energy rise relative to the rolling baseline.
    pub beat: bool,
    /// Rolling mean the beat decision was compared against (current frame included).
    pub baseline: f64,
}

/// Energy and adaptive beat detection.
///
/// `beat = energy > floor && energy > mean(history) * sensitivity`, the history
/// including the current frame. Optional guard: no two beats closer than
/// `min_interval_frames` frames.
///
/// # Example
/// ```
/// use ab_audio::features::FeatureExtractor;
/// use ab_core::config::BeatTuning;
/// let mut extractor = FeatureExtractor::new(50, BeatTuning::default());
/// for _ in 0..49 {
///     assert!(!extractor.update(&[0.0; 1024]).beat);
/// }
/// assert!(extractor.update(&[1.0; 1024]).beat);
/// ```
pub struct FeatureExtractor {
    history: EnergyHistory,
    tuning: BeatTuning,
    /// Frames with audio seen so far.
    frame_count: u64,
    /// Frame number of the last beat.
    last_beat_frame: Option<u64>,
}

impl FeatureExtractor {
    /// Create an extractor with a rolling history of `history_len` energies.
    #[must_use]
    pub fn new(history_len: usize, tuning: BeatTuning) -> Self {
        Self {
            history: EnergyHistory::new(history_len),
            tuning,
            frame_count: 0,
            last_beat_frame: None,
        }
    }

    /// Current beat parameters.
    #[must_use]
    pub fn tuning(&self) -> BeatTuning {
        self.tuning
    }

    /// Replace beat parameters; the energy history is kept.
    pub fn set_tuning(&mut self, tuning: BeatTuning) {
        self.tuning = tuning;
    }

    /// Rolling energy history.
    #[must_use]
    pub fn history(&self) -> &EnergyHistory {
        &self.history
    }

    /// Compute energy and beat for one mono frame.
    ///
    /// Never fails. An empty frame yields zero energy, no beat, and leaves
    /// the history untouched.
    pub fn update(&mut self, frame: &[f64]) -> FrameFeatures {
        if frame.is_empty() {
            return FrameFeatures {
                energy: 0.0,
                beat: false,
                baseline: self.history.mean(),
            };
        }

        let energy = mean_power(frame);
        self.frame_count += 1;
        self.history.push(energy);
        let baseline = self.history.mean();

        let rising = energy > self.tuning.absolute_floor
            && energy > baseline * self.tuning.sensitivity;

        // Garde optionnelle entre deux beats
        let min_gap = u64::from(self.tuning.min_interval_frames);
        let spaced = match self.last_beat_frame {
            Some(last) if min_gap > 0 => self.frame_count - last >= min_gap,
            _ => true,
        };

        let beat = rising && spaced;
        if beat {
            self.last_beat_frame = Some(self.frame_count);
        }

        FrameFeatures {
            energy,
            beat,
            baseline,
        }
    }

    /// Forget history and beat timing.
    pub fn reset(&mut self) {
        self.history.clear();
        self.frame_count = 0;
        self.last_beat_frame = None;
    }
}
