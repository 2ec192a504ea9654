use std::fmt;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ab_core::clock::StreamClock;
use ab_core::config::{BeatTuning, PipelineConfig, WindowFunction};
use ab_core::snapshot::{BandMagnitudes, FeatureSnapshot};
use ab_core::traits::{FrameSink, SnapshotSource};
use arc_swap::ArcSwap;

use crate::features::FeatureExtractor;
use crate::mono::{FrameShape, downmix_into};
use crate::ring::{RingBuffer, RingReader, RingWriter};
use crate::spectrum::SpectralAnalyzer;

/// Anomalies on the capture path are logged on the first occurrence and then
/// once every this many.
const LOG_EVERY: u64 = 256;

/// Compteurs du pipeline, lisibles depuis n'importe quel thread.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames: AtomicU64,
    sanitized: AtomicU64,
    compute_errors: AtomicU64,
    rate_changes: AtomicU64,
}

impl PipelineStats {
    /// Frames analyzed and published.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Frames that needed repair (bad shape, non-finite or empty).
    #[must_use]
    pub fn sanitized(&self) -> u64 {
        self.sanitized.load(Ordering::Relaxed)
    }

    /// Frames whose spectrum was replaced by zeros after a transform failure.
    #[must_use]
    pub fn compute_errors(&self) -> u64 {
        self.compute_errors.load(Ordering::Relaxed)
    }

    /// Times the source switched sample rate.
    #[must_use]
    pub fn rate_changes(&self) -> u64 {
        self.rate_changes.load(Ordering::Relaxed)
    }
}

/// Count an anomaly and log it without flooding the real-time thread.
fn note_anomaly(counter: &AtomicU64, what: fmt::Arguments<'_>) {
    let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
    if n == 1 || n % LOG_EVERY == 0 {
        log::warn!("{what} ({n} au total)");
    }
}

/// Point d'intégration unique appelé une fois par frame capturée.
///
/// Seul écrivain du ring buffer, de l'historique d'énergie et du snapshot publié.
/// La publication est un échange de pointeur (`ArcSwap`) : un lecteur voit
/// l'ancien snapshot ou le nouveau, jamais un mélange.
///
/// La fenêtre analysée est la frame entrante, ou les `analysis_size` derniers
/// samples du ring si l'option est définie.
///
/// # Example
/// ```
/// use ab_audio::pipeline::AudioPipeline;
/// use ab_core::config::PipelineConfig;
///
/// let (mut pipeline, reader) = AudioPipeline::new(&PipelineConfig::default());
/// assert!(reader.read_snapshot().is_initial());
/// pipeline.ingest(&[0.0; 1024]);
/// assert_eq!(reader.read_snapshot().frame_index, 1);
/// ```
pub struct AudioPipeline {
    ring: RingWriter,
    analyzer: SpectralAnalyzer,
    extractor: FeatureExtractor,
    published: Arc<ArcSwap<FeatureSnapshot>>,
    tuning: Arc<ArcSwap<BeatTuning>>,
    clock: Arc<StreamClock>,
    stats: Arc<PipelineStats>,
    analysis_size: Option<usize>,
    waveform_len: usize,
    band_count: usize,
    /// Frame mono courante (réutilisée).
    mono_buf: Vec<f64>,
    /// Fenêtre tirée du ring quand `analysis_size` est défini.
    window_buf: Vec<f64>,
    frame_index: u64,
}

/// Consumer handle: cloneable, `Send + Sync`, never blocks the producer.
#[derive(Clone)]
pub struct SnapshotReader {
    published: Arc<ArcSwap<FeatureSnapshot>>,
    ring: RingReader,
    tuning: Arc<ArcSwap<BeatTuning>>,
    clock: Arc<StreamClock>,
    stats: Arc<PipelineStats>,
}

impl AudioPipeline {
    /// Build the pipeline and its first reader from `config`.
    #[must_use]
    pub fn new(config: &PipelineConfig) -> (Self, SnapshotReader) {
        let (ring, ring_reader) = RingBuffer::new(config.ring_capacity());
        let frame_len = config.analysis_size.unwrap_or(config.buffer_size);
        let analyzer = SpectralAnalyzer::with_size(config.band_count, config.window, frame_len);
        let band_count = analyzer.band_count();
        let tuning = config.beat_tuning();

        let published = Arc::new(ArcSwap::from_pointee(FeatureSnapshot::silent(
            band_count,
            config.waveform_len,
        )));
        let tuning_handle = Arc::new(ArcSwap::from_pointee(tuning));
        let clock = Arc::new(StreamClock::new(config.sample_rate));
        let stats = Arc::new(PipelineStats::default());

        let reader = SnapshotReader {
            published: Arc::clone(&published),
            ring: ring_reader,
            tuning: Arc::clone(&tuning_handle),
            clock: Arc::clone(&clock),
            stats: Arc::clone(&stats),
        };

        let pipeline = Self {
            ring,
            analyzer,
            extractor: FeatureExtractor::new(config.energy_history_length, tuning),
            published,
            tuning: tuning_handle,
            clock,
            stats,
            analysis_size: config.analysis_size,
            waveform_len: config.waveform_len,
            band_count,
            mono_buf: Vec::with_capacity(config.buffer_size),
            window_buf: Vec::with_capacity(config.analysis_size.unwrap_or(0)),
            frame_index: 0,
        };

        (pipeline, reader)
    }

    /// Another consumer handle on this pipeline.
    #[must_use]
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            published: Arc::clone(&self.published),
            ring: self.ring.reader(),
            tuning: Arc::clone(&self.tuning),
            clock: Arc::clone(&self.clock),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Shared stream clock (also used by capture for cooperative shutdown).
    #[must_use]
    pub fn clock(&self) -> &Arc<StreamClock> {
        &self.clock
    }

    /// Ingest one mono frame.
    ///
    /// Bounded work, never fails, never blocks on a consumer. Non-finite
    /// samples are treated as silence; an empty frame is counted and ignored.
    pub fn ingest(&mut self, frame: &[f64]) {
        let mut mono = mem::take(&mut self.mono_buf);
        let shape = downmix_into(frame, 1, &mut mono);
        self.process(&mono, shape);
        self.mono_buf = mono;
    }

    fn process(&mut self, mono: &[f64], shape: FrameShape) {
        if mono.is_empty() {
            note_anomaly(&self.stats.sanitized, format_args!("Frame vide ignorée"));
            return;
        }
        if shape.was_sanitized() {
            note_anomaly(&self.stats.sanitized, format_args!("Frame malformée assainie"));
        }

        let tuning = **self.tuning.load();
        if tuning != self.extractor.tuning() {
            self.extractor.set_tuning(tuning);
        }

        self.ring.append(mono);

        let mut bands = BandMagnitudes::zeroed(self.band_count);
        let analyzed = match self.analysis_size {
            Some(n) => {
                self.ring.latest_into(&mut self.window_buf, n);
                self.analyzer.try_analyze_into(&self.window_buf, &mut bands)
            }
            None => self.analyzer.try_analyze_into(mono, &mut bands),
        };
        if analyzed.is_err() {
            note_anomaly(
                &self.stats.compute_errors,
                format_args!("Spectre remplacé par des zéros"),
            );
        }

        let features = self.extractor.update(mono);

        self.frame_index += 1;
        self.clock.advance(mono.len() as u64);

        let snapshot = FeatureSnapshot {
            frame_index: self.frame_index,
            timestamp: self.clock.pos_secs(),
            energy: features.energy,
            beat: features.beat,
            baseline: features.baseline,
            bands,
            raw_frame_tail: self.ring.snapshot_padded(self.waveform_len),
        };
        self.published.store(Arc::new(snapshot));
        self.stats.frames.fetch_add(1, Ordering::Relaxed);
    }
}

impl FrameSink for AudioPipeline {
    fn on_frame(&mut self, samples: &[f64], channels: u16, sample_rate: u32) {
        if sample_rate > 0 && sample_rate != self.clock.sample_rate() {
            note_anomaly(
                &self.stats.rate_changes,
                format_args!(
                    "Sample rate de la source : {sample_rate}Hz (attendu {}Hz)",
                    self.clock.sample_rate()
                ),
            );
            self.clock.set_sample_rate(sample_rate);
        }

        let mut mono = mem::take(&mut self.mono_buf);
        let shape = downmix_into(samples, channels, &mut mono);
        self.process(&mono, shape);
        self.mono_buf = mono;
    }
}

impl SnapshotReader {
    /// Latest complete snapshot. Wait-free for practical purposes, never blocks the producer.
    #[must_use]
    pub fn read_snapshot(&self) -> Arc<FeatureSnapshot> {
        self.published.load_full()
    }

    /// The latest `width` mono samples, left zero-padded.
    #[must_use]
    pub fn waveform(&self, width: usize) -> Vec<f64> {
        self.ring.snapshot_padded(width)
    }

    /// Full-resolution dB spectrum of the latest `width` samples (Hann window).
    ///
    /// Plans a transform on each call: meant for display cadence, not the capture path.
    #[must_use]
    pub fn spectrum_db(&self, width: usize) -> Vec<f64> {
        let window = self.ring.snapshot_padded(width);
        SpectralAnalyzer::new(1, WindowFunction::Hann).spectrum_db(&window)
    }

    /// Read access to the rolling sample window.
    #[must_use]
    pub fn ring(&self) -> &RingReader {
        &self.ring
    }

    /// Current beat parameters.
    #[must_use]
    pub fn tuning(&self) -> BeatTuning {
        **self.tuning.load()
    }

    /// Publish new beat parameters; the producer picks them up on its next frame.
    pub fn set_tuning(&self, tuning: BeatTuning) {
        self.tuning.store(Arc::new(tuning));
    }

    /// Pipeline counters.
    #[must_use]
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Shared stream clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<StreamClock> {
        &self.clock
    }
}

impl SnapshotSource for SnapshotReader {
    fn read_snapshot(&self) -> Arc<FeatureSnapshot> {
        SnapshotReader::read_snapshot(self)
    }
}
