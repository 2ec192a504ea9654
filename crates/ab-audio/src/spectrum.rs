use std::ops::Range;
use std::sync::Arc;

use ab_core::config::WindowFunction;
use ab_core::snapshot::BandMagnitudes;
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use crate::error::AudioError;

/// Added to magnitudes before taking the log so silence maps to -200 dB.
const DB_EPSILON: f64 = 1e-10;

/// Analyse spectrale : FFT réelle fenêtrée puis découpage en bandes.
///
/// Les buffers et le plan FFT sont pré-alloués pour une taille de frame donnée ;
/// un changement de taille re-planifie (seule allocation possible).
///
/// Convention de magnitude : `|X_k| / n`, n = longueur de la transformée.
///
/// # Example
/// ```
/// use ab_audio::spectrum::SpectralAnalyzer;
/// use ab_core::config::WindowFunction;
/// let mut analyzer = SpectralAnalyzer::new(8, WindowFunction::Hann);
/// let bands = analyzer.analyze(&[0.0; 1024]);
/// assert_eq!(bands.len(), 8);
/// assert!(bands.iter().all(|&b| b == 0.0));
/// ```
pub struct SpectralAnalyzer {
    band_count: usize,
    window_fn: WindowFunction,
    plan: Option<Arc<dyn RealToComplex<f64>>>,
    fft_size: usize,
    input_buf: Vec<f64>,
    spectrum_buf: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    /// Coefficients Hann (fenêtre configurée ou vue en dB).
    hann: Vec<f64>,
    /// Magnitudes de la dernière transformée (n/2 + 1 bins).
    magnitudes: Vec<f64>,
}

impl SpectralAnalyzer {
    /// Create an analyzer reporting `band_count` bands (at least 1).
    #[must_use]
    pub fn new(band_count: usize, window: WindowFunction) -> Self {
        Self {
            band_count: band_count.max(1),
            window_fn: window,
            plan: None,
            fft_size: 0,
            input_buf: Vec::new(),
            spectrum_buf: Vec::new(),
            scratch: Vec::new(),
            hann: Vec::new(),
            magnitudes: Vec::new(),
        }
    }

    /// Create an analyzer already planned for frames of `size` samples.
    #[must_use]
    pub fn with_size(band_count: usize, window: WindowFunction, size: usize) -> Self {
        let mut analyzer = Self::new(band_count, window);
        analyzer.prepare(size);
        analyzer
    }

    /// Number of bands produced by [`analyze`](Self::analyze).
    #[must_use]
    pub fn band_count(&self) -> usize {
        self.band_count
    }

    /// Transform length the analyzer is currently planned for (0 before the first frame).
    #[must_use]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Magnitudes of the last transform, `fft_size / 2 + 1` bins.
    #[must_use]
    pub fn magnitudes(&self) -> &[f64] {
        &self.magnitudes
    }

    /// Analyze `frame` into band magnitudes.
    ///
    /// Never fails: a transform error yields all-zero bands and is logged.
    pub fn analyze(&mut self, frame: &[f64]) -> BandMagnitudes {
        let mut bands = BandMagnitudes::zeroed(self.band_count);
        if let Err(e) = self.try_analyze_into(frame, &mut bands) {
            log::warn!("Analyse spectrale ignorée : {e}");
        }
        bands
    }

    /// Analyze `frame` into `bands`, reusing its allocation.
    ///
    /// On error `bands` is left all zero.
    ///
    /// # Errors
    /// Returns [`AudioError::TransientCompute`] if the transform fails.
    pub fn try_analyze_into(
        &mut self,
        frame: &[f64],
        bands: &mut BandMagnitudes,
    ) -> Result<(), AudioError> {
        if bands.len() != self.band_count {
            *bands = BandMagnitudes::zeroed(self.band_count);
        }
        bands.clear();
        if frame.is_empty() {
            return Ok(());
        }
        self.transform(frame, self.window_fn)?;
        fold_bands(&self.magnitudes, bands.as_mut_slice());
        Ok(())
    }

    /// Full-resolution spectrum in dB (`20·log10(mag + 1e-10)`), Hann-windowed.
    ///
    /// Returns `fft_size / 2 + 1` values; an empty frame or a failed
    /// transform returns an empty vector.
    ///
    /// # Example
    /// ```
    /// use ab_audio::spectrum::SpectralAnalyzer;
    /// use ab_core::config::WindowFunction;
    /// let mut analyzer = SpectralAnalyzer::new(8, WindowFunction::Rectangular);
    /// let db = analyzer.spectrum_db(&[0.0; 256]);
    /// assert_eq!(db.len(), 129);
    /// assert!(db.iter().all(|&v| (v + 200.0).abs() < 1e-9));
    /// ```
    pub fn spectrum_db(&mut self, frame: &[f64]) -> Vec<f64> {
        if frame.is_empty() {
            return Vec::new();
        }
        match self.transform(frame, WindowFunction::Hann) {
            Ok(()) => self
                .magnitudes
                .iter()
                .map(|&m| 20.0 * (m + DB_EPSILON).log10())
                .collect(),
            Err(e) => {
                log::warn!("Spectre dB ignoré : {e}");
                Vec::new()
            }
        }
    }

    /// (Re)plan for frames of `size` samples. No-op if already planned for it.
    fn prepare(&mut self, size: usize) {
        if size == 0 || (size == self.fft_size && self.plan.is_some()) {
            return;
        }
        let mut planner = RealFftPlanner::<f64>::new();
        let plan = planner.plan_fft_forward(size);
        self.input_buf = plan.make_input_vec();
        self.spectrum_buf = plan.make_output_vec();
        self.scratch = plan.make_scratch_vec();
        self.magnitudes = vec![0.0; self.spectrum_buf.len()];
        self.hann = hann_window(size);
        self.fft_size = size;
        self.plan = Some(plan);
        log::debug!("FFT planifiée pour {size} samples");
    }

    /// Window, transform and fill `self.magnitudes`.
    fn transform(&mut self, frame: &[f64], window_fn: WindowFunction) -> Result<(), AudioError> {
        self.prepare(frame.len());
        match window_fn {
            WindowFunction::Hann => {
                for ((slot, &s), &w) in self.input_buf.iter_mut().zip(frame).zip(&self.hann) {
                    *slot = finite_or_zero(s) * w;
                }
            }
            WindowFunction::Rectangular => {
                for (slot, &s) in self.input_buf.iter_mut().zip(frame) {
                    *slot = finite_or_zero(s);
                }
            }
        }
        self.run_plan()
    }

    fn run_plan(&mut self) -> Result<(), AudioError> {
        let Some(plan) = self.plan.as_ref() else {
            return Err(AudioError::TransientCompute("FFT non planifiée".into()));
        };

        if let Err(e) =
            plan.process_with_scratch(&mut self.input_buf, &mut self.spectrum_buf, &mut self.scratch)
        {
            self.magnitudes.fill(0.0);
            return Err(AudioError::TransientCompute(e.to_string()));
        }

        let n = self.fft_size as f64;
        let mut finite = true;
        for (mag, c) in self.magnitudes.iter_mut().zip(&self.spectrum_buf) {
            *mag = c.norm() / n;
            finite &= mag.is_finite();
        }
        // Samples finis mais énormes : la somme de la transformée déborde.
        if !finite {
            self.magnitudes.fill(0.0);
            return Err(AudioError::TransientCompute(
                "magnitudes non finies (débordement)".into(),
            ));
        }
        Ok(())
    }
}

/// Bins covered by `band` when `bins` magnitudes are split into `band_count` bands.
///
/// Bands are `bins / band_count` wide; the last band absorbs the remainder.
/// When there are fewer bins than bands, every band but the last is empty.
///
/// # Example
/// ```
/// use ab_audio::spectrum::band_range;
/// assert_eq!(band_range(0, 513, 8), 0..64);
/// assert_eq!(band_range(7, 513, 8), 448..513);
/// ```
#[must_use]
pub fn band_range(band: usize, bins: usize, band_count: usize) -> Range<usize> {
    let band_count = band_count.max(1);
    let size = bins / band_count;
    let start = (band * size).min(bins);
    let end = if band + 1 >= band_count {
        bins
    } else {
        ((band + 1) * size).min(bins)
    };
    start..end.max(start)
}

/// Mean magnitude of each band. Empty bands report 0.
pub fn fold_bands(magnitudes: &[f64], bands: &mut [f64]) {
    let count = bands.len();
    for (i, band) in bands.iter_mut().enumerate() {
        let range = band_range(i, magnitudes.len(), count);
        let width = range.len();
        *band = if width == 0 {
            0.0
        } else {
            magnitudes[range].iter().sum::<f64>() / width as f64
        };
    }
}

/// Centre frequency of bin `k` for a transform of `fft_size` samples.
#[inline]
#[must_use]
pub fn bin_frequency(k: usize, fft_size: usize, sample_rate: u32) -> f64 {
    if fft_size == 0 {
        return 0.0;
    }
    k as f64 * f64::from(sample_rate) / fft_size as f64
}

/// Nominal band holding frequency `hz`: `floor(hz / (nyquist / band_count))`,
/// clamped to the last band.
///
/// # Example
/// ```
/// use ab_audio::spectrum::band_for_frequency;
/// assert_eq!(band_for_frequency(1000.0, 44100, 8), 0);
/// assert_eq!(band_for_frequency(6000.0, 44100, 8), 2);
/// ```
#[must_use]
pub fn band_for_frequency(hz: f64, sample_rate: u32, band_count: usize) -> usize {
    let band_count = band_count.max(1);
    let nyquist = f64::from(sample_rate) / 2.0;
    if nyquist <= 0.0 || !hz.is_finite() || hz <= 0.0 {
        return 0;
    }
    ((hz / (nyquist / band_count as f64)) as usize).min(band_count - 1)
}

/// Symmetric Hann window of `size` coefficients.
fn hann_window(size: usize) -> Vec<f64> {
    if size <= 1 {
        return vec![1.0; size];
    }
    let denom = (size - 1) as f64;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / denom).cos()))
        .collect()
}

#[inline(always)]
fn finite_or_zero(s: f64) -> f64 {
    if s.is_finite() { s } else { 0.0 }
}
