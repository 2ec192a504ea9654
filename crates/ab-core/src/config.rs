use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Configuration complète du pipeline d'analyse.
///
/// Sérialisable en TOML. Chaque champ a une valeur par défaut saine.
///
/// # Example
/// ```
/// use ab_core::config::PipelineConfig;
/// let config = PipelineConfig::default();
/// assert_eq!(config.sample_rate, 44100);
/// assert_eq!(config.band_count, 8);
/// ```
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PipelineConfig {
    // === Capture ===
    /// Sample rate demandé au périphérique (Hz).
    pub sample_rate: u32,
    /// Taille d'une frame, en samples par canal.
    pub buffer_size: usize,
    /// Sous-chaîne du nom de périphérique à utiliser. Prioritaire sur la stratégie.
    pub device: Option<String>,
    /// Index du périphérique dans `list_devices()`. Prioritaire sur `device`.
    pub device_index: Option<usize>,
    /// Stratégie de sélection quand aucun périphérique n'est nommé.
    pub device_strategy: DeviceStrategy,
    /// Durée de la fenêtre glissante conservée dans le ring buffer (secondes).
    pub ring_seconds: f32,

    // === Analyse ===
    /// Nombre de bandes de fréquence publiées.
    pub band_count: usize,
    /// Fenêtre appliquée avant la FFT.
    pub window: WindowFunction,
    /// Taille de la fenêtre d'analyse tirée du ring buffer.
    /// `None` = analyser la frame entrante telle quelle.
    pub analysis_size: Option<usize>,
    /// Largeur de la forme d'onde publiée dans chaque snapshot.
    pub waveform_len: usize,

    // === Beat ===
    /// Nombre d'énergies conservées pour la moyenne glissante.
    pub energy_history_length: usize,
    /// Plancher absolu d'énergie sous lequel aucun beat n'est déclenché.
    pub beat_absolute_floor: f64,
    /// Ratio minimal entre l'énergie courante et la moyenne glissante.
    pub beat_sensitivity_factor: f64,
    /// Nombre minimal de frames entre deux beats. 0 = désactivé.
    pub beat_min_interval_frames: u32,
}

/// How the capture device is chosen when none is named explicitly.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum DeviceStrategy {
    /// Host default input device.
    Default,
    /// Prefer loopback-like inputs (stereo mix, monitor...), then the default.
    #[default]
    Loopback,
}

/// Window function applied to a frame before the forward transform.
///
/// # Example
/// ```
/// use ab_core::config::WindowFunction;
/// assert_eq!(WindowFunction::default(), WindowFunction::Hann);
/// ```
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum WindowFunction {
    /// Hann window (reduces spectral leakage).
    #[default]
    Hann,
    /// No windowing.
    Rectangular,
}

/// Beat detection parameters that may change while the pipeline runs.
///
/// # Example
/// ```
/// use ab_core::config::{BeatTuning, PipelineConfig};
/// let tuning = PipelineConfig::default().beat_tuning();
/// assert_eq!(tuning, BeatTuning::default());
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BeatTuning {
    /// Energy floor; beats never fire at or below it.
    pub absolute_floor: f64,
    /// Ratio over the rolling baseline required for a beat.
    pub sensitivity: f64,
    /// Minimum frames between two beats. 0 disables the guard.
    pub min_interval_frames: u32,
}

impl Default for BeatTuning {
    fn default() -> Self {
        Self {
            absolute_floor: 0.02,
            sensitivity: 1.5,
            min_interval_frames: 0,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let tuning = BeatTuning::default();
        Self {
            sample_rate: 44100,
            buffer_size: 1024,
            device: None,
            device_index: None,
            device_strategy: DeviceStrategy::Loopback,
            ring_seconds: 2.0,
            band_count: 8,
            window: WindowFunction::Hann,
            analysis_size: None,
            waveform_len: 1024,
            energy_history_length: 50,
            beat_absolute_floor: tuning.absolute_floor,
            beat_sensitivity_factor: tuning.sensitivity,
            beat_min_interval_frames: tuning.min_interval_frames,
        }
    }
}

impl PipelineConfig {
    /// Clamp all numeric fields to their valid ranges.
    /// Called after TOML deserialization to prevent out-of-range values.
    pub fn clamp_all(&mut self) {
        self.sample_rate = self.sample_rate.clamp(8_000, 384_000);
        self.buffer_size = self.buffer_size.clamp(32, 16_384);
        self.ring_seconds = self.ring_seconds.clamp(0.1, 30.0);
        self.band_count = self.band_count.clamp(1, 64);
        self.analysis_size = self.analysis_size.map(|n| n.clamp(32, 65_536));
        self.waveform_len = self.waveform_len.clamp(1, 65_536);
        self.energy_history_length = self.energy_history_length.clamp(1, 1024);
        self.beat_absolute_floor = self.beat_absolute_floor.clamp(0.0, 1.0);
        self.beat_sensitivity_factor = self.beat_sensitivity_factor.clamp(1.0, 10.0);
        self.beat_min_interval_frames = self.beat_min_interval_frames.min(1000);
    }

    /// Reject values that clamping cannot repair.
    ///
    /// # Errors
    /// Returns [`CoreError::OutOfRange`] for non-finite floats.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.ring_seconds.is_finite() {
            return Err(CoreError::OutOfRange {
                field: "ring_seconds",
                value: self.ring_seconds.to_string(),
            });
        }
        if !self.beat_absolute_floor.is_finite() {
            return Err(CoreError::OutOfRange {
                field: "beat_absolute_floor",
                value: self.beat_absolute_floor.to_string(),
            });
        }
        if !self.beat_sensitivity_factor.is_finite() {
            return Err(CoreError::OutOfRange {
                field: "beat_sensitivity_factor",
                value: self.beat_sensitivity_factor.to_string(),
            });
        }
        Ok(())
    }

    /// Beat parameters extracted from this config.
    #[must_use]
    pub fn beat_tuning(&self) -> BeatTuning {
        BeatTuning {
            absolute_floor: self.beat_absolute_floor,
            sensitivity: self.beat_sensitivity_factor,
            min_interval_frames: self.beat_min_interval_frames,
        }
    }

    /// Ring buffer capacity in samples.
    ///
    /// Always large enough to hold one frame, one analysis window and one waveform tail.
    ///
    /// # Example
    /// ```
    /// use ab_core::config::PipelineConfig;
    /// let config = PipelineConfig::default();
    /// assert_eq!(config.ring_capacity(), 88200);
    /// ```
    #[must_use]
    pub fn ring_capacity(&self) -> usize {
        let rolling = (f64::from(self.sample_rate) * f64::from(self.ring_seconds)) as usize;
        rolling
            .max(self.buffer_size)
            .max(self.analysis_size.unwrap_or(0))
            .max(self.waveform_len)
    }

    /// Real-time budget of one frame, in seconds.
    #[must_use]
    pub fn frame_duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.buffer_size as f64 / f64::from(self.sample_rate)
    }
}

/// Structure TOML intermédiaire pour désérialisation avec valeurs optionnelles.
#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    capture: Option<CaptureSection>,
    #[serde(default)]
    analysis: Option<AnalysisSection>,
    #[serde(default)]
    beat: Option<BeatSection>,
}

/// Capture section, all fields optional for partial override.
#[derive(Deserialize)]
struct CaptureSection {
    sample_rate: Option<u32>,
    buffer_size: Option<usize>,
    device: Option<String>,
    device_index: Option<usize>,
    device_strategy: Option<DeviceStrategy>,
    ring_seconds: Option<f32>,
}

#[derive(Deserialize)]
struct AnalysisSection {
    band_count: Option<usize>,
    window: Option<WindowFunction>,
    analysis_size: Option<usize>,
    waveform_len: Option<usize>,
}

#[derive(Deserialize)]
struct BeatSection {
    history_length: Option<usize>,
    absolute_floor: Option<f64>,
    sensitivity: Option<f64>,
    min_interval_frames: Option<u32>,
}

/// Charge un fichier TOML et le superpose aux valeurs par défaut.
///
/// # Errors
/// Returns an error if the file cannot be read, is not valid TOML,
/// or contains non-finite values.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible de lire {}", path.display()))?;
    let config =
        parse_config(&content).with_context(|| format!("Config invalide : {}", path.display()))?;
    log::info!("Config chargée depuis {}", path.display());
    Ok(config)
}

/// Parse TOML text into a config, overlaying it onto the defaults.
///
/// # Errors
/// Returns an error on malformed TOML or non-finite values.
///
/// # Example
/// ```
/// use ab_core::config::parse_config;
/// let config = parse_config("[beat]\nsensitivity = 2.0\n")?;
/// assert!((config.beat_sensitivity_factor - 2.0).abs() < f64::EPSILON);
/// assert_eq!(config.buffer_size, 1024);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn parse_config(content: &str) -> Result<PipelineConfig> {
    let file: ConfigFile =
        toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))?;

    let mut config = PipelineConfig::default();

    if let Some(c) = file.capture {
        if let Some(v) = c.sample_rate {
            config.sample_rate = v;
        }
        if let Some(v) = c.buffer_size {
            config.buffer_size = v;
        }
        if c.device.is_some() {
            config.device = c.device;
        }
        if c.device_index.is_some() {
            config.device_index = c.device_index;
        }
        if let Some(v) = c.device_strategy {
            config.device_strategy = v;
        }
        if let Some(v) = c.ring_seconds {
            config.ring_seconds = v;
        }
    }

    if let Some(a) = file.analysis {
        if let Some(v) = a.band_count {
            config.band_count = v;
        }
        if let Some(v) = a.window {
            config.window = v;
        }
        if a.analysis_size.is_some() {
            config.analysis_size = a.analysis_size;
        }
        if let Some(v) = a.waveform_len {
            config.waveform_len = v;
        }
    }

    if let Some(b) = file.beat {
        if let Some(v) = b.history_length {
            config.energy_history_length = v;
        }
        if let Some(v) = b.absolute_floor {
            config.beat_absolute_floor = v;
        }
        if let Some(v) = b.sensitivity {
            config.beat_sensitivity_factor = v;
        }
        if let Some(v) = b.min_interval_frames {
            config.beat_min_interval_frames = v;
        }
    }

    config.validate()?;
    config.clamp_all();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_documented_options() {
        let config = PipelineConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.band_count, 8);
        assert_eq!(config.energy_history_length, 50);
        assert!((config.beat_absolute_floor - 0.02).abs() < f64::EPSILON);
        assert!((config.beat_sensitivity_factor - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.analysis_size, None);
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = match parse_config("") {
            Ok(c) => c,
            Err(e) => panic!("config should parse: {e}"),
        };
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn partial_sections_override_only_given_fields() {
        let toml = r#"
            [capture]
            sample_rate = 48000
            device = "Monitor of Built-in"

            [analysis]
            window = "Rectangular"
            analysis_size = 2048

            [beat]
            history_length = 20
            min_interval_frames = 4
        "#;
        let config = match parse_config(toml) {
            Ok(c) => c,
            Err(e) => panic!("config should parse: {e}"),
        };
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.device.as_deref(), Some("Monitor of Built-in"));
        assert_eq!(config.window, WindowFunction::Rectangular);
        assert_eq!(config.analysis_size, Some(2048));
        assert_eq!(config.energy_history_length, 20);
        assert_eq!(config.beat_min_interval_frames, 4);
        assert!((config.beat_sensitivity_factor - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let toml = "[analysis]\nband_count = 0\n[beat]\nsensitivity = 0.2\nhistory_length = 0\n";
        let config = match parse_config(toml) {
            Ok(c) => c,
            Err(e) => panic!("config should parse: {e}"),
        };
        assert_eq!(config.band_count, 1);
        assert_eq!(config.energy_history_length, 1);
        assert!((config.beat_sensitivity_factor - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_finite_values_are_rejected() {
        assert!(parse_config("[beat]\nsensitivity = nan\n").is_err());
        assert!(parse_config("[beat]\nabsolute_floor = inf\n").is_err());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(parse_config("[capture\nsample_rate = ").is_err());
    }

    #[test]
    fn load_config_reads_file() {
        let mut file = match tempfile::NamedTempFile::new() {
            Ok(f) => f,
            Err(e) => panic!("tempfile: {e}"),
        };
        let written = writeln!(file, "[capture]\nbuffer_size = 512");
        assert!(written.is_ok());
        let config = match load_config(file.path()) {
            Ok(c) => c,
            Err(e) => panic!("load should succeed: {e}"),
        };
        assert_eq!(config.buffer_size, 512);
    }

    #[test]
    fn load_config_missing_file_is_an_error() {
        assert!(load_config(Path::new("/nonexistent/audiobrain.toml")).is_err());
    }

    #[test]
    fn ring_capacity_covers_analysis_window() {
        let config = PipelineConfig {
            ring_seconds: 0.1,
            sample_rate: 8000,
            analysis_size: Some(4096),
            ..PipelineConfig::default()
        };
        assert_eq!(config.ring_capacity(), 4096);
    }

    #[test]
    fn frame_duration_matches_buffer_over_rate() {
        let config = PipelineConfig::default();
        let secs = config.frame_duration_secs();
        assert!((secs - 1024.0 / 44100.0).abs() < 1e-12);
    }

    #[test]
    fn shipped_default_file_matches_defaults() {
        let text = include_str!("../../../config/default.toml");
        let config = match parse_config(text) {
            Ok(c) => c,
            Err(e) => panic!("config/default.toml should parse: {e}"),
        };
        assert_eq!(config, PipelineConfig::default());
    }
}
