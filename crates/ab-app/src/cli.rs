use std::path::PathBuf;

use ab_core::config::{DeviceStrategy, PipelineConfig};
use clap::Parser;

/// audiobrain : capture audio système et extraction de features en temps réel.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Fichier de configuration TOML. Défaut : config/default.toml.
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Lister les entrées audio et quitter.
    #[arg(long, default_value_t = false)]
    pub list_devices: bool,

    /// Entrée dont le nom contient ce texte (insensible à la casse).
    #[arg(long)]
    pub device: Option<String>,

    /// Entrée par index (voir --list-devices).
    #[arg(long, conflicts_with = "device")]
    pub device_index: Option<usize>,

    /// Utiliser l'entrée par défaut au lieu de chercher un loopback.
    #[arg(long, default_value_t = false)]
    pub default_device: bool,

    /// Sample rate demandé (Hz).
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Taille de frame en samples par canal.
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Intervalle de lecture des snapshots (ms).
    #[arg(long, default_value_t = 50)]
    pub interval_ms: u64,

    /// Arrêter après N secondes.
    #[arg(long)]
    pub duration_secs: Option<f64>,

    /// Niveau de log : error, warn, info, debug, trace.
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    /// Appliquer les overrides CLI sur la config chargée.
    pub fn apply_overrides(&self, config: &mut PipelineConfig) {
        if let Some(rate) = self.sample_rate {
            config.sample_rate = rate;
        }
        if let Some(size) = self.buffer_size {
            config.buffer_size = size;
        }
        if self.device.is_some() {
            config.device.clone_from(&self.device);
            config.device_index = None;
        }
        if self.device_index.is_some() {
            config.device_index = self.device_index;
            config.device = None;
        }
        if self.default_device {
            config.device_strategy = DeviceStrategy::Default;
        }
        config.clamp_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["audiobrain"]);
        assert!(!cli.list_devices);
        assert_eq!(cli.interval_ms, 50);
        assert_eq!(cli.log_level, "warn");
        assert!(cli.duration_secs.is_none());
    }

    #[test]
    fn overrides_win_over_file() {
        let cli = Cli::parse_from([
            "audiobrain",
            "--sample-rate",
            "48000",
            "--buffer-size",
            "512",
            "--device",
            "monitor",
            "--default-device",
        ]);
        let mut config = PipelineConfig {
            device_index: Some(4),
            ..PipelineConfig::default()
        };
        cli.apply_overrides(&mut config);
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.buffer_size, 512);
        assert_eq!(config.device.as_deref(), Some("monitor"));
        assert_eq!(config.device_index, None);
        assert_eq!(config.device_strategy, DeviceStrategy::Default);
    }

    #[test]
    fn device_and_index_conflict() {
        let res = Cli::try_parse_from(["audiobrain", "--device", "a", "--device-index", "1"]);
        assert!(res.is_err());
    }

    #[test]
    fn overrides_are_clamped() {
        let cli = Cli::parse_from(["audiobrain", "--buffer-size", "1"]);
        let mut config = PipelineConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.buffer_size, 32);
    }
}
