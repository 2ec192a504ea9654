use std::path::Path;

use ab_audio::pipeline::SnapshotReader;
use ab_core::config::BeatTuning;
use anyhow::Result;
use notify::{Event, EventKind, RecursiveMode, Watcher};

/// Relit le fichier config et publie les nouveaux paramètres de beat.
///
/// Les options structurelles (bandes, historique, buffer) demandent un redémarrage.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed; the current tuning is kept.
pub fn reload_tuning(path: &Path, reader: &SnapshotReader) -> Result<BeatTuning> {
    let tuning = ab_core::config::load_config(path)?.beat_tuning();
    if tuning != reader.tuning() {
        reader.set_tuning(tuning);
        log::info!(
            "Beat : seuil {:.3}, sensibilité {:.2}, intervalle {} frames",
            tuning.absolute_floor,
            tuning.sensitivity,
            tuning.min_interval_frames
        );
    }
    Ok(tuning)
}

/// Surveille le fichier config et applique les changements de réglage du beat.
///
/// Retourne le Watcher (doit rester vivant tant que l'app tourne).
///
/// # Errors
/// Returns an error if the watcher cannot be created or the path cannot be watched.
///
/// # Example
/// ```no_run
/// use std::path::Path;
/// use ab_audio::pipeline::AudioPipeline;
/// use ab_core::config::PipelineConfig;
///
/// let (_pipeline, reader) = AudioPipeline::new(&PipelineConfig::default());
/// let _watcher = ab_app::hotreload::spawn_tuning_watcher(Path::new("config/default.toml"), &reader);
/// ```
pub fn spawn_tuning_watcher(
    config_path: &Path,
    reader: &SnapshotReader,
) -> Result<impl Watcher + use<>> {
    let reader = reader.clone();
    let path = config_path.to_path_buf();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res
            && matches!(event.kind, EventKind::Modify(_))
            && let Err(e) = reload_tuning(&path, &reader)
        {
            log::warn!("Erreur de rechargement config : {e:#}");
        }
    })?;

    watcher.watch(config_path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use ab_audio::pipeline::AudioPipeline;
    use ab_core::config::PipelineConfig;

    use super::*;

    #[test]
    fn reload_publishes_new_tuning() {
        let (_pipeline, reader) = AudioPipeline::new(&PipelineConfig::default());
        let mut file = match tempfile::NamedTempFile::new() {
            Ok(f) => f,
            Err(e) => panic!("tempfile: {e}"),
        };
        let written = writeln!(file, "[beat]\nsensitivity = 2.5\nmin_interval_frames = 4");
        assert!(written.is_ok());

        let tuning = match reload_tuning(file.path(), &reader) {
            Ok(t) => t,
            Err(e) => panic!("reload should succeed: {e:#}"),
        };
        assert!((tuning.sensitivity - 2.5).abs() < f64::EPSILON);
        assert_eq!(reader.tuning(), tuning);
    }

    #[test]
    fn bad_file_keeps_current_tuning() {
        let (_pipeline, reader) = AudioPipeline::new(&PipelineConfig::default());
        let mut file = match tempfile::NamedTempFile::new() {
            Ok(f) => f,
            Err(e) => panic!("tempfile: {e}"),
        };
        let written = writeln!(file, "[beat\nsensitivity = ");
        assert!(written.is_ok());

        assert!(reload_tuning(file.path(), &reader).is_err());
        assert_eq!(reader.tuning(), BeatTuning::default());
    }
}
