use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use ab_audio::capture::{CaptureSession, with_capture};
use ab_audio::device::{list_devices, selector_for};
use ab_audio::pipeline::{AudioPipeline, SnapshotReader};
use ab_core::config::PipelineConfig;
use anyhow::{Context, Result};
use clap::Parser;

pub mod cli;
pub mod hotreload;
pub mod monitor;

fn main() -> Result<()> {
    // 1. Parser CLI
    let cli = cli::Cli::parse();

    // 2. Initialiser le logging
    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(log::LevelFilter::Warn))
        .init();

    // 3. Lister les entrées
    if cli.list_devices {
        return print_devices();
    }

    // 4. Charger la config + overrides CLI
    let mut config = resolve_config(&cli.config)?;
    cli.apply_overrides(&mut config);

    // 5. Construire le pipeline
    let (pipeline, reader) = AudioPipeline::new(&config);

    // 6. Hot-reload des réglages de beat
    let _watcher = if cli.config.exists() {
        match hotreload::spawn_tuning_watcher(&cli.config, &reader) {
            Ok(w) => Some(w),
            Err(e) => {
                log::warn!("Hot-reload désactivé : {e}");
                None
            }
        }
    } else {
        None
    };

    // 7. Ctrl-C → canal d'arrêt
    let (stop_tx, stop_rx) = flume::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("Impossible d'installer le handler Ctrl-C")?;

    // 8. Capture + boucle de lecture (la capture est fermée à la sortie)
    let interval = Duration::from_millis(cli.interval_ms.max(1));
    let limit = cli
        .duration_secs
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(Duration::from_secs_f64);
    let selector = selector_for(&config);

    with_capture(&config, selector.as_ref(), pipeline, |session| {
        log::info!(
            "{} : {}Hz, {} canal(aux), budget {:.1} ms par frame",
            session.device().name,
            session.sample_rate(),
            session.channels(),
            config.frame_duration_secs() * 1000.0
        );
        run_meter(session, &reader, &stop_rx, interval, limit);
    })
    .context("Capture audio impossible")?;

    let stats = reader.stats();
    println!();
    println!(
        "{} frames, {} assainies, {} erreurs de calcul, {:.2}s de flux",
        stats.frames(),
        stats.sanitized(),
        stats.compute_errors(),
        reader.clock().pos_secs()
    );
    Ok(())
}

/// Affiche le vumètre jusqu'à Ctrl-C, la limite de durée ou la perte de la source.
fn run_meter(
    session: &CaptureSession,
    reader: &SnapshotReader,
    stop_rx: &flume::Receiver<()>,
    interval: Duration,
    limit: Option<Duration>,
) {
    let started = Instant::now();
    let mut stdout = std::io::stdout();
    loop {
        if !session.is_active() {
            log::warn!("Source audio perdue");
            break;
        }
        if limit.is_some_and(|l| started.elapsed() >= l) {
            break;
        }

        let line = monitor::format_meter(&reader.read_snapshot());
        let _ = write!(stdout, "\r{line}");
        let _ = stdout.flush();

        match stop_rx.recv_timeout(interval) {
            Err(flume::RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// `--list-devices`
fn print_devices() -> Result<()> {
    let devices = list_devices().context("Énumération des entrées audio")?;
    if devices.is_empty() {
        println!("Aucune entrée audio.");
    }
    for info in &devices {
        println!("{}", monitor::format_device(info));
    }
    Ok(())
}

/// Charge la config, ou les défauts si le fichier n'existe pas.
fn resolve_config(path: &Path) -> Result<PipelineConfig> {
    if path.exists() {
        ab_core::config::load_config(path)
    } else {
        log::warn!(
            "Config introuvable : {}. Utilisation des défauts.",
            path.display()
        );
        Ok(PipelineConfig::default())
    }
}
