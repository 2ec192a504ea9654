use std::fmt::Write;

use ab_audio::device::DeviceInfo;
use ab_core::snapshot::FeatureSnapshot;

/// Glyphes des barres, du silence au plein niveau.
const BAR_GLYPHS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Plage affichée, en dB sous la pleine échelle.
const DB_RANGE: f64 = 60.0;

/// Niveau 0..=1 d'une magnitude de bande sur une échelle en dB.
fn level(magnitude: f64) -> f64 {
    if !magnitude.is_finite() || magnitude <= 0.0 {
        return 0.0;
    }
    ((20.0 * magnitude.log10() + DB_RANGE) / DB_RANGE).clamp(0.0, 1.0)
}

/// Glyphe d'une bande.
fn bar(magnitude: f64) -> char {
    let last = BAR_GLYPHS.len() - 1;
    let idx = (level(magnitude) * last as f64).round() as usize;
    BAR_GLYPHS[idx.min(last)]
}

/// Ligne de vumètre : temps de flux, énergie, marqueur de beat, une barre par bande.
pub fn format_meter(snapshot: &FeatureSnapshot) -> String {
    let mut line = String::with_capacity(48 + snapshot.bands.len() * 3);
    let _ = write!(
        line,
        "#{:<7} {:>8.2}s  E {:.4} / {:.4} {} |",
        snapshot.frame_index,
        snapshot.timestamp,
        snapshot.energy,
        snapshot.baseline,
        if snapshot.beat { '●' } else { '·' }
    );
    line.extend(snapshot.bands.iter().map(|&b| bar(b)));
    line.push('|');
    line
}

/// Ligne de `--list-devices` : `index: nom [LOOPBACK] [DEFAULT]`.
pub fn format_device(info: &DeviceInfo) -> String {
    let mut line = format!("{}: {}", info.index, info.name);
    if info.is_loopback() {
        line.push_str(" [LOOPBACK]");
    }
    if info.is_default {
        line.push_str(" [DEFAULT]");
    }
    line
}
