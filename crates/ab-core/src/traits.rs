use std::sync::Arc;

use crate::snapshot::FeatureSnapshot;

/// Reçoit les frames poussées par une source audio.
///
/// Implémenté par : `AudioPipeline`. Appelé depuis le thread temps réel de la source.
///
/// # Example
/// ```
/// use ab_core::traits::FrameSink;
///
/// struct CountingSink(usize);
/// impl FrameSink for CountingSink {
///     fn on_frame(&mut self, samples: &[f64], channels: u16, _sample_rate: u32) {
///         self.0 += samples.len() / usize::from(channels.max(1));
///     }
/// }
///
/// let mut sink = CountingSink(0);
/// sink.on_frame(&[0.0; 8], 2, 44100);
/// assert_eq!(sink.0, 4);
/// ```
pub trait FrameSink: Send + 'static {
    /// Traite une frame entrelacée de `channels` canaux.
    ///
    /// CONTRAT : ne bloque jamais, ne panique jamais, ne retourne pas d'erreur.
    /// Les frames malformées sont assainies, pas rejetées.
    fn on_frame(&mut self, samples: &[f64], channels: u16, sample_rate: u32);
}

/// Fournit le dernier snapshot publié aux consommateurs.
///
/// Implémenté par : `SnapshotReader`.
///
/// # Example
/// ```
/// use ab_core::traits::SnapshotSource;
/// use ab_core::snapshot::FeatureSnapshot;
/// use std::sync::Arc;
///
/// struct Fixed(Arc<FeatureSnapshot>);
/// impl SnapshotSource for Fixed {
///     fn read_snapshot(&self) -> Arc<FeatureSnapshot> { Arc::clone(&self.0) }
/// }
///
/// let source = Fixed(Arc::new(FeatureSnapshot::silent(8, 0)));
/// assert!(!source.read_snapshot().beat);
/// ```
pub trait SnapshotSource: Send + Sync {
    /// Retourne le dernier snapshot complet. Ne bloque JAMAIS.
    ///
    /// Avant la première frame, retourne un snapshot à zéro.
    fn read_snapshot(&self) -> Arc<FeatureSnapshot>;
}
