use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Horloge de flux partagée entre le callback de capture et les consommateurs.
///
/// Le callback est le maître : il avance `sample_pos` à chaque frame ingérée.
/// Les consommateurs lisent `pos_secs()` pour savoir jusqu'où l'audio a progressé,
/// et `is_running()` pour savoir si la source accepte encore des frames.
///
/// Un changement de sample rate fige le temps déjà écoulé : seuls les samples
/// suivants sont comptés au nouveau débit, `pos_secs()` reste croissant.
///
/// Tous les champs sont atomiques : zero-alloc, zero-lock, `Send + Sync`.
///
/// # Example
/// ```
/// use ab_core::clock::StreamClock;
/// let clock = StreamClock::new(48000);
/// assert!(!clock.is_started());
/// clock.advance(48000);
/// assert!((clock.pos_secs() - 1.0).abs() < 1e-9);
/// ```
pub struct StreamClock {
    /// Samples mono ingérés depuis le démarrage.
    sample_pos: AtomicU64,
    /// Sample rate effectivement délivré par la source.
    sample_rate: AtomicU32,
    /// Secondes écoulées au dernier changement de débit (bits `f64`).
    base_secs: AtomicU64,
    /// `sample_pos` au dernier changement de débit.
    base_pos: AtomicU64,
    /// `true` une fois la première frame ingérée.
    started: AtomicBool,
    /// `false` dès que l'arrêt coopératif est demandé.
    running: AtomicBool,
}

impl StreamClock {
    /// Crée une horloge arrêtée à zéro, acceptant les frames.
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_pos: AtomicU64::new(0),
            sample_rate: AtomicU32::new(sample_rate),
            base_secs: AtomicU64::new(0.0f64.to_bits()),
            base_pos: AtomicU64::new(0),
            started: AtomicBool::new(false),
            running: AtomicBool::new(true),
        }
    }

    /// Position courante en secondes : temps figé au dernier changement de débit,
    /// plus les samples ingérés depuis divisés par le débit courant.
    ///
    /// Exact depuis le producteur ; un lecteur concurrent d'un changement de
    /// débit peut voir une valeur intermédiaire pendant ce seul appel.
    #[inline]
    #[must_use]
    pub fn pos_secs(&self) -> f64 {
        let base = f64::from_bits(self.base_secs.load(Ordering::Relaxed));
        let rate = self.sample_rate.load(Ordering::Relaxed);
        if rate == 0 {
            return base;
        }
        let since = self
            .sample_pos
            .load(Ordering::Relaxed)
            .saturating_sub(self.base_pos.load(Ordering::Relaxed));
        base + since as f64 / f64::from(rate)
    }

    /// Avance de `samples` et retourne la nouvelle position.
    ///
    /// Only the producer calls this.
    #[inline]
    pub fn advance(&self, samples: u64) -> u64 {
        self.started.store(true, Ordering::Relaxed);
        self.sample_pos.fetch_add(samples, Ordering::Relaxed) + samples
    }

    /// Position courante en samples.
    #[inline]
    #[must_use]
    pub fn sample_pos(&self) -> u64 {
        self.sample_pos.load(Ordering::Relaxed)
    }

    /// Sample rate courant.
    #[inline]
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    /// Met à jour le sample rate (la source peut délivrer un autre débit que demandé).
    ///
    /// Le temps déjà écoulé est conservé. Only the producer calls this.
    pub fn set_sample_rate(&self, rate: u32) {
        if rate == self.sample_rate.load(Ordering::Relaxed) {
            return;
        }
        let elapsed = self.pos_secs();
        self.base_secs.store(elapsed.to_bits(), Ordering::Relaxed);
        self.base_pos
            .store(self.sample_pos.load(Ordering::Relaxed), Ordering::Relaxed);
        self.sample_rate.store(rate, Ordering::Relaxed);
    }

    /// `true` si au moins une frame a été ingérée.
    #[inline]
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    /// Demande l'arrêt : la source cesse de pousser des frames.
    #[inline]
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// `false` une fois l'arrêt demandé.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_basic_operations() {
        let clock = StreamClock::new(44100);
        assert!(!clock.is_started());
        assert!(clock.is_running());
        assert_eq!(clock.sample_pos(), 0);

        assert_eq!(clock.advance(22050), 22050);
        assert!((clock.pos_secs() - 0.5).abs() < 1e-9);
        assert!(clock.is_started());

        clock.request_stop();
        assert!(!clock.is_running());
    }

    #[test]
    fn clock_zero_sample_rate() {
        let clock = StreamClock::new(0);
        clock.advance(100);
        assert_eq!(clock.pos_secs(), 0.0);
    }

    #[test]
    fn rate_change_keeps_elapsed_time() {
        let clock = StreamClock::new(44100);
        clock.advance(44100);
        clock.set_sample_rate(96000);
        assert_eq!(clock.sample_rate(), 96000);
        assert!((clock.pos_secs() - 1.0).abs() < 1e-9);

        clock.advance(9600);
        assert!((clock.pos_secs() - 1.1).abs() < 1e-9);

        clock.set_sample_rate(8000);
        clock.advance(800);
        assert!((clock.pos_secs() - 1.2).abs() < 1e-9);
    }

    #[test]
    fn rate_change_from_zero_keeps_base() {
        let clock = StreamClock::new(0);
        clock.advance(100);
        clock.set_sample_rate(100);
        assert_eq!(clock.pos_secs(), 0.0);
        clock.advance(50);
        assert!((clock.pos_secs() - 0.5).abs() < 1e-9);
    }
}
