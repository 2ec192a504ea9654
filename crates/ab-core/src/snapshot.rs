/// Magnitudes moyennes par bande de fréquence pour une fenêtre d'analyse.
///
/// Nombre de bandes fixé à la construction du pipeline. Valeurs toujours ≥ 0.
///
/// # Example
/// ```
/// use ab_core::snapshot::BandMagnitudes;
/// let bands = BandMagnitudes::zeroed(8);
/// assert_eq!(bands.len(), 8);
/// assert!(bands.iter().all(|&b| b == 0.0));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BandMagnitudes(Vec<f64>);

impl BandMagnitudes {
    /// `count` bands, all zero.
    #[must_use]
    pub fn zeroed(count: usize) -> Self {
        Self(vec![0.0; count])
    }

    /// Wrap precomputed band values.
    ///
    /// Negative or non-finite values are replaced by 0.
    #[must_use]
    pub fn from_vec(mut values: Vec<f64>) -> Self {
        for v in &mut values {
            if !v.is_finite() || *v < 0.0 {
                *v = 0.0;
            }
        }
        Self(values)
    }

    /// Number of bands.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if there are no bands at all.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Band values, lowest frequency first.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Iterate band values, lowest frequency first.
    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.0.iter()
    }

    /// Index of the band with the highest magnitude (first one on ties).
    ///
    /// Returns `None` if there are no bands.
    ///
    /// # Example
    /// ```
    /// use ab_core::snapshot::BandMagnitudes;
    /// let bands = BandMagnitudes::from_vec(vec![0.1, 0.7, 0.3]);
    /// assert_eq!(bands.loudest(), Some(1));
    /// ```
    #[must_use]
    pub fn loudest(&self) -> Option<usize> {
        self.0
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
                Some((_, bv)) if bv >= v => best,
                _ => Some((i, v)),
            })
            .map(|(i, _)| i)
    }

    /// Zero every band in place without reallocating.
    pub fn clear(&mut self) {
        self.0.fill(0.0);
    }

    /// Mutable band values, for analyzers that refill a snapshot in place.
    ///
    /// Callers must only write non-negative finite values.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.0
    }
}

impl<'a> IntoIterator for &'a BandMagnitudes {
    type Item = &'a f64;
    type IntoIter = std::slice::Iter<'a, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Résultat de l'analyse pour une frame capturée.
///
/// Écrit par le thread de capture, lu par n'importe quel consommateur.
/// Immuable une fois publié : les consommateurs reçoivent un `Arc` partagé,
/// jamais une référence mutable.
///
/// # Example
/// ```
/// use ab_core::snapshot::FeatureSnapshot;
/// let s = FeatureSnapshot::silent(8, 1024);
/// assert_eq!(s.energy, 0.0);
/// assert!(!s.beat);
/// assert_eq!(s.bands.len(), 8);
/// assert_eq!(s.raw_frame_tail.len(), 1024);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureSnapshot {
    /// Nombre de frames ingérées au moment de la publication (1 pour la première).
    /// 0 = aucune frame reçue.
    pub frame_index: u64,
    /// Temps de flux en secondes à la fin de la frame (samples ingérés / sample rate).
    pub timestamp: f64,
    /// Puissance moyenne de la frame (moyenne des carrés).
    pub energy: f64,
    /// `true` si la frame est un beat.
    pub beat: bool,
    /// Moyenne glissante d'énergie utilisée comme seuil adaptatif.
    pub baseline: f64,
    /// Magnitudes par bande de la fenêtre analysée.
    pub bands: BandMagnitudes,
    /// Derniers samples mono, du plus ancien au plus récent, complétés à gauche par des zéros.
    pub raw_frame_tail: Vec<f64>,
}

impl FeatureSnapshot {
    /// Snapshot published before the first frame: everything zeroed.
    #[must_use]
    pub fn silent(band_count: usize, tail_len: usize) -> Self {
        Self {
            frame_index: 0,
            timestamp: 0.0,
            energy: 0.0,
            beat: false,
            baseline: 0.0,
            bands: BandMagnitudes::zeroed(band_count),
            raw_frame_tail: vec![0.0; tail_len],
        }
    }

    /// `true` until the first frame has been ingested.
    #[must_use]
    pub fn is_initial(&self) -> bool {
        self.frame_index == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vec_sanitizes_values() {
        let bands = BandMagnitudes::from_vec(vec![1.0, -2.0, f64::NAN, f64::INFINITY]);
        assert_eq!(bands.as_slice(), &[1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn loudest_prefers_first_on_ties() {
        let bands = BandMagnitudes::from_vec(vec![0.5, 0.5, 0.1]);
        assert_eq!(bands.loudest(), Some(0));
        assert_eq!(BandMagnitudes::default().loudest(), None);
    }

    #[test]
    fn silent_snapshot_is_initial() {
        let s = FeatureSnapshot::silent(8, 16);
        assert!(s.is_initial());
        assert_eq!(s.bands, BandMagnitudes::zeroed(8));
        assert!(s.raw_frame_tail.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn clear_keeps_band_count() {
        let mut bands = BandMagnitudes::from_vec(vec![0.3; 4]);
        bands.clear();
        assert_eq!(bands, BandMagnitudes::zeroed(4));
    }
}
