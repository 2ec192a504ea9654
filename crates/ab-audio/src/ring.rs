use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering, fence};

/// Copies attempted before a reader settles for the part of the window
/// the writer has not lapped.
const MAX_READ_RETRIES: usize = 8;

/// Fenêtre glissante des samples mono les plus récents.
///
/// Un seul écrivain ([`RingWriter`]), autant de lecteurs que voulu ([`RingReader`]).
/// Stockage en `AtomicU64` (bits des `f64`) protégé par deux curseurs façon seqlock :
/// l'écrivain ne bloque jamais, un lecteur qui s'est fait dépasser recopie.
///
/// # Example
/// ```
/// use ab_audio::ring::RingBuffer;
/// let (mut writer, reader) = RingBuffer::new(4);
/// writer.append(&[1.0, 2.0, 3.0, 4.0, 5.0]);
/// assert_eq!(reader.snapshot(), vec![2.0, 3.0, 4.0, 5.0]);
/// ```
pub struct RingBuffer {
    slots: Box<[AtomicU64]>,
    /// Fin de la zone en cours d'écriture (total de samples).
    reserved: AtomicU64,
    /// Fin de la zone publiée (total de samples).
    committed: AtomicU64,
}

/// Unique write handle of a [`RingBuffer`].
pub struct RingWriter {
    ring: Arc<RingBuffer>,
}

/// Cloneable read handle of a [`RingBuffer`].
#[derive(Clone)]
pub struct RingReader {
    ring: Arc<RingBuffer>,
}

impl RingBuffer {
    /// Create a ring holding at most `capacity` samples.
    ///
    /// A capacity of 0 is raised to 1.
    #[must_use]
    #[allow(clippy::new_ret_no_self)]
    pub fn new(capacity: usize) -> (RingWriter, RingReader) {
        let capacity = capacity.max(1);
        let slots: Box<[AtomicU64]> = (0..capacity)
            .map(|_| AtomicU64::new(0.0f64.to_bits()))
            .collect();
        let ring = Arc::new(Self {
            slots,
            reserved: AtomicU64::new(0),
            committed: AtomicU64::new(0),
        });
        (
            RingWriter {
                ring: Arc::clone(&ring),
            },
            RingReader { ring },
        )
    }

    /// Maximum number of samples kept.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of samples currently held (≤ capacity).
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.committed
            .load(Ordering::Acquire)
            .min(self.slots.len() as u64) as usize
    }

    /// `true` until the first append.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.committed.load(Ordering::Acquire) == 0
    }

    /// Total samples ever appended, evicted ones included.
    #[inline]
    #[must_use]
    pub fn total_written(&self) -> u64 {
        self.committed.load(Ordering::Acquire)
    }

    /// Current contents, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<f64> {
        let len = self.len();
        let mut out = Vec::with_capacity(len);
        self.latest_into(&mut out, len);
        out
    }

    /// The latest `width` samples, oldest first, left-padded with zeros
    /// while fewer than `width` samples have arrived.
    ///
    /// # Example
    /// ```
    /// use ab_audio::ring::RingBuffer;
    /// let (mut writer, reader) = RingBuffer::new(8);
    /// writer.append(&[0.5, 0.25]);
    /// assert_eq!(reader.snapshot_padded(4), vec![0.0, 0.0, 0.5, 0.25]);
    /// ```
    #[must_use]
    pub fn snapshot_padded(&self, width: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(width);
        self.latest_into(&mut out, width);
        out
    }

    /// Same as [`snapshot_padded`](Self::snapshot_padded), reusing `out`.
    ///
    /// `out` ends up exactly `width` long. Widths beyond the capacity are
    /// zero-padded on the left as well.
    pub fn latest_into(&self, out: &mut Vec<f64>, width: usize) {
        let cap = self.slots.len() as u64;
        out.clear();
        out.resize(width, 0.0);

        let mut start = 0;
        let mut pad = width;
        let mut oldest_valid = 0;
        for _ in 0..MAX_READ_RETRIES {
            let committed = self.committed.load(Ordering::Acquire);
            let available = committed.min(cap).min(width as u64);
            start = committed - available;
            pad = width - available as usize;

            for (slot, pos) in out[pad..].iter_mut().zip(start..committed) {
                *slot = f64::from_bits(self.slots[(pos % cap) as usize].load(Ordering::Relaxed));
            }

            fence(Ordering::Acquire);
            let reserved = self.reserved.load(Ordering::Relaxed);
            oldest_valid = reserved.saturating_sub(cap);
            if oldest_valid <= start {
                return;
            }
        }

        // Dépassé à chaque tentative : on ne garde que la partie non écrasée.
        let lapped = (oldest_valid - start).min((width - pad) as u64) as usize;
        for slot in &mut out[pad..pad + lapped] {
            *slot = 0.0;
        }
        log::debug!("ring reader lapped by writer, {lapped} samples dropped from view");
    }
}

impl RingWriter {
    /// Append samples, evicting the oldest once capacity is exceeded.
    ///
    /// Never blocks and never allocates. When `samples` is longer than the
    /// capacity only its last `capacity` values are stored.
    pub fn append(&mut self, samples: &[f64]) {
        if samples.is_empty() {
            return;
        }
        let ring = &*self.ring;
        let cap = ring.slots.len();
        // Single writer: our own last store is the current value.
        let start = ring.committed.load(Ordering::Relaxed);
        let end = start + samples.len() as u64;
        let skip = samples.len().saturating_sub(cap);

        ring.reserved.store(end, Ordering::Relaxed);
        fence(Ordering::Release);

        let mut pos = start + skip as u64;
        for &sample in &samples[skip..] {
            ring.slots[(pos % cap as u64) as usize].store(sample.to_bits(), Ordering::Relaxed);
            pos += 1;
        }

        ring.committed.store(end, Ordering::Release);
    }

    /// A new read handle on the same ring.
    #[must_use]
    pub fn reader(&self) -> RingReader {
        RingReader {
            ring: Arc::clone(&self.ring),
        }
    }
}

impl Deref for RingWriter {
    type Target = RingBuffer;

    fn deref(&self) -> &RingBuffer {
        &self.ring
    }
}

impl Deref for RingReader {
    type Target = RingBuffer;

    fn deref(&self) -> &RingBuffer {
        &self.ring
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::thread;

    use super::*;

    /// Deterministic xorshift, good enough to vary append sizes.
    fn next_rand(state: &mut u64) -> u64 {
        *state ^= *state << 13;
        *state ^= *state >> 7;
        *state ^= *state << 17;
        *state
    }

    #[test]
    fn empty_ring_snapshots_empty() {
        let (_writer, reader) = RingBuffer::new(16);
        assert!(reader.is_empty());
        assert!(reader.snapshot().is_empty());
        assert_eq!(reader.snapshot_padded(3), vec![0.0; 3]);
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let (mut writer, reader) = RingBuffer::new(37);
        let mut state = 0x9E37_79B9_7F4A_7C15;
        let mut all = Vec::new();
        for _ in 0..500 {
            let n = (next_rand(&mut state) % 50) as usize;
            let chunk: Vec<f64> = (0..n).map(|i| (all.len() + i) as f64).collect();
            writer.append(&chunk);
            all.extend_from_slice(&chunk);

            let snap = reader.snapshot();
            assert!(snap.len() <= 37);
            let expected_len = all.len().min(37);
            assert_eq!(snap, all[all.len() - expected_len..]);
        }
    }

    #[test]
    fn oversized_append_keeps_last_capacity() {
        let (mut writer, reader) = RingBuffer::new(4);
        let samples: Vec<f64> = (0..10).map(f64::from).collect();
        writer.append(&samples);
        assert_eq!(reader.snapshot(), vec![6.0, 7.0, 8.0, 9.0]);
        assert_eq!(reader.total_written(), 10);
    }

    #[test]
    fn wraparound_keeps_chronological_order() {
        let (mut writer, reader) = RingBuffer::new(5);
        writer.append(&[1.0, 2.0, 3.0]);
        writer.append(&[4.0, 5.0, 6.0]);
        writer.append(&[7.0]);
        assert_eq!(reader.snapshot(), vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn padded_view_wider_than_capacity() {
        let (mut writer, reader) = RingBuffer::new(3);
        writer.append(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(reader.snapshot_padded(5), vec![0.0, 0.0, 2.0, 3.0, 4.0]);
        assert_eq!(reader.snapshot_padded(2), vec![3.0, 4.0]);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let (mut writer, reader) = RingBuffer::new(0);
        writer.append(&[1.0, 2.0]);
        assert_eq!(reader.capacity(), 1);
        assert_eq!(reader.snapshot(), vec![2.0]);
    }

    #[test]
    fn concurrent_readers_never_see_torn_windows() {
        let (mut writer, reader) = RingBuffer::new(1024);
        let done = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let reader = reader.clone();
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut buf = Vec::new();
                    while !done.load(Ordering::Relaxed) {
                        reader.latest_into(&mut buf, 512);
                        // Lapped prefixes are zeroed; the rest must be consecutive.
                        let live: Vec<f64> =
                            buf.iter().copied().skip_while(|&v| v == 0.0).collect();
                        for pair in live.windows(2) {
                            assert!(
                                (pair[1] - pair[0] - 1.0).abs() < f64::EPSILON,
                                "non-consecutive samples {} -> {}",
                                pair[0],
                                pair[1]
                            );
                        }
                    }
                })
            })
            .collect();

        let mut next = 1.0;
        let mut chunk = [0.0; 64];
        for _ in 0..5_000 {
            for slot in &mut chunk {
                *slot = next;
                next += 1.0;
            }
            writer.append(&chunk);
        }
        done.store(true, Ordering::Relaxed);

        for h in handles {
            assert!(h.join().is_ok(), "reader thread panicked");
        }
        assert_eq!(reader.len(), 1024);
    }
}
