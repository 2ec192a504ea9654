/// What had to be repaired while downmixing a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameShape {
    /// Mono samples produced.
    pub frames: usize,
    /// Non-finite samples replaced by silence.
    pub non_finite: usize,
    /// Trailing samples dropped because they did not fill a whole frame.
    pub truncated: usize,
    /// The source reported zero channels and was read as mono.
    pub zero_channels: bool,
}

impl FrameShape {
    /// `true` if anything was repaired.
    #[must_use]
    pub fn was_sanitized(&self) -> bool {
        self.non_finite > 0 || self.truncated > 0 || self.zero_channels
    }
}

/// Downmix interleaved samples to mono into `out` (arithmetic mean across channels).
///
/// Never fails: zero channels are read as one, a trailing partial frame is
/// dropped, NaN/±Inf become silence. `out` is cleared first and reused.
///
/// # Example
/// ```
/// use ab_audio::mono::downmix_into;
/// let mut out = Vec::new();
/// let shape = downmix_into(&[1.0, 0.0, 0.5, 0.5], 2, &mut out);
/// assert_eq!(out, vec![0.5, 0.5]);
/// assert!(!shape.was_sanitized());
/// ```
pub fn downmix_into(interleaved: &[f64], channels: u16, out: &mut Vec<f64>) -> FrameShape {
    let mut shape = FrameShape {
        zero_channels: channels == 0,
        ..FrameShape::default()
    };
    let ch = usize::from(channels.max(1));

    out.clear();
    let chunks = interleaved.chunks_exact(ch);
    shape.truncated = chunks.remainder().len();

    for frame in chunks {
        let mut sum = 0.0;
        for &s in frame {
            if s.is_finite() {
                sum += s;
            } else {
                shape.non_finite += 1;
            }
        }
        let mono = sum / ch as f64;
        out.push(if mono.is_finite() { mono } else { 0.0 });
    }

    shape.frames = out.len();
    shape
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_passes_through() {
        let mut out = Vec::new();
        let shape = downmix_into(&[0.1, -0.2, 0.3], 1, &mut out);
        assert_eq!(out, vec![0.1, -0.2, 0.3]);
        assert_eq!(shape.frames, 3);
        assert!(!shape.was_sanitized());
    }

    #[test]
    fn stereo_is_averaged() {
        let mut out = Vec::new();
        downmix_into(&[1.0, -1.0, 0.4, 0.2, -0.6, -0.2], 2, &mut out);
        assert_eq!(out.len(), 3);
        assert!(out[0].abs() < 1e-12);
        assert!((out[1] - 0.3).abs() < 1e-12);
        assert!((out[2] + 0.4).abs() < 1e-12);
    }

    #[test]
    fn partial_trailing_frame_is_dropped() {
        let mut out = Vec::new();
        let shape = downmix_into(&[0.2, 0.2, 0.4], 2, &mut out);
        assert_eq!(out, vec![0.2]);
        assert_eq!(shape.truncated, 1);
        assert!(shape.was_sanitized());
    }

    #[test]
    fn non_finite_becomes_silence() {
        let mut out = Vec::new();
        let shape = downmix_into(&[f64::NAN, 0.5, f64::INFINITY, f64::NEG_INFINITY], 2, &mut out);
        assert_eq!(out, vec![0.25, 0.0]);
        assert_eq!(shape.non_finite, 3);
    }

    #[test]
    fn zero_channels_read_as_mono() {
        let mut out = Vec::new();
        let shape = downmix_into(&[0.5, 0.25], 0, &mut out);
        assert_eq!(out, vec![0.5, 0.25]);
        assert!(shape.zero_channels);
    }

    #[test]
    fn output_buffer_is_reused() {
        let mut out = vec![9.0; 16];
        downmix_into(&[0.5], 1, &mut out);
        assert_eq!(out, vec![0.5]);
    }
}
