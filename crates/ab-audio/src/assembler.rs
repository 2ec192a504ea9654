use ab_core::traits::FrameSink;
use cpal::{FromSample, Sample};

/// Re-chunks whatever the driver delivers into fixed frames of
/// `frame_len` samples per channel, converted to `f64`.
///
/// All storage is allocated up front; [`push`](Self::push) never allocates.
///
/// # Example
/// ```
/// use ab_audio::assembler::FrameAssembler;
/// use ab_core::traits::FrameSink;
///
/// struct Count(usize);
/// impl FrameSink for Count {
///     fn on_frame(&mut self, samples: &[f64], _ch: u16, _sr: u32) {
///         assert_eq!(samples.len(), 4);
///         self.0 += 1;
///     }
/// }
///
/// let mut asm = FrameAssembler::new(Count(0), 4, 1, 44100);
/// asm.push(&[0.0f32; 10]);
/// assert_eq!(asm.sink().0, 2);
/// assert_eq!(asm.pending(), 2);
/// ```
pub struct FrameAssembler<S: FrameSink> {
    sink: S,
    channels: u16,
    sample_rate: u32,
    buf: Box<[f64]>,
    filled: usize,
}

impl<S: FrameSink> FrameAssembler<S> {
    /// Frames of `frame_len` samples per channel, interleaved over `channels`.
    pub fn new(sink: S, frame_len: usize, channels: u16, sample_rate: u32) -> Self {
        let total = frame_len.max(1) * usize::from(channels.max(1));
        Self {
            sink,
            channels,
            sample_rate,
            buf: vec![0.0; total].into_boxed_slice(),
            filled: 0,
        }
    }

    /// Feed driver samples; completed frames go to the sink immediately.
    pub fn push<T>(&mut self, data: &[T])
    where
        T: Sample,
        f64: FromSample<T>,
    {
        let mut rest = data;
        while !rest.is_empty() {
            let room = self.buf.len() - self.filled;
            let take = room.min(rest.len());
            for (slot, &s) in self.buf[self.filled..self.filled + take]
                .iter_mut()
                .zip(&rest[..take])
            {
                *slot = <f64 as FromSample<T>>::from_sample_(s);
            }
            self.filled += take;
            rest = &rest[take..];

            if self.filled == self.buf.len() {
                self.sink.on_frame(&self.buf, self.channels, self.sample_rate);
                self.filled = 0;
            }
        }
    }

    /// Samples waiting for the next frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.filled
    }

    /// Interleaved samples per emitted frame.
    #[must_use]
    pub fn frame_samples(&self) -> usize {
        self.buf.len()
    }

    /// The wrapped sink.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }
}
