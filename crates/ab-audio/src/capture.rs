use std::sync::Arc;

use ab_core::clock::StreamClock;
use ab_core::config::PipelineConfig;
use ab_core::traits::FrameSink;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, StreamConfig, SupportedBufferSize};

use crate::assembler::FrameAssembler;
use crate::device::{DeviceInfo, DeviceSelector, open_device};
use crate::error::AudioError;
use crate::pipeline::AudioPipeline;

/// Formats tried in order when the device offers several.
const FORMAT_PREFERENCE: [SampleFormat; 3] = [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16];

/// What the device agreed to.
#[derive(Clone, Debug)]
struct Negotiated {
    stream_config: StreamConfig,
    format: SampleFormat,
    fixed_buffer: bool,
}

/// Live capture from one input device into a [`FrameSink`].
///
/// Frames reach the sink on the driver's real-time thread, re-chunked to
/// `buffer_size` samples per channel. Stopping is cooperative: the shared
/// [`StreamClock`] is flagged first, the callback then ignores anything the
/// driver still delivers, and the stream is paused and released.
///
/// `cpal::Stream` is not `Send` on every platform: keep the session on the
/// thread that started it (see [`with_capture`]).
///
/// # Example
/// ```no_run
/// use ab_audio::capture::CaptureSession;
/// use ab_audio::device::LoopbackHeuristic;
/// use ab_audio::pipeline::AudioPipeline;
/// use ab_core::config::PipelineConfig;
///
/// let config = PipelineConfig::default();
/// let (pipeline, reader) = AudioPipeline::new(&config);
/// let mut session = CaptureSession::for_pipeline(&config, &LoopbackHeuristic, pipeline)?;
/// std::thread::sleep(std::time::Duration::from_millis(100));
/// println!("{:?}", reader.read_snapshot().energy);
/// session.stop();
/// # Ok::<(), ab_audio::error::AudioError>(())
/// ```
pub struct CaptureSession {
    stream: Option<cpal::Stream>,
    clock: Arc<StreamClock>,
    device: DeviceInfo,
    negotiated: Negotiated,
}

impl CaptureSession {
    /// Open the device chosen by `selector` and start pushing frames to `sink`.
    ///
    /// `clock` is flagged by [`stop`](Self::stop) and when the device disappears.
    ///
    /// # Errors
    /// - [`AudioError::SourceUnavailable`] if no input matches, it has no channels,
    ///   or the stream cannot be built.
    /// - [`AudioError::UnsupportedFormat`] if the device offers no f32/i16/u16 input.
    /// - [`AudioError::StreamError`] if the built stream refuses to start.
    pub fn start<S: FrameSink>(
        config: &PipelineConfig,
        selector: &dyn DeviceSelector,
        sink: S,
        clock: Arc<StreamClock>,
    ) -> Result<Self, AudioError> {
        let (device, info) = open_device(selector)?;
        let negotiated = negotiate(&device, &info, config)?;
        let StreamConfig {
            channels,
            sample_rate,
            ..
        } = negotiated.stream_config;

        if sample_rate.0 != config.sample_rate {
            log::warn!(
                "{} ne supporte pas {}Hz, capture à {}Hz",
                info.name,
                config.sample_rate,
                sample_rate.0
            );
        }
        log::info!(
            "Capture : {channels} canal(aux), {}Hz, {:?}, buffer {}",
            sample_rate.0,
            negotiated.format,
            if negotiated.fixed_buffer { "fixe" } else { "ré-assemblé" }
        );

        let assembler = FrameAssembler::new(sink, config.buffer_size, channels, sample_rate.0);
        let stream = match negotiated.format {
            SampleFormat::F32 => {
                build_stream::<f32, S>(&device, &negotiated.stream_config, assembler, &clock)
            }
            SampleFormat::I16 => {
                build_stream::<i16, S>(&device, &negotiated.stream_config, assembler, &clock)
            }
            SampleFormat::U16 => {
                build_stream::<u16, S>(&device, &negotiated.stream_config, assembler, &clock)
            }
            other => Err(AudioError::UnsupportedFormat(format!("{other:?}"))),
        }?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("démarrage impossible : {e}")))?;

        Ok(Self {
            stream: Some(stream),
            clock,
            device: info,
            negotiated,
        })
    }

    /// [`start`](Self::start) with the pipeline as sink and its own clock.
    ///
    /// # Errors
    /// Same as [`start`](Self::start).
    pub fn for_pipeline(
        config: &PipelineConfig,
        selector: &dyn DeviceSelector,
        pipeline: AudioPipeline,
    ) -> Result<Self, AudioError> {
        let clock = Arc::clone(pipeline.clock());
        Self::start(config, selector, pipeline, clock)
    }

    /// Stop delivering frames. Idempotent.
    pub fn stop(&mut self) {
        self.clock.request_stop();
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::debug!("pause du stream : {e}");
            }
            drop(stream);
            log::info!("Capture arrêtée ({})", self.device.name);
        }
    }

    /// `true` until stopped or the device goes away.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.stream.is_some() && self.clock.is_running()
    }

    /// The device being captured.
    #[must_use]
    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Sample rate the device actually delivers.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.negotiated.stream_config.sample_rate.0
    }

    /// Interleaved channels delivered (1 or 2).
    #[must_use]
    pub fn channels(&self) -> u16 {
        self.negotiated.stream_config.channels
    }

    /// `true` if the driver itself delivers `buffer_size` frames.
    #[must_use]
    pub fn fixed_buffer(&self) -> bool {
        self.negotiated.fixed_buffer
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run `f` while `pipeline` captures, then stop, whatever `f` returns.
///
/// # Errors
/// Same as [`CaptureSession::start`]; `f` is not called if capture fails to start.
pub fn with_capture<R>(
    config: &PipelineConfig,
    selector: &dyn DeviceSelector,
    pipeline: AudioPipeline,
    f: impl FnOnce(&CaptureSession) -> R,
) -> Result<R, AudioError> {
    let mut session = CaptureSession::for_pipeline(config, selector, pipeline)?;
    let out = f(&session);
    session.stop();
    Ok(out)
}

/// Pick channels, rate, format and buffer size for `device`.
fn negotiate(
    device: &cpal::Device,
    info: &DeviceInfo,
    config: &PipelineConfig,
) -> Result<Negotiated, AudioError> {
    let channels = info.max_input_channels.min(2);
    if channels == 0 {
        return Err(AudioError::SourceUnavailable(format!(
            "{} n'a pas d'entrée",
            info.name
        )));
    }

    let ranges: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| AudioError::SourceUnavailable(format!("{} : {e}", info.name)))?
        .filter(|r| r.channels() == channels)
        .collect();

    let wanted = config.sample_rate;
    let exact = FORMAT_PREFERENCE.iter().find_map(|&format| {
        ranges.iter().find(|r| {
            r.sample_format() == format
                && r.min_sample_rate().0 <= wanted
                && wanted <= r.max_sample_rate().0
        })
    });

    let frames = u32::try_from(config.buffer_size).unwrap_or(u32::MAX);
    let (format, rate, fixed_buffer) = if let Some(range) = exact {
        (range.sample_format(), wanted, fits(range.buffer_size(), frames))
    } else {
        let fallback = device
            .default_input_config()
            .map_err(|e| AudioError::SourceUnavailable(format!("{} : {e}", info.name)))?;
        (
            fallback.sample_format(),
            fallback.sample_rate().0,
            fits(fallback.buffer_size(), frames),
        )
    };

    if !FORMAT_PREFERENCE.contains(&format) {
        return Err(AudioError::UnsupportedFormat(format!("{format:?}")));
    }

    Ok(Negotiated {
        stream_config: StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(rate),
            buffer_size: if fixed_buffer {
                cpal::BufferSize::Fixed(frames)
            } else {
                cpal::BufferSize::Default
            },
        },
        format,
        fixed_buffer,
    })
}

/// `true` if the driver can deliver exactly `frames` per callback.
fn fits(range: &SupportedBufferSize, frames: u32) -> bool {
    match range {
        SupportedBufferSize::Range { min, max } => *min <= frames && frames <= *max,
        SupportedBufferSize::Unknown => false,
    }
}

fn build_stream<T, S>(
    device: &cpal::Device,
    stream_config: &StreamConfig,
    mut assembler: FrameAssembler<S>,
    clock: &Arc<StreamClock>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample,
    f64: FromSample<T>,
    S: FrameSink,
{
    let data_clock = Arc::clone(clock);
    let err_clock = Arc::clone(clock);
    device
        .build_input_stream(
            stream_config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if data_clock.is_running() {
                    assembler.push(data);
                }
            },
            move |err| {
                log::error!("Erreur de stream audio : {err}");
                if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                    err_clock.request_stop();
                }
            },
            None,
        )
        .map_err(build_error)
}

/// A stream the device refuses to build means there is no usable source.
fn build_error(e: cpal::BuildStreamError) -> AudioError {
    AudioError::SourceUnavailable(format!("stream impossible à construire : {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbuildable_stream_is_source_unavailable() {
        let err = build_error(cpal::BuildStreamError::DeviceNotAvailable);
        assert!(matches!(err, AudioError::SourceUnavailable(_)));
        let err = build_error(cpal::BuildStreamError::StreamConfigNotSupported);
        assert!(err.to_string().starts_with("Source audio indisponible"));
    }
}
