//! Microphone capture via cpal.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It must not allocate after warm-up, block on a lock, or perform I/O, so
//! it only downmixes into a reused scratch buffer and writes to the SPSC
//! ring producer (`push_slice` is lock-free).
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread
//! affinity). `AudioCapture` must be created and dropped on the same
//! thread; the engine does both inside its `spawn_blocking` closure.

pub mod device;
pub mod resample;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{error, info, warn};

#[cfg(feature = "audio-cpal")]
use crate::buffering::Producer;
use crate::{
    buffering::AudioProducer,
    error::{LecternError, Result},
};

/// Handle to an active capture stream.
///
/// **Not `Send`** — see the module docs. Create and drop on one thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

/// Downmix interleaved samples to mono and write them to the ring.
/// `mix` is a reused scratch buffer; its capacity stabilises after the
/// first few callbacks.
#[cfg(feature = "audio-cpal")]
fn write_mono<I: Iterator<Item = f32>>(
    producer: &mut AudioProducer,
    mix: &mut Vec<f32>,
    samples: I,
    channels: usize,
) {
    mix.clear();
    if channels <= 1 {
        mix.extend(samples);
    } else {
        let mut acc = 0f32;
        let mut filled = 0usize;
        for s in samples {
            acc += s;
            filled += 1;
            if filled == channels {
                mix.push(acc / channels as f32);
                acc = 0.0;
                filled = 0;
            }
        }
    }

    let written = producer.push_slice(mix);
    if written < mix.len() {
        warn!(
            "ring buffer full: dropped {} capture frames",
            mix.len() - written
        );
    }
}

/// Resolve which input device to open: preferred name if it exists, then
/// the system default, then the first enumerable input.
#[cfg(feature = "audio-cpal")]
fn resolve_input_device(
    host: &cpal::Host,
    preferred: Option<&str>,
) -> Result<cpal::Device> {
    use cpal::traits::HostTrait;

    if let Some(wanted) = preferred {
        match host.input_devices() {
            Ok(mut devices) => {
                if let Some(found) = devices.find(|d| d.name().is_ok_and(|n| n == wanted)) {
                    return Ok(found);
                }
                warn!("preferred input device '{wanted}' not found, falling back");
            }
            Err(e) => warn!("device enumeration failed while resolving preference: {e}"),
        }
    }

    if let Some(default) = host.default_input_device() {
        return Ok(default);
    }

    warn!("no default input device, trying first available input");
    host.input_devices()
        .map_err(|e| LecternError::AudioDevice(e.to_string()))?
        .next()
        .ok_or(LecternError::NoDefaultInputDevice)
}

impl AudioCapture {
    /// Open an input device by preferred name, falling back to the system
    /// default and then the first available device.
    ///
    /// # Errors
    /// `LecternError::NoDefaultInputDevice` when no microphone exists, or
    /// `LecternError::AudioStream` if cpal fails to build the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        mut producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = resolve_input_device(&host, preferred_device_name)?;
        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let default_cfg = device
            .default_input_config()
            .map_err(|e| LecternError::AudioDevice(e.to_string()))?;
        let sample_rate = default_cfg.sample_rate().0;
        let channels = default_cfg.channels();
        info!(sample_rate, channels, "capture config negotiated");

        let stream_cfg = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ch = channels as usize;
        // One flag clone and scratch buffer per sample-format branch so each
        // closure owns its captures outright.
        let flag_f32 = Arc::clone(&running);
        let flag_i16 = Arc::clone(&running);
        let on_error = |err| error!("audio stream error: {err}");

        let stream = match default_cfg.sample_format() {
            SampleFormat::F32 => {
                let mut mix: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &stream_cfg,
                    move |data: &[f32], _info| {
                        if flag_f32.load(Ordering::Relaxed) {
                            write_mono(&mut producer, &mut mix, data.iter().copied(), ch);
                        }
                    },
                    on_error,
                    None,
                )
            }

            SampleFormat::I16 => {
                let mut mix: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &stream_cfg,
                    move |data: &[i16], _info| {
                        if flag_i16.load(Ordering::Relaxed) {
                            write_mono(
                                &mut producer,
                                &mut mix,
                                data.iter().map(|s| *s as f32 / 32_768.0),
                                ch,
                            );
                        }
                    },
                    on_error,
                    None,
                )
            }

            fmt => {
                return Err(LecternError::AudioStream(format!(
                    "unsupported capture sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| LecternError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| LecternError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Open the system default microphone.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }

    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(LecternError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }
}
