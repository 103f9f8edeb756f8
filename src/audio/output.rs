// Audio output using cpal
// A single output stream is created at startup; playback sessions feed
// samples into it through a ring buffer

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::{HeapRb, traits::{Consumer, Observer, Producer, Split}};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::codec::AudioBuffer;

const RING_BUFFER_SIZE: usize = 48000 * 2 / 4; // ~250ms of stereo audio at 48kHz
const FEED_CHUNK: usize = 1024;

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

/// Monotonic playback clock, in seconds
pub trait PlaybackClock: Send + Sync {
    fn now(&self) -> f64;
}

struct MonotonicClock {
    epoch: Instant,
}

impl PlaybackClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// End-of-playback callback shared between the player and a session.
/// The player detaches it before any manual stop so the callback only
/// ever fires on natural completion.
#[derive(Clone)]
pub struct CompletionHandle {
    inner: Arc<CompletionState>,
}

struct CompletionState {
    detached: AtomicBool,
    callback: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl CompletionHandle {
    pub fn new<F: FnOnce() + Send + 'static>(callback: F) -> Self {
        Self {
            inner: Arc::new(CompletionState {
                detached: AtomicBool::new(false),
                callback: Mutex::new(Some(Box::new(callback))),
            }),
        }
    }

    /// Prevent the callback from ever firing
    pub fn detach(&self) {
        self.inner.detached.store(true, Ordering::SeqCst);
        self.inner.callback.lock().take();
    }

    /// Invoke the callback unless it was detached. Fires at most once.
    /// The detach check and the callback extraction happen under the
    /// same lock, so a concurrent `detach` cannot land between them.
    pub fn fire(&self) {
        let callback = {
            let mut callback = self.inner.callback.lock();
            if self.inner.detached.load(Ordering::SeqCst) {
                return;
            }
            callback.take()
        };
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Extract the callback without running it, the way a `fire` that
    /// already passed its detach check holds it while other threads
    /// keep going
    #[cfg(test)]
    pub(crate) fn take_callback(&self) -> Option<Box<dyn FnOnce() + Send>> {
        self.inner.callback.lock().take()
    }
}

/// Destination for playback sessions. The cpal implementation below is
/// used at runtime; tests drive the player with a mock.
pub trait AudioSink: Send {
    fn clock(&self) -> Arc<dyn PlaybackClock>;

    /// Schedule `buffer` for output starting `offset` seconds in.
    /// `completion` fires when the audio plays out to its natural end.
    fn start(
        &mut self,
        buffer: Arc<AudioBuffer>,
        offset: f64,
        completion: CompletionHandle,
    ) -> Result<(), String>;

    /// Terminate the active session, if any
    fn stop(&mut self);

    fn set_volume(&self, _volume: f32) {}
}

struct FeederSession {
    cancel: Arc<AtomicBool>,
    thread: std::thread::JoinHandle<()>,
}

pub struct CpalOutput {
    producer: Arc<Mutex<RingProducer>>,
    sample_rate: u32,
    channels: u16,
    volume: Arc<Mutex<f32>>,
    clear_flag: Arc<AtomicBool>,
    clock: Arc<MonotonicClock>,
    session: Option<FeederSession>,
}

impl CpalOutput {
    /// Create the output stream on the default device. Called once at
    /// startup; the stream stays alive for the life of the process.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host.default_output_device()
            .context("No output device available")?;

        let config = device.default_output_config()
            .context("Failed to get default output config")?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        // Create ring buffer for passing samples to the audio thread
        let rb = HeapRb::<f32>::new(RING_BUFFER_SIZE);
        let (producer, consumer) = rb.split();
        let producer = Arc::new(Mutex::new(producer));
        let consumer = Arc::new(Mutex::new(consumer));

        let volume = Arc::new(Mutex::new(1.0f32));
        let volume_clone = volume.clone();

        let clear_flag = Arc::new(AtomicBool::new(false));
        let clear_flag_clone = clear_flag.clone();

        // Build the output stream based on sample format
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config.into(), consumer, volume_clone, clear_flag_clone)?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config.into(), consumer, volume_clone, clear_flag_clone)?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config.into(), consumer, volume_clone, clear_flag_clone)?
            }
            format => anyhow::bail!("Unsupported sample format: {:?}", format),
        };

        stream.play().context("Failed to start stream")?;

        // cpal streams are not Send, so the handle cannot live inside
        // state shared across threads. The stream runs until process
        // exit; leaking the handle keeps it alive.
        std::mem::forget(stream);

        Ok(Self {
            producer,
            sample_rate,
            channels,
            volume,
            clear_flag,
            clock: Arc::new(MonotonicClock { epoch: Instant::now() }),
            session: None,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        consumer: Arc<Mutex<RingConsumer>>,
        volume: Arc<Mutex<f32>>,
        clear_flag: Arc<AtomicBool>,
    ) -> Result<Stream> {
        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut consumer = consumer.lock();
                let vol = *volume.lock();

                // If clear flag is set, drain the buffer and output silence
                if clear_flag.swap(false, Ordering::SeqCst) {
                    while consumer.try_pop().is_some() {}
                }

                for sample in data.iter_mut() {
                    let value = consumer.try_pop().unwrap_or(0.0) * vol;
                    *sample = T::from_sample(value);
                }
            },
            move |err| {
                eprintln!("[Audio] Output stream error: {}", err);
            },
            None,
        ).context("Failed to build output stream")?;

        Ok(stream)
    }

    /// Feeder loop for one session: resamples the buffer from the
    /// synthesis rate to the device rate, duplicates the mono signal
    /// across the device channels, and pushes into the ring buffer.
    /// Once the tail has drained, fires the completion handle.
    fn run_feeder(
        buffer: Arc<AudioBuffer>,
        offset: f64,
        producer: Arc<Mutex<RingProducer>>,
        cancel: Arc<AtomicBool>,
        clear_flag: Arc<AtomicBool>,
        completion: CompletionHandle,
        device_rate: u32,
        device_channels: u16,
    ) {
        // Let the audio callback finish draining the previous session
        // before the first samples of this one reach the ring
        while clear_flag.load(Ordering::SeqCst) {
            if cancel.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        let samples = buffer.samples();
        let src_rate = buffer.sample_rate() as f64;
        let ratio = src_rate / device_rate as f64;

        let start_sample = (offset * src_rate) as usize;
        let remaining = samples.len().saturating_sub(start_sample);
        let total_frames = (remaining as f64 / ratio).ceil() as usize;

        let mut chunk = Vec::with_capacity(FEED_CHUNK);
        let mut frame = 0usize;

        while frame < total_frames {
            if cancel.load(Ordering::SeqCst) {
                return;
            }

            chunk.clear();
            while chunk.len() + device_channels as usize <= FEED_CHUNK && frame < total_frames {
                let src_pos = start_sample as f64 + frame as f64 * ratio;
                let index = src_pos as usize;
                let frac = (src_pos - index as f64) as f32;

                let a = samples.get(index).copied().unwrap_or(0.0);
                let b = samples.get(index + 1).copied().unwrap_or(a);
                let value = a + (b - a) * frac;

                for _ in 0..device_channels {
                    chunk.push(value);
                }
                frame += 1;
            }

            Self::write_blocking(&producer, &chunk, &cancel);
        }

        // Wait for the ring buffer tail to actually play out
        while producer.lock().occupied_len() > 0 {
            if cancel.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        completion.fire();
    }

    /// Push samples, waiting while the ring buffer is full
    fn write_blocking(producer: &Arc<Mutex<RingProducer>>, samples: &[f32], cancel: &Arc<AtomicBool>) {
        let mut remaining = samples;

        while !remaining.is_empty() {
            if cancel.load(Ordering::SeqCst) {
                return;
            }

            let written = {
                let mut producer = producer.lock();
                let mut written = 0;
                for &sample in remaining {
                    if producer.try_push(sample).is_ok() {
                        written += 1;
                    } else {
                        break;
                    }
                }
                written
            };

            if written > 0 {
                remaining = &remaining[written..];
            } else {
                // Buffer full, wait a bit
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        }
    }
}

impl AudioSink for CpalOutput {
    fn clock(&self) -> Arc<dyn PlaybackClock> {
        self.clock.clone()
    }

    fn start(
        &mut self,
        buffer: Arc<AudioBuffer>,
        offset: f64,
        completion: CompletionHandle,
    ) -> Result<(), String> {
        // Stop-before-start: never two sessions feeding at once
        self.stop();

        let cancel = Arc::new(AtomicBool::new(false));
        let producer = self.producer.clone();
        let clear_flag = self.clear_flag.clone();
        let device_rate = self.sample_rate;
        let device_channels = self.channels;

        let thread = std::thread::spawn({
            let cancel = cancel.clone();
            move || {
                Self::run_feeder(
                    buffer,
                    offset,
                    producer,
                    cancel,
                    clear_flag,
                    completion,
                    device_rate,
                    device_channels,
                );
            }
        });

        self.session = Some(FeederSession { cancel, thread });
        Ok(())
    }

    fn stop(&mut self) {
        // Audio callback drains any queued samples on its next run
        self.clear_flag.store(true, Ordering::SeqCst);

        if let Some(session) = self.session.take() {
            session.cancel.store(true, Ordering::SeqCst);
            // Wait for the feeder to exit so the drained ring cannot
            // pick up this session's leftovers afterwards
            let _ = session.thread.join();
        }
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock() = volume.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_fires_once() {
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count_clone = count.clone();
        let handle = CompletionHandle::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        handle.fire();
        handle.fire();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_detached_completion_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        let handle = CompletionHandle::new(move || {
            fired_clone.store(true, Ordering::SeqCst);
        });

        // Detach through a clone, fire through the original
        let clone = handle.clone();
        clone.detach();
        handle.fire();
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_feeder_waits_for_pending_clear() {
        let rb = HeapRb::<f32>::new(64);
        let (producer, mut consumer) = rb.split();
        let producer = Arc::new(Mutex::new(producer));

        let cancel = Arc::new(AtomicBool::new(false));
        let clear_flag = Arc::new(AtomicBool::new(true));
        let completed = Arc::new(AtomicBool::new(false));
        let completed_clone = completed.clone();
        let completion = CompletionHandle::new(move || {
            completed_clone.store(true, Ordering::SeqCst);
        });

        let buffer = Arc::new(AudioBuffer::new(vec![0.25f32; 48], 24000));
        let feeder = std::thread::spawn({
            let producer = producer.clone();
            let cancel = cancel.clone();
            let clear_flag = clear_flag.clone();
            move || {
                CpalOutput::run_feeder(buffer, 0.0, producer, cancel, clear_flag, completion, 24000, 1);
            }
        });

        // Nothing may reach the ring while the drain is still pending,
        // otherwise the drain would discard this session's first samples
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(consumer.occupied_len(), 0);

        // Audio callback consumes the clear flag; samples flow now
        clear_flag.store(false, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(consumer.occupied_len(), 48);

        // Completion only fires once the tail has drained
        assert!(!completed.load(Ordering::SeqCst));
        while consumer.try_pop().is_some() {}
        feeder.join().unwrap();
        assert!(completed.load(Ordering::SeqCst));
    }
}
