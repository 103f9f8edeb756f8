// Playback controller for generated speech
// Tracks elapsed time against the sink's clock and owns the single
// active playback session

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::codec::AudioBuffer;
use super::output::{AudioSink, CompletionHandle, PlaybackClock};

const TICK_INTERVAL: Duration = Duration::from_millis(33);

/// Called with (position, is_playing) on every ticker tick, on seek,
/// and on natural completion
pub type ProgressListener = Arc<dyn Fn(f64, bool) + Send + Sync>;

struct PlayerInner {
    buffer: Option<Arc<AudioBuffer>>,
    position: f64,
    start_reference: f64,
    playing: bool,
    completion: Option<CompletionHandle>,
    ticker_cancel: Option<Arc<AtomicBool>>,
    progress: Option<ProgressListener>,
    // Bumped on every session teardown; completion callbacks carry the
    // value they were created under and ignore any mismatch
    session: u64,
}

impl PlayerInner {
    fn duration(&self) -> f64 {
        self.buffer.as_ref().map(|b| b.duration()).unwrap_or(0.0)
    }
}

pub struct Player {
    sink: Box<dyn AudioSink>,
    clock: Arc<dyn PlaybackClock>,
    inner: Arc<Mutex<PlayerInner>>,
}

impl Player {
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        let clock = sink.clock();
        Self {
            sink,
            clock,
            inner: Arc::new(Mutex::new(PlayerInner {
                buffer: None,
                position: 0.0,
                start_reference: 0.0,
                playing: false,
                completion: None,
                ticker_cancel: None,
                progress: None,
                session: 0,
            })),
        }
    }

    pub fn set_progress_listener(&self, listener: ProgressListener) {
        self.inner.lock().progress = Some(listener);
    }

    /// Replace the loaded audio, stopping any active session
    pub fn load(&mut self, buffer: Arc<AudioBuffer>) {
        self.end_session();
        let mut inner = self.inner.lock();
        inner.buffer = Some(buffer);
        inner.position = 0.0;
    }

    /// Drop the loaded audio entirely (before a new generation starts)
    pub fn clear(&mut self) {
        self.end_session();
        let mut inner = self.inner.lock();
        inner.buffer = None;
        inner.position = 0.0;
    }

    /// Start (or resume) playback from the current position. When the
    /// position is already at the end, restarts from the top.
    pub fn play(&mut self) -> Result<(), String> {
        let (buffer, offset) = {
            let mut inner = self.inner.lock();
            let buffer = inner.buffer.clone().ok_or("No audio loaded")?;
            if inner.position >= buffer.duration() {
                inner.position = 0.0;
            }
            (buffer, inner.position)
        };

        // Stop strictly before start so two sessions never overlap
        self.end_session();

        let completion = self.completion_handle();
        {
            let mut inner = self.inner.lock();
            inner.completion = Some(completion.clone());
            inner.start_reference = self.clock.now() - offset;
            inner.playing = true;
        }

        if let Err(e) = self.sink.start(buffer, offset, completion) {
            let mut inner = self.inner.lock();
            inner.playing = false;
            inner.completion = None;
            return Err(e);
        }

        self.start_ticker();
        Ok(())
    }

    /// Capture the current position and stop output; a later `play()`
    /// resumes from where playback left off
    pub fn pause(&mut self) {
        {
            let mut inner = self.inner.lock();
            if inner.playing {
                let elapsed = self.clock.now() - inner.start_reference;
                inner.position = elapsed.clamp(0.0, inner.duration());
            }
        }
        self.end_session();
    }

    /// Jump to `target` seconds, clamped to the audio bounds. If
    /// playing, output restarts at the new offset without a gap.
    pub fn seek(&mut self, target: f64) -> Result<(), String> {
        let (was_playing, clamped, listener) = {
            let mut inner = self.inner.lock();
            let clamped = target.clamp(0.0, inner.duration());
            inner.position = clamped;
            (inner.playing, clamped, inner.progress.clone())
        };

        // Publish the new position immediately
        if let Some(listener) = listener {
            listener(clamped, was_playing);
        }

        if was_playing {
            self.play()?;
        }
        Ok(())
    }

    /// Stop output and reset the position to the start
    pub fn stop(&mut self) {
        self.end_session();
        self.inner.lock().position = 0.0;
    }

    pub fn set_volume(&self, volume: f32) {
        self.sink.set_volume(volume);
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().playing
    }

    pub fn duration(&self) -> f64 {
        self.inner.lock().duration()
    }

    /// Current position in seconds, computed live while playing
    pub fn position(&self) -> f64 {
        let inner = self.inner.lock();
        if inner.playing {
            let elapsed = self.clock.now() - inner.start_reference;
            elapsed.clamp(0.0, inner.duration())
        } else {
            inner.position
        }
    }

    /// Tear down the active session: detach the completion callback
    /// first so the natural-end path never fires on a manual stop,
    /// then cancel the ticker and stop the sink.
    fn end_session(&mut self) {
        {
            let mut inner = self.inner.lock();
            inner.session += 1;
            if let Some(completion) = inner.completion.take() {
                completion.detach();
            }
            if let Some(cancel) = inner.ticker_cancel.take() {
                cancel.store(true, Ordering::SeqCst);
            }
            inner.playing = false;
        }
        self.sink.stop();
    }

    /// Callback the sink fires when playback reaches the end of the
    /// buffer on its own
    fn completion_handle(&self) -> CompletionHandle {
        let inner = Arc::clone(&self.inner);
        let session = self.inner.lock().session;
        CompletionHandle::new(move || {
            let (position, listener) = {
                let mut inner = inner.lock();
                // A completion racing the teardown can arrive after a
                // new session took over; it must not touch that one
                if inner.session != session {
                    return;
                }
                inner.playing = false;
                inner.position = inner.duration();
                inner.completion = None;
                if let Some(cancel) = inner.ticker_cancel.take() {
                    cancel.store(true, Ordering::SeqCst);
                }
                (inner.position, inner.progress.clone())
            };
            if let Some(listener) = listener {
                listener(position, false);
            }
        })
    }

    /// Periodic position publisher, cancelled whenever the session ends
    fn start_ticker(&mut self) {
        let cancel = Arc::new(AtomicBool::new(false));
        self.inner.lock().ticker_cancel = Some(cancel.clone());

        let inner = Arc::clone(&self.inner);
        let clock = self.clock.clone();

        std::thread::spawn(move || {
            while !cancel.load(Ordering::SeqCst) {
                let (position, listener) = {
                    let mut inner = inner.lock();
                    if !inner.playing {
                        break;
                    }
                    let elapsed = clock.now() - inner.start_reference;
                    inner.position = elapsed.clamp(0.0, inner.duration());
                    (inner.position, inner.progress.clone())
                };

                if let Some(listener) = listener {
                    listener(position, true);
                }

                std::thread::sleep(TICK_INTERVAL);
            }
        });
    }

    #[cfg(test)]
    fn ticker_active(&self) -> bool {
        self.inner.lock().ticker_cancel.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::SYNTHESIS_SAMPLE_RATE;

    struct ManualClock {
        now: Mutex<f64>,
    }

    impl ManualClock {
        fn advance(&self, secs: f64) {
            *self.now.lock() += secs;
        }
    }

    impl PlaybackClock for ManualClock {
        fn now(&self) -> f64 {
            *self.now.lock()
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    enum SinkEvent {
        Start(f64),
        Stop,
    }

    struct MockSink {
        clock: Arc<ManualClock>,
        events: Arc<Mutex<Vec<SinkEvent>>>,
        active: Arc<Mutex<Option<CompletionHandle>>>,
    }

    impl AudioSink for MockSink {
        fn clock(&self) -> Arc<dyn PlaybackClock> {
            self.clock.clone()
        }

        fn start(
            &mut self,
            _buffer: Arc<AudioBuffer>,
            offset: f64,
            completion: CompletionHandle,
        ) -> Result<(), String> {
            self.events.lock().push(SinkEvent::Start(offset));
            *self.active.lock() = Some(completion);
            Ok(())
        }

        fn stop(&mut self) {
            self.events.lock().push(SinkEvent::Stop);
            self.active.lock().take();
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        events: Arc<Mutex<Vec<SinkEvent>>>,
        active: Arc<Mutex<Option<CompletionHandle>>>,
        player: Player,
    }

    fn fixture_with_buffer(seconds: usize) -> Fixture {
        let clock = Arc::new(ManualClock { now: Mutex::new(0.0) });
        let events = Arc::new(Mutex::new(Vec::new()));
        let active = Arc::new(Mutex::new(None));

        let sink = MockSink {
            clock: clock.clone(),
            events: events.clone(),
            active: active.clone(),
        };

        let mut player = Player::new(Box::new(sink));
        let samples = vec![0.0f32; seconds * SYNTHESIS_SAMPLE_RATE as usize];
        player.load(Arc::new(AudioBuffer::new(samples, SYNTHESIS_SAMPLE_RATE)));
        events.lock().clear();

        Fixture { clock, events, active, player }
    }

    #[test]
    fn test_play_without_audio_fails() {
        let clock = Arc::new(ManualClock { now: Mutex::new(0.0) });
        let sink = MockSink {
            clock: clock.clone(),
            events: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(Mutex::new(None)),
        };
        let mut player = Player::new(Box::new(sink));
        assert!(player.play().is_err());
    }

    #[test]
    fn test_pause_and_resume_accumulate_elapsed_time() {
        let mut f = fixture_with_buffer(10);

        f.player.play().unwrap();
        f.clock.advance(2.0);
        f.player.pause();
        assert!(!f.player.is_playing());
        assert!((f.player.position() - 2.0).abs() < 1e-9);

        // Time passing while paused does not move the position
        f.clock.advance(5.0);
        assert!((f.player.position() - 2.0).abs() < 1e-9);

        f.player.play().unwrap();
        f.clock.advance(3.0);
        assert!((f.player.position() - 5.0).abs() < 1e-9);

        // The resume started output at the paused offset
        let events = f.events.lock();
        assert!(events.contains(&SinkEvent::Start(2.0)));
    }

    #[test]
    fn test_seek_clamps_to_bounds() {
        let mut f = fixture_with_buffer(10);

        f.player.seek(-5.0).unwrap();
        assert_eq!(f.player.position(), 0.0);

        f.player.seek(15.0).unwrap();
        assert_eq!(f.player.position(), 10.0);
    }

    #[test]
    fn test_seek_while_playing_restarts_at_offset() {
        let mut f = fixture_with_buffer(10);

        f.player.play().unwrap();
        f.clock.advance(1.0);
        f.player.seek(4.0).unwrap();

        assert!(f.player.is_playing());
        assert!((f.player.position() - 4.0).abs() < 1e-9);

        // Old session stopped before the new one started
        let events = f.events.lock();
        let last_start = events.iter().rposition(|e| matches!(e, SinkEvent::Start(_)));
        let last_stop = events.iter().rposition(|e| *e == SinkEvent::Stop);
        assert_eq!(events[last_start.unwrap()], SinkEvent::Start(4.0));
        assert!(last_stop.unwrap() < last_start.unwrap());
    }

    #[test]
    fn test_double_play_never_overlaps_sessions() {
        let mut f = fixture_with_buffer(10);

        f.player.play().unwrap();
        let first = f.active.lock().clone();
        f.player.play().unwrap();

        let events = f.events.lock();
        assert_eq!(
            *events,
            vec![
                SinkEvent::Stop,
                SinkEvent::Start(0.0),
                SinkEvent::Stop,
                SinkEvent::Start(0.0),
            ]
        );
        drop(events);

        // The first session's completion was detached before the stop,
        // so a late natural-end event from it is ignored
        first.unwrap().fire();
        assert!(f.player.is_playing());
    }

    #[test]
    fn test_stale_completion_cannot_end_replacement_session() {
        let mut f = fixture_with_buffer(10);

        f.player.play().unwrap();
        // The first session's feeder reached end-of-buffer and pulled
        // its callback out just before the session was replaced
        let stale = f.active.lock().clone().unwrap().take_callback().unwrap();

        f.clock.advance(1.0);
        f.player.seek(4.0).unwrap();
        stale();

        // The replacement session is untouched by the late callback
        assert!(f.player.is_playing());
        assert!(f.player.ticker_active());
        assert!((f.player.position() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_natural_completion() {
        let mut f = fixture_with_buffer(5);

        f.player.play().unwrap();
        f.clock.advance(5.0);

        let completion = f.active.lock().take().unwrap();
        completion.fire();

        assert!(!f.player.is_playing());
        assert_eq!(f.player.position(), 5.0);
        assert!(!f.player.ticker_active());
    }

    #[test]
    fn test_play_after_completion_restarts_from_zero() {
        let mut f = fixture_with_buffer(5);

        f.player.play().unwrap();
        f.clock.advance(5.0);
        f.active.lock().take().unwrap().fire();

        f.player.play().unwrap();
        assert!(f.player.is_playing());
        assert_eq!(f.player.position(), 0.0);

        let events = f.events.lock();
        assert_eq!(*events.last().unwrap(), SinkEvent::Start(0.0));
    }

    #[test]
    fn test_pause_cancels_ticker() {
        let mut f = fixture_with_buffer(10);

        f.player.play().unwrap();
        assert!(f.player.ticker_active());

        f.player.pause();
        assert!(!f.player.ticker_active());
    }

    #[test]
    fn test_stop_resets_position() {
        let mut f = fixture_with_buffer(10);

        f.player.play().unwrap();
        f.clock.advance(3.0);
        f.player.stop();

        assert!(!f.player.is_playing());
        assert_eq!(f.player.position(), 0.0);
    }

    #[test]
    fn test_load_replaces_audio_and_stops_session() {
        let mut f = fixture_with_buffer(10);

        f.player.play().unwrap();
        f.clock.advance(2.0);

        let samples = vec![0.0f32; 3 * SYNTHESIS_SAMPLE_RATE as usize];
        f.player.load(Arc::new(AudioBuffer::new(samples, SYNTHESIS_SAMPLE_RATE)));

        assert!(!f.player.is_playing());
        assert_eq!(f.player.position(), 0.0);
        assert_eq!(f.player.duration(), 3.0);
    }
}
