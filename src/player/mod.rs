// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The player engine.
//!
//! Owns the playback pipeline (source → demuxer → decoders → sinks) and the
//! state machine driving it. API calls become intents on a queue served by a
//! single worker; pipeline events are enqueued asynchronously as notify
//! intents, so every transition is serialized. Synchronous calls wait on a
//! condition variable for their intent to be executed.

pub mod fsm;
pub mod stats;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mediaflow_plugin_api::{
    hst_time_to_ms, ms_to_hst_time, MediaSource, MediaType, Meta, SeekMode, Tag,
};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::ErrorCode;
use crate::osal::Task;
use crate::pipeline::filters::{
    AudioSinkFilter, CodecFilter, CodecKind, CodecWorkMode, DemuxerFilter, SourceFilter,
    VideoSinkFilter,
};
use crate::pipeline::{
    CallbackType, Event, EventKind, EventReceiver, Filter, FilterCallback, FilterId, Pipeline,
    PortInfo, PORT_NAME_DEFAULT,
};
use crate::plugin::PluginRegistry;
use crate::util::BlockingQueue;

pub use fsm::{Intent, StateId};
pub use stats::MediaStats;

use fsm::{dispatch, Action};

/// Largest volume the API accepts; normalized to `[0, 1]` internally.
const MAX_MEDIA_VOLUME: f32 = 100.0;

/// Capacity of the intent queue.
const INTENT_QUEUE_SIZE: usize = 32;

/// What an `on_info` callback reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoType {
    /// The player state changed; `extra` is the new [`StateId`] code.
    StateChange,
    /// A seek finished; `extra` is the target position in milliseconds.
    SeekDone,
    /// Playback reached end of stream.
    Eos,
    /// Source buffering progress; `extra` is a percentage.
    BufferingProgress,
}

/// Classification of an `on_error` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerErrorType {
    /// A pipeline or transition failure.
    Unknown,
    /// A seek failed.
    Seek,
}

/// Callbacks delivered to the embedding client.
pub trait PlayerObserver: Send + Sync {
    /// Informational event.
    fn on_info(&self, info: InfoType, extra: i64);

    /// Fatal or operation error.
    fn on_error(&self, error_type: PlayerErrorType, error: ErrorCode);
}

fn state_code(state: StateId) -> i64 {
    match state {
        StateId::Init => 0,
        StateId::Preparing => 1,
        StateId::Ready => 2,
        StateId::Playing => 3,
        StateId::Paused => 4,
        StateId::Seeking => 5,
        StateId::Stopped => 6,
        StateId::Eos => 7,
    }
}

#[derive(Default)]
struct IntentWaiter {
    result: Mutex<Option<Result<(), ErrorCode>>>,
    cond: Condvar,
}

impl IntentWaiter {
    fn complete(&self, result: Result<(), ErrorCode>) {
        *self.result.lock() = Some(result);
        self.cond.notify_all();
    }

    fn wait(&self) -> Result<(), ErrorCode> {
        let mut result = self.result.lock();
        while result.is_none() {
            self.cond.wait(&mut result);
        }
        result.take().expect("completed intent has a result")
    }
}

struct IntentMsg {
    intent: Intent,
    waiter: Option<Arc<IntentWaiter>>,
}

struct PlayerCore {
    registry: Arc<PluginRegistry>,
    pipeline: Pipeline,
    source: Arc<SourceFilter>,
    demuxer: Arc<DemuxerFilter>,
    audio_sink: Arc<AudioSinkFilter>,
    video_sink: Arc<VideoSinkFilter>,
    audio_decoders: Mutex<Vec<(String, Arc<CodecFilter>)>>,
    video_decoders: Mutex<Vec<(String, Arc<CodecFilter>)>>,
    intents: BlockingQueue<IntentMsg>,
    state: Mutex<StateId>,
    state_cond: Condvar,
    looping: AtomicBool,
    volume: Mutex<Option<f32>>,
    seek_mode: Mutex<SeekMode>,
    stats: MediaStats,
    observer: RwLock<Option<Arc<dyn PlayerObserver>>>,
    last_error: Mutex<Option<ErrorCode>>,
}

/// An embedded media player.
pub struct PlayerEngine {
    core: Arc<PlayerCore>,
    fsm_task: Arc<Task>,
}

impl PlayerEngine {
    /// Build a player over a plugin registry.
    pub fn new(registry: Arc<PluginRegistry>) -> Result<Self, ErrorCode> {
        let source = SourceFilter::new("mediaSource", Arc::clone(&registry));
        let demuxer = DemuxerFilter::new("demuxer", Arc::clone(&registry));
        let audio_sink = AudioSinkFilter::new("audioSink", Arc::clone(&registry));
        let video_sink = VideoSinkFilter::new("videoSink", Arc::clone(&registry));
        let core = Arc::new(PlayerCore {
            registry,
            pipeline: Pipeline::new(),
            source,
            demuxer,
            audio_sink,
            video_sink,
            audio_decoders: Mutex::new(Vec::new()),
            video_decoders: Mutex::new(Vec::new()),
            intents: BlockingQueue::new("player-intents", INTENT_QUEUE_SIZE),
            state: Mutex::new(StateId::Init),
            state_cond: Condvar::new(),
            looping: AtomicBool::new(false),
            volume: Mutex::new(None),
            seek_mode: Mutex::new(SeekMode::PreviousSync),
            stats: MediaStats::new(),
            observer: RwLock::new(None),
            last_error: Mutex::new(None),
        });
        let receiver: std::sync::Weak<dyn EventReceiver> =
            Arc::downgrade(&core) as std::sync::Weak<dyn EventReceiver>;
        let callback: std::sync::Weak<dyn FilterCallback> =
            Arc::downgrade(&core) as std::sync::Weak<dyn FilterCallback>;
        core.pipeline.init(receiver, callback);
        let upstream: Vec<Arc<dyn Filter>> = vec![
            Arc::clone(&core.source) as Arc<dyn Filter>,
            Arc::clone(&core.demuxer) as Arc<dyn Filter>,
        ];
        core.pipeline.add_filters(&upstream)?;
        core.pipeline.link_filters(&upstream)?;
        let worker = Arc::downgrade(&core);
        let fsm_task = Task::new("player-fsm", move || {
            if let Some(core) = worker.upgrade() {
                core.process_one_intent();
            }
        });
        fsm_task.start();
        info!("player engine initialized");
        Ok(PlayerEngine { core, fsm_task })
    }

    /// Install the observer receiving `on_info`/`on_error` callbacks.
    pub fn set_observer(&self, observer: Arc<dyn PlayerObserver>) {
        *self.core.observer.write() = Some(observer);
    }

    /// Attach a media source and start preparing.
    pub fn set_source(&self, source: MediaSource) -> Result<(), ErrorCode> {
        self.core.send_sync(Intent::SetSource(source))
    }

    /// Wait until preparation finished (or failed).
    pub fn prepare(&self) -> Result<(), ErrorCode> {
        self.core.send_sync(Intent::Prepare)?;
        let mut state = self.core.state.lock();
        while *state == StateId::Preparing || *state == StateId::Seeking {
            self.core.state_cond.wait(&mut state);
        }
        match *state {
            StateId::Ready | StateId::Playing | StateId::Paused => Ok(()),
            StateId::Init => Err(self
                .core
                .last_error
                .lock()
                .take()
                .unwrap_or(ErrorCode::InvalidState)),
            _ => Err(ErrorCode::InvalidOperation),
        }
    }

    /// Start (or resume) playback.
    pub fn play(&self) -> Result<(), ErrorCode> {
        let paused = *self.core.state.lock() == StateId::Paused;
        if paused {
            self.core.send_sync(Intent::Resume)
        } else {
            self.core.send_sync(Intent::Play)
        }
    }

    /// Pause playback.
    pub fn pause(&self) -> Result<(), ErrorCode> {
        self.core.send_sync(Intent::Pause)
    }

    /// Resume after pause.
    pub fn resume(&self) -> Result<(), ErrorCode> {
        self.core.send_sync(Intent::Resume)
    }

    /// Stop playback.
    pub fn stop(&self) -> Result<(), ErrorCode> {
        self.core.send_sync(Intent::Stop)
    }

    /// Seek to `position_ms`, asynchronously; completion is reported through
    /// the observer as `SeekDone`. Lands on the previous sync frame.
    pub fn seek(&self, position_ms: i64) -> Result<(), ErrorCode> {
        self.seek_with_mode(position_ms, SeekMode::PreviousSync)
    }

    /// Seek with an explicit frame-alignment mode.
    pub fn seek_with_mode(&self, position_ms: i64, mode: SeekMode) -> Result<(), ErrorCode> {
        let ticks = ms_to_hst_time(position_ms).ok_or(ErrorCode::InvalidParameterValue)?;
        if ticks < 0 {
            return Err(ErrorCode::InvalidParameterValue);
        }
        *self.core.seek_mode.lock() = mode;
        self.core.send_async(Intent::Seek(ticks));
        Ok(())
    }

    /// Whether playback is running.
    pub fn is_playing(&self) -> bool {
        *self.core.state.lock() == StateId::Playing
    }

    /// Current player state.
    pub fn state(&self) -> StateId {
        *self.core.state.lock()
    }

    /// Set channel volumes in `[0, 100]`; forwarded normalized to `[0, 1]`.
    pub fn set_volume(&self, left: f32, right: f32) -> Result<(), ErrorCode> {
        let valid = (0.0..=MAX_MEDIA_VOLUME).contains(&left)
            && (0.0..=MAX_MEDIA_VOLUME).contains(&right);
        if !valid {
            error!("volume out of range: {} / {}", left, right);
            return Err(ErrorCode::InvalidParameterValue);
        }
        let volume = if left < 1e-6 && right >= 1e-6 {
            right
        } else if right < 1e-6 && left >= 1e-6 {
            left
        } else {
            (left + right) / 2.0
        } / MAX_MEDIA_VOLUME;
        *self.core.volume.lock() = Some(volume);
        if *self.core.state.lock() == StateId::Playing {
            self.core.audio_sink.set_volume(volume)?;
        }
        Ok(())
    }

    /// Loop playback at end of stream.
    pub fn set_loop(&self, looping: bool) {
        self.core.looping.store(looping, Ordering::Release);
    }

    /// Override the source read chunk size.
    pub fn set_buffer_size(&self, size: usize) {
        self.core.source.set_buffer_size(size);
    }

    /// Current playback position in milliseconds.
    pub fn current_time_ms(&self) -> i64 {
        hst_time_to_ms(self.core.stats.current_position())
    }

    /// Total duration in milliseconds; `-1` for unseekable sources.
    pub fn duration_ms(&self) -> Result<i64, ErrorCode> {
        if !self.core.source.is_seekable() {
            return Ok(-1);
        }
        if let Some(global) = self.core.demuxer.global_meta() {
            if let Some(duration) = global.get_i64(Tag::MediaDuration) {
                return Ok(hst_time_to_ms(duration));
            }
        }
        // fall back to the longest track duration
        let longest = self
            .core
            .demuxer
            .stream_metas()
            .iter()
            .filter_map(|meta| meta.get_i64(Tag::MediaDuration))
            .max();
        match longest {
            Some(duration) => Ok(hst_time_to_ms(duration)),
            None => Err(ErrorCode::Again),
        }
    }

    /// Number of tracks in the attached source.
    pub fn track_count(&self) -> usize {
        self.core.demuxer.stream_metas().len()
    }

    /// Container-level meta.
    pub fn source_meta(&self) -> Option<Meta> {
        self.core.demuxer.global_meta()
    }

    /// Meta of one track.
    pub fn track_meta(&self, index: usize) -> Option<Meta> {
        self.core.demuxer.stream_metas().get(index).cloned()
    }

    /// Stop and return to the idle state.
    pub fn reset(&self) -> Result<(), ErrorCode> {
        let _ = self.stop();
        self.core.looping.store(false, Ordering::Release);
        self.core.stats.reset();
        *self.core.state.lock() = StateId::Init;
        self.core.state_cond.notify_all();
        Ok(())
    }

    /// Tear the engine down; it cannot be used afterwards.
    pub fn release(&self) {
        let _ = self.reset();
        self.core.intents.set_active(false);
        self.fsm_task.stop();
    }
}

impl Drop for PlayerEngine {
    fn drop(&mut self) {
        self.release();
    }
}

impl PlayerCore {
    fn send_sync(&self, intent: Intent) -> Result<(), ErrorCode> {
        let waiter = Arc::new(IntentWaiter::default());
        let msg = IntentMsg {
            intent,
            waiter: Some(Arc::clone(&waiter)),
        };
        if !self.intents.push(msg) {
            return Err(ErrorCode::InvalidState);
        }
        waiter.wait()
    }

    fn send_async(&self, intent: Intent) {
        let msg = IntentMsg {
            intent,
            waiter: None,
        };
        if !self.intents.push(msg) {
            warn!("intent dropped, player is shutting down");
        }
    }

    fn process_one_intent(&self) {
        let Some(msg) = self.intents.pop() else {
            return;
        };
        let state = *self.state.lock();
        let looping = self.looping.load(Ordering::Acquire);
        let result = match dispatch(state, &msg.intent, looping) {
            Err(code) => {
                debug!("intent {:?} rejected in {:?}", msg.intent, state);
                Err(code)
            }
            Ok((action, next)) => {
                let result = self.execute(action, &msg.intent);
                match result {
                    Ok(()) => {
                        if let Some(next) = next {
                            self.transition(next);
                        }
                    }
                    Err(code) => {
                        *self.last_error.lock() = Some(code);
                        // do_seek reports its own failures as seek errors
                        if action != Action::Seek {
                            self.notify_error(PlayerErrorType::Unknown, code);
                        }
                    }
                }
                result
            }
        };
        if let Some(waiter) = msg.waiter {
            waiter.complete(result);
        }
    }

    fn execute(&self, action: Action, intent: &Intent) -> Result<(), ErrorCode> {
        match action {
            Action::None => Ok(()),
            Action::SetSource => {
                let Intent::SetSource(source) = intent else {
                    return Err(ErrorCode::InvalidParameterValue);
                };
                self.source.set_source(source.clone())?;
                self.pipeline.prepare()
            }
            Action::Prepare => self.pipeline.prepare(),
            Action::Play => {
                self.apply_volume();
                self.pipeline.start()
            }
            Action::Resume => {
                self.apply_volume();
                self.pipeline.resume()
            }
            Action::Pause => self.pipeline.pause(),
            Action::Stop => {
                self.stats.reset();
                // flushing first opens every blocking gate, so no worker is
                // left parked inside a peer while its task gets joined
                self.pipeline.flush_start();
                self.pipeline.stop()
            }
            Action::Seek => {
                let Intent::Seek(ticks) = intent else {
                    return Err(ErrorCode::InvalidParameterValue);
                };
                self.do_seek(*ticks)
            }
            Action::Replay => {
                self.do_seek(0)?;
                self.pipeline.start()
            }
            Action::OnReady => {
                *self.last_error.lock() = None;
                debug!("stream meta captured: {} tracks", self.demuxer.stream_metas().len());
                Ok(())
            }
            Action::OnComplete => {
                self.notify_info(InfoType::Eos, 0);
                self.send_async(Intent::Stop);
                Ok(())
            }
            Action::OnCompleteLoop => {
                self.notify_info(InfoType::Eos, 0);
                self.send_async(Intent::Seek(0));
                Ok(())
            }
            Action::OnError => {
                let Intent::NotifyError(code) = intent else {
                    return Err(ErrorCode::InvalidParameterValue);
                };
                error!("pipeline error: {}", code);
                *self.last_error.lock() = Some(*code);
                self.notify_error(PlayerErrorType::Unknown, *code);
                Ok(())
            }
        }
    }

    fn do_seek(&self, ticks: i64) -> Result<(), ErrorCode> {
        if ticks < 0 {
            return Err(ErrorCode::InvalidParameterValue);
        }
        let previous = {
            let mut state = self.state.lock();
            let previous = *state;
            *state = StateId::Seeking;
            previous
        };
        let mode = *self.seek_mode.lock();
        let result = (|| {
            self.pipeline.flush_start();
            self.pipeline.flush_end();
            self.demuxer.seek_to(ticks, mode)?;
            self.stats.set_all_positions(ticks);
            Ok(())
        })();
        {
            let mut state = self.state.lock();
            *state = previous;
        }
        self.state_cond.notify_all();
        match result {
            Ok(()) => self.notify_info(InfoType::SeekDone, hst_time_to_ms(ticks)),
            Err(code) => self.notify_error(PlayerErrorType::Seek, code),
        }
        result
    }

    fn apply_volume(&self) {
        if let Some(volume) = *self.volume.lock() {
            if let Err(error) = self.audio_sink.set_volume(volume) {
                warn!("volume not applied: {}", error);
            }
        }
    }

    fn transition(&self, next: StateId) {
        {
            let mut state = self.state.lock();
            if *state == next {
                return;
            }
            info!("player state {:?} -> {:?}", *state, next);
            *state = next;
        }
        self.state_cond.notify_all();
        self.notify_info(InfoType::StateChange, state_code(next));
    }

    fn notify_info(&self, info: InfoType, extra: i64) {
        if let Some(observer) = self.observer.read().clone() {
            observer.on_info(info, extra);
        }
    }

    fn notify_error(&self, error_type: PlayerErrorType, error: ErrorCode) {
        if let Some(observer) = self.observer.read().clone() {
            observer.on_error(error_type, error);
        }
    }

    fn demuxer_id(&self) -> Option<FilterId> {
        let demuxer: Arc<dyn Filter> = Arc::clone(&self.demuxer) as Arc<dyn Filter>;
        self.pipeline.id_of(&demuxer)
    }

    fn wire_new_ports(&self, info: &PortInfo) -> Result<(), ErrorCode> {
        let demuxer: Arc<dyn Filter> = Arc::clone(&self.demuxer) as Arc<dyn Filter>;
        for desc in &info.ports {
            if desc.name.starts_with(crate::pipeline::port::PORT_NAME_AUDIO_PREFIX) {
                info!("wiring audio chain for port {}", desc.name);
                let sink: Arc<dyn Filter> = Arc::clone(&self.audio_sink) as Arc<dyn Filter>;
                if desc.is_pcm {
                    self.pipeline.add_filters(std::slice::from_ref(&sink))?;
                    self.pipeline
                        .link_ports((&demuxer, &desc.name), (&sink, PORT_NAME_DEFAULT))?;
                    self.audio_sink.prepare()?;
                } else {
                    let decoder = self.audio_decoder_for(&desc.name);
                    let decoder_dyn: Arc<dyn Filter> = Arc::clone(&decoder) as Arc<dyn Filter>;
                    self.pipeline
                        .add_filters(&[Arc::clone(&decoder_dyn), Arc::clone(&sink)])?;
                    self.pipeline
                        .link_ports((&demuxer, &desc.name), (&decoder_dyn, PORT_NAME_DEFAULT))?;
                    self.pipeline
                        .link_ports((&decoder_dyn, PORT_NAME_DEFAULT), (&sink, PORT_NAME_DEFAULT))?;
                    // leaves first, so the sink can accept before the decoder produces
                    self.audio_sink.prepare()?;
                    decoder.prepare()?;
                }
                self.stats.append(MediaType::Audio);
            } else if desc.name.starts_with(crate::pipeline::port::PORT_NAME_VIDEO_PREFIX) {
                info!("wiring video chain for port {}", desc.name);
                let sink: Arc<dyn Filter> = Arc::clone(&self.video_sink) as Arc<dyn Filter>;
                let decoder = self.video_decoder_for(&desc.name);
                let decoder_dyn: Arc<dyn Filter> = Arc::clone(&decoder) as Arc<dyn Filter>;
                self.pipeline
                    .add_filters(&[Arc::clone(&decoder_dyn), Arc::clone(&sink)])?;
                self.pipeline
                    .link_ports((&demuxer, &desc.name), (&decoder_dyn, PORT_NAME_DEFAULT))?;
                self.pipeline
                    .link_ports((&decoder_dyn, PORT_NAME_DEFAULT), (&sink, PORT_NAME_DEFAULT))?;
                self.video_sink.prepare()?;
                decoder.prepare()?;
                self.stats.append(MediaType::Video);
            }
        }
        Ok(())
    }

    fn unwire_ports(&self, info: &PortInfo) -> Result<(), ErrorCode> {
        let Some(demuxer_id) = self.demuxer_id() else {
            return Ok(());
        };
        for desc in &info.ports {
            if let Some((peer, _)) = self
                .pipeline
                .graph()
                .downstream_of(demuxer_id, &desc.name)
            {
                info!("removing chain behind port {}", desc.name);
                self.pipeline.remove_filter_chain(&peer)?;
            }
        }
        Ok(())
    }

    fn audio_decoder_for(&self, port: &str) -> Arc<CodecFilter> {
        let mut decoders = self.audio_decoders.lock();
        if let Some((_, decoder)) = decoders.iter().find(|(name, _)| name == port) {
            return Arc::clone(decoder);
        }
        let decoder = CodecFilter::new(
            format!("audiodecoder-{}", port),
            CodecKind::AudioDecoder,
            CodecWorkMode::Async,
            Arc::clone(&self.registry),
        );
        decoders.push((port.to_string(), Arc::clone(&decoder)));
        decoder
    }

    fn video_decoder_for(&self, port: &str) -> Arc<CodecFilter> {
        let mut decoders = self.video_decoders.lock();
        if let Some((_, decoder)) = decoders.iter().find(|(name, _)| name == port) {
            return Arc::clone(decoder);
        }
        let decoder = CodecFilter::new(
            format!("videodecoder-{}", port),
            CodecKind::VideoDecoder,
            CodecWorkMode::Async,
            Arc::clone(&self.registry),
        );
        decoders.push((port.to_string(), Arc::clone(&decoder)));
        decoder
    }
}

impl EventReceiver for PlayerCore {
    fn on_event(&self, event: Event) {
        match event.kind {
            EventKind::Ready => self.send_async(Intent::NotifyReady),
            EventKind::Error(code) => self.send_async(Intent::NotifyError(code)),
            EventKind::AudioComplete => {
                if self.stats.on_complete(MediaType::Audio) {
                    self.send_async(Intent::NotifyComplete);
                }
            }
            EventKind::VideoComplete => {
                if self.stats.on_complete(MediaType::Video) {
                    self.send_async(Intent::NotifyComplete);
                }
            }
            EventKind::AudioProgress(pts) => self.stats.on_progress(MediaType::Audio, pts),
            EventKind::VideoProgress(pts) => self.stats.on_progress(MediaType::Video, pts),
            EventKind::BufferingProgress(percent) => {
                self.notify_info(InfoType::BufferingProgress, percent as i64)
            }
            EventKind::OutputComplete => {
                debug!("ignoring recorder event from {}", event.source)
            }
        }
    }
}

impl FilterCallback for PlayerCore {
    fn on_callback(
        &self,
        callback_type: CallbackType,
        filter: FilterId,
        info: &PortInfo,
    ) -> Result<(), ErrorCode> {
        if Some(filter) != self.demuxer_id() {
            return Ok(());
        }
        match callback_type {
            CallbackType::PortAdded => self.wire_new_ports(info),
            CallbackType::PortRemove => self.unwire_ports(info),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeMedia, ObservedEvent, PlayerFixture, TestObserver};
    use std::time::Duration;

    const STOPPED: i64 = 6;

    fn engine_with(
        media: FakeMedia,
        sink_write_sleep_ms: u64,
    ) -> (PlayerEngine, Arc<TestObserver>, PlayerFixture) {
        testing::init_logging();
        let fixture = testing::player_fixture(
            media,
            Duration::from_millis(sink_write_sleep_ms),
            0,
        );
        let player = PlayerEngine::new(Arc::clone(&fixture.registry)).unwrap();
        let observer = TestObserver::new();
        player.set_observer(observer.clone());
        (player, observer, fixture)
    }

    fn sample_uri() -> MediaSource {
        MediaSource::Uri("file:///res/sample.mp3".into())
    }

    #[test]
    fn test_play_local_file_to_completion() {
        let (player, observer, fixture) = engine_with(FakeMedia::single_audio(10, 20), 5);
        player.set_source(sample_uri()).unwrap();
        player.prepare().unwrap();
        player.play().unwrap();

        assert!(observer.wait_for(Duration::from_secs(5), |events| {
            events.contains(&ObservedEvent::Info(InfoType::Eos, 0))
                && events.contains(&ObservedEvent::Info(InfoType::StateChange, STOPPED))
        }));
        let events = observer.snapshot();
        let position = |needle: ObservedEvent| {
            events
                .iter()
                .position(|e| *e == needle)
                .unwrap_or_else(|| panic!("missing {:?}", needle))
        };
        let preparing = position(ObservedEvent::Info(InfoType::StateChange, 1));
        let ready = position(ObservedEvent::Info(InfoType::StateChange, 2));
        let playing = position(ObservedEvent::Info(InfoType::StateChange, 3));
        let eos = position(ObservedEvent::Info(InfoType::Eos, 0));
        let stopped = position(ObservedEvent::Info(InfoType::StateChange, STOPPED));
        assert!(preparing < ready && ready < playing && playing < eos && eos < stopped);

        assert_eq!(fixture.audio_sink.write_count(), 10);
        let writes = fixture.audio_sink.writes.lock().clone();
        assert!(writes.windows(2).all(|w| w[0].0 <= w[1].0), "pts ordered");
        assert_eq!(player.state(), StateId::Stopped);
    }

    #[test]
    fn test_volume_validation_and_normalization() {
        let (player, observer, fixture) = engine_with(FakeMedia::single_audio(200, 20), 5);
        assert_eq!(
            player.set_volume(-1.0, 10.0),
            Err(ErrorCode::InvalidParameterValue)
        );
        assert!(fixture.audio_sink.volumes.lock().is_empty());

        player.set_source(sample_uri()).unwrap();
        player.prepare().unwrap();
        player.play().unwrap();
        assert!(observer.wait_for(Duration::from_secs(2), |events| {
            events.contains(&ObservedEvent::Info(InfoType::StateChange, 3))
        }));

        player.set_volume(80.0, 80.0).unwrap();
        let volumes = fixture.audio_sink.volumes.lock().clone();
        assert_eq!(volumes.len(), 1);
        assert!((volumes[0] - 0.8).abs() < 1e-6);
        player.stop().unwrap();
    }

    #[test]
    fn test_seek_while_playing() {
        let (player, observer, fixture) = engine_with(FakeMedia::single_audio(100, 100), 2);
        player.set_source(sample_uri()).unwrap();
        player.prepare().unwrap();
        player.play().unwrap();
        assert!(testing::wait_until(Duration::from_secs(2), || {
            fixture.audio_sink.write_count() >= 5
        }));

        player.seek(5000).unwrap();
        assert!(observer.wait_for(Duration::from_secs(2), |events| {
            events.contains(&ObservedEvent::Info(InfoType::SeekDone, 5000))
        }));
        // give the in-flight pre-seek write a moment to land
        std::thread::sleep(Duration::from_millis(50));
        let mark = fixture.audio_sink.write_count();
        assert!(testing::wait_until(Duration::from_secs(2), || {
            fixture.audio_sink.write_count() > mark
        }));
        let writes = fixture.audio_sink.writes.lock().clone();
        for (pts, _) in &writes[mark..] {
            assert!(
                hst_time_to_ms(*pts) >= 4900,
                "post-seek frame at {} ms",
                hst_time_to_ms(*pts)
            );
        }
        assert!(testing::wait_until(Duration::from_secs(2), || {
            player.current_time_ms() >= 5000
        }));
        player.stop().unwrap();
    }

    #[test]
    fn test_plugin_reuse_on_renegotiation() {
        let (player, _observer, fixture) = engine_with(FakeMedia::single_audio(5, 10), 1);
        player.set_source(sample_uri()).unwrap();
        player.prepare().unwrap();
        assert_eq!(
            fixture
                .audio_codec_created
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );

        player.stop().unwrap();
        player.prepare().unwrap();
        // the same plugin name was selected again: reset, no new instance
        assert_eq!(
            fixture
                .audio_codec_created
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
        assert!(
            fixture
                .audio_codec
                .reset_count
                .load(std::sync::atomic::Ordering::SeqCst)
                >= 1
        );
    }

    #[test]
    fn test_dynamic_port_wiring_audio_and_video() {
        let (player, observer, fixture) = engine_with(FakeMedia::audio_and_video(10, 50), 2);
        player.set_source(sample_uri()).unwrap();
        player.prepare().unwrap();

        let ports = Filter::out_ports(&*player.core.demuxer);
        assert_eq!(ports, vec!["audio0".to_string(), "video1".to_string()]);
        assert_eq!(player.core.audio_decoders.lock().len(), 1);
        assert_eq!(player.core.video_decoders.lock().len(), 1);
        assert_eq!(player.track_count(), 2);

        player.play().unwrap();
        assert!(observer.wait_for(Duration::from_secs(5), |events| {
            events.contains(&ObservedEvent::Info(InfoType::StateChange, STOPPED))
        }));
        assert_eq!(fixture.audio_sink.write_count(), 10);
        assert_eq!(fixture.video_sink.write_count(), 10);
    }

    #[test]
    fn test_duration_and_track_meta() {
        let (player, _observer, _fixture) = engine_with(FakeMedia::single_audio(10, 20), 1);
        player.set_source(sample_uri()).unwrap();
        player.prepare().unwrap();
        assert_eq!(player.duration_ms(), Ok(200));
        assert_eq!(player.track_count(), 1);
        let meta = player.track_meta(0).unwrap();
        assert_eq!(
            meta.get_string(Tag::Mime),
            Some(mediaflow_plugin_api::mime::AUDIO_MPEG)
        );
        assert!(player.source_meta().is_some());
    }

    #[test]
    fn test_wrong_state_intents_have_no_side_effects() {
        let (player, _observer, fixture) = engine_with(FakeMedia::single_audio(5, 10), 1);
        assert_eq!(player.play(), Err(ErrorCode::WrongState));
        assert_eq!(player.pause(), Err(ErrorCode::WrongState));
        assert_eq!(player.state(), StateId::Init);
        assert_eq!(fixture.audio_sink.write_count(), 0);
    }

    #[test]
    fn test_loop_restarts_instead_of_stopping() {
        let (player, observer, fixture) = engine_with(FakeMedia::single_audio(5, 20), 2);
        player.set_loop(true);
        player.set_source(sample_uri()).unwrap();
        player.prepare().unwrap();
        player.play().unwrap();
        // two loop iterations worth of frames arrive without a stop
        assert!(testing::wait_until(Duration::from_secs(5), || {
            fixture.audio_sink.write_count() >= 10
        }));
        assert_ne!(player.state(), StateId::Stopped);
        let events = observer.snapshot();
        assert!(!events.contains(&ObservedEvent::Info(InfoType::StateChange, STOPPED)));
        player.stop().unwrap();
    }
}
