// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scriptable fake plugins and fixtures shared by the engine tests.
//!
//! The fakes speak an invented container: a magic prefix plus frames the
//! demuxer fake is configured with directly. The codec fake is a passthrough
//! that can be scripted to reject its first N inputs with `ERROR_AGAIN`, and
//! the sinks record everything they are given.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mediaflow_plugin_api::{
    mime, time::HST_MSECOND, AudioSampleFormat, AudioSinkPlugin, Buffer, BufferFlags,
    BufferRejected, Capability, CodecDataCallback, CodecPlugin, DataSource, DemuxerPlugin,
    MediaInfo, MediaSource, MediaType, Meta, MuxerPlugin, OutputSinkPlugin, PluginBase,
    PluginInfo, PluginType, ProtocolKind, SeekMode, SourcePlugin, Status, Tag, TagValue,
    VideoSinkPlugin,
};
use parking_lot::{Condvar, Mutex};

use crate::player::{InfoType, PlayerErrorType, PlayerObserver};
use crate::plugin::{PluginRegistry, RegistryBuilder};

/// Magic prefix of the fake container format.
pub const MAGIC: &[u8] = b"FAKEMEDIA\0";

/// Initialize test logging once; respects `RUST_LOG`.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `pred` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    pred()
}

// ---------------------------------------------------------------------------
// Fake media description
// ---------------------------------------------------------------------------

pub struct FakeFrame {
    pub pts: i64,
    pub data: Vec<u8>,
}

pub struct FakeTrack {
    pub meta: Meta,
    pub frames: Vec<FakeFrame>,
}

pub struct FakeMedia {
    pub global: Meta,
    pub tracks: Vec<FakeTrack>,
}

impl FakeMedia {
    /// One MP3-like audio track of `frame_count` frames, `frame_ms` apart.
    pub fn single_audio(frame_count: usize, frame_ms: i64) -> FakeMedia {
        let duration = frame_count as i64 * frame_ms * HST_MSECOND;
        let frames = (0..frame_count)
            .map(|i| FakeFrame {
                pts: i as i64 * frame_ms * HST_MSECOND,
                data: vec![i as u8; 128],
            })
            .collect();
        FakeMedia {
            global: Meta::new().with(Tag::MediaDuration, TagValue::I64(duration)),
            tracks: vec![FakeTrack {
                meta: Meta::new()
                    .with(Tag::Mime, TagValue::String(mime::AUDIO_MPEG.into()))
                    .with(Tag::AudioSampleRate, TagValue::U32(44100))
                    .with(Tag::AudioChannels, TagValue::U32(2))
                    .with(Tag::MediaDuration, TagValue::I64(duration)),
                frames,
            }],
        }
    }

    /// One audio and one video track.
    pub fn audio_and_video(frame_count: usize, frame_ms: i64) -> FakeMedia {
        let mut media = FakeMedia::single_audio(frame_count, frame_ms);
        let frames = (0..frame_count)
            .map(|i| FakeFrame {
                pts: i as i64 * frame_ms * HST_MSECOND,
                data: vec![0xAB; 256],
            })
            .collect();
        media.tracks.push(FakeTrack {
            meta: Meta::new()
                .with(Tag::Mime, TagValue::String(mime::VIDEO_H264.into()))
                .with(Tag::VideoWidth, TagValue::U32(320))
                .with(Tag::VideoHeight, TagValue::U32(240)),
            frames,
        });
        media
    }

    /// Bytes a source plugin serves for this media.
    pub fn container_bytes(&self) -> Vec<u8> {
        let mut bytes = MAGIC.to_vec();
        bytes.resize(4096, 0);
        bytes
    }

    fn flattened(&self) -> Vec<(u32, i64, Vec<u8>)> {
        let mut frames: Vec<(u32, i64, Vec<u8>)> = self
            .tracks
            .iter()
            .enumerate()
            .flat_map(|(index, track)| {
                track
                    .frames
                    .iter()
                    .map(move |f| (index as u32, f.pts, f.data.clone()))
            })
            .collect();
        frames.sort_by_key(|(_, pts, _)| *pts);
        frames
    }
}

// ---------------------------------------------------------------------------
// Source fakes
// ---------------------------------------------------------------------------

/// Seekable byte source over in-memory content.
pub struct FakeSourcePlugin {
    content: Arc<Vec<u8>>,
    position: Mutex<u64>,
}

impl FakeSourcePlugin {
    pub fn new(content: Arc<Vec<u8>>) -> Arc<Self> {
        Arc::new(FakeSourcePlugin {
            content,
            position: Mutex::new(0),
        })
    }
}

impl PluginBase for FakeSourcePlugin {}

impl SourcePlugin for FakeSourcePlugin {
    fn set_source(&self, _source: &MediaSource) -> Status {
        *self.position.lock() = 0;
        Status::Ok
    }

    fn read(&self, buffer: &mut Buffer, expected_len: usize) -> Status {
        let mut position = self.position.lock();
        let len = self.content.len() as u64;
        if *position >= len {
            return Status::EndOfStream;
        }
        let available = (len - *position) as usize;
        let want = expected_len.min(available);
        let start = *position as usize;
        let written = buffer.memory_mut(expected_len).assign(&self.content[start..start + want]);
        *position += written as u64;
        Status::Ok
    }

    fn get_size(&self) -> Option<u64> {
        Some(self.content.len() as u64)
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn seek_to(&self, offset: u64) -> Status {
        *self.position.lock() = offset.min(self.content.len() as u64);
        Status::Ok
    }
}

/// Unseekable capture source delivering a fixed number of PCM chunks.
pub struct FakeStreamSourcePlugin {
    chunks_left: Mutex<usize>,
}

impl FakeStreamSourcePlugin {
    pub fn new(chunks: usize) -> Arc<Self> {
        Arc::new(FakeStreamSourcePlugin {
            chunks_left: Mutex::new(chunks),
        })
    }
}

impl PluginBase for FakeStreamSourcePlugin {}

impl SourcePlugin for FakeStreamSourcePlugin {
    fn set_source(&self, _source: &MediaSource) -> Status {
        Status::Ok
    }

    fn read(&self, buffer: &mut Buffer, expected_len: usize) -> Status {
        let mut left = self.chunks_left.lock();
        if *left == 0 {
            return Status::EndOfStream;
        }
        *left -= 1;
        buffer.memory_mut(expected_len).assign(&vec![0x55; expected_len]);
        Status::Ok
    }

    fn get_size(&self) -> Option<u64> {
        None
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn seek_to(&self, _offset: u64) -> Status {
        Status::ErrorUnimplemented
    }
}

// ---------------------------------------------------------------------------
// Demuxer fake
// ---------------------------------------------------------------------------

pub struct FakeDemuxerPlugin {
    global: Meta,
    track_metas: Vec<Meta>,
    frames: Vec<(u32, i64, Vec<u8>)>,
    cursor: Mutex<usize>,
    source: Mutex<Option<Arc<dyn DataSource>>>,
    pub reset_count: AtomicUsize,
}

impl FakeDemuxerPlugin {
    pub fn new(media: &FakeMedia) -> Arc<Self> {
        Arc::new(FakeDemuxerPlugin {
            global: media.global.clone(),
            track_metas: media.tracks.iter().map(|t| t.meta.clone()).collect(),
            frames: media.flattened(),
            cursor: Mutex::new(0),
            source: Mutex::new(None),
            reset_count: AtomicUsize::new(0),
        })
    }
}

impl PluginBase for FakeDemuxerPlugin {
    fn reset(&self) -> Status {
        self.reset_count.fetch_add(1, Ordering::SeqCst);
        *self.cursor.lock() = 0;
        Status::Ok
    }

    fn stop(&self) -> Status {
        *self.cursor.lock() = 0;
        Status::Ok
    }
}

impl DemuxerPlugin for FakeDemuxerPlugin {
    fn set_data_source(&self, source: Arc<dyn DataSource>) -> Status {
        *self.source.lock() = Some(source);
        Status::Ok
    }

    fn get_media_info(&self) -> Result<MediaInfo, Status> {
        // parse the "header": the magic prefix must be readable
        let source = self.source.lock().clone().ok_or(Status::ErrorInvalidState)?;
        let mut header = Buffer::with_capacity(MediaType::Generic, MAGIC.len());
        match source.read_at(0, MAGIC.len(), &mut header) {
            Status::Ok => {}
            status => return Err(status),
        }
        if header.as_slice() != MAGIC {
            return Err(Status::ErrorUnsupportedFormat);
        }
        Ok(MediaInfo {
            global: self.global.clone(),
            tracks: self.track_metas.clone(),
        })
    }

    fn read_frame(&self, buffer: &mut Buffer, _timeout_ms: u64) -> Status {
        let mut cursor = self.cursor.lock();
        let Some((stream, pts, data)) = self.frames.get(*cursor) else {
            return Status::EndOfStream;
        };
        buffer.memory_mut(data.len()).assign(data);
        buffer.pts = *pts;
        buffer.dts = *pts;
        buffer.stream_index = *stream;
        buffer.flags = BufferFlags::KEY_FRAME;
        *cursor += 1;
        Status::Ok
    }

    fn seek_to(&self, _track: Option<u32>, time: i64, mode: SeekMode) -> Status {
        let mut cursor = self.cursor.lock();
        let next = self.frames.iter().position(|(_, pts, _)| *pts >= time);
        *cursor = match mode {
            SeekMode::NextSync => next.unwrap_or(self.frames.len()),
            SeekMode::PreviousSync | SeekMode::ClosestSync => match next {
                Some(i) if self.frames.get(i).map(|f| f.1) == Some(time) => i,
                Some(i) => i.saturating_sub(1),
                None => self.frames.len().saturating_sub(1),
            },
        };
        Status::Ok
    }

    fn get_track_count(&self) -> u32 {
        self.track_metas.len() as u32
    }
}

// ---------------------------------------------------------------------------
// Codec fake
// ---------------------------------------------------------------------------

struct CodecQueues {
    inputs: VecDeque<Buffer>,
    outputs: VecDeque<Buffer>,
}

/// Passthrough codec; can be scripted to reject its first N inputs.
pub struct FakeCodecPlugin {
    queues: Mutex<CodecQueues>,
    callback: Mutex<Option<Arc<dyn CodecDataCallback>>>,
    again_budget: AtomicUsize,
    pub input_attempts: AtomicUsize,
    pub inputs_accepted: AtomicUsize,
    pub reset_count: AtomicUsize,
}

impl FakeCodecPlugin {
    pub fn new() -> Arc<Self> {
        Self::with_again(0)
    }

    /// Reject the first `again` inputs with `ERROR_AGAIN`.
    pub fn with_again(again: usize) -> Arc<Self> {
        Arc::new(FakeCodecPlugin {
            queues: Mutex::new(CodecQueues {
                inputs: VecDeque::new(),
                outputs: VecDeque::new(),
            }),
            callback: Mutex::new(None),
            again_budget: AtomicUsize::new(again),
            input_attempts: AtomicUsize::new(0),
            inputs_accepted: AtomicUsize::new(0),
            reset_count: AtomicUsize::new(0),
        })
    }

    /// Fire `on_output_buffer_done` with an empty DISCARD buffer, as a codec
    /// does when it frees an output slot without producing a frame.
    pub fn emit_discard_output(&self) {
        if let Some(callback) = self.callback.lock().clone() {
            let mut buffer = Buffer::new(MediaType::Generic);
            buffer.flags = BufferFlags::DISCARD;
            callback.on_output_buffer_done(buffer);
        }
    }

    fn drain(&self) {
        loop {
            let pair = {
                let mut queues = self.queues.lock();
                if queues.inputs.is_empty() || queues.outputs.is_empty() {
                    return;
                }
                let input = queues.inputs.pop_front().expect("nonempty inputs");
                let output = queues.outputs.pop_front().expect("nonempty outputs");
                (input, output)
            };
            let (input, mut output) = pair;
            output.reset();
            output.memory_mut(input.size().max(1)).assign(input.as_slice());
            output.pts = input.pts;
            output.dts = input.dts;
            output.duration = input.duration;
            output.flags = input.flags;
            output.stream_index = input.stream_index;
            let callback = self.callback.lock().clone();
            if let Some(callback) = callback {
                callback.on_input_buffer_done(input);
                callback.on_output_buffer_done(output);
            }
        }
    }
}

impl PluginBase for FakeCodecPlugin {
    fn reset(&self) -> Status {
        self.reset_count.fetch_add(1, Ordering::SeqCst);
        let mut queues = self.queues.lock();
        queues.inputs.clear();
        queues.outputs.clear();
        Status::Ok
    }
}

impl CodecPlugin for FakeCodecPlugin {
    fn flush(&self) -> Status {
        let mut queues = self.queues.lock();
        queues.inputs.clear();
        queues.outputs.clear();
        Status::Ok
    }

    fn set_data_callback(&self, callback: Arc<dyn CodecDataCallback>) -> Status {
        *self.callback.lock() = Some(callback);
        Status::Ok
    }

    fn queue_input_buffer(&self, buffer: Buffer, _timeout_ms: i64) -> Result<(), BufferRejected> {
        self.input_attempts.fetch_add(1, Ordering::SeqCst);
        if self
            .again_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |budget| {
                (budget > 0).then(|| budget - 1)
            })
            .is_ok()
        {
            return Err(BufferRejected {
                status: Status::ErrorAgain,
                buffer,
            });
        }
        self.inputs_accepted.fetch_add(1, Ordering::SeqCst);
        self.queues.lock().inputs.push_back(buffer);
        self.drain();
        Ok(())
    }

    fn queue_output_buffer(&self, buffer: Buffer, _timeout_ms: i64) -> Result<(), BufferRejected> {
        self.queues.lock().outputs.push_back(buffer);
        self.drain();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sink fakes
// ---------------------------------------------------------------------------

pub struct FakeAudioSinkPlugin {
    pub writes: Mutex<Vec<(i64, usize)>>,
    pub volumes: Mutex<Vec<f32>>,
    write_sleep: Duration,
}

impl FakeAudioSinkPlugin {
    pub fn new(write_sleep: Duration) -> Arc<Self> {
        Arc::new(FakeAudioSinkPlugin {
            writes: Mutex::new(Vec::new()),
            volumes: Mutex::new(Vec::new()),
            write_sleep,
        })
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }
}

impl PluginBase for FakeAudioSinkPlugin {}

impl AudioSinkPlugin for FakeAudioSinkPlugin {
    fn write(&self, buffer: &Buffer) -> Status {
        // simulates the device consuming the samples in real time
        std::thread::sleep(self.write_sleep);
        self.writes.lock().push((buffer.pts, buffer.size()));
        Status::Ok
    }

    fn set_volume(&self, volume: f32) -> Status {
        self.volumes.lock().push(volume);
        Status::Ok
    }
}

pub struct FakeVideoSinkPlugin {
    pub writes: Mutex<Vec<(i64, usize)>>,
}

impl FakeVideoSinkPlugin {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeVideoSinkPlugin {
            writes: Mutex::new(Vec::new()),
        })
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }
}

impl PluginBase for FakeVideoSinkPlugin {}

impl VideoSinkPlugin for FakeVideoSinkPlugin {
    fn write(&self, buffer: &Buffer) -> Status {
        self.writes.lock().push((buffer.pts, buffer.size()));
        Status::Ok
    }
}

// ---------------------------------------------------------------------------
// Recorder fakes
// ---------------------------------------------------------------------------

pub struct FakeMuxerPlugin {
    next_track: AtomicU32,
}

impl FakeMuxerPlugin {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeMuxerPlugin {
            next_track: AtomicU32::new(0),
        })
    }
}

impl PluginBase for FakeMuxerPlugin {}

impl MuxerPlugin for FakeMuxerPlugin {
    fn add_track(&self, _track_meta: &Meta) -> Result<u32, Status> {
        Ok(self.next_track.fetch_add(1, Ordering::SeqCst))
    }

    fn write_header(&self, out: &mut Buffer) -> Status {
        out.memory_mut(8).assign(b"HDR0");
        Status::Ok
    }

    fn write_frame(&self, track: u32, frame: &Buffer, out: &mut Buffer) -> Status {
        let memory = out.memory_mut(frame.size() + 2);
        memory.assign(&[b'F', track as u8]);
        memory.write(frame.as_slice());
        Status::Ok
    }

    fn write_trailer(&self, out: &mut Buffer) -> Status {
        out.memory_mut(8).assign(b"TRL0");
        Status::Ok
    }
}

pub struct FakeOutputSinkPlugin {
    pub bytes: Mutex<Vec<u8>>,
    pub fd: Mutex<Option<i32>>,
}

impl FakeOutputSinkPlugin {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeOutputSinkPlugin {
            bytes: Mutex::new(Vec::new()),
            fd: Mutex::new(None),
        })
    }
}

impl PluginBase for FakeOutputSinkPlugin {}

impl OutputSinkPlugin for FakeOutputSinkPlugin {
    fn set_fd(&self, fd: i32) -> Status {
        *self.fd.lock() = Some(fd);
        Status::Ok
    }

    fn write(&self, buffer: &Buffer) -> Status {
        self.bytes.lock().extend_from_slice(buffer.as_slice());
        Status::Ok
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEvent {
    Info(InfoType, i64),
    Error(PlayerErrorType, crate::ErrorCode),
}

#[derive(Default)]
pub struct TestObserver {
    events: Mutex<Vec<ObservedEvent>>,
    cond: Condvar,
}

impl TestObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(TestObserver::default())
    }

    pub fn snapshot(&self) -> Vec<ObservedEvent> {
        self.events.lock().clone()
    }

    pub fn wait_for(
        &self,
        timeout: Duration,
        mut pred: impl FnMut(&[ObservedEvent]) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock();
        while !pred(&events) {
            if self.cond.wait_until(&mut events, deadline).timed_out() {
                return pred(&events);
            }
        }
        true
    }
}

impl PlayerObserver for TestObserver {
    fn on_info(&self, info: InfoType, extra: i64) {
        self.events.lock().push(ObservedEvent::Info(info, extra));
        self.cond.notify_all();
    }

    fn on_error(&self, error_type: PlayerErrorType, error: crate::ErrorCode) {
        self.events
            .lock()
            .push(ObservedEvent::Error(error_type, error));
        self.cond.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub struct PlayerFixture {
    pub registry: Arc<PluginRegistry>,
    pub audio_sink: Arc<FakeAudioSinkPlugin>,
    pub video_sink: Arc<FakeVideoSinkPlugin>,
    pub audio_codec: Arc<FakeCodecPlugin>,
    pub audio_codec_created: Arc<AtomicUsize>,
    pub demuxer: Arc<FakeDemuxerPlugin>,
}

/// Registry with a full playback stack over `media`.
pub fn player_fixture(media: FakeMedia, write_sleep: Duration, codec_again: usize) -> PlayerFixture {
    let content = Arc::new(media.container_bytes());
    let audio_sink = FakeAudioSinkPlugin::new(write_sleep);
    let video_sink = FakeVideoSinkPlugin::new();
    let audio_codec = FakeCodecPlugin::with_again(codec_again);
    let audio_codec_created = Arc::new(AtomicUsize::new(0));
    let demuxer = FakeDemuxerPlugin::new(&media);

    let source_info = PluginInfo::new("mem.file.source", PluginType::Source, 100)
        .with_protocol(ProtocolKind::File)
        .with_protocol(ProtocolKind::Fd)
        .with_out_cap(Capability::new(mime::APPLICATION_OCTET_STREAM));
    let demuxer_info = PluginInfo::new("fake.container.demuxer", PluginType::Demuxer, 100)
        .with_in_cap(Capability::new(mime::APPLICATION_OCTET_STREAM))
        .with_out_cap(Capability::new(mime::AUDIO_MPEG))
        .with_out_cap(Capability::new(mime::VIDEO_H264));
    let audio_codec_info = PluginInfo::new("fake.mpeg.dec", PluginType::Codec, 100)
        .with_in_cap(Capability::new(mime::AUDIO_MPEG))
        .with_out_cap(
            Capability::new(mime::AUDIO_RAW)
                .with_fixed(
                    Tag::AudioSampleFormat,
                    TagValue::SampleFormat(AudioSampleFormat::S16),
                )
                .with_list(
                    Tag::AudioSampleRate,
                    vec![TagValue::U32(44100), TagValue::U32(48000)],
                ),
        );
    let video_codec_info = PluginInfo::new("fake.avc.dec", PluginType::Codec, 90)
        .with_in_cap(Capability::new(mime::VIDEO_H264))
        .with_out_cap(Capability::new(mime::VIDEO_RAW));
    let audio_sink_info = PluginInfo::new("fake.audio.sink", PluginType::AudioSink, 100)
        .with_in_cap(
            Capability::new(mime::AUDIO_RAW)
                .with_fixed(
                    Tag::AudioSampleFormat,
                    TagValue::SampleFormat(AudioSampleFormat::S16),
                )
                .with_range(Tag::AudioSampleRate, 8000, 48000),
        );
    let video_sink_info = PluginInfo::new("fake.video.sink", PluginType::VideoSink, 100)
        .with_in_cap(Capability::new(mime::VIDEO_RAW));

    let registry = RegistryBuilder::new()
        .source(source_info, {
            let content = Arc::clone(&content);
            move || FakeSourcePlugin::new(Arc::clone(&content)) as Arc<dyn SourcePlugin>
        })
        .demuxer(
            demuxer_info,
            |data| data.starts_with(MAGIC),
            {
                let demuxer = Arc::clone(&demuxer);
                move || Arc::clone(&demuxer) as Arc<dyn DemuxerPlugin>
            },
        )
        .codec(audio_codec_info, {
            let codec = Arc::clone(&audio_codec);
            let created = Arc::clone(&audio_codec_created);
            move || {
                created.fetch_add(1, Ordering::SeqCst);
                Arc::clone(&codec) as Arc<dyn CodecPlugin>
            }
        })
        .codec(video_codec_info, || {
            FakeCodecPlugin::new() as Arc<dyn CodecPlugin>
        })
        .audio_sink(audio_sink_info, {
            let sink = Arc::clone(&audio_sink);
            move || Arc::clone(&sink) as Arc<dyn AudioSinkPlugin>
        })
        .video_sink(video_sink_info, {
            let sink = Arc::clone(&video_sink);
            move || Arc::clone(&sink) as Arc<dyn VideoSinkPlugin>
        })
        .build();

    PlayerFixture {
        registry,
        audio_sink,
        video_sink,
        audio_codec,
        audio_codec_created,
        demuxer,
    }
}

pub struct RecorderFixture {
    pub registry: Arc<PluginRegistry>,
    pub output: Arc<FakeOutputSinkPlugin>,
}

/// Registry with a capture → encode → mux → write stack.
pub fn recorder_fixture(capture_chunks: usize) -> RecorderFixture {
    let output = FakeOutputSinkPlugin::new();

    let capture_info = PluginInfo::new("fake.capture.source", PluginType::Source, 100)
        .with_protocol(ProtocolKind::Stream)
        .with_out_cap(Capability::new(mime::AUDIO_RAW));
    let encoder_info = PluginInfo::new("fake.aac.enc", PluginType::Codec, 100)
        .with_in_cap(Capability::new(mime::AUDIO_RAW))
        .with_out_cap(Capability::new(mime::AUDIO_AAC));
    let muxer_info = PluginInfo::new("fake.mp4.muxer", PluginType::Muxer, 100)
        .with_in_cap(Capability::new(mime::AUDIO_AAC))
        .with_out_cap(Capability::new(mime::MEDIA_MP4));
    let output_info = PluginInfo::new("fake.fd.sink", PluginType::OutputSink, 100)
        .with_in_cap(Capability::new(mime::ANY));

    let registry = RegistryBuilder::new()
        .source(capture_info, move || {
            FakeStreamSourcePlugin::new(capture_chunks) as Arc<dyn SourcePlugin>
        })
        .codec(encoder_info, || FakeCodecPlugin::new() as Arc<dyn CodecPlugin>)
        .muxer(muxer_info, || FakeMuxerPlugin::new() as Arc<dyn MuxerPlugin>)
        .output_sink(output_info, {
            let output = Arc::clone(&output);
            move || Arc::clone(&output) as Arc<dyn OutputSinkPlugin>
        })
        .build();

    RecorderFixture { registry, output }
}
