// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The recorder engine.
//!
//! Mirrors the player around the capture pipeline (capture → encoder →
//! muxer → output sink): the same intent-queue worker serializes API calls
//! and pipeline notifications through a small state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mediaflow_plugin_api::Meta;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::ErrorCode;
use crate::osal::Task;
use crate::pipeline::filters::{
    AudioCaptureFilter, CodecFilter, CodecKind, CodecWorkMode, MuxerFilter, OutputSinkFilter,
};
use crate::pipeline::port::PORT_NAME_DEFAULT;
use crate::pipeline::{
    CallbackType, Event, EventKind, EventReceiver, Filter, FilterCallback, FilterId, Pipeline,
    PortInfo,
};
use crate::plugin::PluginRegistry;
use crate::util::BlockingQueue;

/// Name of the muxer in-port carrying the audio track.
const AUDIO_TRACK_PORT: &str = "track0";

/// How long `stop` waits for the container to be finalized.
const FINALIZE_TIMEOUT: Duration = Duration::from_millis(500);

const INTENT_QUEUE_SIZE: usize = 16;

/// Recorder lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecorderState {
    /// Not configured.
    Init,
    /// Preparing the pipeline.
    Preparing,
    /// Ready to record.
    Ready,
    /// Recording.
    Recording,
    /// Paused.
    Paused,
    /// Stopped; container finalized.
    Stopped,
}

/// Recorder intents.
#[derive(Debug, Clone)]
pub enum RecorderIntent {
    /// Choose output descriptor and container format.
    SetOutput {
        /// Destination file descriptor.
        fd: i32,
        /// Container MIME type.
        mime: String,
    },
    /// Configure the capture format.
    ConfigureAudio(Meta),
    /// Prepare the pipeline.
    Prepare,
    /// Start recording.
    Start,
    /// Pause recording.
    Pause,
    /// Resume after pause.
    Resume,
    /// Stop and finalize the container.
    Stop,
    /// Pipeline reported ready.
    NotifyReady,
    /// Pipeline reported an error.
    NotifyError(ErrorCode),
}

/// Side effect for a recorder transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecorderAction {
    None,
    SetOutput,
    ConfigureAudio,
    Prepare,
    Start,
    Pause,
    Resume,
    Stop,
    OnError,
}

fn dispatch(
    state: RecorderState,
    intent: &RecorderIntent,
) -> Result<(RecorderAction, Option<RecorderState>), ErrorCode> {
    use RecorderAction as A;
    use RecorderState as S;
    let outcome = match (state, intent) {
        (S::Init, RecorderIntent::SetOutput { .. }) => (A::SetOutput, None),
        (S::Init, RecorderIntent::ConfigureAudio(_)) => (A::ConfigureAudio, None),
        (S::Init, RecorderIntent::Prepare) => (A::Prepare, Some(S::Preparing)),
        (S::Init, RecorderIntent::NotifyError(_)) => (A::OnError, Some(S::Init)),

        (S::Preparing, RecorderIntent::NotifyReady) => (A::None, Some(S::Ready)),
        (S::Preparing, RecorderIntent::NotifyError(_)) => (A::OnError, Some(S::Init)),
        (S::Preparing, RecorderIntent::Prepare) => (A::None, None),

        (S::Ready, RecorderIntent::Start) => (A::Start, Some(S::Recording)),
        (S::Ready, RecorderIntent::Stop) => (A::Stop, Some(S::Stopped)),
        (S::Ready, RecorderIntent::NotifyError(_)) => (A::OnError, Some(S::Init)),

        (S::Recording, RecorderIntent::Pause) => (A::Pause, Some(S::Paused)),
        (S::Recording, RecorderIntent::Stop) => (A::Stop, Some(S::Stopped)),
        (S::Recording, RecorderIntent::Start) => (A::None, None),
        (S::Recording, RecorderIntent::NotifyError(_)) => (A::OnError, Some(S::Init)),

        (S::Paused, RecorderIntent::Resume) => (A::Resume, Some(S::Recording)),
        (S::Paused, RecorderIntent::Pause) => (A::None, None),
        (S::Paused, RecorderIntent::Stop) => (A::Stop, Some(S::Stopped)),
        (S::Paused, RecorderIntent::NotifyError(_)) => (A::OnError, Some(S::Init)),

        (S::Stopped, RecorderIntent::Prepare) => (A::Prepare, Some(S::Preparing)),
        (S::Stopped, RecorderIntent::Stop) => (A::None, None),
        (S::Stopped, RecorderIntent::NotifyError(_)) => (A::OnError, Some(S::Init)),

        _ => return Err(ErrorCode::WrongState),
    };
    Ok(outcome)
}

/// Callbacks delivered to the recording client.
pub trait RecorderObserver: Send + Sync {
    /// The recorder changed state.
    fn on_state(&self, state: RecorderState);

    /// A fatal error occurred.
    fn on_error(&self, error: ErrorCode);
}

#[derive(Default)]
struct SyncWaiter {
    result: Mutex<Option<Result<(), ErrorCode>>>,
    cond: Condvar,
}

impl SyncWaiter {
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
    intent: RecorderIntent,
    waiter: Option<Arc<SyncWaiter>>,
}

struct RecorderCore {
    pipeline: Pipeline,
    capture: Arc<AudioCaptureFilter>,
    encoder: Arc<CodecFilter>,
    muxer: Arc<MuxerFilter>,
    output: Arc<OutputSinkFilter>,
    intents: BlockingQueue<IntentMsg>,
    state: Mutex<RecorderState>,
    state_cond: Condvar,
    finalized: AtomicBool,
    finalize_cond: Condvar,
    finalize_lock: Mutex<()>,
    observer: RwLock<Option<Arc<dyn RecorderObserver>>>,
}

/// An embedded audio recorder.
pub struct RecorderEngine {
    core: Arc<RecorderCore>,
    fsm_task: Arc<Task>,
}

impl RecorderEngine {
    /// Build a recorder over a plugin registry.
    pub fn new(registry: Arc<PluginRegistry>) -> Result<Self, ErrorCode> {
        let capture = AudioCaptureFilter::new("audioCapture", Arc::clone(&registry));
        let encoder = CodecFilter::new(
            "audioEncoder",
            CodecKind::AudioEncoder,
            CodecWorkMode::Sync,
            Arc::clone(&registry),
        );
        let muxer = MuxerFilter::new("muxer", Arc::clone(&registry));
        let output = OutputSinkFilter::new("outputSink", Arc::clone(&registry));
        let core = Arc::new(RecorderCore {
            pipeline: Pipeline::new(),
            capture,
            encoder,
            muxer,
            output,
            intents: BlockingQueue::new("recorder-intents", INTENT_QUEUE_SIZE),
            state: Mutex::new(RecorderState::Init),
            state_cond: Condvar::new(),
            finalized: AtomicBool::new(false),
            finalize_cond: Condvar::new(),
            finalize_lock: Mutex::new(()),
            observer: RwLock::new(None),
        });
        core.pipeline.init(
            Arc::downgrade(&core) as std::sync::Weak<dyn EventReceiver>,
            Arc::downgrade(&core) as std::sync::Weak<dyn FilterCallback>,
        );
        let chain: Vec<Arc<dyn Filter>> = vec![
            Arc::clone(&core.capture) as Arc<dyn Filter>,
            Arc::clone(&core.encoder) as Arc<dyn Filter>,
            Arc::clone(&core.muxer) as Arc<dyn Filter>,
            Arc::clone(&core.output) as Arc<dyn Filter>,
        ];
        core.pipeline.add_filters(&chain)?;
        core.pipeline
            .link_ports((&chain[0], PORT_NAME_DEFAULT), (&chain[1], PORT_NAME_DEFAULT))?;
        core.pipeline
            .link_ports((&chain[1], PORT_NAME_DEFAULT), (&chain[2], AUDIO_TRACK_PORT))?;
        core.pipeline
            .link_ports((&chain[2], PORT_NAME_DEFAULT), (&chain[3], PORT_NAME_DEFAULT))?;
        let worker = Arc::downgrade(&core);
        let fsm_task = Task::new("recorder-fsm", move || {
            if let Some(core) = worker.upgrade() {
                core.process_one_intent();
            }
        });
        fsm_task.start();
        info!("recorder engine initialized");
        Ok(RecorderEngine { core, fsm_task })
    }

    /// Install the observer.
    pub fn set_observer(&self, observer: Arc<dyn RecorderObserver>) {
        *self.core.observer.write() = Some(observer);
    }

    /// Choose output descriptor and container format.
    pub fn set_output(&self, fd: i32, mime: &str) -> Result<(), ErrorCode> {
        self.core.send_sync(RecorderIntent::SetOutput {
            fd,
            mime: mime.to_string(),
        })
    }

    /// Configure the capture format (sample rate, channels, format).
    pub fn configure_audio(&self, meta: Meta) -> Result<(), ErrorCode> {
        self.core.send_sync(RecorderIntent::ConfigureAudio(meta))
    }

    /// Prepare the pipeline; blocks until it is ready or failed.
    pub fn prepare(&self) -> Result<(), ErrorCode> {
        self.core.send_sync(RecorderIntent::Prepare)?;
        let mut state = self.core.state.lock();
        while *state == RecorderState::Preparing {
            self.core.state_cond.wait(&mut state);
        }
        if *state == RecorderState::Ready {
            Ok(())
        } else {
            Err(ErrorCode::InvalidState)
        }
    }

    /// Start recording.
    pub fn start(&self) -> Result<(), ErrorCode> {
        self.core.send_sync(RecorderIntent::Start)
    }

    /// Pause recording.
    pub fn pause(&self) -> Result<(), ErrorCode> {
        self.core.send_sync(RecorderIntent::Pause)
    }

    /// Resume after pause.
    pub fn resume(&self) -> Result<(), ErrorCode> {
        self.core.send_sync(RecorderIntent::Resume)
    }

    /// Stop and finalize the container.
    pub fn stop(&self) -> Result<(), ErrorCode> {
        self.core.send_sync(RecorderIntent::Stop)
    }

    /// Current recorder state.
    pub fn state(&self) -> RecorderState {
        *self.core.state.lock()
    }

    /// Tear the engine down.
    pub fn release(&self) {
        let _ = self.stop();
        self.core.intents.set_active(false);
        self.fsm_task.stop();
    }
}

impl Drop for RecorderEngine {
    fn drop(&mut self) {
        self.release();
    }
}

impl RecorderCore {
    fn send_sync(&self, intent: RecorderIntent) -> Result<(), ErrorCode> {
        let waiter = Arc::new(SyncWaiter::default());
        let msg = IntentMsg {
            intent,
            waiter: Some(Arc::clone(&waiter)),
        };
        if !self.intents.push(msg) {
            return Err(ErrorCode::InvalidState);
        }
        waiter.wait()
    }

    fn send_async(&self, intent: RecorderIntent) {
        if !self.intents.push(IntentMsg {
            intent,
            waiter: None,
        }) {
            warn!("recorder intent dropped during shutdown");
        }
    }

    fn process_one_intent(&self) {
        let Some(msg) = self.intents.pop() else {
            return;
        };
        let state = *self.state.lock();
        let result = match dispatch(state, &msg.intent) {
            Err(code) => Err(code),
            Ok((action, next)) => {
                let result = self.execute(action, &msg.intent);
                if result.is_ok() {
                    if let Some(next) = next {
                        self.transition(next);
                    }
                }
                result
            }
        };
        if let Some(waiter) = msg.waiter {
            waiter.complete(result);
        }
    }

    fn execute(&self, action: RecorderAction, intent: &RecorderIntent) -> Result<(), ErrorCode> {
        match action {
            RecorderAction::None => Ok(()),
            RecorderAction::SetOutput => {
                let RecorderIntent::SetOutput { fd, mime } = intent else {
                    return Err(ErrorCode::InvalidParameterValue);
                };
                self.muxer.set_output_format(mime)?;
                self.output.set_fd(*fd)
            }
            RecorderAction::ConfigureAudio => {
                let RecorderIntent::ConfigureAudio(meta) = intent else {
                    return Err(ErrorCode::InvalidParameterValue);
                };
                self.capture.configure_audio(meta.clone());
                Ok(())
            }
            RecorderAction::Prepare => {
                self.finalized.store(false, Ordering::Release);
                self.pipeline.prepare()
            }
            RecorderAction::Start => self.pipeline.start(),
            RecorderAction::Pause => self.pipeline.pause(),
            RecorderAction::Resume => self.pipeline.resume(),
            RecorderAction::Stop => self.do_stop(),
            RecorderAction::OnError => {
                let RecorderIntent::NotifyError(code) = intent else {
                    return Err(ErrorCode::InvalidParameterValue);
                };
                error!("recording pipeline error: {}", code);
                if let Some(observer) = self.observer.read().clone() {
                    observer.on_error(*code);
                }
                Ok(())
            }
        }
    }

    /// Stop: drain the capture tail, wait for the trailer, stop the graph.
    fn do_stop(&self) -> Result<(), ErrorCode> {
        self.capture.finish();
        {
            let mut guard = self.finalize_lock.lock();
            let deadline = std::time::Instant::now() + FINALIZE_TIMEOUT;
            while !self.finalized.load(Ordering::Acquire) {
                if self.finalize_cond.wait_until(&mut guard, deadline).timed_out() {
                    // shutdown must complete; an unfinalized container is a warning
                    warn!("container not finalized within {:?}", FINALIZE_TIMEOUT);
                    break;
                }
            }
        }
        self.pipeline.stop()
    }

    fn transition(&self, next: RecorderState) {
        {
            let mut state = self.state.lock();
            if *state == next {
                return;
            }
            info!("recorder state {:?} -> {:?}", *state, next);
            *state = next;
        }
        self.state_cond.notify_all();
        if let Some(observer) = self.observer.read().clone() {
            observer.on_state(next);
        }
    }
}

impl EventReceiver for RecorderCore {
    fn on_event(&self, event: Event) {
        match event.kind {
            EventKind::Ready => self.send_async(RecorderIntent::NotifyReady),
            EventKind::Error(code) => self.send_async(RecorderIntent::NotifyError(code)),
            EventKind::OutputComplete => {
                let _guard = self.finalize_lock.lock();
                self.finalized.store(true, Ordering::Release);
                self.finalize_cond.notify_all();
            }
            _ => {}
        }
    }
}

impl FilterCallback for RecorderCore {
    fn on_callback(
        &self,
        _callback_type: CallbackType,
        _filter: FilterId,
        _info: &PortInfo,
    ) -> Result<(), ErrorCode> {
        // the recording graph is static
        Ok(())
    }
}
