// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Player state machine.
//!
//! [`dispatch`] is a pure function from (state, intent) to (action, next
//! state): every pair has exactly one outcome, and an intent that is invalid
//! in the current state fails with `WrongState` without side effects. The
//! engine worker executes the returned action and then commits the
//! transition.

use mediaflow_plugin_api::MediaSource;
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Player lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateId {
    /// No source attached.
    Init,
    /// Source attached, pipeline preparing asynchronously.
    Preparing,
    /// Pipeline ready to play.
    Ready,
    /// Playing.
    Playing,
    /// Paused.
    Paused,
    /// Busy executing a seek.
    Seeking,
    /// Stopped; can be prepared again.
    Stopped,
    /// Playback completed.
    Eos,
}

/// Everything the engine worker can be asked to do.
#[derive(Debug, Clone)]
pub enum Intent {
    /// Attach a source and start preparing.
    SetSource(MediaSource),
    /// Prepare again after a stop (or wait while preparing).
    Prepare,
    /// Start playback.
    Play,
    /// Pause playback.
    Pause,
    /// Resume after pause.
    Resume,
    /// Stop playback.
    Stop,
    /// Seek to a position in engine ticks.
    Seek(i64),
    /// Pipeline reported ready.
    NotifyReady,
    /// All sinks reported completion.
    NotifyComplete,
    /// Pipeline reported a fatal error.
    NotifyError(ErrorCode),
}

/// Side effect the engine must perform for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing; the intent is an accepted no-op.
    None,
    /// Attach the source and prepare the pipeline.
    SetSource,
    /// Prepare the pipeline again.
    Prepare,
    /// Start the pipeline.
    Play,
    /// Pause the pipeline.
    Pause,
    /// Resume the pipeline.
    Resume,
    /// Stop the pipeline.
    Stop,
    /// Flush, seek the demuxer and report completion.
    Seek,
    /// Seek to zero, then start (replay after end of stream).
    Replay,
    /// Capture stream meta after the pipeline became ready.
    OnReady,
    /// Surface completion, then stop asynchronously.
    OnComplete,
    /// Loop: rewind to zero and keep playing.
    OnCompleteLoop,
    /// Surface an error to the observer.
    OnError,
}

/// The transition table.
///
/// Returns the action to run and the state to commit afterwards (`None`
/// keeps the current state). `looping` decides what stream completion does.
pub fn dispatch(
    state: StateId,
    intent: &Intent,
    looping: bool,
) -> Result<(Action, Option<StateId>), ErrorCode> {
    use Action as A;
    use StateId as S;
    let outcome = match (state, intent) {
        (S::Init, Intent::SetSource(_)) => (A::SetSource, Some(S::Preparing)),
        (S::Init, Intent::Stop) => (A::None, None),
        (S::Init, Intent::NotifyError(_)) => (A::OnError, Some(S::Init)),

        (S::Preparing, Intent::Prepare) => (A::None, None),
        (S::Preparing, Intent::NotifyReady) => (A::OnReady, Some(S::Ready)),
        (S::Preparing, Intent::NotifyError(_)) => (A::OnError, Some(S::Init)),
        (S::Preparing, Intent::Stop) => (A::Stop, Some(S::Stopped)),

        (S::Ready, Intent::Prepare) => (A::None, None),
        (S::Ready, Intent::Play) => (A::Play, Some(S::Playing)),
        (S::Ready, Intent::Seek(_)) => (A::Seek, None),
        (S::Ready, Intent::Stop) => (A::Stop, Some(S::Stopped)),
        (S::Ready, Intent::NotifyError(_)) => (A::OnError, Some(S::Init)),

        (S::Playing, Intent::Play) => (A::None, None),
        (S::Playing, Intent::Resume) => (A::None, None),
        (S::Playing, Intent::Pause) => (A::Pause, Some(S::Paused)),
        (S::Playing, Intent::Seek(_)) => (A::Seek, None),
        (S::Playing, Intent::Stop) => (A::Stop, Some(S::Stopped)),
        (S::Playing, Intent::NotifyComplete) if looping => (A::OnCompleteLoop, None),
        (S::Playing, Intent::NotifyComplete) => (A::OnComplete, Some(S::Eos)),
        (S::Playing, Intent::NotifyError(_)) => (A::OnError, Some(S::Init)),

        (S::Paused, Intent::Play) => (A::Resume, Some(S::Playing)),
        (S::Paused, Intent::Resume) => (A::Resume, Some(S::Playing)),
        (S::Paused, Intent::Pause) => (A::None, None),
        (S::Paused, Intent::Seek(_)) => (A::Seek, None),
        (S::Paused, Intent::Stop) => (A::Stop, Some(S::Stopped)),
        (S::Paused, Intent::NotifyError(_)) => (A::OnError, Some(S::Init)),

        (S::Stopped, Intent::Prepare) => (A::Prepare, Some(S::Preparing)),
        (S::Stopped, Intent::SetSource(_)) => (A::SetSource, Some(S::Preparing)),
        (S::Stopped, Intent::Stop) => (A::None, None),
        (S::Stopped, Intent::NotifyError(_)) => (A::OnError, Some(S::Init)),

        (S::Eos, Intent::Play) => (A::Replay, Some(S::Playing)),
        (S::Eos, Intent::Seek(_)) => (A::Seek, None),
        (S::Eos, Intent::Stop) => (A::Stop, Some(S::Stopped)),
        (S::Eos, Intent::NotifyComplete) => (A::None, None),
        (S::Eos, Intent::NotifyError(_)) => (A::OnError, Some(S::Init)),

        _ => return Err(ErrorCode::WrongState),
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_states() -> [StateId; 8] {
        [
            StateId::Init,
            StateId::Preparing,
            StateId::Ready,
            StateId::Playing,
            StateId::Paused,
            StateId::Seeking,
            StateId::Stopped,
            StateId::Eos,
        ]
    }

    fn all_intents() -> Vec<Intent> {
        vec![
            Intent::SetSource(MediaSource::Uri("file:///a.mp3".into())),
            Intent::Prepare,
            Intent::Play,
            Intent::Pause,
            Intent::Resume,
            Intent::Stop,
            Intent::Seek(0),
            Intent::NotifyReady,
            Intent::NotifyComplete,
            Intent::NotifyError(ErrorCode::Unknown),
        ]
    }

    #[test]
    fn test_every_pair_has_exactly_one_destination() {
        for looping in [false, true] {
            for state in all_states() {
                for intent in all_intents() {
                    let first = dispatch(state, &intent, looping);
                    let second = dispatch(state, &intent, looping);
                    assert_eq!(first, second, "{:?}/{:?} not deterministic", state, intent);
                }
            }
        }
    }

    #[test]
    fn test_invalid_intents_report_wrong_state() {
        assert_eq!(
            dispatch(StateId::Init, &Intent::Play, false),
            Err(ErrorCode::WrongState)
        );
        assert_eq!(
            dispatch(StateId::Playing, &Intent::SetSource(MediaSource::Stream), false),
            Err(ErrorCode::WrongState)
        );
        assert_eq!(
            dispatch(StateId::Eos, &Intent::Pause, false),
            Err(ErrorCode::WrongState)
        );
    }

    #[test]
    fn test_core_transitions() {
        assert_eq!(
            dispatch(
                StateId::Init,
                &Intent::SetSource(MediaSource::Stream),
                false
            ),
            Ok((Action::SetSource, Some(StateId::Preparing)))
        );
        assert_eq!(
            dispatch(StateId::Preparing, &Intent::NotifyReady, false),
            Ok((Action::OnReady, Some(StateId::Ready)))
        );
        assert_eq!(
            dispatch(StateId::Ready, &Intent::Play, false),
            Ok((Action::Play, Some(StateId::Playing)))
        );
        assert_eq!(
            dispatch(StateId::Playing, &Intent::Pause, false),
            Ok((Action::Pause, Some(StateId::Paused)))
        );
        assert_eq!(
            dispatch(StateId::Paused, &Intent::Resume, false),
            Ok((Action::Resume, Some(StateId::Playing)))
        );
    }

    #[test]
    fn test_state_serializes_for_diagnostics() {
        let json = serde_json::to_string(&StateId::Playing).unwrap();
        assert_eq!(json, "\"Playing\"");
        let back: StateId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StateId::Playing);
    }

    #[test]
    fn test_completion_depends_on_loop_flag() {
        assert_eq!(
            dispatch(StateId::Playing, &Intent::NotifyComplete, false),
            Ok((Action::OnComplete, Some(StateId::Eos)))
        );
        assert_eq!(
            dispatch(StateId::Playing, &Intent::NotifyComplete, true),
            Ok((Action::OnCompleteLoop, None))
        );
    }
}
