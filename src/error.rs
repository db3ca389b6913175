// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Engine error taxonomy.
//!
//! Plugin [`Status`] codes are translated into [`ErrorCode`] at the plugin
//! boundary through a single mapping; inside the engine everything speaks
//! `ErrorCode`. `EndOfStream` is part of the taxonomy but is not treated as a
//! failure by the pipeline: it flows as a buffer flag.

use mediaflow_plugin_api::Status;
use thiserror::Error;

/// Engine-wide error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorCode {
    /// Back-pressure; retry later.
    #[error("resource temporarily unavailable, try again")]
    Again,
    /// Unspecified failure.
    #[error("unknown error")]
    Unknown,
    /// The operation is not implemented.
    #[error("not implemented")]
    Unimplemented,
    /// A parameter value was rejected.
    #[error("invalid parameter value")]
    InvalidParameterValue,
    /// A parameter value had the wrong type for its tag.
    #[error("invalid parameter type")]
    InvalidParameterType,
    /// The operation is not valid for this object.
    #[error("invalid operation")]
    InvalidOperation,
    /// The object is in an unusable state.
    #[error("invalid state")]
    InvalidState,
    /// The intent is not accepted in the current state.
    #[error("wrong state for this operation")]
    WrongState,
    /// Allocation failed.
    #[error("out of memory")]
    NoMemory,
    /// A blocking operation timed out.
    #[error("operation timed out")]
    TimedOut,
    /// The media format is not supported by any plugin.
    #[error("unsupported format")]
    UnsupportedFormat,
    /// The referenced entity does not exist.
    #[error("entity does not exist")]
    NotExisted,
    /// The stream ended. Not a failure.
    #[error("end of stream")]
    EndOfStream,
    /// No plugin matched the request.
    #[error("plugin not found")]
    PluginNotFound,
}

/// Translate a plugin status at the boundary.
pub fn translate_plugin_status(status: Status) -> Result<(), ErrorCode> {
    match status {
        Status::Ok => Ok(()),
        Status::EndOfStream => Err(ErrorCode::EndOfStream),
        Status::ErrorAgain | Status::ErrorNotEnoughData => Err(ErrorCode::Again),
        Status::ErrorUnknown => Err(ErrorCode::Unknown),
        Status::ErrorUnimplemented => Err(ErrorCode::Unimplemented),
        Status::ErrorInvalidParameter => Err(ErrorCode::InvalidParameterValue),
        Status::ErrorMismatchedType => Err(ErrorCode::InvalidParameterType),
        Status::ErrorInvalidOperation => Err(ErrorCode::InvalidOperation),
        Status::ErrorInvalidState => Err(ErrorCode::InvalidState),
        Status::ErrorNoMemory => Err(ErrorCode::NoMemory),
        Status::ErrorTimedOut => Err(ErrorCode::TimedOut),
        Status::ErrorUnsupportedFormat => Err(ErrorCode::UnsupportedFormat),
        Status::ErrorNotExisted => Err(ErrorCode::NotExisted),
        Status::ErrorNullPointer => Err(ErrorCode::InvalidParameterValue),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_table() {
        assert_eq!(translate_plugin_status(Status::Ok), Ok(()));
        assert_eq!(
            translate_plugin_status(Status::EndOfStream),
            Err(ErrorCode::EndOfStream)
        );
        assert_eq!(
            translate_plugin_status(Status::ErrorAgain),
            Err(ErrorCode::Again)
        );
        assert_eq!(
            translate_plugin_status(Status::ErrorNotEnoughData),
            Err(ErrorCode::Again)
        );
        assert_eq!(
            translate_plugin_status(Status::ErrorMismatchedType),
            Err(ErrorCode::InvalidParameterType)
        );
    }
}
