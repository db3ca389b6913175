// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Result codes reported by plugins.
//!
//! Every plugin operation reports a [`Status`]. The engine translates these
//! into its own error taxonomy at the plugin boundary; plugins themselves
//! never see engine error codes.

/// Result of a plugin operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Operation succeeded.
    Ok,
    /// The stream ended; not an error.
    EndOfStream,
    /// The plugin cannot accept more work right now; retry later.
    ErrorAgain,
    /// Not enough input queued to produce output yet.
    ErrorNotEnoughData,
    /// Unspecified failure.
    ErrorUnknown,
    /// The operation is not implemented by this plugin.
    ErrorUnimplemented,
    /// A parameter value was rejected.
    ErrorInvalidParameter,
    /// A parameter value had the wrong type.
    ErrorMismatchedType,
    /// The operation is not valid for this plugin.
    ErrorInvalidOperation,
    /// The plugin is in the wrong state for this operation.
    ErrorInvalidState,
    /// Allocation failed.
    ErrorNoMemory,
    /// A blocking operation timed out.
    ErrorTimedOut,
    /// The input format is not supported.
    ErrorUnsupportedFormat,
    /// The referenced entity does not exist.
    ErrorNotExisted,
    /// A required reference was missing.
    ErrorNullPointer,
}

impl Status {
    /// Whether the status reports success.
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    /// Whether the status is back-pressure rather than failure.
    pub fn is_again(self) -> bool {
        self == Status::ErrorAgain
    }
}
