// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Synchronous codec pump.
//!
//! One worker does everything in order: supply an output buffer, feed one
//! input, then drain whatever the plugin completed. Simpler than the async
//! pump and sufficient for software codecs without internal threading.

use super::async_mode::CodecShared;

/// One iteration of the synchronous pump.
pub(crate) fn pump_once(shared: &CodecShared) {
    shared.decode_frame();
    shared.handle_frame();
    shared.finish_frame();
}
