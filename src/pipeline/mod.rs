// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The media pipeline: filters, ports, events and the graph that wires them.

pub mod core;
pub mod event;
pub mod filter;
pub mod filters;
pub mod negotiate;
pub mod port;
pub mod settings;

pub use self::core::{Pipeline, PipelineGraph};
pub use event::{Event, EventKind, EventReceiver};
pub use filter::{
    CallbackType, Filter, FilterBase, FilterCallback, FilterContext, FilterId, FilterState,
    FilterType,
};
pub use port::{PortDesc, PortDirection, PortInfo, WorkMode, PORT_NAME_DEFAULT};
