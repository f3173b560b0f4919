// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process notification of hub activity.
//!
//! The dispatcher publishes a [`HubEvent`] on the [`EventBus`] after each
//! persisted change. Observers such as a web front-end or a test harness
//! subscribe through [`Broker::subscribe`](crate::broker::Broker::subscribe).

mod event_bus;
mod hub_event;

pub use event_bus::EventBus;
pub use hub_event::HubEvent;
