// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One request/response exchange.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::client;
use crate::dispatcher::Routed;
use crate::error::{Error, ProtocolError, Result};
use crate::event::HubEvent;
use crate::protocol::{Message, MessageCodec};

use super::Shared;

/// Serves one connection and logs whatever went wrong.
pub(super) async fn handle(stream: TcpStream, peer: SocketAddr, shared: Arc<Shared>) {
    match serve(stream, peer, &shared).await {
        Ok(()) => {}
        Err(e @ (Error::Store(_) | Error::Registry(_))) => {
            tracing::error!(peer = %peer, error = %e, "Failed to apply message");
        }
        Err(Error::Protocol(ProtocolError::Timeout(ms))) => {
            tracing::warn!(peer = %peer, timeout_ms = ms, "Dropping stalled client");
        }
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "Dropping connection");
        }
    }
}

async fn serve(stream: TcpStream, peer: SocketAddr, shared: &Arc<Shared>) -> Result<()> {
    let mut framed = Framed::new(stream, MessageCodec);

    let frame = within(shared.config.read_timeout(), framed.next()).await?;
    let Some(message) = frame.transpose()? else {
        tracing::debug!(peer = %peer, "Connection closed before a message arrived");
        return Ok(());
    };

    let routed = {
        let shared = Arc::clone(shared);
        tokio::task::spawn_blocking(move || shared.dispatcher.route(&message, peer.ip()))
            .await
            .map_err(io::Error::other)??
    };

    match routed {
        Routed::Reply(reply) => {
            tracing::debug!(peer = %peer, dest = %reply.dest(), len = reply.payload().len(), "Responding");
            within(shared.config.read_timeout(), framed.send(reply)).await??;
        }
        Routed::Silent => {}
        Routed::Forward { addr, message } => forward(addr, message, shared).await?,
    }
    Ok(())
}

// The read deadline also bounds the reply write.
async fn within<F: Future>(limit: Option<Duration>, fut: F) -> Result<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            ProtocolError::Timeout(u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)).into()
        }),
        None => Ok(fut.await),
    }
}

async fn forward(addr: SocketAddr, message: Message, shared: &Arc<Shared>) -> Result<()> {
    match client::push(addr, &message, shared.config.push_timeout()).await {
        Ok(()) => {
            tracing::debug!(addr = %addr, dest = %message.dest(), "Pushed CONTROL message");
            shared.dispatcher.events().publish(HubEvent::Pushed {
                source: message.source(),
                dest: message.dest(),
            });
            Ok(())
        }
        Err(e) => {
            tracing::warn!(addr = %addr, error = %e, "Direct push failed, queueing instead");
            let shared = Arc::clone(shared);
            tokio::task::spawn_blocking(move || shared.dispatcher.deliver_to_mailbox(&message))
                .await
                .map_err(io::Error::other)?
        }
    }
}
