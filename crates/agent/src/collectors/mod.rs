// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent collectors (C2): three independent, non-restartable producers
//! that feed envelopes into the durable buffer. Each runs until the shared
//! cancellation token fires; none ever returns early on its own.

pub mod heartbeat;
pub mod log_tail;
pub mod metrics;

use std::sync::Arc;

use crate::buffer::Buffer;

/// Shared handle collectors use to append envelopes to the buffer.
#[derive(Clone)]
pub struct Sink {
    buffer: Arc<Buffer>,
}

impl Sink {
    pub fn new(buffer: Arc<Buffer>) -> Self {
        Self { buffer }
    }

    /// Encode and append an [`wire::AgentMessage`], logging but not
    /// propagating write failures upward — a single failed append must
    /// never stop the producing collector.
    pub fn emit(&self, message: &wire::AgentMessage) {
        let proto_msg: wire::proto::AgentMessage = message.into();
        let encoded = prost::Message::encode_to_vec(&proto_msg);
        if let Err(err) = self.buffer.write(&encoded) {
            tracing::warn!(error = %err, "failed to append envelope to buffer");
        }
    }
}
