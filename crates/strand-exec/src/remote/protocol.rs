//! Wire frames exchanged between a runner and a worker.
//!
//! One JSON object per line. The client opens with `hello`, the worker answers
//! `welcome` (or `error` and closes), then calls flow as `submit`/`cancel` frames
//! one way and `outcome` frames the other. `cancel` and `outcome` name the attempt
//! they belong to, so a retry is never confused with the attempt it replaces.
use serde::{Deserialize, Serialize};
use tokio_util::codec::LinesCodec;

use strand_model::{Args, Envelope, InitOptions, RemoteOptions, RunId};

use crate::ExecError;

/// Protocol revision announced in `hello`.
pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound for a single frame.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Frame {
    Hello {
        protocol: u32,
        #[serde(default)]
        options: InitOptions,
    },
    Welcome {
        worker: String,
        capacity: u32,
    },
    Submit {
        run_id: RunId,
        task: String,
        args: Args,
        #[serde(default)]
        options: RemoteOptions,
        #[serde(default)]
        attempt: u32,
    },
    Cancel {
        run_id: RunId,
        #[serde(default)]
        attempt: u32,
    },
    Outcome {
        run_id: RunId,
        #[serde(default)]
        attempt: u32,
        envelope: Envelope,
    },
    Error {
        message: String,
    },
}

impl Frame {
    pub fn encode(&self) -> Result<String, ExecError> {
        serde_json::to_string(self).map_err(|e| ExecError::Protocol(format!("encode: {e}")))
    }

    pub fn decode(line: &str) -> Result<Self, ExecError> {
        serde_json::from_str(line).map_err(|e| ExecError::Protocol(format!("decode: {e}")))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Hello { .. } => "hello",
            Frame::Welcome { .. } => "welcome",
            Frame::Submit { .. } => "submit",
            Frame::Cancel { .. } => "cancel",
            Frame::Outcome { .. } => "outcome",
            Frame::Error { .. } => "error",
        }
    }
}

/// Line codec with the frame size bound applied.
pub fn codec() -> LinesCodec {
    LinesCodec::new_with_max_length(MAX_FRAME_BYTES)
}
