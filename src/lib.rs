//! # vertex-genmedia
//!
//! Building blocks for Google Cloud generative media nodes (Gemini, Imagen, Veo, Lyria)
//! and Gemini media analysis.
//!
//! - `auth`: resolve credentials and a project id from configured secrets
//!   (workload identity → service-account file → inline JSON → ADC)
//! - `operation`: drive long-running operations to completion with heartbeats,
//!   cancellation and attempt/time limits
//! - `adapters` + `media`: normalize provider responses into media parts and bytes
//! - `persist`: store artifacts under deterministic, content-addressed names
//! - `node`: compose the above into generator nodes
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vertex_genmedia::prelude::*;
//!
//! let runner = NodeRunner::new(
//!     GenMediaConfig::builder().build(),
//!     Arc::new(EnvSecrets),
//!     Arc::new(LocalDirPersister::new("out")),
//! );
//! let params = NodeParameters::new().with("prompt", "a red fox in the snow");
//! let mut outputs = NodeOutputs::default();
//! runner.run(&ImagenNode, &params, &mut outputs).await?;
//! ```

#![deny(unsafe_code)]

pub mod adapters;
pub mod auth;
pub mod config;
pub mod error;
pub mod logs;
pub mod media;
pub mod node;
pub mod operation;
pub mod persist;
pub mod request;
pub mod retry;
pub mod secrets;
pub mod storage;
pub mod telemetry;
pub mod transport;
pub mod utils;

pub use error::{GenMediaError, Result};

pub mod prelude {
    pub use crate::adapters::{Provider, RawResult};
    pub use crate::auth::{
        Credential, CredentialResolver, CredentialSource, ResolvedCredentials, TokenProvider,
        get_access_token,
    };
    pub use crate::config::{GenMediaConfig, PollConfig};
    pub use crate::error::{GenMediaError, Result};
    pub use crate::logs::{LogSink, NodeLog};
    pub use crate::media::{
        ExtractedResponse, MediaInput, MediaKind, MediaPart, ResponsePartExtractor,
    };
    pub use crate::node::{
        GeminiAnalyzeMediaNode, GeminiImageNode, GeneratorNode, ImagenNode, LyriaAudioNode,
        NodeOutputs, NodeParameters, NodeRunner, VeoVideoNode,
    };
    pub use crate::operation::{Operation, OperationPoller, PollOutcome, PollReport};
    pub use crate::persist::{
        Artifact, ArtifactPersister, Clock, ConflictPolicy, FixedClock, LocalDirPersister,
        SystemClock,
    };
    pub use crate::secrets::{ConfiguredSecrets, EnvSecrets, MapSecrets, SecretsStore};
    pub use crate::utils::CancelHandle;
}
