//! Hybrid online/offline inference pipeline for a health information assistant
//!
//! Every user message gets exactly one reply. The orchestrator tries the
//! remote model while connected, then a local model if one is loaded, then
//! a keyword match over a static corpus, and finally a static guidance
//! message. Model artifacts are downloaded and loaded through explicit
//! managers that own their resources.

pub mod config;
pub mod connectivity;
pub mod conversation;
pub mod download;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod offline;
pub mod orchestrator;
pub mod remote;

pub use config::AssistConfig;
pub use connectivity::{ConnectivityMonitor, ConnectivityStatus, HttpProbe, ReachabilityProbe};
pub use conversation::{Conversation, Message, MessageId, Role, SharedConversation};
pub use download::{DownloadState, DownloadTask, ModelCatalog, ModelDownloader};
pub use error::{AssistError, Result};
pub use model::{LoadConfig, LoadedModel, LocalModelRuntime, ModelLifecycleManager, ModelState};
pub use offline::{CorpusStatement, MatchResult, OfflineEngine};
pub use orchestrator::{AssistantReply, Orchestrator, Provenance, ResponseStrategy};
pub use remote::RemoteInferenceClient;
