//! Tezos gateway core
//!
//! Turns high-level intents ("send N mutez to address A on network X")
//! into durable, correctly-ordered, safely-retried on-chain operations,
//! while a multi-network registry resolves which RPC or indexer endpoint
//! serves each network and tolerates endpoint failure.
//!
//! ## Architecture
//!
//! - **registry**: per-network endpoint candidates with health tracking
//! - **chain**: typed client for one node RPC endpoint (head, counter,
//!   constants, simulate, inject, inclusion polling)
//! - **indexer**: read path for historical queries with lag tolerance
//! - **forge**: local binary codecs (zarith, Micheline, base58check,
//!   operation contents)
//! - **builder**: request → simulated, fee-filled, forged operation group
//! - **signer**: ed25519 over watermarked forged bytes; message
//!   sign/verify; address derivation
//! - **orchestrator**: the Built → Simulated → Signed → Injected →
//!   {Confirmed | Failed | TimedOut} state machine with per-source
//!   sequencing
//! - **gateway**: the typed execute/query facade the tool layer calls

pub mod builder;
pub mod chain;
pub mod config;
pub mod error;
pub mod forge;
pub mod gateway;
pub mod indexer;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod security;
pub mod signer;
pub mod types;

// Re-export the surface the tool-dispatch layer consumes
pub use config::Config;
pub use error::{GatewayError, GatewayResult};
pub use gateway::{Gateway, QueryResponse};
pub use orchestrator::{LifecycleState, Submission};
pub use signer::{derive_address, KeyBundle, Signer};
pub use types::{
    AccountRef, ConfirmationReceipt, Mutez, Network, OperationDetails, OperationRequest,
    OperationStatus, QueryRequest,
};
