//! Authenticate Cloud Foundry workloads with their instance identity certificates.
//!
//! Cloud Foundry issues each running app instance a client certificate signed by the
//! platform's instance identity CA.
//! A workload proves who it is by presenting that certificate along with a signature
//! made with the certificate's private key over the login request itself.
//!
//! Authentication happens in stages, each of which must pass for a credential to be issued:
//!
//! 1. The signing time must be recent (see [`window`]) to limit replay of captured requests.
//! 2. The signature must match the presented certificate (see [`signature`]).
//! 3. The matched certificate must chain to a configured CA (see [`identity`]).
//! 4. The identity in the certificate must satisfy the requested role (see [`constraints`]).
//! 5. The identity must still exist, as claimed, in the Cloud Controller (see [`directory`]).
//!
//! The [`Engine`] ties all the stages together for logins and renewals.
//!
//! ## Failure reporting
//!
//! Login failures are never reported to callers in detail.
//! Callers receive a failure ID only while the full error is logged server side
//! with the same ID for operators to look up.
//! This denies attackers an oracle to progressively work around checks.
//!
//! Renewals are reported in full as the caller already authenticated once.
pub mod conf;
pub mod constraints;
pub mod context;
pub mod directory;
pub mod engine;
pub mod errors;
pub mod identity;
pub mod models;
pub mod signature;
pub mod store;
pub mod window;

mod telemetry;
pub use self::telemetry::register_metrics;

pub use self::context::Context;
pub use self::engine::Engine;
pub use self::engine::EngineBuilder;
pub use self::errors::LoginFailed;
pub use self::models::IssuedAuth;
pub use self::models::LoginRequest;
pub use self::models::Role;
pub use self::models::VerifiedIdentity;
