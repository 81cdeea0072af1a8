//! acmegate-srv: leader-gated ACME DNS-01 challenge responder.
//!
//! Automates the DNS-01 domain-validation challenge inside a clustered
//! authoritative DNS server. An external certificate manager stages challenge
//! TXT tokens into an in-memory record store, and a query handler serves them
//! back to the ACME validation server as authoritative answers under
//! `_acme-challenge.<domain>.` without touching the server's primary zone
//! data. A leader-election gate ensures exactly one node in the cluster
//! drives certificate issuance for the zone at a time.
//!
//! # Architecture
//!
//! - [`provider::ChallengeProvider`] - zone-scoped record store, the staging
//!   surface shared with the certificate manager
//! - [`handler::ChallengeHandler`] - answers SOA/NS/A/AAAA/TXT queries for
//!   the challenge subdomain, delegates everything else to the next handler
//! - [`election::ElectionGate`] - serializes issuance across replicas
//! - [`issuance::Issuance`] - drives the external certificate manager for
//!   the configured zone once leadership is won
//! - [`server`] - binds UDP+TCP and runs the handler chain

pub mod config;
pub mod election;
pub mod error;
pub mod handler;
pub mod issuance;
pub mod provider;
pub mod server;

// Re-exports for convenience.
pub use config::AcmeConfig;
pub use error::AcmeSrvError;
pub use provider::{ChallengeProvider, ChallengeRecord, DnsProvider};

/// Result type for acmegate-srv operations.
pub type Result<T> = std::result::Result<T, AcmeSrvError>;
