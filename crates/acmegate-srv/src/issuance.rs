//! Certificate issuance orchestration.
//!
//! The ACME protocol itself lives in an external certificate manager behind
//! the [`CertificateManager`] trait; this module builds the issuer settings
//! from configuration and drives one synchronous manage call for the
//! configured zone once leadership is won.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AcmeConfig;
use crate::provider::DnsProvider;

/// Reason codes for certificate revocation (RFC 5280 CRLReason).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RevocationReason {
    /// No reason given.
    #[default]
    Unspecified,
    /// The certificate's key has been compromised.
    KeyCompromise,
    /// The certificate has been replaced.
    Superseded,
    /// The domain is no longer in operation.
    CessationOfOperation,
}

impl RevocationReason {
    /// The wire-level CRLReason code.
    pub const fn code(self) -> u32 {
        match self {
            Self::Unspecified => 0,
            Self::KeyCompromise => 1,
            Self::Superseded => 4,
            Self::CessationOfOperation => 5,
        }
    }
}

/// External certificate-management library boundary.
///
/// All calls are synchronous from the orchestrator's perspective: they
/// resolve only once the certificate operation has finished or failed.
/// Retry policy lives behind this seam, never in the orchestrator.
#[async_trait]
pub trait CertificateManager: Send + Sync {
    /// Issue or renew certificates for every zone in `zones`.
    async fn manage(&self, zones: &[String]) -> crate::Result<()>;

    /// Obtain a certificate for a single zone.
    async fn obtain(&self, zone: &str) -> crate::Result<()>;

    /// Revoke the certificate for `zone`.
    async fn revoke(
        &self,
        zone: &str,
        reason: RevocationReason,
        immediate: bool,
    ) -> crate::Result<()>;
}

/// Issuer settings handed to the external certificate manager.
///
/// Only the DNS-01 challenge is left enabled: this server proves control of
/// the zone solely by serving TXT records out of its challenge store.
#[derive(Clone)]
pub struct IssuerConfig {
    /// Contact email for the CA account.
    pub email: String,
    /// ACME directory endpoint.
    pub ca: String,
    /// Terms-of-service agreement, implied by running this server.
    pub agreed_to_terms: bool,
    /// HTTP-01 is never attempted.
    pub disable_http_challenge: bool,
    /// TLS-ALPN-01 is never attempted.
    pub disable_tls_alpn_challenge: bool,
    /// Resolvers the manager polls while waiting for the challenge record,
    /// pointed at this cluster's own authoritative nameserver.
    pub dns_resolvers: Vec<String>,
    /// Store the manager stages challenge tokens into.
    pub dns_provider: Arc<dyn DnsProvider>,
}

/// Build issuer settings from the loaded configuration.
pub fn issuer_from_config(provider: Arc<dyn DnsProvider>, config: &AcmeConfig) -> IssuerConfig {
    IssuerConfig {
        email: config.email.clone(),
        ca: config.ca.clone(),
        agreed_to_terms: true,
        disable_http_challenge: true,
        disable_tls_alpn_challenge: true,
        dns_resolvers: config
            .authoritative_nameserver
            .host
            .iter()
            .cloned()
            .collect(),
        dns_provider: provider,
    }
}

/// Drives certificate operations for exactly one zone.
///
/// Errors from the external manager are wrapped with the zone name and
/// reported upward; retry, if any, belongs to the manager or to the next
/// election cycle.
pub struct Issuance<M> {
    manager: M,
    zone: String,
}

impl<M: CertificateManager> Issuance<M> {
    /// Scope a certificate manager to one zone.
    pub fn new(manager: M, zone: impl Into<String>) -> Self {
        Self {
            manager,
            zone: zone.into(),
        }
    }

    /// The zone this orchestrator issues for.
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Issue or renew the certificate for the configured zone.
    pub async fn issue(&self) -> crate::Result<()> {
        self.manager
            .manage(std::slice::from_ref(&self.zone))
            .await
            .map_err(|e| self.wrap(&e))
    }

    /// Obtain a certificate for the configured zone.
    pub async fn obtain(&self) -> crate::Result<()> {
        self.manager
            .obtain(&self.zone)
            .await
            .map_err(|e| self.wrap(&e))
    }

    /// Revoke the certificate for the configured zone.
    pub async fn revoke(&self, reason: RevocationReason, immediate: bool) -> crate::Result<()> {
        self.manager
            .revoke(&self.zone, reason, immediate)
            .await
            .map_err(|e| self.wrap(&e))
    }

    fn wrap(&self, err: &crate::AcmeSrvError) -> crate::AcmeSrvError {
        crate::AcmeSrvError::Issuance {
            zone: self.zone.clone(),
            message: err.to_string(),
        }
    }
}
