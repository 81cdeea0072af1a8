//! Server configuration for acmegate nodes.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

/// First label of every challenge query name.
pub const CHALLENGE_LABEL: &str = "_acme-challenge";

/// ACME directory endpoint used when the config does not name one.
///
/// Staging keeps misconfigured nodes away from production rate limits;
/// set `ca` explicitly for production issuance.
pub const DEFAULT_CA: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Election name shared by every node contending for the same zone.
pub const DEFAULT_ELECTION_NAME: &str = "acmegate-issuance";

/// Configuration for an acmegate DNS challenge node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcmeConfig {
    /// UDP/TCP listen address (default: 0.0.0.0:5353).
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Domain certificates are issued for. The challenge zone is derived
    /// from it as `_acme-challenge.<domain>.`.
    pub domain: String,

    /// Contact email for the certificate authority account.
    pub email: String,

    /// ACME directory endpoint (default: Let's Encrypt staging).
    #[serde(default = "default_ca")]
    pub ca: String,

    /// Whether this node participates in certificate issuance at all.
    /// The challenge responder serves regardless.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Nameserver reported as authoritative for the challenge zone.
    pub authoritative_nameserver: NameserverConfig,

    /// Leader-election settings for clustered deployments. Absent means
    /// single-node operation.
    #[serde(default)]
    pub election: Option<ElectionConfig>,
}

/// The authoritative nameserver's identity. At least one of `host` and an
/// address must be configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NameserverConfig {
    /// Hostname, e.g. `ns1.example.org`. Used as SOA mname, NS target, and
    /// the resolver the certificate manager polls during validation.
    #[serde(default)]
    pub host: Option<String>,

    /// IPv4 address served for A queries on the challenge zone.
    #[serde(default)]
    pub ipv4: Option<Ipv4Addr>,

    /// IPv6 address served for AAAA queries on the challenge zone.
    #[serde(default)]
    pub ipv6: Option<Ipv6Addr>,
}

/// Leader-election parameters for clustered deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Election this node campaigns in.
    #[serde(default = "default_election_name")]
    pub name: String,

    /// Value proposed on campaign, typically this node's identity.
    #[serde(default)]
    pub proposal: String,
}

impl AcmeConfig {
    /// Load config from a TOML file and validate it.
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| crate::AcmeSrvError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that all mandatory settings are present.
    ///
    /// Incomplete configuration is a startup failure, never a runtime one.
    pub fn validate(&self) -> crate::Result<()> {
        if self.domain.is_empty() {
            return Err(crate::AcmeSrvError::Config("domain not provided".into()));
        }
        if self.email.is_empty() {
            return Err(crate::AcmeSrvError::Config("email not provided".into()));
        }
        let ns = &self.authoritative_nameserver;
        if ns.host.as_deref().map_or(true, str::is_empty) && ns.ipv4.is_none() && ns.ipv6.is_none() {
            return Err(crate::AcmeSrvError::Config(
                "authoritative nameserver details not provided".into(),
            ));
        }
        if let Some(election) = &self.election {
            if election.proposal.is_empty() {
                return Err(crate::AcmeSrvError::Config(
                    "election proposal not provided".into(),
                ));
            }
        }
        Ok(())
    }

    /// The configured domain with its trailing dot.
    pub fn qualified_domain(&self) -> String {
        qualify(&self.domain)
    }

    /// The zone challenge tokens are staged under and answered from.
    pub fn challenge_zone(&self) -> String {
        format!("{CHALLENGE_LABEL}.{}", self.qualified_domain())
    }
}

/// Append the trailing dot if `zone` is not already fully qualified.
pub fn qualify(zone: &str) -> String {
    if zone.ends_with('.') {
        zone.to_string()
    } else {
        format!("{zone}.")
    }
}

// Default value functions for serde.
fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5353))
}

fn default_ca() -> String {
    String::from(DEFAULT_CA)
}

const fn default_enabled() -> bool {
    true
}

fn default_election_name() -> String {
    String::from(DEFAULT_ELECTION_NAME)
}
