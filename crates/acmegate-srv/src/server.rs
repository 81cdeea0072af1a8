//! DNS server runner: binds UDP+TCP and serves the challenge zone.
//!
//! The challenge handler sits in front of a catalog for the primary zones;
//! the campaign/issuance task is spawned once at startup and never joined,
//! so its failures surface only through logs.

use std::sync::Arc;
use std::time::Duration;

use hickory_server::authority::Catalog;
use hickory_server::server::ServerFuture;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{error, info};

use crate::config::{AcmeConfig, DEFAULT_ELECTION_NAME};
use crate::election::{Election, ElectionGate};
use crate::handler::ChallengeHandler;
use crate::issuance::{issuer_from_config, CertificateManager, Issuance, IssuerConfig};
use crate::provider::ChallengeProvider;

/// TCP connection timeout for DNS queries.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Start the DNS challenge server.
///
/// Validates the configuration, wires the challenge handler in front of a
/// fresh catalog, hands the issuer settings (including the shared challenge
/// store) to `make_manager`, spawns the campaign task, and serves until
/// shutdown.
pub async fn run<E, M, F>(config: &AcmeConfig, election: E, make_manager: F) -> crate::Result<()>
where
    E: Election + 'static,
    M: CertificateManager + 'static,
    F: FnOnce(IssuerConfig) -> M,
{
    config.validate()?;

    let provider = Arc::new(ChallengeProvider::new());
    let handler = ChallengeHandler::new(config, Arc::clone(&provider), Catalog::new())?;

    let manager = make_manager(issuer_from_config(provider, config));
    spawn_issuance(config, election, manager);

    let mut server = ServerFuture::new(handler);

    let udp_socket = UdpSocket::bind(config.listen)
        .await
        .map_err(|e| crate::AcmeSrvError::Server(format!("UDP bind {}: {e}", config.listen)))?;
    info!(addr = %config.listen, "UDP socket bound");
    server.register_socket(udp_socket);

    let tcp_listener = TcpListener::bind(config.listen)
        .await
        .map_err(|e| crate::AcmeSrvError::Server(format!("TCP bind {}: {e}", config.listen)))?;
    info!(addr = %config.listen, "TCP listener bound");
    server.register_listener(tcp_listener, TCP_TIMEOUT);

    info!(
        addr = %config.listen,
        zone = %config.challenge_zone(),
        "acmegate DNS challenge server running"
    );

    server
        .block_until_done()
        .await
        .map_err(|e| crate::AcmeSrvError::Server(format!("server error: {e}")))?;

    Ok(())
}

/// Spawn the single background campaign/issuance task.
///
/// A disabled node skips the campaign entirely and only serves challenge
/// queries staged by whichever replica holds leadership.
pub fn spawn_issuance<E, M>(config: &AcmeConfig, election: E, manager: M)
where
    E: Election + 'static,
    M: CertificateManager + 'static,
{
    if !config.enabled {
        info!(zone = %config.domain, "issuance disabled, skipping leadership campaign");
        return;
    }

    let (name, proposal) = config.election.as_ref().map_or_else(
        || (DEFAULT_ELECTION_NAME.to_string(), config.domain.clone()),
        |e| (e.name.clone(), e.proposal.clone()),
    );
    let gate = ElectionGate::new(election, name, proposal);
    let issuance = Issuance::new(manager, config.domain.clone());
    let zone = config.domain.clone();

    tokio::spawn(async move {
        let result = gate
            .campaign(move || async move { issuance.issue().await })
            .await;
        if let Err(e) = result {
            error!(zone = %zone, "issuance campaign failed: {e}");
        }
    });
}
