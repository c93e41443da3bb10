//! Transport for the mailbox session: TCP to `host:port`, then a rustls handshake
//! verified against the bundled webpki roots. There is no plaintext or STARTTLS path.

use crate::error::{Error, Result};
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};
use webpki_roots::TLS_SERVER_ROOTS;

/// The stream an IMAP session runs on.
pub(crate) type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Opens the implicit-TLS connection a polling cycle logs in over.
///
/// `imap_host` is checked against the certificate; `target_addr` is what gets dialled.
#[instrument(
    name = "connection::establish_tls",
    skip_all,
    fields(imap_host = %imap_host, target_addr = %target_addr)
)]
pub(crate) async fn establish_tls_connection(
    imap_host: &str,
    target_addr: &str,
) -> Result<TlsStream> {
    // Rejected before dialling: a bad host name never reaches the network.
    let server_name = server_name(imap_host)?;

    let tcp = TcpStream::connect(target_addr)
        .await
        .map_err(|source| Error::Connect {
            target: target_addr.to_string(),
            source,
        })?;

    debug!("TCP connected, starting TLS handshake");

    let stream = tls_connector()
        .connect(server_name, tcp)
        .await
        .map_err(|source| Error::Tls {
            target: target_addr.to_string(),
            source,
        })?;

    debug!("TLS handshake complete");

    Ok(stream)
}

fn tls_connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// SNI name for the configured host. IP literals are accepted.
fn server_name(host: &str) -> Result<ServerName> {
    ServerName::try_from(host).map_err(|source| Error::InvalidDnsName {
        host: host.to_string(),
        source,
    })
}
