//! HTTPS serving: certificate loading and a handshaking listener for `axum::serve`.

use std::{
    fs,
    future::Future,
    io,
    net::SocketAddr,
    path::Path,
    sync::Arc,
    time::Duration,
};

use axum::serve::Listener;
use rustls::{
    ServerConfig,
    pki_types::{CertificateDer, PrivateKeyDer},
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_rustls::{TlsAcceptor, server::TlsStream};
use tracing::debug;

use crate::config::TlsSettings;

use super::error::InfraError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const READY_BACKLOG: usize = 64;

/// Build a server config from the key, certificate and chain files.
///
/// Any missing, unreadable or empty file is an error.
pub fn load_server_config(settings: &TlsSettings) -> Result<ServerConfig, InfraError> {
    let key = read_private_key(&settings.key_path)?;
    let mut chain = read_certificates(&settings.cert_path)?;
    chain.extend(read_certificates(&settings.chain_path)?);

    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|err| InfraError::tls(format!("unsupported protocol versions: {err}")))?
            .with_no_client_auth()
            .with_single_cert(chain, key)
            .map_err(|err| InfraError::tls(format!("certificate and key do not match: {err}")))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(config)
}

fn read_pem(path: &Path, what: &str) -> Result<Vec<u8>, InfraError> {
    let bytes = fs::read(path).map_err(|err| {
        InfraError::tls(format!("failed to read {what} `{}`: {err}", path.display()))
    })?;
    if bytes.is_empty() {
        return Err(InfraError::tls(format!(
            "{what} `{}` is empty",
            path.display()
        )));
    }
    Ok(bytes)
}

fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, InfraError> {
    let bytes = read_pem(path, "private key")?;
    rustls_pemfile::private_key(&mut bytes.as_slice())
        .map_err(|err| {
            InfraError::tls(format!(
                "failed to parse private key `{}`: {err}",
                path.display()
            ))
        })?
        .ok_or_else(|| {
            InfraError::tls(format!("no private key found in `{}`", path.display()))
        })
}

fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, InfraError> {
    let bytes = read_pem(path, "certificate")?;
    let certs = rustls_pemfile::certs(&mut bytes.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            InfraError::tls(format!(
                "failed to parse certificates `{}`: {err}",
                path.display()
            ))
        })?;
    if certs.is_empty() {
        return Err(InfraError::tls(format!(
            "no certificates found in `{}`",
            path.display()
        )));
    }
    Ok(certs)
}

/// A listener that yields connections only after their TLS handshake.
///
/// Handshakes run on their own tasks so a stalled client never blocks accept.
pub struct TlsListener {
    local_addr: SocketAddr,
    ready: mpsc::Receiver<(TlsStream<TcpStream>, SocketAddr)>,
    accept_task: JoinHandle<()>,
}

impl TlsListener {
    pub fn new(listener: TcpListener, config: Arc<ServerConfig>) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let (tx, ready) = mpsc::channel(READY_BACKLOG);
        let accept_task = tokio::spawn(accept_loop(listener, TlsAcceptor::from(config), tx));

        Ok(Self {
            local_addr,
            ready,
            accept_task,
        })
    }
}

impl Drop for TlsListener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(
    mut listener: TcpListener,
    acceptor: TlsAcceptor,
    ready: mpsc::Sender<(TlsStream<TcpStream>, SocketAddr)>,
) {
    while !ready.is_closed() {
        let (stream, peer) = Listener::accept(&mut listener).await;
        let acceptor = acceptor.clone();
        let ready = ready.clone();

        tokio::spawn(async move {
            match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                Ok(Ok(tls)) => {
                    let _ = ready.send((tls, peer)).await;
                }
                Ok(Err(err)) => debug!(
                    target = "contact_relay::tls",
                    peer = %peer,
                    error = %err,
                    "tls handshake failed"
                ),
                Err(_) => debug!(
                    target = "contact_relay::tls",
                    peer = %peer,
                    "tls handshake timed out"
                ),
            }
        });
    }
}

impl Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    fn accept(&mut self) -> impl Future<Output = (Self::Io, Self::Addr)> + Send {
        async move {
            match self.ready.recv().await {
                Some(connection) => connection,
                None => std::future::pending().await,
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}
