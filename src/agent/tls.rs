//! Self-signed TLS identity for the encrypted loopback listener, and the
//! listener itself.

use crate::error::CertificateError;
use chrono::Datelike;
use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair, SanType};
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rustls::ServerConfig;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

pub const KEY_FILE: &str = "agent-key.pem";
pub const CERT_FILE: &str = "agent-cert.pem";
pub const RSA_BITS: usize = 2048;
pub const VALIDITY_YEARS: i32 = 10;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const PEER_WAIT: Duration = Duration::from_secs(5);

/// PEM-encoded private key and certificate.
#[derive(Clone)]
pub struct TlsIdentity {
    pub key_pem: String,
    pub cert_pem: String,
}

impl std::fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsIdentity")
            .field("key_pem", &"<redacted>")
            .field("cert_pem", &self.cert_pem.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub key: PathBuf,
    pub cert: PathBuf,
}

impl TlsPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            key: dir.join(KEY_FILE),
            cert: dir.join(CERT_FILE),
        }
    }

    pub fn exist(&self) -> bool {
        self.key.is_file() && self.cert.is_file()
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CertificateError + '_ {
    move |source| CertificateError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_identity(paths: &TlsPaths) -> Result<TlsIdentity, CertificateError> {
    Ok(TlsIdentity {
        key_pem: std::fs::read_to_string(&paths.key).map_err(io_error(&paths.key))?,
        cert_pem: std::fs::read_to_string(&paths.cert).map_err(io_error(&paths.cert))?,
    })
}

/// Generate a 2048-bit RSA self-signed certificate for `localhost` and
/// `127.0.0.1`, marked as a CA so it can be trusted directly.
pub fn generate_identity() -> Result<TlsIdentity, CertificateError> {
    let mut rng = rsa::rand_core::OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, RSA_BITS)
        .map_err(|e| CertificateError::KeyGeneration(e.to_string()))?;
    let key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CertificateError::KeyGeneration(e.to_string()))?;

    let key_pair = KeyPair::from_pkcs8_pem_and_sign_algo(&key_pem, &rcgen::PKCS_RSA_SHA256)
        .map_err(|e| CertificateError::Signing(e.to_string()))?;

    let mut params = CertificateParams::new(vec!["localhost".to_string()])
        .map_err(|e| CertificateError::Signing(e.to_string()))?;
    params
        .subject_alt_names
        .push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, "localhost");
    params.distinguished_name = name;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

    let today = chrono::Utc::now().date_naive();
    let month = u8::try_from(today.month()).unwrap_or(1);
    // Day clamped so the same date exists in every month and year.
    let day = u8::try_from(today.day().min(28)).unwrap_or(1);
    params.not_before = rcgen::date_time_ymd(today.year(), month, day);
    params.not_after = rcgen::date_time_ymd(today.year() + VALIDITY_YEARS, month, day);

    let certificate = params
        .self_signed(&key_pair)
        .map_err(|e| CertificateError::Signing(e.to_string()))?;

    Ok(TlsIdentity {
        key_pem: key_pem.as_str().to_owned(),
        cert_pem: certificate.pem(),
    })
}

fn create_new(path: &Path, contents: &str, private: bool) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if private {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = private;
    let mut file = options.open(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

async fn wait_for_peer(paths: &TlsPaths) -> bool {
    let deadline = tokio::time::Instant::now() + PEER_WAIT;
    while tokio::time::Instant::now() < deadline {
        if paths.exist() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    paths.exist()
}

/// Reuse the persisted identity, or generate and persist one. The key file
/// is created exclusively: a concurrent generator that loses the race adopts
/// the winner's files.
pub async fn load_or_provision(dir: &Path) -> Result<TlsIdentity, CertificateError> {
    let paths = TlsPaths::in_dir(dir);
    if paths.exist() {
        tracing::debug!(dir = %dir.display(), "reusing persisted TLS identity");
        return read_identity(&paths);
    }

    std::fs::create_dir_all(dir).map_err(io_error(dir))?;

    for _ in 0..2 {
        let identity = tokio::task::spawn_blocking(generate_identity)
            .await
            .map_err(|e| CertificateError::KeyGeneration(e.to_string()))??;

        match create_new(&paths.key, &identity.key_pem, true) {
            Ok(()) => {
                std::fs::write(&paths.cert, &identity.cert_pem).map_err(io_error(&paths.cert))?;
                tracing::info!(dir = %dir.display(), "generated self-signed TLS identity");
                return Ok(identity);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if wait_for_peer(&paths).await {
                    return read_identity(&paths);
                }
                // A key without a certificate is a leftover from an
                // interrupted run.
                tracing::warn!(path = %paths.key.display(), "removing orphaned TLS key");
                std::fs::remove_file(&paths.key).map_err(io_error(&paths.key))?;
            }
            Err(e) => return Err(io_error(&paths.key)(e)),
        }
    }

    Err(CertificateError::KeyGeneration(
        "could not persist a TLS identity".into(),
    ))
}

/// rustls server configuration for the identity, HTTP/1.1 only.
pub fn server_config(identity: &TlsIdentity) -> Result<Arc<ServerConfig>, CertificateError> {
    let certs = CertificateDer::pem_slice_iter(identity.cert_pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CertificateError::Pem(e.to_string()))?;
    if certs.is_empty() {
        return Err(CertificateError::Pem("no certificate found".into()));
    }
    let key = PrivateKeyDer::from_pem_slice(identity.key_pem.as_bytes())
        .map_err(|e| CertificateError::Pem(e.to_string()))?;

    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| CertificateError::Tls(e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| CertificateError::Tls(e.to_string()))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// TCP listener that completes the TLS handshake before handing the stream
/// to the HTTP server. Failed handshakes are logged and skipped.
pub struct TlsListener {
    inner: TcpListener,
    acceptor: TlsAcceptor,
}

impl TlsListener {
    pub fn new(inner: TcpListener, config: Arc<ServerConfig>) -> Self {
        Self {
            inner,
            acceptor: TlsAcceptor::from(config),
        }
    }
}

impl axum::serve::Listener for TlsListener {
    type Io = tokio_rustls::server::TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            let (stream, addr) = match self.inner.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "TLS listener accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };

            match tokio::time::timeout(HANDSHAKE_TIMEOUT, self.acceptor.accept(stream)).await {
                Ok(Ok(tls)) => return (tls, addr),
                Ok(Err(e)) => tracing::debug!(peer = %addr, error = %e, "TLS handshake failed"),
                Err(_) => tracing::debug!(peer = %addr, "TLS handshake timed out"),
            }
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}
