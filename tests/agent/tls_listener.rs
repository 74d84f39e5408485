use super::agent_harness::{self, RecordingLauncher};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use screenpop::agent::tls::TlsPaths;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// Trusts exactly the certificate the agent provisioned, the way a user
/// trusting it in their OS store would.
#[derive(Debug)]
struct PinnedCertificate {
    expected: CertificateDer<'static>,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for PinnedCertificate {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if end_entity.as_ref() == self.expected.as_ref() {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::General("certificate does not match pin".into()))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn pinned_connector(tls_dir: &Path) -> TlsConnector {
    let paths = TlsPaths::in_dir(tls_dir);
    let expected = CertificateDer::from_pem_file(&paths.cert).unwrap();
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .unwrap()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(PinnedCertificate { expected, provider }))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// POST `body` over TLS and return the status code and response body.
async fn post_over_tls(addr: SocketAddr, connector: &TlsConnector, body: &str) -> (u16, String) {
    let tcp = TcpStream::connect(addr).await.unwrap();
    let server_name = ServerName::try_from("localhost").unwrap();
    let mut tls = connector.connect(server_name, tcp).await.unwrap();

    let request = format!(
        "POST / HTTP/1.1\r\nHost: localhost:{}\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        addr.port(),
        body.len()
    );
    tls.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    // Peers may close without close_notify; whatever arrived is enough.
    let _ = tls.read_to_end(&mut raw).await;
    let raw = String::from_utf8_lossy(&raw).into_owned();

    let status = raw
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap();
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

#[tokio::test]
async fn tls_listener_serves_the_same_contract() {
    let temp = TempDir::new().unwrap();
    let launcher = RecordingLauncher::new();
    let agent = agent_harness::start_agent(temp.path(), launcher.clone(), None, true).await;

    let https = agent.https_addr().expect("tls listener should be up");
    assert!(agent.http_addr().is_some());
    assert_ne!(Some(https), agent.http_addr());

    let connector = pinned_connector(&temp.path().join("tls"));
    let (status, body) = post_over_tls(https, &connector, r#"{"uri":"jhaXp:secure"}"#).await;

    assert_eq!(status, 200);
    assert!(body.contains(r#""status":"success""#));
    assert_eq!(launcher.opened(), vec!["jhaXp:secure"]);

    let (status, body) = post_over_tls(https, &connector, r#"{"phoneNumber":"1"}"#).await;
    assert_eq!(status, 400);
    assert!(body.contains("No URI provided"));

    agent.shutdown().await;
}

#[tokio::test]
async fn identity_is_provisioned_once_and_reused() {
    let temp = TempDir::new().unwrap();
    let paths = TlsPaths::in_dir(&temp.path().join("tls"));

    let agent =
        agent_harness::start_agent(temp.path(), RecordingLauncher::new(), None, true).await;
    assert!(agent.https_addr().is_some());
    agent.shutdown().await;

    assert!(paths.exist());
    let first_cert = std::fs::read(&paths.cert).unwrap();
    let first_key = std::fs::read(&paths.key).unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&paths.key).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    let agent =
        agent_harness::start_agent(temp.path(), RecordingLauncher::new(), None, true).await;
    assert!(agent.https_addr().is_some());
    agent.shutdown().await;

    assert_eq!(std::fs::read(&paths.cert).unwrap(), first_cert);
    assert_eq!(std::fs::read(&paths.key).unwrap(), first_key);
}

#[tokio::test]
async fn unusable_certificate_leaves_plaintext_listener_running() {
    let temp = TempDir::new().unwrap();
    let tls_dir = temp.path().join("tls");
    std::fs::create_dir_all(&tls_dir).unwrap();
    let paths = TlsPaths::in_dir(&tls_dir);
    std::fs::write(&paths.key, "not a key").unwrap();
    std::fs::write(&paths.cert, "not a certificate").unwrap();

    let launcher = RecordingLauncher::new();
    let agent = agent_harness::start_agent(temp.path(), launcher.clone(), None, true).await;

    assert!(agent.https_addr().is_none());
    let response = reqwest::Client::new()
        .post(agent_harness::http_url(&agent, "/"))
        .json(&serde_json::json!({ "uri": "jhaXp:plain" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(launcher.opened(), vec!["jhaXp:plain"]);

    agent.shutdown().await;
    assert!(agent_harness::activity_log(temp.path()).contains("HTTPS disabled"));
}
