use std::path::PathBuf;
use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `screenpop`.
///
/// Each stage of the delivery pipeline defines its own variant so callers can
/// decide recovery (drop, degrade, surface as HTTP status). Application edges
/// keep using `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum ScreenPopError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Request / payload validation ─────────────────────────────────────
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    // ── Direct loopback delivery ─────────────────────────────────────────
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    // ── OS default-handler dispatch ──────────────────────────────────────
    #[error("handler: {0}")]
    Handler(#[from] HandlerInvocationError),

    // ── TLS identity ─────────────────────────────────────────────────────
    #[error("certificate: {0}")]
    Certificate(#[from] CertificateError),

    // ── Durable mailbox ──────────────────────────────────────────────────
    #[error("mailbox: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("subscription: {0}")]
    Subscription(#[from] SubscriptionError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScreenPopError {
    /// Status an HTTP edge answers with: bad input is the caller's fault,
    /// everything else is ours.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            _ => 500,
        }
    }

    /// Message safe to hand back to an HTTP caller. Validation messages are
    /// part of the wire contract and go out without a stage prefix.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Validation errors ───────────────────────────────────────────────────────

/// Malformed or incomplete payloads. Surfaced as HTTP 400, never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No URI provided")]
    MissingUri,

    #[error("Invalid JSON body: {0}")]
    MalformedBody(String),

    #[error("{0} is required")]
    Required(&'static str),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("expected a JSON object")]
    NotAnObject,
}

// ─── Transport errors ────────────────────────────────────────────────────────

/// Direct loopback call failed (agent offline, refused, timed out).
///
/// Logged and dropped: the mailbox path compensates.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid loopback endpoint {endpoint}: {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    #[error("request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },

    #[error("{endpoint} answered {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
}

// ─── Handler invocation errors ───────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum HandlerInvocationError {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}")]
    Exited { program: &'static str, status: String },

    #[error("opening URIs is not supported on this platform")]
    Unsupported,

    #[error("{0}")]
    Rejected(String),
}

// ─── Certificate errors ──────────────────────────────────────────────────────

/// Fatal only to the encrypted listener; the plaintext listener still starts.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("certificate signing failed: {0}")]
    Signing(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid PEM: {0}")]
    Pem(String),

    #[error("tls config: {0}")]
    Tls(String),
}

// ─── Mailbox errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("mailbox request failed: {0}")]
    Request(String),

    #[error("mailbox answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("undecodable mailbox payload: {0}")]
    Decode(String),

    #[error("subscription stream ended: {0}")]
    Stream(String),

    #[error("mailbox is not configured: {0}")]
    NotConfigured(&'static str),
}

impl From<reqwest::Error> for MailboxError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error.to_string())
    }
}

// ─── Subscription errors ─────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("no recipient identity configured; run `screenpop identity set <identity>`")]
    NoRecipient,

    #[error("no mailbox configured; set [mailbox] database_url")]
    NoMailbox,
}
