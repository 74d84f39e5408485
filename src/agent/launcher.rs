use crate::error::HandlerInvocationError;
use std::future::Future;
use std::pin::Pin;

pub type LaunchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), HandlerInvocationError>> + Send + 'a>>;

/// The operating system's "open the default handler for this URI" capability.
pub trait UriLauncher: Send + Sync {
    fn open<'a>(&'a self, uri: &'a str) -> LaunchFuture<'a>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl SystemLauncher {
    fn command(uri: &str) -> Result<(&'static str, tokio::process::Command), HandlerInvocationError> {
        if cfg!(target_os = "macos") {
            let mut cmd = tokio::process::Command::new("open");
            cmd.arg(uri);
            Ok(("open", cmd))
        } else if cfg!(target_os = "windows") {
            let mut cmd = tokio::process::Command::new("rundll32");
            cmd.args(["url.dll,FileProtocolHandler", uri]);
            Ok(("rundll32", cmd))
        } else if cfg!(unix) {
            let mut cmd = tokio::process::Command::new("xdg-open");
            cmd.arg(uri);
            Ok(("xdg-open", cmd))
        } else {
            Err(HandlerInvocationError::Unsupported)
        }
    }
}

impl UriLauncher for SystemLauncher {
    fn open<'a>(&'a self, uri: &'a str) -> LaunchFuture<'a> {
        Box::pin(async move {
            if uri.trim().is_empty() {
                return Err(HandlerInvocationError::Rejected("empty URI".into()));
            }
            let (program, mut cmd) = Self::command(uri)?;
            cmd.stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null());

            let status = cmd
                .status()
                .await
                .map_err(|source| HandlerInvocationError::Spawn { program, source })?;
            if status.success() {
                Ok(())
            } else {
                Err(HandlerInvocationError::Exited {
                    program,
                    status: status.to_string(),
                })
            }
        })
    }
}
