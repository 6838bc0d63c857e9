//! Static file server shared by test pages and serve mode

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Mutex;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

use crate::error::{Result, TaskError};

/// A server the test pages are loaded from.
///
/// Shared read-only by every target of one suite run.
pub trait TestServer: Send + Sync {
    /// Base URL, without a trailing slash
    fn base_url(&self) -> String;

    /// URL of a root-relative path, each segment percent-encoded
    fn url_for(&self, relative: &str) -> String {
        let path = relative
            .trim_start_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.base_url().trim_end_matches('/'), path)
    }

    /// Stop serving. Returns `true` only for the call that actually stopped
    /// the server; later calls do nothing.
    fn stop(&self) -> bool;

    fn is_running(&self) -> bool;
}

/// Serves a directory over HTTP on a background tokio task
pub struct StaticServer {
    name: String,
    addr: SocketAddr,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StaticServer {
    /// Bind `host:port` and start serving `root`.
    ///
    /// Port 0 picks a free port; see [`StaticServer::local_addr`].
    pub async fn start(name: &str, root: &Path, host: &str, port: u16) -> Result<Self> {
        let resource = format!("{} on {}:{}", name, host, port);

        if !root.is_dir() {
            return Err(TaskError::Resource {
                resource,
                reason: format!("{} is not a directory", root.display()),
            });
        }

        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|err| TaskError::Resource {
                resource: resource.clone(),
                reason: err.to_string(),
            })?;
        let addr = listener.local_addr()?;

        let app = Router::new().fallback_service(ServeDir::new(root));
        let server_name = name.to_string();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                warn!(server = %server_name, error = %err, "server stopped with error");
            }
        });

        info!(server = name, root = %root.display(), %addr, "server started");

        Ok(Self {
            name: name.to_string(),
            addr,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

}

impl TestServer for StaticServer {
    fn base_url(&self) -> String {
        // A wildcard bind is reachable through loopback
        let ip = if self.addr.ip().is_unspecified() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.addr.ip()
        };
        format!("http://{}", SocketAddr::new(ip, self.addr.port()))
    }

    fn stop(&self) -> bool {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        match handle {
            Some(handle) => {
                // Aborting drops the listener, which frees the port
                handle.abort();
                info!(server = %self.name, addr = %self.addr, "server stopped");
                true
            }
            None => {
                debug!(server = %self.name, "server already stopped");
                false
            }
        }
    }

    fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}

impl Drop for StaticServer {
    fn drop(&mut self) {
        self.stop();
    }
}
