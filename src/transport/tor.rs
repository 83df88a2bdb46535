// src/transport/tor.rs
// =============================================================================
// TorTransport: every request goes through a live Tor circuit.
//
// How it works:
// 1. Before each request, check that the control port answers
// 2. If nothing answers, launch tor on the configured SOCKS/control ports and
//    wait until it reports "Bootstrapped 100%"
// 3. Open (or reopen) an authenticated control connection
// 4. Send the GET through a reqwest client bound to socks5h://127.0.0.1:PORT
//
// socks5h (note the "h") makes the proxy resolve host names, which is the
// only way .onion addresses can resolve at all.
//
// Ownership: a process we launched is ours. It is started with
// kill_on_drop and with __OwningControllerProcess, so it dies with us even if
// close() never runs. Two transports on the same ports will fight over them;
// that is not arbitrated here.
// =============================================================================

use super::control::{self, ControlConnection};
use super::{FetchedResponse, Transport};
use crate::config::TransportConfig;
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::{Client, Proxy};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, trace, warn};

const BOOTSTRAP_DONE: &str = "Bootstrapped 100%";

pub struct TorTransport {
    config: TransportConfig,
    client: Option<Client>,
    control: Option<ControlConnection>,
    process: Option<Child>,
}

impl TorTransport {
    /// Creates a transport. Nothing is launched or connected until the first fetch.
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            client: None,
            control: None,
            process: None,
        }
    }

    /// True if this instance launched the tor process it is holding
    pub fn owns_process(&self) -> bool {
        self.process.is_some()
    }

    // Makes sure tor is running, the control channel is authenticated and an
    // HTTP client exists.
    async fn refresh(&mut self) -> Result<(), TransportError> {
        let port = self.config.control_port;

        if !control::is_reachable(port).await {
            info!(port, "tor control port unreachable, launching tor");
            // A previous control connection points at a dead process
            if let Some(old) = self.control.take() {
                old.close().await;
            }
            self.terminate_process().await;
            self.process = Some(self.launch().await?);
        }

        if self.control.is_none() {
            let password = self.config.control_password.as_deref();
            self.control = Some(ControlConnection::open(port, password).await?);
        }

        if self.client.is_none() {
            self.client = Some(self.build_client()?);
        }

        Ok(())
    }

    fn build_client(&self) -> Result<Client, TransportError> {
        let proxy = Proxy::all(format!("socks5h://127.0.0.1:{}", self.config.socks_port))?;
        let client = Client::builder()
            .proxy(proxy)
            .timeout(self.config.request_timeout)
            .build()?;
        Ok(client)
    }

    async fn launch(&self) -> Result<Child, TransportError> {
        let tor_cmd = resolve_tor_command(self.config.tor_cmd.as_ref())?;
        debug!(tor = %tor_cmd.display(), "spawning tor");

        let mut child = Command::new(&tor_cmd)
            .args(launch_args(
                self.config.socks_port,
                self.config.control_port,
                std::process::id(),
            ))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Launch(format!("{}: {}", tor_cmd.display(), e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Launch("tor stdout was not captured".to_string()))?;

        let timeout = self.config.launch_timeout;
        match tokio::time::timeout(timeout, wait_for_bootstrap(stdout)).await {
            Ok(Ok(rest)) => {
                // Keep reading so tor never blocks on a full pipe
                tokio::spawn(async move {
                    let mut lines = rest.lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        trace!(target: "tor", "{}", line);
                    }
                });
                info!(pid = child.id(), "tor bootstrapped");
                Ok(child)
            }
            Ok(Err(e)) => {
                let _ = child.kill().await;
                Err(e)
            }
            Err(_) => {
                let _ = child.kill().await;
                Err(TransportError::LaunchTimeout(timeout))
            }
        }
    }

    async fn terminate_process(&mut self) {
        if let Some(mut child) = self.process.take() {
            debug!(pid = child.id(), "terminating owned tor process");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to terminate tor");
            }
        }
    }
}

#[async_trait]
impl Transport for TorTransport {
    async fn fetch_with_refresh(&mut self, url: &str) -> Result<FetchedResponse, TransportError> {
        self.refresh().await?;

        let client = match &self.client {
            Some(client) => client,
            None => return Err(TransportError::Launch("HTTP session missing".to_string())),
        };

        trace!(url, "GET");
        let response = client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(FetchedResponse { status, body })
    }

    async fn close(&mut self) {
        // Dropping the client closes its pooled connections
        self.client = None;
        if let Some(control) = self.control.take() {
            control.close().await;
        }
        self.terminate_process().await;
    }
}

// Explicit path first, then TOR_CMD, then PATH
fn resolve_tor_command(explicit: Option<&PathBuf>) -> Result<PathBuf, TransportError> {
    if let Some(path) = explicit {
        return Ok(path.clone());
    }
    if let Some(path) = std::env::var_os("TOR_CMD") {
        return Ok(PathBuf::from(path));
    }
    which::which("tor").map_err(|_| TransportError::TorNotFound)
}

fn launch_args(socks_port: u16, control_port: u16, owner_pid: u32) -> Vec<String> {
    vec![
        "--SocksPort".to_string(),
        socks_port.to_string(),
        "--ControlPort".to_string(),
        control_port.to_string(),
        "--__OwningControllerProcess".to_string(),
        owner_pid.to_string(),
    ]
}

// Reads tor's stdout until bootstrap finishes. Returns the reader so the
// caller can keep draining it.
async fn wait_for_bootstrap(
    stdout: ChildStdout,
) -> Result<BufReader<ChildStdout>, TransportError> {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| TransportError::Launch(e.to_string()))?;
        if read == 0 {
            return Err(TransportError::Launch(
                "tor exited before bootstrapping".to_string(),
            ));
        }
        trace!(target: "tor", "{}", line.trim_end());
        if line.contains(BOOTSTRAP_DONE) {
            return Ok(reader);
        }
    }
}
