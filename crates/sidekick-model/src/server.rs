//! Process manager for llama-server.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::client::LlamaCppClient;
use crate::engine::{Accelerator, EngineOptions};
use crate::error::ModelError;
use crate::paths::llama_server_path;

/// Manager for the llama-server process.
pub struct LlamaCppServer {
    binary: PathBuf,
    model: PathBuf,
    options: EngineOptions,
    process: Option<Child>,
}

impl LlamaCppServer {
    /// Create a new server manager for a model file.
    pub fn new(model: impl Into<PathBuf>, options: EngineOptions) -> Self {
        Self {
            binary: llama_server_path(),
            model: model.into(),
            options,
            process: None,
        }
    }

    /// Use a specific llama-server binary.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Get the port this server is configured to use.
    pub fn port(&self) -> u16 {
        self.options.port
    }

    /// Check if the server binary exists.
    pub fn binary_exists(&self) -> bool {
        self.binary.exists()
    }

    /// PID of the running child, if any.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(|p| p.id())
    }

    /// Command-line arguments for a launch on `accelerator`.
    pub fn args(&self, accelerator: Accelerator) -> Vec<String> {
        vec![
            "--model".to_string(),
            self.model.display().to_string(),
            "--host".to_string(),
            "127.0.0.1".to_string(),
            "--port".to_string(),
            self.options.port.to_string(),
            "--ctx-size".to_string(),
            self.options.ctx_size.to_string(),
            "--n-predict".to_string(),
            self.options.max_tokens.to_string(),
            "--n-gpu-layers".to_string(),
            accelerator.gpu_layers().to_string(),
        ]
    }

    /// Start the llama-server process.
    pub fn start(&mut self, accelerator: Accelerator) -> Result<(), ModelError> {
        if !self.binary.exists() {
            return Err(ModelError::ServerBinaryNotFound(
                self.binary.display().to_string(),
            ));
        }

        if !self.model.exists() {
            return Err(ModelError::ModelNotFound(self.model.display().to_string()));
        }

        info!(
            "Starting llama-server on port {} with model {} ({})",
            self.options.port,
            self.model.display(),
            accelerator
        );

        let child = Command::new(&self.binary)
            .args(self.args(accelerator))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ModelError::ServerStartFailed(e.to_string()))?;

        debug!("llama-server process started with PID: {}", child.id());
        self.process = Some(child);

        Ok(())
    }

    /// Wait for the server to become ready.
    ///
    /// Returns early with [`ModelError::ServerDied`] when the child exits,
    /// which is how a failed GPU initialisation usually shows up.
    pub async fn wait_ready(&mut self, timeout: Duration) -> Result<(), ModelError> {
        let client = self.client();
        let start = std::time::Instant::now();
        let check_interval = Duration::from_millis(500);

        info!("Waiting for llama-server to become ready...");

        while start.elapsed() < timeout {
            match client.check_health().await {
                Ok(()) => {
                    info!("llama-server is ready");
                    return Ok(());
                }
                Err(_) => {
                    if let Some(process) = self.process.as_mut() {
                        if let Ok(Some(status)) = process.try_wait() {
                            self.process = None;
                            return Err(ModelError::ServerDied(status.to_string()));
                        }
                        debug!("Server not ready yet, PID: {}", process.id());
                    } else {
                        return Err(ModelError::ServerNotRunning(client.base_url().to_string()));
                    }
                    sleep(check_interval).await;
                }
            }
        }

        Err(ModelError::ServerStartTimeout)
    }

    /// Stop the server process.
    pub fn stop(&mut self) -> Result<(), ModelError> {
        if let Some(mut child) = self.process.take() {
            info!("Stopping llama-server (PID: {})", child.id());

            // Try graceful shutdown first
            #[cfg(unix)]
            {
                unsafe {
                    libc::kill(child.id() as i32, libc::SIGTERM);
                }
                // Give it a moment to shut down gracefully
                std::thread::sleep(Duration::from_millis(500));
            }

            // Force kill if still running
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("Server exited with status: {:?}", status);
                }
                Ok(None) => {
                    warn!("Server didn't exit gracefully, killing...");
                    let _ = child.kill();
                    let _ = child.wait();
                }
                Err(e) => {
                    warn!("Error checking server status: {}", e);
                    let _ = child.kill();
                }
            }
        }
        Ok(())
    }

    /// Check if the server process is running.
    pub fn is_running(&mut self) -> bool {
        if let Some(ref mut child) = self.process {
            match child.try_wait() {
                Ok(Some(_)) => {
                    // Process has exited
                    self.process = None;
                    false
                }
                Ok(None) => true, // Still running
                Err(_) => false,
            }
        } else {
            false
        }
    }

    /// Get a client connected to this server.
    pub fn client(&self) -> LlamaCppClient {
        LlamaCppClient::with_port(self.options.port)
    }
}

impl Drop for LlamaCppServer {
    fn drop(&mut self) {
        if self.process.is_some() {
            let _ = self.stop();
        }
    }
}

/// Resident set size of a process in bytes (Linux only).
pub(crate) fn resident_memory(pid: u32) -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
        parse_vm_rss(&status)
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = pid;
        None
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}
