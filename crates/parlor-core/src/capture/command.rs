//! Capture backend that records through an external recorder process.

use super::{CaptureBackend, CaptureConstraints, CaptureStream};
use crate::error::CaptureError;
use async_trait::async_trait;
use log::{debug, warn};
use parlor_config::AudioConfig;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

const READ_CHUNK: usize = 8192;

/// Spawns a recorder that writes the encoded stream to stdout.
///
/// `{sample_rate}` in the argv is replaced from the constraints.
#[derive(Debug, Clone)]
pub struct CommandCaptureBackend {
    argv: Vec<String>,
    mime: String,
    supported: bool,
}

impl CommandCaptureBackend {
    pub fn new(argv: Vec<String>, mime: impl Into<String>) -> Self {
        let supported = argv
            .first()
            .is_some_and(|program| which::which(program).is_ok());
        Self {
            argv,
            mime: mime.into(),
            supported,
        }
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        if !config.enabled {
            return Self {
                argv: config.command.clone(),
                mime: config.mime.clone(),
                supported: false,
            };
        }
        Self::new(config.command.clone(), config.mime.clone())
    }

    fn render_args(&self, constraints: &CaptureConstraints) -> Vec<String> {
        let rate = constraints.sample_rate.to_string();
        self.argv
            .iter()
            .skip(1)
            .map(|arg| arg.replace("{sample_rate}", &rate))
            .collect()
    }
}

#[async_trait]
impl CaptureBackend for CommandCaptureBackend {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let program = self
            .argv
            .first()
            .ok_or_else(|| CaptureError::Unsupported("empty recorder command".to_string()))?;
        let args = self.render_args(constraints);
        debug!(
            "spawning recorder (program={program}, args_len={}, echo_cancellation={}, noise_suppression={})",
            args.len(),
            constraints.echo_cancellation,
            constraints.noise_suppression
        );

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| CaptureError::Device(format!("failed to start {program}: {err}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::Device("recorder stdout unavailable".to_string()))?;

        Ok(Box::new(CommandStream {
            child,
            stdout,
            buf: vec![0u8; READ_CHUNK],
            mime: self.mime.clone(),
            stopping: false,
        }))
    }
}

struct CommandStream {
    child: Child,
    stdout: ChildStdout,
    buf: Vec<u8>,
    mime: String,
    stopping: bool,
}

#[async_trait]
impl CaptureStream for CommandStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        let read = self.stdout.read(&mut self.buf).await?;
        if read == 0 {
            match self.child.wait().await {
                Ok(status) if !status.success() && !self.stopping => {
                    return Err(CaptureError::Device(format!("recorder exited with {status}")));
                }
                Ok(status) => debug!("recorder exited (status={status})"),
                Err(err) => warn!("failed to reap recorder (error={err})"),
            }
            return Ok(None);
        }
        Ok(Some(self.buf[..read].to_vec()))
    }

    fn request_stop(&mut self) {
        self.stopping = true;
        // Recorders finalize their container headers on SIGINT.
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
                if rc == 0 {
                    return;
                }
            }
        }
        if let Err(err) = self.child.start_kill() {
            debug!("recorder already exited (error={err})");
        }
    }

    fn mime(&self) -> &str {
        &self.mime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sample_rate_placeholder_is_substituted() {
        let backend = CommandCaptureBackend::new(
            vec!["rec".into(), "-r".into(), "{sample_rate}".into(), "-".into()],
            "audio/wav",
        );
        let constraints = CaptureConstraints {
            sample_rate: 16_000,
            ..CaptureConstraints::default()
        };
        assert_eq!(backend.render_args(&constraints), vec!["-r", "16000", "-"]);
    }

    #[test]
    fn missing_program_is_unsupported() {
        let backend =
            CommandCaptureBackend::new(vec!["parlor-no-such-recorder".into()], "audio/wav");
        assert!(!backend.is_supported());
        assert!(!CommandCaptureBackend::new(Vec::new(), "audio/wav").is_supported());
    }

    #[test]
    fn disabled_config_is_unsupported() {
        let config = AudioConfig {
            enabled: false,
            command: vec!["sh".into()],
            ..AudioConfig::default()
        };
        assert!(!CommandCaptureBackend::from_config(&config).is_supported());
    }
}
