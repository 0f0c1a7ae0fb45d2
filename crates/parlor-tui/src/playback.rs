//! Playback of synthesized replies through an external player.

use anyhow::{Context, bail};
use log::{debug, info, warn};
use std::process::Stdio;
use tokio::process::Command;

const URL_PLACEHOLDER: &str = "{url}";

/// External player command, e.g. `ffplay -nodisp -autoexit {url}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    argv: Vec<String>,
}

impl Player {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    /// Argument list for `url`; the URL is appended when no placeholder is present.
    pub fn render_args(&self, url: &str) -> Vec<String> {
        let mut args: Vec<String> = self
            .argv
            .iter()
            .map(|arg| arg.replace(URL_PLACEHOLDER, url))
            .collect();
        if !self.argv.iter().any(|arg| arg.contains(URL_PLACEHOLDER)) {
            args.push(url.to_string());
        }
        args
    }

    /// Start the player and return without waiting for it to finish.
    pub fn play(&self, url: &str) -> anyhow::Result<()> {
        let args = self.render_args(url);
        let Some((program, rest)) = args.split_first() else {
            bail!("no audio player configured");
        };
        info!("starting playback (program={program}, url={url})");
        let mut child = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start audio player `{program}`"))?;
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!("playback finished"),
                Ok(status) => warn!("audio player exited (status={status})"),
                Err(err) => warn!("failed to wait for audio player (error={err})"),
            }
        });
        Ok(())
    }
}
