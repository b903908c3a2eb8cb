//! External synthesis engine driven as a child process.
//!
//! The engine is invoked as
//! `PROGRAM [extra args...] INPUT --rate R --channels C --bank B --chips N [--loop]`
//! and must write interleaved s16le PCM to stdout until the song ends.

use log::{debug, warn};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use super::{PcmSource, Pull, ReaderSource, SourceError, SynthConfig};

pub struct EngineSource {
    program: String,
    child: Child,
    stdout: ReaderSource<ChildStdout>,
    exited: bool,
}

/// Command-line arguments passed to the engine after its program name
pub fn engine_args(input: &Path, config: &SynthConfig) -> Vec<String> {
    let mut args = config.extra_args.clone();
    args.push(input.display().to_string());
    args.extend([
        "--rate".to_string(),
        config.sample_rate.to_string(),
        "--channels".to_string(),
        config.channels.to_string(),
        "--bank".to_string(),
        config.bank.to_string(),
        "--chips".to_string(),
        config.chips.to_string(),
    ]);
    if config.looping {
        args.push("--loop".to_string());
    }
    args
}

impl EngineSource {
    pub fn spawn(program: &str, input: &Path, config: &SynthConfig) -> Result<Self, SourceError> {
        let args = engine_args(input, config);
        debug!("Starting engine: {} {}", program, args.join(" "));

        let mut command = Command::new(program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        // Ctrl+C goes to mid2wav only; the engine is killed when the source drops
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|source| SourceError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SourceError::Spawn {
                program: program.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout not captured"),
            });
        };

        let block_align = config.channels.saturating_mul(2);
        Ok(Self {
            program: program.to_string(),
            child,
            stdout: ReaderSource::new(stdout, block_align),
            exited: false,
        })
    }
}

impl PcmSource for EngineSource {
    fn pull(&mut self, buf: &mut [u8]) -> Result<Pull, SourceError> {
        let pull = self.stdout.pull(buf)?;

        if pull.end_of_stream && !self.exited {
            let status = self.child.wait()?;
            self.exited = true;
            debug!("Engine exited with {}", status);
            if !status.success() {
                return Err(SourceError::EngineFailed {
                    program: self.program.clone(),
                    status,
                });
            }
        }

        Ok(pull)
    }
}

impl Drop for EngineSource {
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        if let Ok(None) = self.child.try_wait() {
            warn!("Stopping engine `{}` before it finished", self.program);
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}
