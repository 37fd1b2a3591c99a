use std::path::PathBuf;
use std::process::Command;
use anyhow::{Result, Context, anyhow};
use tracing::{info, warn};

use super::{Stage, StageReport};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformReport {
    pub commands_run: usize,
}

/// Runs the external transformation tool, one command after another, inside
/// its project directory.
pub struct TransformStage {
    workdir: PathBuf,
    commands: Vec<Vec<String>>,
}

impl TransformStage {
    pub fn new(workdir: impl Into<PathBuf>, commands: Vec<Vec<String>>) -> Self {
        Self {
            workdir: workdir.into(),
            commands,
        }
    }
}

impl Stage for TransformStage {
    fn name(&self) -> &'static str {
        "transform"
    }

    fn run(&mut self) -> Result<StageReport> {
        let mut report = TransformReport::default();

        for argv in &self.commands {
            let (program, args) = argv
                .split_first()
                .ok_or_else(|| anyhow!("Empty transform command"))?;
            let command_line = argv.join(" ");
            info!("Executing transform command: {}", command_line);

            let output = Command::new(program)
                .args(args)
                .current_dir(&self.workdir)
                .output()
                .with_context(|| format!("Failed to execute '{}'. Is it installed?", command_line))?;

            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stdout.trim().is_empty() {
                info!("{} stdout:\n{}", command_line, stdout.trim_end());
            }
            if !stderr.trim().is_empty() {
                warn!("{} stderr:\n{}", command_line, stderr.trim_end());
            }

            if !output.status.success() {
                return Err(anyhow!("'{}' exited with {}", command_line, output.status));
            }
            report.commands_run += 1;
        }

        Ok(StageReport::Transform(report))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn argv(cmd: &str) -> Vec<String> {
        cmd.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_commands_run_in_workdir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut stage = TransformStage::new(dir.path(), vec![argv("touch ran"), argv("true")]);

        let report = stage.run()?;

        assert_eq!(report, StageReport::Transform(TransformReport { commands_run: 2 }));
        assert!(dir.path().join("ran").exists());
        Ok(())
    }

    #[test]
    fn test_non_zero_exit_stops_remaining_commands() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut stage = TransformStage::new(dir.path(), vec![argv("false"), argv("touch ran")]);

        let err = stage.run().unwrap_err();

        assert!(err.to_string().contains("'false' exited with"));
        assert!(!dir.path().join("ran").exists());
        Ok(())
    }
}
