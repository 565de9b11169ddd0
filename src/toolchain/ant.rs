use super::properties::read_property_file;
use super::{BuildRunner, StageInvocation, StageResult};
use crate::context::{Arch, BuildContext, BuildMode, HostOs, SourceLayout};
use crate::error::{Result, StageError};
use crate::utils::process;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

const LOCAL_BUILD_ENV: &str = "DART_LOCAL_BUILD";

/// Runs the bundled Ant for editor stages and the SDK build script for
/// SDK targets.
#[derive(Debug, Clone)]
pub struct ToolchainRunner {
    layout: SourceLayout,
    os: HostOs,
    mode: BuildMode,
    ant: PathBuf,
    python: PathBuf,
    extra_build_args: Vec<String>,
    local_build: Option<String>,
    stage_timeout: Duration,
    sdk_timeout: Duration,
}

impl ToolchainRunner {
    /// Locate the tools for this run.
    pub fn new(ctx: &BuildContext) -> Result<Self> {
        let launcher = match ctx.os {
            HostOs::Win32 => "ant.bat",
            _ => "ant",
        };
        let ant = ctx.layout.ant_bin_dir().join(launcher);
        if !ant.is_file() {
            return Err(StageError::ToolNotFound {
                tool: "ant".to_string(),
                reason: format!("{} does not exist", ant.display()),
            }
            .into());
        }
        let python = which::which("python3")
            .or_else(|_| which::which("python"))
            .map_err(|e| StageError::ToolNotFound {
                tool: "python".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            layout: ctx.layout.clone(),
            os: ctx.os,
            mode: ctx.mode,
            ant,
            python,
            extra_build_args: ctx.extra_build_args.clone(),
            local_build: ctx.local_build.clone(),
            stage_timeout: ctx.timeouts.stage,
            sdk_timeout: ctx.timeouts.sdk,
        })
    }

    /// Arguments passed to the Ant launcher for an invocation.
    pub fn ant_args(&self, invocation: &StageInvocation) -> Vec<String> {
        let mut args = vec![
            "-lib".to_string(),
            self.layout.bzip2_jar().display().to_string(),
            "-noinput".to_string(),
            "-nouserlib".to_string(),
            "-f".to_string(),
            invocation.stage.build_file().to_string(),
        ];
        args.extend(
            invocation
                .params
                .iter()
                .map(|(key, value)| format!("-D{key}={value}")),
        );
        if self.os == HostOs::Win32 {
            args.push("-autoproxy".to_string());
        }
        args.extend(invocation.extra_args.iter().cloned());
        args.push("-Dbuild.local.build=false".to_string());
        args.extend(self.extra_build_args.iter().cloned());
        args
    }

    fn ant_command(&self, invocation: &StageInvocation) -> Command {
        let mut cmd = if self.os == HostOs::Win32 {
            Command::new(&self.ant)
        } else {
            let mut cmd = Command::new("/bin/bash");
            cmd.arg(&self.ant);
            cmd
        };
        cmd.args(self.ant_args(invocation))
            .current_dir(self.layout.feature_dir(invocation.stage.feature()));
        if let Some(marker) = &self.local_build {
            cmd.env(LOCAL_BUILD_ENV, marker);
        }
        cmd
    }

    fn sdk_command(&self, archs: &[Arch], target: &str) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.arg(self.layout.sdk_build_script())
            .arg(format!("--mode={}", self.mode.as_str()))
            .arg(format!("--arch={}", Arch::join(archs)))
            .arg(target)
            .current_dir(self.layout.root());
        if let Some(marker) = &self.local_build {
            cmd.env(LOCAL_BUILD_ENV, marker);
        }
        cmd
    }
}

impl BuildRunner for ToolchainRunner {
    async fn run_stage(&self, invocation: &StageInvocation) -> Result<StageResult> {
        let mut cmd = self.ant_command(invocation);
        let command = process::describe(&cmd);
        log::info!("{} stage: {}", invocation.stage, command);

        let status = process::status_within(&mut cmd, self.stage_timeout)
            .await
            .map_err(|source| StageError::Spawn {
                command: command.clone(),
                source,
            })?
            .ok_or_else(|| StageError::TimedOut {
                command: command.clone(),
                seconds: self.stage_timeout.as_secs(),
            })?;

        let status = process::exit_code(status);
        let properties = read_property_file(&invocation.property_file).await?;
        log::debug!(
            "{} stage exited {} with {} properties",
            invocation.stage,
            status,
            properties.len()
        );
        Ok(StageResult { status, properties })
    }

    async fn build_sdk_target(&self, archs: &[Arch], target: &str) -> Result<i32> {
        let mut cmd = self.sdk_command(archs, target);
        let command = process::describe(&cmd);
        log::info!("SDK build: {}", command);

        let status = process::status_within(&mut cmd, self.sdk_timeout)
            .await
            .map_err(|source| StageError::Spawn {
                command: command.clone(),
                source,
            })?
            .ok_or_else(|| StageError::TimedOut {
                command: command.clone(),
                seconds: self.sdk_timeout.as_secs(),
            })?;
        Ok(process::exit_code(status))
    }
}
