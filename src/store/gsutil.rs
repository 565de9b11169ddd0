//! `gsutil` command-line client.

use super::{AccessPolicy, Location, ObjectStore};
use crate::context::SourceLayout;
use crate::error::{Result, StageError, StoreError};
use crate::utils::process;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Message gsutil prints when a wildcard or URL matches nothing.
const NO_MATCH: &str = "matched no objects";

/// Object store backed by the `gsutil` CLI.
#[derive(Debug, Clone)]
pub struct GsutilStore {
    program: PathBuf,
    leading_args: Vec<OsString>,
    timeout: Duration,
}

impl GsutilStore {
    /// Locate gsutil: the copy bundled in the checkout (run through
    /// Python) when present, otherwise `gsutil` from `PATH`.
    pub fn discover(layout: &SourceLayout, timeout: Duration) -> Result<Self> {
        let bundled = layout.gsutil_script();
        if bundled.is_file() {
            let python = which::which("python3")
                .or_else(|_| which::which("python"))
                .map_err(|e| StageError::ToolNotFound {
                    tool: "python".to_string(),
                    reason: e.to_string(),
                })?;
            log::debug!("using bundled gsutil {} via {}", bundled.display(), python.display());
            return Ok(Self {
                program: python,
                leading_args: vec![bundled.into_os_string()],
                timeout,
            });
        }

        let program = which::which("gsutil").map_err(|e| StageError::ToolNotFound {
            tool: "gsutil".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            program,
            leading_args: Vec::new(),
            timeout,
        })
    }

    fn command(&self, args: &[OsString]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args).args(args);
        cmd
    }

    /// Run gsutil; `Ok(Err(output))` carries a non-zero exit.
    async fn run(&self, args: Vec<OsString>) -> Result<std::result::Result<Output, Output>> {
        let mut cmd = self.command(&args);
        let command = process::describe(&cmd);
        log::debug!("running {}", command);

        let output = process::output_within(&mut cmd, self.timeout)
            .await
            .map_err(|source| StoreError::Spawn {
                command: command.clone(),
                source,
            })?
            .ok_or_else(|| StoreError::TimedOut {
                command: command.clone(),
                seconds: self.timeout.as_secs(),
            })?;

        if output.status.success() {
            Ok(Ok(output))
        } else {
            Ok(Err(output))
        }
    }

    async fn run_checked(&self, args: Vec<OsString>) -> Result<Output> {
        let command = process::describe(&self.command(&args));
        match self.run(args).await? {
            Ok(output) => Ok(output),
            Err(output) => Err(failure(command, &output).into()),
        }
    }
}

fn failure(command: String, output: &Output) -> StoreError {
    StoreError::CommandFailed {
        command,
        status: process::exit_code(output.status),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

fn matched_nothing(output: &Output) -> bool {
    String::from_utf8_lossy(&output.stderr).contains(NO_MATCH)
}

fn arg(location: &Location) -> OsString {
    match location {
        Location::Local(path) => path.clone().into_os_string(),
        Location::Remote(url) => OsString::from(url),
    }
}

/// Object URLs from `gsutil ls` output; prefix lines are dropped.
fn parse_listing(stdout: &[u8]) -> Vec<String> {
    let mut objects: Vec<String> = String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with('/') && !line.ends_with(':'))
        .map(str::to_string)
        .collect();
    objects.sort();
    objects.dedup();
    objects
}

impl ObjectStore for GsutilStore {
    async fn copy(&self, from: &Location, to: &Location, recursive: bool) -> Result<()> {
        let mut args = vec![OsString::from("cp")];
        if recursive {
            args.push(OsString::from("-r"));
        }
        args.push(arg(from));
        args.push(arg(to));
        self.run_checked(args).await?;
        Ok(())
    }

    async fn list(&self, pattern: &str) -> Result<Vec<String>> {
        let args = vec![OsString::from("ls"), OsString::from(pattern)];
        let command = process::describe(&self.command(&args));
        match self.run(args).await? {
            Ok(output) => Ok(parse_listing(&output.stdout)),
            Err(output) if matched_nothing(&output) => Ok(Vec::new()),
            Err(output) => Err(failure(command, &output).into()),
        }
    }

    async fn remove(&self, pattern: &str, recursive: bool) -> Result<()> {
        let mut args = vec![OsString::from("rm")];
        if recursive {
            args.push(OsString::from("-R"));
        }
        args.push(OsString::from(pattern));
        let command = process::describe(&self.command(&args));
        match self.run(args).await? {
            Ok(_) => Ok(()),
            Err(output) if matched_nothing(&output) => {
                log::debug!("{}: nothing to remove", pattern);
                Ok(())
            }
            Err(output) => Err(failure(command, &output).into()),
        }
    }

    async fn set_access_policy(&self, object: &str, policy: &AccessPolicy) -> Result<()> {
        let policy_arg = match policy {
            AccessPolicy::Canned(name) => OsString::from(name),
            AccessPolicy::PolicyFile(path) => path.clone().into_os_string(),
        };
        let args = vec![
            OsString::from("acl"),
            OsString::from("set"),
            policy_arg,
            OsString::from(object),
        ];
        self.run_checked(args).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_drops_prefixes_and_headers() {
        let stdout = b"gs://dartium-archive/latest/dartium-mac-full-1.1.zip\n\
gs://dartium-archive/latest/:\n\
gs://dartium-archive/latest/sub/\n\
\n\
gs://dartium-archive/latest/dartium-lucid32-full-1.1.zip\n";
        assert_eq!(
            parse_listing(stdout),
            vec![
                "gs://dartium-archive/latest/dartium-lucid32-full-1.1.zip",
                "gs://dartium-archive/latest/dartium-mac-full-1.1.zip",
            ]
        );
    }

    #[test]
    fn local_locations_pass_paths_through() {
        assert_eq!(arg(&Location::local("/tmp/a.zip")), OsString::from("/tmp/a.zip"));
        assert_eq!(arg(&Location::remote("gs://b/x")), OsString::from("gs://b/x"));
    }
}
