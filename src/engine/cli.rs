//! Terraform CLI driver.
//!
//! Each call spawns the engine binary in the module directory. The engine's
//! data dir, local state, var files and plan files all live in the options'
//! namespace, so several cases can drive the same module at once.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, error, info, trace};

use crate::config::{EngineSettings, ModuleOptions};
use crate::error::{ConvergeError, EngineError, Result};
use crate::plan::PlanResult;

use super::ProvisioningEngine;
use super::retry::RetryPolicy;

/// Engine operations that carry a transient flag.
#[derive(Debug, Clone, Copy)]
enum Step {
    Init,
    Plan,
    Apply,
    Destroy,
}

/// Provisioning engine backed by the `terraform` (or compatible) binary.
#[derive(Debug, Clone)]
pub struct TerraformCli {
    /// Engine binary.
    binary: String,
    /// Classifies engine error output as transient.
    retry: RetryPolicy,
}

impl TerraformCli {
    /// Creates a driver for the configured binary.
    #[must_use]
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            binary: settings.binary.clone(),
            retry: RetryPolicy::default(),
        }
    }

    /// Uses the given policy's patterns to flag transient failures.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs the binary with `args` in the module directory.
    async fn exec(&self, options: &ModuleOptions, args: &[String]) -> Result<Output> {
        let namespace = options.namespace();
        namespace.ensure().await?;
        let data_dir = absolute(&namespace.data_dir())?;

        debug!(
            "{} {} (in {})",
            self.binary,
            args.join(" "),
            options.module_ref()
        );

        Command::new(&self.binary)
            .args(args)
            .current_dir(options.module_dir())
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .env("TF_DATA_DIR", data_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ConvergeError::Engine(EngineError::Spawn {
                    binary: self.binary.clone(),
                    message: e.to_string(),
                })
            })
    }

    /// Writes the variable set to the namespace and returns its path.
    ///
    /// Returns `None` when the module takes no variables.
    async fn write_var_file(&self, options: &ModuleOptions) -> Result<Option<PathBuf>> {
        if options.vars().is_empty() {
            return Ok(None);
        }

        let path = absolute(&options.namespace().var_file(options.fingerprint()))?;
        if !path.exists() {
            let content = serde_json::to_vec_pretty(options.vars())
                .map_err(|e| ConvergeError::internal(format!("Failed to encode variables: {e}")))?;
            tokio::fs::write(&path, content).await?;
            trace!("Wrote var file {}", path.display());
        }
        Ok(Some(path))
    }

    /// Common flags for commands that read or write state.
    async fn state_args(&self, options: &ModuleOptions) -> Result<Vec<String>> {
        let state_file = absolute(&options.namespace().state_file())?;
        let mut args = vec![
            String::from("-input=false"),
            format!("-state={}", state_file.display()),
        ];
        if let Some(var_file) = self.write_var_file(options).await? {
            args.push(format!("-var-file={}", var_file.display()));
        }
        if options.no_color() {
            args.push(String::from("-no-color"));
        }
        Ok(args)
    }

    /// Maps a failed run to the step's error, flagging transient output.
    fn failure(&self, step: Step, options: &ModuleOptions, output: &Output) -> ConvergeError {
        let message = failure_message(output);
        let transient = self.retry.transient_reason(&message).is_some();
        let module = options.module_ref();

        error!("{step:?} failed for {module} (transient: {transient})");

        let err = match step {
            Step::Init => EngineError::Init {
                module,
                message,
                transient,
            },
            Step::Plan => EngineError::PlanExecution {
                module,
                message,
                transient,
            },
            Step::Apply => EngineError::ApplyExecution {
                module,
                message,
                transient,
            },
            Step::Destroy => EngineError::DestroyExecution {
                module,
                message,
                transient,
            },
        };
        ConvergeError::Engine(err)
    }
}

#[async_trait]
impl ProvisioningEngine for TerraformCli {
    async fn init(&self, options: &ModuleOptions) -> Result<()> {
        info!("Initializing {}", options.module_ref());

        let mut args = vec![String::from("init"), String::from("-input=false")];
        for (key, value) in options.backend_config() {
            args.push(format!("-backend-config={key}={value}"));
        }
        if options.no_color() {
            args.push(String::from("-no-color"));
        }

        let output = self.exec(options, &args).await?;
        if !output.status.success() {
            return Err(self.failure(Step::Init, options, &output));
        }
        Ok(())
    }

    async fn validate(&self, options: &ModuleOptions) -> Result<()> {
        info!("Validating {}", options.module_ref());

        let mut args = vec![String::from("validate")];
        if options.no_color() {
            args.push(String::from("-no-color"));
        }

        let output = self.exec(options, &args).await?;
        if !output.status.success() {
            return Err(ConvergeError::Engine(EngineError::Validate {
                module: options.module_ref(),
                message: failure_message(&output),
            }));
        }
        Ok(())
    }

    async fn apply(&self, options: &ModuleOptions) -> Result<()> {
        info!("Applying {}", options.module_ref());

        let mut args = vec![String::from("apply"), String::from("-auto-approve")];
        args.extend(self.state_args(options).await?);

        let output = self.exec(options, &args).await?;
        if !output.status.success() {
            return Err(self.failure(Step::Apply, options, &output));
        }
        Ok(())
    }

    async fn plan(&self, options: &ModuleOptions) -> Result<PlanResult> {
        info!("Planning {}", options.module_ref());

        let plan_file = absolute(&options.namespace().plan_file(options.fingerprint()))?;
        let mut args = vec![String::from("plan")];
        args.extend(self.state_args(options).await?);
        args.push(format!("-out={}", plan_file.display()));

        let output = self.exec(options, &args).await?;
        if !output.status.success() {
            return Err(self.failure(Step::Plan, options, &output));
        }

        let show = vec![
            String::from("show"),
            String::from("-json"),
            plan_file.display().to_string(),
        ];
        let output = self.exec(options, &show).await?;
        if !output.status.success() {
            return Err(self.failure(Step::Plan, options, &output));
        }

        PlanResult::from_json(&String::from_utf8_lossy(&output.stdout))
    }

    async fn destroy(&self, options: &ModuleOptions) -> Result<()> {
        info!("Destroying {}", options.module_ref());

        let mut args = vec![String::from("destroy"), String::from("-auto-approve")];
        args.extend(self.state_args(options).await?);

        let output = self.exec(options, &args).await?;
        if !output.status.success() {
            return Err(self.failure(Step::Destroy, options, &output));
        }
        Ok(())
    }

    async fn output(&self, options: &ModuleOptions, name: &str) -> Result<serde_json::Value> {
        debug!("Reading output {name} of {}", options.module_ref());

        let state_file = absolute(&options.namespace().state_file())?;
        let args = vec![
            String::from("output"),
            String::from("-json"),
            format!("-state={}", state_file.display()),
            name.to_string(),
        ];

        let output_query = |message: String| {
            ConvergeError::Engine(EngineError::OutputQuery {
                module: options.module_ref(),
                name: name.to_string(),
                message,
            })
        };

        let output = self.exec(options, &args).await?;
        if !output.status.success() {
            return Err(output_query(failure_message(&output)));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| output_query(format!("invalid output JSON: {e}")))
    }

    async fn format_check(&self, options: &ModuleOptions) -> Result<()> {
        info!("Checking formatting of {}", options.module_ref());

        let args = vec![
            String::from("fmt"),
            String::from("-check"),
            String::from("-recursive"),
        ];

        let output = self.exec(options, &args).await?;
        if !output.status.success() {
            let mut files: Vec<String> = String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(ToString::to_string)
                .collect();
            if files.is_empty() {
                files.push(failure_message(&output));
            }
            return Err(ConvergeError::Engine(EngineError::FormatCheck {
                module: options.module_ref(),
                files,
            }));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "terraform"
    }
}

/// Picks the most useful text out of a failed run.
fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();
    if stdout.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stdout.to_string()
    }
}

/// Resolves a namespace path against the current directory, since the
/// engine runs from the module directory.
fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateNamespace;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;
    use tempfile::TempDir;

    fn output(code: i32, stdout: &str, stderr: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    fn options(temp: &TempDir) -> ModuleOptions {
        ModuleOptions::builder(temp.path())
            .var("vpc_cidr", "10.99.0.0/16")
            .namespace(StateNamespace::new(temp.path().join("ns")))
            .build()
            .unwrap()
    }

    #[test]
    fn test_failure_message_prefers_stderr() {
        assert_eq!(failure_message(&output(1, "out", "  err\n")), "err");
        assert_eq!(failure_message(&output(1, "out\n", "")), "out");
        assert!(failure_message(&output(1, "", "")).starts_with("exited with"));
    }

    #[test]
    fn test_transient_failures_are_flagged() {
        let temp = TempDir::new().unwrap();
        let cli = TerraformCli::new(&EngineSettings::default());
        let opts = options(&temp);

        let err = cli.failure(
            Step::Init,
            &opts,
            &output(1, "", "Error: Failed to query available provider packages: TLS handshake timeout"),
        );
        assert!(err.is_retryable());

        let err = cli.failure(
            Step::Plan,
            &opts,
            &output(1, "", "Error: Reference to undeclared input variable"),
        );
        assert!(!err.is_retryable());
        assert!(matches!(
            err,
            ConvergeError::Engine(EngineError::PlanExecution { .. })
        ));
    }

    #[tokio::test]
    async fn test_state_args_point_into_namespace() {
        let temp = TempDir::new().unwrap();
        let cli = TerraformCli::new(&EngineSettings::default());
        let opts = options(&temp);
        opts.namespace().ensure().await.unwrap();

        let args = cli.state_args(&opts).await.unwrap();
        let ns = temp.path().join("ns");
        assert!(args.contains(&format!("-state={}", ns.join("terraform.tfstate").display())));
        assert!(args.iter().any(|a| a.starts_with("-var-file=") && a.ends_with(".tfvars.json")));
        assert!(args.contains(&String::from("-no-color")));

        let var_file = opts.namespace().var_file(opts.fingerprint());
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(var_file).unwrap()).unwrap();
        assert_eq!(written["vpc_cidr"], "10.99.0.0/16");
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let temp = TempDir::new().unwrap();
        let settings = EngineSettings {
            binary: String::from("definitely-not-an-engine-binary"),
            ..EngineSettings::default()
        };
        let cli = TerraformCli::new(&settings);

        let err = cli.validate(&options(&temp)).await.unwrap_err();
        assert!(matches!(err, ConvergeError::Engine(EngineError::Spawn { .. })));
        assert!(!err.is_retryable());
    }
}
