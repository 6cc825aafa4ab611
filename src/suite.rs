use crate::config::CheckerConfig;
use crate::error::{CheckError, Result};
use crate::headers::HeaderMap;
use crate::logs;
use crate::render_checker::{DiffOutcome, DiffResult, RenderChecker, SizeTolerance};
use crate::request::RequestConfig;
use crate::server::{AccessControlFilter, EmbeddedServer};
use crate::utils;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Everything a group of legend tests shares: the embedded server, the
/// configuration and the comparator. Built once per suite and passed to each
/// test, torn down with `teardown` (or on drop).
pub struct SuiteContext<S: EmbeddedServer> {
    server: Option<S>,
    config: CheckerConfig,
    checker: RenderChecker,
}

impl<S: EmbeddedServer> SuiteContext<S> {
    pub fn setup(server: S, config: CheckerConfig) -> Result<Self> {
        let level = config.level_filter()?;
        fs::create_dir_all(&config.artifact_dir)
            .map_err(|e| CheckError::io(&config.artifact_dir, e))?;
        // no-op when a logger was already installed for this process
        logs::init(&config.artifact_dir, level)
            .map_err(|e| CheckError::Config(format!("failed to initialize logging: {e:#}")))?;

        // the server finishes its own initialization on the first request
        server
            .handle_request(&RequestConfig::get(), "")
            .map_err(CheckError::Server)?;

        info!(
            "suite ready, control images under {}, artifacts in {}",
            config.control_root.join(&config.control_path_prefix).display(),
            config.artifact_dir.display()
        );
        let checker = RenderChecker::new(&config);
        Ok(Self {
            server: Some(server),
            config,
            checker,
        })
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    pub fn checker(&self) -> &RenderChecker {
        &self.checker
    }

    pub fn server(&self) -> Result<&S> {
        self.server
            .as_ref()
            .ok_or_else(|| CheckError::Config("suite has been torn down".to_string()))
    }

    pub fn server_mut(&mut self) -> Result<&mut S> {
        self.server
            .as_mut()
            .ok_or_else(|| CheckError::Config("suite has been torn down".to_string()))
    }

    pub fn register_access_control(
        &mut self,
        filter: Arc<dyn AccessControlFilter>,
        priority: i32,
    ) -> Result<()> {
        self.server_mut()?
            .server_interface_mut()
            .register_access_control(filter, priority);
        Ok(())
    }

    pub fn require_fixture(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(CheckError::Fixture {
                path: path.to_path_buf(),
            })
        }
    }

    pub fn request(&self, config: &RequestConfig, query: &str) -> Result<(Vec<u8>, HeaderMap)> {
        debug!("{} ?{}", config.method, query);
        let response = self
            .server()?
            .handle_request(config, query)
            .map_err(CheckError::Server)?;
        let headers = HeaderMap::parse(&response.headers)?;
        Ok((response.body, headers))
    }

    pub fn get(&self, query: &str) -> Result<(Vec<u8>, HeaderMap)> {
        self.request(&RequestConfig::get(), query)
    }

    /// Stores `image` as `<control_name>_result.png` in the artifact
    /// directory and compares it with the control image.
    pub fn img_diff(
        &mut self,
        image: &[u8],
        control_name: &str,
        max_diff: u64,
        max_size_diff: Option<SizeTolerance>,
    ) -> Result<DiffResult> {
        let rendered_path = self.checker.rendered_image_path(control_name);
        utils::write_file(&rendered_path, image)?;
        self.checker
            .compare(&rendered_path, control_name, max_diff, max_size_diff)
    }

    /// Checks that `response` is a PNG matching `control_name`. A mismatch
    /// error carries the report plus shell commands restoring the rendered
    /// and diff images from base64.
    pub fn img_diff_error(
        &mut self,
        response: &[u8],
        headers: &HeaderMap,
        control_name: &str,
        max_diff: u64,
        max_size_diff: Option<SizeTolerance>,
    ) -> Result<DiffResult> {
        if headers.content_type() != Some(PNG_CONTENT_TYPE) {
            return Err(CheckError::UnexpectedContentType {
                expected: PNG_CONTENT_TYPE.to_string(),
                actual: headers.content_type().map(str::to_string),
            });
        }

        let result = self.img_diff(response, control_name, max_diff, max_size_diff)?;
        if result.passed() {
            return Ok(result);
        }

        let message = self.failure_message(&result)?;
        Err(match result.outcome {
            DiffOutcome::SizeMismatch => CheckError::DimensionMismatch { message },
            _ => CheckError::ContentMismatch { message },
        })
    }

    fn failure_message(&self, result: &DiffResult) -> Result<String> {
        let rendered = utils::read_file(&result.rendered_image)?;
        let mut message = format!(
            "Image is wrong\n{}\nImage:\n{}",
            result.report(),
            utils::base64_restore_command(&rendered, &result.rendered_image)
        );
        if let Some(diff_path) = &result.diff_image {
            let diff = utils::read_file(diff_path)?;
            message.push_str("\nDiff:\n");
            message.push_str(&utils::base64_restore_command(&diff, diff_path));
        }
        Ok(message)
    }

    pub fn teardown(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.server.take().is_some() {
            info!("suite torn down");
        }
    }
}

impl<S: EmbeddedServer> Drop for SuiteContext<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
