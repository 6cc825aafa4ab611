//! Tolerance based comparison of a rendered image against a named control
//! image.
//!
//! Control images live at `<control_root>/<prefix>/<name>/<name>.png`. An
//! optional `<name>_mask.png` next to a control image gives a per-pixel
//! colour tolerance in its red channel.
//!
//! The score is the number of pixels, over the region both images cover,
//! whose largest per-channel (RGBA) difference exceeds that pixel's
//! tolerance. A comparison passes when the sizes are within tolerance and the
//! score is at most the allowed maximum.

use crate::config::CheckerConfig;
use crate::error::{CheckError, Result};
use crate::utils;
use image::{Rgba, RgbaImage};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use strum_macros::Display;

const MISMATCH_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Allowed per-dimension slack between rendered and control image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeTolerance {
    pub width: u32,
    pub height: u32,
}

impl SizeTolerance {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn allows(&self, expected: (u32, u32), rendered: (u32, u32)) -> bool {
        expected.0.abs_diff(rendered.0) <= self.width
            && expected.1.abs_diff(rendered.1) <= self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DiffOutcome {
    #[strum(serialize = "passed")]
    Passed,
    #[strum(serialize = "size mismatch")]
    SizeMismatch,
    #[strum(serialize = "content mismatch")]
    ContentMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffResult {
    pub outcome: DiffOutcome,
    pub control_name: String,
    pub rendered_image: PathBuf,
    pub control_image: PathBuf,
    pub expected_size: (u32, u32),
    pub rendered_size: (u32, u32),
    pub size_tolerance: Option<SizeTolerance>,
    /// `None` when the size check failed and pixels were not compared.
    pub mismatch_count: Option<u64>,
    pub compared_pixels: u64,
    pub max_pixel_diff: u64,
    pub diff_image: Option<PathBuf>,
    report: String,
}

impl DiffResult {
    pub fn passed(&self) -> bool {
        self.outcome == DiffOutcome::Passed
    }

    pub fn report(&self) -> &str {
        &self.report
    }

    pub fn into_parts(self) -> (bool, String) {
        (self.passed(), self.report)
    }
}

/// Output of the per-pixel pass.
pub struct PixelDiff {
    pub mismatch_count: u64,
    pub compared_pixels: u64,
    pub diff_image: RgbaImage,
}

/// Compares the region `control` and `rendered` have in common. A pixel of
/// `mask` overrides `color_tolerance` with its red channel; where the mask
/// does not reach, `color_tolerance` applies.
pub fn pixel_diff(
    control: &RgbaImage,
    rendered: &RgbaImage,
    color_tolerance: u8,
    mask: Option<&RgbaImage>,
) -> PixelDiff {
    let width = control.width().min(rendered.width());
    let height = control.height().min(rendered.height());
    let mut diff_image = RgbaImage::new(width, height);
    let mut mismatch_count = 0;

    for y in 0..height {
        for x in 0..width {
            let expected = control.get_pixel(x, y);
            let actual = rendered.get_pixel(x, y);
            let tolerance = mask
                .and_then(|mask| mask.get_pixel_checked(x, y))
                .map_or(color_tolerance, |pixel| pixel[0]);
            if max_channel_diff(expected, actual) > tolerance {
                mismatch_count += 1;
                diff_image.put_pixel(x, y, MISMATCH_COLOR);
            } else {
                diff_image.put_pixel(x, y, dimmed(expected));
            }
        }
    }

    PixelDiff {
        mismatch_count,
        compared_pixels: width as u64 * height as u64,
        diff_image,
    }
}

fn max_channel_diff(a: &Rgba<u8>, b: &Rgba<u8>) -> u8 {
    a.0.iter()
        .zip(b.0.iter())
        .map(|(a, b)| a.abs_diff(*b))
        .max()
        .unwrap_or(0)
}

fn dimmed(pixel: &Rgba<u8>) -> Rgba<u8> {
    let [r, g, b, _] = pixel.0;
    let luma = (r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000;
    let grey = (128 + luma / 2) as u8;
    Rgba([grey, grey, grey, 255])
}

fn load_rgba(path: &Path) -> Result<(Vec<u8>, RgbaImage)> {
    let bytes = utils::read_file(path)?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| CheckError::image(path, e))?
        .to_rgba8();
    Ok((bytes, image))
}

fn format_size(size: (u32, u32)) -> String {
    format!("{}x{}", size.0, size.1)
}

pub struct RenderChecker {
    control_root: PathBuf,
    control_path_prefix: String,
    artifact_dir: PathBuf,
    color_tolerance: u8,
    control_name: String,
    rendered_image: Option<PathBuf>,
    size_tolerance: Option<SizeTolerance>,
    report: String,
}

impl RenderChecker {
    pub fn new(config: &CheckerConfig) -> Self {
        Self {
            control_root: config.control_root.clone(),
            control_path_prefix: config.control_path_prefix.clone(),
            artifact_dir: config.artifact_dir.clone(),
            color_tolerance: config.color_tolerance,
            control_name: String::new(),
            rendered_image: None,
            size_tolerance: None,
            report: String::new(),
        }
    }

    pub fn set_control_path_prefix(&mut self, prefix: &str) {
        self.control_path_prefix = prefix.to_string();
    }

    pub fn set_control_name(&mut self, name: &str) {
        self.control_name = name.to_string();
    }

    pub fn set_rendered_image(&mut self, path: impl Into<PathBuf>) {
        self.rendered_image = Some(path.into());
    }

    pub fn set_size_tolerance(&mut self, tolerance: Option<SizeTolerance>) {
        self.size_tolerance = tolerance;
    }

    pub fn set_color_tolerance(&mut self, tolerance: u8) {
        self.color_tolerance = tolerance;
    }

    /// Report of the last comparison, empty before the first one.
    pub fn report(&self) -> &str {
        &self.report
    }

    pub fn control_dir(&self, name: &str) -> PathBuf {
        self.control_root.join(&self.control_path_prefix).join(name)
    }

    pub fn control_image_path(&self, name: &str) -> PathBuf {
        self.control_dir(name).join(format!("{name}.png"))
    }

    pub fn mask_image_path(&self, name: &str) -> PathBuf {
        self.control_dir(name).join(format!("{name}_mask.png"))
    }

    pub fn rendered_image_path(&self, name: &str) -> PathBuf {
        self.artifact_dir.join(format!("{name}_result.png"))
    }

    pub fn diff_image_path(&self, name: &str) -> PathBuf {
        self.artifact_dir.join(format!("{name}_result_diff.png"))
    }

    pub fn compare(
        &mut self,
        rendered_path: &Path,
        control_name: &str,
        max_pixel_diff: u64,
        max_size_diff: Option<SizeTolerance>,
    ) -> Result<DiffResult> {
        self.set_rendered_image(rendered_path);
        self.set_control_name(control_name);
        self.set_size_tolerance(max_size_diff);
        self.compare_images(max_pixel_diff)
    }

    pub fn compare_images(&mut self, max_pixel_diff: u64) -> Result<DiffResult> {
        let rendered_path = self
            .rendered_image
            .clone()
            .ok_or_else(|| CheckError::Config("no rendered image to compare".to_string()))?;
        if self.control_name.is_empty() {
            return Err(CheckError::Config("no control image name set".to_string()));
        }
        let name = self.control_name.clone();
        let control_path = self.control_image_path(&name);

        for path in [&control_path, &rendered_path] {
            if !path.is_file() {
                return Err(CheckError::Fixture { path: path.clone() });
            }
        }

        let (control_bytes, control) = load_rgba(&control_path)?;
        let (rendered_bytes, rendered) = load_rgba(&rendered_path)?;
        let mask = self.load_mask(&name, control.dimensions())?;

        let expected_size = control.dimensions();
        let rendered_size = rendered.dimensions();
        let size_ok = match self.size_tolerance {
            Some(tolerance) => tolerance.allows(expected_size, rendered_size),
            None => expected_size == rendered_size,
        };

        let mut result = DiffResult {
            outcome: DiffOutcome::SizeMismatch,
            control_name: name.clone(),
            rendered_image: rendered_path,
            control_image: control_path,
            expected_size,
            rendered_size,
            size_tolerance: self.size_tolerance,
            mismatch_count: None,
            compared_pixels: 0,
            max_pixel_diff,
            diff_image: None,
            report: String::new(),
        };

        if size_ok {
            let diff = pixel_diff(&control, &rendered, self.color_tolerance, mask.as_ref());
            let diff_path = self.diff_image_path(&name);
            let png = utils::image_to_png_data(&diff.diff_image)
                .map_err(|e| CheckError::image(&diff_path, e))?;
            utils::write_file(&diff_path, &png)?;

            result.outcome = if diff.mismatch_count <= max_pixel_diff {
                DiffOutcome::Passed
            } else {
                DiffOutcome::ContentMismatch
            };
            result.mismatch_count = Some(diff.mismatch_count);
            result.compared_pixels = diff.compared_pixels;
            result.diff_image = Some(diff_path);
        }

        result.report = build_report(
            &result,
            &utils::sha1_hex(&rendered_bytes),
            &utils::sha1_hex(&control_bytes),
        );
        self.report = result.report.clone();

        if result.passed() {
            info!("{name}: {}", result.outcome);
        } else {
            warn!("{name}: {}\n{}", result.outcome, result.report);
        }
        Ok(result)
    }

    fn load_mask(&self, name: &str, control_size: (u32, u32)) -> Result<Option<RgbaImage>> {
        let mask_path = self.mask_image_path(name);
        if !mask_path.is_file() {
            return Ok(None);
        }
        let (_, mask) = load_rgba(&mask_path)?;
        if mask.dimensions() != control_size {
            warn!(
                "ignoring mask {}: size {} does not match control size {}",
                mask_path.display(),
                format_size(mask.dimensions()),
                format_size(control_size)
            );
            return Ok(None);
        }
        debug!("using mask {}", mask_path.display());
        Ok(Some(mask))
    }
}

fn build_report(result: &DiffResult, rendered_sha1: &str, control_sha1: &str) -> String {
    let mut report = String::new();
    let tolerance = result
        .size_tolerance
        .map_or("none".to_string(), |t| format_size((t.width, t.height)));
    let size_verdict = if result.outcome == DiffOutcome::SizeMismatch {
        "size mismatch"
    } else {
        "ok"
    };

    // writing to a String cannot fail
    let _ = writeln!(report, "Test: {}", result.control_name);
    let _ = writeln!(
        report,
        "Rendered image: {} (sha1 {rendered_sha1})",
        result.rendered_image.display()
    );
    let _ = writeln!(
        report,
        "Control image: {} (sha1 {control_sha1})",
        result.control_image.display()
    );
    let _ = writeln!(
        report,
        "Expected size: {}, rendered size: {}, size tolerance: {tolerance}: {size_verdict}",
        format_size(result.expected_size),
        format_size(result.rendered_size)
    );
    match result.mismatch_count {
        Some(count) => {
            let _ = writeln!(
                report,
                "Mismatched pixels: {count} of {} (allowed: {})",
                result.compared_pixels, result.max_pixel_diff
            );
        }
        None => {
            let _ = writeln!(report, "Pixel comparison skipped: size mismatch");
        }
    }
    if let Some(diff_image) = &result.diff_image {
        let _ = writeln!(report, "Diff image: {}", diff_image.display());
    }
    let _ = write!(report, "Result: {}", result.outcome);
    report
}
