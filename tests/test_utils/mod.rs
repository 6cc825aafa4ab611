#![allow(dead_code)]

use anyhow::{anyhow, Result};
use image::{imageops, Rgba, RgbaImage};
use legend_check::request::{RequestConfig, RequestMethod, ServerParameters};
use legend_check::server::{
    AccessControlFilter, EmbeddedServer, LayerPermissions, RawResponse, RequestHandler,
    ServerInterface,
};
use legend_check::logs;
use legend_check::utils::image_to_png_data;
use legend_check::{CheckerConfig, SuiteContext};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempdir::TempDir;

pub const CONTROL_PATH_PREFIX: &str = "qgis_server_accesscontrol";
pub const LEGEND_LAYERS: [&str; 4] = ["Top", "Middle", "Bottom", "Multi"];
pub const HIDDEN_LAYER: &str = "Hidden";
/// Request header asking the server to echo its access control cache key.
pub const CACHE_KEY_REQUEST_HEADER: &str = "X-Legend-Cache-Key";
pub const CACHE_KEY_RESPONSE_HEADER: &str = "X-Cache-Key";

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const LEADER: Rgba<u8> = Rgba([128, 128, 128, 255]);
const LABEL: Rgba<u8> = Rgba([30, 30, 30, 255]);
const LEGEND_WIDTH: u32 = 96;
const PADDING: u32 = 6;

// what the fixture server adds on top of the reference drawing
pub const SERVED_EXTRA_WIDTH: u32 = 4;
pub const NOISE_PIXELS: u32 = 40;

pub fn project_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/testdata/diagramlegend/project.qgs")
}

pub fn control_name(layer: &str) -> String {
    format!("WMS_GetLegendGraphic_{layer}")
}

pub struct LegendStyle {
    pub color: Rgba<u8>,
    pub radii: &'static [u32],
    pub concentric: bool,
}

pub fn legend_style(layer: &str) -> Option<LegendStyle> {
    let style = |color: [u8; 3], radii: &'static [u32], concentric: bool| LegendStyle {
        color: Rgba([color[0], color[1], color[2], 255]),
        radii,
        concentric,
    };
    match layer {
        "Top" => Some(style([200, 40, 40], &[6, 12, 18], true)),
        "Middle" => Some(style([40, 160, 40], &[8, 13, 18], true)),
        "Bottom" => Some(style([40, 60, 200], &[4, 10, 16], true)),
        "Multi" => Some(style([160, 90, 20], &[5, 9, 13], false)),
        "Hidden" => Some(style([0, 0, 0], &[10], true)),
        _ => None,
    }
}

fn put(image: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_circle(image: &mut RgbaImage, cx: i64, cy: i64, r: u32, color: Rgba<u8>, filled: bool) {
    let r = r as i64;
    for y in cy - r..=cy + r {
        for x in cx - r..=cx + r {
            let d2 = (x - cx) * (x - cx) + (y - cy) * (y - cy);
            let inner = if filled { -1 } else { (r - 1) * (r - 1) };
            if d2 <= r * r && d2 > inner {
                put(image, x, y, color);
            }
        }
    }
}

fn draw_rect(image: &mut RgbaImage, x: i64, y: i64, width: u32, height: u32, color: Rgba<u8>) {
    for dy in 0..height as i64 {
        for dx in 0..width as i64 {
            put(image, x + dx, y + dy, color);
        }
    }
}

/// Reference drawing of a diagram size legend: concentric rings sharing a
/// bottom point with leader lines, or separate discs in a row.
pub fn render_legend(style: &LegendStyle) -> RgbaImage {
    let max_r = style.radii.iter().copied().max().unwrap_or(0);
    let mut image = RgbaImage::from_pixel(LEGEND_WIDTH, 2 * max_r + 2 * PADDING + 1, WHITE);
    let bottom = (PADDING + 2 * max_r) as i64;

    if style.concentric {
        let cx = (PADDING + max_r) as i64;
        let label_x = cx + max_r as i64 + 8;
        for (i, &r) in style.radii.iter().enumerate().rev() {
            let cy = bottom - r as i64;
            draw_circle(&mut image, cx, cy, r, style.color, false);
            let top = cy - r as i64;
            draw_rect(&mut image, cx, top, (label_x - cx) as u32, 1, LEADER);
            draw_rect(&mut image, label_x + 2, top - 1, 8 + 4 * i as u32, 3, LABEL);
        }
    } else {
        let mut cx = PADDING as i64;
        for &r in style.radii {
            cx += r as i64;
            draw_circle(&mut image, cx, bottom - r as i64, r, style.color, true);
            cx += r as i64 + 4;
        }
        draw_rect(&mut image, cx + 2, bottom - 2, 20, 3, LABEL);
    }
    image
}

/// The legend as the fixture server serves it: a few pixels wider than the
/// reference and with some inverted pixels, standing in for renderer jitter.
pub fn render_served_legend(style: &LegendStyle, seed: u64) -> RgbaImage {
    let reference = render_legend(style);
    let mut image = RgbaImage::from_pixel(
        reference.width() + SERVED_EXTRA_WIDTH,
        reference.height(),
        WHITE,
    );
    imageops::replace(&mut image, &reference, 0, 0);

    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..NOISE_PIXELS {
        let x = rng.random_range(0..reference.width());
        let y = rng.random_range(0..reference.height());
        let [r, g, b, a] = image.get_pixel(x, y).0;
        image.put_pixel(x, y, Rgba([255 - r, 255 - g, 255 - b, a]));
    }
    image
}

fn stack_vertically(images: &[RgbaImage]) -> RgbaImage {
    let width = images.iter().map(|i| i.width()).max().unwrap_or(0);
    let height = images.iter().map(|i| i.height()).sum();
    let mut stacked = RgbaImage::from_pixel(width, height, WHITE);
    let mut y = 0;
    for image in images {
        imageops::replace(&mut stacked, image, 0, y);
        y += image.height() as i64;
    }
    stacked
}

pub fn write_control_images(control_root: &Path) -> Result<()> {
    for layer in LEGEND_LAYERS {
        let name = control_name(layer);
        let dir = control_root.join(CONTROL_PATH_PREFIX).join(&name);
        fs::create_dir_all(&dir)?;
        let style = legend_style(layer).ok_or_else(|| anyhow!("no style for {layer}"))?;
        fs::write(
            dir.join(format!("{name}.png")),
            image_to_png_data(&render_legend(&style))?,
        )?;
    }
    Ok(())
}

/// Embedded server stand-in answering `GetLegendGraphic` for the layers of
/// the diagram legend project.
#[derive(Default)]
pub struct FixtureLegendServer {
    interface: ServerInterface,
}

fn service_exception(code: &str, message: &str) -> RawResponse {
    RawResponse::new(
        "Content-Type: text/xml; charset=utf-8\n",
        format!(
            "<ServiceExceptionReport version=\"1.3.0\">\
             <ServiceException code=\"{code}\">{message}</ServiceException>\
             </ServiceExceptionReport>\n"
        ),
    )
}

impl RequestHandler for FixtureLegendServer {
    fn handle_request(&self, config: &RequestConfig, query: &str) -> Result<RawResponse> {
        if config.method != RequestMethod::Get {
            return Ok(service_exception(
                "OperationNotSupported",
                &format!("{} is not supported", config.method),
            ));
        }
        let params = ServerParameters::parse(query);
        if params.is_empty() {
            return Ok(service_exception("Service configuration error", "Service unknown or unsupported"));
        }

        let project = match params.get("MAP").map(fs::read_to_string) {
            Some(Ok(project)) => project,
            _ => return Ok(service_exception("Server", "Project file error")),
        };
        if params.get_or("SERVICE", "") != "WMS"
            || !params
                .get_or("REQUEST", "")
                .eq_ignore_ascii_case("GetLegendGraphic")
        {
            return Ok(service_exception("OperationNotSupported", "Please check the value of the REQUEST parameter"));
        }
        if params.get_or("FORMAT", "image/png") != "image/png" {
            return Ok(service_exception("InvalidFormat", "Output format is not supported"));
        }

        let mut images = Vec::new();
        for layer in params.list("LAYERS") {
            let style = match legend_style(layer) {
                Some(style) if project.contains(&format!("name=\"{layer}\"")) => style,
                _ => {
                    return Ok(service_exception(
                        "LayerNotDefined",
                        &format!("The layer '{layer}' does not exist."),
                    ))
                }
            };
            if !self.interface.layer_readable(layer) {
                return Ok(service_exception(
                    "Security",
                    &format!("You are not allowed to access to the layer: {layer}"),
                ));
            }
            let seed = layer.bytes().map(u64::from).sum();
            images.push(render_served_legend(&style, seed));
        }
        if images.is_empty() {
            return Ok(service_exception("LayerNotSpecified", "LAYERS is mandatory"));
        }

        let body = image_to_png_data(&stack_vertically(&images))?;
        let mut headers = format!("Content-Type: image/png\nContent-Length: {}\n", body.len());
        if config.header(CACHE_KEY_REQUEST_HEADER) == Some("1") {
            let key = self.interface.cache_key().unwrap_or_default();
            headers.push_str(&format!("{CACHE_KEY_RESPONSE_HEADER}: {key}\n"));
        }
        Ok(RawResponse::new(headers, body))
    }
}

impl EmbeddedServer for FixtureLegendServer {
    fn server_interface(&self) -> &ServerInterface {
        &self.interface
    }

    fn server_interface_mut(&mut self) -> &mut ServerInterface {
        &mut self.interface
    }
}

/// Hides `HIDDEN_LAYER` and makes every other layer read-only.
pub struct RestrictedAccessControl;

impl AccessControlFilter for RestrictedAccessControl {
    fn name(&self) -> &str {
        "restricted"
    }

    fn layer_permissions(&self, layer: &str) -> LayerPermissions {
        if layer == HIDDEN_LAYER {
            LayerPermissions::NONE
        } else {
            LayerPermissions {
                can_read: true,
                ..LayerPermissions::NONE
            }
        }
    }

    fn cache_key(&self) -> Option<String> {
        Some("restricted".to_string())
    }
}

pub struct LegendSuite {
    pub suite: SuiteContext<FixtureLegendServer>,
    pub project_path: PathBuf,
    pub temp_dir: TempDir,
}

/// Installs the process logger under the cargo target tmp dir, which outlives
/// every per-test `TempDir`.
pub fn init_test_logs() -> PathBuf {
    let level = CheckerConfig::default().level_filter().unwrap();
    logs::init(Path::new(env!("CARGO_TARGET_TMPDIR")), level).unwrap()
}

pub fn setup_legend_suite(name: &str) -> LegendSuite {
    init_test_logs();
    let temp_dir = TempDir::new(name).unwrap();
    println!("temp dir: {:?}", temp_dir.path());
    let control_root = temp_dir.path().join("control_images");
    write_control_images(&control_root).unwrap();

    let config = CheckerConfig::default()
        .with_control_root(control_root)
        .with_control_path_prefix(CONTROL_PATH_PREFIX)
        .with_artifact_dir(temp_dir.path().join("artifacts"));
    let mut suite = SuiteContext::setup(FixtureLegendServer::default(), config).unwrap();
    suite
        .register_access_control(Arc::new(RestrictedAccessControl), 100)
        .unwrap();
    let project_path = suite.require_fixture(project_path()).unwrap();

    LegendSuite {
        suite,
        project_path,
        temp_dir,
    }
}
