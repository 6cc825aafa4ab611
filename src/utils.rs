use crate::error::{CheckError, Result};
use base64::{engine::general_purpose, Engine as _};
use hex::ToHex;
use image::RgbaImage;
use sha1::{Digest, Sha1};
use std::fs;
use std::io::Cursor;
use std::path::Path;

pub fn image_to_png_data(image: &RgbaImage) -> std::result::Result<Vec<u8>, image::ImageError> {
    let mut image_png: Vec<u8> = Vec::new();
    image.write_to(&mut Cursor::new(&mut image_png), image::ImageFormat::Png)?;
    Ok(image_png)
}

pub fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().encode_hex::<String>()
}

pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| CheckError::io(path, e))
}

pub fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data).map_err(|e| CheckError::io(path, e))
}

/// A shell line that recreates `path` from the base64 dump of `data`, so an
/// artifact can be copied out of a CI log.
pub fn base64_restore_command(data: &[u8], path: &Path) -> String {
    format!(
        "echo '{}' | base64 -d > {}",
        general_purpose::STANDARD.encode(data),
        path.display()
    )
}
