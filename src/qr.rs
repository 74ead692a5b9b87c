//! Best-effort QR image generation for the stable share link.
//!
//! A failure here never fails the job; the pipeline logs it and publishes the
//! record without a `qr_url`.

use anyhow::Result;
use qrcode::QrCode;
use std::path::Path;

/// Name of the QR image inside the job directory.
pub const QR_FILENAME: &str = "qr.png";

pub trait QrGenerator: Send + Sync {
    /// Encode `data` into a PNG at `output`.
    fn generate(&self, data: &str, output: &Path) -> Result<()>;
}

pub struct PngQrGenerator;

impl QrGenerator for PngQrGenerator {
    fn generate(&self, data: &str, output: &Path) -> Result<()> {
        let code = QrCode::new(data.as_bytes())?;
        let image = code
            .render::<image::Luma<u8>>()
            .min_dimensions(240, 240)
            .build();
        image.save(output)?;
        Ok(())
    }
}
