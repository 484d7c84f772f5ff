//! QR image rendering.
//!
//! The presenter page drops the image straight into `<img src>`, so it
//! leaves the server as a `data:` URL wrapping an SVG document. SVG
//! scales to any projector without resampling.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};

use crate::ProtocolError;

/// Every rendered image starts with this.
pub const QR_DATA_URL_PREFIX: &str = "data:image/svg+xml;base64,";

/// Smallest edge of the rendered image, in pixels.
const MIN_EDGE_PX: u32 = 256;

/// Renders `payload` as a QR code and returns it as an SVG data URL.
///
/// Uses medium error correction: a projected code photographed at an
/// angle loses a few modules, a scan token is short enough that the
/// extra redundancy doesn't push it into a denser version.
///
/// # Errors
/// [`ProtocolError::Render`] if `payload` is too long for any QR version.
pub fn render_qr_data_url(payload: &str) -> Result<String, ProtocolError> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M)
        .map_err(|e| ProtocolError::Render(e.to_string()))?;
    let svg = code
        .render::<svg::Color>()
        .min_dimensions(MIN_EDGE_PX, MIN_EDGE_PX)
        .build();
    Ok(format!("{QR_DATA_URL_PREFIX}{}", STANDARD.encode(svg)))
}
