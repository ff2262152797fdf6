//! Login prompt: render the session's one-time login token as a terminal QR code.

use anyhow::{anyhow, Result};
use qrcode::render::unicode;
use qrcode::QrCode;

/// Render `code` as a compact QR code (two modules per character cell), inverted for dark terminals.
pub fn render_login_code(code: &str) -> Result<String> {
    let qr = QrCode::new(code.as_bytes()).map_err(|e| anyhow!("encoding login code: {}", e))?;
    Ok(qr
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

/// Print the login QR code with a scan hint. Falls back to the raw code if it cannot be encoded.
pub fn print_login_code(code: &str) {
    match render_login_code(code) {
        Ok(image) => {
            println!("{}", image);
            println!("scan the QR code above with the phone linked to this account");
        }
        Err(e) => {
            log::warn!("login: {}", e);
            println!("login code: {}", code);
        }
    }
}
