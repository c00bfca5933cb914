use crate::{
  automation::Screenshot,
  error::{CyberpilotError, Result},
};

use super::coords::ScreenGeometry;

/// Where the executor's screenshots and screen size come from.
pub trait ScreenSource: Send {
  fn capture(&mut self) -> Result<Screenshot>;

  fn geometry(&mut self) -> Result<ScreenGeometry>;
}

/// The primary display via xcap, encoded as PNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrimaryMonitor;

fn primary_monitor() -> Result<xcap::Monitor> {
  let monitors = xcap::Monitor::all()?;
  let mut fallback = None;
  for monitor in monitors {
    if monitor.is_primary().unwrap_or(false) {
      return Ok(monitor);
    }
    fallback.get_or_insert(monitor);
  }
  fallback.ok_or_else(CyberpilotError::error_current_monitor)
}

pub fn encode_png(image: &image::DynamicImage) -> Result<Vec<u8>> {
  let mut buf = Vec::new();
  image.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)?;
  Ok(buf)
}

impl ScreenSource for PrimaryMonitor {
  fn capture(&mut self) -> Result<Screenshot> {
    let monitor = primary_monitor()?;
    let image = image::DynamicImage::ImageRgba8(monitor.capture_image()?);
    let png = encode_png(&image)?;
    tracing::debug!(
      target: "executor",
      width = image.width(),
      height = image.height(),
      bytes = png.len(),
      "screen captured"
    );
    Ok(Screenshot::new(png))
  }

  fn geometry(&mut self) -> Result<ScreenGeometry> {
    let monitor = primary_monitor()?;
    Ok(ScreenGeometry {
      width: monitor.width()?,
      height: monitor.height()?,
      offset_x: monitor.x()?,
      offset_y: monitor.y()?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encoded_frames_are_png() {
    let image = image::DynamicImage::ImageRgba8(image::RgbaImage::new(4, 3));
    let screenshot = Screenshot::new(encode_png(&image).unwrap());
    assert_eq!(screenshot.mime_type(), "image/png");
    let decoded = image::load_from_memory(screenshot.as_bytes()).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (4, 3));
  }
}
