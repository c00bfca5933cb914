/// Extent of the logical axis the oracle addresses the screen with.
pub const LOGICAL_EXTENT: f64 = 1000.0;

/// Maps a logical 0-1000 coordinate onto a screen dimension, rounding to the
/// nearest pixel. Values flagged as already being pixels pass through.
pub fn normalize(value: f64, dimension: u32, is_already_pixel: bool) -> i32 {
  if is_already_pixel {
    return value.round() as i32;
  }
  (value / LOGICAL_EXTENT * f64::from(dimension)).round() as i32
}

/// Heuristic: a point with either component above 1000 is taken to be in
/// device pixels already. Decided for the pair so both axes agree.
///
/// Ambiguous on large displays, where logical and pixel ranges overlap: a
/// pixel target at (800, 600) is indistinguishable from a logical one.
pub fn is_device_pixel(x: f64, y: f64) -> bool {
  x > LOGICAL_EXTENT || y > LOGICAL_EXTENT
}

/// Size and origin of the screen the executor drives, in the units the input
/// backend expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreenGeometry {
  pub width: u32,
  pub height: u32,
  pub offset_x: i32,
  pub offset_y: i32,
}

impl ScreenGeometry {
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      offset_x: 0,
      offset_y: 0,
    }
  }

  pub fn to_device(&self, x: f64, y: f64) -> (i32, i32) {
    let already = is_device_pixel(x, y);
    (
      normalize(x, self.width, already) + self.offset_x,
      normalize(y, self.height, already) + self.offset_y,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn logical_values_scale_to_the_dimension() {
    assert_eq!(normalize(500.0, 1920, false), 960);
    assert_eq!(normalize(0.0, 1080, false), 0);
    assert_eq!(normalize(1000.0, 1080, false), 1080);
    assert_eq!(normalize(333.0, 1920, false), 639);
  }

  #[test]
  fn pixel_values_pass_through() {
    assert_eq!(normalize(1500.0, 1920, true), 1500);
  }

  #[test]
  fn heuristic_is_decided_for_the_pair() {
    let screen = ScreenGeometry::new(2560, 1440);
    assert_eq!(screen.to_device(500.0, 500.0), (1280, 720));
    // y is logical-looking but travels with x
    assert_eq!(screen.to_device(1800.0, 400.0), (1800, 400));
  }

  #[test]
  fn offsets_shift_the_result() {
    let screen = ScreenGeometry {
      width: 1920,
      height: 1080,
      offset_x: -1920,
      offset_y: 0,
    };
    assert_eq!(screen.to_device(500.0, 500.0), (-960, 540));
  }
}
