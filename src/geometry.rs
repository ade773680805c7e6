//! Surface sizing: display size in CSS units, backing resolution in device pixels.

use std::fmt;

/// The viewport as reported by the host: CSS size plus display density.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub pixel_ratio: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64, pixel_ratio: f64) -> Self {
        Self {
            width,
            height,
            pixel_ratio,
        }
    }

    /// Pixel ratio with nonsensical host values (0, negative, NaN) treated as 1.
    pub fn effective_pixel_ratio(&self) -> f64 {
        if self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0 {
            self.pixel_ratio
        } else {
            1.0
        }
    }
}

/// Pixels actually rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackingSize {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for BackingSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The CSS-visible box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl DisplaySize {
    /// `width` as a CSS length, e.g. `1024px`.
    pub fn css_width(&self) -> String {
        format!("{}px", self.width)
    }

    pub fn css_height(&self) -> String {
        format!("{}px", self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceGeometry {
    pub backing: BackingSize,
    pub display: DisplaySize,
}

impl SurfaceGeometry {
    /// Size a surface to cover the viewport: display size is the viewport,
    /// backing resolution is the viewport scaled by the pixel ratio, rounded.
    pub fn fit(viewport: Viewport) -> Self {
        let ratio = viewport.effective_pixel_ratio();
        let width = css_length(viewport.width);
        let height = css_length(viewport.height);
        Self {
            backing: BackingSize {
                width: scale_to_pixels(width, ratio),
                height: scale_to_pixels(height, ratio),
            },
            display: DisplaySize { width, height },
        }
    }
}

fn css_length(v: f64) -> f64 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

fn scale_to_pixels(css: f64, ratio: f64) -> u32 {
    let px = (css * ratio).round();
    if px >= u32::MAX as f64 {
        u32::MAX
    } else {
        px as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(w: f64, h: f64, r: f64) -> SurfaceGeometry {
        SurfaceGeometry::fit(Viewport::new(w, h, r))
    }

    #[test]
    fn high_density_doubles_backing() {
        let g = fit(1024.0, 768.0, 2.0);
        assert_eq!(g.backing, BackingSize { width: 2048, height: 1536 });
        assert_eq!(g.display.css_width(), "1024px");
        assert_eq!(g.display.css_height(), "768px");
    }

    #[test]
    fn fractional_ratio_rounds() {
        // 1366 * 1.25 = 1707.5 -> 1708, 768 * 1.25 = 960
        let g = fit(1366.0, 768.0, 1.25);
        assert_eq!(g.backing, BackingSize { width: 1708, height: 960 });

        // 333 * 1.5 = 499.5 -> 500
        let g = fit(333.0, 333.0, 1.5);
        assert_eq!(g.backing.width, 500);
    }

    #[test]
    fn fractional_css_size_kept_for_display() {
        let g = fit(800.5, 600.25, 1.0);
        assert_eq!(g.display.width, 800.5);
        assert_eq!(g.display.css_height(), "600.25px");
        assert_eq!(g.backing, BackingSize { width: 801, height: 600 });
    }

    #[test]
    fn invalid_ratio_falls_back_to_one() {
        for r in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            let g = fit(640.0, 480.0, r);
            assert_eq!(g.backing, BackingSize { width: 640, height: 480 }, "ratio {r}");
        }
    }

    #[test]
    fn degenerate_viewport_is_empty() {
        let g = fit(0.0, -5.0, 2.0);
        assert_eq!(g.backing, BackingSize { width: 0, height: 0 });
        assert_eq!(g.display.height, 0.0);

        let g = fit(f64::NAN, 100.0, 1.0);
        assert_eq!(g.backing.width, 0);
    }

    #[test]
    fn backing_size_display() {
        assert_eq!(fit(1280.0, 720.0, 1.0).backing.to_string(), "1280x720");
    }
}
