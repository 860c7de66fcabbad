use palette::{LinSrgb, Mix, Srgb};
use plotters::style::RGBColor;

// ---------------------------------------------------------------------------
// Channel colours
// ---------------------------------------------------------------------------

/// FITC ridge curves.
pub const FITC_COLOR: RGBColor = RGBColor(0, 128, 0);
/// Pacific Blue ridge curves.
pub const PACIFIC_BLUE_COLOR: RGBColor = RGBColor(0, 0, 255);

// ---------------------------------------------------------------------------
// Sequential colour map
// ---------------------------------------------------------------------------

/// Viridis sampled at nine evenly spaced stops.
const VIRIDIS_STOPS: [(u8, u8, u8); 9] = [
    (68, 1, 84),
    (71, 44, 122),
    (59, 81, 139),
    (44, 113, 142),
    (33, 144, 141),
    (39, 173, 129),
    (92, 200, 99),
    (170, 220, 50),
    (253, 231, 37),
];

/// A sequential colour map that blends between stops in linear RGB.
#[derive(Debug, Clone)]
pub struct Colormap {
    stops: Vec<LinSrgb>,
}

impl Colormap {
    pub fn viridis() -> Self {
        let stops = VIRIDIS_STOPS
            .iter()
            .map(|&(r, g, b)| Srgb::new(r, g, b).into_format::<f32>().into_linear())
            .collect();
        Colormap { stops }
    }

    /// Colour at `t` in [0, 1]; values outside are clamped, `NaN` maps to 0.
    pub fn color_at(&self, t: f64) -> RGBColor {
        let t = (if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) }) as f32;
        let segments = (self.stops.len() - 1) as f32;
        let pos = t * segments;
        let idx = (pos.floor() as usize).min(self.stops.len() - 2);
        let frac = pos - idx as f32;
        let mixed = self.stops[idx].mix(self.stops[idx + 1], frac);
        let srgb: Srgb = Srgb::from_linear(mixed);
        let srgb: Srgb<u8> = srgb.into_format();
        RGBColor(srgb.red, srgb.green, srgb.blue)
    }
}

/// Linear normalisation of data values onto [0, 1] using the observed
/// min and max.  A flat range maps everything to 0.
#[derive(Debug, Clone, Copy)]
pub struct Normalize {
    min: f64,
    max: f64,
}

impl Normalize {
    pub fn new(min: f64, max: f64) -> Self {
        Normalize { min, max }
    }

    pub fn apply(&self, v: f64) -> f64 {
        let span = self.max - self.min;
        if !(span > 0.0) || !span.is_finite() {
            return 0.0;
        }
        (v - self.min) / span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viridis_endpoints_match_stops() {
        let cmap = Colormap::viridis();
        let lo = cmap.color_at(0.0);
        let hi = cmap.color_at(1.0);
        assert_eq!((lo.0, lo.1, lo.2), (68, 1, 84));
        assert_eq!((hi.0, hi.1, hi.2), (253, 231, 37));
    }

    #[test]
    fn out_of_range_is_clamped() {
        let cmap = Colormap::viridis();
        let below = cmap.color_at(-3.0);
        let nan = cmap.color_at(f64::NAN);
        let above = cmap.color_at(7.0);
        assert_eq!((below.0, below.1, below.2), (68, 1, 84));
        assert_eq!((nan.0, nan.1, nan.2), (68, 1, 84));
        assert_eq!((above.0, above.1, above.2), (253, 231, 37));
    }

    #[test]
    fn normalize_handles_flat_ranges() {
        assert_eq!(Normalize::new(2.0, 6.0).apply(4.0), 0.5);
        assert_eq!(Normalize::new(3.0, 3.0).apply(3.0), 0.0);
    }
}
