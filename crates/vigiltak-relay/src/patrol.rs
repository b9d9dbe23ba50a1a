//! Simulated foot-patrol path for imagery fixes.

const STEP_DEG: f64 = 0.00018;

/// Walks a weaving path from a start position, one step per advance.
/// The weave shortens the latitude step on every third advance and
/// lengthens the longitude step on every fourth, so consecutive fixes
/// do not sit on a straight line.
#[derive(Debug, Clone)]
pub struct PatrolPath {
    lat: f64,
    lon: f64,
    index: u64,
    step: f64,
}

impl PatrolPath {
    pub fn new(start_lat: f64, start_lon: f64) -> Self {
        Self {
            lat: start_lat,
            lon: start_lon,
            index: 0,
            step: STEP_DEG,
        }
    }

    /// Takes one step and returns the new position rounded to six
    /// decimal places. The internal accumulator keeps full precision.
    pub fn advance(&mut self) -> (f64, f64) {
        let lat_factor = if self.index % 3 == 0 { 0.6 } else { 1.0 };
        let lon_factor = if self.index % 4 == 0 { 1.0 } else { 0.6 };
        self.lat += self.step * lat_factor;
        self.lon += self.step * lon_factor;
        self.index += 1;
        (round6(self.lat), round6(self.lon))
    }
}

impl Iterator for PatrolPath {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<(f64, f64)> {
        Some(self.advance())
    }
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}
