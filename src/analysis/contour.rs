/// One contour sample. `frequency_hz == 0.0` means unvoiced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchPoint {
    pub time_sec: f64,
    pub frequency_hz: f32,
}

impl PitchPoint {
    pub fn new(time_sec: f64, frequency_hz: f32) -> Self {
        Self {
            time_sec,
            frequency_hz,
        }
    }

    pub fn is_voiced(&self) -> bool {
        self.frequency_hz > 0.0
    }
}

/// Time-ordered pitch track of a whole recording.
///
/// Only the analysis run that builds a contour can append to it; once handed
/// out it is read-only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contour {
    points: Vec<PitchPoint>,
}

impl Contour {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Append a point, forcing anything that is not a positive finite
    /// frequency to unvoiced.
    pub(crate) fn push(&mut self, time_sec: f64, frequency_hz: f32) {
        debug_assert!(
            self.points.last().is_none_or(|p| p.time_sec <= time_sec),
            "contour times must be non-decreasing"
        );
        let frequency_hz = if frequency_hz.is_finite() && frequency_hz > 0.0 {
            frequency_hz
        } else {
            0.0
        };
        self.points.push(PitchPoint::new(time_sec, frequency_hz));
    }

    pub fn points(&self) -> &[PitchPoint] {
        &self.points
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PitchPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Time of the last point, or 0 for an empty contour.
    pub fn duration_sec(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.time_sec)
    }

    /// Fraction of points that are voiced.
    pub fn voiced_ratio(&self) -> f32 {
        if self.points.is_empty() {
            return 0.0;
        }
        let voiced = self.points.iter().filter(|p| p.is_voiced()).count();
        voiced as f32 / self.points.len() as f32
    }

    /// The point closest in time to `time_sec`. Ties go to the earlier point.
    pub fn nearest(&self, time_sec: f64) -> Option<&PitchPoint> {
        let idx = self.points.partition_point(|p| p.time_sec < time_sec);
        let after = self.points.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.points.get(i));
        match (before, after) {
            (Some(b), Some(a)) => {
                if (a.time_sec - time_sec) < (time_sec - b.time_sec) {
                    Some(a)
                } else {
                    Some(b)
                }
            }
            (b, a) => b.or(a),
        }
    }
}

impl<'a> IntoIterator for &'a Contour {
    type Item = &'a PitchPoint;
    type IntoIter = std::slice::Iter<'a, PitchPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}
