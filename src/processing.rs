use crate::config::AppConfig;
use crate::data::Datasets;
use crate::types::{CombinedCounty, County, EducationRecord, Fips, LegendBucket};
use std::collections::HashMap;

/// The nine-step "Greens" sequential scheme, lightest first.
const GREENS: [[f64; 3]; 9] = [
    [247.0, 252.0, 245.0],
    [229.0, 245.0, 224.0],
    [199.0, 233.0, 192.0],
    [161.0, 217.0, 155.0],
    [116.0, 196.0, 118.0],
    [65.0, 171.0, 93.0],
    [35.0, 139.0, 69.0],
    [0.0, 109.0, 44.0],
    [0.0, 68.0, 27.0],
];

/// Everything the renderer needs: joined counties, their colour scale and
/// the legend.
#[derive(Debug, Clone)]
pub struct Choropleth {
    pub counties: Vec<CombinedCounty>,
    pub range: Option<EducationRange>,
    pub legend: Vec<LegendBucket>,
    scale: Option<ColorScale>,
    neutral_fill: String,
}

impl Choropleth {
    /// Scale colour for counties with data, the neutral fill otherwise.
    pub fn fill(&self, county: &CombinedCounty) -> String {
        match (county.education, &self.scale) {
            (Some(value), Some(scale)) => scale.color(value),
            _ => self.neutral_fill.clone(),
        }
    }

    pub fn summary(&self) -> MapSummary {
        let matched = self.counties.iter().filter(|c| c.education.is_some()).count();
        MapSummary {
            total: self.counties.len(),
            matched,
            unmatched: self.counties.len() - matched,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapSummary {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
}

pub fn process_data(config: &AppConfig, datasets: Datasets) -> Choropleth {
    let counties = join(datasets.counties, &datasets.education);
    let range = EducationRange::of(&counties);
    let scale = range.map(ColorScale::greens);
    let legend = match (range, scale) {
        (Some(range), Some(scale)) => legend(range, config.legend.steps, &scale),
        _ => Vec::new(),
    };

    let map = Choropleth {
        counties,
        range,
        legend,
        scale,
        neutral_fill: config.map.neutral_fill.clone(),
    };

    let summary = map.summary();
    tracing::info!(
        total = summary.total,
        matched = summary.matched,
        unmatched = summary.unmatched,
        "joined counties with education records"
    );
    match range {
        Some(r) => tracing::info!(min = r.min, max = r.max, "education range"),
        None => tracing::warn!("no county matched an education record"),
    }

    map
}

/// Attaches to each county the first education record with the same FIPS
/// code. Counties without a record keep empty fields.
pub fn join(counties: Vec<County>, records: &[EducationRecord]) -> Vec<CombinedCounty> {
    let mut lookup: HashMap<Fips, &EducationRecord> = HashMap::with_capacity(records.len());
    for record in records {
        lookup.entry(record.fips).or_insert(record);
    }

    counties
        .into_iter()
        .map(|county| {
            let record = lookup.get(&county.id);
            if record.is_none() {
                tracing::debug!(fips = county.id, "no education record for county");
            }
            CombinedCounty {
                id: county.id,
                geometry: county.geometry,
                state: record.map(|r| r.state.clone()),
                area_name: record.map(|r| r.area_name.clone()),
                education: record.map(|r| r.bachelors_or_higher),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EducationRange {
    pub min: f64,
    pub max: f64,
}

impl EducationRange {
    /// Observed range over counties with data; `None` if there are none.
    pub fn of(counties: &[CombinedCounty]) -> Option<Self> {
        counties
            .iter()
            .filter_map(|c| c.education)
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| match acc {
                None => Some(EducationRange { min: v, max: v }),
                Some(r) => Some(EducationRange { min: r.min.min(v), max: r.max.max(v) }),
            })
    }
}

/// `steps` evenly spaced values starting at `min`, excluding `max`.
/// A degenerate range collapses to a single threshold.
pub fn thresholds(range: EducationRange, steps: usize) -> Vec<f64> {
    if steps == 0 {
        return Vec::new();
    }
    if range.max <= range.min {
        return vec![range.min];
    }
    let step = (range.max - range.min) / steps as f64;
    (0..steps).map(|i| range.min + i as f64 * step).collect()
}

pub fn legend(range: EducationRange, steps: usize, scale: &ColorScale) -> Vec<LegendBucket> {
    thresholds(range, steps)
        .into_iter()
        .map(|threshold| LegendBucket { threshold, color: scale.color(threshold) })
        .collect()
}

/// Threshold rounded to one decimal, as shown next to a legend swatch.
pub fn legend_label(threshold: f64) -> String {
    format!("{}%", (threshold * 10.0).round() / 10.0)
}

/// Sequential colour scale mapping `[min, max]` onto a colour ramp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScale {
    min: f64,
    max: f64,
    ramp: &'static [[f64; 3]],
}

impl ColorScale {
    pub fn greens(range: EducationRange) -> Self {
        Self { min: range.min, max: range.max, ramp: &GREENS }
    }

    pub fn color(&self, value: f64) -> String {
        let t = if self.max > self.min {
            (value - self.min) / (self.max - self.min)
        } else {
            0.5
        };
        let [r, g, b] = interpolate_basis(self.ramp, t);
        format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
    }
}

fn channel(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Uniform cubic B-spline through the ramp, per RGB channel. The curve passes
/// through the first and last colours exactly.
fn interpolate_basis(ramp: &[[f64; 3]], t: f64) -> [f64; 3] {
    let n = ramp.len() - 1;
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let i = ((t * n as f64).floor() as usize).min(n - 1);

    let v1 = ramp[i];
    let v2 = ramp[i + 1];
    let v0 = if i > 0 { ramp[i - 1] } else { extrapolate(v1, v2) };
    let v3 = if i + 2 <= n { ramp[i + 2] } else { extrapolate(v2, v1) };

    let t1 = (t - i as f64 / n as f64) * n as f64;
    let t2 = t1 * t1;
    let t3 = t2 * t1;
    let w0 = 1.0 - 3.0 * t1 + 3.0 * t2 - t3;
    let w1 = 4.0 - 6.0 * t2 + 3.0 * t3;
    let w2 = 1.0 + 3.0 * t1 + 3.0 * t2 - 3.0 * t3;
    let w3 = t3;

    std::array::from_fn(|c| (w0 * v0[c] + w1 * v1[c] + w2 * v2[c] + w3 * v3[c]) / 6.0)
}

fn extrapolate(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [2.0 * a[0] - b[0], 2.0 * a[1] - b[1], 2.0 * a[2] - b[2]]
}
