//! Descriptive statistics over numeric samples.

use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleMetric {
    data: Vec<f64>,
}

impl SampleMetric {
    pub fn add(&mut self, x: f64) {
        self.data.push(x);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }

    pub fn sum(&self) -> f64 {
        let mut s = 0.;
        for x in self.data.iter() {
            s += x;
        }
        s
    }

    /// NaN for an empty sample.
    pub fn mean(&self) -> f64 {
        self.sum() / (self.data.len() as f64)
    }

    pub fn min(&self) -> Option<f64> {
        self.data.iter().copied().min_by(f64::total_cmp)
    }

    pub fn max(&self) -> Option<f64> {
        self.data.iter().copied().max_by(f64::total_cmp)
    }

    pub fn biased_variance(&self) -> f64 {
        let mean = self.mean();
        self.data.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (self.data.len() as f64)
    }

    pub fn unbiased_variance(&self) -> f64 {
        let n = self.data.len() as f64;
        self.biased_variance() * n / (n - 1.)
    }

    fn sorted(&self) -> Vec<f64> {
        let mut sorted = self.data.clone();
        sorted.sort_by(f64::total_cmp);
        sorted
    }

    /// Quantile with linear interpolation between closest ranks, `None` for an empty sample.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        quantile_sorted(&self.sorted(), q)
    }

    pub fn summary(&self) -> Option<Summary> {
        Summary::of(self.data.iter().copied())
    }
}

impl FromIterator<f64> for SampleMetric {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0., 1.) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Distribution summary used in reports.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
    pub p95: f64,
    pub max: f64,
}

impl Summary {
    /// Returns `None` for an empty sample.
    pub fn of(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut sorted: Vec<f64> = values.into_iter().collect();
        if sorted.is_empty() {
            return None;
        }
        let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
        sorted.sort_by(f64::total_cmp);
        let q = |q| quantile_sorted(&sorted, q);
        Some(Self {
            count: sorted.len(),
            mean,
            min: sorted[0],
            p25: q(0.25)?,
            median: q(0.5)?,
            p75: q(0.75)?,
            p95: q(0.95)?,
            max: sorted[sorted.len() - 1],
        })
    }
}
