//! Histogram clustering for the encoder
//!
//! Contexts with identical token statistics share a histogram outright.
//! Afterwards the two clusters whose union costs the fewest extra bits are
//! merged until at most `max_histograms` remain.

use jxl_core::MAX_CLUSTERS;
use rayon::prelude::*;

/// Token counts of one context or cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Histogram {
    pub counts: Vec<u32>,
    pub total: u64,
}

impl Histogram {
    pub fn add(&mut self, symbol: u32) {
        let symbol = symbol as usize;
        if symbol >= self.counts.len() {
            self.counts.resize(symbol + 1, 0);
        }
        self.counts[symbol] += 1;
        self.total += 1;
    }

    pub fn merge(&mut self, other: &Histogram) {
        if other.counts.len() > self.counts.len() {
            self.counts.resize(other.counts.len(), 0);
        }
        for (a, &b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        self.total += other.total;
    }

    /// Shannon estimate of the bits needed to code every token
    pub fn entropy_bits(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let total = self.total as f64;
        self.counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| c as f64 * (total / c as f64).log2())
            .sum()
    }

    fn trimmed(&self) -> &[u32] {
        let len = self.counts.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);
        &self.counts[..len]
    }
}

fn merged_entropy(a: &Histogram, b: &Histogram) -> f64 {
    let mut merged = a.clone();
    merged.merge(b);
    merged.entropy_bits()
}

/// Group `histograms` into at most `max_histograms` clusters
///
/// Returns the clustered histograms and, per input, its cluster index.
/// Cluster indices are numbered by first use, so the map is complete.
pub fn cluster_histograms(
    histograms: &[Histogram],
    max_histograms: usize,
) -> (Vec<Histogram>, Vec<u8>) {
    let max_histograms = max_histograms.clamp(1, MAX_CLUSTERS);

    let mut clusters: Vec<Histogram> = Vec::new();
    let mut assignment: Vec<usize> = Vec::with_capacity(histograms.len());
    for histogram in histograms {
        match clusters
            .iter()
            .position(|c| c.trimmed() == histogram.trimmed())
        {
            Some(idx) => {
                clusters[idx].merge(histogram);
                assignment.push(idx);
            }
            None => {
                assignment.push(clusters.len());
                clusters.push(histogram.clone());
            }
        }
    }

    let mut alive: Vec<Option<Histogram>> = clusters.into_iter().map(Some).collect();
    // `redirect[j]` is the cluster that cluster `j` was folded into
    let mut redirect: Vec<usize> = (0..alive.len()).collect();
    let mut costs: Vec<f64> = alive
        .iter()
        .map(|c| c.as_ref().map_or(0.0, Histogram::entropy_bits))
        .collect();
    let mut remaining = alive.len();

    while remaining > max_histograms {
        let live: Vec<usize> = (0..alive.len()).filter(|&i| alive[i].is_some()).collect();
        let best = live
            .par_iter()
            .enumerate()
            .flat_map_iter(|(n, &i)| live[n + 1..].iter().map(move |&j| (i, j)))
            .filter_map(|(i, j)| {
                let (a, b) = (alive[i].as_ref()?, alive[j].as_ref()?);
                Some((merged_entropy(a, b) - costs[i] - costs[j], i, j))
            })
            .min_by(|x, y| x.0.total_cmp(&y.0).then((x.1, x.2).cmp(&(y.1, y.2))));
        let Some((_, i, j)) = best else {
            break;
        };
        if let Some(absorbed) = alive[j].take() {
            if let Some(target) = alive[i].as_mut() {
                target.merge(&absorbed);
                costs[i] = target.entropy_bits();
            }
        }
        redirect[j] = i;
        remaining -= 1;
    }

    // Follow merge chains and renumber by first use
    let resolve = |mut idx: usize| {
        while redirect[idx] != idx {
            idx = redirect[idx];
        }
        idx
    };
    let mut renumber = vec![usize::MAX; alive.len()];
    let mut out = Vec::new();
    let mut context_map = Vec::with_capacity(assignment.len());
    for &idx in &assignment {
        let root = resolve(idx);
        if renumber[root] == usize::MAX {
            renumber[root] = out.len();
            out.push(alive[root].take().unwrap_or_default());
        }
        context_map.push(renumber[root] as u8);
    }
    (out, context_map)
}
