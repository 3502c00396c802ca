//! Rank accumulation and summary metrics.

use serde::{Deserialize, Serialize};

/// Rank-based evaluation results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RankMetrics {
    /// Mean Reciprocal Rank: E\[1/rank\]
    pub mrr: f64,
    /// Mean Rank: E\[rank\]
    pub mr: f64,
    /// Hits@1: P(rank = 1)
    pub hits_at_1: f64,
    /// Hits@3: P(rank <= 3)
    pub hits_at_3: f64,
    /// Hits@10: P(rank <= 10)
    pub hits_at_10: f64,
    /// Number of ranks behind these numbers
    pub num_triples: usize,
}

impl RankMetrics {
    pub fn from_ranks(ranks: &[usize]) -> Self {
        let mut acc = RankAccumulator::default();
        for &rank in ranks {
            acc.add(rank);
        }
        acc.finish()
    }

    /// Weighted mean of several results, each counted by its `num_triples`.
    pub fn merge(metrics: &[Self]) -> Self {
        let total: usize = metrics.iter().map(|m| m.num_triples).sum();
        if total == 0 {
            return Self::default();
        }
        let total_f = total as f64;
        let weighted = |f: fn(&Self) -> f64| {
            metrics
                .iter()
                .map(|m| f(m) * m.num_triples as f64)
                .sum::<f64>()
                / total_f
        };
        Self {
            mrr: weighted(|m| m.mrr),
            mr: weighted(|m| m.mr),
            hits_at_1: weighted(|m| m.hits_at_1),
            hits_at_3: weighted(|m| m.hits_at_3),
            hits_at_10: weighted(|m| m.hits_at_10),
            num_triples: total,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "MRR: {:.4} | MR: {:.1} | H@1: {:.3} | H@3: {:.3} | H@10: {:.3} (n={})",
            self.mrr, self.mr, self.hits_at_1, self.hits_at_3, self.hits_at_10, self.num_triples
        )
    }
}

/// Running sums for one rank stream.
///
/// Accumulators are plain values: parallel evaluation keeps one per worker
/// and combines them with [`merge`](Self::merge).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RankAccumulator {
    count: usize,
    rank_sum: f64,
    reciprocal_sum: f64,
    hits_1: usize,
    hits_3: usize,
    hits_10: usize,
}

impl RankAccumulator {
    /// Record one 1-based rank.
    pub fn add(&mut self, rank: usize) {
        debug_assert!(rank >= 1);
        self.count += 1;
        self.rank_sum += rank as f64;
        self.reciprocal_sum += 1.0 / rank as f64;
        self.hits_1 += usize::from(rank <= 1);
        self.hits_3 += usize::from(rank <= 3);
        self.hits_10 += usize::from(rank <= 10);
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.count += other.count;
        self.rank_sum += other.rank_sum;
        self.reciprocal_sum += other.reciprocal_sum;
        self.hits_1 += other.hits_1;
        self.hits_3 += other.hits_3;
        self.hits_10 += other.hits_10;
        self
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Divide the sums by the number of ranks. Empty accumulators give zeros.
    pub fn finish(&self) -> RankMetrics {
        if self.count == 0 {
            return RankMetrics::default();
        }
        let n = self.count as f64;
        RankMetrics {
            mrr: self.reciprocal_sum / n,
            mr: self.rank_sum / n,
            hits_at_1: self.hits_1 as f64 / n,
            hits_at_3: self.hits_3 as f64 / n,
            hits_at_10: self.hits_10 as f64 / n,
            num_triples: self.count,
        }
    }
}

/// Conservative rank of `scores[target]` among `scores` (lower = better).
///
/// Every other candidate whose score is not strictly worse counts as ranked
/// ahead, so ties go against the true answer. A NaN on either side also
/// counts against it. Candidates for which `skip` returns true are ignored.
pub fn conservative_rank(scores: &[f32], target: usize, mut skip: impl FnMut(usize) -> bool) -> usize {
    let true_score = scores[target];
    let mut rank = 1;
    for (i, &score) in scores.iter().enumerate() {
        if i == target || skip(i) {
            continue;
        }
        if !(score > true_score) {
            rank += 1;
        }
    }
    rank
}
