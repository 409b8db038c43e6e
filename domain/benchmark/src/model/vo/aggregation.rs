use serde::{Deserialize, Serialize};

/// How the scores of the iterations at one CPU count become one score.
///
/// Every strategy ignores missing scores and yields `None` when nothing usable
/// is left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreAggregation {
    #[default]
    Max,
    Min,
    Mean,
    Median,
    Sum,
    First,
}

impl ScoreAggregation {
    pub fn aggregate(&self, scores: &[Option<f64>]) -> Option<f64> {
        let mut values: Vec<f64> =
            scores.iter().flatten().copied().filter(|v| !v.is_nan()).collect();
        if values.is_empty() {
            return None;
        }
        match self {
            ScoreAggregation::Max => values.into_iter().reduce(f64::max),
            ScoreAggregation::Min => values.into_iter().reduce(f64::min),
            ScoreAggregation::Sum => Some(values.iter().sum()),
            ScoreAggregation::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            ScoreAggregation::Median => {
                values.sort_by(f64::total_cmp);
                let mid = values.len() / 2;
                if values.len() % 2 == 0 {
                    Some((values[mid - 1] + values[mid]) / 2.0)
                } else {
                    Some(values[mid])
                }
            }
            ScoreAggregation::First => values.first().copied(),
        }
    }
}
