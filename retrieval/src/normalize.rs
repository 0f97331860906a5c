use faultline_entity_store::ScoredId;

/// Rescale scores in place to `[0, 1]` with min-max normalization.
///
/// Lists whose scores are all equal (including single-element lists) map
/// every score to 1.0: a hit that survived its backend's ranking is never
/// worth nothing. Non-finite scores are treated as 0.
pub fn min_max_normalize(hits: &mut [ScoredId]) {
    if hits.is_empty() {
        return;
    }

    for hit in hits.iter_mut() {
        if !hit.score.is_finite() {
            hit.score = 0.0;
        }
    }

    let (min, max) = hits
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), hit| {
            (min.min(hit.score), max.max(hit.score))
        });
    let range = max - min;

    for hit in hits.iter_mut() {
        hit.score = if range <= f32::EPSILON {
            1.0
        } else {
            ((hit.score - min) / range).clamp(0.0, 1.0)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scores(hits: &[ScoredId]) -> Vec<f32> {
        hits.iter().map(|h| h.score).collect()
    }

    #[test]
    fn test_rescales_to_unit_interval() {
        let mut hits = vec![
            ScoredId::new("a", 12.0),
            ScoredId::new("b", 7.0),
            ScoredId::new("c", 2.0),
        ];
        min_max_normalize(&mut hits);
        assert_eq!(scores(&hits), vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_degenerate_list_maps_to_one() {
        let mut single = vec![ScoredId::new("a", 0.37)];
        min_max_normalize(&mut single);
        assert_eq!(scores(&single), vec![1.0]);

        let mut flat = vec![ScoredId::new("a", 4.2), ScoredId::new("b", 4.2)];
        min_max_normalize(&mut flat);
        assert_eq!(scores(&flat), vec![1.0, 1.0]);
    }

    #[test]
    fn test_empty_and_non_finite() {
        let mut empty: Vec<ScoredId> = Vec::new();
        min_max_normalize(&mut empty);
        assert!(empty.is_empty());

        let mut hits = vec![ScoredId::new("a", f32::NAN), ScoredId::new("b", 2.0)];
        min_max_normalize(&mut hits);
        assert_eq!(scores(&hits), vec![0.0, 1.0]);
    }

    #[test]
    fn test_negative_cosine_scores() {
        let mut hits = vec![ScoredId::new("a", 0.5), ScoredId::new("b", -0.5)];
        min_max_normalize(&mut hits);
        assert_eq!(scores(&hits), vec![1.0, 0.0]);
    }
}
