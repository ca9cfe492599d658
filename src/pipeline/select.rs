//! しきい値によるフィルタと順位付け。

use super::record::ReleaseRecord;

/// `score_threshold` 以上のレコードだけを残し、スコアの降順に並べる。
///
/// ソートは安定ソートなので、同点のレコードは入力順を保つ。
#[must_use]
pub fn filter_and_rank(
    records: Vec<ReleaseRecord>,
    score_threshold: f64,
    max_results: Option<usize>,
) -> Vec<ReleaseRecord> {
    let mut qualified: Vec<ReleaseRecord> = records
        .into_iter()
        .filter(|record| {
            record
                .excitement_score
                .is_some_and(|score| score >= score_threshold)
        })
        .collect();

    qualified.sort_by(|a, b| b.score().total_cmp(&a.score()));

    if let Some(limit) = max_results {
        qualified.truncate(limit);
    }

    qualified
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::pipeline::record::ReleaseDetails;

    fn scored(title: &str, score: f64) -> ReleaseRecord {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        let mut record = ReleaseRecord::new(title, date, ReleaseDetails::movie());
        record.excitement_score = Some(score);
        record
    }

    fn titles(records: &[ReleaseRecord]) -> Vec<&str> {
        records.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn keeps_only_records_at_or_above_threshold() {
        let ranked = filter_and_rank(
            vec![scored("low", 69.99), scored("edge", 70.0), scored("high", 90.0)],
            70.0,
            None,
        );

        assert_eq!(titles(&ranked), vec!["high", "edge"]);
        assert!(ranked.iter().all(|r| r.score() >= 70.0));
    }

    #[test]
    fn ties_preserve_input_order() {
        let ranked = filter_and_rank(
            vec![
                scored("first", 80.0),
                scored("top", 95.0),
                scored("second", 80.0),
                scored("third", 80.0),
            ],
            0.0,
            None,
        );

        assert_eq!(titles(&ranked), vec!["top", "first", "second", "third"]);
        assert!(ranked.windows(2).all(|pair| pair[0].score() >= pair[1].score()));
    }

    #[test]
    fn truncates_to_max_results() {
        let ranked = filter_and_rank(
            vec![scored("a", 10.0), scored("b", 30.0), scored("c", 20.0)],
            0.0,
            Some(2),
        );

        assert_eq!(titles(&ranked), vec!["b", "c"]);
    }

    #[test]
    fn unscored_records_never_qualify() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        let unscored = ReleaseRecord::new("unscored", date, ReleaseDetails::movie());

        assert!(filter_and_rank(vec![unscored], 0.0, None).is_empty());
    }
}
