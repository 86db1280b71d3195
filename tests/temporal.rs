use std::cmp::Ordering;

use assert_matches::assert_matches;
use serde_json::json;

use genomic_dashboard_core::domain::Granularity;
use genomic_dashboard_core::error::DashboardError;
use genomic_dashboard_core::temporal::{
    Temporal, TemporalCache, compare_temporal, date_range_filter, generate_range, min_max,
};

fn texts(values: &[Temporal]) -> Vec<&str> {
    values.iter().map(Temporal::text).collect()
}

#[test]
fn day_projects_to_coarser_units() {
    let cache = TemporalCache::new();
    let day = cache.day("2023-05-09").unwrap();
    assert_eq!(day.week(&cache).text(), "2023-W19");
    assert_eq!(day.month(&cache).text(), "2023-05");
    assert_eq!(day.year(&cache).text(), "2023");
    assert_eq!(day.month(&cache).year(&cache).text(), "2023");
}

#[test]
fn iso_weeks_cross_year_boundaries() {
    let cache = TemporalCache::new();
    assert_eq!(cache.day("2021-01-03").unwrap().week(&cache).text(), "2020-W53");
    assert_eq!(cache.day("2021-01-04").unwrap().week(&cache).text(), "2021-W01");

    let week = cache.week("2020-W53").unwrap();
    assert_eq!(week.first_day(&cache).text(), "2020-12-28");
    assert_eq!(week.last_day(&cache).text(), "2021-01-03");
    assert_eq!(week.add_weeks(&cache, 1).unwrap().text(), "2021-W01");
}

#[test]
fn month_boundaries_follow_the_calendar() {
    let cache = TemporalCache::new();
    let february = cache.month("2024-02").unwrap();
    assert_eq!(february.first_day(&cache).text(), "2024-02-01");
    assert_eq!(february.last_day(&cache).text(), "2024-02-29");
    assert_eq!(cache.month("2023-02").unwrap().last_day(&cache).text(), "2023-02-28");
}

#[test]
fn values_are_interned() {
    let cache = TemporalCache::new();
    let first = cache.day("2023-05-09").unwrap();
    let second = cache.day("2023-05-09").unwrap();
    assert!(first.same_instance(&second));

    let via_add = cache.day("2023-05-08").unwrap().add_days(&cache, 1).unwrap();
    assert!(first.same_instance(&via_add));
}

#[test]
fn add_and_difference_per_granularity() {
    let cache = TemporalCache::new();
    let month = cache.parse("2023-11", Granularity::Month).unwrap();
    let later = month.add(&cache, 3).unwrap();
    assert_eq!(later.text(), "2024-02");
    assert_eq!(later.difference(&month).unwrap(), 3);
    assert_eq!(month.difference(&later).unwrap(), -3);

    let day = cache.parse("2024-03-01", Granularity::Day).unwrap();
    assert_eq!(day.add(&cache, -1).unwrap().text(), "2024-02-29");

    let year = cache.parse("2020", Granularity::Year).unwrap();
    assert_eq!(year.add(&cache, 4).unwrap().text(), "2024");
}

#[test]
fn difference_rejects_mixed_granularities() {
    let cache = TemporalCache::new();
    let day = cache.parse("2023-01-01", Granularity::Day).unwrap();
    let month = cache.parse("2023-01", Granularity::Month).unwrap();
    assert_matches!(
        day.difference(&month),
        Err(DashboardError::GranularityMismatch { .. })
    );
}

#[test]
fn generate_range_is_inclusive() {
    let cache = TemporalCache::new();
    let start = cache.parse("2023-01-30", Granularity::Day).unwrap();
    let end = cache.parse("2023-02-02", Granularity::Day).unwrap();
    let range = generate_range(&cache, &start, &end).unwrap();
    assert_eq!(
        texts(&range),
        vec!["2023-01-30", "2023-01-31", "2023-02-01", "2023-02-02"]
    );
    assert_eq!(range.len() as i64, end.difference(&start).unwrap() + 1);
    assert!(range.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn generate_range_edge_cases() {
    let cache = TemporalCache::new();
    let week = cache.parse("2023-W10", Granularity::Week).unwrap();
    assert_eq!(generate_range(&cache, &week, &week).unwrap(), vec![week.clone()]);

    let earlier = cache.parse("2023-W08", Granularity::Week).unwrap();
    assert!(generate_range(&cache, &week, &earlier).unwrap().is_empty());
}

#[test]
fn from_date_string_projects_onto_granularity() {
    let cache = TemporalCache::new();
    let cases = [
        (Granularity::Day, "2022-12-31"),
        (Granularity::Week, "2022-W52"),
        (Granularity::Month, "2022-12"),
        (Granularity::Year, "2022"),
    ];
    for (granularity, expected) in cases {
        let value = cache.from_date_string("2022-12-31", granularity).unwrap();
        assert_eq!(value.text(), expected);
        assert_eq!(value.granularity(), granularity);
    }
}

#[test]
fn invalid_texts_are_rejected() {
    let cache = TemporalCache::new();
    assert_matches!(cache.day("2023-13-01"), Err(DashboardError::InvalidTemporal(_)));
    assert_matches!(cache.week("2023-W54"), Err(DashboardError::InvalidTemporal(_)));
    assert_matches!(cache.month("2023-00"), Err(DashboardError::InvalidTemporal(_)));
    assert_matches!(cache.year("twenty"), Err(DashboardError::InvalidTemporal(_)));
    assert!(cache.is_empty());
}

#[test]
fn missing_values_sort_last() {
    let cache = TemporalCache::new();
    let day = cache.parse("2023-01-01", Granularity::Day).unwrap();
    assert_eq!(compare_temporal(Some(&day), None), Ordering::Less);
    assert_eq!(compare_temporal(None, Some(&day)), Ordering::Greater);
    assert_eq!(compare_temporal(None, None), Ordering::Equal);

    let mut values = vec![None, Some(day.add(&cache, 2).unwrap()), Some(day.clone())];
    values.sort_by(|a, b| compare_temporal(a.as_ref(), b.as_ref()));
    assert_eq!(values[0].as_ref().map(Temporal::text), Some("2023-01-01"));
    assert!(values[2].is_none());
}

#[test]
fn min_max_over_values() {
    let cache = TemporalCache::new();
    let values = ["2023-03", "2022-11", "2023-01"]
        .into_iter()
        .map(|text| cache.parse(text, Granularity::Month).unwrap())
        .collect::<Vec<_>>();
    let (min, max) = min_max(&values).unwrap();
    assert_eq!(min.text(), "2022-11");
    assert_eq!(max.text(), "2023-03");
    assert!(min_max(&Vec::<Temporal>::new()).is_none());
}

#[test]
fn date_range_filter_covers_the_unit() {
    let cache = TemporalCache::new();
    let week = cache.parse("2023-W01", Granularity::Week).unwrap();
    let filter = date_range_filter("date", &week);
    assert_eq!(
        serde_json::to_value(&filter).unwrap(),
        json!({"dateFrom": "2023-01-02", "dateTo": "2023-01-08"})
    );
}

#[test]
fn temporal_serialises_as_text() {
    let cache = TemporalCache::new();
    let month = cache.parse("2023-07", Granularity::Month).unwrap();
    assert_eq!(serde_json::to_value(&month).unwrap(), json!("2023-07"));
}
