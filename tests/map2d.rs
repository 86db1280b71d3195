use assert_matches::assert_matches;

use genomic_dashboard_core::error::DashboardError;
use genomic_dashboard_core::map2d::{Map2d, Map2dBase};

#[derive(Debug, Clone, PartialEq)]
struct Key {
    id: String,
    label: &'static str,
}

fn key(id: &str, label: &'static str) -> Key {
    Key {
        id: id.to_string(),
        label,
    }
}

fn sample() -> Map2dBase<Key, u32, i64> {
    let mut map = Map2dBase::new(|k: &Key| k.id.clone(), |column: &u32| column.to_string());
    map.set(key("a", "first"), 1, 10).unwrap();
    map.set(key("b", "first"), 2, 20).unwrap();
    map.set(key("a", "second"), 3, 30).unwrap();
    map
}

#[test]
fn cells_are_addressed_by_serialised_keys() {
    let map = sample();
    assert_eq!(map.get(&key("a", "anything"), &1), Some(&10));
    assert_eq!(map.get(&key("a", "first"), &3), Some(&30));
    assert_eq!(map.get(&key("b", "first"), &1), None);
}

#[test]
fn first_written_key_object_is_kept() {
    let map = sample();
    let labels = map
        .first_axis_keys()
        .into_iter()
        .map(|k| (k.id.as_str(), k.label))
        .collect::<Vec<_>>();
    assert_eq!(labels, vec![("a", "first"), ("b", "first")]);
    assert_eq!(map.second_axis_keys(), vec![&1, &2, &3]);
}

#[test]
fn overwriting_a_cell_keeps_one_entry() {
    let mut map = sample();
    map.set(key("a", "again"), 1, 11).unwrap();
    assert_eq!(map.get(&key("a", ""), &1), Some(&11));
    assert_eq!(map.first_axis_keys().len(), 2);
}

#[test]
fn rows_and_dense_arrays_fill_gaps() {
    let map = sample();
    assert_eq!(map.get_row(&key("a", ""), &0), vec![10, 0, 30]);
    assert_eq!(map.get_row(&key("missing", ""), &-1), vec![-1, -1, -1]);
    assert_eq!(map.get_as_array(&0), vec![vec![10, 0, 30], vec![0, 20, 0]]);
}

#[test]
fn delete_row_removes_key_and_cells() {
    let mut map = sample();
    map.delete_row(&key("a", ""));
    assert_eq!(map.first_axis_keys().len(), 1);
    assert_eq!(map.get(&key("a", ""), &1), None);
    assert_eq!(map.get_as_array(&0), vec![vec![0, 20, 0]]);
}

#[test]
fn second_axis_keys_can_be_registered_without_cells() {
    let mut map = sample();
    map.add_second_axis_key(4);
    map.add_second_axis_key(1);
    assert_eq!(map.second_axis_keys(), vec![&1, &2, &3, &4]);
    assert_eq!(map.get_row(&key("b", ""), &0), vec![0, 20, 0, 0]);
}

#[test]
fn views_filter_without_touching_the_base() {
    let map = sample();
    let mut view = map.view();
    view.delete_row(&key("b", ""));
    view.delete_column(&2);

    assert_eq!(view.get_as_array(&0), vec![vec![10, 30]]);
    assert_eq!(view.get(&key("b", ""), &2), None);
    assert_eq!(view.second_axis_keys(), vec![&1, &3]);
    assert_eq!(view.get_row(&key("b", ""), &0), Vec::<i64>::new());

    assert_eq!(map.get(&key("b", ""), &2), Some(&20));
    assert_eq!(map.get_as_array(&0).len(), 2);
}

#[test]
fn independent_views_over_one_base() {
    let map = sample();
    let mut without_a = map.view();
    let mut without_first_column = map.view();
    without_a.delete_row(&key("a", ""));
    without_first_column.delete_column(&1);

    assert_eq!(without_a.first_axis_keys().len(), 1);
    assert_eq!(without_first_column.first_axis_keys().len(), 2);
    assert_eq!(without_first_column.get_row(&key("a", ""), &0), vec![0, 30]);
    assert!(std::ptr::eq(without_a.base(), &map));
}

#[test]
fn views_are_read_only() {
    let map = sample();
    let mut view = map.view();
    assert_matches!(view.set(key("c", ""), 1, 5), Err(DashboardError::ReadOnlyView));
    assert_eq!(map.get(&key("c", ""), &1), None);
}

#[test]
fn contents_snapshot_in_axis_order() {
    let map = sample();
    let contents = map.contents();
    assert_eq!(contents.second_axis_keys, vec![1, 2, 3]);
    assert_eq!(
        contents.cells,
        vec![vec![Some(10), None, Some(30)], vec![None, Some(20), None]]
    );
}

#[test]
fn debug_output_lists_keys_and_cells() {
    let map = sample();
    let printed = format!("{map:?}");
    assert!(printed.starts_with("Map2dBase"));
    assert!(printed.contains("first_keys"));
    assert!(printed.contains("label: \"first\""));
    assert!(!printed.contains("serialize_first"));
    assert!(printed.ends_with(".. }"));
}

#[test]
fn view_deletions_keep_remaining_order() {
    let map = sample();
    let mut view = map.view();
    view.delete_column(&1);
    view.delete_column(&1);
    view.delete_row(&key("missing", ""));
    assert_eq!(view.second_axis_keys(), vec![&2, &3]);
    assert_eq!(view.get_as_array(&0), vec![vec![0, 30], vec![20, 0]]);
}
