use gridbook::grid::{DataGrid, RenderedRow};
use gridbook::record::{Field, Record};
use gridbook::store::Store;
use gridbook::viewport::{DEFAULT_ROW_HEIGHT, Viewport};
use proptest::prelude::*;
use std::sync::Arc;

fn grid_with_rows(count: usize, height: u32) -> DataGrid {
    let store = Arc::new(Store::in_memory());
    let records = (0..count)
        .map(|i| Record::default().with_text(Field::Id, &i.to_string()))
        .collect();
    store.seed_if_empty(records).unwrap();
    DataGrid::new(store, Viewport::new(height))
}

fn first_index(row: &RenderedRow) -> usize {
    match row {
        RenderedRow::Data { index, .. } | RenderedRow::AddRow { index, .. } => *index,
    }
}

proptest! {
    #[test]
    fn rendered_rows_stay_bounded(count in 0usize..2_000, height in 1u32..2_000, offset in 0u64..300_000) {
        let mut grid = grid_with_rows(count, height);
        grid.scroll_to(offset);
        let window = grid.render_window();

        let bound = (height as usize).div_ceil(DEFAULT_ROW_HEIGHT as usize) + 2;
        prop_assert!(window.rows.len() <= bound);
        prop_assert_eq!(window.row_count, count + 1);
        prop_assert_eq!(window.total_size, (count as u64 + 1) * 48);
    }

    #[test]
    fn first_rendered_row_is_under_the_top_edge(count in 1usize..2_000, offset in 0u64..100_000) {
        let mut grid = grid_with_rows(count, 480);
        grid.scroll_to(offset);
        let window = grid.render_window();

        let expected = (window.scroll_offset / 48) as usize;
        prop_assert_eq!(first_index(&window.rows[0]), expected);
        for row in &window.rows {
            let (index, start) = match row {
                RenderedRow::Data { index, start, .. } | RenderedRow::AddRow { index, start, .. } => (*index, *start),
            };
            prop_assert_eq!(start, index as u64 * 48);
        }
    }
}

#[test]
fn ten_thousand_rows_render_a_handful() {
    let grid = grid_with_rows(10_000, 480);
    let window = grid.render_window();
    assert_eq!(window.total_size, 10_001 * 48);
    assert!(window.rows.len() <= 12);
    assert!(matches!(window.rows[0], RenderedRow::Data { number: 1, .. }));
}

#[test]
fn scrolled_to_the_end_shows_the_add_row_slot() {
    let mut grid = grid_with_rows(100, 480);
    grid.scroll_to(u64::MAX);
    let window = grid.render_window();
    assert_eq!(window.scroll_offset, 101 * 48 - 480);
    assert!(matches!(
        window.rows.last(),
        Some(RenderedRow::AddRow { index: 100, draft: None, .. })
    ));
}
