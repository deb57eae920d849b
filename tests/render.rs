mod common;

use std::cell::Cell;
use std::path::PathBuf;

use common::{SheetExt, date, ledger_schema, record};
use shop_ledger::aggregate::aggregate;
use shop_ledger::data::{Record, Value};
use shop_ledger::reconcile::GroupingPolicy;
use shop_ledger::render::{CellStyle, CellValue, RenderOptions, SheetOp, render};
use shop_ledger::schema::{ColumnSpec, MAX_COLUMN, SheetSchema};
use shop_ledger::thumbnail::Thumbnail;

fn no_thumbnail(_: &Record) -> Thumbnail {
    Thumbnail::Absent
}

fn ledger() -> Vec<Record> {
    aggregate(vec![
        vec![
            record(
                "A",
                &[
                    ("date", Value::Date(date(2024, 1, 3))),
                    ("item", "cable".into()),
                    ("price", Value::Integer(800)),
                ],
            ),
            record(
                "A",
                &[
                    ("date", Value::Date(date(2024, 1, 1))),
                    ("item", "lamp".into()),
                    ("price", Value::Integer(2400)),
                ],
            ),
        ],
        vec![record(
            "B",
            &[("date", Value::Date(date(2024, 1, 2))), ("item", "desk".into())],
        )],
    ])
}

fn text(value: &str) -> CellValue {
    CellValue::Text(value.to_string())
}

#[test]
fn render_writes_header_and_rows_below_it() {
    let schema = ledger_schema("Bought");
    let sheet = render(&schema, &ledger(), no_thumbnail, &RenderOptions::default(), |_| {});

    assert_eq!(sheet.title, "Bought");
    assert_eq!(sheet.record_count, 3);
    assert_eq!(sheet.cell(2, 1), Some(&text("Date")));
    assert_eq!(sheet.cell(2, 2), Some(&text("Shop")));
    assert_eq!(sheet.cell(2, 3), Some(&text("Item")));
    assert_eq!(sheet.cell(2, 4), Some(&text("Price")));
    assert_eq!(sheet.cell(1, 1), None);

    assert_eq!(sheet.cell(3, 1), Some(&CellValue::Date(date(2024, 1, 1))));
    assert_eq!(sheet.cell(3, 2), Some(&text("A")));
    assert_eq!(sheet.cell(3, 3), Some(&text("lamp")));
    assert_eq!(sheet.cell(3, 4), Some(&CellValue::Number(2400.0)));
    assert_eq!(sheet.cell(4, 2), Some(&text("B")));
    assert_eq!(sheet.cell(4, 4), Some(&CellValue::Blank));
    assert_eq!(sheet.cell(5, 3), Some(&text("cable")));
    assert_eq!(sheet.cell(6, 1), None);
}

#[test]
fn header_cells_use_header_style() {
    let schema = ledger_schema("Bought");
    let sheet = render(&schema, &ledger(), no_thumbnail, &RenderOptions::default(), |_| {});
    for op in sheet.content_ops() {
        if let SheetOp::Cell { row, style, .. } = op {
            let expected = if *row == 2 { CellStyle::Header } else { CellStyle::Body };
            assert_eq!(*style, expected, "row {row}");
        }
    }
}

#[test]
fn empty_ledger_renders_only_the_header() {
    let schema = ledger_schema("Sold");
    let mut calls = 0;
    let sheet = render(&schema, &[], no_thumbnail, &RenderOptions::default(), |_| calls += 1);
    assert_eq!(sheet.record_count, 0);
    assert_eq!(sheet.content_ops().count(), 4);
    assert_eq!(calls, 0);
}

#[test]
fn progress_reports_each_written_row() {
    let schema = ledger_schema("Bought");
    let mut seen = Vec::new();
    render(&schema, &ledger(), no_thumbnail, &RenderOptions::default(), |n| seen.push(n));
    assert_eq!(seen, vec![1, 2, 3]);
}

#[test]
fn column_widths_come_first() {
    let mut schema = ledger_schema("Bought");
    schema.column_mut("item").unwrap().width = Some(40.0);
    let sheet = render(&schema, &ledger(), no_thumbnail, &RenderOptions::default(), |_| {});
    assert_eq!(
        sheet.ops()[0],
        SheetOp::ColumnWidth {
            column: 3,
            width: 40.0
        }
    );
}

#[test]
fn thumbnails_are_anchored_after_the_last_column() {
    let schema = ledger_schema("Bought");
    let options = RenderOptions {
        thumbnails: true,
        merge: None,
    };
    let resolve = |record: &Record| match record.get("item").map(Value::as_display).as_deref() {
        Some("desk") => Thumbnail::Path(PathBuf::from("thumb/desk.png")),
        _ => Thumbnail::Absent,
    };
    let sheet = render(&schema, &ledger(), resolve, &options, |_| {});

    let images: Vec<_> = sheet.images().collect();
    assert_eq!(images, vec![(4, 5, &PathBuf::from("thumb/desk.png"))]);
    assert_eq!(sheet.record_count, 3);
}

#[test]
fn thumbnails_use_the_image_column_when_present() {
    let mut schema = ledger_schema("Bought");
    schema.columns.push(ColumnSpec::new("image", 7, "Image").optional());
    let options = RenderOptions {
        thumbnails: true,
        merge: None,
    };
    let resolve = |_: &Record| Thumbnail::Path(PathBuf::from("thumb.png"));
    let sheet = render(&schema, &ledger(), resolve, &options, |_| {});
    assert!(sheet.images().all(|(_, column, _)| column == 7));
    assert_eq!(sheet.images().count(), 3);
}

#[test]
fn image_column_holds_only_the_thumbnail() {
    let mut schema = ledger_schema("Bought");
    schema.columns.push(ColumnSpec::new("image", 5, "Image").optional());
    let records = vec![record(
        "A",
        &[
            ("date", Value::Date(date(2024, 1, 1))),
            ("item", "lamp".into()),
            ("image", "https://img.example/lamp.jpg".into()),
        ],
    )];
    let resolve = |_: &Record| Thumbnail::Path(PathBuf::from("thumb/lamp.png"));

    let with_thumbnails = RenderOptions {
        thumbnails: true,
        merge: None,
    };
    let sheet = render(&schema, &records, resolve, &with_thumbnails, |_| {});
    assert_eq!(sheet.cell(3, 5), Some(&CellValue::Blank));
    let images: Vec<_> = sheet.images().collect();
    assert_eq!(images, vec![(3, 5, &PathBuf::from("thumb/lamp.png"))]);

    let sheet = render(&schema, &records, resolve, &RenderOptions::default(), |_| {});
    assert_eq!(sheet.cell(3, 5), Some(&text("https://img.example/lamp.jpg")));
    assert_eq!(sheet.images().count(), 0);
}

#[test]
fn thumbnails_are_skipped_when_the_sheet_is_full() {
    let schema = SheetSchema::new(
        "Bought",
        1,
        vec![
            ColumnSpec::new("date", 1, "Date"),
            ColumnSpec::new("item", MAX_COLUMN, "Item"),
        ],
    );
    let options = RenderOptions {
        thumbnails: true,
        merge: None,
    };
    let resolve = |_: &Record| Thumbnail::Path(PathBuf::from("thumb.png"));
    let sheet = render(&schema, &ledger(), resolve, &options, |_| {});
    assert_eq!(sheet.images().count(), 0);
    assert_eq!(sheet.record_count, 3);
}

#[test]
fn disabled_thumbnails_never_consult_the_resolver() {
    let schema = ledger_schema("Bought");
    let calls = Cell::new(0);
    let resolve = |_: &Record| {
        calls.set(calls.get() + 1);
        Thumbnail::Path(PathBuf::from("thumb.png"))
    };
    let sheet = render(&schema, &ledger(), resolve, &RenderOptions::default(), |_| {});
    assert_eq!(calls.get(), 0);
    assert_eq!(sheet.images().count(), 0);
}

#[test]
fn grouping_column_spans_its_gap() {
    let schema = SheetSchema::new(
        "Bought",
        1,
        vec![
            ColumnSpec::new("date", 1, "Date"),
            ColumnSpec::new("category", 2, "Category"),
            ColumnSpec::new("item", 5, "Item"),
        ],
    );
    let options = RenderOptions {
        thumbnails: true,
        merge: Some(GroupingPolicy {
            key: "category".to_string(),
            gap_width: 3,
        }),
    };
    let records = vec![record(
        "A",
        &[
            ("date", Value::Date(date(2024, 2, 2))),
            ("category", "Books".into()),
            ("item", "novel".into()),
        ],
    )];
    let resolve = |_: &Record| Thumbnail::Path(PathBuf::from("novel.png"));
    let sheet = render(&schema, &records, resolve, &options, |_| {});

    assert!(sheet.ops().contains(&SheetOp::Merge {
        row: 1,
        first_column: 2,
        last_column: 4,
        value: text("Category"),
        style: CellStyle::Header,
    }));
    assert!(sheet.ops().contains(&SheetOp::Merge {
        row: 2,
        first_column: 2,
        last_column: 4,
        value: text("Books"),
        style: CellStyle::Body,
    }));
    assert_eq!(sheet.cell(2, 5), Some(&text("novel")));
    assert_eq!(sheet.images().next().map(|(_, column, _)| column), Some(6));
}

#[test]
fn rendering_is_deterministic() {
    let schema = ledger_schema("Bought");
    let first = render(&schema, &ledger(), no_thumbnail, &RenderOptions::default(), |_| {});
    let second = render(&schema, &ledger(), no_thumbnail, &RenderOptions::default(), |_| {});
    assert_eq!(first, second);
}
