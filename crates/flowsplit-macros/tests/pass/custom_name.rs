use flowsplit_macros::Columns;

#[derive(Debug, Clone, Copy, Columns)]
#[columns(table_name = "AreaTable")]
pub struct AreaRow {
    pub incremental: f64,
    pub cumulative: f64,
}

fn main() {
    let mut table = AreaTable::with_capacity(2);
    table.push(&AreaRow { incremental: 1.0, cumulative: 1.0 });
    table.push(&AreaRow { incremental: 2.0, cumulative: 3.0 });
    let names: Vec<&str> = table.columns().iter().map(|(n, _)| *n).collect();
    assert_eq!(names, ["incremental", "cumulative"]);
    assert_eq!(table.cumulative, vec![1.0, 3.0]);
    assert_eq!(AreaRow::field_names(), &["incremental", "cumulative"]);
}
