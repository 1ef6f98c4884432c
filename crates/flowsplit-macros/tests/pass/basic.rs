use flowsplit_macros::Columns;

#[derive(Debug, Clone, Copy, Columns)]
pub struct ReachRow {
    pub length_m: f64,
    pub velocity: f64,
    pub travel_time_s: f64,
}

fn main() {
    let r = ReachRow { length_m: 1000.0, velocity: 2.0, travel_time_s: 500.0 };
    let mut table = ReachRowTable::with_capacity(10);
    assert!(table.is_empty());
    table.push(&r);
    assert_eq!(table.len(), 1);
    assert_eq!(table.column("velocity"), Some(&[2.0][..]));
    assert_eq!(table.column("missing"), None);
    assert_eq!(ReachRow::field_names(), &["length_m", "velocity", "travel_time_s"]);
}
