#![allow(dead_code)]

use paradox_query::{
    Catalog, ColumnMeta, EvalContext, MemoryTable, QueryResult, QuerySpec, Row, Value, ValueKind,
};

/// One-column integer table; `None` entries are NULL.
pub fn keys(name: &str, column: &str, values: &[Option<i64>]) -> MemoryTable {
    MemoryTable::new(
        name,
        vec![ColumnMeta::new(column, ValueKind::Integer)],
        values
            .iter()
            .map(|v| vec![v.map_or(Value::Null, Value::Integer)])
            .collect(),
    )
    .expect("valid table")
}

/// `Employees(Id, Name, Dept, Salary)`.
pub fn employees() -> MemoryTable {
    let rows = [
        (1, "Ada", Some("ENG"), 120),
        (2, "Grace", Some("ENG"), 130),
        (3, "Linus", Some("OPS"), 90),
        (4, "Barbara", None, 100),
        (5, "Alan", Some("OPS"), 95),
        (6, "Edsger", Some("RES"), 110),
    ];
    MemoryTable::new(
        "Employees",
        vec![
            ColumnMeta::new("Id", ValueKind::Integer),
            ColumnMeta::new("Name", ValueKind::Text),
            ColumnMeta::new("Dept", ValueKind::Text),
            ColumnMeta::new("Salary", ValueKind::Integer),
        ],
        rows.iter()
            .map(|(id, name, dept, salary)| {
                vec![
                    Value::Integer(*id),
                    Value::from(*name),
                    dept.map_or(Value::Null, Value::from),
                    Value::Integer(*salary),
                ]
            })
            .collect(),
    )
    .expect("valid table")
}

/// `Departments(Code, Title)`; LAB has no employees.
pub fn departments() -> MemoryTable {
    MemoryTable::new(
        "Departments",
        vec![
            ColumnMeta::new("Code", ValueKind::Text),
            ColumnMeta::new("Title", ValueKind::Text),
        ],
        vec![
            vec![Value::from("ENG"), Value::from("Engineering")],
            vec![Value::from("OPS"), Value::from("Operations")],
            vec![Value::from("LAB"), Value::from("Laboratory")],
        ],
    )
    .expect("valid table")
}

pub fn company() -> Catalog {
    Catalog::new()
        .with_table(employees())
        .with_table(departments())
}

pub fn run(catalog: &Catalog, spec: &QuerySpec) -> Vec<Row> {
    run_with(catalog, spec, &EvalContext::default())
}

pub fn run_with(catalog: &Catalog, spec: &QuerySpec, ctx: &EvalContext) -> Vec<Row> {
    spec.bind(catalog)
        .expect("bind")
        .execute(ctx)
        .expect("execute")
        .collect::<QueryResult<_>>()
        .expect("rows")
}
