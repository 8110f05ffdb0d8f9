mod common;

use std::thread;
use std::time::Duration;

use common::memory_fixtures::keys;
use paradox_query::{
    CancellationToken, Catalog, EvalContext, Expr, JoinKind, QueryError, QuerySpec, TableRef,
};

const SIDE: i64 = 10_000;

fn cross_product() -> (Catalog, QuerySpec) {
    let values: Vec<Option<i64>> = (0..SIDE).map(Some).collect();
    let catalog = Catalog::new()
        .with_table(keys("L", "A", &values))
        .with_table(keys("R", "B", &values));
    let spec = QuerySpec::from_table(TableRef::new("L"))
        .join(JoinKind::Cross, TableRef::new("R"), None)
        .select(Expr::column("A"))
        .select(Expr::column("B"));
    (catalog, spec)
}

#[test]
fn cancelling_a_cursor_mid_join() {
    let (catalog, spec) = cross_product();
    let query = spec.bind(&catalog).unwrap();
    let mut cursor = query.execute(&EvalContext::default()).unwrap();

    let taken = cursor.by_ref().take(1_000).filter(Result::is_ok).count();
    assert_eq!(taken, 1_000);

    cursor.cancel();
    match cursor.next() {
        Some(Err(err)) => assert!(err.is_cancelled()),
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert!(cursor.next().is_none());
}

#[test]
fn cancelling_from_another_thread_stops_an_aggregate() {
    let (catalog, spec) = cross_product();
    let mut spec = spec;
    spec.columns.clear();
    let query = spec.select(Expr::count_star()).bind(&catalog).unwrap();

    let token = CancellationToken::new();
    let ctx = EvalContext::default().with_cancellation(token.clone());
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        token.cancel();
    });

    let result: Result<Vec<_>, QueryError> = query.execute(&ctx).unwrap().collect();
    canceller.join().unwrap();
    assert!(matches!(result, Err(QueryError::Cancelled)));
}
