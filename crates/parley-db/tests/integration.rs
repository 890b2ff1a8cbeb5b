use parley_db::{create_pool, run_migrations, DbRuntimeSettings};

#[test]
fn db_initialization_creates_engine_tables() {
    let pool = create_pool(":memory:", DbRuntimeSettings::default()).expect("failed to create pool");
    let conn = pool.get().expect("failed to get connection");
    let applied = run_migrations(&conn).expect("failed to run migrations");
    assert_eq!(applied, 3);

    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type='table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .expect("failed to prepare table query");
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .expect("failed to execute table query")
        .map(|r| r.expect("failed to read table name"))
        .collect();

    assert_eq!(
        tables,
        vec![
            "_parley_migrations",
            "answers",
            "candidates",
            "interviews",
            "positions",
            "questions",
        ]
    );
}

#[test]
fn questions_cascade_with_position() {
    let pool = create_pool(":memory:", DbRuntimeSettings::default()).expect("failed to create pool");
    let conn = pool.get().expect("failed to get connection");
    run_migrations(&conn).expect("failed to run migrations");

    conn.execute_batch(
        "INSERT INTO positions (title) VALUES ('SRE');
         INSERT INTO questions (position_id, text, sort_order) VALUES (1, 'On-call?', 0);
         INSERT INTO questions (position_id, text, sort_order) VALUES (1, 'SLOs?', 1);
         DELETE FROM positions WHERE id = 1;",
    )
    .expect("cascade delete should succeed");

    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0))
        .expect("count questions");
    assert_eq!(remaining, 0);
}
