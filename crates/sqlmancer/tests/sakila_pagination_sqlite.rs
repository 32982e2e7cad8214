//! Pagination and aggregate builders against a seeded SQLite Sakila subset.

mod common;

use asupersync::Cx;
use common::{block_on, ids, sakila, unwrap_outcome};
use serde_json::json;
use sqlmancer::Selection;

#[test]
fn actor_page_reports_more_and_total() {
    let client = sakila();
    let actor = client.model("Actor").unwrap();
    let cx = Cx::for_testing();

    block_on(async {
        let page = unwrap_outcome(
            actor
                .paginate()
                .order_by(json!([{ "id": "ASC" }]))
                .limit(2)
                .execute(&cx)
                .await,
        );
        assert_eq!(ids(&page.results), vec![1, 2]);
        assert!(page.has_more);
        assert_eq!(page.total_count, 5);
        assert!(page.aggregate.is_empty());

        let last = unwrap_outcome(
            actor
                .paginate()
                .order_by(json!([{ "id": "ASC" }]))
                .limit(2)
                .offset(4)
                .execute(&cx)
                .await,
        );
        assert_eq!(ids(&last.results), vec![5]);
        assert!(!last.has_more);
        assert_eq!(last.total_count, 5);
    });
}

#[test]
fn page_windows_are_consistent() {
    let client = sakila();
    let film = client.model("Film").unwrap();
    let cx = Cx::for_testing();

    block_on(async {
        for limit in [0_u64, 1, 2, 4, 10] {
            for offset in [0_u64, 1, 3, 6, 8] {
                let page = unwrap_outcome(
                    film.paginate()
                        .order_by(json!([{ "id": "ASC" }]))
                        .limit(limit)
                        .offset(offset)
                        .execute(&cx)
                        .await,
                );
                let returned = page.results.len() as u64;
                assert!(returned <= limit, "limit {limit} offset {offset}");
                assert_eq!(page.total_count, 6);
                assert_eq!(
                    page.has_more,
                    offset + returned < page.total_count,
                    "limit {limit} offset {offset}"
                );
                let expected: Vec<i64> = (1..=6_i64)
                    .skip(offset as usize)
                    .take(limit as usize)
                    .collect();
                assert_eq!(ids(&page.results), expected);
            }
        }
    });
}

#[test]
fn filtered_page_with_aggregates() {
    let client = sakila();
    let film = client.model("Film").unwrap();
    let cx = Cx::for_testing();
    let length = film.numeric_field("length").unwrap();
    let title = film.comparable_field("title").unwrap();

    block_on(async {
        let page = unwrap_outcome(
            film.paginate()
                .where_(json!({ "language": { "name": { "equal": "English" } } }))
                .order_by(json!([{ "title": "ASC" }]))
                .select(Selection::new().field("title"))
                .limit(3)
                .count()
                .avg(length)
                .min(title)
                .execute(&cx)
                .await,
        );
        assert_eq!(ids(&page.results), vec![1, 2, 4]);
        assert!(page.has_more);
        assert_eq!(page.total_count, 4);

        // aggregates cover every matching row, not just the page
        assert_eq!(
            serde_json::Value::Object(page.aggregate),
            json!({
                "count": 4,
                "avg": { "length": 78.25 },
                "min": { "title": "ACADEMY DINOSAUR" }
            })
        );
    });
}

#[test]
fn film_count() {
    let client = sakila();
    let film = client.model("Film").unwrap();
    let cx = Cx::for_testing();

    block_on(async {
        let result = unwrap_outcome(
            film.aggregate()
                .where_(json!({ "title": { "equal": "ACADEMY DINOSAUR" } }))
                .count()
                .execute(&cx)
                .await,
        );
        assert_eq!(serde_json::Value::Object(result), json!({ "count": 1 }));
    });
}

#[test]
fn rental_rate_sum_joins_language_once() {
    let client = sakila();
    let film = client.model("Film").unwrap();
    let cx = Cx::for_testing();
    let rental_rate = film.numeric_field("rentalRate").unwrap();

    let builder = film
        .aggregate()
        .where_(json!({
            "language": { "name": { "equal": "English" } },
            "or": [
                { "language": { "id": { "equal": 1 } } },
                { "language": { "name": { "like": "Eng%" } } }
            ]
        }))
        .sum(rental_rate);
    let statement = builder.build().unwrap();
    assert_eq!(statement.sql.matches("JOIN \"language\"").count(), 1, "{}", statement.sql);

    block_on(async {
        let result = unwrap_outcome(builder.execute(&cx).await);
        let sum = result["sum"]["rentalRate"].as_f64().unwrap();
        assert!((sum - 13.96).abs() < 1e-9, "sum was {sum}");
    });
}

#[test]
fn aggregate_window_narrows_rows() {
    let client = sakila();
    let film = client.model("Film").unwrap();
    let cx = Cx::for_testing();
    let length = film.comparable_field("length").unwrap();

    block_on(async {
        let result = unwrap_outcome(
            film.aggregate()
                .order_by(json!([{ "length": "ASC" }]))
                .limit(3)
                .count()
                .max(length)
                .execute(&cx)
                .await,
        );
        assert_eq!(
            serde_json::Value::Object(result),
            json!({ "count": 3, "max": { "length": 62 } })
        );
    });
}

#[test]
fn aggregate_tokens_are_typed() {
    let client = sakila();
    let film = client.model("Film").unwrap();

    assert!(film.numeric_field("title").is_none());
    assert!(film.numeric_field("missing").is_none());
    assert!(film.numeric_field("rentalRate").is_some());
    assert!(film.comparable_field("title").is_some());
    assert!(film.comparable_field("extra").is_none());
}

#[test]
fn build_is_idempotent() {
    let client = sakila();
    let film = client.model("Film").unwrap();
    let length = film.numeric_field("length").unwrap();

    let builder = film
        .paginate()
        .where_(json!({ "actors": { "lastName": { "like": "C%" } } }))
        .order_by(json!([{ "language": { "name": "ASC" } }]))
        .limit(5)
        .offset(5)
        .sum(length);
    assert_eq!(builder.build().unwrap(), builder.build().unwrap());
}
