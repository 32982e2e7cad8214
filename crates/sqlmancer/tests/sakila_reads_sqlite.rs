//! Filters, ordering and selections against a seeded SQLite Sakila subset.

mod common;

use asupersync::Cx;
use common::{block_on, ids, sakila, sorted_ids, unwrap_err, unwrap_outcome};
use serde_json::json;
use sqlmancer::{AggregateRequest, AssociationSelection, CompileErrorKind, Error, Selection};

#[test]
fn find_by_id_and_find_one() {
    let client = sakila();
    let film = client.model("Film").unwrap();
    let cx = Cx::for_testing();

    block_on(async {
        let academy = unwrap_outcome(
            film.find_by_id(1_i64)
                .select(Selection::new().fields(["title", "rating", "length"]))
                .execute(&cx)
                .await,
        )
        .expect("film 1 exists");
        assert_eq!(
            serde_json::Value::Object(academy),
            json!({ "id": 1, "title": "ACADEMY DINOSAUR", "rating": "PG", "length": 86 })
        );

        let missing = unwrap_outcome(film.find_by_id(999_i64).execute(&cx).await);
        assert!(missing.is_none());

        let longest = unwrap_outcome(
            film.find_one()
                .order_by(json!([{ "length": "DESC" }]))
                .select(Selection::new().field("title"))
                .execute(&cx)
                .await,
        )
        .expect("at least one film");
        assert_eq!(longest["title"], "AGENT TRUMAN");
    });
}

#[test]
fn unknown_leaf_filter_is_ignored() {
    let client = sakila();
    let film = client.model("Film").unwrap();
    let cx = Cx::for_testing();

    block_on(async {
        let plain = unwrap_outcome(
            film.find_many()
                .where_(json!({ "rating": { "equal": "G" } }))
                .execute(&cx)
                .await,
        );
        let noisy = unwrap_outcome(
            film.find_many()
                .where_(json!({ "rating": { "equal": "G" }, "bogus": { "equal": 1 } }))
                .execute(&cx)
                .await,
        );
        assert_eq!(sorted_ids(&plain), vec![2, 4]);
        assert_eq!(plain, noisy);

        let everything = unwrap_outcome(
            film.find_many()
                .where_(json!({ "bogus": { "equal": 1 } }))
                .execute(&cx)
                .await,
        );
        assert_eq!(everything.len(), 6);
    });
}

#[test]
fn or_is_union_and_not_is_complement() {
    let client = sakila();
    let film = client.model("Film").unwrap();
    let cx = Cx::for_testing();
    let rated_g = json!({ "rating": { "equal": "G" } });
    let long = json!({ "length": { "greaterThan": 100 } });

    block_on(async {
        let either = unwrap_outcome(
            film.find_many()
                .where_(json!({ "or": [rated_g.clone(), long.clone()] }))
                .execute(&cx)
                .await,
        );
        assert_eq!(sorted_ids(&either), vec![2, 4, 5]);

        let both = unwrap_outcome(
            film.find_many()
                .where_(json!({ "and": [rated_g.clone(), long] }))
                .execute(&cx)
                .await,
        );
        assert_eq!(sorted_ids(&both), vec![4]);

        let not_g = unwrap_outcome(
            film.find_many()
                .where_(json!({ "not": rated_g }))
                .execute(&cx)
                .await,
        );
        assert_eq!(sorted_ids(&not_g), vec![1, 3, 5, 6]);
    });
}

#[test]
fn merge_where_matches_explicit_and() {
    let client = sakila();
    let film = client.model("Film").unwrap();
    let cx = Cx::for_testing();
    let english = json!({ "language": { "name": { "equal": "English" } } });
    let cheap = json!({ "rentalRate": { "lessThan": 3 } });

    let merged = film.find_many().where_(english.clone()).merge_where(cheap.clone());
    let explicit = film
        .find_many()
        .where_(json!({ "and": [english, cheap] }));
    assert_eq!(merged.build().unwrap(), explicit.build().unwrap());

    block_on(async {
        let rows = unwrap_outcome(merged.execute(&cx).await);
        assert_eq!(sorted_ids(&rows), vec![1, 4]);
    });
}

#[test]
fn enum_values_map_both_ways() {
    let client = sakila();
    let film = client.model("Film").unwrap();
    let cx = Cx::for_testing();

    block_on(async {
        let rows = unwrap_outcome(
            film.find_many()
                .where_(json!({ "rating": { "in": ["G", "PG13"] } }))
                .select(Selection::new().field("rating"))
                .order_by(json!([{ "id": "ASC" }]))
                .execute(&cx)
                .await,
        );
        assert_eq!(ids(&rows), vec![2, 4, 6]);
        assert_eq!(rows[2]["rating"], "PG13");

        let adult = unwrap_outcome(
            film.find_one()
                .where_(json!({ "rating": { "equal": "NC17" } }))
                .select(Selection::new().field("rating"))
                .execute(&cx)
                .await,
        )
        .expect("one NC-17 film");
        assert_eq!(adult["id"], 3);
        assert_eq!(adult["rating"], "NC17");
    });
}

#[test]
fn list_and_json_fields() {
    let client = sakila();
    let film = client.model("Film").unwrap();
    let cx = Cx::for_testing();

    block_on(async {
        let trailers = unwrap_outcome(
            film.find_many()
                .where_(json!({ "specialFeatures": { "contains": ["Trailers"] } }))
                .execute(&cx)
                .await,
        );
        assert_eq!(sorted_ids(&trailers), vec![2, 3]);

        let overlapping = unwrap_outcome(
            film.find_many()
                .where_(json!({ "specialFeatures": { "overlaps": ["Commentaries", "Trailers"] } }))
                .execute(&cx)
                .await,
        );
        assert_eq!(sorted_ids(&overlapping), vec![2, 3, 4]);

        let awarded = unwrap_outcome(
            film.find_many()
                .where_(json!({ "extra": { "equal": { "awards": 2 } } }))
                .select(Selection::new().fields(["specialFeatures", "extra"]))
                .execute(&cx)
                .await,
        );
        assert_eq!(awarded.len(), 1);
        assert_eq!(awarded[0]["specialFeatures"], json!(["Deleted Scenes", "Behind the Scenes"]));
        assert_eq!(awarded[0]["extra"], json!({ "awards": 2 }));
    });
}

#[test]
fn association_filters() {
    let client = sakila();
    let film = client.model("Film").unwrap();
    let language = client.model("Language").unwrap();
    let cx = Cx::for_testing();

    block_on(async {
        let with_nick = unwrap_outcome(
            film.find_many()
                .where_(json!({ "actors": { "firstName": { "equal": "NICK" } } }))
                .execute(&cx)
                .await,
        );
        assert_eq!(sorted_ids(&with_nick), vec![1, 3]);

        let ensembles = unwrap_outcome(
            film.find_many()
                .where_(json!({ "actors": { "count": { "greaterThanOrEqual": 2 } } }))
                .execute(&cx)
                .await,
        );
        assert_eq!(sorted_ids(&ensembles), vec![1, 4, 5]);

        let long_average = unwrap_outcome(
            language
                .find_many()
                .where_(json!({ "films": { "avg": { "length": { "greaterThan": 100 } } } }))
                .execute(&cx)
                .await,
        );
        assert_eq!(ids(&long_average), vec![2]);

        let italian = unwrap_outcome(
            film.find_many()
                .where_(json!({ "language": { "name": { "equal": "Italian" } } }))
                .execute(&cx)
                .await,
        );
        assert_eq!(sorted_ids(&italian), vec![3, 5]);
    });
}

#[test]
fn ordering_through_associations() {
    let client = sakila();
    let film = client.model("Film").unwrap();
    let language = client.model("Language").unwrap();
    let cx = Cx::for_testing();

    block_on(async {
        let by_language = unwrap_outcome(
            film.find_many()
                .order_by(json!([{ "language": { "name": "DESC" } }, { "id": "ASC" }]))
                .execute(&cx)
                .await,
        );
        assert_eq!(ids(&by_language), vec![3, 5, 1, 2, 4, 6]);

        let by_catalogue = unwrap_outcome(
            language
                .find_many()
                .order_by(json!([{ "films": { "count": "DESC" } }]))
                .execute(&cx)
                .await,
        );
        assert_eq!(ids(&by_catalogue), vec![1, 2, 3]);
    });
}

#[test]
fn unknown_order_field_is_rejected() {
    let client = sakila();
    let film = client.model("Film").unwrap();
    let cx = Cx::for_testing();

    let builder = film
        .find_many()
        .order_by(json!([{ "language": { "missing": "ASC" } }]));
    let err = builder.build().unwrap_err();
    assert!(err.to_string().contains("Invalid field name"), "{err}");

    block_on(async {
        match unwrap_err(builder.execute(&cx).await) {
            Error::Compile(e) => assert_eq!(e.kind, CompileErrorKind::InvalidFieldName),
            other => panic!("expected compile error, got {other}"),
        }
    });
}

#[test]
fn nested_selection() {
    let client = sakila();
    let film = client.model("Film").unwrap();
    let cx = Cx::for_testing();

    block_on(async {
        let academy = unwrap_outcome(
            film.find_by_id(1_i64)
                .select(
                    Selection::new()
                        .field("title")
                        .association("language", AssociationSelection::new(Selection::new().field("name")))
                        .association(
                            "actors",
                            AssociationSelection::new(Selection::new().field("lastName"))
                                .order_by(json!([{ "lastName": "ASC" }])),
                        ),
                )
                .execute(&cx)
                .await,
        )
        .expect("film 1 exists");

        assert_eq!(
            serde_json::Value::Object(academy),
            json!({
                "id": 1,
                "title": "ACADEMY DINOSAUR",
                "language": { "id": 1, "name": "English" },
                "actors": [
                    { "id": 3, "lastName": "CHASE" },
                    { "id": 1, "lastName": "GUINESS" },
                    { "id": 2, "lastName": "WAHLBERG" }
                ]
            })
        );
    });
}

#[test]
fn paginated_association_selection() {
    let client = sakila();
    let language = client.model("Language").unwrap();
    let cx = Cx::for_testing();

    block_on(async {
        let languages = unwrap_outcome(
            language
                .find_many()
                .order_by(json!([{ "id": "ASC" }]))
                .select(
                    Selection::new().field("name").association(
                        "filmsPage",
                        AssociationSelection::new(Selection::new().field("title"))
                            .order_by(json!([{ "id": "ASC" }]))
                            .limit(2)
                            .aggregate(AggregateRequest::new().count().max("length")),
                    ),
                )
                .execute(&cx)
                .await,
        );
        assert_eq!(languages.len(), 3);

        assert_eq!(
            languages[0]["filmsPage"],
            json!({
                "results": [
                    { "id": 1, "title": "ACADEMY DINOSAUR" },
                    { "id": 2, "title": "ACE GOLDFINGER" }
                ],
                "aggregate": { "count": 4, "max": { "length": 117 } },
                "hasMore": true,
                "totalCount": 4
            })
        );
        assert_eq!(languages[2]["filmsPage"]["results"], json!([]));
        assert_eq!(languages[2]["filmsPage"]["hasMore"], false);
        assert_eq!(languages[2]["filmsPage"]["totalCount"], 0);
    });
}

#[test]
fn cte_model_reads() {
    let client = sakila();
    let summary = client.model("FilmSummary").unwrap();
    let cx = Cx::for_testing();

    assert!(summary.mutations().is_none());

    block_on(async {
        let rows = unwrap_outcome(
            summary
                .find_many()
                .where_(json!({ "title": { "like": "AG%" } }))
                .select(
                    Selection::new()
                        .field("title")
                        .association("language", AssociationSelection::new(Selection::new().field("name"))),
                )
                .execute(&cx)
                .await,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(
            serde_json::Value::Object(rows[0].clone()),
            json!({
                "id": 5,
                "title": "AGENT TRUMAN",
                "language": { "id": 2, "name": "Italian" }
            })
        );
    });
}

#[test]
fn unknown_model_is_a_config_error() {
    let client = sakila();
    match client.model("Rental") {
        Err(Error::Config(e)) => assert!(e.to_string().contains("Rental"), "{e}"),
        other => panic!("expected config error, got {other:?}"),
    }
}
