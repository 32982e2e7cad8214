//! Shared registry fixture for unit tests.

use sqlmancer_core::{Dialect, Registry};

pub(crate) const SAKILA: &str = r#"{
    "dialect": "SQLITE",
    "transformFieldNames": "SNAKE_CASE",
    "enums": {
        "FilmRating": { "values": { "G": "G", "PG": "PG", "PG13": "PG-13", "R": "R", "NC17": "NC-17" } }
    },
    "models": {
        "Film": {
            "table": "film",
            "pk": "film_id",
            "fields": {
                "id": { "type": "ID", "column": "film_id", "hasDefault": true },
                "title": { "type": "String" },
                "description": { "type": "String", "nullable": true },
                "releaseYear": { "type": "Number", "nullable": true },
                "length": { "type": "Number", "nullable": true },
                "rentalRate": { "type": "Number", "hasDefault": true },
                "rating": { "type": { "enum": "FilmRating" }, "nullable": true },
                "specialFeatures": { "type": "String", "list": true, "nullable": true },
                "extra": { "type": "JSON", "nullable": true },
                "languageId": { "type": "ID" }
            },
            "associations": {
                "language": { "model": "Language", "on": [{ "from": "language_id", "to": "language_id" }] },
                "actors": {
                    "model": "Actor",
                    "through": "film_actor",
                    "many": true,
                    "on": [
                        { "from": "film_id", "to": "film_id" },
                        { "from": "actor_id", "to": "actor_id" }
                    ]
                },
                "categories": {
                    "model": "Category",
                    "through": "film_category",
                    "many": true,
                    "on": [
                        { "from": "film_id", "to": "film_id" },
                        { "from": "category_id", "to": "category_id" }
                    ]
                }
            }
        },
        "Language": {
            "table": "language",
            "pk": "language_id",
            "fields": {
                "id": { "type": "ID", "column": "language_id", "hasDefault": true },
                "name": { "type": "String" }
            },
            "associations": {
                "films": { "model": "Film", "many": true, "on": [{ "from": "language_id", "to": "language_id" }] },
                "filmsPage": { "model": "Film", "paginate": true, "on": [{ "from": "language_id", "to": "language_id" }] }
            }
        },
        "Actor": {
            "table": "actor",
            "pk": "actor_id",
            "fields": {
                "id": { "type": "ID", "column": "actor_id", "hasDefault": true },
                "firstName": { "type": "String" },
                "lastName": { "type": "String" }
            },
            "associations": {
                "films": {
                    "model": "Film",
                    "through": "film_actor",
                    "many": true,
                    "on": [
                        { "from": "actor_id", "to": "actor_id" },
                        { "from": "film_id", "to": "film_id" }
                    ]
                }
            }
        },
        "Category": {
            "table": "category",
            "pk": "category_id",
            "readOnly": true,
            "fields": {
                "id": { "type": "ID", "column": "category_id" },
                "name": { "type": "String" }
            }
        },
        "FilmSummary": {
            "cte": "SELECT film_id, title FROM film",
            "pk": "film_id",
            "fields": {
                "id": { "type": "ID", "column": "film_id" },
                "title": { "type": "String" }
            },
            "associations": {
                "film": { "model": "Film", "on": [{ "from": "film_id", "to": "film_id" }] }
            }
        }
    }
}"#;

pub(crate) fn sakila() -> Registry {
    Registry::from_json(SAKILA).unwrap()
}

/// The fixture compiled for another dialect.
pub(crate) fn sakila_for(dialect: Dialect) -> Registry {
    let mut doc: serde_json::Value = serde_json::from_str(SAKILA).unwrap();
    doc["dialect"] = serde_json::to_value(dialect).unwrap();
    Registry::from_config(&serde_json::from_value(doc).unwrap()).unwrap()
}
