//! The same scenarios run against every storage backend
//!
//! Memory, redb and SQLite must agree on identity, uniqueness, query
//! results and pagination.

mod common;

use common::*;
use itemstore::engine::{BackendKind, PersistenceError, QueryRequest, Tuple};
use itemstore::model::{ItemRef, Pk, TypeCode, Value};

#[test]
fn test_cascade_round_trip() {
    for harness in all_backends() {
        let service = &harness.service;
        let le_guin = author(service, "Ursula K. Le Guin", 1929);
        let book = book(service, "978-0441478125", "The Left Hand of Darkness", 1969, &le_guin);
        book.set("tags", vec![Value::from("sf"), Value::from("classic")]).unwrap();
        service.save(&book).unwrap();

        assert_eq!(le_guin.pk(), Some(Pk::new(1, "author")));
        let loaded = service.get("book", book.pk().unwrap().id).unwrap();
        assert_eq!(text_of(&loaded, "title"), "The Left Hand of Darkness");
        assert_eq!(
            loaded.get("tags"),
            Some(Value::List(vec!["sf".into(), "classic".into()])),
            "{:?}",
            harness.backend
        );
        let stored_author = loaded.get("author").unwrap();
        assert_eq!(stored_author.as_item().unwrap().pk(), le_guin.pk());
    }
}

#[test]
fn test_uniqueness_on_every_backend() {
    for harness in all_backends() {
        let service = &harness.service;
        service.save(&author(service, "Octavia Butler", 1947)).unwrap();
        assert_not_unique(service.save(&author(service, "Octavia Butler", 1950)));

        let stats = service.stats().unwrap();
        assert_eq!(stats.records_by_type.get(&TypeCode::new("author")), Some(&1));
    }
}

#[test]
fn test_ids_survive_restart() {
    for harness in persistent_backends() {
        for (name, born) in [("A", 1), ("B", 2), ("C", 3)] {
            harness.service.save(&author(&harness.service, name, born)).unwrap();
        }
        harness.service.remove_by_pk("author", 3).unwrap();

        let harness = harness.reopen();
        let fresh = author(&harness.service, "D", 4);
        harness.service.save(&fresh).unwrap();
        assert_eq!(fresh.pk().unwrap().id, 4, "{:?}", harness.backend);
        assert_not_found(harness.service.get("author", 3));
        assert_eq!(text_of(&harness.service.get("author", 2).unwrap(), "name"), "B");
    }
}

fn seed_catalog(harness: &Harness) {
    let service = &harness.service;
    let authors = [
        author(service, "Le Guin", 1929),
        author(service, "Butler", 1947),
        author(service, "Banks", 1954),
    ];
    let books = [
        ("1", "Earthsea", 1968, 0),
        ("2", "The Dispossessed", 1974, 0),
        ("3", "Kindred", 1979, 1),
        ("4", "Parable of the Sower", 1993, 1),
        ("5", "Consider Phlebas", 1987, 2),
        ("6", "Excession", 1996, 2),
        ("7", "Lathe of Heaven", 1971, 0),
    ];
    let items: Vec<ItemRef> = books
        .iter()
        .map(|(isbn, title, year, by)| book(service, isbn, title, *year, &authors[*by]))
        .collect();
    service.save_all(&items).unwrap();
}

#[test]
fn test_queries_agree() {
    let statements = [
        "SELECT * FROM book ORDER BY year",
        "SELECT * FROM book WHERE year >= 1975 AND year < 1995 ORDER BY title DESC",
        "SELECT * FROM book WHERE title LIKE 'the%' OR year IN (1968, 1996)",
        "SELECT * FROM book WHERE author = :author ORDER BY year",
        "SELECT * FROM book WHERE NOT (year > 1980) ORDER BY pk DESC",
        "SELECT * FROM book WHERE author IN (1, 3) ORDER BY pk",
        "SELECT * FROM book WHERE author NOT IN (:author) ORDER BY author DESC, year",
    ];
    let mut answers: Vec<Vec<Vec<u64>>> = Vec::new();
    for harness in all_backends() {
        seed_catalog(&harness);
        let butler = harness.service.get("author", 2).unwrap();
        answers.push(
            statements
                .iter()
                .map(|s| {
                    let request = QueryRequest::statement(*s).param("author", &butler);
                    harness
                        .service
                        .query::<ItemRef>(&request)
                        .unwrap()
                        .results
                        .iter()
                        .map(|b| b.pk().unwrap().id)
                        .collect()
                })
                .collect(),
        );
    }

    assert_eq!(answers[0][0], vec![1, 7, 2, 3, 5, 4, 6]);
    assert_eq!(answers[0][3], vec![3, 4]);
    assert_eq!(answers[0][5], vec![1, 2, 5, 6, 7]);
    assert_eq!(answers[0][6], vec![5, 6, 1, 7, 2]);
    assert_eq!(answers[1], answers[0], "redb disagrees with memory");
    assert_eq!(answers[2], answers[0], "sqlite disagrees with memory");
}

#[test]
fn test_reference_ordering_follows_ids() {
    for harness in all_backends() {
        let service = &harness.service;
        let authors: Vec<ItemRef> = (1..=11)
            .map(|n| author(service, &format!("Author {}", n), 1900 + n))
            .collect();
        service.save_all(&authors).unwrap();
        let books = [
            book(service, "a", "Ten", 2000, &authors[9]),
            book(service, "b", "Two", 2001, &authors[1]),
            book(service, "c", "Eleven", 2002, &authors[10]),
        ];
        service.save_all(&books).unwrap();

        let titles = |statement: &str| -> Vec<String> {
            service
                .query::<ItemRef>(&QueryRequest::statement(statement))
                .unwrap()
                .results
                .iter()
                .map(|b| text_of(b, "title"))
                .collect()
        };
        assert_eq!(
            titles("SELECT * FROM book ORDER BY author"),
            ["Two", "Ten", "Eleven"],
            "{:?}",
            harness.backend
        );
        assert_eq!(
            titles("SELECT * FROM book ORDER BY author DESC"),
            ["Eleven", "Ten", "Two"],
            "{:?}",
            harness.backend
        );
        let first_page = QueryRequest::statement("SELECT * FROM book ORDER BY author").page(1, 2);
        let page: Vec<String> = service
            .query::<ItemRef>(&first_page)
            .unwrap()
            .results
            .iter()
            .map(|b| text_of(b, "title"))
            .collect();
        assert_eq!(page, ["Two", "Ten"], "{:?}", harness.backend);
    }
}

#[test]
fn test_eager_pages_are_exact() {
    for harness in all_backends() {
        seed_catalog(&harness);
        let mut titles = Vec::new();
        for page in 1..=3 {
            let request = QueryRequest::statement("SELECT * FROM book WHERE year > 1970 ORDER BY year")
                .page(page, 2)
                .eager_all();
            let result = harness.service.query::<ItemRef>(&request).unwrap();
            assert_eq!(result.total_count, 6);
            assert_eq!(result.page_count(), 3);
            assert_eq!(result.len(), 2);
            for book in &result.results {
                let author = book.get("author").unwrap();
                assert!(!author.as_item().unwrap().read().is_proxy(), "{:?}", harness.backend);
                titles.push(text_of(book, "title"));
            }
        }
        assert_eq!(
            titles,
            [
                "Lathe of Heaven",
                "The Dispossessed",
                "Kindred",
                "Consider Phlebas",
                "Parable of the Sower",
                "Excession",
            ],
            "{:?}",
            harness.backend
        );
    }
}

#[test]
fn test_projections_agree() {
    for harness in all_backends() {
        seed_catalog(&harness);
        let request = QueryRequest::statement(
            "SELECT title AS t, year FROM book WHERE author = 3 ORDER BY year DESC",
        );
        let rows = harness.service.query::<Tuple>(&request).unwrap();
        assert_eq!(
            rows.results,
            vec![
                vec![("t".to_string(), Value::from("Excession")), ("year".to_string(), Value::Int(1996))],
                vec![
                    ("t".to_string(), Value::from("Consider Phlebas")),
                    ("year".to_string(), Value::Int(1987))
                ],
            ],
            "{:?}",
            harness.backend
        );
    }
}

#[test]
fn test_version_conflicts() {
    for harness in all_backends() {
        let service = &harness.service;
        service.save(&author(service, "Banks", 1954)).unwrap();
        let first = service.get("author", 1).unwrap();
        let second = service.get("author", 1).unwrap();

        first.set("born", 1955).unwrap();
        service.save(&first).unwrap();
        second.set("born", 1956).unwrap();
        assert!(
            matches!(service.save(&second), Err(PersistenceError::ModelSave { .. })),
            "{:?}",
            harness.backend
        );
        assert_eq!(service.get("author", 1).unwrap().read().version(), Some(2));
    }
}

#[test]
fn test_bulk_statements() {
    for harness in all_backends() {
        seed_catalog(&harness);
        let service = &harness.service;
        let updated = service
            .query::<ItemRef>(&QueryRequest::statement("UPDATE book SET title = 'Untitled' WHERE year < 1975"))
            .unwrap();
        assert_eq!(updated.total_count, 3, "{:?}", harness.backend);
        assert_eq!(ids_of(service, "SELECT * FROM book WHERE title = 'Untitled'"), vec![1, 2, 7]);

        let deleted = service
            .query::<ItemRef>(&QueryRequest::statement("DELETE FROM book WHERE author = 1"))
            .unwrap();
        assert_eq!(deleted.total_count, 3);
        assert_eq!(ids_of(service, "SELECT * FROM book ORDER BY pk"), vec![3, 4, 5, 6]);

        // The unique index still guards bulk updates on the relational backend
        if harness.backend == BackendKind::Sqlite {
            let clash = service.query::<ItemRef>(&QueryRequest::statement("UPDATE author SET name = 'Same'"));
            assert_not_unique(clash);
        }
    }
}

#[test]
fn test_schema_provisioning() {
    for harness in all_backends() {
        let service = &harness.service;
        assert!(service.validate_schema().unwrap().is_empty(), "{:?}", harness.backend);
        seed_catalog(&harness);
        assert_eq!(service.stats().unwrap().total(), 10);

        service.initialize_schema().unwrap();
        assert_eq!(service.stats().unwrap().total(), 0);
        let fresh = author(service, "New", 2000);
        service.save(&fresh).unwrap();
        assert_eq!(fresh.pk().unwrap().id, 1);
    }
}

#[test]
fn test_removed_items_stay_gone() {
    for harness in all_backends() {
        let service = &harness.service;
        let banks = author(service, "Banks", 1954);
        service.save(&banks).unwrap();
        service.remove(&banks).unwrap();

        assert_not_found(service.get("author", 1));
        assert_not_found(service.refresh(&banks));
        assert_not_found(service.remove_by_pk("author", 1));
        assert!(ids_of(service, "SELECT * FROM author").is_empty());
    }
}
