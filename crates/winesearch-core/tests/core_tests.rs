use serde_json::json;
use std::fs;
use tempfile::TempDir;

use winesearch_core::config::{resolve_with_base, Config};
use winesearch_core::source::{list_jsonl_files, read_all, read_jsonl};
use winesearch_core::validate;

fn review(id: i64, points: serde_json::Value, price: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "country": "Italy",
        "description": "Aromas include tropical fruit, broom, brimstone and dried herb.",
        "designation": "Vulkà Bianco",
        "points": points,
        "price": price,
        "province": "Sicily & Sardinia",
        "region_1": "Etna",
        "region_2": null,
        "taster_name": "Kerin O’Keefe",
        "taster_twitter_handle": "@kerinokeefe",
        "title": "Nicosia 2013 Vulkà Bianco  (Etna)",
        "variety": "White Blend",
        "winery": "Nicosia"
    })
}

#[test]
fn three_record_scenario() {
    let ok = validate(&review(40825, json!(87), json!(15.0))).expect("valid");
    assert_eq!(ok.price, Some(15.0));
    assert_eq!(ok.vineyard.as_deref(), Some("Vulkà Bianco"));

    let no_price = validate(&review(40826, json!(87), json!("Not available"))).expect("valid");
    assert_eq!(no_price.price, None);

    let err = validate(&review(40827, json!(150), json!(20.0))).expect_err("out of range");
    assert_eq!(err.id, Some(40827));
    assert!(err.has_issue("points"));
    assert_eq!(err.issues.len(), 1);
}

#[test]
fn malformed_optional_fields_are_nulled_not_rejected() {
    for key in [
        "description",
        "province",
        "taster_name",
        "taster_twitter_handle",
        "designation",
        "region_1",
        "region_2",
        "country",
    ] {
        for bad in [json!({"x": 1}), json!(["a", "b"])] {
            let mut raw = review(7, json!(88), json!(20.0));
            raw[key] = bad.clone();
            let rec = validate(&raw).unwrap_or_else(|e| panic!("{key} = {bad} rejected: {e}"));
            let nulled = match key {
                "description" => rec.description.is_none(),
                "province" => rec.province.is_none(),
                "taster_name" => rec.taster_name.is_none(),
                "taster_twitter_handle" => rec.taster_twitter_handle.is_none(),
                "designation" => rec.vineyard.is_none(),
                "region_1" => rec.region_1.is_none(),
                "region_2" => rec.region_2.is_none(),
                _ => rec.country == "Unknown",
            };
            assert!(nulled, "{key} = {bad} was kept");
        }
    }
}

#[test]
fn validate_is_idempotent_over_canonical_form() {
    let first = validate(&review(1, json!("91"), json!("$32"))).expect("valid");
    let second = validate(&first.to_raw()).expect("canonical form validates");
    assert_eq!(first, second);
}

#[test]
fn every_unknown_price_spelling_is_none() {
    for price in [json!(null), json!("Not available"), json!("abc"), json!(-3), json!(0.0)] {
        let rec = validate(&review(2, json!(85), price.clone())).expect("valid");
        assert_eq!(rec.price, None, "price {price} should be unknown");
    }
    let mut missing = review(3, json!(85), json!(1));
    missing.as_object_mut().unwrap().remove("price");
    assert_eq!(validate(&missing).unwrap().price, None);
}

#[test]
fn missing_country_becomes_unknown() {
    let mut raw = review(4, json!(85), json!(10));
    raw.as_object_mut().unwrap().remove("country");
    assert_eq!(validate(&raw).unwrap().country, "Unknown");
}

#[test]
fn jsonl_reader_keeps_malformed_lines() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("wines.jsonl");
    let good = review(5, json!(88), json!(12)).to_string();
    fs::write(&path, format!("{good}\n\n{{not json\n{good}\n")).unwrap();

    let values = read_jsonl(&path, None).unwrap();
    assert_eq!(values.len(), 3);
    assert!(validate(&values[1]).is_err());

    let limited = read_jsonl(&path, Some(1)).unwrap();
    assert_eq!(limited.len(), 1);
}

#[test]
fn directory_listing_only_picks_jsonl() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("nested")).unwrap();
    fs::write(tmp.path().join("a.jsonl"), "{}\n").unwrap();
    fs::write(tmp.path().join("nested/b.jsonl"), "{}\n{}\n").unwrap();
    fs::write(tmp.path().join("notes.txt"), "skip").unwrap();

    assert_eq!(list_jsonl_files(tmp.path()).unwrap().len(), 2);
    assert_eq!(read_all(tmp.path(), None).unwrap().len(), 3);
    assert_eq!(read_all(tmp.path(), Some(2)).unwrap().len(), 2);
}

#[test]
fn config_overrides_defaults() {
    let config = Config::from_toml_str(
        r#"
        [ingest]
        batch_size = 64
        max_in_flight = 2

        [query]
        default_limit = 10
        "#,
    )
    .unwrap();
    let settings = config.settings().unwrap();
    assert_eq!(settings.ingest.batch_size, 64);
    assert_eq!(settings.ingest.max_in_flight, 2);
    assert_eq!(settings.ingest.flush_interval_ms, 500);
    assert_eq!(settings.query.default_limit, 10);
    assert_eq!(settings.retry.max_attempts, 5);
    assert_eq!(config.get::<usize>("embedding.dim").unwrap(), 384);
}

#[test]
fn config_rejects_zero_concurrency() {
    assert!(Config::from_toml_str("[ingest]\nmax_in_flight = 0\n").is_err());
}

#[test]
fn relative_paths_resolve_against_base() {
    let base = std::path::Path::new("/srv/wines");
    assert_eq!(resolve_with_base(base, "data/x.jsonl"), base.join("data/x.jsonl"));
    assert_eq!(resolve_with_base(base, "/abs/x.jsonl"), std::path::PathBuf::from("/abs/x.jsonl"));
}
