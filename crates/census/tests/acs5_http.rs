// ACS5 fetcher behavior against a mock Census API.
// Run with: cargo test -p acstools-census --test acs5_http

use std::time::Duration;

use acstools_census::{Acs5Fetcher, CensusError, FetchClient};
use acstools_table::{Table, Value};
use httpmock::prelude::*;
use serde_json::json;

const CATALOG: &str = "/data/2019/acs/acs5/variables.json";
const DATA: &str = "/data/2019/acs/acs5";

fn fetcher(server: &MockServer, key: Option<&str>) -> Acs5Fetcher {
    let client = FetchClient::new(Duration::from_secs(5)).unwrap();
    Acs5Fetcher::with_base_url(client, server.base_url(), key.map(str::to_string))
}

fn vars(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("B01001_{:03}E", i)).collect()
}

fn catalog(names: &[String]) -> serde_json::Value {
    let mut variables = serde_json::Map::new();
    for name in names {
        variables.insert(name.clone(), json!({ "label": name }));
    }
    json!({ "variables": variables })
}

/// A data response echoing each requested variable with its index.
fn data_response(chunk: &[String]) -> serde_json::Value {
    let mut header = vec![json!("NAME")];
    let mut row = vec![json!("Block Group 3")];
    for (i, v) in chunk.iter().enumerate() {
        header.push(json!(v));
        row.push(json!((i + 1).to_string()));
    }
    for (h, v) in [("state", "42"), ("county", "091"), ("tract", "204800"), ("block group", "3")] {
        header.push(json!(h));
        row.push(json!(v));
    }
    json!([header, row])
}

fn geocodes(rows: &[(&str, &str)]) -> Table {
    let mut t = Table::new(["ID", "GEOID"]);
    for (id, geoid) in rows {
        t.push_row(vec![(*id).into(), (*geoid).into()]);
    }
    t
}

#[test]
fn hundred_variables_take_three_requests_per_row() {
    let server = MockServer::start();
    let all = vars(100);
    server.mock(|when, then| {
        when.method(GET).path(CATALOG);
        then.status(200).json_body(catalog(&all));
    });

    let mut chunk_mocks = Vec::new();
    for chunk in all.chunks(49) {
        let get = format!("NAME,{}", chunk.join(","));
        let body = data_response(chunk);
        chunk_mocks.push(server.mock(move |when, then| {
            when.method(GET)
                .path(DATA)
                .query_param("get", get.as_str())
                .query_param("for", "block group:3")
                .query_param("key", "test-key");
            then.status(200).json_body(body);
        }));
    }

    let out = fetcher(&server, Some("test-key"))
        .fetch(&geocodes(&[("1", "420912048003")]), &all, 2019)
        .unwrap();

    for mock in &chunk_mocks {
        mock.assert_hits(1);
    }
    assert_eq!(out.len(), 1);
    assert_eq!(out.columns().len(), 3 + 100);
    assert_eq!(&out.columns()[..3], &["ID".to_string(), "status".to_string(), "GEOID".to_string()]);
    assert_eq!(
        out.get(0, "status"),
        Some(&Value::text("Chunk 0 succeeded. Chunk 1 succeeded. Chunk 2 succeeded."))
    );
    assert_eq!(out.get(0, "B01001_001E"), Some(&Value::Number(1.0)));
    assert_eq!(out.get(0, "B01001_050E"), Some(&Value::Number(1.0)));
    assert_eq!(out.get(0, "B01001_100E"), Some(&Value::Number(2.0)));
}

#[test]
fn invalid_variable_aborts_before_row_requests() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(CATALOG);
        then.status(200).json_body(catalog(&vars(3)));
    });
    let data = server.mock(|when, then| {
        when.method(GET).path(DATA);
        then.status(200).json_body(json!([]));
    });

    let requested = vec!["B01001_001E".to_string(), "NOPE_2".to_string(), "NOPE_1".to_string()];
    let err = fetcher(&server, None)
        .fetch(&geocodes(&[("1", "420912048003")]), &requested, 2019)
        .unwrap_err();

    data.assert_hits(0);
    assert_eq!(
        err,
        CensusError::InvalidVariables {
            year: 2019,
            names: vec!["NOPE_1".to_string(), "NOPE_2".to_string()],
        }
    );
}

#[test]
fn catalog_unavailable_aborts() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/data/1999/acs/acs5/variables.json");
        then.status(404).body("unknown/unsupported geography heirarchy");
    });

    let err = fetcher(&server, None)
        .fetch(&geocodes(&[("1", "420912048003")]), &vars(1), 1999)
        .unwrap_err();
    assert!(matches!(err, CensusError::CatalogUnavailable { year: 1999, .. }));
    assert!(err.to_string().contains("ACS5 is not available for requested year"));
}

#[test]
fn failed_chunk_leaves_only_its_variables_empty() {
    let server = MockServer::start();
    let all = vars(60);
    server.mock(|when, then| {
        when.method(GET).path(CATALOG);
        then.status(200).json_body(catalog(&all));
    });
    let first = all[..49].to_vec();
    let get_first = format!("NAME,{}", first.join(","));
    let body = data_response(&first);
    server.mock(move |when, then| {
        when.method(GET).path(DATA).query_param("get", get_first.as_str());
        then.status(200).json_body(body);
    });
    let get_second = format!("NAME,{}", all[49..].join(","));
    server.mock(move |when, then| {
        when.method(GET).path(DATA).query_param("get", get_second.as_str());
        then.status(400).body("error: unknown variable");
    });

    let out = fetcher(&server, None)
        .fetch(&geocodes(&[("1", "420912048003")]), &all, 2019)
        .unwrap();

    assert_eq!(out.get(0, "status"), Some(&Value::text("Chunk 0 succeeded. Chunk 1 failed.")));
    assert_eq!(out.get(0, "B01001_049E"), Some(&Value::Number(49.0)));
    assert_eq!(out.get(0, "B01001_050E"), Some(&Value::Empty));
    assert_eq!(out.get(0, "B01001_060E"), Some(&Value::Empty));
}

#[test]
fn malformed_geoid_is_a_row_failure() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(CATALOG);
        then.status(200).json_body(catalog(&vars(2)));
    });
    let data = server.mock(|when, then| {
        when.method(GET).path(DATA);
        then.status(200).json_body(data_response(&vars(2)));
    });

    let out = fetcher(&server, None)
        .fetch(&geocodes(&[("1", "4209120480"), ("2", "420912048003")]), &vars(2), 2019)
        .unwrap();

    data.assert_hits(1);
    assert_eq!(out.len(), 2);
    let status = out.get(0, "status").unwrap().to_text();
    assert!(status.contains("12-digit"), "status: {}", status);
    assert_eq!(out.get(0, "B01001_001E"), Some(&Value::Empty));
    assert_eq!(out.get(0, "GEOID"), Some(&Value::text("4209120480")));
    assert_eq!(out.get(1, "B01001_002E"), Some(&Value::Number(2.0)));
}
