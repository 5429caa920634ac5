//! JSON projection of decoded cells (requires the `serde` feature).

#![cfg(feature = "serde")]

mod common;

use common::{software_hive, SOFTWARE_PATH};
use reg_evidence::{Hive, HiveOptions};

#[test]
fn test_key_serializes_with_full_path() {
    let hive = Hive::from_vec(software_hive(), SOFTWARE_PATH).unwrap();
    let key = hive.key(r"Microsoft\Windows").unwrap();

    let json = serde_json::to_value(&key).unwrap();
    assert_eq!(json["name"], "Windows");
    assert_eq!(json["full_path"], r"SOFTWARE:\Microsoft\Windows");
    assert_eq!(json["subkey_count"], 1);
}

#[test]
fn test_value_and_content_serialize() {
    let hive = Hive::from_vec(software_hive(), SOFTWARE_PATH).unwrap();
    let path = Some(r"Microsoft\Windows\CurrentVersion");
    let value = hive.value(path, "ProgramFilesDir").unwrap();

    let json = serde_json::to_value(&value).unwrap();
    assert_eq!(json["value_type"], "String");
    assert_eq!(json["resident"], false);

    let content = serde_json::to_value(value.data(hive.data()).unwrap()).unwrap();
    assert_eq!(content["String"], r"C:\Program Files");
}

#[test]
fn test_options_round_trip() {
    let options = HiveOptions::default().with_max_depth(16);
    let json = serde_json::to_string(&options).unwrap();
    let back: HiveOptions = serde_json::from_str(&json).unwrap();
    assert_eq!(back, options);

    let partial: HiveOptions = serde_json::from_str(r#"{"verify_checksum": true}"#).unwrap();
    assert_eq!(partial.max_depth, 64);
    assert!(partial.verify_checksum);
}
