// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use records::{
    HintName, PartialHints, ProcessingInstructions, RecordsFormat, RecordsSchema, UnhandledHints,
    Variant, sniff_hints,
};
use serde_json::json;

#[test]
fn test_every_variant_validates_strictly() {
    let pi = ProcessingInstructions::default();
    for variant in Variant::ALL {
        let format = RecordsFormat::delimited(variant, PartialHints::new());
        let delimited = format.as_delimited().unwrap();
        let mut unhandled = UnhandledHints::from_hints(delimited.hints());
        let validated = delimited.validated(&pi, &mut unhandled).unwrap();
        assert_eq!(validated.to_hints(), *delimited.hints(), "{variant}");
    }
}

#[test]
fn test_sniffed_hints_yield_to_caller_hints() {
    let data = b"a|b\n1|2\n3|4\n";
    let sniffed = sniff_hints(data, Some("in.csv"));
    let caller: PartialHints = [("header-row".to_string(), json!(false))].into();

    let format = RecordsFormat::delimited(Variant::Csv, PartialHints::new())
        .alter_hints(&sniffed)
        .alter_hints(&caller);
    let d = format.as_delimited().unwrap();
    assert_eq!(d.hint(HintName::FieldDelimiter), Some(&json!("|")));
    assert_eq!(d.hint(HintName::HeaderRow), Some(&json!(false)));
    assert_eq!(format.generate_filename("data"), "data.csv");
}

#[test]
fn test_format_and_schema_documents_round_trip() {
    let pi = ProcessingInstructions::default();
    let format = RecordsFormat::bluelabs();
    let doc = serde_json::to_string(&format.to_document()).unwrap();
    let back = RecordsFormat::from_document(&serde_json::from_str(&doc).unwrap(), &pi).unwrap();
    assert_eq!(back, format);

    let schema = RecordsSchema::from_json_str(
        r#"{"schema": "bltypes/v1", "fields": {"n": {"type": "integer", "index": 0,
            "constraints": {"required": true, "min": "-9223372036854775808",
            "max": "9223372036854775807"}}}}"#,
    )
    .unwrap();
    let again = RecordsSchema::from_json_str(&schema.to_json_string().unwrap()).unwrap();
    assert_eq!(again, schema);
    assert_eq!(schema.fields[0].constraints.min, Some(i128::from(i64::MIN)));
}
