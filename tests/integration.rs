//! Black-box suite exercising whole templates end-to-end through the public
//! `Parser`/`Composer`/`Configurator` surface, never the internal engine.

use std::collections::BTreeMap;

use boxon::bits::{ByteOrder, Charset};
use boxon::{
    Composer, ConfigurationFieldDescriptor, Configurator, Core, CoreFacade, Descriptor, FieldDescriptor,
    HeaderBinding, ObjectAlternative, ObjectChoices, Parser, TemplateSource, Value, Version,
};

fn integer(size: &str, byte_order: ByteOrder, signed: bool) -> Descriptor {
    Descriptor::Integer { size: size.to_string(), byte_order, signed }
}

/// A header-bound element template with a single `value` field, reachable
/// only as an `Object` alternative target.
fn element_template(class_handle: &str, width: &str) -> TemplateSource {
    TemplateSource {
        class_handle: class_handle.to_string(),
        header: HeaderBinding::Absent,
        fields: vec![FieldDescriptor::new("value", integer(width, ByteOrder::BigEndian, false))],
        embedded_only: true,
    }
}

/// A 1-byte header, a `count` prefix, and a `count`-sized array of
/// prefix-discriminated elements (16-bit `Type1` vs. 32-bit `Type2`).
fn polymorphic_array_core() -> Core {
    let choices = ObjectChoices {
        prefix_size: 8,
        prefix_byte_order: ByteOrder::BigEndian,
        alternatives: vec![
            ObjectAlternative { condition: "#self.prefix == 1".to_string(), type_name: "Type1".to_string(), prefix_value: Some(1) },
            ObjectAlternative { condition: "#self.prefix == 2".to_string(), type_name: "Type2".to_string(), prefix_value: Some(2) },
        ],
    };
    CoreFacade::new()
        .with_template(element_template("Type1", "16"))
        .with_template(element_template("Type2", "32"))
        .with_template(TemplateSource {
            class_handle: "Array3".to_string(),
            header: HeaderBinding::Bound { start_markers: vec![vec![0xAB]], end_marker: None, charset: Charset::Ascii },
            fields: vec![
                FieldDescriptor::new("count", integer("8", ByteOrder::BigEndian, false)),
                FieldDescriptor::new(
                    "items",
                    Descriptor::AsArray { element: Box::new(Descriptor::Object { choices, default_type: None }), size: "count".to_string() },
                ),
            ],
            embedded_only: false,
        })
        .build()
        .unwrap()
}

#[test]
fn polymorphic_array_decodes_each_element_by_its_own_prefix() {
    let core = polymorphic_array_core();
    // header 0xAB, count=3, then Type1(0x00AA), Type2(0x00000001), Type1(0x0001).
    let bytes = [0xAB, 0x03, 0x01, 0x00, 0xAA, 0x02, 0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x01];

    let parsed = Parser::new(&core).parse(&bytes).unwrap();
    assert_eq!(parsed.class_handle, "Array3");
    assert_eq!(parsed.fields.get("count"), Some(&Value::Integer(3)));

    let Some(Value::Array(items)) = parsed.fields.get("items") else {
        panic!("expected an array field");
    };
    assert_eq!(items.len(), 3);

    let value_of = |v: &Value| -> Value {
        let Value::Object { type_name, record } = v else { panic!("expected an object") };
        let slots = core.object_template(type_name).unwrap().slot_names().to_vec();
        record.named_snapshot(&slots).get("value").cloned().unwrap()
    };
    assert_eq!(value_of(&items[0]), Value::Integer(0x00AA));
    assert_eq!(value_of(&items[1]), Value::Integer(0x00000001));
    assert_eq!(value_of(&items[2]), Value::Integer(0x0001));

    let encoded = Composer::new(&core).compose("Array3", &parsed.fields).unwrap();
    assert_eq!(encoded, bytes);
}

fn checksummed_core() -> Core {
    CoreFacade::new()
        .with_template(TemplateSource {
            class_handle: "Checked".to_string(),
            header: HeaderBinding::Bound { start_markers: vec![vec![0xCC]], end_marker: None, charset: Charset::Ascii },
            fields: vec![
                FieldDescriptor::new("payload", integer("32", ByteOrder::BigEndian, false)),
                FieldDescriptor::new(
                    "crc",
                    Descriptor::Checksum {
                        algorithm: "CRC16/IBM".to_string(),
                        skip_start: 0,
                        skip_end: 0,
                        byte_order: ByteOrder::BigEndian,
                    },
                ),
            ],
            embedded_only: false,
        })
        .build()
        .unwrap()
}

#[test]
fn checksum_is_computed_on_encode_and_verified_on_decode() {
    let core = checksummed_core();
    let mut fields = BTreeMap::new();
    fields.insert("payload".to_string(), Value::Integer(0xDEADBEEFu32 as i64));

    let bytes = Composer::new(&core).compose("Checked", &fields).unwrap();
    assert_eq!(bytes.len(), 1 + 4 + 2);

    let parsed = Parser::new(&core).parse(&bytes).unwrap();
    assert_eq!(parsed.fields.get("payload"), Some(&Value::Integer(0xDEADBEEFu32 as i64)));

    let mut corrupted = bytes;
    corrupted[2] ^= 0x01;
    assert!(Parser::new(&core).parse(&corrupted).is_err());
}

fn gps_core() -> Core {
    let null_when_no_fix = |name: &str| {
        FieldDescriptor::new(
            name,
            Descriptor::PostProcess {
                condition: "#self.satellitesCount == 0".to_string(),
                value_decode: "null".to_string(),
                value_encode: "0".to_string(),
            },
        )
    };
    CoreFacade::new()
        .with_template(TemplateSource {
            class_handle: "GPSElement".to_string(),
            header: HeaderBinding::Bound { start_markers: vec![vec![0xDD]], end_marker: None, charset: Charset::Ascii },
            fields: vec![
                FieldDescriptor::new("satellitesCount", integer("8", ByteOrder::BigEndian, false)),
                FieldDescriptor::new("longitude", integer("32", ByteOrder::BigEndian, true)),
                FieldDescriptor::new("latitude", integer("32", ByteOrder::BigEndian, true)),
                FieldDescriptor::new("altitude", integer("16", ByteOrder::BigEndian, true)),
                FieldDescriptor::new("heading", integer("16", ByteOrder::BigEndian, false)),
                FieldDescriptor::new("speed", integer("16", ByteOrder::BigEndian, false)),
                null_when_no_fix("longitude"),
                null_when_no_fix("latitude"),
                null_when_no_fix("altitude"),
                null_when_no_fix("heading"),
                null_when_no_fix("speed"),
            ],
            embedded_only: false,
        })
        .build()
        .unwrap()
}

#[test]
fn gps_element_nulls_position_fields_when_there_is_no_satellite_fix() {
    let core = gps_core();
    let bytes = [0xDD, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

    let parsed = Parser::new(&core).parse(&bytes).unwrap();
    assert_eq!(parsed.fields.get("satellitesCount"), Some(&Value::Integer(0)));
    for field in ["longitude", "latitude", "altitude", "heading", "speed"] {
        assert_eq!(parsed.fields.get(field), Some(&Value::Null), "{field} should be nulled");
    }

    let re_encoded = Composer::new(&core).compose("GPSElement", &parsed.fields).unwrap();
    assert_eq!(re_encoded, bytes, "nulled position fields must re-encode to their zero representation");
}

#[test]
fn gps_element_keeps_position_fields_with_a_satellite_fix() {
    let core = gps_core();
    let mut fields = BTreeMap::new();
    fields.insert("satellitesCount".to_string(), Value::Integer(5));
    fields.insert("longitude".to_string(), Value::Integer(123_456_789));
    fields.insert("latitude".to_string(), Value::Integer(-987_654_321));
    fields.insert("altitude".to_string(), Value::Integer(1500));
    fields.insert("heading".to_string(), Value::Integer(270));
    fields.insert("speed".to_string(), Value::Integer(42));

    let bytes = Composer::new(&core).compose("GPSElement", &fields).unwrap();
    let parsed = Parser::new(&core).parse(&bytes).unwrap();
    assert_eq!(parsed.fields, fields);

    let re_encoded = Composer::new(&core).compose("GPSElement", &parsed.fields).unwrap();
    assert_eq!(re_encoded, bytes);
}

fn ack_configuration_core() -> Core {
    let mut report_mode = ConfigurationFieldDescriptor::default();
    report_mode.enumeration = vec!["STOP".to_string(), "START".to_string()];

    let mut upload_interval = ConfigurationFieldDescriptor::default();
    upload_interval.min_value = Some(10.0);
    upload_interval.max_value = Some(3600.0);
    upload_interval.min_protocol = Some(Version::new(2, 0, 0));

    CoreFacade::new()
        .with_template(TemplateSource {
            class_handle: "Ack".to_string(),
            header: HeaderBinding::Bound { start_markers: vec![b"+ACK:".to_vec()], end_marker: Some(b"\r\n".to_vec()), charset: Charset::Ascii },
            fields: vec![
                FieldDescriptor::new("reportMode", Descriptor::ConfigurationField(report_mode)),
                FieldDescriptor::new("uploadInterval", Descriptor::ConfigurationField(upload_interval)),
            ],
            embedded_only: false,
        })
        .build()
        .unwrap()
}

#[test]
fn configuration_view_filters_fields_by_protocol_version() {
    let core = ack_configuration_core();
    let configurator = Configurator::new(&core);

    let old = configurator.view("Ack", &Version::new(1, 5, 0)).unwrap();
    assert_eq!(old.field_names().collect::<Vec<_>>(), vec!["reportMode"]);

    let current = configurator.view("Ack", &Version::new(2, 0, 0)).unwrap();
    let mut names: Vec<_> = current.field_names().collect();
    names.sort();
    assert_eq!(names, vec!["reportMode", "uploadInterval"]);
}

#[test]
fn configuration_view_validates_input_against_declared_constraints() {
    let core = ack_configuration_core();
    let configurator = Configurator::new(&core);
    let view = configurator.view("Ack", &Version::new(2, 0, 0)).unwrap();

    let mut good = BTreeMap::new();
    good.insert("reportMode".to_string(), "START".to_string());
    good.insert("uploadInterval".to_string(), "60".to_string());
    assert!(view.validate_input(&good).is_ok());

    let mut bad_enum = good.clone();
    bad_enum.insert("reportMode".to_string(), "PAUSE".to_string());
    assert!(view.validate_input(&bad_enum).is_err());

    let mut bad_range = good.clone();
    bad_range.insert("uploadInterval".to_string(), "5".to_string());
    assert!(view.validate_input(&bad_range).is_err());

    let mut unknown_key = good;
    unknown_key.insert("unrelated".to_string(), "x".to_string());
    assert!(view.validate_input(&unknown_key).is_err());
}
