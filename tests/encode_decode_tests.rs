mod test_shared;

use mavkit::codec::{decode_payload, encode_payload};
use mavkit::error::{DecodeError, EncodeError, MessageWriteError};
use mavkit::value::{MavArgs, MavContent, MavValue};
use mavkit::MavlinkVersion;

use test_shared::{heartbeat_content, COMMON_MSG_HEADER, HEARTBEAT_V1, HEARTBEAT_V2};

#[test]
fn writes_the_reference_v1_heartbeat() {
    let schema = test_shared::schema();
    let bytes = test_shared::frame_bytes(
        &schema,
        MavlinkVersion::V1,
        COMMON_MSG_HEADER,
        "HEARTBEAT",
        heartbeat_content(),
    );
    assert_eq!(bytes, HEARTBEAT_V1);
}

#[test]
fn writes_the_reference_v2_heartbeat() {
    let schema = test_shared::schema();
    let bytes = test_shared::frame_bytes(
        &schema,
        MavlinkVersion::V2,
        COMMON_MSG_HEADER,
        "HEARTBEAT",
        heartbeat_content(),
    );
    assert_eq!(bytes, HEARTBEAT_V2);
}

#[test]
fn heartbeat_payload_round_trips() {
    let schema = test_shared::schema();
    let message = schema.message("HEARTBEAT").unwrap();
    let content = heartbeat_content();

    for version in [MavlinkVersion::V1, MavlinkVersion::V2] {
        let payload = encode_payload(
            &schema,
            message,
            version,
            &MavArgs::Named(content.clone()),
        )
        .unwrap();
        let decoded = decode_payload(&schema, message, &payload).unwrap();
        assert_eq!(decoded, content);
    }
}

#[test]
fn positional_values_follow_declaration_order() {
    let schema = test_shared::schema();
    let message = schema.message("HEARTBEAT").unwrap();
    // declaration order: type, autopilot, base_mode, custom_mode,
    // system_status, mavlink_version
    let args = MavArgs::Positional(vec![
        MavValue::Enum("MAV_TYPE_QUADROTOR".to_string()),
        MavValue::Enum("MAV_AUTOPILOT_ARDUPILOTMEGA".to_string()),
        MavValue::UInt(0x59),
        MavValue::UInt(5),
        MavValue::Enum("MAV_STATE_STANDBY".to_string()),
        MavValue::UInt(3),
    ]);
    let payload = encode_payload(&schema, message, MavlinkVersion::V1, &args).unwrap();
    assert_eq!(payload, &HEARTBEAT_V1[6..15]);
}

#[test]
fn v2_truncation_never_reaches_zero_bytes() {
    let schema = test_shared::schema();
    let message = schema.message("PARAM_VALUE").unwrap();

    let mut content = MavContent::new();
    content.insert("param_id".to_string(), MavValue::Text(String::new()));
    content.insert("param_value".to_string(), MavValue::Float(0.0));
    content.insert(
        "param_type".to_string(),
        MavValue::Enum("MAV_PARAM_TYPE_UINT8".to_string()),
    );
    content.insert("param_count".to_string(), MavValue::UInt(0));
    content.insert("param_index".to_string(), MavValue::UInt(0));

    // MAV_PARAM_TYPE_UINT8 is 1, the only non-zero byte, and it serialises
    // last: nothing is trimmed before it
    let payload = encode_payload(
        &schema,
        message,
        MavlinkVersion::V2,
        &MavArgs::Named(content.clone()),
    )
    .unwrap();
    assert_eq!(payload.len(), 25);
    assert_eq!(*payload.last().unwrap(), 1);

    // an all-zero payload trims to exactly one byte, never zero
    content.insert("param_type".to_string(), MavValue::UInt(0));
    let payload = encode_payload(&schema, message, MavlinkVersion::V2, &MavArgs::Named(content))
        .unwrap();
    assert_eq!(payload, [0u8]);
}

#[test]
fn truncated_v2_payload_decodes_with_zero_fill() {
    let schema = test_shared::schema();

    // PARAM_VALUE with only param_type set: every zero field reconstructed
    let message = schema.message("PARAM_VALUE").unwrap();
    let mut payload = vec![0u8; 24];
    payload.push(9);
    let decoded = decode_payload(&schema, message, &payload).unwrap();
    assert_eq!(decoded.get("param_value"), Some(&MavValue::Float(0.0)));
    assert_eq!(decoded.get("param_count"), Some(&MavValue::UInt(0)));
    assert_eq!(decoded.get("param_index"), Some(&MavValue::UInt(0)));
    assert_eq!(decoded.get("param_id"), Some(&MavValue::Text(String::new())));
    assert_eq!(
        decoded.get("param_type"),
        Some(&MavValue::Enum("MAV_PARAM_TYPE_REAL32".to_string()))
    );

    // COMMAND_ACK for command 181 with everything else zero trims to a
    // single byte and still decodes whole
    let ack = schema.message("COMMAND_ACK").unwrap();
    let mut content = MavContent::new();
    content.insert(
        "command".to_string(),
        MavValue::Enum("MAV_CMD_DO_SET_RELAY".to_string()),
    );
    content.insert(
        "result".to_string(),
        MavValue::Enum("MAV_RESULT_ACCEPTED".to_string()),
    );
    content.insert("progress".to_string(), MavValue::UInt(0));
    content.insert("result_param2".to_string(), MavValue::Int(0));
    content.insert("target_system".to_string(), MavValue::UInt(0));
    content.insert("target_component".to_string(), MavValue::UInt(0));
    let payload = encode_payload(&schema, ack, MavlinkVersion::V2, &MavArgs::Named(content))
        .unwrap();
    assert_eq!(payload, [181]);
    let decoded = decode_payload(&schema, ack, &payload).unwrap();
    assert_eq!(
        decoded.get("command"),
        Some(&MavValue::Enum("MAV_CMD_DO_SET_RELAY".to_string()))
    );
    assert_eq!(
        decoded.get("result"),
        Some(&MavValue::Enum("MAV_RESULT_ACCEPTED".to_string()))
    );
}

#[test]
fn param_value_with_text_round_trips() {
    let schema = test_shared::schema();
    let message = schema.message("PARAM_VALUE").unwrap();

    let mut content = MavContent::new();
    content.insert("param_id".to_string(), MavValue::Text("SR0_EXTRA1".to_string()));
    content.insert("param_value".to_string(), MavValue::Float(4.5));
    content.insert(
        "param_type".to_string(),
        MavValue::Enum("MAV_PARAM_TYPE_REAL32".to_string()),
    );
    content.insert("param_count".to_string(), MavValue::UInt(120));
    content.insert("param_index".to_string(), MavValue::UInt(17));

    let payload = encode_payload(
        &schema,
        message,
        MavlinkVersion::V2,
        &MavArgs::Named(content.clone()),
    )
    .unwrap();
    let decoded = decode_payload(&schema, message, &payload).unwrap();
    assert_eq!(decoded, content);
}

#[test]
fn extensions_survive_v2_and_vanish_in_v1() {
    let schema = test_shared::schema();
    let message = schema.message("SERVO_OUTPUT_RAW").unwrap();

    let mut content = MavContent::new();
    content.insert("time_usec".to_string(), MavValue::UInt(1_000_000));
    content.insert("port".to_string(), MavValue::UInt(123));
    for i in 1..=16 {
        content.insert(format!("servo{i}_raw"), MavValue::UInt(1000 + i));
    }

    let v2 = encode_payload(
        &schema,
        message,
        MavlinkVersion::V2,
        &MavArgs::Named(content.clone()),
    )
    .unwrap();
    assert_eq!(v2.len(), 37);
    let decoded = decode_payload(&schema, message, &v2).unwrap();
    assert_eq!(decoded, content);

    // v1 carries the base fields only; decoding restores extensions as zero
    let v1 = encode_payload(
        &schema,
        message,
        MavlinkVersion::V1,
        &MavArgs::Named(content.clone()),
    )
    .unwrap();
    assert_eq!(v1.len(), 21);
    let decoded = decode_payload(&schema, message, &v1).unwrap();
    assert_eq!(decoded.get("servo8_raw"), Some(&MavValue::UInt(1008)));
    assert_eq!(decoded.get("servo9_raw"), Some(&MavValue::UInt(0)));
}

#[test]
fn bitmask_fields_decode_to_entry_name_sets() {
    let schema = test_shared::schema();
    let message = schema.message("SYS_STATUS").unwrap();

    let mut content = MavContent::new();
    content.insert(
        "onboard_control_sensors_enabled".to_string(),
        MavValue::UInt(0x21),
    );
    content.insert("voltage_battery".to_string(), MavValue::UInt(11100));
    content.insert("load".to_string(), MavValue::UInt(500));

    let payload = encode_payload(
        &schema,
        message,
        MavlinkVersion::V2,
        &MavArgs::Named(content),
    )
    .unwrap();
    let decoded = decode_payload(&schema, message, &payload).unwrap();
    assert_eq!(
        decoded.get("onboard_control_sensors_enabled"),
        Some(&MavValue::EnumSet(vec![
            "MAV_SYS_STATUS_SENSOR_3D_GYRO".to_string(),
            "MAV_SYS_STATUS_SENSOR_BATTERY".to_string(),
        ]))
    );
}

#[test]
fn bitmask_fields_encode_from_entry_name_sets() {
    let schema = test_shared::schema();
    let message = schema.message("SYS_STATUS").unwrap();

    let mut by_names = MavContent::new();
    by_names.insert(
        "onboard_control_sensors_enabled".to_string(),
        MavValue::EnumSet(vec![
            "MAV_SYS_STATUS_SENSOR_3D_GYRO".to_string(),
            "MAV_SYS_STATUS_SENSOR_BATTERY".to_string(),
        ]),
    );
    by_names.insert("voltage_battery".to_string(), MavValue::UInt(0));
    by_names.insert("load".to_string(), MavValue::UInt(0));

    let payload = encode_payload(
        &schema,
        message,
        MavlinkVersion::V2,
        &MavArgs::Named(by_names),
    )
    .unwrap();
    assert_eq!(payload[0], 0x21);
}

#[test]
fn scalar_enum_value_without_entry_is_a_decode_error() {
    let schema = test_shared::schema();
    let message = schema.message("HEARTBEAT").unwrap();
    // system_status = 99 has no MAV_STATE entry
    let payload = [5, 0, 0, 0, 2, 3, 0x59, 99, 3];
    let err = decode_payload(&schema, message, &payload).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::NoEnumEntry { value: 99, .. }
    ));
}

#[test]
fn arrays_round_trip() {
    let schema = test_shared::schema();
    let message = schema.message("PROTOCOL_VERSION").unwrap();

    let mut content = MavContent::new();
    content.insert("version".to_string(), MavValue::UInt(200));
    content.insert("min_version".to_string(), MavValue::UInt(100));
    content.insert("max_version".to_string(), MavValue::UInt(200));
    content.insert(
        "spec_version_hash".to_string(),
        MavValue::UIntVec(vec![1, 2, 3, 4, 5, 6, 7, 8]),
    );
    content.insert(
        "library_version_hash".to_string(),
        MavValue::UIntVec(vec![8, 7, 6, 5, 4, 3, 2, 1]),
    );

    let payload = encode_payload(
        &schema,
        message,
        MavlinkVersion::V2,
        &MavArgs::Named(content.clone()),
    )
    .unwrap();
    let decoded = decode_payload(&schema, message, &payload).unwrap();
    assert_eq!(decoded, content);
}

#[test]
fn encode_input_errors() {
    let schema = test_shared::schema();
    let heartbeat = schema.message("HEARTBEAT").unwrap();

    // wrong positional arity
    let err = encode_payload(
        &schema,
        heartbeat,
        MavlinkVersion::V2,
        &MavArgs::Positional(vec![MavValue::UInt(0)]),
    )
    .unwrap_err();
    assert!(matches!(err, EncodeError::Arity { expected: 6, found: 1, .. }));

    // unknown name
    let mut unknown = heartbeat_content();
    unknown.insert("not_a_field".to_string(), MavValue::UInt(0));
    let err = encode_payload(&schema, heartbeat, MavlinkVersion::V2, &MavArgs::Named(unknown))
        .unwrap_err();
    assert!(matches!(err, EncodeError::UnknownField { .. }));

    // missing name
    let mut missing = heartbeat_content();
    missing.remove("base_mode");
    let err = encode_payload(&schema, heartbeat, MavlinkVersion::V2, &MavArgs::Named(missing))
        .unwrap_err();
    assert!(matches!(err, EncodeError::MissingField { .. }));

    // unresolvable enum symbol
    let mut bad_symbol = heartbeat_content();
    bad_symbol.insert(
        "type".to_string(),
        MavValue::Enum("MAV_TYPE_SUBMARINE".to_string()),
    );
    let err = encode_payload(
        &schema,
        heartbeat,
        MavlinkVersion::V2,
        &MavArgs::Named(bad_symbol),
    )
    .unwrap_err();
    assert!(matches!(err, EncodeError::UnknownEnumEntry { .. }));

    // out-of-range integer
    let mut too_big = heartbeat_content();
    too_big.insert("base_mode".to_string(), MavValue::UInt(256));
    let err = encode_payload(
        &schema,
        heartbeat,
        MavlinkVersion::V2,
        &MavArgs::Named(too_big),
    )
    .unwrap_err();
    assert!(matches!(err, EncodeError::ValueOutOfRange { .. }));

    // oversized string
    let param_value = schema.message("PARAM_VALUE").unwrap();
    let mut long_id = MavContent::new();
    long_id.insert(
        "param_id".to_string(),
        MavValue::Text("THIS_NAME_IS_MUCH_TOO_LONG".to_string()),
    );
    long_id.insert("param_value".to_string(), MavValue::Float(0.0));
    long_id.insert("param_type".to_string(), MavValue::UInt(9));
    long_id.insert("param_count".to_string(), MavValue::UInt(0));
    long_id.insert("param_index".to_string(), MavValue::UInt(0));
    let err = encode_payload(
        &schema,
        param_value,
        MavlinkVersion::V2,
        &MavArgs::Named(long_id),
    )
    .unwrap_err();
    assert!(matches!(err, EncodeError::StringTooLong { capacity: 16, .. }));

    // wrong array length
    let protocol = schema.message("PROTOCOL_VERSION").unwrap();
    let mut short_hash = MavContent::new();
    short_hash.insert("version".to_string(), MavValue::UInt(0));
    short_hash.insert("min_version".to_string(), MavValue::UInt(0));
    short_hash.insert("max_version".to_string(), MavValue::UInt(0));
    short_hash.insert("spec_version_hash".to_string(), MavValue::UIntVec(vec![1, 2]));
    short_hash.insert(
        "library_version_hash".to_string(),
        MavValue::UIntVec(vec![0; 8]),
    );
    let err = encode_payload(
        &schema,
        protocol,
        MavlinkVersion::V2,
        &MavArgs::Named(short_hash),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        EncodeError::ArrayLength { expected: 8, found: 2, .. }
    ));
}

#[test]
fn high_message_ids_refuse_v1_framing() {
    let schema = test_shared::schema();
    let message = schema.message("PROTOCOL_VERSION").unwrap();
    assert_eq!(message.id, 300);

    let mut content = MavContent::new();
    content.insert("version".to_string(), MavValue::UInt(200));
    content.insert("min_version".to_string(), MavValue::UInt(100));
    content.insert("max_version".to_string(), MavValue::UInt(200));
    content.insert("spec_version_hash".to_string(), MavValue::UIntVec(vec![0; 8]));
    content.insert(
        "library_version_hash".to_string(),
        MavValue::UIntVec(vec![0; 8]),
    );

    let payload = encode_payload(
        &schema,
        message,
        MavlinkVersion::V1,
        &MavArgs::Named(content),
    )
    .unwrap();
    let mut out = Vec::new();
    let err = mavkit::write_frame(
        &mut out,
        MavlinkVersion::V1,
        COMMON_MSG_HEADER,
        message,
        &payload,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        MessageWriteError::Encode(EncodeError::NotV1Compatible { id: 300, .. })
    ));
}

#[test]
fn signed_integers_round_trip() {
    let schema = test_shared::schema();
    let message = schema.message("MESSAGE_INTERVAL").unwrap();

    let mut content = MavContent::new();
    content.insert("message_id".to_string(), MavValue::UInt(244));
    content.insert("interval_us".to_string(), MavValue::Int(-1));

    let payload = encode_payload(
        &schema,
        message,
        MavlinkVersion::V2,
        &MavArgs::Named(content.clone()),
    )
    .unwrap();
    // interval_us serialises first (4 bytes) as -1
    assert_eq!(&payload[..4], &[0xff, 0xff, 0xff, 0xff]);
    let decoded = decode_payload(&schema, message, &payload).unwrap();
    assert_eq!(decoded, content);
}
