#![allow(unused)]

use std::sync::Arc;

use mavkit::schema::MavSchema;
use mavkit::value::{MavContent, MavValue};
use mavkit::MavHeader;

/// A compact dialect for the tests. HEARTBEAT and SERVO_OUTPUT_RAW replicate
/// their standard definitions exactly so the derived CRC-extra bytes (50 and
/// 222) and the reference frames below can be checked against known-good
/// values.
pub const TEST_DIALECT: &str = r#"<?xml version="1.0"?>
<mavlink>
  <version>3</version>
  <enums>
    <enum name="MAV_TYPE">
      <entry name="MAV_TYPE_GENERIC" value="0"/>
      <entry name="MAV_TYPE_FIXED_WING" value="1"/>
      <entry name="MAV_TYPE_QUADROTOR" value="2">
        <description>Quadrotor</description>
      </entry>
      <entry name="MAV_TYPE_GCS" value="6"/>
    </enum>
    <enum name="MAV_AUTOPILOT">
      <entry name="MAV_AUTOPILOT_GENERIC" value="0"/>
      <entry name="MAV_AUTOPILOT_ARDUPILOTMEGA" value="3"/>
      <entry name="MAV_AUTOPILOT_INVALID" value="8"/>
    </enum>
    <enum name="MAV_STATE">
      <entry name="MAV_STATE_UNINIT" value="0"/>
      <entry name="MAV_STATE_BOOT" value="1"/>
      <entry name="MAV_STATE_CALIBRATING" value="2"/>
      <entry name="MAV_STATE_STANDBY" value="3"/>
      <entry name="MAV_STATE_ACTIVE" value="4"/>
    </enum>
    <enum name="MAV_SYS_STATUS_SENSOR" bitmask="true">
      <entry name="MAV_SYS_STATUS_SENSOR_3D_GYRO" value="0x01"/>
      <entry name="MAV_SYS_STATUS_SENSOR_3D_ACCEL" value="0x02"/>
      <entry name="MAV_SYS_STATUS_SENSOR_3D_MAG" value="0x04"/>
      <entry name="MAV_SYS_STATUS_SENSOR_ABSOLUTE_PRESSURE" value="0x08"/>
      <entry name="MAV_SYS_STATUS_SENSOR_DIFFERENTIAL_PRESSURE" value="0x10"/>
      <entry name="MAV_SYS_STATUS_SENSOR_BATTERY" value="0x20"/>
    </enum>
    <enum name="MAV_PARAM_TYPE">
      <entry name="MAV_PARAM_TYPE_UINT8" value="1"/>
      <entry name="MAV_PARAM_TYPE_INT8" value="2"/>
      <entry name="MAV_PARAM_TYPE_UINT16" value="3"/>
      <entry name="MAV_PARAM_TYPE_INT16" value="4"/>
      <entry name="MAV_PARAM_TYPE_UINT32" value="5"/>
      <entry name="MAV_PARAM_TYPE_INT32" value="6"/>
      <entry name="MAV_PARAM_TYPE_REAL32" value="9"/>
    </enum>
    <enum name="MAV_RESULT">
      <entry name="MAV_RESULT_ACCEPTED" value="0"/>
      <entry name="MAV_RESULT_TEMPORARILY_REJECTED" value="1"/>
      <entry name="MAV_RESULT_DENIED" value="2"/>
      <entry name="MAV_RESULT_UNSUPPORTED" value="3"/>
      <entry name="MAV_RESULT_FAILED" value="4"/>
    </enum>
    <enum name="MAV_CMD">
      <entry name="MAV_CMD_DO_SET_MODE" value="176"/>
      <entry name="MAV_CMD_DO_SET_RELAY" value="181">
        <description>Set a relay to a condition.</description>
        <param index="1">Relay instance number.</param>
        <param index="2">Setting.</param>
      </entry>
      <entry name="MAV_CMD_GET_MESSAGE_INTERVAL" value="510"/>
      <entry name="MAV_CMD_SET_MESSAGE_INTERVAL" value="511"/>
    </enum>
  </enums>
  <messages>
    <message id="0" name="HEARTBEAT">
      <description>The heartbeat message shows that a system or component is present and responding.</description>
      <field type="uint8_t" name="type" enum="MAV_TYPE">Vehicle or component type.</field>
      <field type="uint8_t" name="autopilot" enum="MAV_AUTOPILOT">Autopilot type.</field>
      <field type="uint8_t" name="base_mode">System mode bitmap.</field>
      <field type="uint32_t" name="custom_mode">Autopilot-specific flags.</field>
      <field type="uint8_t" name="system_status" enum="MAV_STATE">System status flag.</field>
      <field type="uint8_t_mavlink_version" name="mavlink_version">MAVLink version.</field>
    </message>
    <message id="1" name="SYS_STATUS">
      <field type="uint32_t" name="onboard_control_sensors_enabled" enum="MAV_SYS_STATUS_SENSOR" display="bitmask">Enabled sensors.</field>
      <field type="uint16_t" name="voltage_battery" units="mV">Battery voltage.</field>
      <field type="uint16_t" name="load">Maximum usage in percent of the mainloop time.</field>
    </message>
    <message id="20" name="PARAM_REQUEST_READ">
      <field type="uint8_t" name="target_system"/>
      <field type="uint8_t" name="target_component"/>
      <field type="char[16]" name="param_id"/>
      <field type="int16_t" name="param_index"/>
    </message>
    <message id="21" name="PARAM_REQUEST_LIST">
      <field type="uint8_t" name="target_system"/>
      <field type="uint8_t" name="target_component"/>
    </message>
    <message id="22" name="PARAM_VALUE">
      <field type="char[16]" name="param_id"/>
      <field type="float" name="param_value"/>
      <field type="uint8_t" name="param_type" enum="MAV_PARAM_TYPE"/>
      <field type="uint16_t" name="param_count"/>
      <field type="uint16_t" name="param_index"/>
    </message>
    <message id="23" name="PARAM_SET">
      <field type="uint8_t" name="target_system"/>
      <field type="uint8_t" name="target_component"/>
      <field type="char[16]" name="param_id"/>
      <field type="float" name="param_value"/>
      <field type="uint8_t" name="param_type" enum="MAV_PARAM_TYPE"/>
    </message>
    <message id="36" name="SERVO_OUTPUT_RAW">
      <field type="uint32_t" name="time_usec" units="us"/>
      <field type="uint8_t" name="port"/>
      <field type="uint16_t" name="servo1_raw"/>
      <field type="uint16_t" name="servo2_raw"/>
      <field type="uint16_t" name="servo3_raw"/>
      <field type="uint16_t" name="servo4_raw"/>
      <field type="uint16_t" name="servo5_raw"/>
      <field type="uint16_t" name="servo6_raw"/>
      <field type="uint16_t" name="servo7_raw"/>
      <field type="uint16_t" name="servo8_raw"/>
      <extensions/>
      <field type="uint16_t" name="servo9_raw"/>
      <field type="uint16_t" name="servo10_raw"/>
      <field type="uint16_t" name="servo11_raw"/>
      <field type="uint16_t" name="servo12_raw"/>
      <field type="uint16_t" name="servo13_raw"/>
      <field type="uint16_t" name="servo14_raw"/>
      <field type="uint16_t" name="servo15_raw"/>
      <field type="uint16_t" name="servo16_raw"/>
    </message>
    <message id="76" name="COMMAND_LONG">
      <field type="uint8_t" name="target_system"/>
      <field type="uint8_t" name="target_component"/>
      <field type="uint16_t" name="command" enum="MAV_CMD"/>
      <field type="uint8_t" name="confirmation"/>
      <field type="float" name="param1"/>
      <field type="float" name="param2"/>
      <field type="float" name="param3"/>
      <field type="float" name="param4"/>
      <field type="float" name="param5"/>
      <field type="float" name="param6"/>
      <field type="float" name="param7"/>
    </message>
    <message id="77" name="COMMAND_ACK">
      <field type="uint16_t" name="command" enum="MAV_CMD"/>
      <field type="uint8_t" name="result" enum="MAV_RESULT"/>
      <extensions/>
      <field type="uint8_t" name="progress"/>
      <field type="int32_t" name="result_param2"/>
      <field type="uint8_t" name="target_system"/>
      <field type="uint8_t" name="target_component"/>
    </message>
    <message id="244" name="MESSAGE_INTERVAL">
      <field type="uint16_t" name="message_id"/>
      <field type="int32_t" name="interval_us"/>
    </message>
    <message id="300" name="PROTOCOL_VERSION">
      <field type="uint16_t" name="version"/>
      <field type="uint16_t" name="min_version"/>
      <field type="uint16_t" name="max_version"/>
      <field type="uint8_t[8]" name="spec_version_hash"/>
      <field type="uint8_t[8]" name="library_version_hash"/>
    </message>
  </messages>
</mavlink>
"#;

/// A second document merged on top of [`TEST_DIALECT`], the way a custom
/// dialect extends common definitions.
pub const CUSTOM_DIALECT: &str = r#"<?xml version="1.0"?>
<mavlink>
  <enums>
    <enum name="MAV_CMD">
      <entry name="MAV_CMD_USER_1" value="31010"/>
    </enum>
  </enums>
  <messages>
    <message id="9000" name="DEBUG_COUNTER">
      <field type="uint32_t" name="count"/>
    </message>
  </messages>
</mavlink>
"#;

pub fn schema() -> Arc<MavSchema> {
    MavSchema::parse_definitions(&[TEST_DIALECT]).expect("test dialect must load")
}

pub const COMMON_MSG_HEADER: MavHeader = MavHeader {
    system_id: 1,
    component_id: 2,
    sequence: 239,
};

pub const HEARTBEAT_V1: &[u8] = &[
    0xfe, // v1 marker
    0x09, // payload length
    COMMON_MSG_HEADER.sequence,
    COMMON_MSG_HEADER.system_id,
    COMMON_MSG_HEADER.component_id,
    0x00, // msg ID
    0x05, // payload: custom_mode
    0x00,
    0x00,
    0x00,
    0x02, // type
    0x03, // autopilot
    0x59, // base_mode
    0x03, // system_status
    0x03, // mavlink_version
    0x1f, // checksum
    0x50,
];

pub const HEARTBEAT_V2: &[u8] = &[
    0xfd, // v2 marker
    0x09, // payload length
    0,    // incompat flags
    0,    // compat flags
    COMMON_MSG_HEADER.sequence,
    COMMON_MSG_HEADER.system_id,
    COMMON_MSG_HEADER.component_id,
    0x00, // msg ID
    0x00,
    0x00,
    0x05, // payload
    0x00,
    0x00,
    0x00,
    0x02,
    0x03,
    0x59,
    0x03,
    0x03,
    46, // checksum
    115,
];

/// The values serialised in the reference heartbeat frames.
pub fn heartbeat_content() -> MavContent {
    let mut content = MavContent::new();
    content.insert(
        "type".to_string(),
        MavValue::Enum("MAV_TYPE_QUADROTOR".to_string()),
    );
    content.insert(
        "autopilot".to_string(),
        MavValue::Enum("MAV_AUTOPILOT_ARDUPILOTMEGA".to_string()),
    );
    content.insert("base_mode".to_string(), MavValue::UInt(0x59));
    content.insert("custom_mode".to_string(), MavValue::UInt(5));
    content.insert(
        "system_status".to_string(),
        MavValue::Enum("MAV_STATE_STANDBY".to_string()),
    );
    content.insert("mavlink_version".to_string(), MavValue::UInt(3));
    content
}

/// Encodes one frame to bytes, the way a remote vehicle would produce it.
pub fn frame_bytes(
    schema: &MavSchema,
    version: mavkit::MavlinkVersion,
    header: MavHeader,
    message: &str,
    content: MavContent,
) -> Vec<u8> {
    let message = schema.message(message).expect("message in test dialect");
    let mut out = Vec::new();
    mavkit::write_message(
        &mut out,
        version,
        header,
        schema,
        message,
        &mavkit::MavArgs::Named(content),
    )
    .expect("test frame must encode");
    out
}
