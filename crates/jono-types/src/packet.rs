//! The canonical `Packet` shape and its sub-objects (§3 Canonical Envelope).
//!
//! Every field is present in the serialized JSON even when the decoder
//! never populated it — absent data is `null`, never an omitted key. That
//! is the contract downstream consumers build against, so every struct
//! here derives `Serialize` without `skip_serializing_if`, and field names
//! carry explicit `#[serde(rename)]` to preserve the historical casing
//! (`HDOP`, `GSMSignalStrength`, `MAC`, ...) the contract was built on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resolved `{Code, Name}` pair. Resolution order is in
/// [`crate::event_codes::resolve`]; this struct is just the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCode {
    #[serde(rename = "Code")]
    pub code: i32,
    #[serde(rename = "Name")]
    pub name: String,
}

impl EventCode {
    pub fn new(code: i32, name: impl Into<String>) -> Self {
        Self { code, name: name.into() }
    }

    /// The fallback every resolution chain bottoms out at (§4.5 rule v).
    pub fn normal_location() -> Self {
        Self::new(35, "Normal Location")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseStationInfo {
    #[serde(rename = "MCC")]
    pub mcc: Option<String>,
    #[serde(rename = "MNC")]
    pub mnc: Option<String>,
    #[serde(rename = "LAC")]
    pub lac: Option<String>,
    #[serde(rename = "CellID")]
    pub cell_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalogInputs {
    #[serde(rename = "AD1")]
    pub ad1: Option<String>,
    #[serde(rename = "AD2")]
    pub ad2: Option<String>,
    #[serde(rename = "AD3")]
    pub ad3: Option<String>,
    #[serde(rename = "AD4")]
    pub ad4: Option<String>,
    #[serde(rename = "AD5")]
    pub ad5: Option<String>,
    #[serde(rename = "AD6")]
    pub ad6: Option<String>,
    #[serde(rename = "AD7")]
    pub ad7: Option<String>,
    #[serde(rename = "AD8")]
    pub ad8: Option<String>,
    #[serde(rename = "AD9")]
    pub ad9: Option<String>,
    #[serde(rename = "AD10")]
    pub ad10: Option<String>,
}

/// Digital I/O status. Unlike the other sub-objects this one carries plain
/// `0`/`1` ints with no null state — the original firmware always reports
/// all eight ports or none, never a partial set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoPortStatus {
    #[serde(rename = "Port1")]
    pub port1: i32,
    #[serde(rename = "Port2")]
    pub port2: i32,
    #[serde(rename = "Port3")]
    pub port3: i32,
    #[serde(rename = "Port4")]
    pub port4: i32,
    #[serde(rename = "Port5")]
    pub port5: i32,
    #[serde(rename = "Port6")]
    pub port6: i32,
    #[serde(rename = "Port7")]
    pub port7: i32,
    #[serde(rename = "Port8")]
    pub port8: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPortStatus {
    #[serde(rename = "Output1")]
    pub output1: Option<String>,
    #[serde(rename = "Output2")]
    pub output2: Option<String>,
    #[serde(rename = "Output3")]
    pub output3: Option<String>,
    #[serde(rename = "Output4")]
    pub output4: Option<String>,
    #[serde(rename = "Output5")]
    pub output5: Option<String>,
    #[serde(rename = "Output6")]
    pub output6: Option<String>,
    #[serde(rename = "Output7")]
    pub output7: Option<String>,
    #[serde(rename = "Output8")]
    pub output8: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputPortStatus {
    #[serde(rename = "Input1")]
    pub input1: Option<String>,
    #[serde(rename = "Input2")]
    pub input2: Option<String>,
    #[serde(rename = "Input3")]
    pub input3: Option<String>,
    #[serde(rename = "Input4")]
    pub input4: Option<String>,
    #[serde(rename = "Input5")]
    pub input5: Option<String>,
    #[serde(rename = "Input6")]
    pub input6: Option<String>,
    #[serde(rename = "Input7")]
    pub input7: Option<String>,
    #[serde(rename = "Input8")]
    pub input8: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemFlag {
    #[serde(rename = "EEP2")]
    pub eep2: Option<String>,
    #[serde(rename = "ACC")]
    pub acc: Option<String>,
    #[serde(rename = "AntiTheft")]
    pub anti_theft: Option<String>,
    #[serde(rename = "VibrationFlag")]
    pub vibration_flag: Option<String>,
    #[serde(rename = "MovingFlag")]
    pub moving_flag: Option<String>,
    #[serde(rename = "ExternalPowerSupply")]
    pub external_power_supply: Option<String>,
    #[serde(rename = "Charging")]
    pub charging: Option<String>,
    #[serde(rename = "SleepMode")]
    pub sleep_mode: Option<String>,
    #[serde(rename = "FMS")]
    pub fms: Option<String>,
    #[serde(rename = "FMSFunction")]
    pub fms_function: Option<String>,
    #[serde(rename = "SystemFlagExtras")]
    pub system_flag_extras: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureSensor {
    #[serde(rename = "SensorNumber")]
    pub sensor_number: Option<String>,
    #[serde(rename = "Value")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraStatus {
    #[serde(rename = "CameraNumber")]
    pub camera_number: Option<String>,
    #[serde(rename = "Status")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentNetworkInfo {
    #[serde(rename = "Version")]
    pub version: Option<String>,
    #[serde(rename = "Type")]
    pub kind: Option<String>,
    #[serde(rename = "Descriptor")]
    pub descriptor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FatigueDrivingInformation {
    #[serde(rename = "Version")]
    pub version: Option<String>,
    #[serde(rename = "Type")]
    pub kind: Option<String>,
    #[serde(rename = "Descriptor")]
    pub descriptor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdditionalAlertInfoAdasDms {
    #[serde(rename = "AlarmProtocol")]
    pub alarm_protocol: Option<String>,
    #[serde(rename = "AlarmType")]
    pub alarm_type: Option<String>,
    #[serde(rename = "PhotoName")]
    pub photo_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothBeacon {
    #[serde(rename = "Version")]
    pub version: Option<String>,
    #[serde(rename = "DeviceName")]
    pub device_name: Option<String>,
    #[serde(rename = "MAC")]
    pub mac: Option<String>,
    #[serde(rename = "BatteryPower")]
    pub battery_power: Option<String>,
    #[serde(rename = "SignalStrength")]
    pub signal_strength: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureAndHumiditySensor {
    #[serde(rename = "DeviceName")]
    pub device_name: Option<String>,
    #[serde(rename = "MAC")]
    pub mac: Option<String>,
    #[serde(rename = "BatteryPower")]
    pub battery_power: Option<String>,
    #[serde(rename = "Temperature")]
    pub temperature: Option<String>,
    #[serde(rename = "Humidity")]
    pub humidity: Option<String>,
    #[serde(rename = "AlertHighTemperature")]
    pub alert_high_temperature: Option<String>,
    #[serde(rename = "AlertLowTemperature")]
    pub alert_low_temperature: Option<String>,
    #[serde(rename = "AlertHighHumidity")]
    pub alert_high_humidity: Option<String>,
    #[serde(rename = "AlertLowHumidity")]
    pub alert_low_humidity: Option<String>,
}

/// One sample inside a `ListPackets` map. Every field is present in the
/// JSON (§3 invariant); absent data round-trips as `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    #[serde(rename = "Altitude")]
    pub altitude: Option<i64>,
    #[serde(rename = "Datetime")]
    pub datetime: Option<DateTime<Utc>>,
    #[serde(rename = "EventCode")]
    pub event_code: EventCode,
    #[serde(rename = "Latitude")]
    pub latitude: Option<f64>,
    #[serde(rename = "Longitude")]
    pub longitude: Option<f64>,
    #[serde(rename = "Speed")]
    pub speed: Option<i64>,
    #[serde(rename = "RunTime")]
    pub run_time: Option<i64>,
    #[serde(rename = "FuelPercentage")]
    pub fuel_percentage: Option<i64>,
    #[serde(rename = "Direction")]
    pub direction: Option<i64>,
    #[serde(rename = "HDOP")]
    pub hdop: Option<f64>,
    #[serde(rename = "Mileage")]
    pub mileage: Option<i64>,
    /// Historical wire choice (§4.5): `"true"` for a valid fix, `"V"` for
    /// invalid — not a JSON boolean, and not the raw `"A"`/`"V"` pair.
    #[serde(rename = "PositioningStatus")]
    pub positioning_status: String,
    #[serde(rename = "NumberOfSatellites")]
    pub number_of_satellites: Option<i64>,
    #[serde(rename = "GSMSignalStrength")]
    pub gsm_signal_strength: Option<i64>,
    #[serde(rename = "AnalogInputs")]
    pub analog_inputs: AnalogInputs,
    #[serde(rename = "IoPortStatus")]
    pub io_port_status: IoPortStatus,
    #[serde(rename = "BaseStationInfo")]
    pub base_station_info: Option<BaseStationInfo>,
    #[serde(rename = "OutputPortStatus")]
    pub output_port_status: OutputPortStatus,
    #[serde(rename = "InputPortStatus")]
    pub input_port_status: InputPortStatus,
    #[serde(rename = "SystemFlag")]
    pub system_flag: Option<SystemFlag>,
    #[serde(rename = "TemperatureSensor")]
    pub temperature_sensor: Option<TemperatureSensor>,
    #[serde(rename = "CameraStatus")]
    pub camera_status: Option<CameraStatus>,
    #[serde(rename = "CurrentNetworkInfo")]
    pub current_network_info: Option<CurrentNetworkInfo>,
    #[serde(rename = "FatigueDrivingInformation")]
    pub fatigue_driving_information: Option<FatigueDrivingInformation>,
    #[serde(rename = "AdditionalAlertInfoADASDMS")]
    pub additional_alert_info_adas_dms: Option<AdditionalAlertInfoAdasDms>,
    #[serde(rename = "BluetoothBeaconA")]
    pub bluetooth_beacon_a: Option<BluetoothBeacon>,
    #[serde(rename = "BluetoothBeaconB")]
    pub bluetooth_beacon_b: Option<BluetoothBeacon>,
    #[serde(rename = "TemperatureAndHumiditySensor")]
    pub temperature_and_humidity_sensor: Option<TemperatureAndHumiditySensor>,
}

impl Packet {
    /// A packet with every optional field null/default and the event code
    /// resolved to "Normal Location" — the starting point the assembler
    /// fills in field by field.
    pub fn blank() -> Self {
        Self {
            altitude: None,
            datetime: None,
            event_code: EventCode::normal_location(),
            latitude: None,
            longitude: None,
            speed: None,
            run_time: None,
            fuel_percentage: None,
            direction: None,
            hdop: None,
            mileage: None,
            positioning_status: "V".to_string(),
            number_of_satellites: None,
            gsm_signal_strength: None,
            analog_inputs: AnalogInputs::default(),
            io_port_status: IoPortStatus::default(),
            base_station_info: None,
            output_port_status: OutputPortStatus::default(),
            input_port_status: InputPortStatus::default(),
            system_flag: None,
            temperature_sensor: None,
            camera_status: None,
            current_network_info: None,
            fatigue_driving_information: None,
            additional_alert_info_adas_dms: None,
            bluetooth_beacon_a: None,
            bluetooth_beacon_b: None,
            temperature_and_humidity_sensor: None,
        }
    }

    /// §8 invariant: coordinates are either both present and in-range, or
    /// both null.
    pub fn coordinates_valid(&self) -> bool {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon),
            (None, None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_packet_round_trips_through_json_with_nulls() {
        let packet = Packet::blank();
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["HDOP"], serde_json::Value::Null);
        assert_eq!(json["GSMSignalStrength"], serde_json::Value::Null);
        assert_eq!(json["AnalogInputs"]["AD4"], serde_json::Value::Null);
        assert_eq!(json["IoPortStatus"]["Port1"], 0);
        assert_eq!(json["EventCode"]["Code"], 35);
        assert_eq!(json["EventCode"]["Name"], "Normal Location");
    }

    #[test]
    fn coordinates_valid_accepts_both_present_or_both_absent() {
        let mut p = Packet::blank();
        assert!(p.coordinates_valid());
        p.latitude = Some(18.95);
        p.longitude = Some(-97.92);
        assert!(p.coordinates_valid());
        p.latitude = Some(300.0);
        assert!(!p.coordinates_valid());
        p.latitude = None;
        p.longitude = None;
        p.latitude = Some(10.0);
        assert!(!p.coordinates_valid());
    }
}
