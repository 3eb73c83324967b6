//! End-to-end scenarios 1-6 from the canonical walkthrough: one raw frame
//! in, one assembled envelope (or session binding) out, exercised through
//! each decoder's public `decode` entry point and, where cache fusion
//! matters, through `bridge_worker::assembler::assemble`.

use bridge_worker::assembler;
use bridge_worker::cache::DeviceCache;
use bridge_worker::codec;
use bridge_worker::decoders::{bsj, gt06, huabao, meitrack};
use chrono::Utc;

fn envelope_json(record: &jono_types::record::IntermediateRecord, cache: &DeviceCache) -> serde_json::Value {
    serde_json::to_value(assembler::assemble(record, cache)).unwrap()
}

/// Scenario 1: Meitrack AAA frame.
#[test]
fn meitrack_aaa_frame_matches_walkthrough() {
    let line = "$$f167,864507035846483,AAA,1,18.950273,-97.922888,241205120405,V,0,13,0,69,0.0,2217,358868041,192062311,334|3|7663|00AA7FAB,0000,0001|0000|0000|01A5|0514,,,3,,,108,106*C6";
    let decoded = meitrack::decode(line).unwrap();
    let record = decoded.record.unwrap();
    assert_eq!(record.imei.as_deref(), Some("864507035846483"));

    let envelope = envelope_json(&record, &DeviceCache::new());
    let packet = &envelope["ListPackets"]["Packet1"];
    assert_eq!(packet["Latitude"], 18.950273);
    assert_eq!(packet["Longitude"], -97.922888);
    assert_eq!(packet["Datetime"], "2024-12-05T12:04:05+00:00");
    assert_eq!(packet["Altitude"], 2217);
    assert_eq!(packet["Speed"], 0);
    assert_eq!(packet["Direction"], 69);
    assert_eq!(packet["EventCode"]["Code"], 1);
    assert_eq!(packet["EventCode"]["Name"], "Input 1 Active");
    assert_eq!(packet["BaseStationInfo"]["MCC"], "334");
    assert_eq!(packet["BaseStationInfo"]["MNC"], "3");
    assert_eq!(packet["BaseStationInfo"]["LAC"], "7663");
    assert_eq!(packet["BaseStationInfo"]["CellID"], "00AA7FAB");
    assert_eq!(packet["AnalogInputs"]["AD5"], "0514");
    assert_eq!(packet["Mileage"], 358868041);
}

/// Scenario 2: GT06 login binds the endpoint, a following location frame
/// with no IMEI of its own carries it forward through the Session Table.
#[test]
fn gt06_login_binds_endpoint_for_later_location_frames() {
    use bridge_worker::session::SessionTable;

    let sessions = SessionTable::new();
    let endpoint = "10.0.0.5:9100";

    let bcd = codec::bcd::encode("864507035846483");
    let mut login_body = bcd;
    login_body.resize(8, 0);
    let mut login = vec![0x78, 0x78, 0x0D, gt06::MSG_LOGIN];
    login.extend_from_slice(&login_body);
    login.extend_from_slice(&1u16.to_be_bytes());
    let crc = codec::checksum::crc16_ccitt(&login[2..]);
    login.extend_from_slice(&crc.to_be_bytes());
    login.extend_from_slice(&[0x0D, 0x0A]);

    let decoded = gt06::decode(&login, None).unwrap();
    let record = decoded.record.unwrap();
    let imei = record.imei.clone().unwrap();
    sessions.bind(endpoint, &imei);
    assert_eq!(imei, "864507035846483");

    let mut location = vec![0x78, 0x78, 0x00, gt06::MSG_LOCATION];
    location.extend_from_slice(&[0u8; 18]);
    location.extend_from_slice(&2u16.to_be_bytes());
    let crc = codec::checksum::crc16_ccitt(&location[2..]);
    location.extend_from_slice(&crc.to_be_bytes());
    location.extend_from_slice(&[0x0D, 0x0A]);

    let bound_imei = sessions.imei_for(endpoint);
    let decoded = gt06::decode(&location, bound_imei.as_deref()).unwrap();
    assert_eq!(decoded.record.unwrap().imei.as_deref(), Some("864507035846483"));
}

/// Scenario 3: GT06 alarm terminal byte 0x94 resolves power-cut alarm
/// plus the literal charging/ACC states.
#[test]
fn gt06_terminal_byte_0x94_resolves_power_cut_alarm() {
    let terminal = gt06::TerminalInfo::decode(0x94);
    assert_eq!(terminal.alarm_code, 23);
    assert_eq!(terminal.alarm_name, "Power Cut Alarm");
    assert!(terminal.charging);
    assert!(!terminal.acc_high);
}

/// Scenario 4: BSJ location frame, hemisphere bits set south/east.
#[test]
fn bsj_location_with_hemisphere_bits_matches_walkthrough() {
    let mut body = vec![0u8; 28];
    body[4..8].copy_from_slice(&0b0000_0100u32.to_be_bytes());
    body[8..12].copy_from_slice(&19_521_000i32.to_be_bytes());
    body[12..16].copy_from_slice(&99_211_600i32.to_be_bytes());

    let mut frame_body = Vec::new();
    frame_body.extend_from_slice(&bsj::MSG_LOCATION.to_be_bytes());
    frame_body.extend_from_slice(&(body.len() as u16).to_be_bytes());
    frame_body.extend_from_slice(&codec::bcd::encode("864507035846483")[..6]);
    frame_body.extend_from_slice(&1u16.to_be_bytes());
    frame_body.extend_from_slice(&body);

    let checksum = codec::checksum::xor_checksum(&frame_body);
    let mut frame = vec![0x7E];
    frame.extend_from_slice(&frame_body);
    frame.push(checksum);
    frame.push(0x7E);

    let decoded = bsj::decode(&frame, Some("864507035846483")).unwrap();
    let record = decoded.record.unwrap();
    let fields = &record.top_level;
    assert_eq!(fields.get("Latitude").unwrap().as_f64(), Some(-19.521));
    assert_eq!(fields.get("Longitude").unwrap().as_f64(), Some(99.2116));
}

/// Scenario 5: a heartbeat caches voltage, a later location frame with no
/// voltage of its own inherits it as `AnalogInputs.AD4`.
#[test]
fn heartbeat_then_location_cache_fusion_matches_walkthrough() {
    let cache = DeviceCache::new();
    cache.update("864507035846483", Some(2048), Some(3), Utc::now());

    let line = "$$f167,864507035846483,AAA,1,18.950273,-97.922888,241205120405,V,0,13,0,69,0.0,2217,358868041,192062311,334|3|7663|00AA7FAB,0000,0001|0000|0000|01A5|0514,,,3,,,108,106*C6";
    let decoded = meitrack::decode(line).unwrap();
    let record = decoded.record.unwrap();

    let envelope = envelope_json(&record, &cache);
    let ad4 = envelope["ListPackets"]["Packet1"]["AnalogInputs"]["AD4"].as_str().unwrap();
    assert_eq!(ad4, "800");
}

/// Scenario 6: Huabao DVR V201 alarm frame.
#[test]
fn huabao_dvr_v201_matches_walkthrough() {
    let line = "$$dc0174,30,V201,0370703,,250613091038,1,78,0,0,12,0,0,12.00,7800,0#";
    let decoded = huabao::decode(line).unwrap();
    let record = decoded.record.unwrap();

    let envelope = envelope_json(&record, &DeviceCache::new());
    let packet = &envelope["ListPackets"]["Packet1"];
    assert_eq!(packet["EventCode"]["Code"], 1);
    assert_eq!(packet["EventCode"]["Name"], "Panic/Alarm");
    assert_eq!(packet["Speed"], 12);
    assert_eq!(packet["Direction"], 78);
    assert_eq!(packet["Datetime"], "2025-06-13T09:10:38+00:00");
}
