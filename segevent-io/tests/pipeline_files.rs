#![allow(clippy::float_cmp)]
use approx::assert_abs_diff_eq;
use segevent_algorithms::{correlate_events, form_events, CorrelationConfig, PipelineConfig};
use segevent_core::MERGED_SEGMENT;
use segevent_io::{
    read_events_csv, read_pulses_binary, read_pulses_csv, write_pulses_binary, EventFields,
    EventFileWriter, PulseRecord,
};
use std::io::Write;
use tempfile::NamedTempFile;

/// Two halves of a boundary event plus an ordinary event and a self-trigger.
fn records() -> Vec<PulseRecord> {
    let wire = |xpos, amp, time, mcpd_id| PulseRecord {
        xpos,
        amp,
        time,
        mcpd_id,
        ..Default::default()
    };
    let stripe = |ypos, amp, time, mcpd_id| PulseRecord {
        ypos,
        amp,
        time,
        mcpd_id,
        ..Default::default()
    };
    vec![
        wire(125, 20, 1_000, 1),
        wire(127, 30, 1_001, 1),
        stripe(552, 10, 1_002, 1),
        PulseRecord {
            event_id: 1,
            ..wire(40, 99, 1_002, 2)
        },
        wire(1, 50, 1_003, 2),
        stripe(553, 10, 1_004, 2),
        wire(60, 5, 1_500, 1),
        stripe(570, 5, 1_501, 1),
    ]
}

fn pulses_csv(records: &[PulseRecord]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "xpos,ypos,amp,time,eventID,eventTS,mcpdID,status").unwrap();
    for r in records {
        writeln!(
            file,
            "{},{},{},{},{},{},{},{}",
            r.xpos, r.ypos, r.amp, r.time, r.event_id, r.event_ts, r.mcpd_id, r.status
        )
        .unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn test_binary_and_csv_inputs_agree() {
    let records = records();
    let binary = NamedTempFile::new().unwrap();
    write_pulses_binary(binary.path(), &records).unwrap();
    let csv = pulses_csv(&records);

    let from_binary = read_pulses_binary(binary.path()).unwrap();
    let from_csv = read_pulses_csv(csv.path()).unwrap();
    assert_eq!(from_binary, from_csv);
    assert_eq!(from_binary.len(), records.len());
}

#[test]
fn test_sort_then_correlate_through_files() {
    let binary = NamedTempFile::new().unwrap();
    write_pulses_binary(binary.path(), &records()).unwrap();
    let pulses = read_pulses_binary(binary.path()).unwrap();

    let (events, stats) = form_events(&pulses, &PipelineConfig::default()).unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(stats.self_triggers, 1);

    let sorted = NamedTempFile::new().unwrap();
    EventFileWriter::create(sorted.path(), EventFields::default())
        .unwrap()
        .write_events_csv(&events)
        .unwrap();
    let reread = read_events_csv(sorted.path()).unwrap();
    assert_eq!(reread, events);

    let config = CorrelationConfig::default().with_record_boundary_dt(true);
    let (merged, stats) = correlate_events(&reread, &config).unwrap();
    assert_eq!(stats.merges, 1);
    assert_eq!(merged.len(), 2);

    let boundary = &merged[0];
    assert_eq!(boundary.segment, MERGED_SEGMENT);
    assert_eq!(boundary.tot_x, 100);
    assert_eq!(boundary.mult_x, 3);
    // (126.2 * 50 + 129 * 50) / 100
    assert_abs_diff_eq!(boundary.x, 127.6, epsilon = 1e-9);
    assert_eq!(boundary.boundary_dt, Some(3));

    let out = NamedTempFile::new().unwrap();
    let fields = EventFields::covering(&merged);
    assert!(fields.boundary_dt);
    EventFileWriter::create(out.path(), fields)
        .unwrap()
        .write_events_csv(&merged)
        .unwrap();
    let final_events = read_events_csv(out.path()).unwrap();
    assert_eq!(final_events[0].boundary_dt, Some(3));
    assert_eq!(final_events[1].boundary_dt, Some(0));
}
