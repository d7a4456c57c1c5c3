//! Superlog parsing/writing, spec §6.
//!
//! Each line of a superlog is one JSON object tagged by `class`, with
//! `label`, `time: [sec, usec]`, `round`, and variant-specific fields flat on
//! the object (e.g. `dpid`, `fingerprint`) — mirroring the original trace
//! format rather than a Rust-idiomatic internally-tagged enum, since this
//! format is a wire contract this crate must stay compatible with.

use std::{
    io::{BufRead, BufReader, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{EngineError, Result},
    event::{Event, Fingerprint, InputEvent, InputKind, InternalEvent, Label},
    time::Timestamp,
};

#[derive(Debug, Serialize, Deserialize)]
struct RawRecord {
    class: String,
    label: Label,
    time: (i64, i64),
    #[serde(default)]
    round: i64,
    #[serde(default)]
    dependent_labels: Vec<Label>,
    #[serde(default)]
    timeout_disallowed: bool,

    #[serde(default)]
    dpid: Option<u64>,
    #[serde(default)]
    cid: Option<String>,
    #[serde(default)]
    start_dpid: Option<u64>,
    #[serde(default)]
    start_port_no: Option<u32>,
    #[serde(default)]
    end_dpid: Option<u64>,
    #[serde(default)]
    end_port_no: Option<u32>,
    #[serde(default)]
    old_ingress_dpid: Option<u64>,
    #[serde(default)]
    old_ingress_port_no: Option<u32>,
    #[serde(default)]
    new_ingress_dpid: Option<u64>,
    #[serde(default)]
    new_ingress_port_no: Option<u32>,
    #[serde(default)]
    request_type: Option<String>,
    #[serde(default)]
    message_fingerprint: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

fn required<T>(field: Option<T>, record: &str, name: &str) -> Result<T> {
    field.ok_or_else(|| EngineError::TraceCorrupt(format!("{record} record missing field {name:?}")))
}

impl RawRecord {
    fn into_event(self) -> Result<Event> {
        let time = Timestamp::new(self.time.0, self.time.1);
        let class = self.class.as_str();
        let cid = self.cid.clone();
        let kind = match class {
            "SwitchFailure" => Some(InputKind::SwitchFailure {
                dpid: required(self.dpid, class, "dpid")?,
            }),
            "SwitchRecovery" => Some(InputKind::SwitchRecovery {
                dpid: required(self.dpid, class, "dpid")?,
            }),
            "LinkFailure" => Some(InputKind::LinkFailure {
                start_dpid: required(self.start_dpid, class, "start_dpid")?,
                start_port_no: required(self.start_port_no, class, "start_port_no")?,
                end_dpid: required(self.end_dpid, class, "end_dpid")?,
                end_port_no: required(self.end_port_no, class, "end_port_no")?,
            }),
            "LinkRecovery" => Some(InputKind::LinkRecovery {
                start_dpid: required(self.start_dpid, class, "start_dpid")?,
                start_port_no: required(self.start_port_no, class, "start_port_no")?,
                end_dpid: required(self.end_dpid, class, "end_dpid")?,
                end_port_no: required(self.end_port_no, class, "end_port_no")?,
            }),
            "ControllerFailure" => Some(InputKind::ControllerFailure {
                cid: required(cid.clone(), class, "cid")?,
            }),
            "ControllerRecovery" => Some(InputKind::ControllerRecovery {
                cid: required(cid.clone(), class, "cid")?,
            }),
            "HostMigration" => Some(InputKind::HostMigration {
                old_ingress_dpid: required(self.old_ingress_dpid, class, "old_ingress_dpid")?,
                old_ingress_port_no: required(self.old_ingress_port_no, class, "old_ingress_port_no")?,
                new_ingress_dpid: required(self.new_ingress_dpid, class, "new_ingress_dpid")?,
                new_ingress_port_no: required(self.new_ingress_port_no, class, "new_ingress_port_no")?,
            }),
            "PolicyChange" => Some(InputKind::PolicyChange {
                request_type: required(self.request_type.clone(), class, "request_type")?,
            }),
            "TrafficInjection" => Some(InputKind::TrafficInjection),
            "DataplaneDrop" => Some(InputKind::DataplaneDrop),
            "ControlChannelBlock" => Some(InputKind::ControlChannelBlock {
                dpid: required(self.dpid, class, "dpid")?,
                cid: required(cid.clone(), class, "cid")?,
            }),
            "ControlChannelUnblock" => Some(InputKind::ControlChannelUnblock {
                dpid: required(self.dpid, class, "dpid")?,
                cid: required(cid.clone(), class, "cid")?,
            }),
            _ => None,
        };

        if let Some(kind) = kind {
            return Ok(Event::Input(InputEvent {
                label: self.label,
                recorded_time: time,
                round: self.round,
                dependent_labels: self.dependent_labels,
                kind,
            }));
        }

        let fingerprint = if let Some(state) = self.state {
            Fingerprint::ControllerStateChange {
                cid: required(cid, class, "cid")?,
                state,
            }
        } else {
            Fingerprint::PendingMessage {
                dpid: required(self.dpid, class, "dpid")?,
                cid: required(cid, class, "cid")?,
                message_fingerprint: required(self.message_fingerprint, class, "message_fingerprint")?,
            }
        };
        Ok(Event::Internal(InternalEvent {
            label: self.label,
            recorded_time: time,
            round: self.round,
            fingerprint,
            class_name: self.class,
            timeout_disallowed: self.timeout_disallowed,
        }))
    }

    fn from_event(event: &Event) -> RawRecord {
        let time = event.recorded_time();
        let mut rec = RawRecord {
            class: event.class_name().to_string(),
            label: event.label().to_string(),
            time: (time.sec, time.usec),
            round: match event {
                Event::Input(e) => e.round,
                Event::Internal(e) => e.round,
            },
            dependent_labels: match event {
                Event::Input(e) => e.dependent_labels.clone(),
                Event::Internal(_) => Vec::new(),
            },
            timeout_disallowed: event.timeout_disallowed(),
            dpid: None,
            cid: None,
            start_dpid: None,
            start_port_no: None,
            end_dpid: None,
            end_port_no: None,
            old_ingress_dpid: None,
            old_ingress_port_no: None,
            new_ingress_dpid: None,
            new_ingress_port_no: None,
            request_type: None,
            message_fingerprint: None,
            state: None,
        };
        match event {
            Event::Input(e) => match &e.kind {
                InputKind::SwitchFailure { dpid } | InputKind::SwitchRecovery { dpid } => {
                    rec.dpid = Some(*dpid);
                }
                InputKind::LinkFailure {
                    start_dpid,
                    start_port_no,
                    end_dpid,
                    end_port_no,
                }
                | InputKind::LinkRecovery {
                    start_dpid,
                    start_port_no,
                    end_dpid,
                    end_port_no,
                } => {
                    rec.start_dpid = Some(*start_dpid);
                    rec.start_port_no = Some(*start_port_no);
                    rec.end_dpid = Some(*end_dpid);
                    rec.end_port_no = Some(*end_port_no);
                }
                InputKind::ControllerFailure { cid } | InputKind::ControllerRecovery { cid } => {
                    rec.cid = Some(cid.clone());
                }
                InputKind::HostMigration {
                    old_ingress_dpid,
                    old_ingress_port_no,
                    new_ingress_dpid,
                    new_ingress_port_no,
                } => {
                    rec.old_ingress_dpid = Some(*old_ingress_dpid);
                    rec.old_ingress_port_no = Some(*old_ingress_port_no);
                    rec.new_ingress_dpid = Some(*new_ingress_dpid);
                    rec.new_ingress_port_no = Some(*new_ingress_port_no);
                }
                InputKind::PolicyChange { request_type } => {
                    rec.request_type = Some(request_type.clone());
                }
                InputKind::ControlChannelBlock { dpid, cid } | InputKind::ControlChannelUnblock { dpid, cid } => {
                    rec.dpid = Some(*dpid);
                    rec.cid = Some(cid.clone());
                }
                InputKind::TrafficInjection | InputKind::DataplaneDrop => {}
            },
            Event::Internal(e) => match &e.fingerprint {
                Fingerprint::PendingMessage {
                    dpid,
                    cid,
                    message_fingerprint,
                } => {
                    rec.dpid = Some(*dpid);
                    rec.cid = Some(cid.clone());
                    rec.message_fingerprint = Some(message_fingerprint.clone());
                }
                Fingerprint::ControllerStateChange { cid, state } => {
                    rec.cid = Some(cid.clone());
                    rec.state = Some(state.clone());
                }
            },
        }
        rec
    }
}

/// Reads a newline-delimited JSON superlog from `path` into an ordered event
/// list, matching `EventDag`'s constructor.
pub fn read_superlog(path: &Path) -> Result<Vec<Event>> {
    let file = std::fs::File::open(path).map_err(|e| EngineError::io(path, e))?;
    let reader = BufReader::new(file);
    let mut events = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| EngineError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawRecord = serde_json::from_str(&line)
            .map_err(|e| EngineError::TraceCorrupt(format!("{}:{}: {e}", path.display(), lineno + 1)))?;
        events.push(raw.into_event()?);
    }
    Ok(events)
}

/// Reads the sibling `<superlog_path>.unacked` file: internal events still
/// buffered, unreleased, at the end of the original run (spec §6,
/// `_track_new_internal_events`). `None` if the file doesn't exist — the
/// caller should warn and skip the subtraction rather than fail the replay.
pub fn read_unacked(superlog_path: &Path) -> Result<Option<Vec<Event>>> {
    let mut name = superlog_path.as_os_str().to_os_string();
    name.push(".unacked");
    let path = std::path::PathBuf::from(name);
    if !path.exists() {
        return Ok(None);
    }
    read_superlog(&path).map(Some)
}

/// Writes `events` as a newline-delimited JSON superlog to `path`, e.g. for
/// an intermediate MCS dump (spec §4.10).
pub fn write_superlog(path: &Path, events: &[Event]) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| EngineError::io(path, e))?;
    let mut writer = std::io::BufWriter::new(file);
    for event in events {
        let raw = RawRecord::from_event(event);
        let line = serde_json::to_string(&raw)?;
        writeln!(writer, "{line}").map_err(|e| EngineError::io(path, e))?;
    }
    writer.flush().map_err(|e| EngineError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempfile(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("sts-replay-trace-test-{}-{name}", std::process::id()))
    }

    #[test]
    fn round_trips_a_switch_failure_and_dependent_internal_event() {
        let path = tempfile("roundtrip.jsonl");
        let events = vec![
            Event::Input(InputEvent {
                label: "e1".into(),
                recorded_time: Timestamp::new(1, 0),
                round: 0,
                dependent_labels: vec!["i1".into()],
                kind: InputKind::SwitchFailure { dpid: 7 },
            }),
            Event::Internal(InternalEvent {
                label: "i1".into(),
                recorded_time: Timestamp::new(1, 500_000),
                round: 0,
                fingerprint: Fingerprint::ControllerStateChange {
                    cid: "c1".into(),
                    state: "MASTER".into(),
                },
                class_name: "MastershipChange".into(),
                timeout_disallowed: false,
            }),
        ];
        write_superlog(&path, &events).unwrap();
        let read_back = read_superlog(&path).unwrap();
        assert_eq!(read_back, events);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_required_field_is_trace_corrupt() {
        let path = tempfile("missing-field.jsonl");
        std::fs::write(&path, r#"{"class":"SwitchFailure","label":"e1","time":[0,0]}"#).unwrap();
        let err = read_superlog(&path).unwrap_err();
        assert!(matches!(err, EngineError::TraceCorrupt(_)));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn blank_lines_are_skipped() {
        let path = tempfile("blank-lines.jsonl");
        std::fs::write(&path, "\n\n").unwrap();
        let events = read_superlog(&path).unwrap();
        assert!(events.is_empty());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_unacked_file_returns_none() {
        let path = tempfile("no-unacked.jsonl");
        assert!(read_unacked(&path).unwrap().is_none());
    }

    #[test]
    fn unacked_file_is_read_as_a_superlog() {
        let path = tempfile("with-unacked.jsonl");
        let unacked_path = tempfile("with-unacked.jsonl.unacked");
        let events = vec![Event::Internal(InternalEvent {
            label: "i1".into(),
            recorded_time: Timestamp::new(1, 0),
            round: 0,
            fingerprint: Fingerprint::PendingMessage {
                dpid: 1,
                cid: "c1".into(),
                message_fingerprint: "fp".into(),
            },
            class_name: "MessageReceipt".into(),
            timeout_disallowed: false,
        })];
        write_superlog(&unacked_path, &events).unwrap();
        let read_back = read_unacked(&path).unwrap().unwrap();
        assert_eq!(read_back, events);
        std::fs::remove_file(&unacked_path).ok();
    }
}
