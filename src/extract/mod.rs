//! Status extraction from raw feed documents.
//!
//! Feed payloads are XML whose element and field casing varies across
//! publishers; both are matched through one lowercase lookup. A document
//! may contain many records; the first record related to the tunnel wins.
//! Malformed markup never surfaces as an error, it yields `Unknown`.

mod duration;

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::feed::EndpointKind;
use crate::models::{StatusRecord, Tunnel, TunnelStatus};

pub use duration::{extract_duration, parse_duration_minutes};

use duration::format_number;

/// Closure keywords across the feed's English and Dutch payloads.
const CLOSURE_KEYWORDS: [&str; 5] = ["closure", "closed", "blocked", "gesloten", "afgesloten"];

/// Dutch closure keywords checked against roadwork descriptions.
const DUTCH_CLOSURE_KEYWORDS: [&str; 2] = ["gesloten", "afgesloten"];

/// Speeds below this are reported as restricted, in km/h.
const SLOW_TRAFFIC_LIMIT: f64 = 20.0;

/// Extract a status record for `tunnel` from one endpoint's payload.
pub fn extract(raw: &str, kind: EndpointKind, tunnel: &Tunnel) -> StatusRecord {
    first_related_record(raw, kind, tunnel).unwrap_or_else(StatusRecord::unknown)
}

/// Field values captured from one record node, keyed by lowercase element
/// name. The first occurrence of a field wins.
#[derive(Default)]
struct RecordFields(HashMap<String, String>);

impl RecordFields {
    /// Look up the first matching field among known name variants.
    fn get(&self, names: &[&str]) -> &str {
        names
            .iter()
            .find_map(|name| self.0.get(*name))
            .map(String::as_str)
            .unwrap_or("")
    }

    fn insert_first(&mut self, name: &str, value: String) {
        self.0.entry(name.to_string()).or_insert(value);
    }
}

fn first_related_record(raw: &str, kind: EndpointKind, tunnel: &Tunnel) -> Option<StatusRecord> {
    let record_names = kind.record_names();

    let mut reader = Reader::from_reader(raw.as_bytes());
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut in_record = false;
    let mut current_field: Option<String> = None;
    let mut fields = RecordFields::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                if !in_record && record_names.contains(&name.as_str()) {
                    in_record = true;
                    current_field = None;
                    fields = RecordFields::default();
                } else if in_record {
                    current_field = Some(name);
                }
            }
            Ok(Event::Text(t)) => {
                if let (true, Some(field)) = (in_record, &current_field) {
                    let text = t.unescape().unwrap_or_default().trim().to_string();
                    if !text.is_empty() {
                        fields.insert_first(field, text);
                    }
                }
            }
            Ok(Event::CData(t)) => {
                if let (true, Some(field)) = (in_record, &current_field) {
                    let text = String::from_utf8_lossy(&t.into_inner()).trim().to_string();
                    if !text.is_empty() {
                        fields.insert_first(field, text);
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                if in_record && record_names.contains(&name.as_str()) {
                    in_record = false;
                    if let Some(record) = classify(kind, &fields, tunnel) {
                        return Some(record);
                    }
                } else {
                    current_field = None;
                }
            }
            Ok(Event::Eof) => break,
            // Malformed markup: give up on the document
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    None
}

/// Classify one record's fields, or `None` when the record is not about
/// this tunnel.
fn classify(kind: EndpointKind, fields: &RecordFields, tunnel: &Tunnel) -> Option<StatusRecord> {
    match kind {
        EndpointKind::Incidents => {
            let location = fields.get(&["location"]);
            let description = fields.get(&["description"]);
            if !tunnel.matches(location, description) {
                return None;
            }

            let severity = fields.get(&["severity"]);
            let closed =
                contains_closure_keyword(severity) || contains_closure_keyword(description);

            Some(StatusRecord {
                status: if closed {
                    TunnelStatus::Closed
                } else {
                    TunnelStatus::Restricted
                },
                reason: Some(first_non_empty(&[description, severity], "Traffic incident")),
                duration: extract_duration(description),
                observed_at: parse_observed_at(fields.get(&["starttime"])),
            })
        }
        EndpointKind::Roadworks => {
            let location = fields.get(&["location"]);
            let description = fields.get(&["description"]);
            if !tunnel.matches(location, description) {
                return None;
            }

            let impact = fields.get(&["impact"]);
            let description_lower = description.to_lowercase();
            let closed = impact.to_lowercase().contains("closure")
                || DUTCH_CLOSURE_KEYWORDS
                    .iter()
                    .any(|kw| description_lower.contains(kw));

            Some(StatusRecord {
                status: if closed {
                    TunnelStatus::Closed
                } else {
                    TunnelStatus::Maintenance
                },
                reason: Some(first_non_empty(
                    &[description, impact],
                    "Scheduled maintenance",
                )),
                duration: extract_duration(description),
                observed_at: parse_observed_at(fields.get(&["starttime"])),
            })
        }
        EndpointKind::TrafficSpeed => {
            let location = fields.get(&["location"]);
            if !tunnel.matches(location, "") {
                return None;
            }

            let speed = parse_leading_number(fields.get(&["speed", "averagevehiclespeed"]));
            let (status, reason) = if speed == 0.0 {
                (TunnelStatus::Closed, "No traffic detected".to_string())
            } else if speed < SLOW_TRAFFIC_LIMIT {
                (
                    TunnelStatus::Restricted,
                    format!("Slow traffic ({} km/h)", format_number(speed)),
                )
            } else {
                (
                    TunnelStatus::Open,
                    format!("Normal traffic ({} km/h)", format_number(speed)),
                )
            };

            Some(StatusRecord {
                status,
                reason: Some(reason),
                duration: None,
                observed_at: Utc::now(),
            })
        }
    }
}

fn contains_closure_keyword(text: &str) -> bool {
    let text = text.to_lowercase();
    CLOSURE_KEYWORDS.iter().any(|kw| text.contains(kw))
}

fn first_non_empty(candidates: &[&str], fallback: &str) -> String {
    candidates
        .iter()
        .find(|c| !c.is_empty())
        .unwrap_or(&fallback)
        .to_string()
}

/// Parse a record timestamp, falling back to now for absent or exotic
/// formats.
fn parse_observed_at(raw: &str) -> DateTime<Utc> {
    if raw.is_empty() {
        return Utc::now();
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return parsed.and_utc();
        }
    }
    Utc::now()
}

/// Parse the leading numeric portion of a text field, zero when absent.
/// Speed fields sometimes carry trailing units.
fn parse_leading_number(raw: &str) -> f64 {
    let raw = raw.trim();
    let end = raw
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(raw.len());
    raw[..end].parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roermond() -> Tunnel {
        Tunnel {
            key: "roermond".to_string(),
            name: "Roermond".to_string(),
            search_terms: vec![
                "roermond".to_string(),
                "a73".to_string(),
                "tunnel roermond".to_string(),
                "roermond tunnel".to_string(),
            ],
        }
    }

    #[test]
    fn incident_with_closure_keyword_is_closed() {
        let xml = r#"<incidents>
            <incident>
                <location>A73 Roermond</location>
                <description>Tunnel afgesloten wegens ongeval, 2 uur</description>
                <severity>high</severity>
            </incident>
        </incidents>"#;

        let record = extract(xml, EndpointKind::Incidents, &roermond());
        assert_eq!(record.status, TunnelStatus::Closed);
        assert_eq!(
            record.reason.as_deref(),
            Some("Tunnel afgesloten wegens ongeval, 2 uur")
        );
        assert_eq!(record.duration.as_deref(), Some("2h"));
    }

    #[test]
    fn incident_without_closure_keyword_is_restricted() {
        let xml = r#"<incidents>
            <incident>
                <location>A73 Roermond tunnel</location>
                <description>Ongeval, rijstrook dicht</description>
            </incident>
        </incidents>"#;

        let record = extract(xml, EndpointKind::Incidents, &roermond());
        assert_eq!(record.status, TunnelStatus::Restricted);
    }

    #[test]
    fn tag_casing_is_irrelevant() {
        let xml = r#"<Incidents>
            <INCIDENT>
                <Location>A73 Roermond</Location>
                <DESCRIPTION>wegdek geblokkeerd, blocked</DESCRIPTION>
            </INCIDENT>
        </Incidents>"#;

        let record = extract(xml, EndpointKind::Incidents, &roermond());
        assert_eq!(record.status, TunnelStatus::Closed);
    }

    #[test]
    fn first_matching_record_wins() {
        let xml = r#"<incidents>
            <incident>
                <location>A2 Eindhoven</location>
                <description>ongeval</description>
            </incident>
            <incident>
                <location>A73 Roermond</location>
                <description>eerste melding</description>
            </incident>
            <incident>
                <location>A73 Roermond</location>
                <description>tweede melding gesloten</description>
            </incident>
        </incidents>"#;

        let record = extract(xml, EndpointKind::Incidents, &roermond());
        assert_eq!(record.status, TunnelStatus::Restricted);
        assert_eq!(record.reason.as_deref(), Some("eerste melding"));
    }

    #[test]
    fn roadwork_closure_by_impact() {
        let xml = r#"<roadworks>
            <situation>
                <location>Roermond tunnel</location>
                <description>gepland onderhoud</description>
                <impact>Full closure</impact>
            </situation>
        </roadworks>"#;

        let record = extract(xml, EndpointKind::Roadworks, &roermond());
        assert_eq!(record.status, TunnelStatus::Closed);
    }

    #[test]
    fn roadwork_without_closure_is_maintenance() {
        let xml = r#"<roadworks>
            <roadwork>
                <location>A73 Roermond</location>
                <description>onderhoud aan verlichting</description>
            </roadwork>
        </roadworks>"#;

        let record = extract(xml, EndpointKind::Roadworks, &roermond());
        assert_eq!(record.status, TunnelStatus::Maintenance);
        assert_eq!(record.reason.as_deref(), Some("onderhoud aan verlichting"));
    }

    #[test]
    fn zero_speed_is_closed() {
        let xml = r#"<measurements>
            <measurement>
                <location>A73 Roermond</location>
                <speed>0</speed>
            </measurement>
        </measurements>"#;

        let record = extract(xml, EndpointKind::TrafficSpeed, &roermond());
        assert_eq!(record.status, TunnelStatus::Closed);
        assert_eq!(record.reason.as_deref(), Some("No traffic detected"));
    }

    #[test]
    fn slow_speed_is_restricted() {
        let xml = r#"<measurements>
            <siteMeasurements>
                <location>A73 Roermond</location>
                <averageVehicleSpeed>15</averageVehicleSpeed>
            </siteMeasurements>
        </measurements>"#;

        let record = extract(xml, EndpointKind::TrafficSpeed, &roermond());
        assert_eq!(record.status, TunnelStatus::Restricted);
        assert_eq!(record.reason.as_deref(), Some("Slow traffic (15 km/h)"));
    }

    #[test]
    fn normal_speed_is_open() {
        let xml = r#"<measurements>
            <measurement>
                <location>A73 Roermond</location>
                <speed>96.5</speed>
            </measurement>
        </measurements>"#;

        let record = extract(xml, EndpointKind::TrafficSpeed, &roermond());
        assert_eq!(record.status, TunnelStatus::Open);
        assert_eq!(record.reason.as_deref(), Some("Normal traffic (96.5 km/h)"));
    }

    #[test]
    fn unrelated_document_is_unknown() {
        let xml = r#"<incidents>
            <incident>
                <location>A12 Utrecht</location>
                <description>ongeval</description>
            </incident>
        </incidents>"#;

        let record = extract(xml, EndpointKind::Incidents, &roermond());
        assert_eq!(record.status, TunnelStatus::Unknown);
        assert_eq!(record.reason, None);
    }

    #[test]
    fn malformed_document_is_unknown() {
        let record = extract(
            "<incidents><incident><location>A73",
            EndpointKind::Incidents,
            &roermond(),
        );
        assert_eq!(record.status, TunnelStatus::Unknown);
    }

    #[test]
    fn starttime_becomes_observed_at() {
        let xml = r#"<incidents>
            <incident>
                <location>A73 Roermond</location>
                <description>gesloten</description>
                <startTime>2026-08-06T07:30:00</startTime>
            </incident>
        </incidents>"#;

        let record = extract(xml, EndpointKind::Incidents, &roermond());
        assert_eq!(
            record.observed_at,
            NaiveDateTime::parse_from_str("2026-08-06T07:30:00", "%Y-%m-%dT%H:%M:%S")
                .unwrap()
                .and_utc()
        );
    }
}
