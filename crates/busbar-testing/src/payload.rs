//! Builders for registry-framed payload bytes.

use busbar_domain::report::FailureReport;
use busbar_domain::wire::RecordFormat;
use uuid::Uuid;

/// Wrap `body` in a Confluent frame (magic byte + big-endian schema id).
pub fn confluent(schema_id: u32, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(5 + body.len());
    payload.push(RecordFormat::CONFLUENT_MAGIC);
    payload.extend_from_slice(&schema_id.to_be_bytes());
    payload.extend_from_slice(body);
    payload
}

/// Wrap `body` in a Glue frame (version byte + schema version UUID).
pub fn glue(schema_version: Uuid, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(17 + body.len());
    payload.push(RecordFormat::GLUE_VERSION);
    payload.extend_from_slice(schema_version.as_bytes());
    payload.extend_from_slice(body);
    payload
}

/// Wrap `body` in the given frame with a fixed schema reference.
pub fn framed(format: RecordFormat, body: &[u8]) -> Vec<u8> {
    match format {
        RecordFormat::Confluent => confluent(1, body),
        RecordFormat::Glue => glue(Uuid::nil(), body),
    }
}

/// Serialize a report to JSON and wrap it in the given frame.
pub fn framed_report(format: RecordFormat, report: &FailureReport) -> Vec<u8> {
    framed(format, &serde_json::to_vec(report).unwrap())
}
