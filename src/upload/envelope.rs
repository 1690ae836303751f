//! JSON body posted to the endpoint.
//!
//! Default shape:
//!
//! ```json
//! {"Result": ["(55.751244, 37.618423)", "Battery percentage = 87%"]}
//! ```
//!
//! With tagged observations enabled an `Observations` array is added next to
//! `Result`, carrying the source kind and capture time of every entry.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::source::{Observation, SourceKind};

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    #[serde(rename = "Result")]
    result: Vec<&'a str>,

    #[serde(rename = "Observations", skip_serializing_if = "Option::is_none")]
    observations: Option<Vec<TaggedObservation<'a>>>,
}

#[derive(Debug, Serialize)]
struct TaggedObservation<'a> {
    kind: SourceKind,
    captured_at: DateTime<Utc>,
    value: &'a str,
}

/// Serialize a batch into the upload body
///
/// # Errors
///
/// Returns [`RelayError::Serialization`](crate::error::RelayError::Serialization)
/// if encoding fails.
pub fn encode_batch(batch: &[Observation], tagged: bool) -> Result<Vec<u8>> {
    let envelope = Envelope {
        result: batch.iter().map(Observation::text).collect(),
        observations: tagged.then(|| {
            batch
                .iter()
                .map(|obs| TaggedObservation {
                    kind: obs.kind,
                    captured_at: obs.captured_at,
                    value: &obs.text,
                })
                .collect()
        }),
    };

    Ok(serde_json::to_vec(&envelope)?)
}
