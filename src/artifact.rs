//! Final collapsed artifact: a `# {json}` header line followed by one
//! enriched stack line per (process, stack).

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Iso8601;
use time::{OffsetDateTime, PrimitiveDateTime};

use std::path::Path;

use crate::{
    ApplicationMetadataTable, ContainerNames, EnrichmentOptions, MergeError, MergeResult, Metadata,
    Metrics, ProcessToProfile, enrich_and_finalize_stack, enrich_pid_stacks,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileHeader {
    pub containers: Vec<String>,
    pub container_names_enabled: bool,
    pub metadata: Metadata,
    pub metrics: Metrics,
    pub application_metadata: Vec<Option<serde_json::Value>>,
    pub application_metadata_enabled: bool,
    pub profiling_mode: serde_json::Value,
}

impl ProfileHeader {
    pub fn to_line(&self) -> MergeResult<String> {
        Ok(format!("# {}", serde_json::to_string(self)?))
    }

    pub fn parse_line(line: &str) -> MergeResult<Self> {
        let json = line
            .strip_prefix('#')
            .ok_or_else(|| MergeError::Artifact("first line is not a metadata header".to_string()))?;
        Ok(serde_json::from_str(json)?)
    }
}

/// Reads the container list and resets the client's cache; this is the
/// only reset of the pass.
fn make_profile_header(
    container_names: Option<&mut (dyn ContainerNames + '_)>,
    add_container_names: bool,
    metadata: &Metadata,
    metrics: &Metrics,
    application_metadata: ApplicationMetadataTable,
    application_metadata_enabled: bool,
) -> ProfileHeader {
    let (containers, container_names_enabled) = match container_names {
        Some(client) if add_container_names => {
            let names = client.container_names();
            client.reset_cache();
            (names, true)
        }
        _ => (Vec::new(), false),
    };

    let profiling_mode = match metadata.get("profiling_mode") {
        Some(mode) => mode.clone(),
        None => {
            tracing::warn!("run metadata has no profiling_mode");
            serde_json::Value::Null
        }
    };

    ProfileHeader {
        containers,
        container_names_enabled,
        metadata: metadata.clone(),
        metrics: *metrics,
        application_metadata: application_metadata.into_entries(),
        application_metadata_enabled,
        profiling_mode,
    }
}

/// Concatenates every stack of every process, prefixed by the header line.
pub fn concatenate_profiles(
    process_profiles: &ProcessToProfile,
    mut container_names: Option<&mut (dyn ContainerNames + '_)>,
    enrichment_options: &EnrichmentOptions,
    metadata: &Metadata,
    metrics: &Metrics,
) -> MergeResult<String> {
    let mut lines = Vec::new();
    let mut application_metadata = ApplicationMetadataTable::new();

    for (pid, profile) in process_profiles {
        let enrichment = enrich_pid_stacks(
            *pid,
            profile,
            enrichment_options,
            container_names.as_deref_mut(),
            &mut application_metadata,
        );
        for (stack, count) in profile.stacks.iter() {
            lines.push(enrich_and_finalize_stack(stack, count, enrichment_options, &enrichment));
        }
    }

    let header = make_profile_header(
        container_names,
        enrichment_options.container_names,
        metadata,
        metrics,
        application_metadata,
        enrichment_options.application_metadata,
    );
    lines.insert(0, header.to_line()?);
    Ok(lines.join("\n"))
}

/// Result of re-emitting a previously produced artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalConcatenation {
    pub start_time: Option<OffsetDateTime>,
    pub end_time: Option<OffsetDateTime>,
    pub collapsed: String,
}

/// Re-emits an existing artifact with `obtained_metadata` merged over its
/// header document.
pub fn concatenate_from_external(collapsed: &str, obtained_metadata: &Metadata) -> MergeResult<ExternalConcatenation> {
    let mut lines = collapsed.lines();
    let first = lines
        .next()
        .ok_or_else(|| MergeError::Artifact("empty collapsed file".to_string()))?;
    let json = first
        .strip_prefix('#')
        .ok_or_else(|| MergeError::Artifact("first line is not a metadata header".to_string()))?;
    let mut metadata = match serde_json::from_str::<serde_json::Value>(json)? {
        serde_json::Value::Object(map) => map,
        other => {
            return Err(MergeError::Artifact(format!("metadata header is not an object: {other}")));
        }
    };
    merge_metadata(&mut metadata, obtained_metadata);

    let start_time = metadata.get("start_time").and_then(parse_timestamp);
    let end_time = metadata.get("end_time").and_then(parse_timestamp);
    if let Some(serde_json::Value::Object(run_arguments)) = metadata.get_mut("run_arguments") {
        run_arguments.remove("func");
    }

    let mut out = vec![format!("# {}", serde_json::to_string(&metadata)?)];
    out.extend(lines.map(|line| line.trim_end().to_string()));
    Ok(ExternalConcatenation { start_time, end_time, collapsed: out.join("\n") })
}

pub fn concatenate_from_external_file(path: &Path, obtained_metadata: &Metadata) -> MergeResult<ExternalConcatenation> {
    let text = std::fs::read_to_string(path)?;
    concatenate_from_external(&text, obtained_metadata)
}

/// Recursively merges `overrides` into `base`; keys from `overrides` win.
pub fn merge_metadata(base: &mut Metadata, overrides: &Metadata) {
    for (key, value) in overrides {
        match (base.get_mut(key), value) {
            (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(incoming)) => {
                merge_metadata(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn parse_timestamp(value: &serde_json::Value) -> Option<OffsetDateTime> {
    let s = value.as_str()?;
    OffsetDateTime::parse(s, &Iso8601::DEFAULT)
        .or_else(|_| PrimitiveDateTime::parse(s, &Iso8601::DEFAULT).map(PrimitiveDateTime::assume_utc))
        .ok()
}
