//! Per-process stack enrichment: application id, application metadata index
//! and container name frames.

use serde::{Deserialize, Serialize};

use std::collections::HashMap;

use crate::{ContainerNames, Pid, ProcessProfile};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileApiVersion {
    V1,
    #[default]
    V2,
}

impl ProfileApiVersion {
    /// v1 consumers know neither the metadata index frame nor the container frame.
    pub fn supports_enrichment_frames(self) -> bool {
        self != Self::V1
    }
}

impl clap::ValueEnum for ProfileApiVersion {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::V1, Self::V2]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::V1 => clap::builder::PossibleValue::new("v1"),
            Self::V2 => clap::builder::PossibleValue::new("v2"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EnrichmentOptions {
    #[serde(default)]
    pub profile_api_version: ProfileApiVersion,
    #[serde(default = "enabled")]
    pub container_names: bool,
    #[serde(default = "enabled")]
    pub application_identifiers: bool,
    #[serde(default = "enabled")]
    pub application_metadata: bool,
}

fn enabled() -> bool {
    true
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            profile_api_version: ProfileApiVersion::default(),
            container_names: enabled(),
            application_identifiers: enabled(),
            application_metadata: enabled(),
        }
    }
}

/// Deduplicated application metadata documents, referenced from stacks by index.
///
/// Index 0 is always the "no metadata" entry.
#[derive(Debug, Clone)]
pub struct ApplicationMetadataTable {
    entries: Vec<Option<serde_json::Value>>,
    index: HashMap<String, usize>,
}

impl Default for ApplicationMetadataTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationMetadataTable {
    pub fn new() -> Self {
        Self { entries: vec![None], index: HashMap::new() }
    }

    /// Index of a structurally equal entry, appending `metadata` if there is none.
    pub fn index_of_or_insert(&mut self, metadata: Option<&serde_json::Value>) -> usize {
        let metadata = match metadata {
            None | Some(serde_json::Value::Null) => return 0,
            Some(metadata) => metadata,
        };
        let mut key = String::new();
        canonical_key(metadata, &mut key);
        if let Some(idx) = self.index.get(&key) {
            return *idx;
        }
        let idx = self.entries.len();
        self.entries.push(Some(metadata.clone()));
        self.index.insert(key, idx);
        idx
    }

    pub fn entries(&self) -> &[Option<serde_json::Value>] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Option<serde_json::Value>> {
        self.entries
    }
}

/// Renders `value` so that structurally equal documents produce the same
/// key. Integral floats render as integers, so `1` and `1.0` compare equal.
fn canonical_key(value: &serde_json::Value, out: &mut String) {
    use serde_json::Value;

    match value {
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => out.push_str(&i.to_string()),
            (None, Some(u), _) => out.push_str(&u.to_string()),
            (None, None, Some(f)) if f.fract() == 0.0 && f.abs() < 9.2e18 => {
                out.push_str(&(f as i64).to_string());
            }
            _ => out.push_str(&n.to_string()),
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                canonical_key(item, out);
            }
            out.push(']');
        }
        // Map keys iterate in sorted order.
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                canonical_key(item, out);
            }
            out.push('}');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Strings computed once per process and applied to each of its stacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidStackEnrichment {
    pub appid: Option<String>,
    pub application_prefix: String,
    pub container_prefix: String,
}

pub fn enrich_pid_stacks(
    pid: Pid,
    profile: &ProcessProfile,
    options: &EnrichmentOptions,
    container_names: Option<&mut (dyn ContainerNames + '_)>,
    application_metadata: &mut ApplicationMetadataTable,
) -> PidStackEnrichment {
    let appid = profile.appid.as_ref().map(|appid| format!("appid: {appid}"));

    // The table is filled even when the frame is not emitted, keeping indices stable.
    let idx = application_metadata.index_of_or_insert(profile.app_metadata.as_ref());
    let supports_frames = options.profile_api_version.supports_enrichment_frames();
    let application_prefix = if supports_frames && options.application_metadata {
        format!("{idx};")
    } else {
        String::new()
    };

    // Non-v1 consumers expect the container frame at a fixed position, so it
    // is written even when container names are disabled.
    let container_prefix = if supports_frames {
        let name = match container_names {
            Some(client) if options.container_names => client.get_container_name(pid),
            _ => String::new(),
        };
        format!("{name};")
    } else {
        String::new()
    };

    PidStackEnrichment { appid, application_prefix, container_prefix }
}

/// Renders one output line, splicing the appid frame after the first frame.
pub fn enrich_and_finalize_stack(
    stack: &str,
    count: u64,
    options: &EnrichmentOptions,
    enrichment: &PidStackEnrichment,
) -> String {
    let stack = match &enrichment.appid {
        Some(appid) if options.application_identifiers => match stack.split_once(';') {
            Some((first_frame, others)) => format!("{first_frame};{appid};{others}"),
            None => format!("{stack};{appid}"),
        },
        _ => stack.to_string(),
    };
    format!(
        "{}{}{stack} {count}",
        enrichment.application_prefix, enrichment.container_prefix
    )
}
