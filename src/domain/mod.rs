use crate::constants::{DEFAULT_IOC_INDEX, DEFAULT_POST_INDEX, IOC_TOPIC, POST_TOPIC};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::fmt;

/// A threat-intelligence report as persisted in the post index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub author_name: String,
    pub modified: String,
    pub created: String,
    pub tags: Vec<String>,
    pub targeted_countries: Vec<String>,
    pub malware_families: Vec<String>,
    pub attack_ids: Vec<String>,
    pub industries: Vec<String>,
    pub references: Vec<String>,
    pub crawled_time: String,
}

/// A classified indicator of compromise belonging to one pulse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub ioc_id: String,
    pub ioc: String,
    pub ioc_type: IocCategory,
    pub created_time: String,
    pub crawled_time: String,
    pub source: String,
    pub category: Vec<String>,
    pub post_id: String,
}

/// Canonical bucket an indicator is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IocCategory {
    Sample,
    Url,
    Domain,
    IpAddress,
}

impl IocCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IocCategory::Sample => "sample",
            IocCategory::Url => "url",
            IocCategory::Domain => "domain",
            IocCategory::IpAddress => "ipaddress",
        }
    }
}

impl fmt::Display for IocCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Date format of timestamps copied from the feed.
const FEED_DATE: &str = "strict_date_optional_time||epoch_millis";
/// Date format of the local crawl stamp.
const CRAWL_DATE: &str = "strict_date_hour_minute_second";

/// The two independently stored document families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pulse,
    Indicator,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Pulse => "pulse",
            DocumentKind::Indicator => "indicator",
        }
    }

    pub fn default_index(&self) -> &'static str {
        match self {
            DocumentKind::Pulse => DEFAULT_POST_INDEX,
            DocumentKind::Indicator => DEFAULT_IOC_INDEX,
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            DocumentKind::Pulse => POST_TOPIC,
            DocumentKind::Indicator => IOC_TOPIC,
        }
    }

    /// Index mapping sent when the index is created.
    pub fn mapping(&self) -> serde_json::Value {
        match self {
            DocumentKind::Pulse => json!({
                "mappings": {
                    "properties": {
                        "id": { "type": "keyword" },
                        "name": { "type": "text" },
                        "description": { "type": "text" },
                        "author_name": { "type": "keyword" },
                        "modified": { "type": "date", "format": FEED_DATE },
                        "created": { "type": "date", "format": FEED_DATE },
                        "tags": { "type": "keyword" },
                        "targeted_countries": { "type": "keyword" },
                        "malware_families": { "type": "keyword" },
                        "attack_ids": { "type": "keyword" },
                        "industries": { "type": "keyword" },
                        "references": { "type": "keyword" },
                        "crawled_time": { "type": "date", "format": CRAWL_DATE }
                    }
                }
            }),
            DocumentKind::Indicator => json!({
                "mappings": {
                    "properties": {
                        "ioc_id": { "type": "keyword" },
                        "ioc": { "type": "keyword" },
                        "ioc_type": { "type": "keyword" },
                        "created_time": { "type": "date", "format": FEED_DATE },
                        "crawled_time": { "type": "date", "format": CRAWL_DATE },
                        "source": { "type": "keyword" },
                        "category": { "type": "keyword" },
                        "post_id": { "type": "keyword" }
                    }
                }
            }),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A homogeneous batch handed to the repository and publisher.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentBatch {
    Pulses(Vec<Pulse>),
    Indicators(Vec<Indicator>),
}

impl DocumentBatch {
    pub fn kind(&self) -> DocumentKind {
        match self {
            DocumentBatch::Pulses(_) => DocumentKind::Pulse,
            DocumentBatch::Indicators(_) => DocumentKind::Indicator,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DocumentBatch::Pulses(p) => p.len(),
            DocumentBatch::Indicators(i) => i.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Repository document ids, in batch order.
    pub fn ids(&self) -> Vec<String> {
        match self {
            DocumentBatch::Pulses(p) => p.iter().map(|d| d.id.clone()).collect(),
            DocumentBatch::Indicators(i) => i.iter().map(|d| d.ioc_id.clone()).collect(),
        }
    }

    /// Drops every document whose id is in `existing`, and any repeated id
    /// within the batch itself.
    pub fn without_ids(&self, existing: &HashSet<String>) -> DocumentBatch {
        let mut seen = HashSet::new();
        match self {
            DocumentBatch::Pulses(p) => DocumentBatch::Pulses(
                p.iter()
                    .filter(|d| !existing.contains(&d.id) && seen.insert(d.id.clone()))
                    .cloned()
                    .collect(),
            ),
            DocumentBatch::Indicators(i) => DocumentBatch::Indicators(
                i.iter()
                    .filter(|d| !existing.contains(&d.ioc_id) && seen.insert(d.ioc_id.clone()))
                    .cloned()
                    .collect(),
            ),
        }
    }

    /// Keeps the first document for each id in `keep`.
    pub fn only_ids(&self, keep: &HashSet<String>) -> DocumentBatch {
        let mut seen = HashSet::new();
        match self {
            DocumentBatch::Pulses(p) => DocumentBatch::Pulses(
                p.iter()
                    .filter(|d| keep.contains(&d.id) && seen.insert(d.id.clone()))
                    .cloned()
                    .collect(),
            ),
            DocumentBatch::Indicators(i) => DocumentBatch::Indicators(
                i.iter()
                    .filter(|d| keep.contains(&d.ioc_id) && seen.insert(d.ioc_id.clone()))
                    .cloned()
                    .collect(),
            ),
        }
    }

    /// `(id, source document)` pairs for storage.
    pub fn to_documents(&self) -> serde_json::Result<Vec<(String, serde_json::Value)>> {
        match self {
            DocumentBatch::Pulses(p) => p
                .iter()
                .map(|d| Ok((d.id.clone(), serde_json::to_value(d)?)))
                .collect(),
            DocumentBatch::Indicators(i) => i
                .iter()
                .map(|d| Ok((d.ioc_id.clone(), serde_json::to_value(d)?)))
                .collect(),
        }
    }

    /// Publish payload: the batch as a JSON array.
    pub fn to_payload(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            DocumentBatch::Pulses(p) => serde_json::to_value(p),
            DocumentBatch::Indicators(i) => serde_json::to_value(i),
        }
    }
}
