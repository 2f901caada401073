use serde::{Deserialize, Deserializer, Serialize};

/// One page of the subscribed-pulses feed, as returned by the API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedPage {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub results: Vec<RawPulse>,
}

/// A pulse exactly as the feed reports it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPulse {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub author_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub modified: String,
    #[serde(deserialize_with = "null_as_default")]
    pub created: String,
    #[serde(deserialize_with = "null_as_default")]
    pub indicators: Vec<RawIndicator>,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub targeted_countries: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub malware_families: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub attack_ids: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub references: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub industries: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawIndicator {
    #[serde(deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub indicator: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub indicator_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub created: String,
}

/// The feed sends `null` for absent strings and lists.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Pagination and filter parameters for one feed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub page_size: u32,
    pub modified_since: String,
    /// 1-based; `None` asks for the first page without an explicit page number.
    pub page: Option<u32>,
}

impl PageQuery {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("limit", self.page_size.to_string()),
            ("modified_since", self.modified_since.clone()),
        ];
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        pairs
    }
}
