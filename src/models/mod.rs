use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Scheduling and format metadata for one sport, in a single language.
///
/// Every field is optional. Absent fields are left out of the JSON output,
/// so a value read back from the store has exactly the fields it was
/// written with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SportDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_courts: Option<i64>,
}

impl SportDetails {
    pub const FIELDS: [&'static str; 6] =
        ["format", "skills_level", "age_group", "date", "time", "number_of_courts"];

    /// Coerce a stored sub-document, dropping keys this model does not know.
    ///
    /// Writes through the API are strict; documents written by other tools
    /// may carry extra keys and are still readable.
    pub fn from_stored(value: Value) -> Result<Self, serde_json::Error> {
        let value = match value {
            Value::Object(mut map) => {
                map.retain(|key, _| Self::FIELDS.contains(&key.as_str()));
                Value::Object(map)
            }
            other => other,
        };
        serde_json::from_value(value)
    }
}

/// Request body for writes: both localizations are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SportData {
    pub zh: SportDetails,
    pub en: SportDetails,
}

impl SportData {
    /// Serialize into the top-level fields of a stored document.
    pub fn to_document(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let mut document = Map::new();
        document.insert("zh".to_string(), serde_json::to_value(&self.zh)?);
        document.insert("en".to_string(), serde_json::to_value(&self.en)?);
        Ok(document)
    }
}

/// A stored sport document as returned to clients, `_id` included.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SportRecord(pub Map<String, Value>);

impl SportRecord {
    pub fn id(&self) -> Option<&str> {
        self.0.get("_id").and_then(Value::as_str)
    }

    pub fn sport_type(&self) -> Option<&str> {
        self.0.get("sport_type").and_then(Value::as_str)
    }

    /// Raw sub-document for a language tag (`zh`, `en`). A `null` entry
    /// counts as missing.
    pub fn localization(&self, lang: &str) -> Option<&Value> {
        self.0.get(lang).filter(|value| !value.is_null())
    }
}

/// What a write did to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutcomeSummary {
    /// A new document was inserted unconditionally.
    Inserted {
        acknowledged: bool,
        #[serde(rename = "_id")]
        id: String,
    },
    /// A matching document was merged into, or created when none matched.
    Updated {
        acknowledged: bool,
        matched_count: u64,
        modified_count: u64,
        upserted_id: Option<String>,
    },
}
