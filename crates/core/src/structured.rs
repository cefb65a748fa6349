use crate::models::RankedChunk;
use crate::pipeline::build_context;
use crate::traits::AnswerGenerator;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use serde_with::{serde_as, DefaultOnError, DeserializeAs, DisplayFromStr, PickFirst, SerializeAs};
use std::sync::{Arc, OnceLock};
use tracing::warn;

const CONTEXT_CHUNKS: usize = 5;
const SOURCE_CHUNKS: usize = 3;

pub const UNKNOWN_INTENT_MESSAGE: &str = "Could not determine extraction type. Try asking for a door schedule, room list, or equipment list.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionKind {
    DoorSchedule,
    RoomSchedule,
    EquipmentList,
    Unknown,
}

impl ExtractionKind {
    pub fn classify(query: &str) -> Self {
        let lowered = query.to_lowercase();
        if lowered.contains("door") && lowered.contains("schedule") {
            Self::DoorSchedule
        } else if lowered.contains("room") {
            Self::RoomSchedule
        } else if lowered.contains("equipment") {
            Self::EquipmentList
        } else {
            Self::Unknown
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            Self::DoorSchedule => {
                "Extract every door. Fields: mark, location, width_mm, height_mm, fire_rating, material."
            }
            Self::RoomSchedule => {
                "Extract every room. Fields: number, name, area_sqm, floor_finish, wall_finish, ceiling_finish, ceiling_height_mm."
            }
            Self::EquipmentList => {
                "Extract every piece of equipment. Fields: tag, type, location, capacity, manufacturer."
            }
            Self::Unknown => "",
        }
    }
}

pub struct LenientText;

impl<'de> DeserializeAs<'de, String> for LenientText {
    fn deserialize_as<D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(text) => Ok(text),
            other => Ok(other.to_string()),
        }
    }
}

impl SerializeAs<String> for LenientText {
    fn serialize_as<S>(source: &String, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(source)
    }
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoorEntry {
    #[serde_as(as = "Option<LenientText>")]
    pub mark: Option<String>,
    #[serde_as(as = "Option<LenientText>")]
    pub location: Option<String>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub width_mm: Option<f64>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub height_mm: Option<f64>,
    #[serde_as(as = "Option<LenientText>")]
    pub fire_rating: Option<String>,
    #[serde_as(as = "Option<LenientText>")]
    pub material: Option<String>,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomEntry {
    #[serde_as(as = "Option<LenientText>")]
    pub number: Option<String>,
    #[serde_as(as = "Option<LenientText>")]
    pub name: Option<String>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub area_sqm: Option<f64>,
    #[serde_as(as = "Option<LenientText>")]
    pub floor_finish: Option<String>,
    #[serde_as(as = "Option<LenientText>")]
    pub wall_finish: Option<String>,
    #[serde_as(as = "Option<LenientText>")]
    pub ceiling_finish: Option<String>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub ceiling_height_mm: Option<f64>,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquipmentEntry {
    #[serde_as(as = "Option<LenientText>")]
    pub tag: Option<String>,
    #[serde(rename = "type")]
    #[serde_as(as = "Option<LenientText>")]
    pub equipment_type: Option<String>,
    #[serde_as(as = "Option<LenientText>")]
    pub location: Option<String>,
    #[serde_as(as = "Option<LenientText>")]
    pub capacity: Option<String>,
    #[serde_as(as = "Option<LenientText>")]
    pub manufacturer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "extraction_type", content = "data", rename_all = "snake_case")]
pub enum ExtractedRecords {
    DoorSchedule(Vec<DoorEntry>),
    RoomSchedule(Vec<RoomEntry>),
    EquipmentList(Vec<EquipmentEntry>),
    Unknown(Vec<Value>),
}

impl ExtractedRecords {
    fn empty(kind: ExtractionKind) -> Self {
        match kind {
            ExtractionKind::DoorSchedule => Self::DoorSchedule(Vec::new()),
            ExtractionKind::RoomSchedule => Self::RoomSchedule(Vec::new()),
            ExtractionKind::EquipmentList => Self::EquipmentList(Vec::new()),
            ExtractionKind::Unknown => Self::Unknown(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::DoorSchedule(rows) => rows.len(),
            Self::RoomSchedule(rows) => rows.len(),
            Self::EquipmentList(rows) => rows.len(),
            Self::Unknown(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub filename: String,
    pub page_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    #[serde(flatten)]
    pub records: ExtractedRecords,
    pub sources: Vec<SourceRef>,
    pub total_items: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionOutcome {
    fn failed(kind: ExtractionKind, error: impl Into<String>) -> Self {
        Self {
            records: ExtractedRecords::empty(kind),
            sources: Vec::new(),
            total_items: 0,
            message: None,
            error: Some(error.into()),
        }
    }
}

pub struct StructuredExtractor {
    generator: Option<Arc<dyn AnswerGenerator>>,
}

impl StructuredExtractor {
    pub fn new(generator: Option<Arc<dyn AnswerGenerator>>) -> Self {
        Self { generator }
    }

    pub async fn extract(&self, query: &str, chunks: &[RankedChunk]) -> ExtractionOutcome {
        let kind = ExtractionKind::classify(query);
        if kind == ExtractionKind::Unknown {
            return ExtractionOutcome {
                records: ExtractedRecords::empty(kind),
                sources: Vec::new(),
                total_items: 0,
                message: Some(UNKNOWN_INTENT_MESSAGE.to_string()),
                error: None,
            };
        }

        let Some(generator) = &self.generator else {
            return ExtractionOutcome::failed(kind, "AI provider not configured");
        };

        let context = build_context(&chunks[..chunks.len().min(CONTEXT_CHUNKS)]);
        let prompt = format!(
            "{}\nReturn ONLY a valid JSON array. No markdown, no explanation.\n\nText:\n{context}\n\nJSON array:",
            kind.instructions()
        );

        let raw = match generator.generate(&prompt).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(%error, ?kind, "extraction generator call failed");
                return ExtractionOutcome::failed(kind, error.to_string());
            }
        };

        match parse_records(kind, &raw) {
            Ok(records) => ExtractionOutcome {
                total_items: records.len(),
                records,
                sources: chunks
                    .iter()
                    .take(SOURCE_CHUNKS)
                    .map(|ranked| SourceRef {
                        filename: ranked.chunk.filename.clone(),
                        page_number: ranked.chunk.page_number,
                    })
                    .collect(),
                message: None,
                error: None,
            },
            Err(error) => {
                warn!(%error, ?kind, "could not parse extraction output");
                ExtractionOutcome::failed(
                    kind,
                    format!("Failed to parse extraction results: {error}"),
                )
            }
        }
    }
}

fn code_fence() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").ok())
        .as_ref()
}

pub fn strip_code_fences(raw: &str) -> &str {
    code_fence()
        .and_then(|fence| fence.captures(raw))
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str())
        .unwrap_or_else(|| raw.trim())
}

fn normalize_rows(value: Value) -> Vec<Value> {
    match value {
        Value::Array(rows) => rows,
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    }
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, serde_json::Error> {
    rows.into_iter().map(serde_json::from_value).collect()
}

pub fn parse_records(kind: ExtractionKind, raw: &str) -> Result<ExtractedRecords, serde_json::Error> {
    let value: Value = serde_json::from_str(strip_code_fences(raw))?;
    let rows = normalize_rows(value);

    Ok(match kind {
        ExtractionKind::DoorSchedule => ExtractedRecords::DoorSchedule(decode_rows(rows)?),
        ExtractionKind::RoomSchedule => ExtractedRecords::RoomSchedule(decode_rows(rows)?),
        ExtractionKind::EquipmentList => ExtractedRecords::EquipmentList(decode_rows(rows)?),
        ExtractionKind::Unknown => ExtractedRecords::Unknown(rows),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::models::Chunk;
    use async_trait::async_trait;

    struct FixedOutput(String);

    #[async_trait]
    impl AnswerGenerator for FixedOutput {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Ok(self.0.clone())
        }
    }

    fn ranked(page_number: u32) -> RankedChunk {
        RankedChunk {
            chunk: Chunk {
                id: Chunk::make_id("doc", page_number, 0),
                document_id: "doc".to_string(),
                filename: "doors.pdf".to_string(),
                page_number,
                chunk_index: 0,
                content: "D-101 Level 1 Corridor 900 x 2100 1 Hour Hollow Metal".to_string(),
            },
            relevance_score: 0.8,
            vector_score: 0.8,
            bm25_score: 1.0,
        }
    }

    #[test]
    fn intent_is_classified_by_keywords() {
        assert_eq!(ExtractionKind::classify("Show the DOOR schedule"), ExtractionKind::DoorSchedule);
        assert_eq!(ExtractionKind::classify("door hardware"), ExtractionKind::Unknown);
        assert_eq!(ExtractionKind::classify("list every room"), ExtractionKind::RoomSchedule);
        assert_eq!(ExtractionKind::classify("mechanical equipment"), ExtractionKind::EquipmentList);
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fences("Here:\n```\n{}\n```\nthanks"), "{}");
        assert_eq!(strip_code_fences("  [] "), "[]");
    }

    #[test]
    fn numeric_fields_accept_strings() -> Result<(), serde_json::Error> {
        let records = parse_records(
            ExtractionKind::DoorSchedule,
            r#"[{"mark": "D-101", "width_mm": "900", "height_mm": 2100}]"#,
        )?;

        match records {
            ExtractedRecords::DoorSchedule(rows) => {
                assert_eq!(rows[0].mark.as_deref(), Some("D-101"));
                assert_eq!(rows[0].width_mm, Some(900.0));
                assert_eq!(rows[0].height_mm, Some(2100.0));
                assert_eq!(rows[0].material, None);
            }
            other => panic!("unexpected records: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn numbers_are_accepted_for_text_fields() -> Result<(), serde_json::Error> {
        let rooms = parse_records(ExtractionKind::RoomSchedule, r#"[{"number": 101, "name": "Lobby"}]"#)?;
        match rooms {
            ExtractedRecords::RoomSchedule(rows) => {
                assert_eq!(rows[0].number.as_deref(), Some("101"));
                assert_eq!(rows[0].name.as_deref(), Some("Lobby"));
            }
            other => panic!("unexpected records: {other:?}"),
        }

        let equipment = parse_records(ExtractionKind::EquipmentList, r#"[{"tag": "B-1", "capacity": 5000}]"#)?;
        match equipment {
            ExtractedRecords::EquipmentList(rows) => {
                assert_eq!(rows[0].capacity.as_deref(), Some("5000"));
            }
            other => panic!("unexpected records: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn unparseable_measurements_become_absent() -> Result<(), serde_json::Error> {
        let records = parse_records(
            ExtractionKind::DoorSchedule,
            r#"[{"mark": "D-102", "width_mm": "900mm", "height_mm": "2100"}]"#,
        )?;

        match records {
            ExtractedRecords::DoorSchedule(rows) => {
                assert_eq!(rows[0].mark.as_deref(), Some("D-102"));
                assert_eq!(rows[0].width_mm, None);
                assert_eq!(rows[0].height_mm, Some(2100.0));
            }
            other => panic!("unexpected records: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn single_object_is_wrapped_and_scalars_are_dropped() -> Result<(), serde_json::Error> {
        let wrapped = parse_records(ExtractionKind::EquipmentList, r#"{"tag": "AHU-1", "type": "HVAC Unit"}"#)?;
        assert_eq!(wrapped.len(), 1);

        let dropped = parse_records(ExtractionKind::RoomSchedule, "42")?;
        assert!(dropped.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_intent_returns_guidance() {
        let extractor = StructuredExtractor::new(None);
        let outcome = extractor.extract("what is the budget", &[ranked(1)]).await;

        assert_eq!(outcome.records, ExtractedRecords::Unknown(Vec::new()));
        assert_eq!(outcome.message.as_deref(), Some(UNKNOWN_INTENT_MESSAGE));
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn missing_generator_is_reported_as_error_field() {
        let extractor = StructuredExtractor::new(None);
        let outcome = extractor.extract("door schedule", &[ranked(1)]).await;

        assert_eq!(outcome.records, ExtractedRecords::DoorSchedule(Vec::new()));
        assert_eq!(outcome.error.as_deref(), Some("AI provider not configured"));
    }

    #[tokio::test]
    async fn malformed_output_becomes_extraction_failure() {
        let generator: Arc<dyn AnswerGenerator> = Arc::new(FixedOutput("not json at all".to_string()));
        let outcome = StructuredExtractor::new(Some(generator))
            .extract("room finishes", &[ranked(1)])
            .await;

        assert!(outcome.records.is_empty());
        let error = outcome.error.expect("error should be set");
        assert!(error.starts_with("Failed to parse extraction results"));
    }

    #[tokio::test]
    async fn door_schedule_is_extracted_with_sources() {
        let generator: Arc<dyn AnswerGenerator> = Arc::new(FixedOutput(
            "```json\n[{\"mark\": \"D-101\", \"fire_rating\": \"1 Hour\"}, {\"mark\": \"D-102\"}]\n```"
                .to_string(),
        ));
        let chunks: Vec<RankedChunk> = (1..=4).map(ranked).collect();

        let outcome = StructuredExtractor::new(Some(generator))
            .extract("door schedule level 1", &chunks)
            .await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.total_items, 2);
        assert_eq!(outcome.sources.len(), 3);

        let json = serde_json::to_value(&outcome).expect("outcome serializes");
        assert_eq!(json["extraction_type"], "door_schedule");
        assert_eq!(json["data"][0]["mark"], "D-101");
    }
}
