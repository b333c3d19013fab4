//! Domain logic for exporting gacha-pull history as a UIGF v3.0 document.
//!
//! Everything in this crate is pure: the SQLite reader and the file writer
//! live in the sibling crates. The pool-type table, the item-rarity ranges,
//! and the UID timezone mapping are best-effort heuristics carried over from
//! the save format; they are documented approximations, not lookups against
//! an authoritative catalog.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Tool name written into the `info.export_app` header field.
pub const EXPORT_APP: &str = "uigf-export";
/// Tool version written into the `info.export_app_version` header field.
pub const EXPORT_APP_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Targeted interchange schema version.
pub const UIGF_VERSION: &str = "v3.0";
/// Fixed locale tag for synthesized item names.
pub const EXPORT_LANG: &str = "zh-cn";

pub const ITEM_TYPE_CHARACTER: &str = "角色";
pub const ITEM_TYPE_WEAPON: &str = "武器";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ExportError {
    #[error("store has no gacha records; nothing to export")]
    EmptyStore,
    #[error("no gacha records found for uid {0}")]
    NoRecordsForUid(String),
    #[error("failed to format export timestamp: {0}")]
    Format(String),
}

/// One source row from the `gacha_items` table, untouched apart from typing.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PullRecord {
    pub inner_id: i64,
    pub archive_id: i64,
    pub gacha_type: i64,
    /// Display record id; governs export ordering.
    pub id: i64,
    pub item_id: i64,
    pub query_type: i64,
    /// Raw timestamp string as stored, possibly with line breaks and a
    /// trailing UTC offset.
    pub time: String,
}

/// UIGF dual pool codes for one internal query-type code.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PoolMapping {
    pub uigf_gacha_type: &'static str,
    pub gacha_type: &'static str,
}

/// Map an internal query-type code to the UIGF pool code pair.
///
/// Six codes are known; anything else returns `None` and the caller skips
/// the record while reporting the unresolved code and its display id.
#[must_use]
pub fn resolve_pool(query_type: i64) -> Option<PoolMapping> {
    match query_type {
        100 => Some(PoolMapping { uigf_gacha_type: "100", gacha_type: "100" }),
        200 => Some(PoolMapping { uigf_gacha_type: "200", gacha_type: "200" }),
        301 => Some(PoolMapping { uigf_gacha_type: "301", gacha_type: "301" }),
        302 => Some(PoolMapping { uigf_gacha_type: "302", gacha_type: "302" }),
        // Second character event banner shares the UIGF pool 301.
        400 => Some(PoolMapping { uigf_gacha_type: "301", gacha_type: "400" }),
        500 => Some(PoolMapping { uigf_gacha_type: "500", gacha_type: "500" }),
        _ => None,
    }
}

/// Coarse classification of one item id: synthesized display name,
/// category, and rank tier.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ItemClass {
    pub name: String,
    pub item_type: &'static str,
    pub rank_type: &'static str,
}

/// Classify an item id by numeric range; first matching range wins.
///
/// The ranges overlap (12000 sits in both the character range and the
/// four-star downgrade range) and the weapon sub-ranges are carved out of
/// the character range. This is a known approximation: true classification
/// needs an item catalog, which is out of scope.
#[must_use]
pub fn classify_item(item_id: i64) -> ItemClass {
    if (14_000..=14_999).contains(&item_id) {
        return weapon_class(item_id, "4");
    }
    if (15_000..=15_999).contains(&item_id) {
        return weapon_class(item_id, "3");
    }
    if (10_000..=19_999).contains(&item_id) {
        let rank_type = if (11_000..=16_999).contains(&item_id) { "4" } else { "5" };
        return ItemClass {
            name: format!("{ITEM_TYPE_CHARACTER}_{item_id}"),
            item_type: ITEM_TYPE_CHARACTER,
            rank_type,
        };
    }
    weapon_class(item_id, "3")
}

fn weapon_class(item_id: i64, rank_type: &'static str) -> ItemClass {
    ItemClass {
        name: format!("{ITEM_TYPE_WEAPON}_{item_id}"),
        item_type: ITEM_TYPE_WEAPON,
        rank_type,
    }
}

/// Normalize a stored timestamp string into the strict
/// `YYYY-MM-DD HH:MM:SS` shape the interchange schema requires.
///
/// Removes embedded line breaks, strips one trailing `+HH:MM`/`-HH:MM`
/// offset suffix, and trims surrounding whitespace. Total function;
/// idempotent on already-clean input.
#[must_use]
pub fn normalize_timestamp(raw: &str) -> String {
    let without_breaks: String = raw.chars().filter(|ch| *ch != '\n' && *ch != '\r').collect();
    strip_offset_suffix(without_breaks.trim()).trim().to_string()
}

fn strip_offset_suffix(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() < 6 {
        return value;
    }
    let tail = &bytes[bytes.len() - 6..];
    let is_offset = (tail[0] == b'+' || tail[0] == b'-')
        && tail[1].is_ascii_digit()
        && tail[2].is_ascii_digit()
        && tail[3] == b':'
        && tail[4].is_ascii_digit()
        && tail[5].is_ascii_digit();
    if is_offset {
        &value[..value.len() - 6]
    } else {
        value
    }
}

/// Derive the region UTC offset from the leading digit of the uid.
///
/// Known numbering convention: `6...` is the America region (-5),
/// `7...` the Europe region (+1), everything else Asia/CN (+8).
/// Coarse and not configurable.
#[must_use]
pub fn infer_region_time_zone(uid: &str) -> i32 {
    match uid.as_bytes().first() {
        Some(b'6') => -5,
        Some(b'7') => 1,
        _ => 8,
    }
}

/// One normalized pull record in UIGF v3.0 shape. All fields stringified
/// per the interchange schema; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct UigfRecord {
    pub uigf_gacha_type: String,
    pub gacha_type: String,
    pub item_id: String,
    pub count: String,
    pub time: String,
    pub name: String,
    pub item_type: String,
    pub rank_type: String,
    pub id: String,
}

/// UIGF v3.0 `info` header block.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct UigfInfo {
    pub uid: String,
    pub lang: String,
    pub export_timestamp: i64,
    pub export_time: String,
    pub export_app: String,
    pub export_app_version: String,
    pub uigf_version: String,
    pub region_time_zone: i32,
}

/// Complete export document: header plus ordered record list.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct UigfDocument {
    pub info: UigfInfo,
    pub list: Vec<UigfRecord>,
}

/// One source row dropped because its query-type code has no pool mapping.
/// Data loss is explicit: the caller reports each skip to the operator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct SkippedRecord {
    pub id: i64,
    pub query_type: i64,
}

/// Result of one document build: the document itself plus every skipped row.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExportOutcome {
    pub document: UigfDocument,
    pub skipped: Vec<SkippedRecord>,
}

/// Assemble the UIGF document for one uid from reader-ordered source rows.
///
/// Input order is preserved; the reader's `ORDER BY Id ASC` governs the
/// final list order. Rows with unresolved pool types are collected into
/// `skipped` instead of the list.
///
/// # Errors
/// Returns [`ExportError::Format`] when the export wall-clock timestamp
/// cannot be formatted.
pub fn build_document(
    uid: &str,
    records: &[PullRecord],
    exported_at: OffsetDateTime,
) -> Result<ExportOutcome, ExportError> {
    let mut list = Vec::with_capacity(records.len());
    let mut skipped = Vec::new();

    for record in records {
        let Some(pool) = resolve_pool(record.query_type) else {
            skipped.push(SkippedRecord { id: record.id, query_type: record.query_type });
            continue;
        };

        let item = classify_item(record.item_id);
        list.push(UigfRecord {
            uigf_gacha_type: pool.uigf_gacha_type.to_string(),
            gacha_type: pool.gacha_type.to_string(),
            item_id: record.item_id.to_string(),
            count: "1".to_string(),
            time: normalize_timestamp(&record.time),
            name: item.name,
            item_type: item.item_type.to_string(),
            rank_type: item.rank_type.to_string(),
            id: record.id.to_string(),
        });
    }

    let info = UigfInfo {
        uid: uid.to_string(),
        lang: EXPORT_LANG.to_string(),
        export_timestamp: exported_at.unix_timestamp(),
        export_time: format_export_time(exported_at)?,
        export_app: EXPORT_APP.to_string(),
        export_app_version: EXPORT_APP_VERSION.to_string(),
        uigf_version: UIGF_VERSION.to_string(),
        region_time_zone: infer_region_time_zone(uid),
    };

    Ok(ExportOutcome { document: UigfDocument { info, list }, skipped })
}

/// Format a wall-clock timestamp as `YYYY-MM-DD HH:MM:SS`.
///
/// # Errors
/// Returns [`ExportError::Format`] when formatting fails.
pub fn format_export_time(value: OffsetDateTime) -> Result<String, ExportError> {
    let format =
        time::format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
            .map_err(|err| ExportError::Format(err.to_string()))?;
    value.format(&format).map_err(|err| ExportError::Format(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn fixture_time() -> OffsetDateTime {
        // 2023-11-14 22:13:20 UTC
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(1_700_000_000)
    }

    fn fixture_record(id: i64, item_id: i64, query_type: i64, time: &str) -> PullRecord {
        PullRecord {
            inner_id: id,
            archive_id: 800_000_001,
            gacha_type: query_type,
            id,
            item_id,
            query_type,
            time: time.to_string(),
        }
    }

    fn build_fixture_document(records: &[PullRecord]) -> ExportOutcome {
        match build_document("800000001", records, fixture_time()) {
            Ok(outcome) => outcome,
            Err(err) => panic!("document should build: {err}"),
        }
    }

    #[test]
    fn resolve_pool_maps_all_six_known_codes() {
        let expected = [
            (100, "100", "100"),
            (200, "200", "200"),
            (301, "301", "301"),
            (302, "302", "302"),
            (400, "301", "400"),
            (500, "500", "500"),
        ];

        for (code, uigf_gacha_type, gacha_type) in expected {
            let mapping = match resolve_pool(code) {
                Some(mapping) => mapping,
                None => panic!("query type {code} should resolve"),
            };
            assert_eq!(mapping.uigf_gacha_type, uigf_gacha_type);
            assert_eq!(mapping.gacha_type, gacha_type);
        }
    }

    #[test]
    fn resolve_pool_rejects_unknown_codes() {
        for code in [0, 99, 101, 300, 401, 999, -100] {
            assert!(resolve_pool(code).is_none(), "query type {code} should not resolve");
        }
    }

    #[test]
    fn normalize_timestamp_removes_embedded_line_break_and_offset() {
        assert_eq!(
            normalize_timestamp("2024-11-16 10:33:15\n+08:00"),
            "2024-11-16 10:33:15"
        );
    }

    #[test]
    fn normalize_timestamp_strips_inline_offset() {
        assert_eq!(normalize_timestamp("2024-11-16 10:33:15+00:00"), "2024-11-16 10:33:15");
        assert_eq!(normalize_timestamp("2024-11-16 10:33:15-05:00"), "2024-11-16 10:33:15");
    }

    #[test]
    fn normalize_timestamp_is_idempotent_on_clean_input() {
        assert_eq!(normalize_timestamp("2024-11-16 10:33:15"), "2024-11-16 10:33:15");
    }

    #[test]
    fn normalize_timestamp_handles_crlf_and_surrounding_whitespace() {
        assert_eq!(
            normalize_timestamp("  2024-11-16 10:33:15\r\n+08:00  "),
            "2024-11-16 10:33:15"
        );
    }

    #[test]
    fn normalize_timestamp_keeps_short_strings_intact() {
        assert_eq!(normalize_timestamp("10:33"), "10:33");
    }

    #[test]
    fn infer_region_time_zone_follows_leading_digit() {
        assert_eq!(infer_region_time_zone("600000001"), -5);
        assert_eq!(infer_region_time_zone("700000001"), 1);
        assert_eq!(infer_region_time_zone("800000001"), 8);
        assert_eq!(infer_region_time_zone("100000001"), 8);
        assert_eq!(infer_region_time_zone(""), 8);
    }

    #[test]
    fn classify_item_downgrades_overlapping_character_range() {
        let item = classify_item(12_000);
        assert_eq!(item.item_type, ITEM_TYPE_CHARACTER);
        assert_eq!(item.rank_type, "4");
        assert_eq!(item.name, "角色_12000");
    }

    #[test]
    fn classify_item_keeps_five_star_characters() {
        let item = classify_item(10_500);
        assert_eq!(item.item_type, ITEM_TYPE_CHARACTER);
        assert_eq!(item.rank_type, "5");
    }

    #[test]
    fn classify_item_weapon_sub_ranges_take_precedence() {
        let four_star = classify_item(14_200);
        assert_eq!(four_star.item_type, ITEM_TYPE_WEAPON);
        assert_eq!(four_star.rank_type, "4");

        let three_star = classify_item(15_500);
        assert_eq!(three_star.item_type, ITEM_TYPE_WEAPON);
        assert_eq!(three_star.rank_type, "3");
        assert_eq!(three_star.name, "武器_15500");
    }

    #[test]
    fn classify_item_defaults_to_three_star_weapon() {
        let item = classify_item(20_011);
        assert_eq!(item.item_type, ITEM_TYPE_WEAPON);
        assert_eq!(item.rank_type, "3");
    }

    #[test]
    fn format_export_time_uses_schema_literal_shape() {
        let formatted = match format_export_time(fixture_time()) {
            Ok(formatted) => formatted,
            Err(err) => panic!("formatting should succeed: {err}"),
        };
        assert_eq!(formatted, "2023-11-14 22:13:20");
    }

    #[test]
    fn build_document_skips_unresolved_pool_types_with_details() {
        let records = [
            fixture_record(1, 11_001, 100, "2024-11-16 10:33:15\n+08:00"),
            fixture_record(2, 15_501, 999, "2024-11-16 10:34:15"),
            fixture_record(3, 10_004, 301, "2024-11-16 10:35:15+00:00"),
        ];

        let outcome = build_fixture_document(&records);
        assert_eq!(outcome.document.list.len(), 2);
        assert_eq!(outcome.skipped, vec![SkippedRecord { id: 2, query_type: 999 }]);
        assert_eq!(outcome.document.list[0].id, "1");
        assert_eq!(outcome.document.list[1].id, "3");
        assert_eq!(outcome.document.info.region_time_zone, 8);
    }

    #[test]
    fn build_document_stringifies_every_record_field() {
        let records = [fixture_record(42, 11_001, 302, "2024-01-02 03:04:05+08:00")];
        let outcome = build_fixture_document(&records);

        let record = &outcome.document.list[0];
        assert_eq!(record.uigf_gacha_type, "302");
        assert_eq!(record.gacha_type, "302");
        assert_eq!(record.item_id, "11001");
        assert_eq!(record.count, "1");
        assert_eq!(record.time, "2024-01-02 03:04:05");
        assert_eq!(record.name, "角色_11001");
        assert_eq!(record.item_type, "角色");
        assert_eq!(record.rank_type, "4");
        assert_eq!(record.id, "42");
    }

    #[test]
    fn build_document_header_carries_tool_identity_and_clock() {
        let outcome = build_fixture_document(&[fixture_record(1, 11_001, 100, "t")]);
        let info = &outcome.document.info;

        assert_eq!(info.uid, "800000001");
        assert_eq!(info.lang, EXPORT_LANG);
        assert_eq!(info.export_timestamp, 1_700_000_000);
        assert_eq!(info.export_time, "2023-11-14 22:13:20");
        assert_eq!(info.export_app, EXPORT_APP);
        assert_eq!(info.export_app_version, EXPORT_APP_VERSION);
        assert_eq!(info.uigf_version, UIGF_VERSION);
        assert_eq!(info.region_time_zone, 8);
    }

    #[test]
    fn build_document_is_deterministic_apart_from_export_clock() {
        let records = [
            fixture_record(1, 11_001, 100, "2024-11-16 10:33:15\n+08:00"),
            fixture_record(2, 15_501, 999, "2024-11-16 10:34:15"),
            fixture_record(3, 10_004, 301, "2024-11-16 10:35:15"),
        ];

        let first = build_fixture_document(&records);
        let later = match build_document(
            "800000001",
            &records,
            fixture_time() + Duration::seconds(3600),
        ) {
            Ok(outcome) => outcome,
            Err(err) => panic!("document should build: {err}"),
        };

        assert_eq!(first.document.list, later.document.list);
        assert_eq!(first.skipped, later.skipped);
        assert_ne!(first.document.info.export_timestamp, later.document.info.export_timestamp);
        assert_ne!(first.document.info.export_time, later.document.info.export_time);
    }

    #[test]
    fn document_json_preserves_schema_key_order() {
        let outcome = build_fixture_document(&[fixture_record(1, 11_001, 100, "t")]);
        let json = match serde_json::to_string(&outcome.document) {
            Ok(json) => json,
            Err(err) => panic!("serialization should succeed: {err}"),
        };

        let uid_at = json.find("\"uid\"");
        let lang_at = json.find("\"lang\"");
        let list_at = json.find("\"list\"");
        assert!(uid_at < lang_at, "info keys should keep declaration order");
        assert!(lang_at < list_at, "list should follow the info header");
        assert!(json.contains("角色_11001"), "non-ASCII names should stay unescaped");
    }
}
