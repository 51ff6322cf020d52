//! Regex-based extraction of crop, growth stage and agronomic ranges.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{MISSING_VALUE, RecordMetadata};

static CROP_STAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([\x{4e00}-\x{9fa5}A-Za-z0-9（）()·\-\s]+?)\s+([\x{4e00}-\x{9fa5}A-Za-z0-9\-（）()]+期?)",
    )
    .expect("crop/stage pattern")
});
static TEMPERATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"温度[：: ]*([0-9]+)[～\-–]?([0-9]+)?").expect("temperature"));
static HUMIDITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"湿度[：: ]*[^0-9]*([0-9]+)[～\-–]?([0-9]+)?").expect("humidity")
});
static SOIL_MOISTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"土壤含水量[：: ]*([0-9]+)[～\-–]?([0-9]+)?").expect("soil moisture")
});
static NITROGEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"氮\s*([0-9]+)kg").expect("nitrogen"));
static PHOSPHORUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"磷\s*([0-9]+)kg").expect("phosphorus"));
static POTASSIUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"钾\s*([0-9]+)kg").expect("potassium"));
static LIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"光照[：: ]*≥?([0-9]+)h").expect("light"));

/// Split a heading line such as `番茄 开花期` into crop and stage.
pub fn detect_crop_and_stage(line: &str) -> Option<(String, String)> {
    let captures = CROP_STAGE.captures(line.trim())?;
    let crop = captures.get(1)?.as_str().trim();
    let stage = captures.get(2)?.as_str().trim();
    if crop.is_empty() || stage.is_empty() {
        return None;
    }
    Some((crop.to_string(), stage.to_string()))
}

pub fn extract_metadata(text: &str) -> RecordMetadata {
    let trimmed = text.trim();
    let first_line = trimmed.lines().next().unwrap_or_default();
    let (crop, stage) = match detect_crop_and_stage(first_line) {
        Some((crop, stage)) => (Some(crop), Some(stage)),
        None => (None, None),
    };

    let (min_temperature, max_temperature) = range(&TEMPERATURE, text);
    let (min_humidity, max_humidity) = range(&HUMIDITY, text);
    let (min_soil_moisture, max_soil_moisture) = range(&SOIL_MOISTURE, text);

    RecordMetadata {
        crop,
        stage,
        min_temperature,
        max_temperature,
        min_humidity,
        max_humidity,
        min_soil_moisture,
        max_soil_moisture,
        nitrogen_kg: number(&NITROGEN, text),
        phosphorus_kg: number(&PHOSPHORUS, text),
        potassium_kg: number(&POTASSIUM, text),
        light_hours: number(&LIGHT, text),
        record_id: None,
    }
}

/// A single value yields `(v, v)`.
fn range(pattern: &Regex, text: &str) -> (f64, f64) {
    let Some(captures) = pattern.captures(text) else {
        return (MISSING_VALUE, MISSING_VALUE);
    };
    let Some(low) = captures.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) else {
        return (MISSING_VALUE, MISSING_VALUE);
    };
    let high = captures
        .get(2)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(low);
    (low, high)
}

fn number(pattern: &Regex, text: &str) -> f64 {
    pattern
        .captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(MISSING_VALUE)
}
