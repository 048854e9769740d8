use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use image::DynamicImage;

use crate::source::ImageRef;

/// Decode an embedded photo. `Ok(None)` when there is nothing to show.
pub fn decode(image: &ImageRef) -> Result<Option<DynamicImage>> {
    let value = image.as_str().trim();
    if value.is_empty() {
        return Ok(None);
    }

    let data = match strip_prefix_ignore_case(value, "data:") {
        Some(data_uri) => parse_data_uri(data_uri)?,
        None => decode_base64_blob(value)?,
    };

    if data.is_empty() {
        return Ok(None);
    }

    let image = image::load_from_memory(&data)
        .with_context(|| "unable to parse embedded photo data as image")?;
    Ok(Some(image))
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

fn parse_data_uri(input: &str) -> Result<Vec<u8>> {
    let (meta, data) = input
        .split_once(',')
        .ok_or_else(|| anyhow!("data URI is missing payload"))?;

    let is_base64 = meta
        .split(';')
        .any(|segment| segment.eq_ignore_ascii_case("base64"));
    if !is_base64 {
        bail!("embedded data URI is not base64 encoded");
    }

    decode_base64_blob(data).with_context(|| "failed to decode base64 data URI contents")
}

fn decode_base64_blob(value: &str) -> Result<Vec<u8>> {
    let filtered: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if filtered.is_empty() {
        return Ok(Vec::new());
    }
    BASE64_STANDARD
        .decode(filtered)
        .with_context(|| "failed to decode embedded PHOTO data as base64")
}
