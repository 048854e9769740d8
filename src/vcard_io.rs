use anyhow::{anyhow, Context, Result};
use rlibphonenumber::{region_code::RegionCode, PhoneNumber, PhoneNumberFormat, PHONE_NUMBER_UTIL};
use vcard4::property::TextOrUriProperty;
use vcard4::{parse, Vcard};

/// Parse a UTF-8 string into `Vcard` values.
pub fn parse_str(input: &str) -> Result<Vec<Vcard>> {
    parse(input)
        .map_err(|err| anyhow!(err))
        .context("parsing vCard data")
}

fn parse_with_regions(input: &str, default_region: Option<&str>) -> Option<String> {
    let util = &*PHONE_NUMBER_UTIL;
    let mut candidates: Vec<&str> = Vec::new();

    if let Some(region) = default_region {
        if !region.is_empty() {
            candidates.push(region);
        }
    }

    let unknown = RegionCode::get_unknown();
    if candidates
        .iter()
        .all(|candidate| !candidate.eq_ignore_ascii_case(unknown))
    {
        candidates.push(unknown);
    }

    for region in candidates {
        if let Ok(parsed) = util.parse(input, region) {
            return Some(format_parsed_number(&parsed));
        }
    }

    None
}

fn format_parsed_number(number: &PhoneNumber) -> String {
    let mut normalized = PHONE_NUMBER_UTIL
        .format(number, PhoneNumberFormat::E164)
        .into_owned();

    if number.has_extension() {
        let ext = number.extension();
        if !ext.is_empty() {
            normalized.push_str(";ext=");
            normalized.push_str(ext);
        }
    }

    normalized
}

fn has_tel_scheme(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() < 4 {
        return false;
    }

    bytes[0].eq_ignore_ascii_case(&b't')
        && bytes[1].eq_ignore_ascii_case(&b'e')
        && bytes[2].eq_ignore_ascii_case(&b'l')
        && bytes[3] == b':'
}

fn strip_tel_scheme(value: &str) -> &str {
    if has_tel_scheme(value) {
        value[4..].trim()
    } else {
        value
    }
}

/// E.164 form of a TEL value when it parses, otherwise the value with any
/// `tel:` scheme removed.
pub fn phone_display_value(raw: &str, default_region: Option<&str>) -> String {
    let number = strip_tel_scheme(raw.trim());
    if number.is_empty() {
        return String::new();
    }
    parse_with_regions(number, default_region).unwrap_or_else(|| number.to_string())
}

/// Retrieve the UID value as a string if present and non-blank.
pub fn card_uid(card: &Vcard) -> Option<String> {
    let value = match &card.uid {
        Some(TextOrUriProperty::Text(text)) => text.value.clone(),
        Some(TextOrUriProperty::Uri(uri)) => uri.value.to_string(),
        None => return None,
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Display name: first non-blank FN, otherwise given + family from N.
pub fn display_name(card: &Vcard) -> String {
    if let Some(name) = card
        .formatted_name
        .iter()
        .map(|prop| prop.value.trim())
        .find(|value| !value.is_empty())
    {
        return name.to_string();
    }

    // N components: family;given;additional;prefixes;suffixes
    let Some(n) = &card.name else {
        return String::new();
    };
    let family = n.value.first().map(|s| s.trim()).unwrap_or_default();
    let given = n.value.get(1).map(|s| s.trim()).unwrap_or_default();
    [given, family]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Display-ready phone numbers in card order, blanks dropped.
pub fn phone_numbers(card: &Vcard, default_region: Option<&str>) -> Vec<String> {
    card.tel
        .iter()
        .map(|prop| match prop {
            TextOrUriProperty::Text(text) => text.value.clone(),
            TextOrUriProperty::Uri(uri) => uri.value.to_string(),
        })
        .map(|raw| phone_display_value(&raw, default_region))
        .filter(|value| !value.is_empty())
        .collect()
}

/// Raw value of the first embedded PHOTO. Remote URLs are not embedded
/// photos and are ignored.
pub fn photo_value(card: &Vcard) -> Option<String> {
    card.photo
        .iter()
        .map(|prop| match prop {
            TextOrUriProperty::Text(text) => text.value.clone(),
            TextOrUriProperty::Uri(uri) => uri.value.to_string(),
        })
        .find(|value| {
            let lower = value.trim_start().to_ascii_lowercase();
            !lower.is_empty() && !lower.starts_with("http://") && !lower.starts_with("https://")
        })
}
