use super::linear::extract_numeric;
use crate::Result;
use crate::blocks::common::{BlockHeader, read_string_block};
use crate::blocks::conversion::base::ConversionBlock;
use crate::blocks::common::BlockParse;
use crate::types::DecodedValue;

/// Given `values = [min0, max0, min1, max1, ...]`, return the first index
/// where `raw` falls into the range. If no range matches, returns `n` (the
/// default index).
pub fn find_range_to_text_index(values: &[f64], raw: f64, inclusive_upper: bool) -> usize {
    let len = values.len();
    if len < 2 || len % 2 != 0 {
        return 0;
    }
    let n = len / 2;
    for i in 0..n {
        let min = values[2 * i];
        let max = values[2 * i + 1];
        if inclusive_upper {
            if raw >= min && raw <= max {
                return i;
            }
        } else if raw >= min && raw < max {
            return i;
        }
    }
    n
}

/// Resolve the target of a text-table hit: either emit the referenced text
/// or recurse into a nested conversion. Falls back to the default target
/// and finally to `Unknown`.
fn resolve_text_target(
    block: &ConversionBlock,
    idx: usize,
    matched: bool,
    value: DecodedValue,
    file_data: &[u8],
) -> Result<DecodedValue> {
    // Prefer pre-resolved data; the block is then self-contained.
    if let Some(resolved_text) = block.get_resolved_text(idx) {
        return Ok(DecodedValue::String(resolved_text.clone()));
    }
    if let Some(resolved_conversion) = block.get_resolved_conversion(idx) {
        return resolved_conversion.apply_decoded(value, &[]);
    }
    if !matched && let Some(default_conversion) = block.get_default_conversion() {
        return default_conversion.apply_decoded(value, &[]);
    }

    // Otherwise chase the link through the file bytes.
    let link = *block.refs.get(idx).unwrap_or(&0);
    if link == 0 {
        if let Some(default_conversion) = block.get_default_conversion() {
            return default_conversion.apply_decoded(value, &[]);
        }
        return Ok(DecodedValue::Unknown);
    }

    let off = link as usize;
    if off + 24 > file_data.len() {
        if let Some(default_conversion) = block.get_default_conversion() {
            return default_conversion.apply_decoded(value, &[]);
        }
        return Ok(DecodedValue::Unknown);
    }

    let hdr = BlockHeader::from_bytes(&file_data[off..off + 24])?;
    if hdr.id == "##TX" || hdr.id == "##MD" {
        if let Some(txt) = read_string_block(file_data, link)? {
            return Ok(DecodedValue::String(txt));
        }
        if let Some(default_conversion) = block.get_default_conversion() {
            return default_conversion.apply_decoded(value, &[]);
        }
        return Ok(DecodedValue::Unknown);
    }
    if hdr.id == "##CC" {
        let mut nested = ConversionBlock::from_bytes(&file_data[off..])?;
        let _ = nested.resolve_formula(file_data);
        return nested.apply_decoded(value, file_data);
    }

    if let Some(default_conversion) = block.get_default_conversion() {
        return default_conversion.apply_decoded(value, &[]);
    }
    Ok(DecodedValue::Unknown)
}

/// Value-to-text: find the key equal to the raw value and emit the matching
/// reference; the trailing reference is the default.
pub fn apply_value_to_text(
    block: &ConversionBlock,
    value: DecodedValue,
    file_data: &[u8],
) -> Result<DecodedValue> {
    let raw = match extract_numeric(&value) {
        Some(x) => x,
        None => return Ok(value),
    };
    let idx = block
        .values
        .iter()
        .position(|&k| k == raw)
        .unwrap_or(block.values.len());
    let matched = idx < block.values.len();
    resolve_text_target(block, idx, matched, value, file_data)
}

/// Value-range-to-text: inclusive bounds for integer channels, upper bound
/// exclusive for float channels.
pub fn apply_range_to_text(
    block: &ConversionBlock,
    value: DecodedValue,
    file_data: &[u8],
) -> Result<DecodedValue> {
    let raw = match extract_numeric(&value) {
        Some(x) => x,
        None => return Ok(value),
    };
    let inclusive_upper = matches!(
        value,
        DecodedValue::UnsignedInteger(_) | DecodedValue::SignedInteger(_)
    );
    let idx = find_range_to_text_index(&block.values, raw, inclusive_upper);
    let matched = idx < block.values.len() / 2;
    resolve_text_target(block, idx, matched, value, file_data)
}

/// Text-to-value: match the input string against the reference texts and
/// emit the paired numeric value; a trailing value is the default.
pub fn apply_text_to_value(
    block: &ConversionBlock,
    value: DecodedValue,
    file_data: &[u8],
) -> Result<DecodedValue> {
    let input = match value {
        DecodedValue::String(s) => s,
        other => return Ok(other),
    };
    let n = block.refs.len();

    if let Some(resolved_texts) = &block.resolved_texts {
        for (i, resolved_text) in resolved_texts.iter() {
            if *i < n && input == *resolved_text {
                return if *i < block.values.len() {
                    Ok(DecodedValue::Float(block.values[*i]))
                } else {
                    Ok(DecodedValue::Unknown)
                };
            }
        }
        return if block.values.len() > n {
            Ok(DecodedValue::Float(block.values[n]))
        } else {
            Ok(DecodedValue::Unknown)
        };
    }

    for (i, &link) in block.refs.iter().enumerate() {
        if link == 0 {
            continue;
        }
        if let Some(key_str) = read_string_block(file_data, link)?
            && input == key_str
        {
            return if i < block.values.len() {
                Ok(DecodedValue::Float(block.values[i]))
            } else {
                Ok(DecodedValue::Unknown)
            };
        }
    }
    if block.values.len() > n {
        Ok(DecodedValue::Float(block.values[n]))
    } else {
        Ok(DecodedValue::Unknown)
    }
}

/// Text-to-translation: the references are `[key0, out0, key1, out1, ...,
/// default]`; an unmatched input falls through to the default or itself.
pub fn apply_text_to_translation(
    block: &ConversionBlock,
    value: DecodedValue,
    file_data: &[u8],
) -> Result<DecodedValue> {
    let input = match value {
        DecodedValue::String(s) => s,
        other => return Ok(other),
    };
    let pairs = block.refs.len().saturating_sub(1) / 2;

    if let Some(resolved_texts) = &block.resolved_texts {
        for i in 0..pairs {
            let key_idx = 2 * i;
            let output_idx = 2 * i + 1;

            if let Some(key_str) = resolved_texts.get(&key_idx)
                && *key_str == input
            {
                return if let Some(output_str) = resolved_texts.get(&output_idx) {
                    Ok(DecodedValue::String(output_str.clone()))
                } else {
                    Ok(DecodedValue::String(input))
                };
            }
        }
        let default_idx = 2 * pairs;
        return if let Some(default_str) = resolved_texts.get(&default_idx) {
            Ok(DecodedValue::String(default_str.clone()))
        } else {
            Ok(DecodedValue::String(input))
        };
    }

    for i in 0..pairs {
        let key_link = block.refs[2 * i];
        let output_link = block.refs[2 * i + 1];
        if let Some(key_str) = read_string_block(file_data, key_link)?
            && key_str == input
        {
            return if output_link == 0 {
                Ok(DecodedValue::String(input))
            } else {
                Ok(read_string_block(file_data, output_link)?
                    .map(DecodedValue::String)
                    .unwrap_or(DecodedValue::String(input)))
            };
        }
    }
    let default_link = *block.refs.get(2 * pairs).unwrap_or(&0);
    if default_link == 0 {
        Ok(DecodedValue::String(input))
    } else {
        Ok(read_string_block(file_data, default_link)?
            .map(DecodedValue::String)
            .unwrap_or(DecodedValue::String(input)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;

    fn value_to_text_block(pairs: &[(f64, &str)], default: &str) -> ConversionBlock {
        let mut block = ConversionBlock::identity();
        block.conversion_type = super::super::ConversionType::ValueToText;
        block.values = pairs.iter().map(|(k, _)| *k).collect();
        block.refs = alloc::vec![0; pairs.len() + 1];
        let mut resolved = BTreeMap::new();
        for (i, (_, txt)) in pairs.iter().enumerate() {
            resolved.insert(i, txt.to_string());
        }
        resolved.insert(pairs.len(), default.to_string());
        block.resolved_texts = Some(resolved);
        block
    }

    #[test]
    fn value_to_text_match_and_default() {
        let block = value_to_text_block(&[(0.0, "Rx"), (1.0, "Tx")], "");
        let rx = apply_value_to_text(&block, DecodedValue::UnsignedInteger(0), &[]).unwrap();
        assert_eq!(rx, DecodedValue::String("Rx".into()));
        let tx = apply_value_to_text(&block, DecodedValue::UnsignedInteger(1), &[]).unwrap();
        assert_eq!(tx, DecodedValue::String("Tx".into()));
        let default = apply_value_to_text(&block, DecodedValue::UnsignedInteger(7), &[]).unwrap();
        assert_eq!(default, DecodedValue::String("".into()));
    }

    #[test]
    fn range_to_text_index_rules() {
        let ranges = [0.0, 10.0, 20.0, 30.0];
        assert_eq!(find_range_to_text_index(&ranges, 10.0, true), 0);
        assert_eq!(find_range_to_text_index(&ranges, 10.0, false), 2);
        assert_eq!(find_range_to_text_index(&ranges, 25.0, false), 1);
        assert_eq!(find_range_to_text_index(&ranges, 31.0, true), 2);
    }
}
