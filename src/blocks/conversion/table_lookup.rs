use super::linear::extract_numeric;
use crate::Result;
use crate::blocks::conversion::base::ConversionBlock;
use crate::types::DecodedValue;
use alloc::vec::Vec;

/// General table lookup: either interpolated or nearest neighbour.
/// `values` must be `[key0, val0, key1, val1, ...]` sorted by key.
///
/// Out-of-range raw values clamp to the endpoint values. For the
/// nearest-neighbour form a tie between neighbours picks the higher key.
pub fn lookup_table(values: &[f64], raw: f64, interp: bool) -> Option<f64> {
    let len = values.len();
    if len < 4 || !len.is_multiple_of(2) {
        return None;
    }
    let n = len / 2;
    let mut table = Vec::with_capacity(n);
    for i in 0..n {
        table.push((values[2 * i], values[2 * i + 1]));
    }
    if raw <= table[0].0 {
        return Some(table[0].1);
    }
    if raw >= table[n - 1].0 {
        return Some(table[n - 1].1);
    }
    for i in 0..(n - 1) {
        let (k0, v0) = table[i];
        let (k1, v1) = table[i + 1];
        if raw >= k0 && raw <= k1 {
            if raw == k0 {
                return Some(v0);
            }
            if raw == k1 {
                return Some(v1);
            }
            if interp {
                let t = (raw - k0) / (k1 - k0);
                return Some(v0 + t * (v1 - v0));
            } else {
                let d0 = raw - k0;
                let d1 = k1 - raw;
                // Tie goes to the higher key
                return Some(if d1 <= d0 { v1 } else { v0 });
            }
        }
    }
    None
}

pub fn apply_table_lookup(
    block: &ConversionBlock,
    value: DecodedValue,
    interp: bool,
) -> Result<DecodedValue> {
    if let Some(raw) = extract_numeric(&value) {
        let phys = lookup_table(&block.values, raw, interp).unwrap_or(raw);
        Ok(DecodedValue::Float(phys))
    } else {
        Ok(value)
    }
}

/// Value-range-to-value lookup over `[min0, max0, val0, ..., default]`
/// triplets with a trailing default.
///
/// For integer channels both bounds are inclusive; for float channels the
/// upper bound is exclusive.
pub fn apply_range_lookup(block: &ConversionBlock, value: DecodedValue) -> Result<DecodedValue> {
    if let Some(raw) = extract_numeric(&value) {
        let inclusive_upper = matches!(
            value,
            DecodedValue::UnsignedInteger(_) | DecodedValue::SignedInteger(_)
        );
        let v = &block.values;
        if v.len() < 4 || !(v.len() - 1).is_multiple_of(3) {
            return Ok(DecodedValue::Float(raw));
        }
        let n = (v.len() - 1) / 3;
        let default = v[3 * n];
        for i in 0..n {
            let key_min = v[3 * i];
            let key_max = v[3 * i + 1];
            let phys = v[3 * i + 2];
            if inclusive_upper {
                if raw >= key_min && raw <= key_max {
                    return Ok(DecodedValue::Float(phys));
                }
            } else if raw >= key_min && raw < key_max {
                return Ok(DecodedValue::Float(phys));
            }
        }
        Ok(DecodedValue::Float(default))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interp_clamps_to_endpoints() {
        let table = [0.0, 10.0, 10.0, 20.0];
        assert_eq!(lookup_table(&table, -5.0, true), Some(10.0));
        assert_eq!(lookup_table(&table, 15.0, true), Some(20.0));
        assert_eq!(lookup_table(&table, 5.0, true), Some(15.0));
    }

    #[test]
    fn nearest_tie_takes_higher_key() {
        let table = [0.0, 1.0, 10.0, 2.0];
        assert_eq!(lookup_table(&table, 4.0, false), Some(1.0));
        assert_eq!(lookup_table(&table, 6.0, false), Some(2.0));
        // Exactly halfway: higher key wins
        assert_eq!(lookup_table(&table, 5.0, false), Some(2.0));
    }

    #[test]
    fn exact_key_returns_value() {
        let table = [0.0, 1.0, 5.0, 7.0, 10.0, 2.0];
        assert_eq!(lookup_table(&table, 5.0, false), Some(7.0));
        assert_eq!(lookup_table(&table, 5.0, true), Some(7.0));
    }

    #[test]
    fn range_lookup_integer_inclusive_upper() {
        // [0..5] -> 1, [6..10] -> 2, default 9
        let block = ConversionBlock {
            values: alloc::vec![0.0, 5.0, 1.0, 6.0, 10.0, 2.0, 9.0],
            ..ConversionBlock::identity()
        };
        let at_bound = apply_range_lookup(&block, DecodedValue::UnsignedInteger(5)).unwrap();
        assert_eq!(at_bound, DecodedValue::Float(1.0));
        let in_second = apply_range_lookup(&block, DecodedValue::UnsignedInteger(10)).unwrap();
        assert_eq!(in_second, DecodedValue::Float(2.0));
        let miss = apply_range_lookup(&block, DecodedValue::UnsignedInteger(11)).unwrap();
        assert_eq!(miss, DecodedValue::Float(9.0));
    }

    #[test]
    fn range_lookup_float_exclusive_upper() {
        let block = ConversionBlock {
            values: alloc::vec![0.0, 5.0, 1.0, 6.0, 10.0, 2.0, 9.0],
            ..ConversionBlock::identity()
        };
        // 5.0 falls outside the half-open [0, 5) and outside [6, 10)
        let at_bound = apply_range_lookup(&block, DecodedValue::Float(5.0)).unwrap();
        assert_eq!(at_bound, DecodedValue::Float(9.0));
        let inside = apply_range_lookup(&block, DecodedValue::Float(4.999)).unwrap();
        assert_eq!(inside, DecodedValue::Float(1.0));
    }
}
