use super::types::ConversionType;
use crate::blocks::common::{BlockHeader, BlockParse, read_u8, read_u16, validate_buffer_size};
use crate::{Error, Result};

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

/// Conversion block (##CC) - raw-to-engineering transformation descriptor.
///
/// Stores the algorithm tag, the raw parameter array, and a reference list
/// of text blocks and/or nested conversions for the text-valued variants.
/// A trailing reference is the default target.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConversionBlock {
    pub header: BlockHeader,

    // Link section
    pub name_addr: Option<u64>,
    pub unit_addr: Option<u64>,
    pub comment_addr: Option<u64>,
    pub inverse_addr: Option<u64>,
    /// Additional references: TX blocks or nested CC blocks.
    pub refs: Vec<u64>,

    // Data
    pub conversion_type: ConversionType,
    pub precision: u8,
    pub flags: u16,
    pub ref_count: u16,
    pub value_count: u16,
    pub phys_range_min: Option<f64>,
    pub phys_range_max: Option<f64>,
    pub values: Vec<f64>,

    /// Resolved algebraic formula text (from `refs[0]`).
    pub formula: Option<String>,

    /// Pre-resolved text strings for text-based conversions, keyed by refs
    /// index. Populated by [`Self::resolve_all_dependencies`] so the block
    /// can be applied without the file bytes at hand.
    pub resolved_texts: Option<BTreeMap<usize, String>>,

    /// Pre-resolved nested conversion blocks, keyed by refs index.
    pub resolved_conversions: Option<BTreeMap<usize, Box<ConversionBlock>>>,

    /// Default conversion for fallback cases (the trailing reference of
    /// some conversion types).
    pub default_conversion: Option<Box<ConversionBlock>>,
}

impl BlockParse<'_> for ConversionBlock {
    const ID: &'static str = "##CC";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;

        let mut offset = 24;

        // Fixed links
        let name_addr = read_link(bytes, &mut offset)?;
        let unit_addr = read_link(bytes, &mut offset)?;
        let comment_addr = read_link(bytes, &mut offset)?;
        let inverse_addr = read_link(bytes, &mut offset)?;

        let fixed_links = 4;
        let additional_links = header.link_count.saturating_sub(fixed_links);
        let mut refs = Vec::with_capacity(additional_links as usize);
        for _ in 0..additional_links {
            refs.push(read_u64_checked(bytes, &mut offset)?);
        }

        validate_buffer_size(bytes, offset + 8)?;
        let conversion_type = ConversionType::from_u8(read_u8(bytes, offset));
        offset += 1;
        let precision = read_u8(bytes, offset);
        offset += 1;
        let flags = read_u16(bytes, offset);
        offset += 2;
        let ref_count = read_u16(bytes, offset);
        offset += 2;
        let value_count = read_u16(bytes, offset);
        offset += 2;

        // Some vendors always write the physical range fields even when the
        // range-valid flag is clear. Detect by checking the block length.
        let size_without_range =
            24 + (header.link_count as usize * 8) + 8 + (value_count as usize * 8);
        let size_with_range = size_without_range + 16;
        let has_range_data = header.length as usize >= size_with_range;

        let phys_range_min = if has_range_data {
            Some(f64::from_bits(read_u64_checked(bytes, &mut offset)?))
        } else {
            None
        };
        let phys_range_max = if has_range_data {
            Some(f64::from_bits(read_u64_checked(bytes, &mut offset)?))
        } else {
            None
        };

        let mut values = Vec::with_capacity(value_count as usize);
        for _ in 0..value_count {
            values.push(f64::from_bits(read_u64_checked(bytes, &mut offset)?));
        }

        Ok(Self {
            header,
            name_addr,
            unit_addr,
            comment_addr,
            inverse_addr,
            refs,
            conversion_type,
            precision,
            flags,
            ref_count,
            value_count,
            phys_range_min,
            phys_range_max,
            values,
            formula: None,
            resolved_texts: None,
            resolved_conversions: None,
            default_conversion: None,
        })
    }
}

/// Read an optional link from bytes, advancing the offset.
fn read_link(bytes: &[u8], offset: &mut usize) -> Result<Option<u64>> {
    let link = read_u64_checked(bytes, offset)?;
    Ok(if link == 0 { None } else { Some(link) })
}

/// Read a u64 from bytes, advancing the offset and validating bounds.
fn read_u64_checked(bytes: &[u8], offset: &mut usize) -> Result<u64> {
    validate_buffer_size(bytes, *offset + 8)?;
    let val = u64::from_le_bytes(bytes[*offset..*offset + 8].try_into().unwrap());
    *offset += 8;
    Ok(val)
}

impl ConversionBlock {
    /// Resolve all dependencies for this conversion block so it can be
    /// applied without the file bytes at hand. Reads referenced text blocks
    /// and nested conversions and stores them in `resolved_texts` /
    /// `resolved_conversions`.
    ///
    /// Supports arbitrary-depth conversion chains with cycle detection.
    pub fn resolve_all_dependencies(&mut self, file_data: &[u8]) -> Result<()> {
        self.resolve_all_dependencies_with_address(file_data, 0)
    }

    /// Resolve all dependencies with a known current block address.
    pub fn resolve_all_dependencies_with_address(
        &mut self,
        file_data: &[u8],
        current_address: u64,
    ) -> Result<()> {
        let mut visited = BTreeSet::new();
        self.resolve_dependencies_recursive(file_data, 0, &mut visited, current_address)
    }

    fn resolve_dependencies_recursive(
        &mut self,
        file_data: &[u8],
        depth: usize,
        visited: &mut BTreeSet<u64>,
        current_address: u64,
    ) -> Result<()> {
        use crate::blocks::common::read_string_block;

        const MAX_DEPTH: usize = 20;

        if depth > MAX_DEPTH {
            return Err(Error::ConversionChainTooDeep {
                max_depth: MAX_DEPTH,
            });
        }

        visited.insert(current_address);

        // The algebraic formula is itself a ref; resolve it first.
        self.resolve_formula(file_data)?;

        let mut resolved_texts = BTreeMap::new();
        let mut resolved_conversions = BTreeMap::new();
        let mut default_conversion = None;

        // For the text-table conversions the trailing reference is the
        // default target; it may be a TX block or a nested conversion.
        let default_ref_index = if self.conversion_type.produces_text() && !self.refs.is_empty() {
            Some(self.refs.len() - 1)
        } else {
            None
        };

        for (i, &link_addr) in self.refs.iter().enumerate() {
            if link_addr == 0 {
                continue;
            }

            if visited.contains(&link_addr) {
                return Err(Error::ConversionChainCycle { address: link_addr });
            }

            let offset = link_addr as usize;
            if offset + 24 > file_data.len() {
                continue;
            }

            let header = BlockHeader::from_bytes(&file_data[offset..offset + 24])?;
            match header.id.as_str() {
                "##TX" | "##MD" => {
                    if let Some(text) = read_string_block(file_data, link_addr)? {
                        resolved_texts.insert(i, text);
                    }
                }
                "##CC" => {
                    let mut nested = ConversionBlock::from_bytes(&file_data[offset..])?;
                    nested.resolve_dependencies_recursive(
                        file_data,
                        depth + 1,
                        visited,
                        link_addr,
                    )?;

                    if Some(i) == default_ref_index {
                        default_conversion = Some(Box::new(nested));
                    } else {
                        resolved_conversions.insert(i, Box::new(nested));
                    }
                }
                _ => {}
            }
        }

        if !resolved_texts.is_empty() {
            self.resolved_texts = Some(resolved_texts);
        }
        if !resolved_conversions.is_empty() {
            self.resolved_conversions = Some(resolved_conversions);
        }
        if default_conversion.is_some() {
            self.default_conversion = default_conversion;
        }

        visited.remove(&current_address);

        Ok(())
    }

    /// Get a resolved text string for a given refs index.
    pub fn get_resolved_text(&self, ref_index: usize) -> Option<&String> {
        self.resolved_texts.as_ref()?.get(&ref_index)
    }

    /// Get a resolved nested conversion for a given refs index.
    pub fn get_resolved_conversion(&self, ref_index: usize) -> Option<&ConversionBlock> {
        self.resolved_conversions
            .as_ref()?
            .get(&ref_index)
            .map(|boxed| boxed.as_ref())
    }

    /// Get the default conversion for fallback cases.
    pub fn get_default_conversion(&self) -> Option<&ConversionBlock> {
        self.default_conversion.as_ref().map(|boxed| boxed.as_ref())
    }

    /// Serialize this conversion block back to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let links = 4 + self.refs.len();

        let mut header = self.header.clone();
        header.link_count = links as u64;

        let mut size = 24 + links * 8 + 1 + 1 + 2 + 2 + 2;
        // Range fields are always written when present, flag or not.
        if self.phys_range_min.is_some() || self.phys_range_max.is_some() {
            size += 16;
        }
        size += self.values.len() * 8;
        header.length = size as u64;

        let mut buf = Vec::with_capacity(size);
        buf.extend_from_slice(&header.to_bytes()?);
        for link in [
            self.name_addr,
            self.unit_addr,
            self.comment_addr,
            self.inverse_addr,
        ] {
            buf.extend_from_slice(&link.unwrap_or(0).to_le_bytes());
        }
        for l in &self.refs {
            buf.extend_from_slice(&l.to_le_bytes());
        }
        buf.push(self.conversion_type.to_u8());
        buf.push(self.precision);
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&self.ref_count.to_le_bytes());
        buf.extend_from_slice(&self.value_count.to_le_bytes());
        if self.phys_range_min.is_some() || self.phys_range_max.is_some() {
            buf.extend_from_slice(&self.phys_range_min.unwrap_or(0.0).to_le_bytes());
            buf.extend_from_slice(&self.phys_range_max.unwrap_or(0.0).to_le_bytes());
        }
        for v in &self.values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        if buf.len() != size {
            return Err(Error::BlockSerializationError(format!(
                "ConversionBlock expected size {size} but wrote {}",
                buf.len()
            )));
        }
        Ok(buf)
    }

    fn empty(conversion_type: ConversionType) -> Self {
        Self {
            header: BlockHeader::new("##CC", 0, 4),
            name_addr: None,
            unit_addr: None,
            comment_addr: None,
            inverse_addr: None,
            refs: Vec::new(),
            conversion_type,
            precision: 0,
            flags: 0,
            ref_count: 0,
            value_count: 0,
            phys_range_min: None,
            phys_range_max: None,
            values: Vec::new(),
            formula: None,
            resolved_texts: None,
            resolved_conversions: None,
            default_conversion: None,
        }
    }

    /// Creates an identity conversion (1:1, no change).
    pub fn identity() -> Self {
        Self::empty(ConversionType::Identity)
    }

    /// Creates a linear conversion: `physical = offset + factor * raw`.
    ///
    /// The MDF 4.1 specification defines linear conversion as
    /// `y = P1 + P2 * x` where P1 is the offset and P2 is the factor.
    ///
    /// # Example
    /// ```
    /// use mdfkit::blocks::ConversionBlock;
    ///
    /// // Raw temperature to Celsius: physical = -40.0 + 0.1 * raw
    /// let temp_conv = ConversionBlock::linear(-40.0, 0.1);
    /// ```
    pub fn linear(offset: f64, factor: f64) -> Self {
        let mut block = Self::empty(ConversionType::Linear);
        block.value_count = 2;
        block.values = alloc::vec![offset, factor];
        block
    }

    /// Creates a rational conversion:
    /// `physical = (P1*x² + P2*x + P3) / (P4*x² + P5*x + P6)`.
    pub fn rational(p1: f64, p2: f64, p3: f64, p4: f64, p5: f64, p6: f64) -> Self {
        let mut block = Self::empty(ConversionType::Rational);
        block.value_count = 6;
        block.values = alloc::vec![p1, p2, p3, p4, p5, p6];
        block
    }

    /// Creates a value-to-value conversion without interpolation from
    /// `(key, value)` pairs.
    ///
    /// # Example
    /// ```
    /// use mdfkit::blocks::ConversionBlock;
    ///
    /// // CAN-FD DLC code to byte length
    /// let dlc = ConversionBlock::value_to_value(
    ///     &[(0.0, 0.0), (9.0, 12.0), (15.0, 64.0)],
    /// );
    /// ```
    pub fn value_to_value(pairs: &[(f64, f64)]) -> Self {
        let mut block = Self::empty(ConversionType::ValueToValue);
        block.value_count = (pairs.len() * 2) as u16;
        block.values = pairs.iter().flat_map(|&(k, v)| [k, v]).collect();
        block
    }

    /// Creates a value-to-value conversion with linear interpolation from
    /// `(key, value)` pairs sorted by key.
    pub fn value_to_value_interp(pairs: &[(f64, f64)]) -> Self {
        let mut block = Self::empty(ConversionType::ValueToValueInterp);
        block.value_count = (pairs.len() * 2) as u16;
        block.values = pairs.iter().flat_map(|&(k, v)| [k, v]).collect();
        block
    }

    /// Check if this is a trivial identity conversion that can be omitted.
    ///
    /// Returns `true` if the conversion type is Identity, or Linear with
    /// offset 0 and factor 1.
    pub fn is_identity(&self) -> bool {
        match self.conversion_type {
            ConversionType::Identity => true,
            ConversionType::Linear => {
                self.values.len() >= 2 && self.values[0] == 0.0 && self.values[1] == 1.0
            }
            _ => false,
        }
    }

    /// Set the physical range limits for this conversion.
    pub fn with_physical_range(mut self, min: f64, max: f64) -> Self {
        self.phys_range_min = Some(min);
        self.phys_range_max = Some(max);
        self.flags |= 0b10;
        self
    }
}
