// Functions for creating and linking MDF structure blocks
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use super::{MdfWrite, MdfWriter};
use crate::{
    Result,
    blocks::{
        ChannelBlock, ChannelGroupBlock, ConversionBlock, DataGroupBlock, FileHistoryBlock,
        HeaderBlock, IdentificationBlock, MetadataBlock, SourceBlock, TextBlock, cg_flags,
    },
};

// Link slot offsets within the fixed blocks, relative to the block start.
const HD_FIRST_DG: u64 = 24;
const HD_FIRST_FH: u64 = 32;
const HD_COMMENT: u64 = 64;
const HD_START_TIME: u64 = 72;
const DG_NEXT: u64 = 24;
const DG_FIRST_CG: u64 = 32;
const CG_NEXT: u64 = 24;
const CG_FIRST_CN: u64 = 32;
const CG_ACQ_NAME: u64 = 40;
const CG_ACQ_SOURCE: u64 = 48;
const CG_COMMENT: u64 = 64;
const CN_NEXT: u64 = 24;
const CN_COMPONENT: u64 = 32;
const CN_NAME: u64 = 40;
const CN_SOURCE: u64 = 48;
const CN_CONVERSION: u64 = 56;
const CN_UNIT: u64 = 72;
const CN_COMMENT: u64 = 80;
const HD_FIRST_AT: u64 = 48;
const FH_NEXT: u64 = 24;
const AT_NEXT: u64 = 24;

impl<W: MdfWrite> MdfWriter<W> {
    /// Initializes a new MDF 4.1 file with identification and header
    /// blocks. Returns their positions.
    pub fn init_mdf_file(&mut self) -> Result<(u64, u64)> {
        let id_block = IdentificationBlock::default();
        let id_bytes = id_block.to_bytes()?;
        let id_pos = self.write_block_with_id(&id_bytes, "id_block")?;

        let hd_block = HeaderBlock::default();
        let hd_bytes = hd_block.to_bytes()?;
        let hd_pos = self.write_block_with_id(&hd_bytes, "hd_block")?;
        Ok((id_pos, hd_pos))
    }

    /// Set the absolute measurement start time in the header block.
    pub fn set_start_time_ns(&mut self, start_time_ns: u64) -> Result<()> {
        self.update_block_u64("hd_block", HD_START_TIME, start_time_ns)
    }

    /// Attach the header metadata subblock: a free-text description plus
    /// the common author/project/subject properties.
    pub fn set_header_metadata(
        &mut self,
        description: &str,
        author: &str,
        project: &str,
        subject: &str,
    ) -> Result<()> {
        let xml = format!(
            "<HDcomment><TX>{description}</TX><common_properties>\
             <e name=\"author\">{author}</e>\
             <e name=\"project\">{project}</e>\
             <e name=\"subject\">{subject}</e>\
             </common_properties></HDcomment>"
        );
        let md = MetadataBlock::new(&xml);
        let md_bytes = md.to_bytes()?;
        let md_pos = self.write_block_with_id(&md_bytes, "md_hd_comment")?;
        let hd_pos = self
            .get_block_position("hd_block")
            .ok_or_else(|| crate::Error::BlockLinkError("header block not written".into()))?;
        self.update_link(hd_pos + HD_COMMENT, md_pos)
    }

    /// Appends a file history entry recording which tool touched the file.
    ///
    /// The first entry links from the header; later entries chain off the
    /// previous one.
    pub fn add_file_history(
        &mut self,
        time_ns: u64,
        tool_name: &str,
        vendor: &str,
        version: &str,
        user: &str,
    ) -> Result<String> {
        let fh_count = self
            .block_positions
            .keys()
            .filter(|k| k.starts_with("fh_"))
            .count();
        let fh_id = format!("fh_{}", fh_count);

        let md = MetadataBlock::new(&FileHistoryBlock::comment_xml(
            tool_name, vendor, version, user,
        ));
        let md_bytes = md.to_bytes()?;
        let md_id = format!("md_{}", fh_id);
        let md_pos = self.write_block_with_id(&md_bytes, &md_id)?;

        let mut fh = FileHistoryBlock::new(time_ns);
        fh.comment_addr = md_pos;
        let fh_bytes = fh.to_bytes()?;
        let _pos = self.write_block_with_id(&fh_bytes, &fh_id)?;

        if fh_count > 0 {
            let prev = format!("fh_{}", fh_count - 1);
            self.update_block_link(&prev, FH_NEXT, &fh_id)?;
        } else {
            self.update_block_link("hd_block", HD_FIRST_FH, &fh_id)?;
        }
        Ok(fh_id)
    }

    /// Embeds a file as an attachment block and links it into the header's
    /// attachment chain.
    pub fn add_attachment(
        &mut self,
        filename: &str,
        mime_type: &str,
        data: &[u8],
    ) -> Result<String> {
        use crate::blocks::AttachmentBlock;

        let at_count = self
            .block_positions
            .keys()
            .filter(|k| k.starts_with("at_"))
            .count();
        let at_id = format!("at_{}", at_count);

        let tx_name = TextBlock::new(filename);
        let name_pos = self.write_block_with_id(&tx_name.to_bytes()?, &format!("tx_{at_id}_file"))?;
        let tx_mime = TextBlock::new(mime_type);
        let mime_pos = self.write_block_with_id(&tx_mime.to_bytes()?, &format!("tx_{at_id}_mime"))?;

        let mut at = AttachmentBlock::embedded(data);
        at.filename_addr = name_pos;
        at.mimetype_addr = mime_pos;
        let _pos = self.write_block_with_id(&at.to_bytes()?, &at_id)?;

        if at_count > 0 {
            let prev = format!("at_{}", at_count - 1);
            self.update_block_link(&prev, AT_NEXT, &at_id)?;
        } else {
            self.update_block_link("hd_block", HD_FIRST_AT, &at_id)?;
        }
        Ok(at_id)
    }

    /// Adds a data group block with the given record id width and links it
    /// from the header (or the previous data group).
    pub fn add_data_group(&mut self, record_id_len: u8) -> Result<String> {
        let dg_count = self
            .block_positions
            .keys()
            .filter(|k| k.starts_with("dg_"))
            .count();
        let dg_id = format!("dg_{}", dg_count);
        let dg_block = DataGroupBlock::with_record_id_len(record_id_len)?;
        let dg_bytes = dg_block.to_bytes()?;
        let _pos = self.write_block_with_id(&dg_bytes, &dg_id)?;

        if let Some(prev) = self.last_dg.clone() {
            self.update_block_link(&prev, DG_NEXT, &dg_id)?;
        } else {
            self.update_block_link("hd_block", HD_FIRST_DG, &dg_id)?;
        }
        self.last_dg = Some(dg_id.clone());
        self.dg_record_id_len.insert(dg_id.clone(), record_id_len);
        Ok(dg_id)
    }

    /// Adds a channel group block to the specified data group and links it.
    pub fn add_channel_group_with_dg<F>(
        &mut self,
        dg_id: &str,
        prev_cg_id: Option<&str>,
        configure: F,
    ) -> Result<String>
    where
        F: FnOnce(&mut ChannelGroupBlock),
    {
        let cg_count = self
            .block_positions
            .keys()
            .filter(|k| k.starts_with("cg_"))
            .count();
        let cg_id = format!("cg_{}", cg_count);

        let mut cg_block = ChannelGroupBlock::default();
        configure(&mut cg_block);

        let cg_bytes = cg_block.to_bytes()?;
        let _pos = self.write_block_with_id(&cg_bytes, &cg_id)?;

        if let Some(prev) = prev_cg_id {
            self.update_block_link(prev, CG_NEXT, &cg_id)?;
        } else {
            self.update_block_link(dg_id, DG_FIRST_CG, &cg_id)?;
        }

        self.cg_to_dg.insert(cg_id.clone(), dg_id.to_string());
        self.cg_order.push(cg_id.clone());
        self.cg_offsets.insert(cg_id.clone(), 0);
        self.cg_channels.insert(cg_id.clone(), Vec::new());
        self.cg_blocks.insert(cg_id.clone(), cg_block);
        Ok(cg_id)
    }

    /// Adds a channel group inside a fresh data group (record id width 0).
    pub fn add_channel_group<F>(&mut self, prev_cg_id: Option<&str>, configure: F) -> Result<String>
    where
        F: FnOnce(&mut ChannelGroupBlock),
    {
        let dg_id = self.add_data_group(0)?;
        self.add_channel_group_with_dg(&dg_id, prev_cg_id, configure)
    }

    /// Adds an empty VLSD side channel group with the given record id.
    ///
    /// The group carries no channels; its records are the length-prefixed
    /// payloads of a variable-length channel in a sibling group. By the
    /// bus-logging convention the record id is the primary group's id + 1.
    pub fn add_vlsd_channel_group(
        &mut self,
        dg_id: &str,
        prev_cg_id: Option<&str>,
        record_id: u64,
    ) -> Result<String> {
        self.add_channel_group_with_dg(dg_id, prev_cg_id, |cg| {
            cg.record_id = record_id;
            cg.flags = cg_flags::VLSD;
        })
    }

    /// Adds a channel block to the specified channel group and links it.
    ///
    /// A zero `byte_offset` is auto-assigned right after the previous
    /// channel's span; an explicit offset is kept as configured.
    pub fn add_channel<F>(
        &mut self,
        cg_id: &str,
        prev_cn_id: Option<&str>,
        configure: F,
    ) -> Result<String>
    where
        F: FnOnce(&mut ChannelBlock),
    {
        let cn_id = self.next_channel_id();

        let mut ch = ChannelBlock::default();
        configure(&mut ch);
        if ch.bit_count == 0 {
            ch.bit_count = ch.data_type.default_bits();
        }
        if let Some(off) = self.cg_offsets.get_mut(cg_id) {
            if ch.byte_offset == 0 {
                ch.byte_offset = *off as u32;
            }
            let used = ch.byte_span();
            *off = (*off).max(ch.byte_offset as usize + used);
        }

        self.write_channel_with_name(&cn_id, &mut ch)?;

        let entry = self.cg_channels.entry(cg_id.to_string()).or_default();
        entry.push(ch);
        let idx = entry.len() - 1;
        self.channel_map
            .insert(cn_id.clone(), (cg_id.to_string(), idx));

        if let Some(prev_cn) = prev_cn_id {
            self.update_block_link(prev_cn, CN_NEXT, &cn_id)?;
        } else {
            self.update_block_link(cg_id, CG_FIRST_CN, &cn_id)?;
        }
        Ok(cn_id)
    }

    /// Adds a composition sub-channel beneath a parent channel.
    ///
    /// The first composition links from the parent's component slot; later
    /// ones chain off the previous composition. Compositions overlay the
    /// parent's byte range and do not take part in record layout.
    pub fn add_channel_composition<F>(
        &mut self,
        parent_cn_id: &str,
        prev_comp_id: Option<&str>,
        configure: F,
    ) -> Result<String>
    where
        F: FnOnce(&mut ChannelBlock),
    {
        let cn_id = self.next_channel_id();

        let mut ch = ChannelBlock::default();
        configure(&mut ch);
        if ch.bit_count == 0 {
            ch.bit_count = ch.data_type.default_bits();
        }

        self.write_channel_with_name(&cn_id, &mut ch)?;

        if let Some(prev) = prev_comp_id {
            self.update_block_link(prev, CN_NEXT, &cn_id)?;
        } else {
            self.update_block_link(parent_cn_id, CN_COMPONENT, &cn_id)?;
        }
        Ok(cn_id)
    }

    fn next_channel_id(&self) -> String {
        let cn_count = self
            .block_positions
            .keys()
            .filter(|k| k.starts_with("cn_"))
            .count();
        format!("cn_{}", cn_count)
    }

    /// Write a channel block and, if it has a name, the name text block,
    /// patching the name link.
    fn write_channel_with_name(&mut self, cn_id: &str, ch: &mut ChannelBlock) -> Result<u64> {
        let cn_bytes = ch.to_bytes()?;
        let cn_pos = self.write_block_with_id(&cn_bytes, cn_id)?;
        if let Some(channel_name) = &ch.name {
            let tx_id = format!("tx_name_{}", cn_id);
            let tx_block = TextBlock::new(channel_name);
            let tx_bytes = tx_block.to_bytes()?;
            let tx_pos = self.write_block_with_id(&tx_bytes, &tx_id)?;
            self.update_link(cn_pos + CN_NAME, tx_pos)?;
        }
        Ok(cn_pos)
    }

    /// Mark an existing channel as the time (master) channel.
    pub fn set_time_channel(&mut self, cn_id: &str) -> Result<()> {
        const CHANNEL_TYPE_OFFSET: u64 = 88;
        const SYNC_TYPE_OFFSET: u64 = 89;
        self.update_block_u8(cn_id, CHANNEL_TYPE_OFFSET, 2)?;
        self.update_block_u8(cn_id, SYNC_TYPE_OFFSET, 1)?;

        if let Some((cg, idx)) = self.channel_map.get(cn_id).cloned()
            && let Some(chs) = self.cg_channels.get_mut(&cg)
            && let Some(ch) = chs.get_mut(idx)
        {
            ch.channel_type = crate::blocks::ChannelType::Master;
            ch.sync_type = crate::blocks::SyncType::Time;
        }
        Ok(())
    }

    /// Sets the unit string for an existing channel.
    ///
    /// # Arguments
    /// * `cn_id` - The channel ID returned from `add_channel()`
    /// * `unit` - The unit string (e.g., "rpm", "°C", "km/h")
    pub fn set_channel_unit(&mut self, cn_id: &str, unit: &str) -> Result<()> {
        if unit.is_empty() {
            return Ok(());
        }

        let cn_pos = self
            .get_block_position(cn_id)
            .ok_or_else(|| crate::Error::BlockLinkError(format!("Channel '{}' not found", cn_id)))?;

        let tx_id = format!("tx_unit_{}", cn_id);
        let tx_block = TextBlock::new(unit);
        let tx_bytes = tx_block.to_bytes()?;
        let tx_pos = self.write_block_with_id(&tx_bytes, &tx_id)?;

        self.update_link(cn_pos + CN_UNIT, tx_pos)?;
        Ok(())
    }

    /// Sets the comment/description for an existing channel.
    pub fn set_channel_comment(&mut self, cn_id: &str, comment: &str) -> Result<()> {
        if comment.is_empty() {
            return Ok(());
        }

        let cn_pos = self
            .get_block_position(cn_id)
            .ok_or_else(|| crate::Error::BlockLinkError(format!("Channel '{}' not found", cn_id)))?;

        let tx_id = format!("tx_comment_{}", cn_id);
        let tx_block = TextBlock::new(comment);
        let tx_bytes = tx_block.to_bytes()?;
        let tx_pos = self.write_block_with_id(&tx_bytes, &tx_id)?;

        self.update_link(cn_pos + CN_COMMENT, tx_pos)?;
        Ok(())
    }

    /// Sets the conversion block for an existing channel.
    ///
    /// Identity conversions are skipped as redundant.
    ///
    /// # Example
    /// ```ignore
    /// // Raw value to Celsius: physical = -40 + 0.1 * raw
    /// let conv = ConversionBlock::linear(-40.0, 0.1);
    /// writer.set_channel_conversion(&ch, &conv)?;
    /// ```
    pub fn set_channel_conversion(
        &mut self,
        cn_id: &str,
        conversion: &ConversionBlock,
    ) -> Result<()> {
        if conversion.is_identity() {
            return Ok(());
        }

        let cn_pos = self
            .get_block_position(cn_id)
            .ok_or_else(|| crate::Error::BlockLinkError(format!("Channel '{}' not found", cn_id)))?;

        let cc_id = self.next_conversion_id();
        let cc_bytes = conversion.to_bytes()?;
        let cc_pos = self.write_block_with_id(&cc_bytes, &cc_id)?;

        self.update_link(cn_pos + CN_CONVERSION, cc_pos)?;
        Ok(())
    }

    fn next_conversion_id(&self) -> String {
        let cc_count = self
            .block_positions
            .keys()
            .filter(|k| k.starts_with("cc_"))
            .count();
        format!("cc_{}", cc_count)
    }

    /// Adds a linear conversion to a channel:
    /// `physical = offset + factor * raw`.
    pub fn add_linear_conversion(&mut self, cn_id: &str, offset: f64, factor: f64) -> Result<()> {
        if offset == 0.0 && factor == 1.0 {
            return Ok(());
        }
        let conversion = ConversionBlock::linear(offset, factor);
        self.set_channel_conversion(cn_id, &conversion)
    }

    /// Adds a value-to-value conversion (no interpolation) to a channel
    /// from `(key, value)` pairs. Used for example to map CAN-FD DLC codes
    /// to byte lengths.
    pub fn add_value_to_value_conversion(
        &mut self,
        cn_id: &str,
        pairs: &[(f64, f64)],
    ) -> Result<()> {
        let conversion = ConversionBlock::value_to_value(pairs);
        self.set_channel_conversion(cn_id, &conversion)
    }

    /// Creates and writes a value-to-text conversion block with a trailing
    /// default text, optionally attaching it to a channel.
    ///
    /// Each mapping entry becomes a text reference; keys go into the value
    /// table.
    pub fn add_value_to_text_conversion(
        &mut self,
        mapping: &[(i64, &str)],
        default_text: &str,
        channel_id: Option<&str>,
    ) -> Result<(String, u64)> {
        let cc_id = self.next_conversion_id();

        let mut refs = Vec::new();
        for (idx, (_, txt)) in mapping.iter().enumerate() {
            let tx_id = format!("tx_{}_{}", cc_id, idx);
            let tx_block = TextBlock::new(txt);
            let tx_bytes = tx_block.to_bytes()?;
            let pos = self.write_block_with_id(&tx_bytes, &tx_id)?;
            refs.push(pos);
        }
        let tx_default_id = format!("tx_{}_default", cc_id);
        let tx_default = TextBlock::new(default_text);
        let tx_bytes = tx_default.to_bytes()?;
        let default_pos = self.write_block_with_id(&tx_bytes, &tx_default_id)?;
        refs.push(default_pos);

        let vals: Vec<f64> = mapping.iter().map(|(v, _)| *v as f64).collect();

        let mut block = ConversionBlock::identity();
        block.conversion_type = crate::blocks::ConversionType::ValueToText;
        block.flags = 0b10;
        block.ref_count = (mapping.len() + 1) as u16;
        block.value_count = mapping.len() as u16;
        block.phys_range_min = Some(0.0);
        block.phys_range_max = Some(0.0);
        block.values = vals;
        block.refs = refs;

        let cc_bytes = block.to_bytes()?;
        let pos = self.write_block_with_id(&cc_bytes, &cc_id)?;

        if let Some(cn) = channel_id {
            self.update_block_link(cn, CN_CONVERSION, &cc_id)?;
        }
        Ok((cc_id, pos))
    }

    /// Sets channel limits (min/max physical values).
    pub fn set_channel_limits(&mut self, cn_id: &str, min: f64, max: f64) -> Result<()> {
        let cn_pos = self
            .get_block_position(cn_id)
            .ok_or_else(|| crate::Error::BlockLinkError(format!("Channel '{}' not found", cn_id)))?;

        const LOWER_LIMIT_OFFSET: u64 = 128;
        const UPPER_LIMIT_OFFSET: u64 = 136;

        self.update_link(cn_pos + LOWER_LIMIT_OFFSET, min.to_bits())?;
        self.update_link(cn_pos + UPPER_LIMIT_OFFSET, max.to_bits())?;

        if let Some((cg, idx)) = self.channel_map.get(cn_id).cloned()
            && let Some(chs) = self.cg_channels.get_mut(&cg)
            && let Some(ch) = chs.get_mut(idx)
        {
            ch.lower_limit = min;
            ch.upper_limit = max;
        }

        Ok(())
    }

    /// Sets the acquisition name for an existing channel group.
    pub fn set_channel_group_name(&mut self, cg_id: &str, name: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }

        let cg_pos = self.get_block_position(cg_id).ok_or_else(|| {
            crate::Error::BlockLinkError(format!("Channel group '{}' not found", cg_id))
        })?;

        let tx_id = format!("tx_cgname_{}", cg_id);
        let tx_block = TextBlock::new(name);
        let tx_bytes = tx_block.to_bytes()?;
        let tx_pos = self.write_block_with_id(&tx_bytes, &tx_id)?;

        self.update_link(cg_pos + CG_ACQ_NAME, tx_pos)?;
        Ok(())
    }

    /// Sets the comment for an existing channel group.
    pub fn set_channel_group_comment(&mut self, cg_id: &str, comment: &str) -> Result<()> {
        if comment.is_empty() {
            return Ok(());
        }

        let cg_pos = self.get_block_position(cg_id).ok_or_else(|| {
            crate::Error::BlockLinkError(format!("Channel group '{}' not found", cg_id))
        })?;

        let tx_id = format!("tx_cgcomment_{}", cg_id);
        let tx_block = TextBlock::new(comment);
        let tx_bytes = tx_block.to_bytes()?;
        let tx_pos = self.write_block_with_id(&tx_bytes, &tx_id)?;

        self.update_link(cg_pos + CG_COMMENT, tx_pos)?;
        Ok(())
    }

    /// Sets the acquisition source for an existing channel group.
    ///
    /// # Example
    /// ```ignore
    /// let source = SourceBlock::can_bus();
    /// writer.set_channel_group_source(&cg, &source, Some("CAN1"))?;
    /// ```
    pub fn set_channel_group_source(
        &mut self,
        cg_id: &str,
        source: &SourceBlock,
        source_name: Option<&str>,
    ) -> Result<()> {
        let cg_pos = self.get_block_position(cg_id).ok_or_else(|| {
            crate::Error::BlockLinkError(format!("Channel group '{}' not found", cg_id))
        })?;

        let si_id = format!(
            "si_{}",
            self.block_positions
                .keys()
                .filter(|k| k.starts_with("si_"))
                .count()
        );

        let mut source = source.clone();

        if let Some(name) = source_name
            && !name.is_empty()
        {
            let tx_id = format!("tx_siname_{}", si_id);
            let tx_block = TextBlock::new(name);
            let tx_bytes = tx_block.to_bytes()?;
            let tx_pos = self.write_block_with_id(&tx_bytes, &tx_id)?;
            source.name_addr = tx_pos;
        }

        let si_bytes = source.to_bytes()?;
        let si_pos = self.write_block_with_id(&si_bytes, &si_id)?;

        self.update_link(cg_pos + CG_ACQ_SOURCE, si_pos)?;
        Ok(())
    }

    /// Sets the source for an individual channel.
    pub fn set_channel_source(&mut self, cn_id: &str, source: &SourceBlock) -> Result<()> {
        let cn_pos = self
            .get_block_position(cn_id)
            .ok_or_else(|| crate::Error::BlockLinkError(format!("Channel '{}' not found", cn_id)))?;

        let si_id = format!(
            "si_{}",
            self.block_positions
                .keys()
                .filter(|k| k.starts_with("si_"))
                .count()
        );
        let si_bytes = source.to_bytes()?;
        let si_pos = self.write_block_with_id(&si_bytes, &si_id)?;

        self.update_link(cn_pos + CN_SOURCE, si_pos)?;
        Ok(())
    }
}
