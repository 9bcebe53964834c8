#![forbid(unsafe_code)]
#![cfg_attr(not(feature = "std"), no_std)]

//! # mdfkit
//!
//! A Rust library for reading and writing ASAM MDF 4 (Measurement Data
//! Format) files.
//!
//! MDF4 is a binary container standardized by ASAM for time-series
//! measurement data, widely used in automotive testing to store sensor
//! samples, CAN/LIN/Ethernet bus traffic, and metadata. Files are a linked
//! graph of typed blocks addressed by absolute file offsets.
//!
//! ## Features
//!
//! - **Reading**: staged parsing of the block graph, record streaming
//!   through sample observers, automatic value conversion
//! - **Writing**: a block-graph builder plus a streaming writer with a
//!   background flush thread, pre-trigger trimming, and optional DEFLATE
//!   compression
//! - **Bus logging**: the ASAM-mandated CAN/LIN/Ethernet channel layouts
//!   and matching frame value objects
//!
//! ## Supported MDF version
//!
//! The crate targets MDF 4.1+. Notably supported:
//!
//! - Standard data types (integers, floats, strings, byte arrays,
//!   CANopen date/time)
//! - Bit-aligned channel extraction and invalidation bits
//! - Linear, rational, algebraic, tabular and text conversions
//! - Variable-length signal data in SD blocks or VLSD channel groups
//! - Compressed data (DZ blocks, DEFLATE) behind the `compression`
//!   feature
//!
//! ## Reading a file
//!
//! ```no_run
//! use mdfkit::{MDF, Result};
//!
//! fn main() -> Result<()> {
//!     let mdf = MDF::from_file("recording.mf4")?;
//!
//!     for group in mdf.channel_groups() {
//!         println!("Group: {:?}", group.name()?);
//!
//!         for channel in group.channels() {
//!             let name = channel.name()?.unwrap_or_default();
//!             let values = channel.values()?;
//!             let valid_count = values.iter().filter(|v| v.is_some()).count();
//!             println!("  {}: {} valid samples", name, valid_count);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Logging a CAN capture
//!
//! ```no_run
//! use mdfkit::buslog::{BusLogOptions, CanFrameKind, CanMessage, configure_can};
//! use mdfkit::writer::StreamingWriter;
//! use mdfkit::Result;
//!
//! fn main() -> Result<()> {
//!     let mut writer = StreamingWriter::new("capture.mf4")?;
//!     let can = configure_can(writer.writer_mut()?, &BusLogOptions::default())?;
//!
//!     writer.init_measurement()?;
//!     writer.start_measurement(1_700_000_000_000_000_000)?;
//!
//!     let mut msg = CanMessage::new(0x123);
//!     msg.set_data_bytes(&[1, 2, 3, 4]);
//!     writer.save_can_message(&can, CanFrameKind::DataFrame, 1_700_000_000_001_000_000, &msg)?;
//!
//!     writer.stop_measurement(1_700_000_000_002_000_000)?;
//!     writer.finalize_measurement()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`blocks`] | Low-level MDF block catalog |
//! | [`parsing`] | Raw graph parsing and the channel decoder |
//! | [`observer`] | Sample observers for record streaming |
//! | [`reader`] | Staged file reader |
//! | [`writer`] | Block-graph writer and the streaming writer |
//! | [`buslog`] | CAN/LIN/Ethernet bus-logging configurators |
//! | [`error`] | Error types and the [`Result`] alias |
//!
//! ## Error handling
//!
//! All fallible operations return [`Result<T>`], an alias for
//! `core::result::Result<T, Error>`. Decoding problems inside a sample
//! (half floats, broken conversions) surface as invalid samples rather
//! than errors.

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
pub mod blocks;
#[cfg(feature = "alloc")]
pub mod buslog;
#[cfg(feature = "alloc")]
pub mod error;
#[cfg(feature = "alloc")]
pub mod types;
#[cfg(feature = "alloc")]
pub mod writer;

#[cfg(feature = "std")]
pub mod parsing;

#[cfg(feature = "std")]
pub mod observer;

#[cfg(feature = "std")]
pub mod reader;

#[cfg(feature = "std")]
mod channel;
#[cfg(feature = "std")]
mod channel_group;
#[cfg(feature = "std")]
mod mdf;

// Re-export commonly used types at the crate root
#[cfg(feature = "alloc")]
pub use blocks::{ChannelType, DataType, SyncType};
#[cfg(feature = "alloc")]
pub use error::{Error, Result};
#[cfg(feature = "alloc")]
pub use types::{DecodedValue, SampleRecord, StorageType, WriteState};
#[cfg(feature = "alloc")]
pub use writer::MdfWriter;

#[cfg(feature = "std")]
pub use channel::Channel;
#[cfg(feature = "std")]
pub use channel_group::ChannelGroup;
#[cfg(feature = "std")]
pub use mdf::MDF;
#[cfg(feature = "std")]
pub use observer::{ChannelObserver, ObserverStatus, SampleObserver};
#[cfg(feature = "std")]
pub use reader::{MdfReader, is_mdf_file};
#[cfg(feature = "std")]
pub use writer::StreamingWriter;
