//! Downstream side of the SmartHive gateway.
//!
//! A validated sensor record is turned into one delimited text line and handed
//! to a [`Sink`], which owns whatever connection the downstream collector
//! needs.
//!
//! # Line Schemas
//!
//! - **Plain**: every record field in wire order, comma separated.
//! - **Routed**: `write,<channel>-<device>,<yymmddHHMMSS>,...` for the
//!   spreadsheet collector, which files each line under the routing label.
//!
//! # Example
//!
//! ```rust,ignore
//! use hivegate_sink::{Renderer, Schema, Sink, UdpSink};
//!
//! let mut sink = UdpSink::new("sheet", "127.0.0.1:50910".parse()?, Renderer::new(Schema::Routed));
//! sink.open()?;
//! let line = sink.render(1, 2, &record)?;
//! sink.forward(&line)?;
//! sink.close();
//! ```

mod error;
mod render;
mod sink;

pub use error::*;
pub use render::*;
pub use sink::*;
