//! Navlink device schemas
//!
//! A schema describes one device application: its parameter table (ids,
//! types, categories, allowed values) and the layouts of the packets it
//! accepts and emits. Schemas are JSON documents; minimal schemas for every
//! supported dialect are embedded so a driver works without external files.
//!
//! Every lookup that names a parameter or packet missing from the loaded
//! schema fails with [`SchemaError::SchemaMismatch`].
//!
//! ```rust,ignore
//! use navlink_schema::{DeviceSchema, ParamValue};
//!
//! let schema = DeviceSchema::builtin("openimu")?;
//! let baud = schema.parameter_by_name("baud_rate")?;
//! let wire = baud.validate(&ParamValue::Integer(115200))?;
//! ```

mod document;
mod error;
mod parameter;
mod registry;
mod schema;
mod value;

pub use document::*;
pub use error::*;
pub use parameter::*;
pub use registry::*;
pub use schema::*;
pub use value::*;
