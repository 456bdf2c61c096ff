//! 🎬 *[an object has been scanned. it is shapeless. it is a Value.]*
//! *[the store wants documents. typed, labeled, timestamped documents.]*
//! *[between the two: this module.]*
//!
//! 🔄 The Transforms module, where scanned readings become metric documents.
//!
//! One reading in, zero to three documents out. Pure functions, no I/O,
//! no shared state, maximally boring to test. Exactly how a transform
//! layer should live its life.

mod sensor_metrics;

pub use sensor_metrics::{SensorReading, TimestampField, expand};
