//! 🎬 *[bytes arrive. they arrive in whatever sized pieces the network felt like.]*
//! *[somewhere in those pieces: objects. complete, decodable, waiting.]*
//! *[someone has to find the edges. that someone lives here.]*
//!
//! 🔍 The Scanners module, home of the incremental feed scanner.
//!
//! The upstream feed is one enormous top-level JSON array. We never hold the
//! whole thing in memory; we hold exactly one object's worth of bytes at a
//! time plus a handful of state flags, and we emit each object the instant
//! its closing brace lands. Chunk boundaries are the enemy here: the network
//! will happily split the payload mid-string, mid-escape, mid-emoji. The
//! scanner does not care. That indifference is the entire point of it.
//!
//! 🦆 (the duck's brackets are [ and ], in case you were wondering)

mod json_array;

pub use json_array::JsonArrayScanner;
