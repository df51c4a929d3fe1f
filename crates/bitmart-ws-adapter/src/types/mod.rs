/*
[INPUT]:  Protocol vocabulary (markets, channel privacy, logical connections)
[OUTPUT]: Typed Rust enums with serialization support
[POS]:    Data layer - type definitions shared by config, auth and ws layers
[UPDATE]: When a market or logical connection is added
*/

pub mod enums;

pub use enums::*;
