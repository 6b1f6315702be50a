//! Lowering of the reference layers into a standard ONNX graph.
//!
//! The protobuf message types come from `tract_onnx::pb`; graphs are assembled
//! with [`GraphBuilder`] and each layer contributes its nodes through [`Lower`].

mod builder;
mod io;
mod lower;

pub use builder::{attr_float, attr_int, attr_ints, DataType, Dim, GraphBuilder};
pub use io::{read_model, write_model};
pub use lower::{lower_projection, Lower};
pub use tract_onnx::pb;

use std::ops::RangeInclusive;

/// IR version of the ONNX release that introduced `opset`.
///
/// Opsets 13 and 14 shipped with IR 7, opsets 15 to 17 with IR 8.
pub fn ir_version_for_opset(opset: i64) -> i64 {
    if opset >= 15 {
        8
    } else {
        7
    }
}

/// Default operator set for exported graphs.
pub const DEFAULT_OPSET: i64 = 13;

/// Operator sets whose semantics match the emitted nodes.
///
/// `Split` and `Softmax` need 13 or later, `ReduceMean` moves its axes to an
/// input at 18.
pub const SUPPORTED_OPSETS: RangeInclusive<i64> = 13..=17;

#[cfg(test)]
mod tests;
