//! Instruction generation for plotline.
//!
//! Converts per-instance computed sets (price/time domain) into screen-space
//! draw instructions plus price-axis labels. Painting them is left to an
//! external renderer.

pub mod axis;
pub mod generator;
pub mod instruction;
pub mod scale;
pub mod viewport;

pub use axis::{axis_width_for, format_label, MonospaceMetrics, TextMetrics};
pub use generator::{GeneratorInput, InstructionGenerator};
pub use instruction::{AxisLabelId, Instruction, InstructionSet};
pub use scale::apply_scale;
pub use viewport::Viewport;
