pub mod context_desc;
pub mod value_desc;

pub use context_desc::{core_weight, NextContext, NvmContextDesc, SharedContextDesc};
pub use value_desc::{NvmValueDesc, SharedValueDesc};
