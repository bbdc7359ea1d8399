//! 基础设施层：存储与变更流的具体实现

pub mod persistence;
pub mod realtime;
