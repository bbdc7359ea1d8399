//! 领域层：模型、事件、仓储接口与领域服务

pub mod event;
pub mod model;
pub mod repository;
pub mod service;
