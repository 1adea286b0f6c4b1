//! # ClinQ存储模块
//!
//! 定义患者与病区记录的仓储接口，并提供基于乐观并发控制的内存实现。
//! 所有变更通过 [`FlowStore::commit`] 以变更集的形式原子提交。

pub mod memory;
pub mod store;

// 重新导出主要类型
pub use memory::InMemoryStore;
pub use store::{ChangeSet, CommitReceipt, FlowStore, StoreSnapshot};
