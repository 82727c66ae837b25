//! クラスラベル表とラベル解決

pub mod label_table;
pub mod resolver;

pub use label_table::{LabelTable, NUM_CLASSES};
pub use resolver::{argmax, resolve, top_k, RankedLabel};
