pub mod avl;
pub mod chained_hash;
pub mod open_hash;
pub mod pr;
pub mod rb;
pub mod skip_list;
pub mod splay;
pub mod treap;
pub mod wbt;

pub use avl::AvlTreeMap;
pub use chained_hash::ChainedHashMap;
pub use open_hash::OpenHashMap;
pub use pr::PathTreeMap;
pub use rb::RbTreeMap;
pub use skip_list::SkipListMap;
pub use splay::SplayTreeMap;
pub use treap::TreapMap;
pub use wbt::WbtTreeMap;
