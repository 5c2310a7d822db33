pub mod associate;
pub mod collect;
pub mod end_prepush;
pub mod load_items;
pub mod load_sums;
pub mod publish;
pub mod query;
pub mod update;
pub mod upload;

pub use associate::Associate;
pub use collect::Collect;
pub use end_prepush::EndPrePush;
pub use load_items::LoadItems;
pub use load_sums::LoadChecksums;
pub use publish::Publish;
pub use query::QueryPulp;
pub use update::Update;
pub use upload::Upload;
